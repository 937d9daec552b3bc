//! Engine task, venue adapters and scheduling for hlmm.
//!
//! # Architecture
//!
//! ```text
//! Scheduler ──tick──┐
//! Account events ───┤
//! Venue responses ──┼─→ engine task (LifecycleManager, Inventory, config)
//! EngineHandle ─────┘        │
//!                            └─→ spawned venue requests (timeout + retry)
//!                                     │
//!                               AccountAdapter (paper venue, mock)
//! ```

pub mod clock;
pub mod engine;
pub mod error;
pub mod handle;
pub mod paper;
pub mod retry;
pub mod scheduler;
pub mod venue;

pub use clock::Clock;
pub use engine::{start_engine, EngineParts, ERROR_HISTORY};
pub use error::{ExecutorError, ExecutorResult, VenueError, VenueResult};
pub use handle::{EngineHandle, EngineSnapshot, ErrorRecord, ShutdownReport};
pub use paper::{PaperConfig, PaperVenue};
pub use retry::{calculate_backoff_delay, with_retry, RetryPolicy};
pub use scheduler::{Scheduler, Tick};
pub use venue::{
    AccountAdapter, BoxFuture, CancelOutcome, DynAccountAdapter, MockVenue, SubmitOutcome,
};
