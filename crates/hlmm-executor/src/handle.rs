//! Operator-facing handle to the engine task.

use std::sync::Arc;

use hlmm_core::{Order, OrderRecord, Position, TradingPair};
use hlmm_mm::{MakerConfig, QuoteVeto};
use hlmm_telemetry::SessionStats;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use crate::engine::EngineCommand;
use crate::error::{ExecutorError, ExecutorResult};

/// An error kept in the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorRecord {
    pub at_ms: u64,
    pub kind: &'static str,
    pub message: String,
}

/// Read-only view of the engine, refreshed after every message it handles.
#[derive(Debug, Clone, Serialize)]
pub struct EngineSnapshot {
    pub pair: TradingPair,
    pub live_orders: Vec<Order>,
    pub bid: Option<Order>,
    pub ask: Option<Order>,
    pub position: Position,
    pub avg_entry: Decimal,
    pub realized_pnl: Decimal,
    pub last_cycle_ms: Option<u64>,
    pub generation: u64,
    /// Vetoes from the latest completed cycle.
    pub vetoes: Vec<QuoteVeto>,
    pub recent_terminal: Vec<OrderRecord>,
    pub recent_errors: Vec<ErrorRecord>,
    pub reconcile_in_flight: bool,
    /// A failed reconciliation is waiting to be retried.
    pub reconcile_owed: bool,
    pub running: bool,
    pub stats: SessionStats,
}

impl EngineSnapshot {
    pub fn new(pair: TradingPair) -> Self {
        Self {
            stats: SessionStats::new(pair.to_string()),
            pair,
            live_orders: Vec::new(),
            bid: None,
            ask: None,
            position: Position::default(),
            avg_entry: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            last_cycle_ms: None,
            generation: 0,
            vetoes: Vec::new(),
            recent_terminal: Vec::new(),
            recent_errors: Vec::new(),
            reconcile_in_flight: false,
            reconcile_owed: false,
            running: false,
        }
    }
}

/// What the engine left behind when it stopped.
#[derive(Debug, Clone, Serialize)]
pub struct ShutdownReport {
    /// Orders still live when the grace period ran out. They may rest on
    /// the venue.
    pub abandoned: Vec<Order>,
    pub position: Position,
    pub realized_pnl: Decimal,
    pub stats: SessionStats,
}

impl ShutdownReport {
    /// Every order was confirmed terminal before stopping.
    pub fn is_clean(&self) -> bool {
        self.abandoned.is_empty()
    }
}

/// Cloneable handle to the engine task.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineCommand>,
    snapshot: Arc<RwLock<EngineSnapshot>>,
}

impl EngineHandle {
    pub(crate) fn new(
        tx: mpsc::Sender<EngineCommand>,
        snapshot: Arc<RwLock<EngineSnapshot>>,
    ) -> Self {
        Self { tx, snapshot }
    }

    /// Latest published snapshot. Does not wait for the engine.
    pub fn snapshot(&self) -> EngineSnapshot {
        self.snapshot.read().clone()
    }

    pub fn is_running(&self) -> bool {
        self.snapshot.read().running
    }

    /// Validate `config` and apply it from the next refresh cycle.
    pub async fn update_config(&self, config: MakerConfig) -> ExecutorResult<()> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::UpdateConfig { config, reply })
            .await?;
        rx.await.map_err(|_| ExecutorError::EngineStopped)?
    }

    /// Resynchronize with the venue's open orders.
    pub async fn force_reconcile(&self) -> ExecutorResult<()> {
        self.send(EngineCommand::ForceReconcile).await
    }

    /// Cancel everything, wait out the grace period and stop the task.
    pub async fn stop(&self) -> ExecutorResult<ShutdownReport> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::Stop { reply }).await?;
        rx.await.map_err(|_| ExecutorError::EngineStopped)
    }

    async fn send(&self, command: EngineCommand) -> ExecutorResult<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| ExecutorError::EngineStopped)
    }
}
