//! Account adapter seam.
//!
//! Everything the engine asks of the venue goes through
//! [`AccountAdapter`]. Unsolicited account events (fills, venue-side
//! cancels and rejects) arrive separately on an
//! `mpsc::Receiver<AccountEvent>`.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use hlmm_core::{
    AccountState, CancelRequest, MarketSpec, OrderRequest, Size, TradingPair, VenueOrder,
};
use parking_lot::Mutex;

use crate::error::{VenueError, VenueResult};

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Venue answer to an order submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted { oid: String },
    Rejected { reason: String },
}

/// Venue answer to a cancel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Ack,
    /// The venue does not know the order.
    NotFound,
}

/// Order entry and account queries for one venue account.
pub trait AccountAdapter: Send + Sync {
    fn submit_order(&self, request: OrderRequest) -> BoxFuture<'_, VenueResult<SubmitOutcome>>;

    fn cancel_order(&self, request: CancelRequest) -> BoxFuture<'_, VenueResult<CancelOutcome>>;

    fn query_open_orders<'a>(
        &'a self,
        pair: &'a TradingPair,
    ) -> BoxFuture<'a, VenueResult<Vec<VenueOrder>>>;

    fn query_account<'a>(&'a self, pair: &'a TradingPair)
        -> BoxFuture<'a, VenueResult<AccountState>>;

    fn set_leverage<'a>(&'a self, pair: &'a TradingPair, leverage: u32)
        -> BoxFuture<'a, VenueResult<()>>;

    fn market_spec<'a>(&'a self, pair: &'a TradingPair) -> BoxFuture<'a, VenueResult<MarketSpec>>;
}

/// Arc wrapper for AccountAdapter trait objects.
pub type DynAccountAdapter = Arc<dyn AccountAdapter>;

#[derive(Debug, Default)]
struct MockState {
    submits: Vec<OrderRequest>,
    cancels: Vec<CancelRequest>,
    leverage_calls: Vec<u32>,
    open: Vec<VenueOrder>,
    submit_script: VecDeque<VenueResult<SubmitOutcome>>,
    cancel_script: VecDeque<VenueResult<CancelOutcome>>,
    open_orders_failures: VecDeque<VenueError>,
    open_orders_queries: usize,
    next_oid: u64,
}

/// Mock venue for testing.
///
/// Records every call and keeps an open-order book so reconciliation
/// sees what was accepted. Scripted results are consumed first; without
/// one, submits are accepted and cancels of known orders acknowledged.
#[derive(Debug)]
pub struct MockVenue {
    spec: MarketSpec,
    state: Mutex<MockState>,
    account: Mutex<VenueResult<AccountState>>,
    cancel_delay: Mutex<Duration>,
}

impl MockVenue {
    pub fn new(spec: MarketSpec, account: AccountState) -> Self {
        Self {
            spec,
            state: Mutex::new(MockState::default()),
            account: Mutex::new(Ok(account)),
            cancel_delay: Mutex::new(Duration::ZERO),
        }
    }

    pub fn set_account(&self, account: VenueResult<AccountState>) {
        *self.account.lock() = account;
    }

    /// Queue the result of the next submit.
    pub fn push_submit_result(&self, result: VenueResult<SubmitOutcome>) {
        self.state.lock().submit_script.push_back(result);
    }

    /// Queue the result of the next cancel.
    pub fn push_cancel_result(&self, result: VenueResult<CancelOutcome>) {
        self.state.lock().cancel_script.push_back(result);
    }

    /// Fail the next open-orders query with `error`.
    pub fn push_open_orders_failure(&self, error: VenueError) {
        self.state.lock().open_orders_failures.push_back(error);
    }

    pub fn open_orders_queries(&self) -> usize {
        self.state.lock().open_orders_queries
    }

    /// Delay every cancel response by `delay`.
    pub fn set_cancel_delay(&self, delay: Duration) {
        *self.cancel_delay.lock() = delay;
    }

    /// Put an order on the book that did not come through `submit_order`.
    pub fn seed_open_order(&self, order: VenueOrder) {
        self.state.lock().open.push(order);
    }

    /// Remove an order from the book as if it had fully filled.
    pub fn fill(&self, oid: &str) -> Option<VenueOrder> {
        let mut state = self.state.lock();
        let index = state.open.iter().position(|o| o.oid == oid)?;
        let mut order = state.open.remove(index);
        order.filled = order.size;
        Some(order)
    }

    pub fn submits(&self) -> Vec<OrderRequest> {
        self.state.lock().submits.clone()
    }

    pub fn cancels(&self) -> Vec<CancelRequest> {
        self.state.lock().cancels.clone()
    }

    pub fn leverage_calls(&self) -> Vec<u32> {
        self.state.lock().leverage_calls.clone()
    }

    pub fn open_orders(&self) -> Vec<VenueOrder> {
        self.state.lock().open.clone()
    }
}

impl AccountAdapter for MockVenue {
    fn submit_order(&self, request: OrderRequest) -> BoxFuture<'_, VenueResult<SubmitOutcome>> {
        Box::pin(async move {
            let mut state = self.state.lock();
            state.submits.push(request.clone());
            let result = match state.submit_script.pop_front() {
                Some(result) => result,
                None => {
                    state.next_oid += 1;
                    Ok(SubmitOutcome::Accepted {
                        oid: state.next_oid.to_string(),
                    })
                }
            };
            if let Ok(SubmitOutcome::Accepted { oid }) = &result {
                state.open.push(VenueOrder {
                    oid: oid.clone(),
                    cloid: Some(request.cloid.clone()),
                    side: request.side,
                    price: request.price,
                    size: request.size,
                    filled: Size::ZERO,
                });
            }
            result
        })
    }

    fn cancel_order(&self, request: CancelRequest) -> BoxFuture<'_, VenueResult<CancelOutcome>> {
        Box::pin(async move {
            let delay = *self.cancel_delay.lock();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let mut state = self.state.lock();
            state.cancels.push(request.clone());
            if let Some(result) = state.cancel_script.pop_front() {
                return result;
            }
            match state.open.iter().position(|o| o.oid == request.oid) {
                Some(index) => {
                    state.open.remove(index);
                    Ok(CancelOutcome::Ack)
                }
                None => Ok(CancelOutcome::NotFound),
            }
        })
    }

    fn query_open_orders<'a>(
        &'a self,
        _pair: &'a TradingPair,
    ) -> BoxFuture<'a, VenueResult<Vec<VenueOrder>>> {
        Box::pin(async move {
            let mut state = self.state.lock();
            state.open_orders_queries += 1;
            match state.open_orders_failures.pop_front() {
                Some(error) => Err(error),
                None => Ok(state.open.clone()),
            }
        })
    }

    fn query_account<'a>(
        &'a self,
        _pair: &'a TradingPair,
    ) -> BoxFuture<'a, VenueResult<AccountState>> {
        Box::pin(async move { self.account.lock().clone() })
    }

    fn set_leverage<'a>(
        &'a self,
        _pair: &'a TradingPair,
        leverage: u32,
    ) -> BoxFuture<'a, VenueResult<()>> {
        Box::pin(async move {
            self.state.lock().leverage_calls.push(leverage);
            Ok(())
        })
    }

    fn market_spec<'a>(&'a self, pair: &'a TradingPair) -> BoxFuture<'a, VenueResult<MarketSpec>> {
        Box::pin(async move {
            if *pair != self.spec.pair {
                return Err(VenueError::Fatal(format!("unknown market {pair}")));
            }
            Ok(self.spec.clone())
        })
    }
}
