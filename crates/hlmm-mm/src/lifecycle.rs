//! Order lifecycle management.
//!
//! Owns the mapping between the desired quote on each side and the order
//! actually resting on the venue. Every input returns the venue requests
//! the caller has to perform; nothing in here does I/O.
//!
//! Per side:
//! - at most one tracked order; nothing is submitted while that order or
//!   any orphan on the side is still live (cancel-then-place)
//! - at most one submission per generation
//! - each venue trade moves the position exactly once

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use hlmm_core::{
    AccountEvent, CancelRequest, ClientOrderId, Order, OrderRecord, OrderRequest, OrderState,
    Price, Quote, Side, Size, VenueOrder,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::MakerConfig;
use crate::inventory::Inventory;
use crate::risk::RiskVerdict;

/// Terminal orders kept for the snapshot.
pub const HISTORY_LEN: usize = 64;
const TRADE_ID_MEMORY: usize = 4096;

/// Why the local view is being resynchronized with the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReconcileReason {
    Startup,
    RequestTimeout,
    CancelNotFound,
    UnknownOrder,
    Operator,
}

impl ReconcileReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::RequestTimeout => "request_timeout",
            Self::CancelNotFound => "cancel_not_found",
            Self::UnknownOrder => "unknown_order",
            Self::Operator => "operator",
        }
    }
}

impl fmt::Display for ReconcileReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Venue work requested by the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleAction {
    Submit(OrderRequest),
    Cancel(CancelRequest),
    /// Query open orders and feed them to [`LifecycleManager::reconcile`].
    Reconcile(ReconcileReason),
}

/// A fill that was applied to the inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedFill {
    pub side: Side,
    pub price: Price,
    pub size: Size,
    pub cloid: Option<ClientOrderId>,
    /// The fill completed its order.
    pub order_complete: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventOutcome {
    pub actions: Vec<LifecycleAction>,
    pub fill: Option<AppliedFill>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub actions: Vec<LifecycleAction>,
    /// Tracked orders the venue no longer has.
    pub dropped: usize,
    /// Untracked strategy orders found on the venue.
    pub adopted: usize,
    /// Tracked orders confirmed by the venue.
    pub refreshed: usize,
}

impl ReconcileOutcome {
    pub fn is_mismatch(&self) -> bool {
        self.dropped > 0 || self.adopted > 0
    }
}

/// Read-only view of the manager.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleSnapshot {
    pub bid: Option<Order>,
    pub ask: Option<Order>,
    /// Orders being cancelled outside the per-side slot.
    pub orphans: Vec<Order>,
    pub generation: u64,
    pub recent_terminal: Vec<OrderRecord>,
    pub submits_enabled: bool,
    pub reconcile_in_flight: bool,
    /// A reconciliation failed and has not yet succeeded.
    pub reconcile_owed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Primary,
    Orphan(usize),
}

#[derive(Debug, Default)]
struct SideBook {
    order: Option<Order>,
    orphans: Vec<Order>,
    desired: Option<Quote>,
    last_submitted_generation: Option<u64>,
}

impl SideBook {
    fn is_quiet(&self) -> bool {
        self.order.is_none() && self.orphans.is_empty()
    }
}

/// Per-side order state machine.
#[derive(Debug)]
pub struct LifecycleManager {
    config: MakerConfig,
    bid: SideBook,
    ask: SideBook,
    generation: u64,
    submits_enabled: bool,
    reconcile_in_flight: bool,
    /// Set by a failed query; submits stay blocked until a retry succeeds.
    reconcile_owed: Option<ReconcileReason>,
    seen_trades: HashSet<String>,
    seen_trade_order: VecDeque<String>,
    /// Fills for oids not yet acknowledged, already applied to inventory.
    unmatched_fills: HashMap<String, Size>,
    history: VecDeque<OrderRecord>,
    newly_terminal: Vec<OrderRecord>,
}

impl LifecycleManager {
    pub fn new(config: MakerConfig) -> Self {
        Self {
            config,
            bid: SideBook::default(),
            ask: SideBook::default(),
            generation: 0,
            submits_enabled: true,
            reconcile_in_flight: false,
            reconcile_owed: None,
            seen_trades: HashSet::new(),
            seen_trade_order: VecDeque::new(),
            unmatched_fills: HashMap::new(),
            history: VecDeque::with_capacity(HISTORY_LEN),
            newly_terminal: Vec::new(),
        }
    }

    pub fn config(&self) -> &MakerConfig {
        &self.config
    }

    /// Replace the configuration used from the next input on.
    pub fn update_config(&mut self, config: MakerConfig) {
        self.config = config;
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Start a refresh cycle and return its generation.
    pub fn begin_cycle(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Diff the risk-approved targets against the tracked orders.
    pub fn on_cycle(&mut self, verdict: &RiskVerdict, now_ms: u64) -> Vec<LifecycleAction> {
        let mut actions = Vec::new();

        for side in Side::BOTH {
            let target = verdict.get(side).cloned();
            let replace = match &self.book(side).order {
                Some(order)
                    if matches!(
                        order.state,
                        OrderState::Pending | OrderState::Open | OrderState::PartiallyFilled
                    ) =>
                {
                    replace_reason(&self.config, order, target.as_ref(), now_ms)
                }
                _ => None,
            };
            self.book_mut(side).desired = target;

            if let Some(reason) = replace {
                actions.extend(self.cancel_tracked(side, now_ms, reason));
            }
            actions.extend(self.try_submit(side, now_ms));
        }

        actions
    }

    /// Cancel orders older than `max_order_age`. Never submits.
    pub fn on_age_check(&mut self, now_ms: u64) -> Vec<LifecycleAction> {
        let max_age = self.config.max_order_age_ms();
        let mut actions = Vec::new();

        for side in Side::BOTH {
            let expired = self.book(side).order.as_ref().is_some_and(|o| {
                o.state != OrderState::Cancelling && o.age_ms(now_ms) > max_age
            });
            if expired {
                actions.extend(self.cancel_tracked(side, now_ms, "max order age"));
            }
        }

        actions
    }

    /// Flag requests that have gone unacknowledged for too long and retry
    /// a failed reconciliation.
    pub fn check_timeouts(&mut self, now_ms: u64) -> Vec<LifecycleAction> {
        if let Some(reason) = self.reconcile_owed {
            return self.request_reconcile(reason);
        }

        let ack_timeout = self.config.ack_timeout_ms;
        let stuck = Side::BOTH.iter().find_map(|side| {
            let book = self.book(*side);
            book.order
                .iter()
                .chain(book.orphans.iter())
                .find(|o| {
                    matches!(o.state, OrderState::Pending | OrderState::Cancelling)
                        && now_ms.saturating_sub(o.last_request_ms) > ack_timeout
                })
                .map(|o| (o.cloid.clone(), o.state))
        });

        match stuck {
            Some((cloid, state)) if !self.reconcile_in_flight => {
                warn!(
                    %cloid,
                    state = state.as_str(),
                    ack_timeout_ms = ack_timeout,
                    "Request unacknowledged, reconciling"
                );
                self.request_reconcile(ReconcileReason::RequestTimeout)
            }
            _ => Vec::new(),
        }
    }

    pub fn on_submit_accepted(
        &mut self,
        request: &OrderRequest,
        oid: String,
        now_ms: u64,
    ) -> Vec<LifecycleAction> {
        let side = request.side;
        let prefilled = self.unmatched_fills.remove(&oid).unwrap_or(Size::ZERO);
        let tracked = self
            .book(side)
            .order
            .as_ref()
            .is_some_and(|o| o.cloid == request.cloid);

        if !tracked {
            if self.locate_oid(&oid).is_some() {
                debug!(%oid, "Acknowledgement for an order already being cancelled");
                return Vec::new();
            }
            // The venue has an order we no longer want: cancel it.
            let mut order = Order::from_request(request, now_ms);
            order.oid = Some(oid.clone());
            order.filled = prefilled.min(order.size);
            if order.filled >= order.size {
                order.state = OrderState::Filled;
                self.record_terminal(order, "filled before acknowledgement", now_ms);
                return Vec::new();
            }
            warn!(
                cloid = %request.cloid,
                %oid,
                generation = request.generation,
                current_generation = self.generation,
                "Late acknowledgement for untracked order, cancelling"
            );
            order.state = OrderState::Cancelling;
            let cancel = CancelRequest {
                cloid: order.cloid.clone(),
                oid,
                side,
            };
            self.book_mut(side).orphans.push(order);
            return vec![LifecycleAction::Cancel(cancel)];
        }

        let Some(order) = self.book_mut(side).order.as_mut() else {
            return Vec::new();
        };
        order.oid = Some(oid.clone());
        order.filled = (order.filled + prefilled).min(order.size);

        if order.filled >= order.size {
            if let Some(mut order) = self.book_mut(side).order.take() {
                order.state = OrderState::Filled;
                self.record_terminal(order, "filled before acknowledgement", now_ms);
            }
            return Vec::new();
        }

        match order.state {
            OrderState::Pending => {
                order.state = if order.filled.is_positive() {
                    OrderState::PartiallyFilled
                } else {
                    OrderState::Open
                };
                debug!(cloid = %order.cloid, %oid, %side, "Order resting");
                Vec::new()
            }
            OrderState::Cancelling => {
                // Cancel was deferred until the oid was known.
                order.last_request_ms = now_ms;
                vec![LifecycleAction::Cancel(CancelRequest {
                    cloid: order.cloid.clone(),
                    oid,
                    side,
                })]
            }
            _ => Vec::new(),
        }
    }

    /// The venue declined the submission. The side stays empty until the
    /// next cycle.
    pub fn on_submit_rejected(&mut self, request: &OrderRequest, reason: &str, now_ms: u64) {
        let side = request.side;
        let tracked = self
            .book(side)
            .order
            .as_ref()
            .is_some_and(|o| o.cloid == request.cloid);
        if !tracked {
            debug!(cloid = %request.cloid, "Rejection for untracked order ignored");
            return;
        }
        if let Some(mut order) = self.book_mut(side).order.take() {
            order.state = OrderState::Rejected;
            self.record_terminal(order, format!("rejected: {reason}"), now_ms);
        }
    }

    /// A request exhausted its retries. Whether it reached the venue is
    /// unknown.
    pub fn on_request_failed(&mut self) -> Vec<LifecycleAction> {
        self.request_reconcile(ReconcileReason::RequestTimeout)
    }

    pub fn on_cancel_ack(&mut self, request: &CancelRequest, now_ms: u64) -> Vec<LifecycleAction> {
        self.confirm_cancelled(&request.oid, "cancel acknowledged", now_ms)
    }

    /// The venue does not know the order: it may have filled or been
    /// cancelled already.
    pub fn on_cancel_not_found(&mut self, request: &CancelRequest) -> Vec<LifecycleAction> {
        if self.locate_oid(&request.oid).is_none() {
            return Vec::new();
        }
        self.request_reconcile(ReconcileReason::CancelNotFound)
    }

    /// Apply an unsolicited account event.
    pub fn on_event(
        &mut self,
        event: &AccountEvent,
        inventory: &mut Inventory,
        now_ms: u64,
    ) -> EventOutcome {
        match event {
            AccountEvent::Fill {
                oid,
                trade_id,
                side,
                filled_size,
                filled_price,
            } => self.on_fill(
                oid,
                trade_id.as_deref(),
                *side,
                *filled_size,
                *filled_price,
                inventory,
                now_ms,
            ),
            AccountEvent::OrderCancelled { oid } => EventOutcome {
                actions: self.confirm_cancelled(oid, "cancelled by venue", now_ms),
                fill: None,
            },
            AccountEvent::OrderRejected { oid, reason } => {
                if let Some((side, slot)) = self.locate_oid(oid) {
                    if let Some(mut order) = self.take_order(side, slot) {
                        warn!(%oid, %side, %reason, "Order rejected by venue");
                        order.state = OrderState::Rejected;
                        self.record_terminal(order, format!("rejected: {reason}"), now_ms);
                    }
                }
                EventOutcome::default()
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn on_fill(
        &mut self,
        oid: &str,
        trade_id: Option<&str>,
        event_side: Side,
        size: Size,
        price: Price,
        inventory: &mut Inventory,
        now_ms: u64,
    ) -> EventOutcome {
        if let Some(id) = trade_id {
            if !self.remember_trade(id) {
                debug!(%oid, trade_id = id, "Duplicate fill ignored");
                return EventOutcome::default();
            }
        }

        let located = self.locate_oid(oid);
        let side = located.map(|(s, _)| s).unwrap_or(event_side);
        inventory.record_fill(side, price, size);

        // The filled side waits for a target sized against the new position.
        self.book_mut(side).desired = None;

        let mut fill = AppliedFill {
            side,
            price,
            size,
            cloid: None,
            order_complete: false,
        };
        let mut actions = Vec::new();

        match located {
            Some((side, slot)) => {
                let complete = match self.order_mut(side, slot) {
                    Some(order) => {
                        order.filled = (order.filled + size).min(order.size);
                        fill.cloid = Some(order.cloid.clone());
                        if order.filled < order.size && order.state == OrderState::Open {
                            order.state = OrderState::PartiallyFilled;
                        }
                        order.filled >= order.size
                    }
                    None => false,
                };
                if complete {
                    fill.order_complete = true;
                    if let Some(mut order) = self.take_order(side, slot) {
                        order.state = OrderState::Filled;
                        self.record_terminal(order, "filled", now_ms);
                    }
                }
            }
            None => {
                let closed = self
                    .history
                    .iter_mut()
                    .rev()
                    .find(|r| r.oid.as_deref() == Some(oid));
                if let Some(record) = closed {
                    record.filled = (record.filled + size).min(record.size);
                    fill.cloid = Some(record.cloid.clone());
                    debug!(%oid, "Late fill for closed order");
                } else {
                    let pending = self.unmatched_fills.entry(oid.to_string()).or_default();
                    *pending = *pending + size;
                    let awaiting_ack = self
                        .book(side)
                        .order
                        .as_ref()
                        .is_some_and(|o| o.oid.is_none());
                    if !awaiting_ack {
                        warn!(%oid, %side, "Fill for unknown order");
                        actions.extend(self.request_reconcile(ReconcileReason::UnknownOrder));
                    }
                }
            }
        }

        EventOutcome {
            actions,
            fill: Some(fill),
        }
    }

    /// Ask for a reconciliation unless one is already pending.
    pub fn request_reconcile(&mut self, reason: ReconcileReason) -> Vec<LifecycleAction> {
        if self.reconcile_in_flight {
            return Vec::new();
        }
        self.reconcile_in_flight = true;
        info!(%reason, "Reconciliation requested");
        vec![LifecycleAction::Reconcile(reason)]
    }

    /// The open-orders query failed. Submits stay blocked and the next
    /// `check_timeouts` re-issues the query with the same reason.
    pub fn on_reconcile_failed(&mut self, reason: ReconcileReason) {
        self.reconcile_in_flight = false;
        self.reconcile_owed = Some(reason);
    }

    /// Replace the local view with the venue's open orders.
    ///
    /// Tracked orders the venue does not list are dropped. Tracked orders
    /// it does list are refreshed. Untracked orders carrying the strategy
    /// tag are adopted and cancelled. Other orders are left alone.
    pub fn reconcile(&mut self, venue_orders: &[VenueOrder], now_ms: u64) -> ReconcileOutcome {
        self.reconcile_in_flight = false;
        self.reconcile_owed = None;
        let ack_timeout = self.config.ack_timeout_ms;
        let mut outcome = ReconcileOutcome::default();
        let mut matched: HashSet<&str> = HashSet::new();

        for side in Side::BOTH {
            let book = self.book_mut(side);
            let primary = book.order.take();
            let orphans = std::mem::take(&mut book.orphans);

            let mut kept_primary = None;
            let mut kept_orphans = Vec::new();
            let tracked = primary
                .map(|o| (true, o))
                .into_iter()
                .chain(orphans.into_iter().map(|o| (false, o)));

            for (is_primary, mut order) in tracked {
                let found = venue_orders.iter().find(|v| {
                    order.oid.as_deref() == Some(v.oid.as_str())
                        || v.cloid.as_ref() == Some(&order.cloid)
                });

                let Some(venue) = found else {
                    outcome.dropped += 1;
                    order.state = OrderState::Cancelled;
                    self.record_terminal(order, "reconciled: not on venue", now_ms);
                    continue;
                };

                matched.insert(venue.oid.as_str());
                outcome.refreshed += 1;
                let oid_was_unknown = order.oid.is_none();
                order.oid = Some(venue.oid.clone());
                order.filled = order.filled.max(venue.filled);

                match order.state {
                    OrderState::Pending | OrderState::Open | OrderState::PartiallyFilled => {
                        order.state = if order.filled.is_positive() {
                            OrderState::PartiallyFilled
                        } else {
                            OrderState::Open
                        };
                    }
                    OrderState::Cancelling => {
                        let stale = now_ms.saturating_sub(order.last_request_ms) > ack_timeout;
                        if oid_was_unknown || stale {
                            order.last_request_ms = now_ms;
                            outcome.actions.push(LifecycleAction::Cancel(CancelRequest {
                                cloid: order.cloid.clone(),
                                oid: venue.oid.clone(),
                                side,
                            }));
                        }
                    }
                    _ => {}
                }

                if is_primary {
                    kept_primary = Some(order);
                } else {
                    kept_orphans.push(order);
                }
            }

            let book = self.book_mut(side);
            book.order = kept_primary;
            book.orphans = kept_orphans;
        }

        let tag = self.config.strategy_tag.clone();
        for venue in venue_orders {
            if matched.contains(venue.oid.as_str()) {
                continue;
            }
            let Some(cloid) = venue.cloid.as_ref().filter(|c| c.has_tag(&tag)) else {
                debug!(oid = %venue.oid, "Ignoring venue order without strategy tag");
                continue;
            };

            warn!(
                oid = %venue.oid,
                %cloid,
                side = %venue.side,
                price = %venue.price,
                "Adopting untracked strategy order for cancellation"
            );
            outcome.adopted += 1;
            outcome.actions.push(LifecycleAction::Cancel(CancelRequest {
                cloid: cloid.clone(),
                oid: venue.oid.clone(),
                side: venue.side,
            }));
            self.book_mut(venue.side).orphans.push(Order {
                cloid: cloid.clone(),
                oid: Some(venue.oid.clone()),
                side: venue.side,
                price: venue.price,
                size: venue.size,
                filled: venue.filled,
                state: OrderState::Cancelling,
                created_at_ms: now_ms,
                generation: 0,
                last_request_ms: now_ms,
            });
        }

        self.unmatched_fills.clear();
        outcome
    }

    /// Cancel everything and stop submitting.
    pub fn cancel_all(&mut self, now_ms: u64) -> Vec<LifecycleAction> {
        self.submits_enabled = false;
        let mut actions = Vec::new();
        for side in Side::BOTH {
            self.book_mut(side).desired = None;
            let cancellable = self
                .book(side)
                .order
                .as_ref()
                .is_some_and(|o| o.state != OrderState::Cancelling);
            if cancellable {
                actions.extend(self.cancel_tracked(side, now_ms, "stop"));
            }
        }
        actions
    }

    /// Drop every live order from tracking. Returns what was abandoned.
    pub fn abandon_all(&mut self, now_ms: u64) -> Vec<Order> {
        let mut abandoned = Vec::new();
        for side in Side::BOTH {
            let book = self.book_mut(side);
            abandoned.extend(book.order.take());
            abandoned.append(&mut book.orphans);
        }
        for order in &abandoned {
            self.record_terminal(order.clone(), "abandoned at shutdown", now_ms);
        }
        abandoned
    }

    pub fn has_live_orders(&self) -> bool {
        Side::BOTH.iter().any(|s| !self.book(*s).is_quiet())
    }

    pub fn live_orders(&self) -> Vec<Order> {
        Side::BOTH
            .iter()
            .flat_map(|s| {
                let book = self.book(*s);
                book.order.iter().chain(book.orphans.iter()).cloned()
            })
            .collect()
    }

    pub fn order(&self, side: Side) -> Option<&Order> {
        self.book(side).order.as_ref()
    }

    pub fn desired(&self, side: Side) -> Option<&Quote> {
        self.book(side).desired.as_ref()
    }

    pub fn submits_enabled(&self) -> bool {
        self.submits_enabled
    }

    pub fn reconcile_in_flight(&self) -> bool {
        self.reconcile_in_flight
    }

    pub fn reconcile_owed(&self) -> bool {
        self.reconcile_owed.is_some()
    }

    /// Terminal records produced since the last call.
    pub fn take_new_terminal(&mut self) -> Vec<OrderRecord> {
        std::mem::take(&mut self.newly_terminal)
    }

    pub fn snapshot(&self) -> LifecycleSnapshot {
        LifecycleSnapshot {
            bid: self.bid.order.clone(),
            ask: self.ask.order.clone(),
            orphans: self
                .bid
                .orphans
                .iter()
                .chain(self.ask.orphans.iter())
                .cloned()
                .collect(),
            generation: self.generation,
            recent_terminal: self.history.iter().cloned().collect(),
            submits_enabled: self.submits_enabled,
            reconcile_in_flight: self.reconcile_in_flight,
            reconcile_owed: self.reconcile_owed.is_some(),
        }
    }

    // === Private helpers ===

    fn book(&self, side: Side) -> &SideBook {
        match side {
            Side::Bid => &self.bid,
            Side::Ask => &self.ask,
        }
    }

    fn book_mut(&mut self, side: Side) -> &mut SideBook {
        match side {
            Side::Bid => &mut self.bid,
            Side::Ask => &mut self.ask,
        }
    }

    fn locate_oid(&self, oid: &str) -> Option<(Side, Slot)> {
        Side::BOTH.iter().find_map(|side| {
            let book = self.book(*side);
            if book
                .order
                .as_ref()
                .is_some_and(|o| o.oid.as_deref() == Some(oid))
            {
                return Some((*side, Slot::Primary));
            }
            book.orphans
                .iter()
                .position(|o| o.oid.as_deref() == Some(oid))
                .map(|i| (*side, Slot::Orphan(i)))
        })
    }

    fn order_mut(&mut self, side: Side, slot: Slot) -> Option<&mut Order> {
        let book = self.book_mut(side);
        match slot {
            Slot::Primary => book.order.as_mut(),
            Slot::Orphan(i) => book.orphans.get_mut(i),
        }
    }

    fn take_order(&mut self, side: Side, slot: Slot) -> Option<Order> {
        let book = self.book_mut(side);
        match slot {
            Slot::Primary => book.order.take(),
            Slot::Orphan(i) if i < book.orphans.len() => Some(book.orphans.remove(i)),
            Slot::Orphan(_) => None,
        }
    }

    /// Move the side's order to Cancelling. The request is emitted only
    /// once the venue id is known.
    fn cancel_tracked(&mut self, side: Side, now_ms: u64, reason: &str) -> Option<LifecycleAction> {
        let order = self.book_mut(side).order.as_mut()?;
        order.state = OrderState::Cancelling;
        order.last_request_ms = now_ms;

        match &order.oid {
            Some(oid) => {
                debug!(cloid = %order.cloid, %oid, %side, reason, "Cancelling order");
                Some(LifecycleAction::Cancel(CancelRequest {
                    cloid: order.cloid.clone(),
                    oid: oid.clone(),
                    side,
                }))
            }
            None => {
                debug!(cloid = %order.cloid, %side, reason, "Cancel deferred until acknowledgement");
                None
            }
        }
    }

    fn try_submit(&mut self, side: Side, now_ms: u64) -> Option<LifecycleAction> {
        if !self.submits_enabled || self.reconcile_in_flight || self.reconcile_owed.is_some() {
            return None;
        }
        let generation = self.generation;
        let tag = self.config.strategy_tag.clone();
        let book = self.book_mut(side);
        if !book.is_quiet() {
            return None;
        }
        let quote = book.desired.as_ref()?;
        if quote.generation != generation
            || book
                .last_submitted_generation
                .is_some_and(|g| g >= generation)
        {
            return None;
        }

        let request = OrderRequest {
            cloid: ClientOrderId::new(&tag),
            side,
            price: quote.price,
            size: quote.size,
            generation,
        };
        book.order = Some(Order::from_request(&request, now_ms));
        book.last_submitted_generation = Some(generation);

        debug!(
            cloid = %request.cloid,
            %side,
            price = %request.price,
            size = %request.size,
            generation,
            "Submitting order"
        );
        Some(LifecycleAction::Submit(request))
    }

    fn confirm_cancelled(&mut self, oid: &str, note: &str, now_ms: u64) -> Vec<LifecycleAction> {
        let Some((side, slot)) = self.locate_oid(oid) else {
            debug!(%oid, "Cancel confirmation for untracked order ignored");
            return Vec::new();
        };
        let Some(mut order) = self.take_order(side, slot) else {
            return Vec::new();
        };
        if order.state != OrderState::Cancelling {
            info!(cloid = %order.cloid, %oid, %side, "Order cancelled outside the engine");
        }
        order.state = OrderState::Cancelled;
        self.record_terminal(order, note, now_ms);

        self.try_submit(side, now_ms).into_iter().collect()
    }

    fn record_terminal(&mut self, order: Order, note: impl Into<String>, now_ms: u64) {
        let record = order.to_record(now_ms, note);
        info!(
            cloid = %record.cloid,
            oid = record.oid.as_deref().unwrap_or("-"),
            side = %record.side,
            state = record.state.as_str(),
            filled = %record.filled,
            note = %record.note,
            "Order closed"
        );
        self.newly_terminal.push(record.clone());
        if self.history.len() >= HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back(record);
    }

    fn remember_trade(&mut self, trade_id: &str) -> bool {
        if !self.seen_trades.insert(trade_id.to_string()) {
            return false;
        }
        self.seen_trade_order.push_back(trade_id.to_string());
        if self.seen_trade_order.len() > TRADE_ID_MEMORY {
            if let Some(old) = self.seen_trade_order.pop_front() {
                self.seen_trades.remove(&old);
            }
        }
        true
    }
}

fn replace_reason(
    config: &MakerConfig,
    order: &Order,
    target: Option<&Quote>,
    now_ms: u64,
) -> Option<&'static str> {
    let Some(target) = target else {
        return Some("side vetoed");
    };
    if order.age_ms(now_ms) > config.max_order_age_ms() {
        return Some("max order age");
    }
    if order.size != target.size {
        return Some("size changed");
    }
    let deviation = order
        .price
        .bps_from(target.price)
        .map(|bps| bps.abs())
        .unwrap_or(Decimal::MAX);
    (deviation > config.requote_tolerance_bps).then_some("price moved")
}
