//! Engine task.
//!
//! One task owns the lifecycle manager, the inventory and the active
//! configuration. Scheduler ticks, venue responses, account events and
//! operator commands are handled one at a time in its select loop, so the
//! state machine needs no locks. Venue requests run in spawned tasks and
//! report back over an internal channel.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use hlmm_core::{
    AccountEvent, AccountState, CancelRequest, MarketSpec, OrderRequest, OrderState, TradingPair,
    VenueOrder,
};
use hlmm_feed::{FeedError, ReferencePriceSource};
use hlmm_mm::{
    compute_quotes, Inventory, LifecycleAction, LifecycleManager, MakerConfig, MakerError,
    QuoteVeto, ReconcileReason, RiskGovernor,
};
use hlmm_telemetry::{Metrics, SessionStats};
use parking_lot::RwLock;
use rust_decimal::prelude::ToPrimitive;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::error::{ExecutorError, ExecutorResult};
use crate::handle::{EngineHandle, EngineSnapshot, ErrorRecord, ShutdownReport};
use crate::retry::{with_retry, RetryPolicy};
use crate::scheduler::{Scheduler, Tick};
use crate::venue::{CancelOutcome, DynAccountAdapter, SubmitOutcome};

const COMMAND_CAPACITY: usize = 32;
const RESPONSE_CAPACITY: usize = 256;
/// Errors kept for the snapshot.
pub const ERROR_HISTORY: usize = 32;

/// Messages from [`EngineHandle`].
pub(crate) enum EngineCommand {
    UpdateConfig {
        config: MakerConfig,
        reply: oneshot::Sender<ExecutorResult<()>>,
    },
    ForceReconcile,
    Stop {
        reply: oneshot::Sender<ShutdownReport>,
    },
}

/// Results of spawned venue requests.
enum VenueResponse {
    Account {
        result: ExecutorResult<AccountState>,
    },
    Submitted {
        request: OrderRequest,
        result: ExecutorResult<SubmitOutcome>,
    },
    Cancelled {
        request: CancelRequest,
        result: ExecutorResult<CancelOutcome>,
    },
    OpenOrders {
        reason: ReconcileReason,
        result: ExecutorResult<Vec<VenueOrder>>,
    },
}

struct StopState {
    deadline: Instant,
    replies: Vec<oneshot::Sender<ShutdownReport>>,
}

/// Everything the engine needs from the outside.
pub struct EngineParts {
    pub config: MakerConfig,
    pub venue: DynAccountAdapter,
    pub prices: Arc<dyn ReferencePriceSource>,
    pub events: mpsc::Receiver<AccountEvent>,
    pub clock: Clock,
}

/// Run startup against the venue and spawn the engine task.
///
/// Startup loads the trading rules, sets leverage (a failure is logged
/// and tolerated), seeds the inventory from the account and queues a
/// reconciliation before any order is placed.
///
/// # Errors
/// Invalid configuration, or a venue that cannot report trading rules or
/// the account.
pub async fn start_engine(parts: EngineParts) -> ExecutorResult<(EngineHandle, JoinHandle<()>)> {
    let EngineParts {
        config,
        venue,
        prices,
        events,
        clock,
    } = parts;

    config.validate()?;
    let pair = config.trading_pair.clone();
    let retry = RetryPolicy::from_config(&config);

    let spec = with_retry("market_spec", &retry, || venue.market_spec(&pair)).await?;
    info!(
        %pair,
        tick_size = %spec.tick_size,
        lot_size = %spec.lot_size,
        min_size = %spec.min_size,
        max_leverage = spec.max_leverage,
        "Trading rules loaded"
    );
    check_leverage(&config, &spec)?;

    match with_retry("set_leverage", &retry, || {
        venue.set_leverage(&pair, config.leverage)
    })
    .await
    {
        Ok(()) => info!(leverage = config.leverage, "Leverage set"),
        Err(e) => error!(leverage = config.leverage, error = %e, "Failed to set leverage"),
    }

    info!(
        wallet = config.wallet_address.as_deref().unwrap_or("-"),
        use_vault = config.use_vault,
        "Trading account"
    );

    let account = with_retry("account", &retry, || venue.query_account(&pair)).await?;
    let mut inventory = Inventory::new(config.leverage_decimal());
    let mark = prices
        .reference_price(config.price_type, clock.now_ms(), config.stale_price_ms)
        .ok();
    inventory.seed(account.position_base, config.leverage_decimal(), mark);
    info!(
        position = %account.position_base,
        equity = %account.equity,
        "Inventory seeded from venue"
    );

    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CAPACITY);
    let (results_tx, results_rx) = mpsc::channel(RESPONSE_CAPACITY);
    let snapshot = Arc::new(RwLock::new(EngineSnapshot::new(pair.clone())));

    let mut task = EngineTask {
        stats: SessionStats::new(pair.to_string()),
        pair,
        scheduler: Scheduler::from_config(&config),
        manager: LifecycleManager::new(config.clone()),
        config,
        pending_config: None,
        spec,
        inventory,
        risk: RiskGovernor,
        account,
        prices,
        venue,
        clock,
        retry,
        events_rx: events,
        events_open: true,
        cmd_rx,
        cmd_open: true,
        results_tx,
        results_rx,
        account_in_flight: false,
        startup_reconciled: false,
        last_cycle_ms: None,
        last_vetoes: Vec::new(),
        recent_errors: VecDeque::with_capacity(ERROR_HISTORY),
        running: true,
        stop: None,
        snapshot: Arc::clone(&snapshot),
    };

    let actions = task.manager.request_reconcile(ReconcileReason::Startup);
    task.dispatch(actions);
    task.publish();

    let handle = EngineHandle::new(cmd_tx, snapshot);
    let join = tokio::spawn(task.run());
    Ok((handle, join))
}

fn check_leverage(config: &MakerConfig, spec: &MarketSpec) -> ExecutorResult<()> {
    if config.leverage > spec.max_leverage {
        return Err(MakerError::ConfigInvalid(format!(
            "leverage {} exceeds venue maximum {}",
            config.leverage, spec.max_leverage
        ))
        .into());
    }
    Ok(())
}

struct EngineTask {
    pair: TradingPair,
    config: MakerConfig,
    /// Accepted update, applied at the start of the next cycle.
    pending_config: Option<MakerConfig>,
    spec: MarketSpec,
    manager: LifecycleManager,
    inventory: Inventory,
    risk: RiskGovernor,
    account: AccountState,
    prices: Arc<dyn ReferencePriceSource>,
    venue: DynAccountAdapter,
    clock: Clock,
    scheduler: Scheduler,
    retry: RetryPolicy,
    events_rx: mpsc::Receiver<AccountEvent>,
    events_open: bool,
    cmd_rx: mpsc::Receiver<EngineCommand>,
    cmd_open: bool,
    results_tx: mpsc::Sender<VenueResponse>,
    results_rx: mpsc::Receiver<VenueResponse>,
    account_in_flight: bool,
    /// Quoting starts only once the venue's open orders are known.
    startup_reconciled: bool,
    last_cycle_ms: Option<u64>,
    last_vetoes: Vec<QuoteVeto>,
    recent_errors: VecDeque<ErrorRecord>,
    stats: SessionStats,
    running: bool,
    stop: Option<StopState>,
    snapshot: Arc<RwLock<EngineSnapshot>>,
}

impl EngineTask {
    async fn run(mut self) {
        info!(pair = %self.pair, "Engine started");

        loop {
            let grace_deadline = self
                .stop
                .as_ref()
                .map(|s| s.deadline)
                .unwrap_or_else(Instant::now);
            let stopping = self.stop.is_some();

            tokio::select! {
                biased;

                Some(response) = self.results_rx.recv() => self.handle_response(response),

                event = self.events_rx.recv(), if self.events_open => match event {
                    Some(event) => self.handle_event(event),
                    None => {
                        warn!("Account event stream closed");
                        self.events_open = false;
                    }
                },

                command = self.cmd_rx.recv(), if self.cmd_open => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        info!("All engine handles dropped, stopping");
                        self.cmd_open = false;
                        self.begin_stop(None);
                    }
                },

                tick = self.scheduler.next() => self.handle_tick(tick),

                () = tokio::time::sleep_until(grace_deadline), if stopping => {
                    warn!(
                        grace_ms = self.config.shutdown_grace_ms,
                        live_orders = self.manager.live_orders().len(),
                        "Shutdown grace period elapsed"
                    );
                    break;
                }
            }

            self.after_message();
            if self.stop.is_some() && !self.manager.has_live_orders() {
                break;
            }
        }

        self.finish();
    }

    fn handle_tick(&mut self, tick: Tick) {
        let now = self.clock.now_ms();
        match tick {
            Tick::Refresh => {
                if self.stop.is_none() {
                    self.request_cycle();
                }
            }
            Tick::AgeCheck => {
                let mut actions = if self.stop.is_none() {
                    self.manager.on_age_check(now)
                } else {
                    Vec::new()
                };
                actions.extend(self.manager.check_timeouts(now));
                self.dispatch(actions);
            }
        }
    }

    /// Fetch the account; the cycle runs when it arrives.
    fn request_cycle(&mut self) {
        if !self.startup_reconciled {
            debug!("Startup reconciliation pending, skipping refresh");
            Metrics::cycle_skipped("awaiting_reconcile");
            return;
        }
        if self.account_in_flight {
            debug!("Account query still in flight, skipping refresh");
            Metrics::cycle_skipped("account_in_flight");
            return;
        }
        self.account_in_flight = true;

        let venue = Arc::clone(&self.venue);
        let tx = self.results_tx.clone();
        let pair = self.pair.clone();
        let policy = self.retry;
        tokio::spawn(async move {
            let result = with_retry("account", &policy, || venue.query_account(&pair)).await;
            let _ = tx.send(VenueResponse::Account { result }).await;
        });
    }

    fn run_cycle(&mut self, now: u64) {
        if let Some(config) = self.pending_config.take() {
            self.apply_config(config);
        }

        let generation = self.manager.begin_cycle();
        self.last_cycle_ms = Some(now);

        let reference = match self.prices.reference_price(
            self.config.price_type,
            now,
            self.config.stale_price_ms,
        ) {
            Ok(price) => price,
            Err(e) => {
                let reason = match e {
                    FeedError::Stale { .. } => "stale_price",
                    _ => "price_unavailable",
                };
                debug!(generation, error = %e, "Skipping cycle: no usable reference price");
                Metrics::cycle_skipped(reason);
                let err = MakerError::InvalidReferencePrice(e.to_string());
                self.record_error(now, err.kind(), err.to_string());
                return;
            }
        };

        let quotes = match compute_quotes(reference, &self.config, &self.spec, generation) {
            Ok(quotes) => quotes,
            Err(e) => {
                debug!(generation, %reference, error = %e, "Skipping cycle: no valid quotes");
                Metrics::cycle_skipped(e.kind());
                self.record_error(now, e.kind(), e.to_string());
                return;
            }
        };

        let verdict = self.risk.evaluate(
            self.inventory.position(),
            &self.account,
            reference,
            &quotes,
            &self.config,
            &self.spec,
        );
        for veto in &verdict.vetoes {
            Metrics::veto(&veto.side.to_string(), veto.reason.as_str());
            info!(
                side = %veto.side,
                reason = %veto.reason,
                detail = %veto.detail,
                generation,
                "Quote vetoed"
            );
        }
        self.last_vetoes = verdict.vetoes.clone();

        debug!(
            generation,
            %reference,
            bid = ?verdict.bid.as_ref().map(|q| q.price.to_string()),
            ask = ?verdict.ask.as_ref().map(|q| q.price.to_string()),
            "Refresh cycle"
        );
        let actions = self.manager.on_cycle(&verdict, now);
        self.dispatch(actions);
        Metrics::cycle_completed();
    }

    fn handle_response(&mut self, response: VenueResponse) {
        let now = self.clock.now_ms();
        match response {
            VenueResponse::Account { result } => {
                self.account_in_flight = false;
                match result {
                    Ok(account) => {
                        self.account = account;
                        if self.stop.is_none() {
                            self.run_cycle(now);
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Account query failed, skipping cycle");
                        Metrics::cycle_skipped("account_unavailable");
                        self.record_error(now, e.kind(), e.to_string());
                    }
                }
            }
            VenueResponse::Submitted { request, result } => match result {
                Ok(SubmitOutcome::Accepted { oid }) => {
                    debug!(cloid = %request.cloid, %oid, side = %request.side, "Order accepted");
                    let actions = self.manager.on_submit_accepted(&request, oid, now);
                    self.dispatch(actions);
                }
                Ok(SubmitOutcome::Rejected { reason }) => self.on_rejected(&request, reason, now),
                Err(ExecutorError::Venue(e)) => self.on_rejected(&request, e.to_string(), now),
                Err(e) => self.on_request_failed("submit", &e, now),
            },
            VenueResponse::Cancelled { request, result } => match result {
                Ok(CancelOutcome::Ack) => {
                    let actions = self.manager.on_cancel_ack(&request, now);
                    self.dispatch(actions);
                }
                Ok(CancelOutcome::NotFound) => {
                    debug!(cloid = %request.cloid, oid = %request.oid, "Cancel target not found");
                    let actions = self.manager.on_cancel_not_found(&request);
                    self.dispatch(actions);
                }
                Err(e) => self.on_request_failed("cancel", &e, now),
            },
            VenueResponse::OpenOrders { reason, result } => match result {
                Ok(orders) => self.apply_reconcile(reason, &orders, now),
                Err(e) => {
                    error!(%reason, error = %e, "Open-orders query failed");
                    self.manager.on_reconcile_failed(reason);
                    self.record_error(now, e.kind(), e.to_string());
                }
            },
        }
    }

    fn on_rejected(&mut self, request: &OrderRequest, reason: String, now: u64) {
        let err = MakerError::OrderRejected {
            side: request.side,
            reason: reason.clone(),
        };
        warn!(
            cloid = %request.cloid,
            side = %request.side,
            price = %request.price,
            %reason,
            "Order rejected"
        );
        self.record_error(now, err.kind(), err.to_string());
        self.manager.on_submit_rejected(request, &reason, now);
    }

    fn on_request_failed(&mut self, request: &'static str, error: &ExecutorError, now: u64) {
        let err = MakerError::RequestTimeout(format!("{request}: {error}"));
        warn!(request, %error, "Venue request outcome unknown, reconciling");
        self.record_error(now, err.kind(), err.to_string());
        let actions = self.manager.on_request_failed();
        self.dispatch(actions);
    }

    fn apply_reconcile(&mut self, reason: ReconcileReason, orders: &[VenueOrder], now: u64) {
        let outcome = self.manager.reconcile(orders, now);
        info!(
            %reason,
            venue_orders = orders.len(),
            dropped = outcome.dropped,
            adopted = outcome.adopted,
            refreshed = outcome.refreshed,
            "Reconciled with venue"
        );
        if outcome.is_mismatch() {
            Metrics::reconcile_mismatch();
            let err = MakerError::ReconciliationMismatch(format!(
                "{} dropped, {} adopted",
                outcome.dropped, outcome.adopted
            ));
            warn!(%reason, error = %err, "Local order view replaced by venue state");
            self.record_error(now, err.kind(), err.to_string());
        }
        self.dispatch(outcome.actions);

        if reason == ReconcileReason::Startup && !self.startup_reconciled {
            self.startup_reconciled = true;
            if self.stop.is_none() {
                self.request_cycle();
            }
        }
    }

    fn handle_event(&mut self, event: AccountEvent) {
        let now = self.clock.now_ms();
        let outcome = self.manager.on_event(&event, &mut self.inventory, now);

        if let Some(fill) = outcome.fill {
            self.stats.record_fill(fill.side, fill.price, fill.size);
            self.stats.set_realized_pnl(self.inventory.realized_pnl());
            Metrics::fill(&fill.side.to_string());

            let position = self.inventory.position();
            info!(
                side = %fill.side,
                price = %fill.price,
                size = %fill.size,
                cloid = fill.cloid.as_ref().map(|c| c.as_str()).unwrap_or("-"),
                order_complete = fill.order_complete,
                "Fill"
            );
            info!(
                direction = position.direction(),
                amount = %position.base_amount.abs(),
                entry = %self.inventory.avg_entry(),
                leverage = %position.leverage,
                realized_pnl = %self.inventory.realized_pnl(),
                "Position"
            );
        }

        self.dispatch(outcome.actions);
    }

    fn handle_command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::UpdateConfig { config, reply } => {
                let result = self.stage_config(config);
                if let Err(e) = &result {
                    warn!(error = %e, "Configuration update rejected");
                }
                let _ = reply.send(result);
            }
            EngineCommand::ForceReconcile => {
                info!("Operator requested reconciliation");
                let actions = self.manager.request_reconcile(ReconcileReason::Operator);
                self.dispatch(actions);
            }
            EngineCommand::Stop { reply } => self.begin_stop(Some(reply)),
        }
    }

    fn stage_config(&mut self, config: MakerConfig) -> ExecutorResult<()> {
        config.validate()?;
        if config.trading_pair != self.pair {
            return Err(MakerError::ConfigInvalid(format!(
                "trading_pair cannot change while running ({} -> {})",
                self.pair, config.trading_pair
            ))
            .into());
        }
        check_leverage(&config, &self.spec)?;
        info!("Configuration accepted, applying from next cycle");
        self.pending_config = Some(config);
        Ok(())
    }

    fn apply_config(&mut self, config: MakerConfig) {
        let reschedule = config.refresh_interval_secs != self.config.refresh_interval_secs
            || config.age_check_interval_ms != self.config.age_check_interval_ms;
        let leverage_changed = config.leverage != self.config.leverage;

        self.manager.update_config(config.clone());
        self.inventory.set_leverage(config.leverage_decimal());
        self.retry = RetryPolicy::from_config(&config);
        if reschedule {
            self.scheduler = Scheduler::from_config(&config);
        }
        if leverage_changed {
            self.spawn_set_leverage(config.leverage);
        }
        self.config = config;
        info!(
            bid_spread = %self.config.bid_spread,
            ask_spread = %self.config.ask_spread,
            order_amount = %self.config.order_amount,
            leverage = self.config.leverage,
            "Configuration applied"
        );
    }

    fn begin_stop(&mut self, reply: Option<oneshot::Sender<ShutdownReport>>) {
        if let Some(stop) = self.stop.as_mut() {
            stop.replies.extend(reply);
            return;
        }

        let now = self.clock.now_ms();
        info!(
            live_orders = self.manager.live_orders().len(),
            grace_ms = self.config.shutdown_grace_ms,
            "Stopping: cancelling all orders"
        );
        let actions = self.manager.cancel_all(now);
        self.stop = Some(StopState {
            deadline: Instant::now() + Duration::from_millis(self.config.shutdown_grace_ms),
            replies: reply.into_iter().collect(),
        });
        self.dispatch(actions);
    }

    fn finish(mut self) {
        let now = self.clock.now_ms();
        let abandoned = self.manager.abandon_all(now);
        for order in &abandoned {
            error!(
                cloid = %order.cloid,
                oid = order.oid.as_deref().unwrap_or("-"),
                side = %order.side,
                price = %order.price,
                size = %order.size,
                state = order.state.as_str(),
                "Order abandoned at shutdown, it may still rest on the venue"
            );
        }

        self.running = false;
        self.after_message();

        let report = ShutdownReport {
            abandoned,
            position: self.inventory.position().clone(),
            realized_pnl: self.inventory.realized_pnl(),
            stats: self.stats.clone(),
        };
        info!(
            clean = report.is_clean(),
            abandoned = report.abandoned.len(),
            position = %report.position.base_amount,
            "Engine stopped"
        );

        if let Some(stop) = self.stop.take() {
            for reply in stop.replies {
                let _ = reply.send(report.clone());
            }
        }
    }

    fn dispatch(&mut self, actions: Vec<LifecycleAction>) {
        for action in actions {
            match action {
                LifecycleAction::Submit(request) => {
                    Metrics::order_submitted(&request.side.to_string());
                    self.stats.record_order_created();
                    info!(
                        cloid = %request.cloid,
                        side = %request.side,
                        price = %request.price,
                        size = %request.size,
                        generation = request.generation,
                        "Placing order"
                    );
                    self.spawn_submit(request);
                }
                LifecycleAction::Cancel(request) => {
                    Metrics::cancel_sent(&request.side.to_string());
                    debug!(
                        cloid = %request.cloid,
                        oid = %request.oid,
                        side = %request.side,
                        "Cancelling order"
                    );
                    self.spawn_cancel(request);
                }
                LifecycleAction::Reconcile(reason) => {
                    Metrics::reconciliation(reason.as_str());
                    self.spawn_reconcile(reason);
                }
            }
        }
    }

    fn spawn_submit(&self, request: OrderRequest) {
        let venue = Arc::clone(&self.venue);
        let tx = self.results_tx.clone();
        let policy = self.retry;
        tokio::spawn(async move {
            let result = with_retry("submit", &policy, || venue.submit_order(request.clone())).await;
            let _ = tx.send(VenueResponse::Submitted { request, result }).await;
        });
    }

    fn spawn_cancel(&self, request: CancelRequest) {
        let venue = Arc::clone(&self.venue);
        let tx = self.results_tx.clone();
        let policy = self.retry;
        tokio::spawn(async move {
            let result = with_retry("cancel", &policy, || venue.cancel_order(request.clone())).await;
            let _ = tx.send(VenueResponse::Cancelled { request, result }).await;
        });
    }

    fn spawn_reconcile(&self, reason: ReconcileReason) {
        let venue = Arc::clone(&self.venue);
        let tx = self.results_tx.clone();
        let pair = self.pair.clone();
        let policy = self.retry;
        tokio::spawn(async move {
            let result =
                with_retry("open_orders", &policy, || venue.query_open_orders(&pair)).await;
            let _ = tx.send(VenueResponse::OpenOrders { reason, result }).await;
        });
    }

    fn spawn_set_leverage(&self, leverage: u32) {
        let venue = Arc::clone(&self.venue);
        let pair = self.pair.clone();
        let policy = self.retry;
        tokio::spawn(async move {
            match with_retry("set_leverage", &policy, || venue.set_leverage(&pair, leverage)).await
            {
                Ok(()) => info!(leverage, "Leverage updated"),
                Err(e) => error!(leverage, error = %e, "Failed to update leverage"),
            }
        });
    }

    fn record_error(&mut self, at_ms: u64, kind: &'static str, message: String) {
        self.stats.record_error();
        if self.recent_errors.len() >= ERROR_HISTORY {
            self.recent_errors.pop_front();
        }
        self.recent_errors.push_back(ErrorRecord {
            at_ms,
            kind,
            message,
        });
    }

    /// Account for terminal orders, update gauges and publish the snapshot.
    fn after_message(&mut self) {
        for record in self.manager.take_new_terminal() {
            Metrics::order_terminal(record.state.as_str());
            match record.state {
                OrderState::Cancelled => self.stats.record_cancelled(),
                OrderState::Rejected => self.stats.record_rejected(),
                _ => {}
            }
        }
        let live = self.manager.live_orders().len();
        Metrics::live_orders_set(i64::try_from(live).unwrap_or(i64::MAX));
        Metrics::position_set(self.inventory.net_size().to_f64().unwrap_or(0.0));
        self.publish();
    }

    fn publish(&self) {
        let lifecycle = self.manager.snapshot();
        let snapshot = EngineSnapshot {
            pair: self.pair.clone(),
            live_orders: self.manager.live_orders(),
            bid: lifecycle.bid,
            ask: lifecycle.ask,
            position: self.inventory.position().clone(),
            avg_entry: self.inventory.avg_entry(),
            realized_pnl: self.inventory.realized_pnl(),
            last_cycle_ms: self.last_cycle_ms,
            generation: lifecycle.generation,
            vetoes: self.last_vetoes.clone(),
            recent_terminal: lifecycle.recent_terminal,
            recent_errors: self.recent_errors.iter().cloned().collect(),
            reconcile_in_flight: lifecycle.reconcile_in_flight,
            reconcile_owed: lifecycle.reconcile_owed,
            running: self.running,
            stats: self.stats.clone(),
        };
        *self.snapshot.write() = snapshot;
    }
}
