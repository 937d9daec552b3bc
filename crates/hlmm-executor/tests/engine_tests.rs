//! Engine integration tests against the mock venue.
//!
//! All tests run on paused tokio time: sleeps advance the clock instantly
//! once every task is idle.

use std::sync::Arc;
use std::time::Duration;

use hlmm_core::{
    AccountEvent, AccountState, Bbo, ClientOrderId, MarketSpec, OrderState, Price, Side, Size,
    VenueOrder,
};
use hlmm_executor::{
    start_engine, Clock, EngineHandle, EngineParts, ExecutorError, MockVenue, SubmitOutcome,
    VenueError,
};
use hlmm_feed::MarketState;
use hlmm_mm::{MakerConfig, MakerError, VetoReason};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const START_MS: u64 = 1_700_000_000_000;

fn spec() -> MarketSpec {
    MarketSpec {
        pair: "BTC-USD".parse().unwrap(),
        tick_size: Price::new(dec!(1)),
        lot_size: Size::new(dec!(0.001)),
        min_size: Size::new(dec!(0.001)),
        max_leverage: 50,
    }
}

fn config() -> MakerConfig {
    MakerConfig {
        order_amount: dec!(0.001),
        bid_spread: dec!(0.003),
        ask_spread: dec!(0.003),
        refresh_interval_secs: 60,
        leverage: 2,
        max_inventory_base: dec!(1),
        stale_price_ms: 3_600_000,
        ..Default::default()
    }
}

fn account(equity: Decimal, position_base: Decimal) -> AccountState {
    AccountState {
        equity,
        position_base,
        leverage: dec!(2),
    }
}

struct Fixture {
    venue: Arc<MockVenue>,
    market: MarketState,
    events: mpsc::Sender<AccountEvent>,
    handle: EngineHandle,
    join: JoinHandle<()>,
    clock: Clock,
}

impl Fixture {
    fn set_mid(&self, mid: Decimal, received_at_ms: u64) {
        self.market.update_bbo(Bbo::new(
            Price::new(mid - dec!(1)),
            Size::new(dec!(1)),
            Price::new(mid + dec!(1)),
            Size::new(dec!(1)),
            received_at_ms,
        ));
    }

    fn oid(&self, side: Side) -> String {
        let snapshot = self.handle.snapshot();
        let order = match side {
            Side::Bid => snapshot.bid,
            Side::Ask => snapshot.ask,
        };
        order.and_then(|o| o.oid).expect("side has an acknowledged order")
    }
}

async fn start_with(config: MakerConfig, account: AccountState, venue: MockVenue) -> Fixture {
    let clock = Clock::starting_at(START_MS);
    let market = MarketState::new();
    market.update_bbo(Bbo::new(
        Price::new(dec!(49999)),
        Size::new(dec!(1)),
        Price::new(dec!(50001)),
        Size::new(dec!(1)),
        clock.now_ms(),
    ));

    let venue = Arc::new(venue);
    venue.set_account(Ok(account));
    let (events, events_rx) = mpsc::channel(64);

    let (handle, join) = start_engine(EngineParts {
        config,
        venue: venue.clone(),
        prices: Arc::new(market.clone()),
        events: events_rx,
        clock,
    })
    .await
    .unwrap();

    Fixture {
        venue,
        market,
        events,
        handle,
        join,
        clock,
    }
}

async fn start(config: MakerConfig) -> Fixture {
    start_with(
        config,
        account(dec!(100000), dec!(0)),
        MockVenue::new(spec(), AccountState::default()),
    )
    .await
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test(start_paused = true)]
async fn test_failed_startup_reconcile_is_retried_before_quoting() {
    let venue = MockVenue::new(spec(), AccountState::default());
    venue.seed_open_order(VenueOrder {
        oid: "900".to_string(),
        cloid: Some(ClientOrderId::from_string("hlmm_1_deadbeef".to_string())),
        side: Side::Bid,
        price: Price::new(dec!(49000)),
        size: Size::new(dec!(0.001)),
        filled: Size::ZERO,
    });
    venue.push_open_orders_failure(VenueError::Fatal("open orders unavailable".into()));

    let mut cfg = config();
    cfg.refresh_interval_secs = 5;
    let fx = start_with(cfg, account(dec!(100000), dec!(0)), venue).await;
    settle().await;

    // Nothing is placed on an unreconciled view.
    assert_eq!(fx.venue.open_orders_queries(), 1);
    assert!(fx.venue.submits().is_empty());
    let snapshot = fx.handle.snapshot();
    assert!(snapshot.reconcile_owed);
    assert!(snapshot.last_cycle_ms.is_none());

    // The next age check re-issues the query.
    tokio::time::sleep(Duration::from_millis(1_100)).await;
    assert_eq!(fx.venue.open_orders_queries(), 2);
    let cancels = fx.venue.cancels();
    assert_eq!(cancels.len(), 1);
    assert_eq!(cancels[0].oid, "900");
    assert_eq!(fx.venue.submits().len(), 2);

    tokio::time::sleep(Duration::from_secs(60)).await;
    let open: Vec<String> = fx.venue.open_orders().into_iter().map(|o| o.oid).collect();
    assert!(!open.contains(&"900".to_string()));
    assert_eq!(open.len(), 2);
    assert!(!fx.handle.snapshot().reconcile_owed);
}

#[tokio::test(start_paused = true)]
async fn test_startup_reconciles_then_quotes_both_sides() {
    let venue = MockVenue::new(spec(), AccountState::default());
    venue.seed_open_order(VenueOrder {
        oid: "900".to_string(),
        cloid: Some(ClientOrderId::from_string("hlmm_1_deadbeef".to_string())),
        side: Side::Bid,
        price: Price::new(dec!(49000)),
        size: Size::new(dec!(0.001)),
        filled: Size::ZERO,
    });
    venue.seed_open_order(VenueOrder {
        oid: "901".to_string(),
        cloid: None,
        side: Side::Ask,
        price: Price::new(dec!(51000)),
        size: Size::new(dec!(0.5)),
        filled: Size::ZERO,
    });

    let fx = start_with(config(), account(dec!(100000), dec!(0)), venue).await;
    settle().await;

    // The leftover tagged order is cancelled, the foreign one left alone.
    let cancels = fx.venue.cancels();
    assert_eq!(cancels.len(), 1);
    assert_eq!(cancels[0].oid, "900");
    assert_eq!(fx.venue.leverage_calls(), vec![2]);

    let mut submits = fx.venue.submits();
    submits.sort_by_key(|r| r.side == Side::Ask);
    assert_eq!(submits.len(), 2);
    assert_eq!(submits[0].side, Side::Bid);
    assert_eq!(submits[0].price.inner(), dec!(49850));
    assert_eq!(submits[1].price.inner(), dec!(50150));
    assert!(submits.iter().all(|r| r.size.inner() == dec!(0.001)));
    assert!(submits.iter().all(|r| r.cloid.has_tag("hlmm")));

    let snapshot = fx.handle.snapshot();
    assert!(snapshot.running);
    assert_eq!(snapshot.bid.unwrap().state, OrderState::Open);
    assert_eq!(snapshot.ask.unwrap().state, OrderState::Open);
    assert_eq!(snapshot.live_orders.len(), 2);
    assert!(snapshot.last_cycle_ms.is_some());
    assert!(snapshot
        .recent_errors
        .iter()
        .any(|e| e.kind == "reconciliation_mismatch"));
    assert_eq!(fx.venue.open_orders().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_leverage_veto_leaves_only_bid() {
    let fx = start_with(
        config(),
        account(dec!(500), dec!(-0.02)),
        MockVenue::new(spec(), AccountState::default()),
    )
    .await;
    settle().await;

    let submits = fx.venue.submits();
    assert_eq!(submits.len(), 1);
    assert_eq!(submits[0].side, Side::Bid);

    let snapshot = fx.handle.snapshot();
    assert!(snapshot.bid.is_some());
    assert!(snapshot.ask.is_none());
    assert_eq!(snapshot.position.base_amount, dec!(-0.02));
    assert_eq!(snapshot.vetoes.len(), 1);
    assert_eq!(snapshot.vetoes[0].side, Side::Ask);
    assert_eq!(snapshot.vetoes[0].reason, VetoReason::LeverageLimit);
}

#[tokio::test(start_paused = true)]
async fn test_fill_during_cancel_moves_position_once() {
    let fx = start(MakerConfig {
        refresh_interval_secs: 5,
        ..config()
    })
    .await;
    settle().await;
    let bid_oid = fx.oid(Side::Bid);

    // Next refresh requotes both sides; hold the cancels in flight.
    fx.venue.set_cancel_delay(Duration::from_secs(1));
    fx.set_mid(dec!(50100), fx.clock.now_ms());
    tokio::time::sleep(Duration::from_millis(5_000)).await;
    let requote_generation = fx.handle.snapshot().generation;
    assert_eq!(
        fx.handle.snapshot().bid.unwrap().state,
        OrderState::Cancelling
    );

    // The bid fills while its cancel is outstanding, and the venue
    // delivers the fill twice.
    let filled = fx.venue.fill(&bid_oid).unwrap();
    let fill = AccountEvent::Fill {
        oid: bid_oid.clone(),
        trade_id: Some("t-1".to_string()),
        side: Side::Bid,
        filled_size: filled.size,
        filled_price: filled.price,
    };
    fx.events.send(fill.clone()).await.unwrap();
    fx.events.send(fill).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1_500)).await;

    let snapshot = fx.handle.snapshot();
    assert_eq!(snapshot.position.base_amount, dec!(0.001));
    assert!(snapshot.bid.is_none());
    assert!(snapshot.ask.is_none());
    assert_eq!(snapshot.stats.bought.fills, 1);
    assert_eq!(
        fx.venue
            .submits()
            .iter()
            .filter(|r| r.generation == requote_generation)
            .count(),
        0
    );
    assert!(snapshot
        .recent_terminal
        .iter()
        .any(|r| r.oid.as_deref() == Some(bid_oid.as_str()) && r.state == OrderState::Filled));

    // The next cycle quotes again.
    fx.venue.set_cancel_delay(Duration::ZERO);
    tokio::time::sleep(Duration::from_millis(3_600)).await;
    let snapshot = fx.handle.snapshot();
    assert!(snapshot.generation > requote_generation);
    assert!(snapshot.bid.is_some());
    assert!(snapshot.ask.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_stop_cancels_everything_and_reports_clean() {
    let fx = start(config()).await;
    settle().await;
    assert_eq!(fx.handle.snapshot().live_orders.len(), 2);

    let report = fx.handle.stop().await.unwrap();

    assert!(report.is_clean());
    assert_eq!(fx.venue.cancels().len(), 2);
    assert!(fx.venue.open_orders().is_empty());
    assert_eq!(report.stats.orders_created, 2);
    assert_eq!(report.stats.orders_cancelled, 2);
    assert!(!fx.handle.is_running());
    assert!(fx.join.await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_stop_abandons_orders_after_grace() {
    let fx = start(MakerConfig {
        shutdown_grace_ms: 2_000,
        ..config()
    })
    .await;
    settle().await;

    fx.venue.set_cancel_delay(Duration::from_secs(60));
    let report = fx.handle.stop().await.unwrap();

    assert!(!report.is_clean());
    assert_eq!(report.abandoned.len(), 2);
    assert!(report
        .abandoned
        .iter()
        .all(|o| o.state == OrderState::Cancelling));
    let snapshot = fx.handle.snapshot();
    assert!(!snapshot.running);
    assert!(snapshot.live_orders.is_empty());

    // Further commands fail once the task is gone.
    let _ = fx.join.await;
    assert!(matches!(
        fx.handle.force_reconcile().await,
        Err(ExecutorError::EngineStopped)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_stale_reference_skips_cycle() {
    let fx = start(MakerConfig {
        stale_price_ms: 5_000,
        ..config()
    })
    .await;
    fx.set_mid(dec!(50000), START_MS - 10_000);
    settle().await;

    assert!(fx.venue.submits().is_empty());
    let snapshot = fx.handle.snapshot();
    assert!(snapshot.live_orders.is_empty());
    assert_eq!(snapshot.generation, 1);
    assert!(snapshot
        .recent_errors
        .iter()
        .any(|e| e.kind == "invalid_reference_price"));
}

#[tokio::test(start_paused = true)]
async fn test_config_update_validated_and_applied_next_cycle() {
    let fx = start(MakerConfig {
        refresh_interval_secs: 5,
        ..config()
    })
    .await;
    settle().await;

    let bad = MakerConfig {
        bid_spread: dec!(-0.1),
        ..config()
    };
    assert!(matches!(
        fx.handle.update_config(bad).await,
        Err(ExecutorError::Config(MakerError::ConfigInvalid(_)))
    ));

    let other_market = MakerConfig {
        trading_pair: "ETH-USD".parse().unwrap(),
        ..config()
    };
    assert!(fx.handle.update_config(other_market).await.is_err());

    let wider = MakerConfig {
        refresh_interval_secs: 5,
        bid_spread: dec!(0.01),
        ask_spread: dec!(0.01),
        ..config()
    };
    tokio_test::assert_ok!(fx.handle.update_config(wider).await);
    // Nothing changes before the next refresh.
    settle().await;
    assert_eq!(fx.venue.submits().len(), 2);

    tokio::time::sleep(Duration::from_millis(5_000)).await;
    let prices: Vec<Decimal> = fx.venue.submits().iter().map(|r| r.price.inner()).collect();
    assert!(prices.contains(&dec!(49500)));
    assert!(prices.contains(&dec!(50500)));
    assert_eq!(fx.handle.snapshot().bid.unwrap().price.inner(), dec!(49500));
}

#[tokio::test(start_paused = true)]
async fn test_transient_submit_error_is_retried() {
    let venue = MockVenue::new(spec(), AccountState::default());
    venue.push_submit_result(Err(VenueError::Transient("rate limited".to_string())));
    let fx = start_with(config(), account(dec!(100000), dec!(0)), venue).await;
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(fx.venue.submits().len(), 3);
    let snapshot = fx.handle.snapshot();
    assert_eq!(snapshot.bid.unwrap().state, OrderState::Open);
    assert_eq!(snapshot.ask.unwrap().state, OrderState::Open);
    assert_eq!(fx.venue.open_orders().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_submit_clears_side() {
    let venue = MockVenue::new(spec(), AccountState::default());
    venue.push_submit_result(Ok(SubmitOutcome::Rejected {
        reason: "post only would cross".to_string(),
    }));
    let fx = start_with(config(), account(dec!(100000), dec!(0)), venue).await;
    settle().await;

    let snapshot = fx.handle.snapshot();
    assert_eq!(snapshot.live_orders.len(), 1);
    assert_eq!(snapshot.stats.orders_rejected, 1);
    assert!(snapshot
        .recent_errors
        .iter()
        .any(|e| e.kind == "order_rejected"));
    assert!(snapshot
        .recent_terminal
        .iter()
        .any(|r| r.state == OrderState::Rejected));
}

#[tokio::test(start_paused = true)]
async fn test_age_check_cancels_without_resubmitting() {
    let fx = start(MakerConfig {
        max_order_age_secs: 2,
        ..config()
    })
    .await;
    settle().await;
    assert_eq!(fx.venue.submits().len(), 2);

    tokio::time::sleep(Duration::from_millis(3_500)).await;

    assert_eq!(fx.venue.cancels().len(), 2);
    assert_eq!(fx.venue.submits().len(), 2);
    let snapshot = fx.handle.snapshot();
    assert!(snapshot.live_orders.is_empty());
    assert_eq!(snapshot.stats.orders_cancelled, 2);
}

#[tokio::test(start_paused = true)]
async fn test_force_reconcile_drops_vanished_orders() {
    let fx = start(config()).await;
    settle().await;
    let ask_oid = fx.oid(Side::Ask);

    // The ask disappears from the venue without any event.
    assert!(fx.venue.fill(&ask_oid).is_some());
    fx.handle.force_reconcile().await.unwrap();
    settle().await;

    let snapshot = fx.handle.snapshot();
    assert!(snapshot.ask.is_none());
    assert!(snapshot.bid.is_some());
    assert!(!snapshot.reconcile_in_flight);
    assert!(snapshot
        .recent_errors
        .iter()
        .any(|e| e.kind == "reconciliation_mismatch"));
    // Position is only moved by fills.
    assert_eq!(snapshot.position.base_amount, dec!(0));
}

#[tokio::test(start_paused = true)]
async fn test_startup_fails_on_unknown_market() {
    let clock = Clock::starting_at(START_MS);
    let (_events, events_rx) = mpsc::channel(8);
    let result = start_engine(EngineParts {
        config: MakerConfig {
            trading_pair: "ETH-USD".parse().unwrap(),
            ..config()
        },
        venue: Arc::new(MockVenue::new(spec(), AccountState::default())),
        prices: Arc::new(MarketState::new()),
        events: events_rx,
        clock,
    })
    .await;

    assert!(matches!(
        result,
        Err(ExecutorError::Venue(VenueError::Fatal(_)))
    ));
}
