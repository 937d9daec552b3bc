//! Paper trading venue.
//!
//! In-memory account that rests orders, fills them when the simulated mid
//! trades through their price and reports fills on the account event
//! stream. A bounded random walk drives the mid and is published to the
//! shared [`MarketState`] as BBO and last-trade updates.

use std::sync::Arc;
use std::time::Duration;

use hlmm_core::{
    AccountEvent, AccountState, Bbo, CancelRequest, LastTrade, MarketSpec, OrderRequest, Price,
    Side, Size, TradingPair, VenueOrder,
};
use hlmm_feed::MarketState;
use hlmm_mm::MakerError;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::{ExecutorResult, VenueError, VenueResult};
use crate::venue::{AccountAdapter, BoxFuture, CancelOutcome, SubmitOutcome};

const EVENT_CAPACITY: usize = 1024;

/// Paper venue settings (`[paper]` in the config file).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperConfig {
    #[serde(default = "default_initial_mid")]
    pub initial_mid: Decimal,

    #[serde(default = "default_tick_size")]
    pub tick_size: Decimal,

    #[serde(default = "default_lot_size")]
    pub lot_size: Decimal,

    #[serde(default = "default_lot_size")]
    pub min_size: Decimal,

    #[serde(default = "default_max_leverage")]
    pub max_leverage: u32,

    /// Starting equity in quote currency.
    #[serde(default = "default_initial_equity")]
    pub initial_equity: Decimal,

    #[serde(default)]
    pub initial_position_base: Decimal,

    #[serde(default = "default_step_interval_ms")]
    pub step_interval_ms: u64,

    /// Largest mid move per step, in basis points.
    #[serde(default = "default_max_step_bps")]
    pub max_step_bps: u32,

    /// The mid stays within this fraction of `initial_mid`.
    #[serde(default = "default_max_drift")]
    pub max_drift: Decimal,

    /// Half the simulated book spread, in basis points.
    #[serde(default = "default_half_spread_bps")]
    pub half_spread_bps: u32,

    /// Random walk seed. Unseeded runs use OS entropy.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            initial_mid: default_initial_mid(),
            tick_size: default_tick_size(),
            lot_size: default_lot_size(),
            min_size: default_lot_size(),
            max_leverage: default_max_leverage(),
            initial_equity: default_initial_equity(),
            initial_position_base: Decimal::ZERO,
            step_interval_ms: default_step_interval_ms(),
            max_step_bps: default_max_step_bps(),
            max_drift: default_max_drift(),
            half_spread_bps: default_half_spread_bps(),
            seed: None,
        }
    }
}

impl PaperConfig {
    pub fn validate(&self) -> ExecutorResult<()> {
        let positive = [
            ("initial_mid", self.initial_mid),
            ("tick_size", self.tick_size),
            ("lot_size", self.lot_size),
            ("min_size", self.min_size),
        ];
        for (name, value) in positive {
            if value <= Decimal::ZERO {
                return Err(invalid(format!("paper.{name} must be > 0, got {value}")));
            }
        }
        if self.step_interval_ms == 0 {
            return Err(invalid("paper.step_interval_ms must be > 0"));
        }
        if self.max_drift <= Decimal::ZERO || self.max_drift >= Decimal::ONE {
            return Err(invalid(format!(
                "paper.max_drift must be in (0, 1), got {}",
                self.max_drift
            )));
        }
        if self.max_leverage == 0 {
            return Err(invalid("paper.max_leverage must be > 0"));
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> crate::error::ExecutorError {
    MakerError::ConfigInvalid(msg.into()).into()
}

fn default_initial_mid() -> Decimal {
    dec!(50000)
}
fn default_tick_size() -> Decimal {
    dec!(0.1)
}
fn default_lot_size() -> Decimal {
    dec!(0.0001)
}
fn default_max_leverage() -> u32 {
    50
}
fn default_initial_equity() -> Decimal {
    dec!(10000)
}
fn default_step_interval_ms() -> u64 {
    500
}
fn default_max_step_bps() -> u32 {
    5
}
fn default_max_drift() -> Decimal {
    dec!(0.05)
}
fn default_half_spread_bps() -> u32 {
    1
}

#[derive(Debug)]
struct PaperState {
    mid: Decimal,
    open: Vec<VenueOrder>,
    next_oid: u64,
    next_trade: u64,
    /// Quote balance; equity is `cash + position * mid`.
    cash: Decimal,
    position_base: Decimal,
    leverage: u32,
    rng: StdRng,
}

/// In-memory venue for paper trading.
pub struct PaperVenue {
    config: PaperConfig,
    spec: MarketSpec,
    market: MarketState,
    clock: Clock,
    events: mpsc::Sender<AccountEvent>,
    state: Mutex<PaperState>,
}

impl PaperVenue {
    /// Build the venue and the account event stream it feeds.
    pub fn new(
        config: PaperConfig,
        pair: TradingPair,
        market: MarketState,
        clock: Clock,
    ) -> (Arc<Self>, mpsc::Receiver<AccountEvent>) {
        let (events, rx) = mpsc::channel(EVENT_CAPACITY);
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let spec = MarketSpec {
            pair,
            tick_size: Price::new(config.tick_size),
            lot_size: Size::new(config.lot_size),
            min_size: Size::new(config.min_size),
            max_leverage: config.max_leverage,
        };
        let state = PaperState {
            mid: config.initial_mid,
            open: Vec::new(),
            next_oid: 0,
            next_trade: 0,
            cash: config.initial_equity - config.initial_position_base * config.initial_mid,
            position_base: config.initial_position_base,
            leverage: 1,
            rng,
        };
        let venue = Arc::new(Self {
            config,
            spec,
            market,
            clock,
            events,
            state: Mutex::new(state),
        });
        venue.publish_book(venue.config.initial_mid);
        (venue, rx)
    }

    pub fn spec(&self) -> &MarketSpec {
        &self.spec
    }

    /// Drive the random walk until the venue is dropped elsewhere and the
    /// task is aborted.
    pub fn spawn_market(self: &Arc<Self>) -> JoinHandle<()> {
        let venue = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_millis(venue.config.step_interval_ms));
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(
                mid = %venue.config.initial_mid,
                step_ms = venue.config.step_interval_ms,
                "Paper market started"
            );
            loop {
                interval.tick().await;
                venue.step();
            }
        })
    }

    /// Advance the random walk by one step.
    pub fn step(&self) {
        let max_step = i64::from(self.config.max_step_bps);
        let next = {
            let mut state = self.state.lock();
            let bps = state.rng.gen_range(-max_step..=max_step);
            let moved = state.mid * (Decimal::ONE + Decimal::new(bps, 4));
            let low = self.config.initial_mid * (Decimal::ONE - self.config.max_drift);
            let high = self.config.initial_mid * (Decimal::ONE + self.config.max_drift);
            Price::new(moved.clamp(low, high))
                .floor_to_tick(self.spec.tick_size)
                .inner()
        };
        self.set_mid(next);
    }

    /// Move the mid, publish the book and fill crossed orders.
    pub fn set_mid(&self, mid: Decimal) {
        let fills = {
            let mut state = self.state.lock();
            state.mid = mid;
            Self::match_orders(&mut state)
        };
        self.publish_book(mid);
        for event in fills {
            if let Err(e) = self.events.try_send(event) {
                warn!(error = %e, "Paper account event dropped");
            }
        }
    }

    pub fn mid(&self) -> Decimal {
        self.state.lock().mid
    }

    pub fn open_orders(&self) -> Vec<VenueOrder> {
        self.state.lock().open.clone()
    }

    fn match_orders(state: &mut PaperState) -> Vec<AccountEvent> {
        let mid = state.mid;
        let (crossed, resting): (Vec<_>, Vec<_>) =
            std::mem::take(&mut state.open)
                .into_iter()
                .partition(|o| match o.side {
                    Side::Bid => mid <= o.price.inner(),
                    Side::Ask => mid >= o.price.inner(),
                });
        state.open = resting;

        let mut events = Vec::with_capacity(crossed.len());
        for order in crossed {
            let size = order.size.inner() - order.filled.inner();
            let signed = Decimal::from(order.side.sign()) * size;
            state.position_base += signed;
            state.cash -= signed * order.price.inner();
            state.next_trade += 1;
            debug!(
                oid = %order.oid,
                side = %order.side,
                price = %order.price,
                %size,
                %mid,
                "Paper fill"
            );
            events.push(AccountEvent::Fill {
                oid: order.oid,
                trade_id: Some(format!("paper-{}", state.next_trade)),
                side: order.side,
                filled_size: Size::new(size),
                filled_price: order.price,
            });
        }
        events
    }

    fn publish_book(&self, mid: Decimal) {
        let half = mid * Decimal::new(i64::from(self.config.half_spread_bps), 4);
        let tick = self.spec.tick_size;
        let bid = Price::new(mid - half).floor_to_tick(tick);
        let mut ask = Price::new(mid + half).ceil_to_tick(tick);
        if ask <= bid {
            ask = bid + tick;
        }
        let now = self.clock.now_ms();
        let depth = Size::new(Decimal::ONE);
        self.market.update_bbo(Bbo::new(bid, depth, ask, depth, now));
        self.market.update_trade(LastTrade {
            price: Price::new(mid),
            size: self.spec.lot_size,
            received_at_ms: now,
        });
    }
}

impl AccountAdapter for PaperVenue {
    fn submit_order(&self, request: OrderRequest) -> BoxFuture<'_, VenueResult<SubmitOutcome>> {
        Box::pin(async move {
            if request.size < self.spec.min_size {
                return Ok(SubmitOutcome::Rejected {
                    reason: format!("size {} below minimum {}", request.size, self.spec.min_size),
                });
            }
            if !request.price.is_positive() {
                return Ok(SubmitOutcome::Rejected {
                    reason: format!("invalid price {}", request.price),
                });
            }

            let mut state = self.state.lock();
            let crosses = match request.side {
                Side::Bid => request.price.inner() >= state.mid,
                Side::Ask => request.price.inner() <= state.mid,
            };
            if crosses {
                return Ok(SubmitOutcome::Rejected {
                    reason: format!("post-only order would cross mid {}", state.mid),
                });
            }

            state.next_oid += 1;
            let oid = format!("paper-{}", state.next_oid);
            state.open.push(VenueOrder {
                oid: oid.clone(),
                cloid: Some(request.cloid.clone()),
                side: request.side,
                price: request.price,
                size: request.size,
                filled: Size::ZERO,
            });
            Ok(SubmitOutcome::Accepted { oid })
        })
    }

    fn cancel_order(&self, request: CancelRequest) -> BoxFuture<'_, VenueResult<CancelOutcome>> {
        Box::pin(async move {
            let mut state = self.state.lock();
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
        Box::pin(async move { Ok(self.state.lock().open.clone()) })
    }

    fn query_account<'a>(
        &'a self,
        _pair: &'a TradingPair,
    ) -> BoxFuture<'a, VenueResult<AccountState>> {
        Box::pin(async move {
            let state = self.state.lock();
            Ok(AccountState {
                equity: state.cash + state.position_base * state.mid,
                position_base: state.position_base,
                leverage: Decimal::from(state.leverage),
            })
        })
    }

    fn set_leverage<'a>(
        &'a self,
        _pair: &'a TradingPair,
        leverage: u32,
    ) -> BoxFuture<'a, VenueResult<()>> {
        Box::pin(async move {
            if leverage == 0 || leverage > self.spec.max_leverage {
                return Err(VenueError::Fatal(format!(
                    "leverage {leverage} outside 1..={}",
                    self.spec.max_leverage
                )));
            }
            self.state.lock().leverage = leverage;
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
