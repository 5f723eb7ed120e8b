//! Order-ladder controller - the policy layer
//!
//! The controller owns a Buy ladder (driven by the ask) and a Sell ladder
//! (driven by the bid). Each tick is offered to both; policy rules run only
//! when a ladder changes grid:
//!
//! - outward move: prune the other ladder, place a trend order, unwind
//!   martingale orders once price is past the best of them
//! - inward move: escalate martingale, lock profit with a hedge on drawdown
//!
//! The profit trail runs on every tick and session boundaries flush all
//! ladders. Gateway failures are logged and the bookkeeping for that call is
//! left as it was.

use log::{debug, error, info, warn};
use serde::Serialize;

use crate::market::{MovingAverage, Tick, TickSma};

use super::config::{InstrumentSpec, MartingaleCap, MartingaleSizing, PolicyConfig};
use super::dispatch::Transition;
use super::errors::{LadderError, LadderResult};
use super::executor::ExecutionGateway;
use super::ladder::{Ladder, LadderState};
use super::session::{FlushReason, SessionClock, SessionVerdict};
use super::types::{LadderOrder, OrderSide, OrderTag};

/// Tolerance for lot arithmetic
const LOT_EPSILON: f64 = 1e-9;

/// Per-ladder snapshot for logging
#[derive(Debug, Clone, Serialize)]
pub struct LadderSummary {
    pub side: OrderSide,
    pub origin: f64,
    pub last_offset: Option<i32>,
    pub grids: usize,
    pub transitions: u64,
    pub trend_orders: usize,
    pub martingale_orders: usize,
    pub hedge_orders: usize,
    pub trend_lots: f64,
    pub martingale_lots: f64,
    pub profit: f64,
    pub state: LadderState,
}

/// Controller snapshot for logging
#[derive(Debug, Clone, Serialize)]
pub struct ControllerSummary {
    pub policy: String,
    pub instrument: String,
    pub ticks: u64,
    pub ladders: Vec<LadderSummary>,
    pub detached_orders: usize,
}

/// Drives both ladders of one instrument through a [`PolicyConfig`]
pub struct LadderController<G: ExecutionGateway> {
    config: PolicyConfig,
    instrument: InstrumentSpec,
    gateway: G,
    indicator: Option<Box<dyn MovingAverage>>,
    session: Option<SessionClock>,
    /// Empty until the first eligible tick; Buy first, then Sell
    ladders: Vec<Ladder>,
    /// Orders no longer attributed to a grid, closed at the next flush
    detached: Vec<LadderOrder>,
    trend_step: f64,
    martingale_step: Option<f64>,
    ticks: u64,
}

impl<G: ExecutionGateway> LadderController<G> {
    /// Build a controller. Invalid configuration is fatal here.
    pub fn new(config: PolicyConfig, instrument: InstrumentSpec, gateway: G) -> LadderResult<Self> {
        config.validate()?;
        instrument.validate()?;

        let trend_step = instrument.points_to_price(config.grid_step_points);
        if !(trend_step > 0.0) {
            return Err(LadderError::InvalidConfig(format!(
                "grid_step_points {} is below one price tick of {}",
                config.grid_step_points, instrument.symbol
            )));
        }
        let martingale_step = match config.martingale.as_ref().and_then(|m| m.step_points) {
            Some(points) => {
                let step = instrument.points_to_price(points);
                if !(step > 0.0) {
                    return Err(LadderError::InvalidConfig(format!(
                        "martingale step_points {} is below one price tick of {}",
                        points, instrument.symbol
                    )));
                }
                Some(step)
            }
            None => None,
        };

        let indicator = config.regime.as_ref().map(|r| {
            Box::new(TickSma::new(r.ma_period).with_scale(instrument.scale())) as Box<dyn MovingAverage>
        });
        let session = config.session.clone().map(SessionClock::new);

        info!(
            "Policy '{}' on {}: step {} (martingale step {:?}), trend size {}",
            config.name, instrument.symbol, trend_step, martingale_step, config.trend.base_size
        );

        Ok(Self {
            config,
            instrument,
            gateway,
            indicator,
            session,
            ladders: Vec::new(),
            detached: Vec::new(),
            trend_step,
            martingale_step,
            ticks: 0,
        })
    }

    /// Builder: replace the moving-average provider of the regime filter
    pub fn with_indicator(mut self, indicator: Box<dyn MovingAverage>) -> Self {
        self.indicator = Some(indicator);
        self
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    pub fn instrument(&self) -> &InstrumentSpec {
        &self.instrument
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn gateway_mut(&mut self) -> &mut G {
        &mut self.gateway
    }

    /// Ladder for `side`, once built
    pub fn ladder(&self, side: OrderSide) -> Option<&Ladder> {
        self.ladders.iter().find(|l| l.side() == side)
    }

    /// Orders detached from their ladders and awaiting a close
    pub fn detached(&self) -> &[LadderOrder] {
        &self.detached
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Process one tick
    pub fn on_tick(&mut self, tick: &Tick) {
        if tick.instrument != self.instrument.symbol {
            return;
        }
        if !tick.is_valid() {
            warn!("Ignoring invalid quote {} / {}", tick.bid, tick.ask);
            return;
        }
        self.ticks += 1;
        self.gateway.observe(tick);
        if let Some(indicator) = self.indicator.as_mut() {
            indicator.update(tick.bid);
        }

        if let Some(clock) = self.session.as_mut() {
            match clock.observe(tick.timestamp) {
                SessionVerdict::Trade => {}
                SessionVerdict::Idle => return,
                SessionVerdict::Flush(reason) => {
                    self.flush(reason);
                    return;
                }
            }
        }

        // No decision until the average exists
        let ma = match &self.indicator {
            Some(indicator) => match indicator.value() {
                Some(v) => Some(v),
                None => return,
            },
            None => None,
        };

        if self.ladders.is_empty() && !self.build_ladders(tick, ma) {
            return;
        }

        for i in 0..self.ladders.len() {
            let price = match self.ladders[i].side() {
                OrderSide::Buy => tick.ask,
                OrderSide::Sell => tick.bid,
            };
            if let Some(t) = self.ladders[i].trend.offer(price) {
                self.on_trend_change(i, &t, ma);
            }
            if self.ladders[i].has_separate_martingale() {
                if let Some(t) = self.ladders[i].martingale_index_mut().offer(price) {
                    self.on_martingale_change(i, &t, ma);
                }
            }
        }

        if self.config.trail.is_some() {
            for i in 0..self.ladders.len() {
                self.check_trail(i);
            }
        }
    }

    /// Close every order on every ladder plus detached ones.
    ///
    /// Returns how many were closed. Failed closes keep their bookkeeping.
    pub fn close_all(&mut self) -> usize {
        let Self {
            ladders,
            gateway,
            detached,
            ..
        } = self;

        let mut closed = 0;
        for ladder in ladders.iter_mut() {
            let ids = ladder.all_ids();
            closed += ladder.close_orders(gateway, &ids);
            if ladder.state.hedge_orders.is_empty() {
                ladder.state.reset_lock();
            }
            ladder.state.trail_peak_profit = 0.0;
        }

        detached.retain(|order| match gateway.close(order.id) {
            Ok(handle) => {
                closed += 1;
                info!("Closed detached {} id={} profit={:.2}", handle.label, order.id, handle.profit);
                false
            }
            Err(e) => {
                error!("Failed to close detached id={}: {}", order.id, e);
                true
            }
        });
        closed
    }

    /// Close everything and drop the ladders; new origins are taken on the
    /// next eligible tick
    pub fn flush(&mut self, reason: FlushReason) {
        let closed = self.close_all();
        for ladder in self.ladders.drain(..) {
            self.detached.extend(ladder.into_orders());
        }
        info!(
            "Flushed ladders ({:?}): {} orders closed, {} left detached",
            reason,
            closed,
            self.detached.len()
        );
    }

    pub fn summary(&self) -> ControllerSummary {
        let ladders = self
            .ladders
            .iter()
            .map(|l| LadderSummary {
                side: l.side(),
                origin: l.trend_index().origin(),
                last_offset: l.trend_index().last(),
                grids: l.trend_index().len(),
                transitions: l.trend_index().transitions(),
                trend_orders: l.orders(OrderTag::Trend).len(),
                martingale_orders: l.orders(OrderTag::Martingale).len(),
                hedge_orders: l.orders(OrderTag::Hedge).len(),
                trend_lots: l.lots(OrderTag::Trend),
                martingale_lots: l.lots(OrderTag::Martingale),
                profit: l.total_profit(&self.gateway),
                state: l.state.clone(),
            })
            .collect();

        ControllerSummary {
            policy: self.config.name.clone(),
            instrument: self.instrument.symbol.clone(),
            ticks: self.ticks,
            ladders,
            detached_orders: self.detached.len(),
        }
    }

    fn build_ladders(&mut self, tick: &Tick, ma: Option<f64>) -> bool {
        if let (Some(ma), Some(regime)) = (ma, &self.config.regime) {
            let band = self.instrument.points_to_price(regime.origin_band_points);
            if (tick.bid - ma).abs() >= band {
                debug!("Bid {} is outside {} of average {}, waiting", tick.bid, band, ma);
                return false;
            }
        }

        let scale = self.instrument.scale();
        let built = [(OrderSide::Buy, tick.ask), (OrderSide::Sell, tick.bid)]
            .into_iter()
            .map(|(side, origin)| Ladder::new(side, origin, self.trend_step, self.martingale_step, scale))
            .collect::<LadderResult<Vec<_>>>();

        match built {
            Ok(ladders) => {
                info!(
                    "Ladders created at {}: ask origin {}, bid origin {}",
                    tick.timestamp, tick.ask, tick.bid
                );
                self.ladders = ladders;
                true
            }
            Err(e) => {
                error!("Cannot build ladders at {}: {}", tick.timestamp, e);
                false
            }
        }
    }

    fn on_trend_change(&mut self, i: usize, t: &Transition, ma: Option<f64>) {
        if t.is_initial() {
            debug!("[{} ladder] first grid {}", self.ladders[i].side(), t.entering.offset);
            return;
        }
        let side = self.ladders[i].side();
        let movement = t.movement();
        let run = self.ladders[i].state.record_movement(movement);

        // Regime filter: act only on the ladder's side of the average
        if let Some(ma) = ma {
            if !side.is_beyond(t.price, ma) {
                self.ladders[i].state.extreme_offset_reached = None;
                self.unwind_hedges(i);
                return;
            }
        } else if self.config.hedge.is_some() {
            let origin = self.ladders[i].trend_index().origin();
            if !side.is_beyond(t.price, origin) {
                self.unwind_hedges(i);
            }
        }

        let shared_martingale =
            self.config.martingale.is_some() && !self.ladders[i].has_separate_martingale();

        if movement == self.ladders[i].outward() {
            if self.config.prune_opposite {
                self.prune_opposite(i, t.entering.offset);
            }
            if run >= self.config.trend.confirmation {
                self.place_trend(i, t);
            }
            if shared_martingale {
                self.unwind_martingale(i, t);
            }
        } else {
            if shared_martingale {
                self.escalate_martingale(i, t);
            }
            if self.config.hedge.is_some() {
                self.check_hedge(i);
            }
        }
    }

    fn on_martingale_change(&mut self, i: usize, t: &Transition, ma: Option<f64>) {
        if t.is_initial() {
            return;
        }
        let side = self.ladders[i].side();
        if let Some(ma) = ma {
            if !side.is_beyond(t.price, ma) {
                return;
            }
        }
        if t.movement() == self.ladders[i].outward() {
            self.unwind_martingale(i, t);
        } else {
            self.escalate_martingale(i, t);
        }
    }

    fn place_trend(&mut self, i: usize, t: &Transition) {
        let Self {
            ladders,
            gateway,
            config,
            ..
        } = self;
        let ladder = &mut ladders[i];
        let side = ladder.side();
        let entering = t.entering;

        if ladder
            .trend_index()
            .grid(entering.offset)
            .map_or(false, |g| g.has_tag(OrderTag::Trend))
        {
            return;
        }
        if let Some(extreme) = ladder.extreme(OrderTag::Trend, side) {
            if !side.is_beyond(entering.start, extreme.open_price) {
                debug!(
                    "[{} ladder] grid {} start {} not beyond trend order at {}",
                    side, entering.offset, entering.start, extreme.open_price
                );
                return;
            }
        }

        let placed = ladder.open(
            gateway,
            OrderTag::Trend,
            side,
            config.trend.base_size,
            Some(entering.offset),
        );
        if placed.is_some() {
            let net = ladder.net_profit(&*gateway);
            if net > ladder.state.peak_net_profit {
                ladder.state.peak_net_profit = net;
            }
        }
    }

    fn escalate_martingale(&mut self, i: usize, t: &Transition) {
        let Self {
            ladders,
            gateway,
            config,
            ..
        } = self;
        let Some(m) = config.martingale.as_ref() else {
            return;
        };
        let ladder = &mut ladders[i];
        let side = ladder.side();
        let entering = t.entering;

        if ladder
            .martingale_index()
            .grid(entering.offset)
            .map_or(false, |g| g.has_tag(OrderTag::Martingale))
        {
            return;
        }

        let count = ladder.orders(OrderTag::Martingale).len();
        let adverse = ladder.extreme(OrderTag::Martingale, side.opposite()).cloned();
        if let Some(a) = &adverse {
            if !side.opposite().is_beyond(entering.start, a.open_price) {
                return;
            }
        }

        let size = match m.sizing {
            MartingaleSizing::Geometric => adverse.as_ref().map_or(m.base_size, |a| a.size * m.multiplier),
            MartingaleSizing::Linear => m.base_size * (count as f64 + 1.0),
        };

        let allowed = match m.cap {
            MartingaleCap::Count(max) => count < max as usize,
            MartingaleCap::Ratio(ratio) => {
                let trend_lots = ladder.lots(OrderTag::Trend);
                if trend_lots <= LOT_EPSILON {
                    // undefined ratio: refuse to escalate
                    false
                } else {
                    (ladder.lots(OrderTag::Martingale) + size) / trend_lots <= ratio + LOT_EPSILON
                }
            }
        };
        if !allowed {
            debug!(
                "[{} ladder] martingale cap {:?} blocks size {} at grid {}",
                side, m.cap, size, entering.offset
            );
            return;
        }

        ladder.open(gateway, OrderTag::Martingale, side, size, Some(entering.offset));
    }

    fn unwind_martingale(&mut self, i: usize, t: &Transition) {
        let Self {
            ladders,
            gateway,
            config,
            detached,
            ..
        } = self;
        let Some(m) = config.martingale.as_ref() else {
            return;
        };
        let Some(leaving) = t.leaving else {
            return;
        };
        let ladder = &mut ladders[i];
        let side = ladder.side();

        let Some(best) = ladder.extreme(OrderTag::Martingale, side) else {
            return;
        };
        if !side.is_beyond(leaving.start, best.open_price) {
            return;
        }

        let ids = ladder.ids(OrderTag::Martingale);
        if m.close_on_unwind {
            let closed = ladder.close_orders(gateway, &ids);
            info!(
                "[{} ladder] unwound {}/{} martingale orders past {}",
                side,
                closed,
                ids.len(),
                leaving.start
            );
        } else {
            for id in ids {
                if let Some(order) = ladder.detach(id) {
                    detached.push(order);
                }
            }
            info!(
                "[{} ladder] detached martingale orders past {}, {} awaiting close",
                side,
                leaving.start,
                detached.len()
            );
        }
    }

    fn prune_opposite(&mut self, i: usize, offset: i32) {
        let Self {
            ladders, gateway, ..
        } = self;
        let side = ladders[i].side();
        if let Some(reached) = ladders[i].state.extreme_offset_reached {
            if !side.is_beyond(offset as f64, reached as f64) {
                return;
            }
        }
        ladders[i].state.extreme_offset_reached = Some(offset);

        let Some(other) = ladders.iter_mut().find(|l| l.side() != side) else {
            return;
        };
        // The lowest-profit order goes even when every order is in profit
        if let Some((worst, profit)) = other.most_losing(&*gateway) {
            info!(
                "[{} ladder] new extreme {}, pruning {} id={} profit={:.2}",
                side,
                offset,
                worst.tag,
                worst.id,
                profit
            );
            other.close_orders(gateway, &[worst.id]);
        }
    }

    fn check_hedge(&mut self, i: usize) {
        let Self {
            ladders,
            gateway,
            config,
            ..
        } = self;
        let Some(h) = config.hedge.as_ref() else {
            return;
        };
        let ladder = &mut ladders[i];
        let peak = ladder.state.peak_net_profit;
        if peak <= h.target_profit {
            return;
        }

        let current = ladder.net_profit(&*gateway);
        if current / peak >= h.backoff_percent / 100.0 {
            return;
        }

        let hedge_lots = ladder.lots(OrderTag::Trend) - ladder.state.hedged_lots();
        if hedge_lots <= LOT_EPSILON {
            debug!("[{} ladder] drawdown but trend lots already hedged", ladder.side());
            return;
        }

        let side = ladder.side();
        if ladder
            .open(gateway, OrderTag::Hedge, side.opposite(), hedge_lots, None)
            .is_some()
        {
            ladder.state.locked_profit += current;
            ladder.state.peak_net_profit = 0.0;
            info!(
                "[{} ladder] net profit {:.2} fell from peak {:.2}; hedged {} lots, locked {:.2}",
                side, current, peak, hedge_lots, ladder.state.locked_profit
            );
        }
    }

    fn unwind_hedges(&mut self, i: usize) {
        let Self {
            ladders, gateway, ..
        } = self;
        let ladder = &mut ladders[i];
        let ids = ladder.ids(OrderTag::Hedge);
        if !ids.is_empty() {
            let closed = ladder.close_orders(gateway, &ids);
            info!("[{} ladder] reference recrossed, closed {}/{} hedges", ladder.side(), closed, ids.len());
        }
        if ladder.state.hedge_orders.is_empty() {
            ladder.state.reset_lock();
        }
    }

    fn check_trail(&mut self, i: usize) {
        let Self {
            ladders,
            gateway,
            config,
            ..
        } = self;
        let Some(trail) = config.trail.as_ref() else {
            return;
        };
        let ladder = &mut ladders[i];
        if ladder.is_flat() {
            return;
        }

        let profit = ladder.total_profit(&*gateway);
        if profit > ladder.state.trail_peak_profit {
            ladder.state.trail_peak_profit = profit;
        }
        let peak = ladder.state.trail_peak_profit;

        let reason = if peak >= trail.target_profit && profit * 100.0 / peak < trail.backoff_percent {
            "take profit"
        } else if profit < trail.stop_loss {
            "stop loss"
        } else {
            return;
        };

        let ids = ladder.all_ids();
        let closed = ladder.close_orders(gateway, &ids);
        info!(
            "[{} ladder] {} at {:.2} (peak {:.2}): closed {}/{}",
            ladder.side(),
            reason,
            profit,
            peak,
            closed,
            ids.len()
        );
        if ladder.is_flat() {
            ladder.state.trail_peak_profit = 0.0;
            ladder.state.reset_lock();
        }
    }
}
