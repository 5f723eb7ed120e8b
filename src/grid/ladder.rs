//! One side of a strategy instance: its grid indexes, orders and state

use log::{error, info, warn};
use serde::Serialize;

use super::dispatch::Movement;
use super::errors::LadderResult;
use super::executor::ExecutionGateway;
use super::index::GridIndex;
use super::types::{LadderOrder, OrderId, OrderRequest, OrderSide, OrderTag};

/// Mutable per-ladder counters. Each field goes back to zero (or empty) when
/// the condition that armed it fires.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LadderState {
    /// Highest net profit seen when a trend order was placed
    pub peak_net_profit: f64,
    /// Net profit already locked by hedges
    pub locked_profit: f64,
    /// Open hedge orders, not attributed to any grid
    pub hedge_orders: Vec<LadderOrder>,
    /// Consecutive grid changes in the same direction
    pub consecutive_direction_count: u32,
    #[serde(skip)]
    last_movement: Option<Movement>,
    /// Furthest trend-direction offset reached since the last reset
    pub extreme_offset_reached: Option<i32>,
    /// Highest total profit seen by the profit trail
    pub trail_peak_profit: f64,
}

impl LadderState {
    /// Count a grid change and return the length of the current run
    pub fn record_movement(&mut self, movement: Movement) -> u32 {
        if self.last_movement == Some(movement) {
            self.consecutive_direction_count += 1;
        } else {
            self.last_movement = Some(movement);
            self.consecutive_direction_count = 1;
        }
        self.consecutive_direction_count
    }

    /// Lots already covered by hedges
    pub fn hedged_lots(&self) -> f64 {
        self.hedge_orders.iter().map(|o| o.size).sum()
    }

    /// Forget locked and peak profit
    pub fn reset_lock(&mut self) {
        self.peak_net_profit = 0.0;
        self.locked_profit = 0.0;
    }
}

/// Grid indexes and order bookkeeping for one side
#[derive(Debug, Clone)]
pub struct Ladder {
    side: OrderSide,
    pub(crate) trend: GridIndex,
    /// Separate martingale grid; martingale orders share `trend` when unset
    pub(crate) martingale: Option<GridIndex>,
    pub state: LadderState,
}

impl Ladder {
    pub fn new(
        side: OrderSide,
        origin: f64,
        trend_step: f64,
        martingale_step: Option<f64>,
        scale: u32,
    ) -> LadderResult<Self> {
        let trend = GridIndex::new(origin, trend_step, scale)?;
        let martingale = martingale_step
            .map(|step| GridIndex::new(origin, step, scale))
            .transpose()?;
        Ok(Self {
            side,
            trend,
            martingale,
            state: LadderState::default(),
        })
    }

    pub fn side(&self) -> OrderSide {
        self.side
    }

    /// Movement that extends this ladder in its own direction
    pub fn outward(&self) -> Movement {
        match self.side {
            OrderSide::Buy => Movement::Up,
            OrderSide::Sell => Movement::Down,
        }
    }

    pub fn trend_index(&self) -> &GridIndex {
        &self.trend
    }

    /// Index holding martingale orders
    pub fn martingale_index(&self) -> &GridIndex {
        self.martingale.as_ref().unwrap_or(&self.trend)
    }

    pub(crate) fn martingale_index_mut(&mut self) -> &mut GridIndex {
        self.martingale.as_mut().unwrap_or(&mut self.trend)
    }

    pub fn has_separate_martingale(&self) -> bool {
        self.martingale.is_some()
    }

    /// Orders carrying `tag`
    pub fn orders(&self, tag: OrderTag) -> Vec<&LadderOrder> {
        match tag {
            OrderTag::Trend => self.trend.orders_tagged(tag).collect(),
            OrderTag::Martingale => self.martingale_index().orders_tagged(tag).collect(),
            OrderTag::Hedge => self.state.hedge_orders.iter().collect(),
        }
    }

    /// Every order on this ladder, hedges included
    pub fn all_orders(&self) -> Vec<&LadderOrder> {
        let mut orders: Vec<&LadderOrder> = self.trend.orders().collect();
        if let Some(m) = &self.martingale {
            orders.extend(m.orders());
        }
        orders.extend(self.state.hedge_orders.iter());
        orders
    }

    pub fn is_flat(&self) -> bool {
        self.all_orders().is_empty()
    }

    /// Total size of orders carrying `tag`
    pub fn lots(&self, tag: OrderTag) -> f64 {
        self.orders(tag).iter().map(|o| o.size).sum()
    }

    /// The `tag` order whose open price lies furthest in `toward`'s trend
    /// direction: the highest for Buy, the lowest for Sell.
    pub fn extreme(&self, tag: OrderTag, toward: OrderSide) -> Option<&LadderOrder> {
        self.orders(tag).into_iter().fold(None, |best, o| match best {
            Some(b) if !toward.is_beyond(o.open_price, b.open_price) => Some(b),
            _ => Some(o),
        })
    }

    /// Summed gateway profit of orders carrying `tag`
    pub fn profit<G: ExecutionGateway + ?Sized>(&self, gateway: &G, tag: OrderTag) -> f64 {
        self.orders(tag).iter().map(|o| gateway.profit(o.id)).sum()
    }

    /// Trend profit plus hedge profit minus locked profit
    pub fn net_profit<G: ExecutionGateway + ?Sized>(&self, gateway: &G) -> f64 {
        self.profit(gateway, OrderTag::Trend) + self.profit(gateway, OrderTag::Hedge)
            - self.state.locked_profit
    }

    /// Profit of every order on the ladder
    pub fn total_profit<G: ExecutionGateway + ?Sized>(&self, gateway: &G) -> f64 {
        self.all_orders().iter().map(|o| gateway.profit(o.id)).sum()
    }

    /// Grid-attributed order with the lowest profit
    pub fn most_losing<G: ExecutionGateway + ?Sized>(&self, gateway: &G) -> Option<(LadderOrder, f64)> {
        self.all_orders()
            .into_iter()
            .filter(|o| o.tag != OrderTag::Hedge)
            .map(|o| (o.clone(), gateway.profit(o.id)))
            .fold(None, |worst, (o, p)| match worst {
                Some((w, wp)) if wp <= p => Some((w, wp)),
                _ => Some((o, p)),
            })
    }

    /// Submit an order and record it on success. A failed submit leaves the
    /// ladder untouched. Trend and martingale orders need a non-zero grid
    /// offset; without one nothing is submitted.
    pub fn open<G: ExecutionGateway + ?Sized>(
        &mut self,
        gateway: &mut G,
        tag: OrderTag,
        direction: OrderSide,
        size: f64,
        offset: Option<i32>,
    ) -> Option<LadderOrder> {
        let has_slot = match (tag, offset) {
            (OrderTag::Hedge, _) => true,
            (_, Some(o)) => o != 0,
            (_, None) => false,
        };
        if !has_slot {
            warn!(
                "[{} ladder] not opening {} {}: offset {:?} has no grid",
                self.side, direction, tag, offset
            );
            return None;
        }

        let label = match offset {
            Some(o) => format!("{}{}@{}", direction, tag, o),
            None => format!("{}{}", direction, tag),
        };
        let request = OrderRequest::market(tag, direction, size).with_label(label);

        let handle = match gateway.submit(&request) {
            Ok(handle) => handle,
            Err(e) => {
                error!("[{} ladder] failed to open {}: {}", self.side, request.label, e);
                return None;
            }
        };

        let order = LadderOrder::from_handle(&handle, tag, offset);
        match (tag, offset) {
            (OrderTag::Trend, Some(o)) => {
                self.trend.attach(o, order.clone());
            }
            (OrderTag::Martingale, Some(o)) => {
                self.martingale_index_mut().attach(o, order.clone());
            }
            _ => self.state.hedge_orders.push(order.clone()),
        }

        info!(
            "[{} ladder] opened {} id={} size={} at {}",
            self.side, request.label, handle.id, handle.size, handle.open_price
        );
        Some(order)
    }

    /// Close the given orders one by one. Orders whose close fails stay on
    /// the ladder. Returns how many were closed.
    pub fn close_orders<G: ExecutionGateway + ?Sized>(
        &mut self,
        gateway: &mut G,
        ids: &[OrderId],
    ) -> usize {
        let mut closed = 0;
        for &id in ids {
            match gateway.close(id) {
                Ok(handle) => {
                    self.detach(id);
                    closed += 1;
                    info!(
                        "[{} ladder] closed {} id={} profit={:.2}",
                        self.side, handle.label, id, handle.profit
                    );
                }
                Err(e) => error!("[{} ladder] failed to close id={}: {}", self.side, id, e),
            }
        }
        closed
    }

    /// Remove an order from the ladder's bookkeeping without closing it
    pub fn detach(&mut self, id: OrderId) -> Option<LadderOrder> {
        if let Some(pos) = self.state.hedge_orders.iter().position(|o| o.id == id) {
            return Some(self.state.hedge_orders.remove(pos));
        }
        self.trend
            .remove_order(id)
            .or_else(|| self.martingale.as_mut().and_then(|m| m.remove_order(id)))
    }

    pub fn ids(&self, tag: OrderTag) -> Vec<OrderId> {
        self.orders(tag).iter().map(|o| o.id).collect()
    }

    pub fn all_ids(&self) -> Vec<OrderId> {
        self.all_orders().iter().map(|o| o.id).collect()
    }

    /// Consume the ladder, returning every order it still tracks
    pub fn into_orders(self) -> Vec<LadderOrder> {
        self.all_orders().into_iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::executor::mock::MockGateway;

    fn ladder(side: OrderSide) -> Ladder {
        Ladder::new(side, 1.1000, 0.0050, None, 4).unwrap()
    }

    #[test]
    fn test_record_movement_runs() {
        let mut state = LadderState::default();
        assert_eq!(state.record_movement(Movement::Up), 1);
        assert_eq!(state.record_movement(Movement::Up), 2);
        assert_eq!(state.record_movement(Movement::Down), 1);
        assert_eq!(state.record_movement(Movement::Up), 1);
    }

    #[test]
    fn test_open_records_by_tag() {
        let mut gw = MockGateway::new();
        let mut l = ladder(OrderSide::Buy);

        l.open(&mut gw, OrderTag::Trend, OrderSide::Buy, 0.01, Some(2)).unwrap();
        l.open(&mut gw, OrderTag::Martingale, OrderSide::Buy, 0.02, Some(-1)).unwrap();
        l.open(&mut gw, OrderTag::Hedge, OrderSide::Sell, 0.01, None).unwrap();

        assert!(l.trend_index().grid(2).unwrap().has_tag(OrderTag::Trend));
        assert!(l.martingale_index().grid(-1).unwrap().has_tag(OrderTag::Martingale));
        assert_eq!(l.state.hedge_orders.len(), 1);
        assert_eq!(l.all_orders().len(), 3);
        assert!((l.lots(OrderTag::Martingale) - 0.02).abs() < 1e-12);
        assert!((l.state.hedged_lots() - 0.01).abs() < 1e-12);
        assert_eq!(gw.submitted[0].label, "BuyTrend@2");
    }

    #[test]
    fn test_failed_open_leaves_ladder_untouched() {
        let mut gw = MockGateway::new();
        gw.time_out_submits();
        let mut l = ladder(OrderSide::Buy);
        assert!(l.open(&mut gw, OrderTag::Trend, OrderSide::Buy, 0.01, Some(2)).is_none());
        assert!(l.is_flat());
        // the grid was never materialized either
        assert!(l.trend_index().grid(2).is_none());
    }

    #[test]
    fn test_open_without_grid_submits_nothing() {
        let mut gw = MockGateway::new();
        let mut l = ladder(OrderSide::Buy);
        assert!(l.open(&mut gw, OrderTag::Trend, OrderSide::Buy, 0.01, None).is_none());
        assert!(l.open(&mut gw, OrderTag::Martingale, OrderSide::Buy, 0.01, Some(0)).is_none());
        assert!(gw.submitted.is_empty());
        assert!(gw.live().is_empty());
        assert!(l.is_flat());
    }

    #[test]
    fn test_extremes_by_direction() {
        let mut gw = MockGateway::new();
        let mut l = ladder(OrderSide::Sell);
        for (price, offset) in [(1.1060, 2), (1.1010, 1), (1.1120, 3)] {
            gw.observe(&crate::market::Tick::new(
                "EURUSD",
                chrono::Utc::now(),
                price,
                price,
            ));
            l.open(&mut gw, OrderTag::Martingale, OrderSide::Sell, 0.01, Some(offset));
        }
        let lowest = l.extreme(OrderTag::Martingale, OrderSide::Sell).unwrap();
        assert_eq!(lowest.open_price, 1.1010);
        let highest = l.extreme(OrderTag::Martingale, OrderSide::Buy).unwrap();
        assert_eq!(highest.open_price, 1.1120);
        assert!(l.extreme(OrderTag::Trend, OrderSide::Buy).is_none());
    }

    #[test]
    fn test_profit_queries_and_close() {
        let mut gw = MockGateway::new();
        let mut l = ladder(OrderSide::Buy);
        let a = l.open(&mut gw, OrderTag::Trend, OrderSide::Buy, 0.01, Some(1)).unwrap();
        let b = l.open(&mut gw, OrderTag::Trend, OrderSide::Buy, 0.01, Some(2)).unwrap();
        let h = l.open(&mut gw, OrderTag::Hedge, OrderSide::Sell, 0.02, None).unwrap();
        gw.set_profit(a.id, -30.0);
        gw.set_profit(b.id, -10.0);
        gw.set_profit(h.id, 25.0);
        l.state.locked_profit = 5.0;

        assert!((l.net_profit(&gw) - (-20.0)).abs() < 1e-9);
        assert!((l.total_profit(&gw) - (-15.0)).abs() < 1e-9);
        let (worst, p) = l.most_losing(&gw).unwrap();
        assert_eq!(worst.id, a.id);
        assert_eq!(p, -30.0);

        gw.set_fail_close(Some(crate::grid::errors::GatewayError::UnknownOrder(a.id)));
        assert_eq!(l.close_orders(&mut gw, &[a.id]), 0);
        assert_eq!(l.all_orders().len(), 3);

        gw.set_fail_close(None);
        let ids = l.all_ids();
        assert_eq!(l.close_orders(&mut gw, &ids), 3);
        assert!(l.is_flat());
    }
}
