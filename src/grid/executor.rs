//! Execution gateway abstraction - enables paper trading and mocking for tests
//!
//! Gateway calls are synchronous. Each one blocks for at most the configured
//! timeout waiting for the order to reach its target state. When the wait
//! expires the call fails with [`GatewayError::TimedOut`] but the order is not
//! rolled back: it may still fill or close later.
//!
//! [`wait_for_state`] sleeps the calling thread. Inside a tokio runtime a
//! gateway that actually waits holds its worker thread for up to the timeout,
//! so a slow gateway should be driven from `spawn_blocking` or a dedicated
//! thread. [`PaperGateway`] resolves on the first poll once it has a quote.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::market::Tick;

use super::errors::{GatewayError, GatewayResult};
use super::types::{OrderHandle, OrderId, OrderRequest, OrderSide, OrderState};

/// Order execution operations used by the ladder controller
pub trait ExecutionGateway {
    /// Submit an order and wait until it is Filled (market) or Opened (limit)
    fn submit(&mut self, request: &OrderRequest) -> GatewayResult<OrderHandle>;

    /// Close or cancel an order and wait until it is Closed/Cancelled
    fn close(&mut self, id: OrderId) -> GatewayResult<OrderHandle>;

    /// Current view of an order
    fn order(&self, id: OrderId) -> Option<OrderHandle>;

    /// Feed the latest quote. Gateways that mark to market use it.
    fn observe(&mut self, _tick: &Tick) {}

    /// Signed P&L of an order, zero when unknown
    fn profit(&self, id: OrderId) -> f64 {
        self.order(id).map_or(0.0, |o| o.profit)
    }
}

/// Poll `probe` until it reports one of `targets` or `timeout` elapses.
///
/// Returns the reached state, or the elapsed milliseconds on timeout.
pub fn wait_for_state<F>(
    timeout: Duration,
    poll: Duration,
    targets: &[OrderState],
    mut probe: F,
) -> Result<OrderState, u64>
where
    F: FnMut() -> Option<OrderState>,
{
    let started = Instant::now();
    loop {
        if let Some(state) = probe() {
            if targets.contains(&state) {
                return Ok(state);
            }
        }
        let elapsed = started.elapsed();
        if elapsed >= timeout {
            return Err(elapsed.as_millis() as u64);
        }
        std::thread::sleep(poll.min(timeout - elapsed));
    }
}

// ============================================================================
// Paper Implementation
// ============================================================================

#[derive(Debug, Clone)]
struct PaperOrder {
    handle: OrderHandle,
    limit: Option<f64>,
}

/// In-process gateway that fills at the current quote and marks positions
/// to market on every observed tick.
#[derive(Debug)]
pub struct PaperGateway {
    instrument: String,
    units_per_lot: f64,
    timeout: Duration,
    poll: Duration,
    quote: Option<(f64, f64)>,
    orders: HashMap<OrderId, PaperOrder>,
    next_id: OrderId,
    realized: f64,
}

impl PaperGateway {
    pub fn new(instrument: impl Into<String>, units_per_lot: f64, timeout: Duration) -> Self {
        Self {
            instrument: instrument.into(),
            units_per_lot,
            timeout,
            poll: Duration::from_millis(10),
            quote: None,
            orders: HashMap::new(),
            next_id: 1,
            realized: 0.0,
        }
    }

    /// Builder: set the polling interval of bounded waits
    pub fn with_poll_interval(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }

    /// Realized P&L of closed orders
    pub fn realized_pnl(&self) -> f64 {
        self.realized
    }

    /// Mark-to-market P&L of live orders
    pub fn unrealized_pnl(&self) -> f64 {
        self.orders
            .values()
            .filter(|o| o.handle.state == OrderState::Filled)
            .map(|o| o.handle.profit)
            .sum()
    }

    /// Orders still holding or waiting for a position
    pub fn live_orders(&self) -> usize {
        self.orders
            .values()
            .filter(|o| o.handle.state.is_live())
            .count()
    }

    /// Entry price for a side: buys lift the ask, sells hit the bid
    fn entry_price(&self, side: OrderSide) -> Option<f64> {
        self.quote.map(|(bid, ask)| match side {
            OrderSide::Buy => ask,
            OrderSide::Sell => bid,
        })
    }

    /// Exit price for a position opened on `side`
    fn exit_price(&self, side: OrderSide) -> Option<f64> {
        self.entry_price(side.opposite())
    }

    fn pnl(&self, handle: &OrderHandle, exit: f64) -> f64 {
        (exit - handle.open_price) * handle.direction.sign() * handle.size * self.units_per_lot
    }

    /// Try to move a Pending/Opened order to Filled
    fn try_fill(&mut self, id: OrderId) -> Option<OrderState> {
        let (side, limit, state) = {
            let order = self.orders.get(&id)?;
            (order.handle.direction, order.limit, order.handle.state)
        };
        if !matches!(state, OrderState::Pending | OrderState::Opened) {
            return Some(state);
        }

        let Some(price) = self.entry_price(side) else {
            return Some(state);
        };
        let crossed = match (limit, side) {
            (None, _) => true,
            (Some(l), OrderSide::Buy) => price <= l,
            (Some(l), OrderSide::Sell) => price >= l,
        };

        let order = self.orders.get_mut(&id)?;
        if crossed {
            order.handle.open_price = price;
            order.handle.state = OrderState::Filled;
        } else if limit.is_some() {
            order.handle.state = OrderState::Opened;
        }
        Some(order.handle.state)
    }

    fn try_close(&mut self, id: OrderId) -> Option<OrderState> {
        let handle = self.orders.get(&id)?.handle.clone();
        match handle.state {
            OrderState::Pending | OrderState::Opened => {
                let order = self.orders.get_mut(&id)?;
                order.handle.state = OrderState::Cancelled;
                Some(OrderState::Cancelled)
            }
            OrderState::Filled => {
                let exit = self.exit_price(handle.direction)?;
                let profit = self.pnl(&handle, exit);
                self.realized += profit;
                let order = self.orders.get_mut(&id)?;
                order.handle.close_price = Some(exit);
                order.handle.profit = profit;
                order.handle.state = OrderState::Closed;
                Some(OrderState::Closed)
            }
            state => Some(state),
        }
    }
}

impl ExecutionGateway for PaperGateway {
    fn submit(&mut self, request: &OrderRequest) -> GatewayResult<OrderHandle> {
        if !request.is_valid() {
            return Err(GatewayError::Rejected {
                label: request.label.clone(),
                reason: format!("invalid size {} or price {:?}", request.size, request.price),
            });
        }

        let id = self.next_id;
        self.next_id += 1;
        let handle = OrderHandle {
            id,
            label: format!("{}_{}", request.label, id),
            direction: request.direction,
            size: request.size,
            open_price: request.price.unwrap_or(0.0),
            close_price: None,
            state: OrderState::Pending,
            profit: 0.0,
        };
        self.orders.insert(
            id,
            PaperOrder {
                handle,
                limit: request.price,
            },
        );

        let targets: &[OrderState] = if request.price.is_some() {
            &[OrderState::Opened, OrderState::Filled]
        } else {
            &[OrderState::Filled]
        };
        let (timeout, poll) = (self.timeout, self.poll);
        match wait_for_state(timeout, poll, targets, || self.try_fill(id)) {
            Ok(state) => {
                debug!("Paper order {} {} on {}", id, request.label, self.instrument);
                let order = self.orders.get(&id).map(|o| o.handle.clone());
                order.filter(|h| h.state == state).ok_or(GatewayError::UnknownOrder(id))
            }
            Err(waited_ms) => {
                warn!(
                    "Paper submit of {} still pending after {}ms (no quote for {})",
                    request.label, waited_ms, self.instrument
                );
                Err(GatewayError::TimedOut {
                    operation: "submit",
                    label: request.label.clone(),
                    waited_ms,
                })
            }
        }
    }

    fn close(&mut self, id: OrderId) -> GatewayResult<OrderHandle> {
        let label = match self.orders.get(&id) {
            Some(order) => order.handle.label.clone(),
            None => return Err(GatewayError::UnknownOrder(id)),
        };

        let (timeout, poll) = (self.timeout, self.poll);
        let targets = [OrderState::Closed, OrderState::Cancelled];
        match wait_for_state(timeout, poll, &targets, || self.try_close(id)) {
            Ok(_) => self
                .orders
                .get(&id)
                .map(|o| o.handle.clone())
                .ok_or(GatewayError::UnknownOrder(id)),
            Err(waited_ms) => Err(GatewayError::TimedOut {
                operation: "close",
                label,
                waited_ms,
            }),
        }
    }

    fn order(&self, id: OrderId) -> Option<OrderHandle> {
        self.orders.get(&id).map(|o| o.handle.clone())
    }

    fn observe(&mut self, tick: &Tick) {
        if tick.instrument != self.instrument {
            return;
        }
        self.quote = Some((tick.bid, tick.ask));

        // Orders that timed out earlier may fill now; the caller is not told
        let waiting: Vec<OrderId> = self
            .orders
            .iter()
            .filter(|(_, o)| matches!(o.handle.state, OrderState::Pending | OrderState::Opened))
            .map(|(id, _)| *id)
            .collect();
        for id in waiting {
            self.try_fill(id);
        }

        let marks: Vec<(OrderId, f64)> = self
            .orders
            .iter()
            .filter(|(_, o)| o.handle.state == OrderState::Filled)
            .filter_map(|(id, o)| {
                let exit = self.exit_price(o.handle.direction)?;
                Some((*id, self.pnl(&o.handle, exit)))
            })
            .collect();
        for (id, profit) in marks {
            if let Some(order) = self.orders.get_mut(&id) {
                order.handle.profit = profit;
            }
        }
    }
}

// ============================================================================
// Mock Implementation for Testing
// ============================================================================

/// Scriptable gateway for testing the controller without a market
pub mod mock {
    use super::*;

    /// Mock gateway. Fills instantly at the last observed quote and keeps
    /// profits wherever the test puts them.
    #[derive(Debug, Default)]
    pub struct MockGateway {
        pub submitted: Vec<OrderRequest>,
        pub closed: Vec<OrderId>,
        orders: HashMap<OrderId, OrderHandle>,
        next_id: OrderId,
        quote: Option<(f64, f64)>,
        fail_submit: Option<GatewayError>,
        fail_close: Option<GatewayError>,
    }

    impl MockGateway {
        pub fn new() -> Self {
            Self {
                next_id: 1,
                ..Default::default()
            }
        }

        /// Make every following submit fail with `err`
        pub fn set_fail_submit(&mut self, err: Option<GatewayError>) {
            self.fail_submit = err;
        }

        /// Make every following close fail with `err`
        pub fn set_fail_close(&mut self, err: Option<GatewayError>) {
            self.fail_close = err;
        }

        /// Make submits time out the way a slow broker would
        pub fn time_out_submits(&mut self) {
            self.fail_submit = Some(GatewayError::TimedOut {
                operation: "submit",
                label: "mock".into(),
                waited_ms: 2000,
            });
        }

        pub fn set_profit(&mut self, id: OrderId, profit: f64) {
            if let Some(order) = self.orders.get_mut(&id) {
                order.profit = profit;
            }
        }

        /// Live orders ordered by id
        pub fn live(&self) -> Vec<&OrderHandle> {
            let mut live: Vec<_> = self
                .orders
                .values()
                .filter(|o| o.state.is_live())
                .collect();
            live.sort_by_key(|o| o.id);
            live
        }
    }

    impl ExecutionGateway for MockGateway {
        fn submit(&mut self, request: &OrderRequest) -> GatewayResult<OrderHandle> {
            if let Some(err) = &self.fail_submit {
                return Err(err.clone());
            }

            self.submitted.push(request.clone());
            let id = self.next_id;
            self.next_id += 1;
            let open_price = request.price.unwrap_or_else(|| {
                self.quote.map_or(0.0, |(bid, ask)| match request.direction {
                    OrderSide::Buy => ask,
                    OrderSide::Sell => bid,
                })
            });
            let handle = OrderHandle {
                id,
                label: request.label.clone(),
                direction: request.direction,
                size: request.size,
                open_price,
                close_price: None,
                state: OrderState::Filled,
                profit: 0.0,
            };
            self.orders.insert(id, handle.clone());
            Ok(handle)
        }

        fn close(&mut self, id: OrderId) -> GatewayResult<OrderHandle> {
            if let Some(err) = &self.fail_close {
                return Err(err.clone());
            }
            let order = self
                .orders
                .get_mut(&id)
                .ok_or(GatewayError::UnknownOrder(id))?;
            order.state = OrderState::Closed;
            self.closed.push(id);
            Ok(order.clone())
        }

        fn order(&self, id: OrderId) -> Option<OrderHandle> {
            self.orders.get(&id).cloned()
        }

        fn observe(&mut self, tick: &Tick) {
            self.quote = Some((tick.bid, tick.ask));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::types::OrderTag;
    use chrono::{TimeZone, Utc};

    fn tick(bid: f64, ask: f64) -> Tick {
        Tick::new("EURUSD", Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap(), bid, ask)
    }

    fn paper() -> PaperGateway {
        PaperGateway::new("EURUSD", 100_000.0, Duration::from_millis(20))
            .with_poll_interval(Duration::from_millis(5))
    }

    #[test]
    fn test_wait_for_state_reaches_target() {
        let mut calls = 0;
        let result = wait_for_state(
            Duration::from_millis(200),
            Duration::from_millis(1),
            &[OrderState::Filled],
            || {
                calls += 1;
                Some(if calls >= 3 { OrderState::Filled } else { OrderState::Pending })
            },
        );
        assert_eq!(result, Ok(OrderState::Filled));
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_wait_for_state_times_out() {
        let result = wait_for_state(
            Duration::from_millis(15),
            Duration::from_millis(5),
            &[OrderState::Closed],
            || Some(OrderState::Filled),
        );
        let waited = result.unwrap_err();
        assert!(waited >= 15);
    }

    #[test]
    fn test_paper_fills_at_quote_and_marks_to_market() {
        let mut gw = paper();
        gw.observe(&tick(1.1000, 1.1002));

        let buy = gw
            .submit(&OrderRequest::market(OrderTag::Trend, OrderSide::Buy, 0.01))
            .unwrap();
        assert_eq!(buy.state, OrderState::Filled);
        assert_eq!(buy.open_price, 1.1002);

        let sell = gw
            .submit(&OrderRequest::market(OrderTag::Trend, OrderSide::Sell, 0.01))
            .unwrap();
        assert_eq!(sell.open_price, 1.1000);

        gw.observe(&tick(1.1050, 1.1052));
        // buy exits at bid: (1.1050 - 1.1002) * 0.01 * 100000 = 4.8
        assert!((gw.profit(buy.id) - 4.8).abs() < 1e-6);
        // sell exits at ask: (1.1000 - 1.1052) * 0.01 * 100000 = -5.2
        assert!((gw.profit(sell.id) + 5.2).abs() < 1e-6);
        assert!((gw.unrealized_pnl() + 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_paper_close_realizes_pnl() {
        let mut gw = paper();
        gw.observe(&tick(1.1000, 1.1002));
        let buy = gw
            .submit(&OrderRequest::market(OrderTag::Trend, OrderSide::Buy, 0.01))
            .unwrap();
        gw.observe(&tick(1.1012, 1.1014));

        let closed = gw.close(buy.id).unwrap();
        assert_eq!(closed.state, OrderState::Closed);
        assert_eq!(closed.close_price, Some(1.1012));
        assert!((gw.realized_pnl() - 1.0).abs() < 1e-6);
        assert_eq!(gw.live_orders(), 0);
        assert!(matches!(gw.close(99), Err(GatewayError::UnknownOrder(99))));
    }

    #[test]
    fn test_paper_with_quote_returns_without_waiting() {
        let mut gw = PaperGateway::new("EURUSD", 100_000.0, Duration::from_secs(5));
        gw.observe(&tick(1.1000, 1.1002));

        let started = Instant::now();
        let buy = gw
            .submit(&OrderRequest::market(OrderTag::Trend, OrderSide::Buy, 0.01))
            .unwrap();
        gw.close(buy.id).unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_paper_submit_times_out_without_rollback() {
        let mut gw = paper();
        let err = gw
            .submit(&OrderRequest::market(OrderTag::Trend, OrderSide::Buy, 0.01))
            .unwrap_err();
        assert!(matches!(err, GatewayError::TimedOut { operation: "submit", .. }));

        // the order is still pending and fills once a quote arrives
        assert_eq!(gw.live_orders(), 1);
        gw.observe(&tick(1.1000, 1.1002));
        let order = gw.order(1).unwrap();
        assert_eq!(order.state, OrderState::Filled);
        assert_eq!(order.open_price, 1.1002);
    }

    #[test]
    fn test_paper_limit_order_waits_for_cross() {
        let mut gw = paper();
        gw.observe(&tick(1.1000, 1.1002));
        let req = OrderRequest::market(OrderTag::Trend, OrderSide::Buy, 0.01).with_price(1.0990);
        let handle = gw.submit(&req).unwrap();
        assert_eq!(handle.state, OrderState::Opened);

        gw.observe(&tick(1.0985, 1.0987));
        assert_eq!(gw.order(handle.id).unwrap().state, OrderState::Filled);
    }

    #[test]
    fn test_paper_rejects_invalid_size() {
        let mut gw = paper();
        gw.observe(&tick(1.1000, 1.1002));
        let err = gw
            .submit(&OrderRequest::market(OrderTag::Trend, OrderSide::Buy, -1.0))
            .unwrap_err();
        assert!(matches!(err, GatewayError::Rejected { .. }));
        assert_eq!(gw.live_orders(), 0);
    }

    #[test]
    fn test_mock_failure_injection() {
        let mut gw = mock::MockGateway::new();
        gw.time_out_submits();
        assert!(gw
            .submit(&OrderRequest::market(OrderTag::Trend, OrderSide::Buy, 0.01))
            .is_err());
        assert!(gw.submitted.is_empty());

        gw.set_fail_submit(None);
        let h = gw
            .submit(&OrderRequest::market(OrderTag::Trend, OrderSide::Buy, 0.01))
            .unwrap();
        gw.set_profit(h.id, 12.5);
        assert_eq!(gw.profit(h.id), 12.5);
        assert_eq!(gw.live().len(), 1);
    }
}
