//! Price-to-grid spatial index
//!
//! A [`GridIndex`] slices the price axis into fixed-width buckets numbered by
//! a signed offset from an origin price. Offsets start at `+1` directly above
//! the origin and `-1` directly below; there is no grid `0`. Each [`Grid`]
//! extends away from the origin, so a grid's `start` is the bound facing the
//! origin and `end` is the outer bound.
//!
//! Grids are materialized lazily the first time an offset is resolved and are
//! never removed. Storage is two arenas (`above`, `below`) indexed by
//! `|offset| - 1`.

use serde::Serialize;

use crate::helpers::round_half_up;

use super::errors::{LadderError, LadderResult};
use super::types::{LadderOrder, OrderId, OrderTag};

/// Immutable bounds of a grid
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GridBounds {
    pub offset: i32,
    /// Origin-facing bound
    pub start: f64,
    /// Outer bound
    pub end: f64,
}

impl GridBounds {
    /// Lowest price of the interval
    pub fn low(&self) -> f64 {
        self.start.min(self.end)
    }

    /// Highest price of the interval
    pub fn high(&self) -> f64 {
        self.start.max(self.end)
    }
}

/// A price bucket and the orders currently attributed to it
#[derive(Debug, Clone)]
pub struct Grid {
    bounds: GridBounds,
    orders: Vec<LadderOrder>,
}

impl PartialEq for Grid {
    fn eq(&self, other: &Self) -> bool {
        self.bounds.offset == other.bounds.offset
    }
}

impl Grid {
    fn new(bounds: GridBounds) -> Self {
        Self {
            bounds,
            orders: Vec::new(),
        }
    }

    pub fn offset(&self) -> i32 {
        self.bounds.offset
    }

    pub fn start(&self) -> f64 {
        self.bounds.start
    }

    pub fn end(&self) -> f64 {
        self.bounds.end
    }

    pub fn bounds(&self) -> GridBounds {
        self.bounds
    }

    pub fn orders(&self) -> &[LadderOrder] {
        &self.orders
    }

    /// Check if any order with `tag` is attributed to this grid
    pub fn has_tag(&self, tag: OrderTag) -> bool {
        self.orders.iter().any(|o| o.tag == tag)
    }

    pub(crate) fn attach(&mut self, order: LadderOrder) {
        self.orders.push(order);
    }

    pub(crate) fn detach(&mut self, id: OrderId) -> Option<LadderOrder> {
        let pos = self.orders.iter().position(|o| o.id == id)?;
        Some(self.orders.remove(pos))
    }
}

/// Lazily grown grid index around an origin price
#[derive(Debug, Clone)]
pub struct GridIndex {
    origin: f64,
    step: f64,
    scale: u32,
    above: Vec<Grid>,
    below: Vec<Grid>,
    pub(crate) last: Option<i32>,
    highest: Option<i32>,
    lowest: Option<i32>,
    pub(crate) transitions: u64,
}

impl GridIndex {
    /// Largest supported decimal scale; beyond it `f64` rounding is meaningless
    pub const MAX_SCALE: u32 = 12;

    /// Create an index. `step` must be positive and finite.
    pub fn new(origin: f64, step: f64, scale: u32) -> LadderResult<Self> {
        if !origin.is_finite() {
            return Err(LadderError::InvalidConfig(format!(
                "grid origin must be finite, got {}",
                origin
            )));
        }
        if !(step > 0.0) || !step.is_finite() {
            return Err(LadderError::InvalidConfig(format!(
                "grid step must be positive, got {}",
                step
            )));
        }
        if scale > Self::MAX_SCALE {
            return Err(LadderError::InvalidConfig(format!(
                "grid scale must be at most {}, got {}",
                Self::MAX_SCALE,
                scale
            )));
        }

        Ok(Self {
            origin,
            step,
            scale,
            above: Vec::new(),
            below: Vec::new(),
            last: None,
            highest: None,
            lowest: None,
            transitions: 0,
        })
    }

    pub fn origin(&self) -> f64 {
        self.origin
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    /// Offset of the most recently offered price
    pub fn last(&self) -> Option<i32> {
        self.last
    }

    /// Highest offset ever offered
    pub fn highest(&self) -> Option<i32> {
        self.highest
    }

    /// Lowest offset ever offered
    pub fn lowest(&self) -> Option<i32> {
        self.lowest
    }

    /// Map a price to its grid offset.
    ///
    /// A price exactly at the origin belongs to `+1`.
    pub fn offset(&self, price: f64) -> i32 {
        let front = if price >= self.origin { 1.0 } else { -1.0 };
        let d = (price - self.origin) / self.step + front;
        // `as` truncates toward zero
        round_half_up(d, self.scale) as i32
    }

    /// Bounds for `offset` using the same rounding as [`GridIndex::offset`]
    pub fn bounds_for(&self, offset: i32) -> GridBounds {
        let end = round_half_up(self.origin + offset as f64 * self.step, self.scale);
        let start = if offset > 0 {
            round_half_up(end - self.step, self.scale)
        } else {
            round_half_up(end + self.step, self.scale)
        };
        GridBounds { offset, start, end }
    }

    /// Return the grid for `offset`, materializing it and every grid between
    /// it and the origin. Offset `0` has no grid.
    pub fn resolve(&mut self, offset: i32) -> Option<&mut Grid> {
        if offset == 0 {
            return None;
        }
        let idx = (offset.unsigned_abs() - 1) as usize;
        let sign = offset.signum();

        loop {
            let len = self.arena(sign).len();
            if len > idx {
                break;
            }
            let bounds = self.bounds_for(sign * (len as i32 + 1));
            self.arena_mut(sign).push(Grid::new(bounds));
        }

        self.arena_mut(sign).get_mut(idx)
    }

    /// Look up a materialized grid
    pub fn grid(&self, offset: i32) -> Option<&Grid> {
        if offset == 0 {
            return None;
        }
        self.arena(offset.signum())
            .get((offset.unsigned_abs() - 1) as usize)
    }

    pub(crate) fn grid_mut(&mut self, offset: i32) -> Option<&mut Grid> {
        if offset == 0 {
            return None;
        }
        self.arena_mut(offset.signum())
            .get_mut((offset.unsigned_abs() - 1) as usize)
    }

    /// All materialized grids, above the origin first
    pub fn grids(&self) -> impl Iterator<Item = &Grid> {
        self.above.iter().chain(self.below.iter())
    }

    /// Number of materialized grids
    pub fn len(&self) -> usize {
        self.above.len() + self.below.len()
    }

    pub fn is_empty(&self) -> bool {
        self.above.is_empty() && self.below.is_empty()
    }

    /// Every order attributed to any grid
    pub fn orders(&self) -> impl Iterator<Item = &LadderOrder> {
        self.grids().flat_map(|g| g.orders().iter())
    }

    /// Orders carrying `tag`
    pub fn orders_tagged(&self, tag: OrderTag) -> impl Iterator<Item = &LadderOrder> {
        self.orders().filter(move |o| o.tag == tag)
    }

    /// Attach an order to the grid at `offset`
    pub fn attach(&mut self, offset: i32, order: LadderOrder) -> bool {
        match self.resolve(offset) {
            Some(grid) => {
                grid.attach(order);
                true
            }
            None => false,
        }
    }

    /// Remove an order from whichever grid holds it
    pub fn remove_order(&mut self, id: OrderId) -> Option<LadderOrder> {
        self.above
            .iter_mut()
            .chain(self.below.iter_mut())
            .find_map(|g| g.detach(id))
    }

    pub(crate) fn record_visit(&mut self, offset: i32) {
        self.highest = Some(self.highest.map_or(offset, |h| h.max(offset)));
        self.lowest = Some(self.lowest.map_or(offset, |l| l.min(offset)));
    }

    fn arena(&self, sign: i32) -> &Vec<Grid> {
        if sign > 0 {
            &self.above
        } else {
            &self.below
        }
    }

    fn arena_mut(&mut self, sign: i32) -> &mut Vec<Grid> {
        if sign > 0 {
            &mut self.above
        } else {
            &mut self.below
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::types::OrderSide;

    fn eurusd() -> GridIndex {
        GridIndex::new(1.1000, 0.0050, 4).unwrap()
    }

    fn order(id: OrderId, tag: OrderTag, offset: i32) -> LadderOrder {
        LadderOrder {
            id,
            tag,
            direction: OrderSide::Buy,
            size: 0.01,
            open_price: 1.1,
            offset: Some(offset),
        }
    }

    #[test]
    fn test_origin_maps_to_plus_one() {
        let index = eurusd();
        assert_eq!(index.offset(1.1000), 1);

        let other = GridIndex::new(42.37, 0.25, 2).unwrap();
        assert_eq!(other.offset(42.37), 1);
    }

    #[test]
    fn test_offsets_around_origin() {
        let index = eurusd();
        assert_eq!(index.offset(1.1025), 1);
        assert_eq!(index.offset(1.1049), 1);
        assert_eq!(index.offset(1.1050), 2);
        assert_eq!(index.offset(1.1060), 2);
        assert_eq!(index.offset(1.0990), -1);
        assert_eq!(index.offset(1.0951), -1);
        assert_eq!(index.offset(1.0950), -2);
        assert_eq!(index.offset(1.0900), -3);
    }

    #[test]
    fn test_offset_is_monotonic() {
        let index = eurusd();
        let mut prev = index.offset(1.0500);
        let mut price = 1.0500;
        while price < 1.1500 {
            price += 0.0001;
            let next = index.offset(price);
            assert!(next >= prev, "offset dropped at {}", price);
            assert!(next - prev <= 2, "gap at {}", price);
            assert_ne!(next, 0);
            prev = next;
        }
    }

    #[test]
    fn test_bounds_extend_away_from_origin() {
        let mut index = eurusd();
        let g1 = index.resolve(1).unwrap().bounds();
        assert_eq!(g1.start, 1.1000);
        assert_eq!(g1.end, 1.1050);

        let g2 = index.resolve(2).unwrap().bounds();
        assert_eq!(g2.start, 1.1050);
        assert_eq!(g2.end, 1.1100);

        let gm1 = index.resolve(-1).unwrap().bounds();
        assert_eq!(gm1.start, 1.1000);
        assert_eq!(gm1.end, 1.0950);
        assert_eq!(gm1.low(), 1.0950);
        assert_eq!(gm1.high(), 1.1000);
    }

    #[test]
    fn test_bounds_are_contiguous() {
        let mut index = eurusd();
        index.resolve(25);
        index.resolve(-25);

        for k in 1..25 {
            let a = index.grid(k).unwrap().end();
            let b = index.grid(k + 1).unwrap().start();
            assert_eq!(a, b, "gap between {} and {}", k, k + 1);

            // below the origin the outer bound of -k is the inner bound of -(k+1)
            let c = index.grid(-k).unwrap().end();
            let d = index.grid(-(k + 1)).unwrap().start();
            assert_eq!(c, d, "gap between {} and {}", -k, -(k + 1));
        }
    }

    #[test]
    fn test_resolve_grows_arena_in_order() {
        let mut index = eurusd();
        assert!(index.is_empty());
        index.resolve(4);
        assert_eq!(index.len(), 4);
        for k in 1..=4 {
            assert_eq!(index.grid(k).unwrap().offset(), k);
        }

        index.resolve(-2);
        assert_eq!(index.len(), 6);
        assert_eq!(index.grid(-2).unwrap().offset(), -2);

        // resolving an existing offset never grows the index
        index.resolve(3);
        assert_eq!(index.len(), 6);
        assert!(index.resolve(0).is_none());
        assert!(index.grid(0).is_none());
    }

    #[test]
    fn test_grid_equality_by_offset() {
        let mut index = eurusd();
        let a = index.resolve(2).unwrap().clone();
        index.attach(2, order(1, OrderTag::Trend, 2));
        let b = index.grid(2).unwrap().clone();
        assert_eq!(a, b);
        assert_ne!(a, index.resolve(3).unwrap().clone());
    }

    #[test]
    fn test_attach_and_remove_orders() {
        let mut index = eurusd();
        assert!(index.attach(2, order(1, OrderTag::Trend, 2)));
        assert!(index.attach(-1, order(2, OrderTag::Martingale, -1)));
        assert!(!index.attach(0, order(3, OrderTag::Trend, 0)));

        assert!(index.grid(2).unwrap().has_tag(OrderTag::Trend));
        assert!(!index.grid(2).unwrap().has_tag(OrderTag::Martingale));
        assert_eq!(index.orders().count(), 2);
        assert_eq!(index.orders_tagged(OrderTag::Martingale).count(), 1);

        let removed = index.remove_order(2).unwrap();
        assert_eq!(removed.id, 2);
        assert!(index.remove_order(2).is_none());
        assert_eq!(index.orders().count(), 1);
        // the grid itself stays
        assert!(index.grid(-1).is_some());
    }

    #[test]
    fn test_invalid_construction() {
        assert!(GridIndex::new(1.1, 0.0, 4).is_err());
        assert!(GridIndex::new(1.1, -0.005, 4).is_err());
        assert!(GridIndex::new(1.1, f64::NAN, 4).is_err());
        assert!(GridIndex::new(f64::INFINITY, 0.005, 4).is_err());
        assert!(GridIndex::new(1.1, 0.005, 13).is_err());
    }
}
