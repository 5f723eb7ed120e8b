//! Core data types for the ladder engine

use serde::{Deserialize, Serialize};
use std::fmt;

/// Gateway-assigned order identifier
pub type OrderId = u64;

/// Order direction. Also identifies a ladder: the Buy ladder follows the ask
/// upward, the Sell ladder follows the bid downward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Returns the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "Buy",
            OrderSide::Sell => "Sell",
        }
    }

    /// +1 for Buy, -1 for Sell. Multiplies a price change into position P&L.
    pub fn sign(&self) -> f64 {
        match self {
            OrderSide::Buy => 1.0,
            OrderSide::Sell => -1.0,
        }
    }

    /// True when price `a` lies strictly further than `b` in this side's
    /// trend direction (higher for Buy, lower for Sell).
    pub fn is_beyond(&self, a: f64, b: f64) -> bool {
        match self {
            OrderSide::Buy => a > b,
            OrderSide::Sell => a < b,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engine-side classification of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderTag {
    /// Opened as the ladder extends in its own direction
    Trend,
    /// Opened on retracement, sized off the previous martingale order
    Martingale,
    /// Opposite-direction order that locks net profit
    Hedge,
}

impl OrderTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderTag::Trend => "Trend",
            OrderTag::Martingale => "Martingale",
            OrderTag::Hedge => "Hedge",
        }
    }
}

impl fmt::Display for OrderTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order lifecycle as reported by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderState {
    /// Accepted, not yet working
    Pending,
    /// Working limit/stop order
    Opened,
    /// Position is open
    Filled,
    /// Position closed
    Closed,
    /// Cancelled before filling
    Cancelled,
}

impl OrderState {
    /// Check if the order holds or may still hold a position
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            OrderState::Pending | OrderState::Opened | OrderState::Filled
        )
    }

    /// Check if the order reached a final state
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderState::Closed | OrderState::Cancelled)
    }
}

/// Request passed to the execution gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Display label, never parsed back
    pub label: String,
    pub direction: OrderSide,
    pub size: f64,
    /// Limit price; `None` for a market order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    pub tag: OrderTag,
}

impl OrderRequest {
    /// Market order request
    pub fn market(tag: OrderTag, direction: OrderSide, size: f64) -> Self {
        Self {
            label: format!("{}{}", direction, tag),
            direction,
            size,
            price: None,
            tag,
        }
    }

    /// Builder: set the display label
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Builder: turn into a limit order
    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    pub fn is_valid(&self) -> bool {
        self.size > 0.0 && self.size.is_finite() && self.price.map_or(true, |p| p > 0.0)
    }
}

/// Gateway-owned view of an order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderHandle {
    pub id: OrderId,
    pub label: String,
    pub direction: OrderSide,
    pub size: f64,
    pub open_price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_price: Option<f64>,
    pub state: OrderState,
    /// Signed P&L in account currency
    pub profit: f64,
}

/// Engine bookkeeping for an order attributed to a grid (or held as a hedge)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LadderOrder {
    pub id: OrderId,
    pub tag: OrderTag,
    pub direction: OrderSide,
    pub size: f64,
    pub open_price: f64,
    /// Grid offset the order was opened against; `None` for hedges
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<i32>,
}

impl LadderOrder {
    /// Record a successfully submitted order
    pub fn from_handle(handle: &OrderHandle, tag: OrderTag, offset: Option<i32>) -> Self {
        Self {
            id: handle.id,
            tag,
            direction: handle.direction,
            size: handle.size,
            open_price: handle.open_price,
            offset,
        }
    }
}
