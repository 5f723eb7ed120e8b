//! Core data types for market data

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One quote update from the feed
///
/// Ticks for an instrument are delivered serially and in time order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    /// Instrument identifier (e.g., "EURUSD")
    pub instrument: String,
    pub timestamp: DateTime<Utc>,
    pub bid: f64,
    pub ask: f64,
}

impl Tick {
    /// Create a new tick
    pub fn new(instrument: impl Into<String>, timestamp: DateTime<Utc>, bid: f64, ask: f64) -> Self {
        Self {
            instrument: instrument.into(),
            timestamp,
            bid,
            ask,
        }
    }

    /// Validate the quote
    pub fn is_valid(&self) -> bool {
        self.bid > 0.0 && self.ask > 0.0 && self.bid <= self.ask && self.bid.is_finite() && self.ask.is_finite()
    }

    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }

    pub fn spread(&self) -> f64 {
        self.ask - self.bid
    }
}
