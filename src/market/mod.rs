//! Market data module
//!
//! Collaborators that feed the ladder engine:
//!
//! - [`Tick`] - one bid/ask quote for an instrument
//! - [`TickFeed`] - async source of ticks delivered over an mpsc channel
//!   ([`ReplayFeed`] reads JSON lines, [`feed::mock::MockTickFeed`] for tests)
//! - [`MovingAverage`] - scalar indicator used by the regime filter
//!   ([`TickSma`] is a rolling tick average)
//!
//! # Example
//!
//! ```rust,ignore
//! use grid_ladder::market::{ReplayFeed, TickFeed};
//!
//! let mut feed = ReplayFeed::new("ticks/eurusd.jsonl");
//! let mut rx = feed.subscribe("EURUSD").await?;
//! while let Some(tick) = rx.recv().await {
//!     println!("{} {} {}", tick.timestamp, tick.bid, tick.ask);
//! }
//! ```

pub mod feed;
mod indicator;
mod types;

pub use feed::{ReplayFeed, TickFeed};
pub use indicator::{MovingAverage, TickSma};
pub use types::Tick;
