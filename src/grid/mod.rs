//! Grid-indexed order ladders
//!
//! Prices are mapped onto a signed lattice of grids around an origin. Each
//! ladder reacts only when the price changes grid, placing trend orders as
//! it extends and martingale or hedge orders as it retraces.
//!
//! # Architecture
//!
//! - [`config`] - Policy and instrument configuration with validation
//! - [`types`] - Order sides, tags, requests and handles
//! - [`errors`] - Ladder and gateway error types
//! - [`index`] - Price to grid mapping and the lazily grown grid arena
//! - [`dispatch`] - Grid-change detection and listeners
//! - [`ladder`] - One side's indexes, orders and counters
//! - [`session`] - Trading window and period rollover
//! - [`executor`] - Execution gateway abstraction (paper and mock)
//! - [`controller`] - Policy rules driving both ladders
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use grid_ladder::grid::{InstrumentSpec, LadderController, PaperGateway, PolicyConfig};
//! use std::time::Duration;
//!
//! // 50 point grids, 0.001 lots per trend order
//! let policy = PolicyConfig::new("trend", 50.0, 0.001).with_hedge(100.0, 50.0);
//! let instrument = InstrumentSpec::new("EURUSD", 0.0001, 4);
//! let gateway = PaperGateway::new("EURUSD", 100_000.0, Duration::from_secs(2));
//!
//! let mut controller = LadderController::new(policy, instrument, gateway)?;
//! while let Some(tick) = ticks.recv().await {
//!     controller.on_tick(&tick);
//! }
//! controller.close_all();
//! ```
//!
//! # Testing
//!
//! ```rust,ignore
//! use grid_ladder::grid::executor::mock::MockGateway;
//!
//! let mut gateway = MockGateway::new();
//! gateway.time_out_submits();
//! // Use in tests...
//! ```

pub mod config;
pub mod controller;
pub mod dispatch;
pub mod errors;
pub mod executor;
pub mod index;
pub mod ladder;
pub mod session;
pub mod types;

// Re-export commonly used types
pub use config::{
    BlackoutConfig, HedgeConfig, InstrumentSpec, MartingaleCap, MartingaleConfig,
    MartingaleSizing, PolicyConfig, RegimeConfig, SessionConfig, TrailConfig, TrendConfig,
};
pub use controller::{ControllerSummary, LadderController, LadderSummary};
pub use dispatch::{Movement, Transition, TransitionListener};
pub use errors::{GatewayError, GatewayResult, LadderError, LadderResult};
pub use executor::{ExecutionGateway, PaperGateway};
pub use index::{Grid, GridBounds, GridIndex};
pub use ladder::{Ladder, LadderState};
pub use session::{FlushReason, SessionClock, SessionVerdict};
pub use types::{LadderOrder, OrderHandle, OrderId, OrderRequest, OrderSide, OrderState, OrderTag};
