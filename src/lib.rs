#![deny(unreachable_pub)]
pub mod config;
pub mod grid;
mod helpers;
pub mod market;
pub mod runner;
pub mod strategy;

pub use grid::{
    ExecutionGateway, GatewayError, LadderController, LadderError, LadderResult, PolicyConfig,
};
pub use helpers::{points_to_price, round_half_up};
pub use market::{Tick, TickFeed};
