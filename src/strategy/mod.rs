//! Policy presets
//!
//! Every ladder policy is a [`PolicyConfig`](crate::grid::PolicyConfig). This
//! module names the common variants and builds them from the free-form
//! `params` table of the settings file.
//!
//! | name               | adds to the trend ladder                                   |
//! |--------------------|------------------------------------------------------------|
//! | `trend`            | nothing                                                    |
//! | `trend_martingale` | geometric martingale on a finer grid, periods, weekly window |
//! | `retracement`      | two-grid confirmation, linear martingale, periods            |
//! | `hedging`          | MA regime filter, ratio-capped martingale, pruning, hedges  |
//! | `profit_trail`     | trailing take profit and stop loss per ladder              |
//!
//! # Example
//!
//! ```rust,ignore
//! use grid_ladder::strategy::PolicyRegistry;
//!
//! let registry = PolicyRegistry::with_presets();
//! let policy = registry.create("hedging", &params)?;
//! ```
//!
//! Custom policies register a [`PolicyFactory`]; any
//! `Fn(&HashMap<String, Value>) -> LadderResult<PolicyConfig>` qualifies.

pub mod presets;
pub mod registry;

pub use presets::Params;
pub use registry::{PolicyFactory, PolicyRegistry};
