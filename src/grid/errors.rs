//! Ladder engine error types

use thiserror::Error;

use super::types::OrderId;

/// Fatal errors raised while building or starting the engine
#[derive(Error, Debug, Clone)]
pub enum LadderError {
    #[error("Invalid ladder configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown policy preset: {0}")]
    UnknownPolicy(String),

    #[error("Tick feed error: {0}")]
    Feed(String),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("JSON parse error: {0}")]
    JsonParse(String),
}

impl From<serde_json::Error> for LadderError {
    fn from(err: serde_json::Error) -> Self {
        LadderError::JsonParse(err.to_string())
    }
}

impl From<std::io::Error> for LadderError {
    fn from(err: std::io::Error) -> Self {
        LadderError::Io(err.to_string())
    }
}

impl From<config::ConfigError> for LadderError {
    fn from(err: config::ConfigError) -> Self {
        LadderError::Settings(err.to_string())
    }
}

/// Per-call execution failures. These are logged by the controller and never
/// abort the engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    /// The bounded wait expired. The order is NOT cancelled and may still
    /// change state later without the caller being told.
    #[error("{operation} of '{label}' timed out after {waited_ms}ms (order state unknown)")]
    TimedOut {
        operation: &'static str,
        label: String,
        waited_ms: u64,
    },

    #[error("Order '{label}' rejected: {reason}")]
    Rejected { label: String, reason: String },

    #[error("Unknown order: id {0}")]
    UnknownOrder(OrderId),
}

/// Result type for engine construction and startup
pub type LadderResult<T> = std::result::Result<T, LadderError>;

/// Result type for gateway calls
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;
