//! Trading-window and period-rollover rules

use chrono::{DateTime, Datelike, Duration, Timelike, Utc, Weekday};
use log::info;

use super::config::{BlackoutConfig, SessionConfig};

/// Why every ladder is being flushed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    /// The weekly trading window closed
    WindowClosed,
    /// The trading period elapsed
    Rollover,
}

/// What the controller should do with the current tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionVerdict {
    Trade,
    /// Outside the window or inside warmup; take no decision
    Idle,
    /// Close everything and rebuild ladders on the next eligible tick
    Flush(FlushReason),
}

impl BlackoutConfig {
    /// Check if `ts` falls inside the weekly trading window
    pub fn is_trading_time(&self, ts: DateTime<Utc>) -> bool {
        let hour = ts.hour();
        match ts.weekday() {
            Weekday::Sat => false,
            Weekday::Fri => hour < self.friday_close_hour,
            Weekday::Sun => hour >= self.sunday_open_hour,
            _ => true,
        }
    }
}

/// Tracks the current trading period across ticks
#[derive(Debug, Clone)]
pub struct SessionClock {
    config: SessionConfig,
    period_start: Option<DateTime<Utc>>,
    open: bool,
}

impl SessionClock {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            period_start: None,
            open: false,
        }
    }

    /// Start of the current period, once a trading tick has been seen
    pub fn period_start(&self) -> Option<DateTime<Utc>> {
        self.period_start
    }

    /// Classify a tick timestamp
    pub fn observe(&mut self, now: DateTime<Utc>) -> SessionVerdict {
        if let Some(blackout) = &self.config.blackout {
            if !blackout.is_trading_time(now) {
                self.period_start = None;
                if self.open {
                    self.open = false;
                    info!("Trading window closed at {}", now);
                    return SessionVerdict::Flush(FlushReason::WindowClosed);
                }
                return SessionVerdict::Idle;
            }
        }
        self.open = true;

        let start = *self.period_start.get_or_insert(now);
        if let Some(period) = self.config.period_minutes {
            if now - start >= Duration::minutes(period as i64) {
                info!("Trading period of {}min ended at {}", period, now);
                self.period_start = Some(now);
                return SessionVerdict::Flush(FlushReason::Rollover);
            }
        }

        if now - start < Duration::minutes(self.config.warmup_minutes as i64) {
            return SessionVerdict::Idle;
        }
        SessionVerdict::Trade
    }
}
