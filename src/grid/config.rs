//! Ladder policy configuration
//!
//! Every policy variant is a [`PolicyConfig`]: a trend ladder plus optional
//! martingale, hedge, profit-trail, regime-filter and session sections. All
//! values are fixed once the controller is built.

use serde::{Deserialize, Serialize};

use crate::helpers::points_to_price;

use super::errors::{LadderError, LadderResult};

/// Instrument pricing information
///
/// A *point* is a tenth of a pip; grid steps are configured in points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentSpec {
    /// Instrument identifier (e.g. "EURUSD")
    pub symbol: String,
    /// Price value of one pip (0.0001 for EURUSD)
    pub pip_value: f64,
    /// Decimal places of one pip (4 for EURUSD)
    pub pip_scale: u32,
}

impl InstrumentSpec {
    pub fn new(symbol: impl Into<String>, pip_value: f64, pip_scale: u32) -> Self {
        Self {
            symbol: symbol.into(),
            pip_value,
            pip_scale,
        }
    }

    /// Price value of one point
    pub fn point(&self) -> f64 {
        self.pip_value * 0.1
    }

    /// Decimal scale used for grid rounding
    pub fn scale(&self) -> u32 {
        self.pip_scale + 1
    }

    /// Convert a point count to a price distance
    pub fn points_to_price(&self, points: f64) -> f64 {
        points_to_price(points, self.point(), self.scale())
    }

    pub fn validate(&self) -> LadderResult<()> {
        if self.symbol.is_empty() {
            return Err(LadderError::InvalidConfig("symbol cannot be empty".into()));
        }
        if !(self.pip_value > 0.0) {
            return Err(LadderError::InvalidConfig(
                "pip_value must be positive".into(),
            ));
        }
        if self.scale() > crate::grid::GridIndex::MAX_SCALE {
            return Err(LadderError::InvalidConfig(format!(
                "pip_scale {} is too large",
                self.pip_scale
            )));
        }
        Ok(())
    }
}

/// Trend order placement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendConfig {
    /// Size of every trend order
    pub base_size: f64,
    /// Consecutive outward grid changes required before a trend order
    #[serde(default = "default_confirmation")]
    pub confirmation: u32,
}

fn default_confirmation() -> u32 {
    1
}

/// Upper bound on martingale escalation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MartingaleCap {
    /// At most this many martingale orders per ladder
    Count(u32),
    /// `(martingale lots + candidate) / trend lots` must stay at or below this
    Ratio(f64),
}

/// How the next martingale size is derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MartingaleSizing {
    /// Previous martingale size times the multiplier
    #[default]
    Geometric,
    /// Base size times (existing count + 1)
    Linear,
}

/// Martingale escalation and unwind
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MartingaleConfig {
    /// Size of the first martingale order
    pub base_size: f64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    pub cap: MartingaleCap,
    #[serde(default)]
    pub sizing: MartingaleSizing,
    /// Own grid step in points; martingale orders share the trend ladder when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_points: Option<f64>,
    /// Close martingale orders on unwind; when false they are detached and
    /// closed at the next session flush
    #[serde(default = "default_true")]
    pub close_on_unwind: bool,
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

/// Profit-lock hedging
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HedgeConfig {
    /// Peak net profit that arms the drawdown watch
    pub target_profit: f64,
    /// Hedge when current/peak drops below this percentage
    pub backoff_percent: f64,
}

/// Per-ladder trailing take profit and stop loss, checked every tick
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrailConfig {
    pub target_profit: f64,
    pub backoff_percent: f64,
    /// Negative profit that closes the ladder
    pub stop_loss: f64,
}

/// Moving-average regime filter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeConfig {
    /// Moving-average window in ticks
    pub ma_period: usize,
    /// Ladders are only built while the bid is within this many points of the average
    #[serde(default = "default_origin_band")]
    pub origin_band_points: f64,
}

fn default_origin_band() -> f64 {
    200.0
}

/// Weekly trading window, all hours UTC
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlackoutConfig {
    /// Trading stops on Friday at this hour
    #[serde(default = "default_friday_close_hour")]
    pub friday_close_hour: u32,
    /// Trading resumes on Sunday at this hour
    #[serde(default = "default_sunday_open_hour")]
    pub sunday_open_hour: u32,
}

fn default_friday_close_hour() -> u32 {
    18
}

fn default_sunday_open_hour() -> u32 {
    22
}

impl Default for BlackoutConfig {
    fn default() -> Self {
        Self {
            friday_close_hour: default_friday_close_hour(),
            sunday_open_hour: default_sunday_open_hour(),
        }
    }
}

/// Session boundaries that flush every ladder
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SessionConfig {
    /// Close everything and restart after this many minutes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_minutes: Option<u32>,
    /// Ignore ticks for this many minutes at the start of each period
    #[serde(default)]
    pub warmup_minutes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blackout: Option<BlackoutConfig>,
}

/// Complete policy for one controller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Preset or user-given name, used in logs
    pub name: String,
    /// Trend ladder grid step, in points
    pub grid_step_points: f64,
    pub trend: TrendConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub martingale: Option<MartingaleConfig>,
    /// Close the other ladder's most-losing order on each new extreme
    #[serde(default)]
    pub prune_opposite: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hedge: Option<HedgeConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trail: Option<TrailConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regime: Option<RegimeConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionConfig>,
}

impl PolicyConfig {
    /// Trend-only policy
    pub fn new(name: impl Into<String>, grid_step_points: f64, base_size: f64) -> Self {
        Self {
            name: name.into(),
            grid_step_points,
            trend: TrendConfig {
                base_size,
                confirmation: default_confirmation(),
            },
            martingale: None,
            prune_opposite: false,
            hedge: None,
            trail: None,
            regime: None,
            session: None,
        }
    }

    /// Builder: require consecutive outward moves before a trend order
    pub fn with_confirmation(mut self, confirmation: u32) -> Self {
        self.trend.confirmation = confirmation;
        self
    }

    /// Builder: enable martingale escalation
    pub fn with_martingale(mut self, martingale: MartingaleConfig) -> Self {
        self.martingale = Some(martingale);
        self
    }

    /// Builder: enable opposite-ladder loss pruning
    pub fn with_pruning(mut self, enabled: bool) -> Self {
        self.prune_opposite = enabled;
        self
    }

    /// Builder: enable profit-lock hedging
    pub fn with_hedge(mut self, target_profit: f64, backoff_percent: f64) -> Self {
        self.hedge = Some(HedgeConfig {
            target_profit,
            backoff_percent,
        });
        self
    }

    /// Builder: enable the per-tick profit trail
    pub fn with_trail(mut self, target_profit: f64, backoff_percent: f64, stop_loss: f64) -> Self {
        self.trail = Some(TrailConfig {
            target_profit,
            backoff_percent,
            stop_loss,
        });
        self
    }

    /// Builder: enable the moving-average regime filter
    pub fn with_regime(mut self, ma_period: usize, origin_band_points: f64) -> Self {
        self.regime = Some(RegimeConfig {
            ma_period,
            origin_band_points,
        });
        self
    }

    /// Builder: set session boundaries
    pub fn with_session(mut self, session: SessionConfig) -> Self {
        self.session = Some(session);
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> LadderResult<()> {
        if !(self.grid_step_points > 0.0) {
            return Err(LadderError::InvalidConfig(
                "grid_step_points must be positive".into(),
            ));
        }

        if !(self.trend.base_size > 0.0) {
            return Err(LadderError::InvalidConfig(
                "trend.base_size must be positive".into(),
            ));
        }

        if let Some(m) = &self.martingale {
            if !(m.base_size > 0.0) {
                return Err(LadderError::InvalidConfig(
                    "martingale.base_size must be positive".into(),
                ));
            }
            if !(m.multiplier >= 1.0) {
                return Err(LadderError::InvalidConfig(
                    "martingale.multiplier must be at least 1".into(),
                ));
            }
            match m.cap {
                MartingaleCap::Count(0) => {
                    return Err(LadderError::InvalidConfig(
                        "martingale count cap must be at least 1".into(),
                    ));
                }
                MartingaleCap::Ratio(r) if !(r > 0.0) => {
                    return Err(LadderError::InvalidConfig(
                        "martingale ratio cap must be positive".into(),
                    ));
                }
                _ => {}
            }
            if let Some(step) = m.step_points {
                if !(step > 0.0) {
                    return Err(LadderError::InvalidConfig(
                        "martingale.step_points must be positive".into(),
                    ));
                }
            }
        }

        if let Some(h) = &self.hedge {
            if !(h.target_profit > 0.0) {
                return Err(LadderError::InvalidConfig(
                    "hedge.target_profit must be positive".into(),
                ));
            }
            if !(0.0..=100.0).contains(&h.backoff_percent) {
                return Err(LadderError::InvalidConfig(
                    "hedge.backoff_percent must be between 0 and 100".into(),
                ));
            }
        }

        if let Some(t) = &self.trail {
            if !(t.target_profit > 0.0) {
                return Err(LadderError::InvalidConfig(
                    "trail.target_profit must be positive".into(),
                ));
            }
            if !(0.0..=100.0).contains(&t.backoff_percent) {
                return Err(LadderError::InvalidConfig(
                    "trail.backoff_percent must be between 0 and 100".into(),
                ));
            }
            if t.stop_loss > 0.0 {
                return Err(LadderError::InvalidConfig(
                    "trail.stop_loss must not be positive".into(),
                ));
            }
        }

        if let Some(r) = &self.regime {
            if r.ma_period == 0 {
                return Err(LadderError::InvalidConfig(
                    "regime.ma_period must be at least 1".into(),
                ));
            }
            if !(r.origin_band_points > 0.0) {
                return Err(LadderError::InvalidConfig(
                    "regime.origin_band_points must be positive".into(),
                ));
            }
        }

        if let Some(s) = &self.session {
            if let Some(period) = s.period_minutes {
                if period == 0 {
                    return Err(LadderError::InvalidConfig(
                        "session.period_minutes must be positive".into(),
                    ));
                }
                if s.warmup_minutes >= period {
                    return Err(LadderError::InvalidConfig(
                        "session.warmup_minutes must be shorter than the period".into(),
                    ));
                }
            }
            if let Some(b) = &s.blackout {
                if b.friday_close_hour > 24 || b.sunday_open_hour > 24 {
                    return Err(LadderError::InvalidConfig(
                        "blackout hours must be within 0..=24".into(),
                    ));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn martingale() -> MartingaleConfig {
        MartingaleConfig {
            base_size: 0.002,
            multiplier: 2.0,
            cap: MartingaleCap::Count(3),
            sizing: MartingaleSizing::Geometric,
            step_points: Some(20.0),
            close_on_unwind: true,
        }
    }

    #[test]
    fn test_valid_config() {
        let config = PolicyConfig::new("trend_martingale", 50.0, 0.001)
            .with_martingale(martingale())
            .with_hedge(100.0, 50.0)
            .with_trail(100.0, 50.0, -50.0)
            .with_regime(800, 200.0)
            .with_session(SessionConfig {
                period_minutes: Some(240),
                warmup_minutes: 5,
                blackout: Some(BlackoutConfig::default()),
            });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_step_and_size() {
        assert!(PolicyConfig::new("x", 0.0, 0.001).validate().is_err());
        assert!(PolicyConfig::new("x", -5.0, 0.001).validate().is_err());
        assert!(PolicyConfig::new("x", 50.0, 0.0).validate().is_err());
        assert!(PolicyConfig::new("x", f64::NAN, 0.001).validate().is_err());
    }

    #[test]
    fn test_invalid_martingale() {
        let mut m = martingale();
        m.cap = MartingaleCap::Count(0);
        assert!(PolicyConfig::new("x", 50.0, 0.001)
            .with_martingale(m)
            .validate()
            .is_err());

        let mut m = martingale();
        m.cap = MartingaleCap::Ratio(0.0);
        assert!(PolicyConfig::new("x", 50.0, 0.001)
            .with_martingale(m)
            .validate()
            .is_err());

        let mut m = martingale();
        m.multiplier = 0.5;
        assert!(PolicyConfig::new("x", 50.0, 0.001)
            .with_martingale(m)
            .validate()
            .is_err());
    }

    #[test]
    fn test_invalid_session() {
        let config = PolicyConfig::new("x", 50.0, 0.001).with_session(SessionConfig {
            period_minutes: Some(5),
            warmup_minutes: 5,
            blackout: None,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_instrument_points() {
        let eurusd = InstrumentSpec::new("EURUSD", 0.0001, 4);
        assert_eq!(eurusd.scale(), 5);
        assert!((eurusd.point() - 0.00001).abs() < 1e-15);
        assert_eq!(eurusd.points_to_price(50.0), 0.0005);
        assert!(eurusd.validate().is_ok());
        assert!(InstrumentSpec::new("", 0.0001, 4).validate().is_err());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let json = r#"{
            "name": "t",
            "grid_step_points": 50,
            "trend": { "base_size": 0.001 },
            "martingale": { "base_size": 0.002, "cap": { "ratio": 1.0 } }
        }"#;
        let config: PolicyConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.trend.confirmation, 1);
        let m = config.martingale.unwrap();
        assert_eq!(m.cap, MartingaleCap::Ratio(1.0));
        assert_eq!(m.multiplier, 2.0);
        assert_eq!(m.sizing, MartingaleSizing::Geometric);
        assert!(m.close_on_unwind);
        assert!(config.hedge.is_none());
    }
}
