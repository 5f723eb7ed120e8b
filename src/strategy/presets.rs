//! Built-in policy presets
//!
//! Each preset starts from its own defaults and takes overrides from the
//! `params` table of the settings file.

use std::collections::HashMap;

use serde_json::Value;

use crate::grid::{
    BlackoutConfig, LadderError, LadderResult, MartingaleCap, MartingaleConfig, MartingaleSizing,
    PolicyConfig, SessionConfig,
};

/// Typed lookups over a parameter map
pub struct Params<'a> {
    inner: &'a HashMap<String, Value>,
}

impl<'a> Params<'a> {
    pub fn new(inner: &'a HashMap<String, Value>) -> Self {
        Self { inner }
    }

    /// Number under `key`, or `default` when absent
    pub fn f64_or(&self, key: &str, default: f64) -> LadderResult<f64> {
        match self.inner.get(key) {
            None => Ok(default),
            Some(v) => v.as_f64().ok_or_else(|| wrong_type(key, "a number", v)),
        }
    }

    pub fn u32_or(&self, key: &str, default: u32) -> LadderResult<u32> {
        match self.inner.get(key) {
            None => Ok(default),
            Some(v) => v
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| wrong_type(key, "a non-negative integer", v)),
        }
    }

    pub fn bool_or(&self, key: &str, default: bool) -> LadderResult<bool> {
        match self.inner.get(key) {
            None => Ok(default),
            Some(v) => v.as_bool().ok_or_else(|| wrong_type(key, "a boolean", v)),
        }
    }

    pub fn str_or<'b>(&'b self, key: &str, default: &'b str) -> LadderResult<&'b str> {
        match self.inner.get(key) {
            None => Ok(default),
            Some(v) => v.as_str().ok_or_else(|| wrong_type(key, "a string", v)),
        }
    }
}

fn wrong_type(key: &str, expected: &str, got: &Value) -> LadderError {
    LadderError::InvalidConfig(format!("parameter '{}' must be {}, got {}", key, expected, got))
}

fn sizing(name: &str) -> LadderResult<MartingaleSizing> {
    match name.to_lowercase().as_str() {
        "geometric" => Ok(MartingaleSizing::Geometric),
        "linear" => Ok(MartingaleSizing::Linear),
        other => Err(LadderError::InvalidConfig(format!(
            "unknown martingale sizing '{}'",
            other
        ))),
    }
}

fn base(p: &Params, name: &str) -> LadderResult<PolicyConfig> {
    let step = p.f64_or("grid_step_points", 50.0)?;
    let lots = p.f64_or("lots", 0.001)?;
    Ok(PolicyConfig::new(name, step, lots).with_confirmation(p.u32_or("confirmation", 1)?))
}

fn blackout(p: &Params) -> LadderResult<BlackoutConfig> {
    let defaults = BlackoutConfig::default();
    Ok(BlackoutConfig {
        friday_close_hour: p.u32_or("friday_close_hour", defaults.friday_close_hour)?,
        sunday_open_hour: p.u32_or("sunday_open_hour", defaults.sunday_open_hour)?,
    })
}

/// Trend orders only
pub fn trend(params: &HashMap<String, Value>) -> LadderResult<PolicyConfig> {
    base(&Params::new(params), "trend")
}

/// Trend ladder with geometric martingale on its own finer grid, traded in
/// fixed periods inside the weekly window
pub fn trend_martingale(params: &HashMap<String, Value>) -> LadderResult<PolicyConfig> {
    let p = Params::new(params);
    let martingale = MartingaleConfig {
        base_size: p.f64_or("martingale_lots", 0.002)?,
        multiplier: p.f64_or("martingale_multiple", 2.0)?,
        cap: MartingaleCap::Count(p.u32_or("martingale_limit", 3)?),
        sizing: sizing(p.str_or("martingale_sizing", "geometric")?)?,
        step_points: Some(p.f64_or("martingale_step_points", 20.0)?),
        close_on_unwind: p.bool_or("close_on_unwind", true)?,
    };
    let session = SessionConfig {
        period_minutes: Some(p.u32_or("period_minutes", 240)?),
        warmup_minutes: p.u32_or("warmup_minutes", 5)?,
        blackout: Some(blackout(&p)?),
    };
    Ok(base(&p, "trend_martingale")?
        .with_martingale(martingale)
        .with_session(session))
}

/// Confirmed trend entries with a linear martingale on the shared grid
pub fn retracement(params: &HashMap<String, Value>) -> LadderResult<PolicyConfig> {
    let p = Params::new(params);
    let mut policy = base(&p, "retracement")?;
    policy.trend.confirmation = p.u32_or("confirmation", 2)?;

    let martingale = MartingaleConfig {
        base_size: p.f64_or("martingale_lots", policy.trend.base_size)?,
        multiplier: p.f64_or("martingale_multiple", 1.0)?,
        cap: MartingaleCap::Count(p.u32_or("martingale_limit", 3)?),
        sizing: sizing(p.str_or("martingale_sizing", "linear")?)?,
        step_points: None,
        close_on_unwind: p.bool_or("close_on_unwind", true)?,
    };
    let session = SessionConfig {
        period_minutes: Some(p.u32_or("period_minutes", 300)?),
        warmup_minutes: p.u32_or("warmup_minutes", 0)?,
        blackout: Some(blackout(&p)?),
    };
    Ok(policy.with_martingale(martingale).with_session(session))
}

/// Moving-average filtered ladders with ratio-capped martingale, opposite
/// pruning and profit-lock hedging
pub fn hedging(params: &HashMap<String, Value>) -> LadderResult<PolicyConfig> {
    let p = Params::new(params);
    let policy = base(&p, "hedging")?;
    let lots = policy.trend.base_size;

    let martingale = MartingaleConfig {
        base_size: p.f64_or("martingale_lots", lots)?,
        multiplier: p.f64_or("martingale_multiple", 1.5)?,
        cap: MartingaleCap::Ratio(p.f64_or("martingale_ratio", 1.0)?),
        sizing: sizing(p.str_or("martingale_sizing", "geometric")?)?,
        step_points: None,
        close_on_unwind: p.bool_or("close_on_unwind", true)?,
    };
    Ok(policy
        .with_martingale(martingale)
        .with_pruning(p.bool_or("prune_opposite", true)?)
        .with_hedge(
            p.f64_or("target_profit", 100.0)?,
            p.f64_or("back_profit_percent", 50.0)?,
        )
        .with_regime(
            p.u32_or("ma_period", 800)? as usize,
            p.f64_or("origin_band_points", 200.0)?,
        ))
}

/// Trend ladder closed as a whole by a trailing take profit or a stop loss
pub fn profit_trail(params: &HashMap<String, Value>) -> LadderResult<PolicyConfig> {
    let p = Params::new(params);
    Ok(base(&p, "profit_trail")?.with_trail(
        p.f64_or("target_profit", 100.0)?,
        p.f64_or("back_profit_percent", 50.0)?,
        p.f64_or("stop_loss", -50.0)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_trend_martingale_defaults() {
        let policy = trend_martingale(&HashMap::new()).unwrap();
        assert_eq!(policy.grid_step_points, 50.0);
        assert_eq!(policy.trend.base_size, 0.001);
        let m = policy.martingale.as_ref().unwrap();
        assert_eq!(m.base_size, 0.002);
        assert_eq!(m.cap, MartingaleCap::Count(3));
        assert_eq!(m.step_points, Some(20.0));
        let session = policy.session.as_ref().unwrap();
        assert_eq!(session.period_minutes, Some(240));
        assert_eq!(session.warmup_minutes, 5);
        assert_eq!(session.blackout.as_ref().unwrap().sunday_open_hour, 22);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_retracement_is_linear_and_confirmed() {
        let policy = retracement(&HashMap::new()).unwrap();
        assert_eq!(policy.trend.confirmation, 2);
        let m = policy.martingale.unwrap();
        assert_eq!(m.sizing, MartingaleSizing::Linear);
        assert_eq!(m.base_size, 0.001);
        assert!(m.step_points.is_none());
    }

    #[test]
    fn test_hedging_defaults() {
        let policy = hedging(&params(&[("lots", json!(0.01))])).unwrap();
        assert!(policy.prune_opposite);
        let m = policy.martingale.as_ref().unwrap();
        assert_eq!(m.cap, MartingaleCap::Ratio(1.0));
        assert_eq!(m.base_size, 0.01);
        assert_eq!(m.multiplier, 1.5);
        let regime = policy.regime.as_ref().unwrap();
        assert_eq!(regime.ma_period, 800);
        assert_eq!(regime.origin_band_points, 200.0);
        assert_eq!(policy.hedge.as_ref().unwrap().backoff_percent, 50.0);
    }

    #[test]
    fn test_profit_trail_overrides() {
        let policy = profit_trail(&params(&[("stop_loss", json!(-80.0))])).unwrap();
        let trail = policy.trail.unwrap();
        assert_eq!(trail.stop_loss, -80.0);
        assert_eq!(trail.target_profit, 100.0);
    }

    #[test]
    fn test_wrong_parameter_type() {
        let err = trend(&params(&[("lots", json!("big"))])).unwrap_err();
        assert!(matches!(err, LadderError::InvalidConfig(msg) if msg.contains("lots")));

        let err = retracement(&params(&[("martingale_sizing", json!("fibonacci"))])).unwrap_err();
        assert!(matches!(err, LadderError::InvalidConfig(_)));
    }
}
