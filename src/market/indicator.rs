//! Moving-average providers used by the regime filter

use std::collections::VecDeque;

use crate::helpers::round_half_up;

/// A scalar indicator updated with one price per tick
pub trait MovingAverage: Send {
    /// Push the latest price
    fn update(&mut self, price: f64);

    /// Current value, `None` until the window is full
    fn value(&self) -> Option<f64>;

    /// Lookback window length
    fn period(&self) -> usize;
}

/// Simple moving average over the last `period` ticks.
#[derive(Debug, Clone)]
pub struct TickSma {
    period: usize,
    scale: Option<u32>,
    window: VecDeque<f64>,
    sum: f64,
}

impl TickSma {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
            scale: None,
            window: VecDeque::with_capacity(period.max(1)),
            sum: 0.0,
        }
    }

    /// Builder: round reported values to the instrument scale
    pub fn with_scale(mut self, scale: u32) -> Self {
        self.scale = Some(scale);
        self
    }
}

impl MovingAverage for TickSma {
    fn update(&mut self, price: f64) {
        if !price.is_finite() {
            return;
        }
        self.window.push_back(price);
        self.sum += price;
        if self.window.len() > self.period {
            if let Some(leaving) = self.window.pop_front() {
                self.sum -= leaving;
            }
        }
    }

    fn value(&self) -> Option<f64> {
        if self.window.len() < self.period {
            return None;
        }
        let mean = self.sum / self.period as f64;
        Some(match self.scale {
            Some(scale) => round_half_up(mean, scale),
            None => mean,
        })
    }

    fn period(&self) -> usize {
        self.period
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sma_warmup_and_roll() {
        let mut sma = TickSma::new(3);
        sma.update(1.0);
        sma.update(2.0);
        assert_eq!(sma.value(), None);

        sma.update(3.0);
        assert!((sma.value().unwrap() - 2.0).abs() < 1e-12);

        sma.update(6.0);
        assert!((sma.value().unwrap() - 11.0 / 3.0).abs() < 1e-12);
        assert_eq!(sma.period(), 3);
    }

    #[test]
    fn test_sma_rounding_and_nan() {
        let mut sma = TickSma::new(2).with_scale(5);
        sma.update(1.100001);
        sma.update(f64::NAN);
        assert_eq!(sma.value(), None);
        sma.update(1.100004);
        assert_eq!(sma.value(), Some(1.1));
    }
}
