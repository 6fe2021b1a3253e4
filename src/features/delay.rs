//! Delay labeling (training only)

use crate::features::temporal::parse_timestamp;
use crate::Result;

/// Default delay threshold in minutes
pub const DEFAULT_THRESHOLD_MINUTES: f64 = 15.0;

/// Signed minutes between scheduled and actual departure (negative = early)
pub fn delay_minutes(scheduled: &str, actual: &str) -> Result<f64> {
    let scheduled = parse_timestamp(scheduled)?;
    let actual = parse_timestamp(actual)?;
    Ok((actual - scheduled).num_seconds() as f64 / 60.0)
}

/// A flight is delayed when it leaves strictly later than the threshold
pub fn is_delayed(delay_minutes: f64, threshold: f64) -> bool {
    delay_minutes > threshold
}

/// Labels flights as delayed or on time
#[derive(Debug, Clone, Copy)]
pub struct DelayLabeler {
    threshold_minutes: f64,
}

impl Default for DelayLabeler {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD_MINUTES)
    }
}

impl DelayLabeler {
    pub fn new(threshold_minutes: f64) -> Self {
        DelayLabeler { threshold_minutes }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold_minutes
    }

    pub fn label(&self, scheduled: &str, actual: &str) -> Result<bool> {
        Ok(is_delayed(delay_minutes(scheduled, actual)?, self.threshold_minutes))
    }
}
