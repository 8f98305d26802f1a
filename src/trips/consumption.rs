//! Learned driving consumption from odometer and SoC readings

use crate::config::ConsumptionConfig;
use crate::logging::{StructuredLogger, get_logger};
use serde::{Deserialize, Serialize};

/// Odometer and SoC at the start of the current segment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OdometerReading {
    pub mileage_km: f64,
    pub soc_pct: f64,
}

/// Persisted part of the tracker
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionState {
    /// Oldest first, kWh/100 km
    pub samples: Vec<f64>,
    pub anchor: Option<OdometerReading>,
}

pub struct ConsumptionTracker {
    config: ConsumptionConfig,
    default_rate: f64,
    capacity_kwh: f64,
    state: ConsumptionState,
    logger: StructuredLogger,
}

impl ConsumptionTracker {
    pub fn new(config: ConsumptionConfig, default_rate: f64, capacity_kwh: f64) -> Self {
        Self {
            config,
            default_rate,
            capacity_kwh,
            state: ConsumptionState::default(),
            logger: get_logger("consumption"),
        }
    }

    pub fn with_state(mut self, state: ConsumptionState) -> Self {
        self.state = state;
        let max = self.config.max_samples.max(1);
        if self.state.samples.len() > max {
            let excess = self.state.samples.len() - max;
            self.state.samples.drain(..excess);
        }
        self
    }

    pub const fn state(&self) -> &ConsumptionState {
        &self.state
    }

    pub fn sample_count(&self) -> usize {
        self.state.samples.len()
    }

    pub fn set_capacity(&mut self, capacity_kwh: f64) {
        if capacity_kwh > 0.0 {
            self.capacity_kwh = capacity_kwh;
        }
    }

    /// Feed one reading. Returns the segment consumption when a plausible
    /// driving segment was completed.
    pub fn observe(&mut self, mileage_km: f64, soc_pct: f64) -> Option<f64> {
        let current = OdometerReading {
            mileage_km,
            soc_pct,
        };
        let Some(anchor) = self.state.anchor else {
            self.state.anchor = Some(current);
            return None;
        };

        // Odometer went backwards or the car was charged: start over
        if mileage_km < anchor.mileage_km || soc_pct > anchor.soc_pct {
            self.state.anchor = Some(current);
            return None;
        }

        let distance = mileage_km - anchor.mileage_km;
        if distance < self.config.min_segment_km {
            return None;
        }
        self.state.anchor = Some(current);

        let soc_drop = anchor.soc_pct - soc_pct;
        if soc_drop <= 0.0 {
            return None;
        }
        let rate = soc_drop / 100.0 * self.capacity_kwh / distance * 100.0;
        if rate < self.config.plausible_min || rate > self.config.plausible_max {
            self.logger.debug(&format!(
                "Discarding implausible segment: {:.1} km at {:.1} kWh/100km",
                distance, rate
            ));
            return None;
        }

        self.state.samples.push(rate);
        let max = self.config.max_samples.max(1);
        if self.state.samples.len() > max {
            self.state.samples.remove(0);
        }
        self.logger.info(&format!(
            "Recorded segment: {:.1} km at {:.1} kWh/100km ({} samples)",
            distance,
            rate,
            self.state.samples.len()
        ));
        Some(rate)
    }

    /// Consumption to plan with (kWh/100 km). Newer samples weigh more; with
    /// few samples the result leans towards the configured default.
    pub fn rate(&self) -> f64 {
        let samples = &self.state.samples;
        let rate = if samples.is_empty() {
            self.default_rate
        } else {
            let (weighted, weights) = samples
                .iter()
                .enumerate()
                .fold((0.0, 0.0), |(sum, w), (i, s)| {
                    let weight = (i + 1) as f64;
                    (sum + s * weight, w + weight)
                });
            let average = weighted / weights;
            let trust =
                (samples.len() as f64 / self.config.trust_samples.max(1) as f64).min(1.0);
            self.default_rate * (1.0 - trust) + average * trust
        };
        rate.clamp(self.config.clamp_min, self.config.clamp_max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> ConsumptionTracker {
        ConsumptionTracker::new(ConsumptionConfig::default(), 22.0, 77.0)
    }

    #[test]
    fn default_rate_without_samples() {
        assert_eq!(tracker().rate(), 22.0);
    }

    #[test]
    fn short_segments_accumulate() {
        let mut t = tracker();
        assert!(t.observe(1000.0, 80.0).is_none());
        assert!(t.observe(1003.0, 80.0).is_none());
        // 100 km, 20 % of 77 kWh = 15.4 kWh
        let rate = t.observe(1100.0, 60.0).unwrap();
        assert!((rate - 15.4).abs() < 1e-9);
    }

    #[test]
    fn charging_resets_the_segment() {
        let mut t = tracker();
        t.observe(1000.0, 50.0);
        assert!(t.observe(1000.0, 70.0).is_none());
        assert_eq!(t.state().anchor.unwrap().soc_pct, 70.0);
        assert_eq!(t.sample_count(), 0);
    }
}
