//! Overnight charging bookkeeping
//!
//! Energy delivered inside the overnight window (default 18:00 to 08:00) is
//! accumulated across wallbox sessions. A falling session counter means the
//! wallbox started a new session; its energy then counts from zero.

use crate::error::{LadewerkError, Result};
use crate::logging::{StructuredLogger, get_logger};
use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

/// One overnight window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OvernightSession {
    pub id: String,
    /// Evening on which the window opened
    pub night_of: NaiveDate,
    pub started_at: NaiveDateTime,
    pub energy_kwh: f64,
    pub peak_power_w: f64,
    /// Wallbox session counter at the previous update
    last_session_energy_kwh: f64,
}

/// Serializable tracker state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OvernightState {
    pub current: Option<OvernightSession>,
    pub last: Option<OvernightSession>,
}

pub struct OvernightTracker {
    start_hour: u32,
    end_hour: u32,
    state: OvernightState,
    logger: StructuredLogger,
}

impl OvernightTracker {
    pub fn new(start_hour: u32, end_hour: u32) -> Self {
        Self {
            start_hour,
            end_hour,
            state: OvernightState::default(),
            logger: get_logger("session"),
        }
    }

    /// Window check; windows may wrap past midnight
    pub fn in_window(&self, at: NaiveDateTime) -> bool {
        let hour = at.hour();
        if self.start_hour == self.end_hour {
            false
        } else if self.start_hour > self.end_hour {
            hour >= self.start_hour || hour < self.end_hour
        } else {
            hour >= self.start_hour && hour < self.end_hour
        }
    }

    fn night_of(&self, at: NaiveDateTime) -> NaiveDate {
        if self.start_hour > self.end_hour && at.hour() < self.end_hour {
            at.date() - Duration::days(1)
        } else {
            at.date()
        }
    }

    /// Feed the current session counter. Returns the energy accrued in the
    /// running window, 0 outside of it.
    pub fn update(&mut self, now: NaiveDateTime, session_energy_kwh: f64, power_w: f64) -> f64 {
        let session_energy_kwh = session_energy_kwh.max(0.0);
        if !self.in_window(now) {
            self.close_window();
            return 0.0;
        }

        let night_of = self.night_of(now);
        if self
            .state
            .current
            .as_ref()
            .is_some_and(|c| c.night_of != night_of)
        {
            self.close_window();
        }

        let session = self.state.current.get_or_insert_with(|| OvernightSession {
            id: uuid::Uuid::new_v4().to_string(),
            night_of,
            started_at: now,
            energy_kwh: 0.0,
            peak_power_w: 0.0,
            last_session_energy_kwh: session_energy_kwh,
        });

        let delta = if session_energy_kwh < session.last_session_energy_kwh {
            session_energy_kwh
        } else {
            session_energy_kwh - session.last_session_energy_kwh
        };
        session.energy_kwh += delta;
        session.last_session_energy_kwh = session_energy_kwh;
        session.peak_power_w = session.peak_power_w.max(power_w);
        session.energy_kwh
    }

    fn close_window(&mut self) {
        if let Some(session) = self.state.current.take() {
            self.logger.info(&format!(
                "Overnight window of {} closed, {:.2} kWh charged",
                session.night_of, session.energy_kwh
            ));
            self.state.last = Some(session);
        }
    }

    pub fn current_kwh(&self) -> f64 {
        self.state.current.as_ref().map_or(0.0, |s| s.energy_kwh)
    }

    pub const fn last(&self) -> Option<&OvernightSession> {
        self.state.last.as_ref()
    }

    /// Get tracker state for persistence
    pub fn get_state(&self) -> OvernightState {
        self.state.clone()
    }

    /// Restore tracker state from persistence
    pub fn restore_state(&mut self, state: OvernightState) -> Result<()> {
        let invalid = state
            .current
            .as_ref()
            .is_some_and(|c| !c.energy_kwh.is_finite() || c.energy_kwh < 0.0);
        if invalid {
            return Err(LadewerkError::validation(
                "overnight.energy_kwh",
                "must be a non-negative number",
            ));
        }
        self.state = state;
        Ok(())
    }
}

impl Default for OvernightTracker {
    fn default() -> Self {
        Self::new(18, 8)
    }
}
