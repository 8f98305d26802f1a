//! Telemetry gateway contract
//!
//! The charging core never talks to a concrete home-automation system. It reads
//! named sensor values through [`TelemetryGateway::read`] and issues writes
//! (wallbox power limit, planner control variables) through
//! [`TelemetryGateway::write`]. Any read may come back unavailable; the helpers
//! in this module substitute the caller's default in that case.

use crate::error::{LadewerkError, Result};
use crate::logging::get_logger;
use async_trait::async_trait;
use chrono::{NaiveDateTime, NaiveTime};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[cfg(feature = "homeassistant")]
pub mod home_assistant;

/// A single sensor reading
#[derive(Debug, Clone, PartialEq)]
pub enum Reading {
    Number(f64),
    Text(String),
    Unavailable,
}

impl Reading {
    /// Interpret a raw state string as reported by home-automation systems
    pub fn from_state(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "" | "unknown" | "unavailable" | "none" | "null" | "nan" => Self::Unavailable,
            _ => match trimmed.parse::<f64>() {
                Ok(v) if v.is_finite() => Self::Number(v),
                _ => Self::Text(trimmed.to_string()),
            },
        }
    }

    pub const fn is_available(&self) -> bool {
        !matches!(self, Self::Unavailable)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            Self::Text(s) => s.parse::<f64>().ok().filter(|v| v.is_finite()),
            Self::Unavailable => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Number(v) => Some(*v != 0.0),
            Self::Text(s) => match s.to_ascii_lowercase().as_str() {
                "on" | "true" | "yes" | "1" => Some(true),
                "off" | "false" | "no" | "0" => Some(false),
                _ => None,
            },
            Self::Unavailable => None,
        }
    }

    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Number(v) => Some(v.to_string()),
            Self::Text(s) => Some(s.clone()),
            Self::Unavailable => None,
        }
    }

    /// Local time of day from "HH:MM", "HH:MM:SS" or a full local datetime
    pub fn as_time(&self) -> Option<NaiveTime> {
        let Self::Text(s) = self else {
            return None;
        };
        let s = s.trim();
        NaiveTime::parse_from_str(s, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                    .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
                    .ok()
                    .map(|dt| dt.time())
            })
    }
}

/// A value written to a control variable or the wallbox
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ControlValue {
    /// Wallbox power limit in W
    Power(u32),
    Number(f64),
    Bool(bool),
    /// Option of a selector
    Option(String),
    Time(NaiveTime),
}

impl ControlValue {
    /// The reading a sensor would report after this write
    pub fn as_reading(&self) -> Reading {
        match self {
            Self::Power(w) => Reading::Number(f64::from(*w)),
            Self::Number(v) => Reading::Number(*v),
            Self::Bool(b) => Reading::Text(if *b { "on" } else { "off" }.to_string()),
            Self::Option(s) => Reading::Text(s.clone()),
            Self::Time(t) => Reading::Text(t.format("%H:%M:%S").to_string()),
        }
    }
}

/// Telemetry read/write contract consumed by the charging core
#[async_trait]
pub trait TelemetryGateway: Send + Sync {
    /// Read a named sensor. Unknown or unavailable sensors return
    /// `Reading::Unavailable`; errors are reserved for transport failures.
    async fn read(&self, name: &str) -> Result<Reading>;

    /// Write a control variable or the wallbox power limit
    async fn write(&self, name: &str, value: ControlValue) -> Result<()>;
}

async fn read_available(gateway: &dyn TelemetryGateway, name: &str) -> Option<Reading> {
    match gateway.read(name).await {
        Ok(reading) if reading.is_available() => Some(reading),
        Ok(_) => None,
        Err(e) => {
            get_logger("telemetry").debug(&format!("Read of {} failed: {}", name, e));
            None
        }
    }
}

/// Numeric reading, `None` when unavailable or not numeric
pub async fn read_opt_f64(gateway: &dyn TelemetryGateway, name: &str) -> Option<f64> {
    read_available(gateway, name)
        .await
        .and_then(|r| r.as_f64())
}

/// Numeric reading with a default for unavailable values
pub async fn read_f64_or(gateway: &dyn TelemetryGateway, name: &str, default: f64) -> f64 {
    read_opt_f64(gateway, name).await.unwrap_or(default)
}

/// Boolean reading with a default for unavailable values
pub async fn read_bool_or(gateway: &dyn TelemetryGateway, name: &str, default: bool) -> bool {
    read_available(gateway, name)
        .await
        .and_then(|r| r.as_bool())
        .unwrap_or(default)
}

/// Text reading, `None` when unavailable
pub async fn read_text(gateway: &dyn TelemetryGateway, name: &str) -> Option<String> {
    read_available(gateway, name).await.and_then(|r| r.as_text())
}

/// Time-of-day reading with a default for unavailable or malformed values
pub async fn read_time_or(
    gateway: &dyn TelemetryGateway,
    name: &str,
    default: NaiveTime,
) -> NaiveTime {
    read_available(gateway, name)
        .await
        .and_then(|r| r.as_time())
        .unwrap_or(default)
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-process gateway backed by a map
///
/// Used for simulation runs and tests. Writes are recorded and also become
/// visible to subsequent reads, so a planner writing control variables and a
/// driver reading them see the same store.
#[derive(Debug, Default)]
pub struct InMemoryGateway {
    values: Mutex<HashMap<String, Reading>>,
    writes: Mutex<Vec<(String, ControlValue)>>,
    failing_writes: Mutex<HashSet<String>>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, name: &str, reading: Reading) {
        lock(&self.values).insert(name.to_string(), reading);
    }

    pub fn set_number(&self, name: &str, value: f64) {
        self.set(name, Reading::Number(value));
    }

    pub fn set_text(&self, name: &str, value: &str) {
        self.set(name, Reading::from_state(value));
    }

    pub fn remove(&self, name: &str) {
        lock(&self.values).remove(name);
    }

    /// Make every write to `name` fail
    pub fn fail_writes_to(&self, name: &str) {
        lock(&self.failing_writes).insert(name.to_string());
    }

    /// All successful writes so far, oldest first
    pub fn writes(&self) -> Vec<(String, ControlValue)> {
        lock(&self.writes).clone()
    }

    /// Most recent successful write to `name`
    pub fn last_write(&self, name: &str) -> Option<ControlValue> {
        lock(&self.writes)
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
    }
}

#[async_trait]
impl TelemetryGateway for InMemoryGateway {
    async fn read(&self, name: &str) -> Result<Reading> {
        Ok(lock(&self.values)
            .get(name)
            .cloned()
            .unwrap_or(Reading::Unavailable))
    }

    async fn write(&self, name: &str, value: ControlValue) -> Result<()> {
        if lock(&self.failing_writes).contains(name) {
            return Err(LadewerkError::telemetry(format!("write to {} rejected", name)));
        }
        lock(&self.values).insert(name.to_string(), value.as_reading());
        lock(&self.writes).push((name.to_string(), value));
        Ok(())
    }
}
