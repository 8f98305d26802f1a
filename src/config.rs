//! Configuration management for Ladewerk
//!
//! This module handles loading, validation, and management of the application
//! configuration from YAML files with support for an environment override of
//! the file location.

use crate::error::{LadewerkError, Result};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

mod defaults;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Timezone used for departure times, overnight windows and calendar days
    pub timezone: String,

    /// Wallbox power limits
    pub wallbox: WallboxConfig,

    /// Real-time strategy tuning
    pub strategy: StrategyConfig,

    /// Optional home-battery assist
    pub battery_assist: BatteryAssistConfig,

    /// Control loop cadence and safety switches
    pub control: ControlConfig,

    /// Telemetry entity names
    pub entities: EntitiesConfig,

    /// Vehicle parameters
    pub vehicle: VehicleConfig,

    /// Multi-day charge planner
    pub planner: PlannerConfig,

    /// Trip prediction
    pub trips: TripsConfig,

    /// Learned consumption tracking
    pub consumption: ConsumptionConfig,

    /// Calendar source
    pub calendar: CalendarConfig,

    /// State file persistence
    pub persistence: PersistenceConfig,

    /// Home Assistant REST gateway
    pub home_assistant: HomeAssistantConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Path to log file (its parent directory receives the rotated files)
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

/// Wallbox power limits in watts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WallboxConfig {
    /// Maximum charging power
    pub max_power_w: u32,

    /// Minimum sustainable charging power. Anything below collapses to 0.
    pub min_power_w: u32,

    /// Fixed power used in Eco mode
    pub eco_power_w: u32,

    /// The power-limit register is written in multiples of this step
    pub power_step_w: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Export kept back from the EV to avoid accidental grid import
    pub grid_reserve_w: u32,

    /// Extra surplus required to start a stopped PV session
    pub start_hysteresis_w: u32,

    /// Maximum change of a non-zero setpoint per cycle
    pub ramp_step_w: u32,

    /// Multiplier applied to the required deadline power
    pub deadline_safety_factor: f64,
}

/// Home battery assist. Disabled by default; the surplus formula already
/// nets out battery charge and discharge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatteryAssistConfig {
    pub enabled: bool,

    /// The assist is never granted at or below this battery SoC
    pub min_soc_pct: f64,

    /// Above this SoC the battery's charge power is redirected to the EV
    pub priority_soc_pct: f64,

    /// Cap on the assist contribution
    pub max_assist_w: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Seconds between control cycles
    pub interval_seconds: u64,

    /// Compute and publish decisions but never write the wallbox
    pub safe_mode: bool,

    /// Re-send an unchanged setpoint after this many seconds
    pub reassert_seconds: u64,

    /// File touched after every completed cycle
    pub liveness_file: Option<String>,

    /// Overnight bookkeeping window start (local hour)
    pub overnight_start_hour: u32,

    /// Overnight bookkeeping window end (local hour)
    pub overnight_end_hour: u32,
}

/// Names of telemetry inputs and control variables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EntitiesConfig {
    pub grid_power: String,
    pub pv_power: String,
    pub house_power: String,
    pub battery_power: String,
    pub battery_soc: String,
    pub pv_forecast_today_remaining: String,
    pub pv_forecast_tomorrow: String,
    pub wallbox_state: String,
    pub wallbox_power: String,
    pub wallbox_session_energy: String,
    pub wallbox_power_limit: String,
    pub ev_soc: String,
    pub ev_target_soc: String,
    pub ev_capacity: String,
    pub ev_mileage: String,
    pub charge_mode: String,
    pub full_by_morning: String,
    pub departure_time: String,
    pub target_energy: String,
    pub safe_mode: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    /// Usable battery capacity in kWh
    pub capacity_kwh: f64,

    /// Target SoC used when the vehicle does not report one
    pub default_target_soc_pct: f64,

    /// Configured consumption before any learned samples exist
    pub consumption_kwh_per_100km: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Number of days planned ahead, today included
    pub horizon_days: u32,

    /// Minutes between planning runs
    pub interval_minutes: u64,

    /// Safety margin added to every day's trip energy
    pub buffer_kwh: f64,

    /// Energy that must remain in the battery on arrival
    pub min_arrival_kwh: f64,

    /// Fraction of the remaining PV forecast assumed to reach the EV
    pub pv_share: f64,

    /// Above this many hours until departure PV alone may be trusted
    pub ample_hours: f64,

    /// At or below this many hours until departure charging is forced
    pub imminent_hours: f64,

    /// Deficits above this size use Fast rather than Eco when forced
    pub fast_deficit_kwh: f64,

    /// Departures before this local hour are charged the night before
    pub early_departure_hour: u32,

    /// Departure assumed for days without any timed trip (HH:MM)
    pub default_departure: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TripsConfig {
    pub home_latitude: f64,
    pub home_longitude: f64,

    /// Multiplier turning great-circle distance into driving distance
    pub road_factor: f64,

    /// Known one-way distances in km, matched case-insensitively
    pub known_destinations: BTreeMap<String, f64>,

    /// Conservative one-way distance when nothing resolves
    pub default_distance_km: f64,

    /// One-way distance for local activities (sport, shopping, ...)
    pub local_activity_km: f64,

    /// Geocoded distances above this are provisional only
    pub suspicious_distance_km: f64,

    /// Words removed from destinations before lookup
    pub filler_words: Vec<String>,

    /// Words marking a local activity rather than a place
    pub activity_words: Vec<String>,

    /// Known drivers with their calendar prefix
    pub drivers: Vec<DriverConfig>,

    pub geocoder: GeocoderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Calendar prefix, e.g. "H" for "H: Aachen"
    pub prefix: String,

    /// Display name
    pub name: String,

    /// One-way distance above which this driver takes the train
    #[serde(default)]
    pub train_threshold_km: Option<f64>,

    /// One-way distance from which the transport choice is asked
    #[serde(default)]
    pub clarification_band_km: Option<f64>,

    /// Default commute used on days without calendar trips
    #[serde(default)]
    pub commute: Option<CommuteConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommuteConfig {
    pub destination: String,

    /// One-way distance in km
    pub distance_km: f64,

    /// Weekdays (0=Mon, 6=Sun)
    pub weekdays: Vec<u8>,

    /// Departure time in HH:MM format
    pub departure: String,

    /// Return time in HH:MM format
    #[serde(rename = "return")]
    pub return_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocoderConfig {
    pub enabled: bool,
    pub base_url: String,
    pub user_agent: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumptionConfig {
    /// Shortest mileage delta accepted as a driving segment
    pub min_segment_km: f64,

    /// Plausibility band for a single segment (kWh/100 km)
    pub plausible_min: f64,
    pub plausible_max: f64,

    /// Range the effective rate is clamped to
    pub clamp_min: f64,
    pub clamp_max: f64,

    /// Rolling window size
    pub max_samples: usize,

    /// Samples needed before the rolling average is fully trusted
    pub trust_samples: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    /// YAML file with calendar events
    pub file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// JSON file with learned destinations and consumption samples
    pub state_file: String,

    /// JSON file with the control loop's overnight bookkeeping
    pub driver_state_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HomeAssistantConfig {
    pub base_url: String,

    /// Long-lived access token; may also come from LADEWERK_HA_TOKEN
    #[serde(skip_serializing)]
    pub token: String,

    pub timeout_seconds: u64,
}

/// Parse a local "HH:MM" (or "HH:MM:SS") time
pub fn parse_hhmm(value: &str) -> Result<NaiveTime> {
    let trimmed = value.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
        .map_err(LadewerkError::from)
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration with validation
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var("LADEWERK_CONFIG") {
            let config = Self::from_file(&path)?;
            config.validate()?;
            return Ok(config);
        }

        let default_paths = [
            "ladewerk.yaml",
            "/data/ladewerk.yaml",
            "/etc/ladewerk/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                let config = Self::from_file(path)?;
                config.validate()?;
                return Ok(config);
            }
        }

        // Fall back to default configuration
        Ok(Self::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parsed timezone
    pub fn tz(&self) -> Result<chrono_tz::Tz> {
        self.timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|_| LadewerkError::validation("timezone", "unknown IANA timezone"))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.tz()?;

        let w = &self.wallbox;
        if w.min_power_w == 0 {
            return Err(LadewerkError::validation(
                "wallbox.min_power_w",
                "Must be greater than 0",
            ));
        }
        if w.max_power_w < w.min_power_w {
            return Err(LadewerkError::validation(
                "wallbox.max_power_w",
                "Must not be below wallbox.min_power_w",
            ));
        }
        if w.eco_power_w < w.min_power_w || w.eco_power_w > w.max_power_w {
            return Err(LadewerkError::validation(
                "wallbox.eco_power_w",
                "Must lie within [min_power_w, max_power_w]",
            ));
        }
        if w.power_step_w == 0 {
            return Err(LadewerkError::validation(
                "wallbox.power_step_w",
                "Must be greater than 0",
            ));
        }

        if !(self.strategy.deadline_safety_factor >= 1.0) {
            return Err(LadewerkError::validation(
                "strategy.deadline_safety_factor",
                "Must be at least 1.0",
            ));
        }

        let b = &self.battery_assist;
        if !(0.0..=100.0).contains(&b.min_soc_pct) || !(0.0..=100.0).contains(&b.priority_soc_pct) {
            return Err(LadewerkError::validation(
                "battery_assist",
                "SoC thresholds must be percentages",
            ));
        }

        if self.control.interval_seconds == 0 {
            return Err(LadewerkError::validation(
                "control.interval_seconds",
                "Must be greater than 0",
            ));
        }
        if self.control.overnight_start_hour > 23 || self.control.overnight_end_hour > 23 {
            return Err(LadewerkError::validation(
                "control.overnight_start_hour",
                "Hours must be within 0..=23",
            ));
        }

        if self.vehicle.capacity_kwh <= 0.0 {
            return Err(LadewerkError::validation(
                "vehicle.capacity_kwh",
                "Must be positive",
            ));
        }
        if self.vehicle.consumption_kwh_per_100km <= 0.0 {
            return Err(LadewerkError::validation(
                "vehicle.consumption_kwh_per_100km",
                "Must be positive",
            ));
        }

        if self.planner.horizon_days == 0 {
            return Err(LadewerkError::validation(
                "planner.horizon_days",
                "Must be at least 1",
            ));
        }
        if !(0.0..=1.0).contains(&self.planner.pv_share) {
            return Err(LadewerkError::validation(
                "planner.pv_share",
                "Must be within 0.0..=1.0",
            ));
        }
        if self.planner.early_departure_hour > 23 {
            return Err(LadewerkError::validation(
                "planner.early_departure_hour",
                "Must be within 0..=23",
            ));
        }
        parse_hhmm(&self.planner.default_departure)?;

        if self.trips.road_factor < 1.0 {
            return Err(LadewerkError::validation(
                "trips.road_factor",
                "Must be at least 1.0",
            ));
        }
        for driver in &self.trips.drivers {
            if driver.prefix.trim().is_empty() {
                return Err(LadewerkError::validation(
                    "trips.drivers.prefix",
                    "Must not be empty",
                ));
            }
            if let Some(commute) = &driver.commute {
                parse_hhmm(&commute.departure)?;
                parse_hhmm(&commute.return_time)?;
                if commute.weekdays.iter().any(|d| *d > 6) {
                    return Err(LadewerkError::validation(
                        "trips.drivers.commute.weekdays",
                        "Weekdays are 0 (Mon) to 6 (Sun)",
                    ));
                }
            }
        }

        let c = &self.consumption;
        if c.plausible_min >= c.plausible_max || c.clamp_min >= c.clamp_max {
            return Err(LadewerkError::validation(
                "consumption",
                "Lower bounds must be below upper bounds",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.wallbox.max_power_w, 11000);
        assert_eq!(config.wallbox.min_power_w, 4200);
        assert_eq!(config.control.interval_seconds, 30);
        assert!(!config.control.safe_mode);
        assert!((config.trips.road_factor - 1.3).abs() < f64::EPSILON);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.wallbox.eco_power_w = 20_000;
        assert!(config.validate().is_err());

        config = Config::default();
        config.timezone = "Mars/Olympus".to_string();
        assert!(config.validate().is_err());

        config = Config::default();
        config.planner.default_departure = "7h30".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn parse_hhmm_accepts_seconds() {
        assert_eq!(
            parse_hhmm("07:30").unwrap(),
            NaiveTime::from_hms_opt(7, 30, 0).unwrap()
        );
        assert_eq!(
            parse_hhmm(" 06:45:00 ").unwrap(),
            NaiveTime::from_hms_opt(6, 45, 0).unwrap()
        );
        assert!(parse_hhmm("unknown").is_err());
    }
}
