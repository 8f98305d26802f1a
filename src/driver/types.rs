use crate::controls::{ChargeMode, ChargingDecision, VehicleState};
use serde::Serialize;

/// Main driver state
#[derive(Debug, Clone, PartialEq)]
pub enum DriverState {
    /// Driver is initializing
    Initializing,
    /// Driver is running normally
    Running,
    /// Driver is in error state
    Error(String),
    /// Driver is shutting down
    ShuttingDown,
}

impl DriverState {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Initializing => "initializing",
            Self::Running => "running",
            Self::Error(_) => "error",
            Self::ShuttingDown => "shutting_down",
        }
    }
}

/// Commands accepted by the driver from other components
#[derive(Debug, Clone, PartialEq)]
pub enum DriverCommand {
    /// Run a cycle immediately
    ForceRefresh { correlation_id: Option<String> },
    /// Override the safe-mode control variable until restart
    SetSafeMode(bool),
}

/// Counters over the lifetime of the control loop
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleStats {
    pub total_cycles: u64,
    pub failed_cycles: u64,
    /// Cycles that took longer than the interval
    pub overrun_count: u64,
    pub last_cycle_ms: Option<u64>,
    pub wallbox_writes: u64,
    pub failed_writes: u64,
    pub suppressed_writes: u64,
}

/// Per-cycle status published on the bus
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChargingStatus {
    pub timestamp: String,
    pub correlation_id: Option<String>,
    pub driver_state: String,
    pub mode: ChargeMode,
    pub vehicle_state: VehicleState,
    pub target_power_w: u32,
    /// Rounded setpoint sent (or that would have been sent) to the wallbox
    pub commanded_power_w: Option<u32>,
    pub actual_power_w: f64,
    pub session_energy_kwh: f64,
    pub energy_needed_kwh: f64,
    pub energy_remaining_kwh: f64,
    pub overnight_kwh: f64,
    pub grid_power_w: f64,
    pub pv_power_w: f64,
    pub house_power_w: f64,
    pub battery_power_w: f64,
    pub battery_soc_pct: Option<f64>,
    pub ev_soc_pct: Option<f64>,
    pub ev_target_soc_pct: f64,
    pub pv_forecast_today_kwh: f64,
    pub pv_forecast_tomorrow_kwh: f64,
    pub full_by_morning: bool,
    pub departure_time: String,
    pub reason: String,
    pub safe_mode: bool,
    /// A wallbox write happened in this cycle
    pub written: bool,
    pub decision: ChargingDecision,
    pub reasoning: Vec<String>,
    pub stats: CycleStats,
}
