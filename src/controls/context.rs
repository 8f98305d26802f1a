//! Per-cycle inputs and outputs of the charging strategy

use super::ChargeMode;
use chrono::{Duration, NaiveDateTime, NaiveTime};
use serde::Serialize;

/// Vehicle connection state reported by the wallbox
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleState {
    NoVehicle,
    Connected,
    Charging,
    ChargingVentilation,
    Error,
}

impl VehicleState {
    /// Parse wallbox state strings: IEC 61851 letters (A..F), numeric codes
    /// (1 = no vehicle .. 5 = error) or plain words. Unrecognized values are
    /// treated as an error state; a missing value as no vehicle.
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Self::NoVehicle;
        };
        let normalized = raw.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "a" | "1" | "1.0" | "no_vehicle" | "disconnected" | "idle" | "available" => {
                Self::NoVehicle
            }
            "b" | "2" | "2.0" | "connected" | "ready" | "waiting" | "suspended" | "paused" => {
                Self::Connected
            }
            "c" | "3" | "3.0" | "charging" => Self::Charging,
            "d" | "4" | "4.0" | "charging_ventilation" | "charging_with_ventilation" => {
                Self::ChargingVentilation
            }
            _ => Self::Error,
        }
    }

    pub const fn is_connected(self) -> bool {
        matches!(
            self,
            Self::Connected | Self::Charging | Self::ChargingVentilation
        )
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoVehicle => "no_vehicle",
            Self::Connected => "connected",
            Self::Charging => "charging",
            Self::ChargingVentilation => "charging_ventilation",
            Self::Error => "error",
        }
    }
}

/// Snapshot of the wallbox, read fresh every cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WallboxState {
    pub vehicle_state: VehicleState,
    /// Current draw in W
    pub power_w: f64,
    /// Energy delivered in the current session (kWh)
    pub session_energy_kwh: f64,
}

impl WallboxState {
    pub const fn vehicle_connected(&self) -> bool {
        self.vehicle_state.is_connected()
    }

    pub const fn vehicle_charging(&self) -> bool {
        matches!(
            self.vehicle_state,
            VehicleState::Charging | VehicleState::ChargingVentilation
        )
    }
}

/// Immutable input to one strategy decision.
///
/// `grid_power_w` is positive while importing and negative while exporting.
/// `battery_power_w` is positive while the home battery charges.
#[derive(Debug, Clone, PartialEq)]
pub struct ChargingContext {
    pub mode: ChargeMode,
    pub wallbox: WallboxState,
    pub grid_power_w: f64,
    pub pv_power_w: f64,
    pub house_power_w: f64,
    pub battery_power_w: f64,
    pub battery_soc_pct: Option<f64>,
    pub pv_forecast_today_kwh: f64,
    pub pv_forecast_tomorrow_kwh: f64,
    pub full_by_morning: bool,
    pub departure_time: NaiveTime,
    pub target_energy_kwh: f64,
    pub ev_soc_pct: Option<f64>,
    pub ev_capacity_kwh: f64,
    pub ev_target_soc_pct: f64,
    /// Session energy accrued inside the overnight window
    pub overnight_kwh: f64,
    /// Local wall-clock time of the snapshot
    pub now: NaiveDateTime,
}

impl ChargingContext {
    pub const fn session_energy_kwh(&self) -> f64 {
        self.wallbox.session_energy_kwh
    }

    /// Energy still needed by the vehicle. Prefers the vehicle's own SoC and
    /// falls back to the planner target minus the session energy.
    pub fn energy_needed_kwh(&self) -> f64 {
        match self.ev_soc_pct {
            Some(soc) => ((self.ev_target_soc_pct - soc) / 100.0 * self.ev_capacity_kwh).max(0.0),
            None => (self.target_energy_kwh - self.session_energy_kwh()).max(0.0),
        }
    }

    /// Energy left until the planner target (never negative)
    pub fn remaining_to_target_kwh(&self) -> f64 {
        (self.target_energy_kwh - self.session_energy_kwh()).max(0.0)
    }

    /// Hours until the next occurrence of the departure time. Today if it
    /// has not passed yet, otherwise tomorrow.
    pub fn hours_until_departure(&self) -> f64 {
        let mut departure = self.now.date().and_time(self.departure_time);
        if departure < self.now {
            departure += Duration::days(1);
        }
        (departure - self.now).num_seconds() as f64 / 3600.0
    }
}

/// Output of one strategy decision
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChargingDecision {
    /// Wallbox setpoint, 0 pauses charging
    pub target_power_w: u32,
    pub reason: String,
    /// Manual mode: the wallbox must not be written
    pub skip_control: bool,
    /// Unassisted PV surplus (may be negative)
    pub pv_surplus_w: i32,
    pub battery_assist_w: u32,
    pub battery_assist_reason: String,
    pub deadline_active: bool,
    pub deadline_hours_left: Option<f64>,
    pub deadline_required_w: Option<u32>,
    pub energy_remaining_kwh: f64,
}

impl ChargingDecision {
    pub fn pause(reason: impl Into<String>) -> Self {
        Self {
            target_power_w: 0,
            reason: reason.into(),
            skip_control: false,
            pv_surplus_w: 0,
            battery_assist_w: 0,
            battery_assist_reason: String::new(),
            deadline_active: false,
            deadline_hours_left: None,
            deadline_required_w: None,
            energy_remaining_kwh: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn parses_vehicle_states() {
        assert_eq!(VehicleState::parse(Some("C")), VehicleState::Charging);
        assert_eq!(VehicleState::parse(Some("2")), VehicleState::Connected);
        assert_eq!(
            VehicleState::parse(Some("Charging with ventilation")),
            VehicleState::ChargingVentilation
        );
        assert_eq!(VehicleState::parse(None), VehicleState::NoVehicle);
        assert_eq!(VehicleState::parse(Some("fault 17")), VehicleState::Error);
    }

    #[test]
    fn departure_wraps_to_tomorrow() {
        let now = NaiveDate::from_ymd_opt(2026, 10, 19)
            .unwrap()
            .and_hms_opt(22, 0, 0)
            .unwrap();
        let ctx = ChargingContext {
            mode: ChargeMode::Smart,
            wallbox: WallboxState {
                vehicle_state: VehicleState::Connected,
                power_w: 0.0,
                session_energy_kwh: 4.0,
            },
            grid_power_w: 0.0,
            pv_power_w: 0.0,
            house_power_w: 0.0,
            battery_power_w: 0.0,
            battery_soc_pct: None,
            pv_forecast_today_kwh: 0.0,
            pv_forecast_tomorrow_kwh: 0.0,
            full_by_morning: true,
            departure_time: NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
            target_energy_kwh: 10.0,
            ev_soc_pct: None,
            ev_capacity_kwh: 77.0,
            ev_target_soc_pct: 80.0,
            overnight_kwh: 0.0,
            now,
        };
        assert!((ctx.hours_until_departure() - 9.0).abs() < 1e-9);
        assert!((ctx.energy_needed_kwh() - 6.0).abs() < 1e-9);

        let with_soc = ChargingContext {
            ev_soc_pct: Some(50.0),
            ..ctx
        };
        assert!((with_soc.energy_needed_kwh() - 23.1).abs() < 1e-9);
    }
}
