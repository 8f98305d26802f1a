//! Telemetry snapshot for one control cycle

use crate::config::Config;
use crate::controls::{ChargeMode, ChargingContext, VehicleState, WallboxState};
use crate::logging::get_logger;
use crate::telemetry::{
    TelemetryGateway, read_bool_or, read_f64_or, read_opt_f64, read_text, read_time_or,
};
use chrono::{NaiveDateTime, NaiveTime};
use std::str::FromStr;

/// Read every input of the strategy. Unavailable values fall back to
/// defaults; the mode falls back to `fallback_mode`. `overnight_kwh` is left
/// at zero for the caller to fill in.
pub(crate) async fn read_context(
    gateway: &dyn TelemetryGateway,
    config: &Config,
    now: NaiveDateTime,
    default_departure: NaiveTime,
    fallback_mode: ChargeMode,
) -> ChargingContext {
    let e = &config.entities;

    let mode = match read_text(gateway, &e.charge_mode).await {
        Some(raw) => ChargeMode::from_str(&raw).unwrap_or_else(|_| {
            get_logger("driver").warn(&format!(
                "Unknown charge mode '{}', keeping {}",
                raw, fallback_mode
            ));
            fallback_mode
        }),
        None => fallback_mode,
    };

    let wallbox = WallboxState {
        vehicle_state: VehicleState::parse(read_text(gateway, &e.wallbox_state).await.as_deref()),
        power_w: read_f64_or(gateway, &e.wallbox_power, 0.0).await.max(0.0),
        session_energy_kwh: read_f64_or(gateway, &e.wallbox_session_energy, 0.0)
            .await
            .max(0.0),
    };

    ChargingContext {
        mode,
        wallbox,
        grid_power_w: read_f64_or(gateway, &e.grid_power, 0.0).await,
        pv_power_w: read_f64_or(gateway, &e.pv_power, 0.0).await.max(0.0),
        house_power_w: read_f64_or(gateway, &e.house_power, 0.0).await.max(0.0),
        battery_power_w: read_f64_or(gateway, &e.battery_power, 0.0).await,
        battery_soc_pct: read_opt_f64(gateway, &e.battery_soc).await,
        pv_forecast_today_kwh: read_f64_or(gateway, &e.pv_forecast_today_remaining, 0.0)
            .await
            .max(0.0),
        pv_forecast_tomorrow_kwh: read_f64_or(gateway, &e.pv_forecast_tomorrow, 0.0)
            .await
            .max(0.0),
        full_by_morning: read_bool_or(gateway, &e.full_by_morning, false).await,
        departure_time: read_time_or(gateway, &e.departure_time, default_departure).await,
        target_energy_kwh: read_f64_or(gateway, &e.target_energy, 0.0).await.max(0.0),
        ev_soc_pct: read_opt_f64(gateway, &e.ev_soc).await,
        ev_capacity_kwh: read_f64_or(gateway, &e.ev_capacity, config.vehicle.capacity_kwh).await,
        ev_target_soc_pct: read_f64_or(
            gateway,
            &e.ev_target_soc,
            config.vehicle.default_target_soc_pct,
        )
        .await,
        overnight_kwh: 0.0,
        now,
    }
}

/// Safe mode from the control variable, unless a command overrides it
pub(crate) async fn read_safe_mode(
    gateway: &dyn TelemetryGateway,
    config: &Config,
    override_value: Option<bool>,
) -> bool {
    match override_value {
        Some(v) => v,
        None => read_bool_or(gateway, &config.entities.safe_mode, config.control.safe_mode).await,
    }
}
