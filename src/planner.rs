//! Multi-day charging planner
//!
//! Walks the planning horizon day by day with a running estimate of the
//! energy in the car, decides per day how much must be charged and in which
//! mode, and writes the recommendation that matters now to the control
//! variables read by the strategy.

pub mod service;

use crate::config::{EntitiesConfig, PlannerConfig, parse_hhmm};
use crate::controls::ChargeMode;
use crate::logging::{StructuredLogger, get_logger};
use crate::telemetry::{ControlValue, TelemetryGateway, read_text};
use crate::trips::{DayPlan, Trip};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::Serialize;

/// Inputs of one planning run
#[derive(Debug, Clone, PartialEq)]
pub struct PlannerInputs {
    pub now: NaiveDateTime,
    /// Energy currently in the car
    pub current_energy_kwh: f64,
    pub capacity_kwh: f64,
    pub pv_today_remaining_kwh: f64,
    pub pv_tomorrow_kwh: f64,
}

/// What to do for one day of the horizon
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayChargingRecommendation {
    pub date: NaiveDate,
    pub trips: Vec<Trip>,
    pub trip_energy_kwh: f64,
    /// Trip energy plus safety margins
    pub energy_needed_kwh: f64,
    pub soc_needed_pct: f64,
    pub energy_to_charge_kwh: f64,
    pub mode: ChargeMode,
    pub full_by_morning: bool,
    pub departure: Option<NaiveTime>,
    pub charge_by: Option<NaiveDateTime>,
    pub pv_forecast_kwh: f64,
    pub pv_trusted: bool,
    pub reason: String,
}

impl DayChargingRecommendation {
    /// Charging has to happen overnight, before the departure
    pub fn charges_tonight(&self) -> bool {
        self.full_by_morning && self.energy_to_charge_kwh > 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChargingPlan {
    pub created_at: NaiveDateTime,
    pub start_energy_kwh: f64,
    pub days: Vec<DayChargingRecommendation>,
}

impl ChargingPlan {
    /// Today's recommendation, unless today needs nothing and tomorrow
    /// already requires charging tonight
    pub fn applied(&self) -> Option<&DayChargingRecommendation> {
        let today = self.days.first()?;
        match self.days.get(1) {
            Some(tomorrow) if today.energy_to_charge_kwh <= 0.0 && tomorrow.charges_tonight() => {
                Some(tomorrow)
            }
            _ => Some(today),
        }
    }

    pub fn summary(&self) -> String {
        match self.applied() {
            Some(rec) => format!(
                "{}: {}, charge {:.1} kWh ({})",
                rec.date,
                rec.mode.label(),
                rec.energy_to_charge_kwh,
                rec.reason
            ),
            None => "empty plan".to_string(),
        }
    }
}

pub struct ChargingPlanner {
    config: PlannerConfig,
    default_departure: NaiveTime,
    logger: StructuredLogger,
}

impl ChargingPlanner {
    pub fn new(config: &PlannerConfig) -> Self {
        let default_departure = parse_hhmm(&config.default_departure)
            .unwrap_or_else(|_| NaiveTime::from_hms_opt(7, 30, 0).unwrap_or(NaiveTime::MIN));
        Self {
            config: config.clone(),
            default_departure,
            logger: get_logger("planner"),
        }
    }

    pub fn plan(&self, inputs: &PlannerInputs, days: &[DayPlan]) -> ChargingPlan {
        let today = inputs.now.date();
        let mut running = inputs.current_energy_kwh.max(0.0);
        let mut recommendations = Vec::with_capacity(days.len());

        for day in days {
            let offset = (day.date - today).num_days();
            let rec = self.recommend(inputs, day, offset, running);
            running = (running - rec.trip_energy_kwh + rec.energy_to_charge_kwh).max(0.0);
            if inputs.capacity_kwh > 0.0 {
                running = running.min(inputs.capacity_kwh);
            }
            self.logger.debug(&format!(
                "{}: {} -> {:.1} kWh to charge, {:.1} kWh after the day",
                rec.date,
                rec.mode.label(),
                rec.energy_to_charge_kwh,
                running
            ));
            recommendations.push(rec);
        }

        ChargingPlan {
            created_at: inputs.now,
            start_energy_kwh: inputs.current_energy_kwh.max(0.0),
            days: recommendations,
        }
    }

    fn recommend(
        &self,
        inputs: &PlannerInputs,
        day: &DayPlan,
        offset: i64,
        running: f64,
    ) -> DayChargingRecommendation {
        let ahead;
        let day = if offset == 0 {
            ahead = day.ahead_of(inputs.now);
            &ahead
        } else {
            day
        };
        let trip_energy = day.total_energy_kwh();
        let required = trip_energy + self.config.buffer_kwh + self.config.min_arrival_kwh;
        let soc_needed_pct = if inputs.capacity_kwh > 0.0 {
            (required / inputs.capacity_kwh * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        };
        let pv_forecast = match offset {
            0 => inputs.pv_today_remaining_kwh,
            1 => inputs.pv_tomorrow_kwh,
            _ => 0.0,
        }
        .max(0.0);
        let departure = day.earliest_departure().or(day.has_trips().then_some(self.default_departure));

        let mut rec = DayChargingRecommendation {
            date: day.date,
            trips: day.trips.clone(),
            trip_energy_kwh: trip_energy,
            energy_needed_kwh: required,
            soc_needed_pct,
            energy_to_charge_kwh: 0.0,
            mode: ChargeMode::PvSurplus,
            full_by_morning: false,
            departure,
            charge_by: departure.map(|t| day.date.and_time(t)),
            pv_forecast_kwh: pv_forecast,
            pv_trusted: true,
            reason: String::new(),
        };

        if !day.has_trips() {
            rec.energy_needed_kwh = 0.0;
            rec.soc_needed_pct = 0.0;
            rec.reason = "No trips, PV surplus only".to_string();
            return rec;
        }

        let deficit = (required - running).max(0.0);
        if deficit <= 0.0 {
            rec.reason = format!(
                "{:.1} kWh on board covers {:.1} kWh needed, PV top-up only",
                running, required
            );
            return rec;
        }
        rec.energy_to_charge_kwh = deficit;
        let departure = departure.unwrap_or(self.default_departure);
        let pv_usable = pv_forecast * self.config.pv_share;

        match offset {
            0 => {
                let hours_left =
                    (day.date.and_time(departure) - inputs.now).num_seconds() as f64 / 3600.0;
                if hours_left <= 0.0 {
                    rec.mode = ChargeMode::Fast;
                    rec.pv_trusted = false;
                    rec.reason = format!("Departure passed, {:.1} kWh missing", deficit);
                } else if pv_usable >= deficit && hours_left > self.config.ample_hours {
                    rec.mode = ChargeMode::Smart;
                    rec.reason = format!(
                        "PV ({:.1} kWh usable) covers {:.1} kWh before {}",
                        pv_usable,
                        deficit,
                        departure.format("%H:%M")
                    );
                } else if hours_left <= self.config.imminent_hours {
                    rec.pv_trusted = false;
                    if deficit > self.config.fast_deficit_kwh {
                        rec.mode = ChargeMode::Fast;
                        rec.reason = format!(
                            "Departure in {:.1} h, {:.1} kWh missing",
                            hours_left, deficit
                        );
                    } else {
                        rec.mode = ChargeMode::Eco;
                        rec.reason = format!(
                            "Departure in {:.1} h, {:.1} kWh missing at eco power",
                            hours_left, deficit
                        );
                    }
                } else {
                    rec.mode = ChargeMode::Smart;
                    rec.full_by_morning = true;
                    rec.pv_trusted = false;
                    rec.reason = format!(
                        "{:.1} kWh by {}, PV first then grid",
                        deficit,
                        departure.format("%H:%M")
                    );
                }
            }
            1 => {
                let early = departure.hour() < self.config.early_departure_hour;
                if early || pv_usable < deficit {
                    rec.mode = ChargeMode::Smart;
                    rec.full_by_morning = true;
                    rec.pv_trusted = false;
                    rec.charge_by = Some(day.date.and_time(departure));
                    rec.reason = if early {
                        format!(
                            "Early departure {}, charge {:.1} kWh tonight",
                            departure.format("%H:%M"),
                            deficit
                        )
                    } else {
                        format!(
                            "Tomorrow's PV ({:.1} kWh usable) short of {:.1} kWh, charge tonight",
                            pv_usable, deficit
                        )
                    };
                } else {
                    rec.mode = ChargeMode::Smart;
                    rec.reason = format!(
                        "Tomorrow's PV ({:.1} kWh usable) covers {:.1} kWh, grid as backstop",
                        pv_usable, deficit
                    );
                }
            }
            _ => {
                rec.mode = ChargeMode::PvSurplus;
                rec.pv_trusted = false;
                rec.reason = format!("Provisional: {:.1} kWh missing", deficit);
            }
        }
        rec
    }
}

/// Outcome of writing a recommendation to the control variables
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub written: Vec<String>,
    pub failed: Vec<String>,
    /// Left alone because the user took manual control
    pub skipped: Vec<String>,
}

/// Write a recommendation to the control variables. Every write is attempted
/// regardless of earlier failures.
///
/// The strategy compares `target_energy` with the energy of the running
/// wallbox session, so `session_energy_kwh` already delivered is added to
/// the deficit. A mode selector set to Manual is never overwritten.
pub async fn apply_recommendation(
    gateway: &dyn TelemetryGateway,
    entities: &EntitiesConfig,
    rec: &DayChargingRecommendation,
    session_energy_kwh: f64,
) -> ApplyReport {
    let logger = get_logger("planner");
    let mut report = ApplyReport::default();
    let current_mode = read_text(gateway, &entities.charge_mode)
        .await
        .and_then(|raw| raw.parse::<ChargeMode>().ok());

    let mut writes = Vec::with_capacity(4);
    if current_mode == Some(ChargeMode::Manual) {
        logger.info("Manual mode selected, leaving mode and full-by-morning alone");
        report.skipped.push(entities.charge_mode.clone());
        report.skipped.push(entities.full_by_morning.clone());
    } else {
        writes.push((
            entities.charge_mode.as_str(),
            ControlValue::Option(rec.mode.label().to_string()),
        ));
        writes.push((
            entities.full_by_morning.as_str(),
            ControlValue::Bool(rec.mode == ChargeMode::Smart && rec.charges_tonight()),
        ));
    }
    if let Some(departure) = rec.departure {
        writes.push((entities.departure_time.as_str(), ControlValue::Time(departure)));
    }
    if rec.energy_to_charge_kwh > 0.0 {
        let target = session_energy_kwh.max(0.0) + rec.energy_to_charge_kwh;
        let rounded = (target * 10.0).round() / 10.0;
        writes.push((entities.target_energy.as_str(), ControlValue::Number(rounded)));
    }

    for (name, value) in writes {
        match gateway.write(name, value).await {
            Ok(()) => report.written.push(name.to_string()),
            Err(e) => {
                logger.warn(&format!("Failed to write {}: {}", name, e));
                report.failed.push(name.to_string());
            }
        }
    }
    report
}
