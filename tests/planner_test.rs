use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use ladewerk::config::{Config, PlannerConfig};
use ladewerk::controls::ChargeMode;
use ladewerk::planner::{ChargingPlanner, PlannerInputs, apply_recommendation};
use ladewerk::telemetry::{ControlValue, InMemoryGateway};
use ladewerk::trips::{DayPlan, Transport, Trip, TripSource};

fn day(offset: i64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 19).unwrap() + chrono::Duration::days(offset)
}

fn now(hour: u32) -> NaiveDateTime {
    day(0).and_hms_opt(hour, 0, 0).unwrap()
}

fn trip(date: NaiveDate, energy_kwh: f64, departure: (u32, u32)) -> Trip {
    Trip {
        date,
        event_id: format!("t-{}", date),
        driver: "H".to_string(),
        destination: "Somewhere".to_string(),
        one_way_km: energy_kwh / 0.22 / 2.0,
        round_trip_km: energy_kwh / 0.22,
        energy_kwh,
        departure: NaiveTime::from_hms_opt(departure.0, departure.1, 0),
        return_time: None,
        is_commute: false,
        needs_clarification: false,
        source: TripSource::Calendar,
        transport: Transport::Ev,
    }
}

fn plan_with(date: NaiveDate, trips: Vec<Trip>) -> DayPlan {
    DayPlan { date, trips }
}

fn inputs(hour: u32, energy: f64, pv_today: f64, pv_tomorrow: f64) -> PlannerInputs {
    PlannerInputs {
        now: now(hour),
        current_energy_kwh: energy,
        capacity_kwh: 77.0,
        pv_today_remaining_kwh: pv_today,
        pv_tomorrow_kwh: pv_tomorrow,
    }
}

fn planner() -> ChargingPlanner {
    ChargingPlanner::new(&PlannerConfig::default())
}

#[test]
fn no_trips_means_pv_only() {
    let days = vec![DayPlan::new(day(0)), DayPlan::new(day(1))];
    let plan = planner().plan(&inputs(10, 20.0, 5.0, 5.0), &days);
    for rec in &plan.days {
        assert_eq!(rec.mode, ChargeMode::PvSurplus);
        assert_eq!(rec.energy_to_charge_kwh, 0.0);
    }
}

#[test]
fn enough_energy_is_pv_top_up() {
    // 10 kWh trip + 5 buffer + 8 arrival = 23 kWh needed
    let days = vec![plan_with(day(0), vec![trip(day(0), 10.0, (17, 0))])];
    let plan = planner().plan(&inputs(10, 30.0, 0.0, 0.0), &days);
    let rec = &plan.days[0];
    assert_eq!(rec.energy_needed_kwh, 23.0);
    assert_eq!(rec.energy_to_charge_kwh, 0.0);
    assert_eq!(rec.mode, ChargeMode::PvSurplus);
}

#[test]
fn today_urgency_ladder() {
    let p = planner();
    let days = vec![plan_with(day(0), vec![trip(day(0), 20.0, (18, 0))])];

    // Departure passed
    let rec = &p.plan(&inputs(19, 10.0, 0.0, 0.0), &days).days[0];
    assert_eq!(rec.mode, ChargeMode::Fast);

    // PV covers the 23 kWh deficit with 8 h left
    let rec = &p.plan(&inputs(10, 10.0, 40.0, 0.0), &days).days[0];
    assert_eq!(rec.energy_to_charge_kwh, 23.0);
    assert_eq!(rec.mode, ChargeMode::Smart);
    assert!(rec.pv_trusted);
    assert!(!rec.full_by_morning);

    // Imminent with a large deficit
    let rec = &p.plan(&inputs(17, 10.0, 40.0, 0.0), &days).days[0];
    assert_eq!(rec.mode, ChargeMode::Fast);

    // Imminent with a small deficit
    let rec = &p.plan(&inputs(17, 25.0, 0.0, 0.0), &days).days[0];
    assert_eq!(rec.energy_to_charge_kwh, 8.0);
    assert_eq!(rec.mode, ChargeMode::Eco);

    // Otherwise Smart with a grid-fill deadline
    let rec = &p.plan(&inputs(10, 10.0, 0.0, 0.0), &days).days[0];
    assert_eq!(rec.mode, ChargeMode::Smart);
    assert!(rec.full_by_morning);
    assert!(!rec.pv_trusted);
}

#[test]
fn tomorrow_early_departure_charges_tonight_and_is_applied() {
    let days = vec![
        DayPlan::new(day(0)),
        plan_with(day(1), vec![trip(day(1), 30.0, (7, 0))]),
    ];
    let plan = planner().plan(&inputs(20, 20.0, 0.0, 50.0), &days);
    let tomorrow = &plan.days[1];
    assert_eq!(tomorrow.mode, ChargeMode::Smart);
    assert!(tomorrow.full_by_morning);
    assert_eq!(tomorrow.energy_to_charge_kwh, 23.0);
    assert_eq!(plan.applied().unwrap().date, day(1));
}

#[test]
fn tomorrow_late_departure_trusts_pv() {
    let days = vec![
        DayPlan::new(day(0)),
        plan_with(day(1), vec![trip(day(1), 30.0, (11, 0))]),
    ];
    let plan = planner().plan(&inputs(20, 20.0, 0.0, 50.0), &days);
    let tomorrow = &plan.days[1];
    assert!(tomorrow.pv_trusted);
    assert!(!tomorrow.full_by_morning);
    assert_eq!(plan.applied().unwrap().date, day(0));

    // Not enough PV: charge tonight after all
    let plan = planner().plan(&inputs(20, 20.0, 0.0, 10.0), &days);
    assert!(plan.days[1].full_by_morning);
}

#[test]
fn running_energy_threads_through_the_horizon() {
    let days = vec![
        plan_with(day(0), vec![trip(day(0), 10.0, (17, 0))]),
        plan_with(day(1), vec![trip(day(1), 10.0, (11, 0))]),
        plan_with(day(2), vec![trip(day(2), 10.0, (11, 0))]),
    ];
    // 40 kWh: day 0 needs 23, leaves 30; day 1 needs 23, leaves 20;
    // day 2 needs 23, 3 missing
    let plan = planner().plan(&inputs(8, 40.0, 0.0, 100.0), &days);
    assert_eq!(plan.days[0].energy_to_charge_kwh, 0.0);
    assert_eq!(plan.days[1].energy_to_charge_kwh, 0.0);
    assert!((plan.days[2].energy_to_charge_kwh - 3.0).abs() < 1e-9);
    assert_eq!(plan.days[2].mode, ChargeMode::PvSurplus);
    assert!(plan.days[2].reason.starts_with("Provisional"));
}

#[test]
fn trips_already_back_home_no_longer_count() {
    let mut commute = trip(day(0), 30.0, (7, 30));
    commute.return_time = NaiveTime::from_hms_opt(17, 30, 0);
    let days = vec![plan_with(day(0), vec![commute])];

    // Still out at noon: the trip counts and its departure has passed
    let rec = &planner().plan(&inputs(12, 10.0, 0.0, 0.0), &days).days[0];
    assert_eq!(rec.trip_energy_kwh, 30.0);
    assert_eq!(rec.mode, ChargeMode::Fast);

    // Back in the evening: the SoC already reflects the trip
    let plan = planner().plan(&inputs(19, 10.0, 0.0, 0.0), &days);
    let rec = &plan.days[0];
    assert!(rec.trips.is_empty());
    assert_eq!(rec.trip_energy_kwh, 0.0);
    assert_eq!(rec.energy_to_charge_kwh, 0.0);
    assert_eq!(rec.mode, ChargeMode::PvSurplus);
    assert_eq!(plan.days[0].reason, "No trips, PV surplus only");
}

#[tokio::test]
async fn apply_writes_control_variables_independently() {
    let config = Config::default();
    let e = &config.entities;
    let gateway = InMemoryGateway::new();
    gateway.fail_writes_to(&e.charge_mode);

    let days = vec![plan_with(day(0), vec![trip(day(0), 20.0, (18, 0))])];
    let plan = planner().plan(&inputs(10, 10.0, 0.0, 0.0), &days);
    let rec = plan.applied().unwrap();
    let report = apply_recommendation(&gateway, e, rec, 0.0).await;

    assert_eq!(report.failed, vec![e.charge_mode.clone()]);
    assert_eq!(report.written.len(), 3);
    assert_eq!(
        gateway.last_write(&e.full_by_morning),
        Some(ControlValue::Bool(true))
    );
    assert_eq!(
        gateway.last_write(&e.target_energy),
        Some(ControlValue::Number(23.0))
    );
    assert_eq!(
        gateway.last_write(&e.departure_time),
        Some(ControlValue::Time(NaiveTime::from_hms_opt(18, 0, 0).unwrap()))
    );
}

#[tokio::test]
async fn apply_skips_target_energy_without_charge() {
    let config = Config::default();
    let e = &config.entities;
    let gateway = InMemoryGateway::new();
    let plan = planner().plan(&inputs(10, 50.0, 0.0, 0.0), &[DayPlan::new(day(0))]);
    let report = apply_recommendation(&gateway, e, plan.applied().unwrap(), 0.0).await;

    assert!(report.failed.is_empty());
    assert_eq!(
        gateway.last_write(&e.charge_mode),
        Some(ControlValue::Option("PV Surplus".to_string()))
    );
    assert_eq!(
        gateway.last_write(&e.full_by_morning),
        Some(ControlValue::Bool(false))
    );
    assert!(gateway.last_write(&e.target_energy).is_none());
}

#[tokio::test]
async fn apply_target_includes_energy_of_running_session() {
    let config = Config::default();
    let e = &config.entities;
    let gateway = InMemoryGateway::new();
    let days = vec![plan_with(day(0), vec![trip(day(0), 20.0, (18, 0))])];
    let plan = planner().plan(&inputs(10, 10.0, 0.0, 0.0), &days);

    // 23 kWh still missing on top of 12.34 kWh already in this session
    apply_recommendation(&gateway, e, plan.applied().unwrap(), 12.34).await;
    assert_eq!(
        gateway.last_write(&e.target_energy),
        Some(ControlValue::Number(35.3))
    );
}

#[tokio::test]
async fn apply_leaves_manual_selector_alone() {
    let config = Config::default();
    let e = &config.entities;
    let gateway = InMemoryGateway::new();
    gateway.set_text(&e.charge_mode, "Manual");
    let days = vec![plan_with(day(0), vec![trip(day(0), 20.0, (18, 0))])];
    let plan = planner().plan(&inputs(10, 10.0, 0.0, 0.0), &days);

    let report = apply_recommendation(&gateway, e, plan.applied().unwrap(), 0.0).await;
    assert_eq!(
        report.skipped,
        vec![e.charge_mode.clone(), e.full_by_morning.clone()]
    );
    assert!(gateway.last_write(&e.charge_mode).is_none());
    assert!(gateway.last_write(&e.full_by_morning).is_none());
    assert_eq!(
        gateway.last_write(&e.target_energy),
        Some(ControlValue::Number(23.0))
    );
}
