use chrono::Utc;
use ladewerk::config::Config;
use ladewerk::driver::ChargeDriver;
use ladewerk::error::LadewerkError;
use ladewerk::events::{BusEvent, EventBus};
use ladewerk::persistence::PersistenceManager;
use ladewerk::planner::service::PlanningService;
use ladewerk::telemetry::{ControlValue, InMemoryGateway, TelemetryGateway};
use ladewerk::trips::{CalendarEvent, StaticCalendar};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc;

fn config() -> Config {
    let mut config = Config::default();
    // Keep plans independent of the weekday the test runs on
    for driver in &mut config.trips.drivers {
        driver.commute = None;
    }
    config
}

fn today(config: &Config) -> chrono::NaiveDate {
    Utc::now().with_timezone(&config.tz().unwrap()).date_naive()
}

fn service(
    config: &Config,
    gateway: Arc<InMemoryGateway>,
    events: Vec<CalendarEvent>,
    bus: EventBus,
    dir: &TempDir,
) -> PlanningService {
    PlanningService::new(
        config.clone(),
        gateway,
        Arc::new(StaticCalendar::new(events)),
        None,
        bus,
        PersistenceManager::new(dir.path().join("state.json")),
    )
    .unwrap()
}

#[tokio::test]
async fn plan_once_writes_controls_and_announces() {
    let dir = TempDir::new().unwrap();
    let config = config();
    let day = today(&config);
    let gateway = Arc::new(InMemoryGateway::new());
    gateway.set_number(&config.entities.ev_soc, 10.0);

    let trip = CalendarEvent {
        id: "aachen".to_string(),
        summary: "N: Aachen".to_string(),
        start: day.and_hms_opt(0, 0, 0).unwrap(),
        end: day.succ_opt().unwrap().and_hms_opt(0, 0, 0).unwrap(),
        all_day: true,
        location: None,
    };
    let bus = EventBus::default();
    let mut rx = bus.subscribe();
    let mut svc = service(&config, gateway.clone(), vec![trip], bus, &dir);
    let plans = svc.plans();

    let plan = svc.plan_once(Some("plan-test".to_string())).await.unwrap();
    assert_eq!(plan.days.len(), 3);
    assert!((plan.days[0].trip_energy_kwh - 35.2).abs() < 1e-9);
    // 7.7 kWh on board, 35.2 + 5 + 8 needed
    assert_eq!(
        gateway.last_write(&config.entities.target_energy),
        Some(ControlValue::Number(40.5))
    );
    assert!(gateway.last_write(&config.entities.charge_mode).is_some());

    match rx.recv().await.unwrap() {
        BusEvent::PlanUpdated { correlation_id, .. } => assert_eq!(correlation_id, "plan-test"),
        other => panic!("unexpected event {}", other.name()),
    }
    assert_eq!(plans.borrow().as_deref(), Some(&plan));
    assert!(dir.path().join("state.json").exists());
}

#[tokio::test]
async fn no_trips_means_pv_surplus() {
    let dir = TempDir::new().unwrap();
    let config = config();
    let gateway = Arc::new(InMemoryGateway::new());
    gateway.set_number(&config.entities.ev_soc, 50.0);
    let mut svc = service(&config, gateway.clone(), Vec::new(), EventBus::default(), &dir);

    let plan = svc.plan_once(None).await.unwrap();
    assert!(plan.days.iter().all(|d| d.energy_to_charge_kwh == 0.0));
    assert_eq!(
        gateway.last_write(&config.entities.charge_mode),
        Some(ControlValue::Option("PV Surplus".to_string()))
    );
    assert_eq!(
        gateway.last_write(&config.entities.full_by_morning),
        Some(ControlValue::Bool(false))
    );
}

#[tokio::test]
async fn missing_soc_skips_the_run() {
    let dir = TempDir::new().unwrap();
    let config = config();
    let gateway = Arc::new(InMemoryGateway::new());
    let bus = EventBus::default();
    let mut rx = bus.subscribe();
    let mut svc = service(&config, gateway.clone(), Vec::new(), bus, &dir);

    let result = svc.plan_once(None).await;
    assert!(matches!(result, Err(LadewerkError::Planning { .. })));
    assert!(gateway.writes().is_empty());
    assert!(rx.try_recv().is_err());
    assert!(svc.plans().borrow().is_none());
}

#[tokio::test]
async fn clarification_answer_is_learned_and_replanned() {
    let dir = TempDir::new().unwrap();
    let config = config();
    let day = today(&config);
    let gateway = Arc::new(InMemoryGateway::new());
    gateway.set_number(&config.entities.ev_soc, 80.0);
    let event = CalendarEvent {
        id: "odd".to_string(),
        summary: "N: Hintertupfingen".to_string(),
        start: day.and_hms_opt(0, 0, 0).unwrap(),
        end: day.succ_opt().unwrap().and_hms_opt(0, 0, 0).unwrap(),
        all_day: true,
        location: None,
    };
    let mut svc = service(&config, gateway, vec![event], EventBus::default(), &dir);

    svc.plan_once(None).await.unwrap();
    assert_eq!(svc.pending_clarifications().len(), 1);

    let plan = svc.resolve_clarification("odd", 12.0).await.unwrap();
    assert!(svc.pending_clarifications().is_empty());
    let trip = &plan.days[0].trips[0];
    assert_eq!(trip.one_way_km, 12.0);

    let mut stored = PersistenceManager::new(dir.path().join("state.json"));
    stored.load().unwrap();
    assert_eq!(stored.learned_destinations().len(), 1);
}

fn early_trip_tomorrow(config: &Config) -> CalendarEvent {
    let tomorrow = today(config).succ_opt().unwrap();
    CalendarEvent {
        id: "aachen-early".to_string(),
        summary: "N: Aachen".to_string(),
        start: tomorrow.and_hms_opt(7, 0, 0).unwrap(),
        end: tomorrow.and_hms_opt(18, 0, 0).unwrap(),
        all_day: false,
        location: None,
    }
}

#[tokio::test]
async fn replanning_mid_session_keeps_charging_towards_the_trip() {
    let dir = TempDir::new().unwrap();
    let mut config = config();
    config.control.liveness_file = None;
    let e = config.entities.clone();
    let gateway = Arc::new(InMemoryGateway::new());
    gateway.set_number(&e.ev_soc, 10.0);
    let trip = early_trip_tomorrow(&config);
    let mut svc = service(&config, gateway.clone(), vec![trip], EventBus::default(), &dir);

    // 7.7 kWh on board, 35.2 + 5 + 8 needed by 07:00
    svc.plan_once(None).await.unwrap();
    assert_eq!(
        gateway.last_write(&e.target_energy),
        Some(ControlValue::Number(40.5))
    );

    // 25 kWh into the session the car reports 42.5 %
    gateway.set_text(&e.wallbox_state, "C");
    gateway.set_number(&e.wallbox_session_energy, 25.0);
    gateway.set_number(&e.wallbox_power, 11_000.0);
    gateway.set_number(&e.grid_power, 0.0);
    gateway.set_number(&e.ev_soc, 42.5);
    svc.plan_once(None).await.unwrap();
    assert_eq!(
        gateway.last_write(&e.target_energy),
        Some(ControlValue::Number(40.5))
    );

    let (_commands, rx) = mpsc::unbounded_channel();
    let mut driver =
        ChargeDriver::new(config.clone(), gateway.clone(), EventBus::default(), rx).unwrap();
    let status = driver.run_cycle(None).await.unwrap();
    assert!(!status.reason.starts_with("Target reached"), "{}", status.reason);
    assert!((status.energy_remaining_kwh - 15.5).abs() < 1e-9);
    assert!(status.target_power_w > 0);
}

#[tokio::test]
async fn planning_respects_manual_mode() {
    let dir = TempDir::new().unwrap();
    let config = config();
    let e = config.entities.clone();
    let gateway = Arc::new(InMemoryGateway::new());
    gateway.set_number(&e.ev_soc, 10.0);
    gateway.set_text(&e.charge_mode, "Manual");
    let trip = early_trip_tomorrow(&config);
    let mut svc = service(&config, gateway.clone(), vec![trip], EventBus::default(), &dir);

    let plan = svc.plan_once(None).await.unwrap();
    assert!(plan.applied().unwrap().full_by_morning);
    assert!(gateway.last_write(&e.charge_mode).is_none());
    assert!(gateway.last_write(&e.full_by_morning).is_none());
    let selector = gateway.read(&e.charge_mode).await.unwrap();
    assert_eq!(selector.as_text().as_deref(), Some("Manual"));
    // The deadline inputs stay current for when the user switches back
    assert_eq!(
        gateway.last_write(&e.target_energy),
        Some(ControlValue::Number(40.5))
    );
}
