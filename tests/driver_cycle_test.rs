use ladewerk::config::Config;
use ladewerk::controls::ChargeMode;
use ladewerk::driver::{ChargeDriver, DriverCommand, DriverState};
use ladewerk::events::{BusEvent, EventBus};
use ladewerk::telemetry::{ControlValue, InMemoryGateway};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::{mpsc, watch};
use tokio::time::{Duration, timeout};

struct Harness {
    driver: ChargeDriver,
    gateway: Arc<InMemoryGateway>,
    bus: EventBus,
    commands: mpsc::UnboundedSender<DriverCommand>,
    config: Config,
    _dir: TempDir,
}

fn harness(mode: &str) -> Harness {
    let dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.control.liveness_file = Some(dir.path().join("alive").to_string_lossy().into_owned());
    config.control.interval_seconds = 3600;

    let gateway = Arc::new(InMemoryGateway::new());
    let e = &config.entities;
    gateway.set_text(&e.charge_mode, mode);
    gateway.set_text(&e.wallbox_state, "B");
    gateway.set_number(&e.grid_power, 0.0);
    gateway.set_number(&e.house_power, 400.0);

    let bus = EventBus::default();
    let (tx, rx) = mpsc::unbounded_channel();
    let driver = ChargeDriver::new(config.clone(), gateway.clone(), bus.clone(), rx).unwrap();
    Harness {
        driver,
        gateway,
        bus,
        commands: tx,
        config,
        _dir: dir,
    }
}

#[tokio::test]
async fn fast_writes_rounded_limit() {
    let mut h = harness("Fast");
    let status = h.driver.run_cycle(None).await.unwrap();

    assert_eq!(status.mode, ChargeMode::Fast);
    assert_eq!(status.target_power_w, 11_000);
    assert_eq!(status.commanded_power_w, Some(10_980));
    assert!(status.written);
    assert_eq!(
        h.gateway.last_write(&h.config.entities.wallbox_power_limit),
        Some(ControlValue::Power(10_980))
    );
    assert_eq!(h.driver.stats().wallbox_writes, 1);
    assert!(status.reasoning.iter().any(|l| l.starts_with("Decision: 11000 W")));
}

#[tokio::test]
async fn unchanged_setpoint_is_not_rewritten() {
    let mut h = harness("Fast");
    h.driver.run_cycle(None).await.unwrap();
    let second = h.driver.run_cycle(None).await.unwrap();

    assert!(!second.written);
    assert_eq!(second.commanded_power_w, Some(10_980));
    assert_eq!(h.gateway.writes().len(), 1);
}

#[tokio::test]
async fn manual_leaves_wallbox_alone() {
    let mut h = harness("Manual");
    let status = h.driver.run_cycle(None).await.unwrap();

    assert!(status.decision.skip_control);
    assert_eq!(status.commanded_power_w, None);
    assert!(h.gateway.writes().is_empty());
}

#[tokio::test]
async fn safe_mode_suppresses_and_explains() {
    let mut h = harness("Fast");
    h.gateway.set_text(&h.config.entities.safe_mode, "on");
    let status = h.driver.run_cycle(None).await.unwrap();

    assert!(status.safe_mode);
    assert!(!status.written);
    assert!(
        status.reason.starts_with("Safe mode: would set 10980 W"),
        "{}",
        status.reason
    );
    assert!(h.gateway.writes().is_empty());
    assert_eq!(h.driver.stats().suppressed_writes, 1);
}

#[tokio::test]
async fn failed_write_is_counted_and_loop_continues() {
    let mut h = harness("Eco");
    h.gateway.fail_writes_to(&h.config.entities.wallbox_power_limit);

    let status = h.driver.run_cycle(None).await.unwrap();
    assert!(!status.written);
    assert_eq!(h.driver.stats().failed_writes, 1);

    // Retried on the next cycle since nothing was sent
    h.driver.run_cycle(None).await.unwrap();
    assert_eq!(h.driver.stats().failed_writes, 2);
}

#[tokio::test]
async fn unknown_mode_keeps_last_known_mode() {
    let mut h = harness("Eco");
    h.driver.run_cycle(None).await.unwrap();
    h.gateway.set_text(&h.config.entities.charge_mode, "Turbo");
    let status = h.driver.run_cycle(None).await.unwrap();
    assert_eq!(status.mode, ChargeMode::Eco);
    assert_eq!(status.target_power_w, 5000);
}

#[tokio::test]
async fn status_is_published_and_liveness_touched() {
    let mut h = harness("Off");
    let mut rx = h.bus.subscribe();
    let latest = h.driver.status_receiver();

    let status = h.driver.run_cycle(Some("corr-1".to_string())).await.unwrap();
    assert_eq!(status.reason, "Charging off");

    match rx.recv().await.unwrap() {
        BusEvent::Status(published) => {
            assert_eq!(published.correlation_id.as_deref(), Some("corr-1"));
            assert_eq!(published.commanded_power_w, Some(0));
        }
        other => panic!("unexpected event {}", other.name()),
    }
    assert_eq!(latest.borrow().as_ref().unwrap().as_ref(), status.as_ref());

    let alive = h.config.control.liveness_file.clone().unwrap();
    assert!(std::path::Path::new(&alive).exists());
}

#[tokio::test]
async fn run_loop_answers_commands_and_plan_updates() {
    let h = harness("Eco");
    let mut driver = h.driver;
    let mut status_rx = driver.status_receiver();
    let state_rx = driver.state_receiver();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(async move { driver.run(shutdown_rx).await });

    async fn wait_for_correlation(
        rx: &mut watch::Receiver<Option<Arc<ladewerk::driver::ChargingStatus>>>,
        id: Option<&str>,
    ) {
        loop {
            rx.changed().await.unwrap();
            let matches = rx
                .borrow()
                .as_ref()
                .is_some_and(|s| s.correlation_id.as_deref() == id);
            if matches {
                return;
            }
        }
    }

    // The first tick fires immediately
    timeout(Duration::from_secs(5), wait_for_correlation(&mut status_rx, None))
        .await
        .unwrap();
    assert_eq!(*state_rx.borrow(), DriverState::Running);

    h.commands
        .send(DriverCommand::ForceRefresh {
            correlation_id: Some("cmd-1".to_string()),
        })
        .unwrap();
    timeout(
        Duration::from_secs(5),
        wait_for_correlation(&mut status_rx, Some("cmd-1")),
    )
    .await
    .unwrap();

    h.bus.publish(BusEvent::PlanUpdated {
        correlation_id: "plan-1".to_string(),
        summary: "test".to_string(),
    });
    timeout(
        Duration::from_secs(5),
        wait_for_correlation(&mut status_rx, Some("plan-1")),
    )
    .await
    .unwrap();

    shutdown_tx.send_replace(true);
    timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(*state_rx.borrow(), DriverState::ShuttingDown);
}

#[tokio::test]
async fn safe_mode_command_overrides_control_variable() {
    let h = harness("Fast");
    let mut driver = h.driver;
    let mut status_rx = driver.status_receiver();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(async move { driver.run(shutdown_rx).await });

    h.commands.send(DriverCommand::SetSafeMode(true)).unwrap();
    h.commands
        .send(DriverCommand::ForceRefresh {
            correlation_id: Some("after".to_string()),
        })
        .unwrap();

    let status = timeout(Duration::from_secs(5), async {
        loop {
            status_rx.changed().await.unwrap();
            let latest = status_rx.borrow().clone();
            if let Some(s) = latest.filter(|s| s.correlation_id.as_deref() == Some("after")) {
                return s;
            }
        }
    })
    .await
    .unwrap();
    assert!(status.safe_mode);
    assert!(!status.written);

    shutdown_tx.send_replace(true);
    task.await.unwrap().unwrap();
}
