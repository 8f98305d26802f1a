use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{Duration, MissedTickBehavior, interval};

use crate::config::Config;
use crate::controls::{ChargeMode, ChargingStrategy};
use crate::error::Result;
use crate::events::{BusEvent, EventBus};
use crate::logging::get_logger;
use crate::persistence::PersistenceManager;
use crate::session::{OvernightState, OvernightTracker};
use crate::telemetry::TelemetryGateway;

use super::types::{CycleStats, DriverCommand, DriverState};

const OVERNIGHT_SECTION: &str = "overnight";

impl super::ChargeDriver {
    /// Create a new driver instance
    pub fn new(
        config: Config,
        gateway: Arc<dyn TelemetryGateway>,
        bus: EventBus,
        commands_rx: mpsc::UnboundedReceiver<DriverCommand>,
    ) -> Result<Self> {
        config.validate()?;
        let tz = config.tz()?;
        let logger = get_logger("driver");
        logger.info("Initializing charging control loop");

        let (state_tx, _) = watch::channel(DriverState::Initializing);
        let (status_tx, _) = watch::channel(None);

        Ok(Self {
            strategy: ChargingStrategy::new(&config),
            overnight: OvernightTracker::new(
                config.control.overnight_start_hour,
                config.control.overnight_end_hour,
            ),
            persistence: None,
            default_departure: Self::default_departure(&config),
            config,
            tz,
            gateway,
            bus,
            logger,
            state: state_tx,
            status_tx,
            commands_rx,
            last_mode: ChargeMode::Off,
            last_sent_w: None,
            last_write_at: None,
            safe_mode_override: None,
            stats: CycleStats::default(),
        })
    }

    /// Keep overnight bookkeeping in `persistence` and restore what it
    /// already holds. Loading is best-effort.
    pub fn with_persistence(mut self, mut persistence: PersistenceManager) -> Self {
        if let Err(e) = persistence.load() {
            self.logger.warn(&format!(
                "Could not load {}: {}, starting fresh",
                persistence.path().display(),
                e
            ));
        }
        if let Some(state) = persistence.get::<OvernightState>(OVERNIGHT_SECTION)
            && let Err(e) = self.overnight.restore_state(state)
        {
            self.logger
                .warn(&format!("Ignoring stored overnight state: {}", e));
        }
        self.persistence = Some(persistence);
        self
    }

    pub(crate) fn save_overnight(&mut self) {
        let Some(persistence) = self.persistence.as_mut() else {
            return;
        };
        let saved = persistence
            .set(OVERNIGHT_SECTION, self.overnight.get_state())
            .and_then(|()| persistence.save());
        if let Err(e) = saved {
            self.logger
                .warn(&format!("Failed to save overnight state: {}", e));
        }
    }

    /// Run the driver main loop until `shutdown` turns true. An in-flight
    /// cycle always completes first.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let interval_secs = self.config.control.interval_seconds.max(1);
        self.logger.info(&format!(
            "Starting control loop, interval {} s",
            interval_secs
        ));
        self.set_state(DriverState::Running);

        let mut bus_rx = self.bus.subscribe();
        let mut ticker = interval(Duration::from_secs(interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.execute_cycle(None).await;
                }
                Some(cmd) = self.commands_rx.recv() => {
                    if self.handle_command(cmd).await {
                        ticker.reset();
                    }
                }
                event = bus_rx.recv() => {
                    match event {
                        Ok(BusEvent::ForceRefresh { correlation_id }) => {
                            self.execute_cycle(correlation_id).await;
                            ticker.reset();
                        }
                        Ok(BusEvent::PlanUpdated { correlation_id, .. }) => {
                            self.execute_cycle(Some(correlation_id)).await;
                            ticker.reset();
                        }
                        Ok(BusEvent::Status(_)) => {}
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            self.logger.warn(&format!("Event bus lagged, {} events dropped", n));
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            bus_rx = self.bus.subscribe();
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        self.logger.info("Shutdown signal received");
                        break;
                    }
                }
            }
        }

        self.set_state(DriverState::ShuttingDown);
        self.save_overnight();
        Ok(())
    }

    /// One timed cycle with statistics. Errors are logged, never returned.
    pub(crate) async fn execute_cycle(&mut self, correlation_id: Option<String>) {
        let started = std::time::Instant::now();
        let result = self.run_cycle(correlation_id).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        self.stats.total_cycles = self.stats.total_cycles.saturating_add(1);
        self.stats.last_cycle_ms = Some(elapsed_ms);
        if elapsed_ms > self.config.control.interval_seconds.saturating_mul(1000) {
            self.stats.overrun_count = self.stats.overrun_count.saturating_add(1);
        }
        match result {
            Ok(_) => {
                if matches!(self.current_state(), DriverState::Error(_)) {
                    self.set_state(DriverState::Running);
                }
            }
            Err(e) => {
                self.stats.failed_cycles = self.stats.failed_cycles.saturating_add(1);
                self.logger.error(&format!("Control cycle failed: {}", e));
                self.set_state(DriverState::Error(e.to_string()));
            }
        }
    }
}
