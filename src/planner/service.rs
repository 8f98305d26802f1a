//! Slow-cadence planning task
//!
//! Reads the vehicle and forecast inputs, loads the calendar, runs the trip
//! predictor and the planner, writes the applied recommendation to the
//! control variables and announces the new plan on the bus.

use super::{ChargingPlan, ChargingPlanner, PlannerInputs, apply_recommendation};
use crate::config::Config;
use crate::error::{LadewerkError, Result};
use crate::events::{BusEvent, EventBus};
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use crate::persistence::PersistenceManager;
use crate::controls::VehicleState;
use crate::telemetry::{TelemetryGateway, read_f64_or, read_opt_f64, read_text};
use crate::trips::{
    CalendarSource, ConsumptionTracker, Geocoder, PendingClarification, TripPredictor,
};
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{Duration, MissedTickBehavior, interval};

pub struct PlanningService {
    config: Config,
    tz: chrono_tz::Tz,
    gateway: Arc<dyn TelemetryGateway>,
    calendar: Arc<dyn CalendarSource>,
    predictor: TripPredictor,
    planner: ChargingPlanner,
    consumption: ConsumptionTracker,
    persistence: PersistenceManager,
    bus: EventBus,
    latest: watch::Sender<Option<Arc<ChargingPlan>>>,
    logger: StructuredLogger,
}

impl PlanningService {
    /// Build the service, restoring learned state from `persistence`
    pub fn new(
        config: Config,
        gateway: Arc<dyn TelemetryGateway>,
        calendar: Arc<dyn CalendarSource>,
        geocoder: Option<Arc<dyn Geocoder>>,
        bus: EventBus,
        mut persistence: PersistenceManager,
    ) -> Result<Self> {
        let tz = config.tz()?;
        let logger = get_logger_with_context(
            LogContext::new("planner")
                .with_field("horizon_days", config.planner.horizon_days.to_string()),
        );
        if let Err(e) = persistence.load() {
            logger.warn(&format!(
                "Could not load {}: {}, starting fresh",
                persistence.path().display(),
                e
            ));
        }

        let consumption = ConsumptionTracker::new(
            config.consumption.clone(),
            config.vehicle.consumption_kwh_per_100km,
            config.vehicle.capacity_kwh,
        )
        .with_state(persistence.consumption());
        let predictor = TripPredictor::new(
            &config.trips,
            consumption.rate(),
            persistence.learned_destinations(),
            geocoder,
        );
        let planner = ChargingPlanner::new(&config.planner);
        let (latest, _) = watch::channel(None);

        Ok(Self {
            config,
            tz,
            gateway,
            calendar,
            predictor,
            planner,
            consumption,
            persistence,
            bus,
            latest,
            logger,
        })
    }

    /// Receiver for the most recent plan
    pub fn plans(&self) -> watch::Receiver<Option<Arc<ChargingPlan>>> {
        self.latest.subscribe()
    }

    pub fn pending_clarifications(&self) -> &[PendingClarification] {
        self.predictor.pending_clarifications()
    }

    pub const fn predictor(&self) -> &TripPredictor {
        &self.predictor
    }

    /// Answer a clarification, remember the destination and re-plan
    pub async fn resolve_clarification(
        &mut self,
        event_id: &str,
        one_way_km: f64,
    ) -> Result<ChargingPlan> {
        self.predictor.resolve_clarification(event_id, one_way_km)?;
        self.persist();
        self.plan_once(None).await
    }

    /// Feed odometer and SoC into the consumption tracker
    async fn observe_vehicle(&mut self) {
        let entities = &self.config.entities;
        let capacity = read_f64_or(
            self.gateway.as_ref(),
            &entities.ev_capacity,
            self.config.vehicle.capacity_kwh,
        )
        .await;
        self.consumption.set_capacity(capacity);

        let mileage = read_opt_f64(self.gateway.as_ref(), &entities.ev_mileage).await;
        let soc = read_opt_f64(self.gateway.as_ref(), &entities.ev_soc).await;
        if let (Some(mileage), Some(soc)) = (mileage, soc) {
            if self.consumption.observe(mileage, soc).is_some() {
                self.predictor.set_consumption(self.consumption.rate());
            }
            self.persistence.set_consumption(self.consumption.state().clone());
        }
    }

    fn persist(&mut self) {
        self.persistence
            .set_learned_destinations(self.predictor.learned().clone());
        self.persistence
            .set_consumption(self.consumption.state().clone());
        if let Err(e) = self.persistence.save() {
            self.logger
                .warn(&format!("Failed to save planner state: {}", e));
        }
    }

    /// One planning run. Fails without writing anything when the vehicle SoC
    /// is unknown.
    pub async fn plan_once(&mut self, correlation_id: Option<String>) -> Result<ChargingPlan> {
        let correlation_id = correlation_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let logger = self.logger.with_correlation_id(Some(&correlation_id));
        let now = Utc::now().with_timezone(&self.tz).naive_local();
        let today = now.date();
        let horizon = self.config.planner.horizon_days.max(1);

        self.observe_vehicle().await;

        let gateway = self.gateway.as_ref();
        let entities = &self.config.entities;
        let capacity =
            read_f64_or(gateway, &entities.ev_capacity, self.config.vehicle.capacity_kwh).await;
        let Some(soc) = read_opt_f64(gateway, &entities.ev_soc).await else {
            return Err(LadewerkError::planning("EV state of charge unavailable"));
        };
        let inputs = PlannerInputs {
            now,
            current_energy_kwh: (soc.clamp(0.0, 100.0) / 100.0) * capacity,
            capacity_kwh: capacity,
            pv_today_remaining_kwh: read_f64_or(gateway, &entities.pv_forecast_today_remaining, 0.0)
                .await,
            pv_tomorrow_kwh: read_f64_or(gateway, &entities.pv_forecast_tomorrow, 0.0).await,
        };

        let last_day = today + ChronoDuration::days(i64::from(horizon) - 1);
        let events = match self.calendar.events(today, last_day).await {
            Ok(events) => events,
            Err(e) => {
                logger.warn(&format!("Calendar unavailable, planning commutes only: {}", e));
                Vec::new()
            }
        };

        let days = self.predictor.predict(&events, today, horizon).await.to_vec();
        let pending = self.predictor.pending_clarifications().len();
        if pending > 0 {
            logger.info(&format!("{} trip(s) need clarification", pending));
        }
        let plan = self.planner.plan(&inputs, &days);

        if let Some(rec) = plan.applied() {
            let vehicle =
                VehicleState::parse(read_text(gateway, &entities.wallbox_state).await.as_deref());
            let session_energy_kwh = if vehicle.is_connected() {
                read_f64_or(gateway, &entities.wallbox_session_energy, 0.0).await
            } else {
                0.0
            };
            let report = apply_recommendation(gateway, entities, rec, session_energy_kwh).await;
            if !report.failed.is_empty() {
                logger.warn(&format!(
                    "Plan partially applied, failed: {}",
                    report.failed.join(", ")
                ));
            }
        }

        let summary = plan.summary();
        logger.info(&format!("Plan updated: {}", summary));
        self.bus.publish(BusEvent::PlanUpdated {
            correlation_id,
            summary,
        });
        self.latest.send_replace(Some(Arc::new(plan.clone())));
        self.persist();
        Ok(plan)
    }

    /// Plan at the configured interval until shutdown is signalled
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let minutes = self.config.planner.interval_minutes.max(1);
        self.logger
            .info(&format!("Starting planning service, every {} min", minutes));
        let mut ticker = interval(Duration::from_secs(minutes * 60));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.plan_once(None).await {
                        self.logger.error(&format!("Planning run failed: {}", e));
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
        Ok(())
    }
}
