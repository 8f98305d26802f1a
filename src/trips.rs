//! Trip prediction: calendar events and default commutes to per-day energy

pub mod calendar;
pub mod consumption;
pub mod destination;
pub mod geocoding;
pub mod learned;
pub mod types;

pub use calendar::{CalendarSource, StaticCalendar, YamlCalendar};
pub use consumption::{ConsumptionState, ConsumptionTracker};
pub use destination::{
    CleanedDestination, ClarificationReason, DistanceResolver, DistanceSource, Resolution,
    clean_destination, parse_driver_prefix,
};
pub use geocoding::{Coordinates, Geocoder, haversine_km};
pub use learned::{LearnedDestination, LearnedDestinations, LearnedLookup};
pub use types::{
    CalendarEvent, DayPlan, PendingClarification, Transport, Trip, TripSource, trip_energy_kwh,
};

use crate::config::{DriverConfig, TripsConfig, parse_hhmm};
use crate::error::{LadewerkError, Result};
use crate::logging::{StructuredLogger, get_logger};
use chrono::{Datelike, Duration, NaiveDate};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Builds day plans for the planning horizon
pub struct TripPredictor {
    config: TripsConfig,
    resolver: DistanceResolver,
    consumption_kwh_per_100km: f64,
    plans: Vec<DayPlan>,
    pending: Vec<PendingClarification>,
    /// Distances confirmed for individual events
    confirmed: HashMap<String, f64>,
    logger: StructuredLogger,
}

impl TripPredictor {
    pub fn new(
        config: &TripsConfig,
        consumption_kwh_per_100km: f64,
        learned: LearnedDestinations,
        geocoder: Option<Arc<dyn Geocoder>>,
    ) -> Self {
        Self {
            config: config.clone(),
            resolver: DistanceResolver::new(config, learned, geocoder),
            consumption_kwh_per_100km,
            plans: Vec::new(),
            pending: Vec::new(),
            confirmed: HashMap::new(),
            logger: get_logger("trips"),
        }
    }

    pub fn set_consumption(&mut self, kwh_per_100km: f64) {
        if kwh_per_100km.is_finite() && kwh_per_100km > 0.0 {
            self.consumption_kwh_per_100km = kwh_per_100km;
        }
    }

    pub const fn consumption(&self) -> f64 {
        self.consumption_kwh_per_100km
    }

    pub fn plans(&self) -> &[DayPlan] {
        &self.plans
    }

    pub fn pending_clarifications(&self) -> &[PendingClarification] {
        &self.pending
    }

    pub const fn learned(&self) -> &LearnedDestinations {
        self.resolver.learned()
    }

    /// Rebuild the plans for `horizon_days` days starting at `start`
    pub async fn predict(
        &mut self,
        events: &[CalendarEvent],
        start: NaiveDate,
        horizon_days: u32,
    ) -> &[DayPlan] {
        let drivers = self.config.drivers.clone();
        let mut plans = Vec::with_capacity(horizon_days as usize);
        let mut pending = Vec::new();

        for offset in 0..horizon_days {
            let date = start + Duration::days(i64::from(offset));
            let mut plan = DayPlan::new(date);
            let mut travelling: HashSet<&str> = HashSet::new();
            let mut away: HashSet<&str> = HashSet::new();

            for event in events.iter().filter(|e| e.occurs_on(date)) {
                let Some((driver, rest)) = parse_driver_prefix(&event.summary, &drivers) else {
                    self.logger
                        .trace(&format!("Ignoring event without driver: {}", event.summary));
                    continue;
                };
                if event.is_multi_day() {
                    away.insert(driver.prefix.as_str());
                    if event.start.date() != date {
                        continue;
                    }
                }
                travelling.insert(driver.prefix.as_str());
                let (trip, question) = self.trip_from_event(event, driver, rest, date).await;
                if let Some(q) = question {
                    pending.push(q);
                }
                plan.trips.push(trip);
            }

            for driver in &drivers {
                let prefix = driver.prefix.as_str();
                if travelling.contains(prefix) || away.contains(prefix) {
                    continue;
                }
                if let Some(trip) = self.commute_trip(driver, date) {
                    plan.trips.push(trip);
                }
            }

            self.logger.debug(&format!(
                "{}: {} trips, {:.1} kWh",
                date,
                plan.trips.len(),
                plan.total_energy_kwh()
            ));
            plans.push(plan);
        }

        self.plans = plans;
        self.pending = pending;
        &self.plans
    }

    async fn trip_from_event(
        &mut self,
        event: &CalendarEvent,
        driver: &DriverConfig,
        rest: &str,
        date: NaiveDate,
    ) -> (Trip, Option<PendingClarification>) {
        let raw = if rest.is_empty() {
            event.location.as_deref().unwrap_or_default()
        } else {
            rest
        };
        let cleaned = clean_destination(
            raw,
            &self.config.filler_words,
            &self.config.activity_words,
        );

        let (destination, mut resolution) = match (&cleaned, self.confirmed.get(&event.id)) {
            (CleanedDestination::Place(name), Some(km)) => (
                name.clone(),
                Resolution {
                    one_way_km: *km,
                    source: DistanceSource::Confirmed,
                    clarification: None,
                    options: Vec::new(),
                },
            ),
            (CleanedDestination::Place(name), None) => {
                (name.clone(), self.resolver.resolve(name).await)
            }
            (CleanedDestination::LocalActivity(activity), _) => (
                activity.clone(),
                Resolution {
                    one_way_km: self.resolver.local_activity_km(),
                    source: DistanceSource::LocalActivity,
                    clarification: None,
                    options: Vec::new(),
                },
            ),
            (CleanedDestination::Empty, confirmed) => (
                raw.trim().to_string(),
                Resolution {
                    one_way_km: confirmed.copied().unwrap_or(self.resolver.default_km()),
                    source: if confirmed.is_some() {
                        DistanceSource::Confirmed
                    } else {
                        DistanceSource::Default
                    },
                    clarification: confirmed.is_none().then_some(ClarificationReason::Unknown),
                    options: Vec::new(),
                },
            ),
        };

        let mut transport = Transport::Ev;
        if driver
            .train_threshold_km
            .is_some_and(|limit| resolution.one_way_km > limit)
        {
            transport = Transport::Train;
            // Train trips cost no EV energy; only ambiguity still matters
            if resolution.clarification != Some(ClarificationReason::Ambiguous) {
                resolution.clarification = None;
            }
        } else if resolution.source != DistanceSource::Confirmed
            && resolution.clarification.is_none()
            && driver
                .clarification_band_km
                .is_some_and(|band| resolution.one_way_km >= band)
        {
            resolution.clarification = Some(ClarificationReason::TransportUnclear);
        }

        let (departure, return_time) = if event.all_day {
            (None, None)
        } else {
            // Not back the same day when the event runs past midnight
            let same_day = event.end.date() == event.start.date();
            (Some(event.start.time()), same_day.then(|| event.end.time()))
        };
        let mut trip = Trip {
            date,
            event_id: event.id.clone(),
            driver: driver.name.clone(),
            destination: if destination.is_empty() {
                "unknown".to_string()
            } else {
                destination
            },
            one_way_km: 0.0,
            round_trip_km: 0.0,
            energy_kwh: 0.0,
            departure,
            return_time,
            is_commute: false,
            needs_clarification: resolution.needs_clarification(),
            source: TripSource::Calendar,
            transport,
        };
        trip.set_distance(resolution.one_way_km, self.consumption_kwh_per_100km);

        let question = resolution
            .clarification
            .map(|reason| self.clarification_for(&trip, reason, resolution.options));
        (trip, question)
    }

    fn clarification_for(
        &self,
        trip: &Trip,
        reason: ClarificationReason,
        options: Vec<LearnedDestination>,
    ) -> PendingClarification {
        let question = match reason {
            ClarificationReason::Ambiguous => {
                let listed = options
                    .iter()
                    .map(|o| match &o.label {
                        Some(label) => format!("{} {} ({:.0} km)", o.name, label, o.distance_km),
                        None => format!("{} ({:.0} km)", o.name, o.distance_km),
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                format!(
                    "Which {} does {} mean on {}? Options: {}",
                    trip.destination, trip.driver, trip.date, listed
                )
            }
            ClarificationReason::Unknown => format!(
                "How far is {} (one way) for {} on {}? Assuming {:.0} km for now.",
                trip.destination, trip.driver, trip.date, trip.one_way_km
            ),
            ClarificationReason::Suspicious => format!(
                "{} looks far away ({:.0} km one way). Is that right for {} on {}?",
                trip.destination, trip.one_way_km, trip.driver, trip.date
            ),
            ClarificationReason::TransportUnclear => format!(
                "Does {} drive to {} ({:.0} km one way) on {} or take the train?",
                trip.driver, trip.destination, trip.one_way_km, trip.date
            ),
        };
        PendingClarification {
            event_id: trip.event_id.clone(),
            date: trip.date,
            driver: trip.driver.clone(),
            destination: trip.destination.clone(),
            estimated_km: trip.one_way_km,
            question,
            options,
        }
    }

    fn commute_trip(&self, driver: &DriverConfig, date: NaiveDate) -> Option<Trip> {
        let commute = driver.commute.as_ref()?;
        let weekday = date.weekday().num_days_from_monday() as u8;
        if !commute.weekdays.contains(&weekday) {
            return None;
        }
        let mut trip = Trip {
            date,
            event_id: format!("commute-{}-{}", driver.prefix, date),
            driver: driver.name.clone(),
            destination: commute.destination.clone(),
            one_way_km: 0.0,
            round_trip_km: 0.0,
            energy_kwh: 0.0,
            departure: parse_hhmm(&commute.departure).ok(),
            return_time: parse_hhmm(&commute.return_time).ok(),
            is_commute: true,
            needs_clarification: false,
            source: TripSource::DefaultCommute,
            transport: Transport::Ev,
        };
        trip.set_distance(commute.distance_km, self.consumption_kwh_per_100km);
        Some(trip)
    }

    /// Apply a confirmed one-way distance to every stored trip of the event.
    /// The destination is learned for future predictions. Returns the number
    /// of trips updated.
    pub fn resolve_clarification(&mut self, event_id: &str, one_way_km: f64) -> Result<usize> {
        if !one_way_km.is_finite() || one_way_km < 0.0 {
            return Err(LadewerkError::validation(
                "one_way_km",
                "must be a non-negative number",
            ));
        }
        let Some(index) = self.pending.iter().position(|p| p.event_id == event_id) else {
            return Err(LadewerkError::validation(
                "event_id".to_string(),
                format!("no pending clarification for '{}'", event_id),
            ));
        };
        let clarification = self.pending.remove(index);

        let consumption = self.consumption_kwh_per_100km;
        let mut updated = 0;
        for trip in self
            .plans
            .iter_mut()
            .flat_map(|p| p.trips.iter_mut())
            .filter(|t| t.event_id == event_id)
        {
            let threshold = self
                .config
                .drivers
                .iter()
                .find(|d| d.name == trip.driver)
                .and_then(|d| d.train_threshold_km);
            trip.transport = match threshold {
                Some(limit) if one_way_km > limit => Transport::Train,
                _ => Transport::Ev,
            };
            trip.set_distance(one_way_km, consumption);
            trip.needs_clarification = false;
            updated += 1;
        }

        self.confirmed.insert(event_id.to_string(), one_way_km);
        let matches_option = clarification
            .options
            .iter()
            .any(|o| (o.distance_km - one_way_km).abs() < 1.0);
        if !matches_option {
            self.resolver
                .learned_mut()
                .learn(&clarification.destination, None, one_way_km);
        }
        self.logger.info(&format!(
            "Resolved {} ({}) to {:.0} km, {} trip(s) updated",
            clarification.destination, event_id, one_way_km, updated
        ));
        Ok(updated)
    }
}
