use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use super::learned::LearnedDestination;

/// One calendar entry as delivered by a calendar source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub summary: String,
    pub start: NaiveDateTime,
    /// Exclusive end. For all-day events the day after the last day.
    pub end: NaiveDateTime,
    #[serde(default)]
    pub all_day: bool,
    #[serde(default)]
    pub location: Option<String>,
}

impl CalendarEvent {
    /// All-day events spanning the date, or timed events starting on it
    pub fn occurs_on(&self, date: NaiveDate) -> bool {
        if self.all_day {
            let first = self.start.date();
            let last = self.last_day();
            first <= date && date <= last
        } else {
            self.start.date() == date
        }
    }

    /// Last calendar day covered by the event
    pub fn last_day(&self) -> NaiveDate {
        if self.all_day {
            let end = self.end.date();
            end.pred_opt()
                .filter(|d| *d >= self.start.date())
                .unwrap_or(self.start.date())
        } else {
            self.end.date().max(self.start.date())
        }
    }

    /// Spans more than one calendar day
    pub fn is_multi_day(&self) -> bool {
        self.last_day() > self.start.date()
    }
}

/// Where a trip came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripSource {
    Calendar,
    DefaultCommute,
}

/// How the driver travels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    Ev,
    /// Long distance by train; no EV energy needed
    Train,
}

/// One predicted drive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    pub date: NaiveDate,
    /// Calendar event id, or a synthesized id for default commutes
    pub event_id: String,
    pub driver: String,
    pub destination: String,
    pub one_way_km: f64,
    pub round_trip_km: f64,
    pub energy_kwh: f64,
    pub departure: Option<NaiveTime>,
    pub return_time: Option<NaiveTime>,
    pub is_commute: bool,
    pub needs_clarification: bool,
    pub source: TripSource,
    pub transport: Transport,
}

impl Trip {
    /// Set a new one-way distance and recompute round trip and energy
    pub fn set_distance(&mut self, one_way_km: f64, consumption_kwh_per_100km: f64) {
        self.one_way_km = one_way_km.max(0.0);
        self.round_trip_km = self.one_way_km * 2.0;
        self.energy_kwh = match self.transport {
            Transport::Ev => trip_energy_kwh(self.round_trip_km, consumption_kwh_per_100km),
            Transport::Train => 0.0,
        };
    }
}

/// Energy for a driven distance
pub fn trip_energy_kwh(round_trip_km: f64, consumption_kwh_per_100km: f64) -> f64 {
    (round_trip_km * consumption_kwh_per_100km / 100.0).max(0.0)
}

/// All trips of one calendar day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayPlan {
    pub date: NaiveDate,
    pub trips: Vec<Trip>,
}

impl DayPlan {
    pub const fn new(date: NaiveDate) -> Self {
        Self {
            date,
            trips: Vec::new(),
        }
    }

    fn ev_trips(&self) -> impl Iterator<Item = &Trip> {
        self.trips.iter().filter(|t| t.transport == Transport::Ev)
    }

    /// EV energy of the day; train trips do not count
    pub fn total_energy_kwh(&self) -> f64 {
        self.ev_trips().map(|t| t.energy_kwh).sum()
    }

    pub fn has_trips(&self) -> bool {
        self.ev_trips().next().is_some()
    }

    pub fn earliest_departure(&self) -> Option<NaiveTime> {
        self.ev_trips().filter_map(|t| t.departure).min()
    }

    pub fn latest_return(&self) -> Option<NaiveTime> {
        self.ev_trips().filter_map(|t| t.return_time).max()
    }

    /// The same day without trips that were already back home at `now`.
    /// Their energy is reflected in the current SoC.
    pub fn ahead_of(&self, now: NaiveDateTime) -> Self {
        Self {
            date: self.date,
            trips: self
                .trips
                .iter()
                .filter(|t| {
                    !t.return_time
                        .is_some_and(|back| self.date.and_time(back) <= now)
                })
                .cloned()
                .collect(),
        }
    }
}

/// A trip whose distance someone has to confirm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingClarification {
    pub event_id: String,
    pub date: NaiveDate,
    pub driver: String,
    pub destination: String,
    pub estimated_km: f64,
    pub question: String,
    /// Candidates when the learned cache knows several places of this name
    pub options: Vec<LearnedDestination>,
}
