//! Destination text normalisation and distance resolution

use super::geocoding::{Coordinates, Geocoder, haversine_km};
use super::learned::{LearnedDestination, LearnedDestinations, LearnedLookup};
use crate::config::{DriverConfig, TripsConfig};
use crate::logging::{StructuredLogger, get_logger};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Split "H: Aachen" into the configured driver and the rest of the summary.
/// The prefix comparison ignores case and surrounding whitespace.
pub fn parse_driver_prefix<'a>(
    summary: &'a str,
    drivers: &'a [DriverConfig],
) -> Option<(&'a DriverConfig, &'a str)> {
    let (prefix, rest) = summary.split_once(':')?;
    let prefix = prefix.trim();
    drivers
        .iter()
        .find(|d| d.prefix.eq_ignore_ascii_case(prefix))
        .map(|d| (d, rest.trim()))
}

/// Destination text after normalisation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanedDestination {
    Place(String),
    /// Only an activity word remained ("Sport"); assumed to be nearby
    LocalActivity(String),
    Empty,
}

fn word_in(word: &str, list: &[String]) -> bool {
    let word = word.to_lowercase();
    list.iter().any(|w| w.to_lowercase() == word)
}

/// Drop filler words, prepositions and activity words
pub fn clean_destination(raw: &str, filler: &[String], activity: &[String]) -> CleanedDestination {
    let mut activity_seen: Option<String> = None;
    let mut kept = Vec::new();
    for token in raw.split_whitespace() {
        let word = token.trim_matches(|c: char| !c.is_alphanumeric());
        if word.is_empty() || word_in(word, filler) {
            continue;
        }
        if word_in(word, activity) {
            activity_seen.get_or_insert_with(|| word.to_string());
            continue;
        }
        kept.push(word);
    }
    if !kept.is_empty() {
        CleanedDestination::Place(kept.join(" "))
    } else if let Some(activity) = activity_seen {
        CleanedDestination::LocalActivity(activity)
    } else {
        CleanedDestination::Empty
    }
}

/// Where a distance came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceSource {
    Known,
    Learned,
    Geocoded,
    LocalActivity,
    Confirmed,
    Default,
}

/// Why a trip needs a human answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClarificationReason {
    Ambiguous,
    Unknown,
    Suspicious,
    /// Between the clarification band and the train threshold
    TransportUnclear,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub one_way_km: f64,
    pub source: DistanceSource,
    pub clarification: Option<ClarificationReason>,
    pub options: Vec<LearnedDestination>,
}

impl Resolution {
    fn settled(one_way_km: f64, source: DistanceSource) -> Self {
        Self {
            one_way_km,
            source,
            clarification: None,
            options: Vec::new(),
        }
    }

    fn unsure(one_way_km: f64, source: DistanceSource, reason: ClarificationReason) -> Self {
        Self {
            one_way_km,
            source,
            clarification: Some(reason),
            options: Vec::new(),
        }
    }

    pub const fn needs_clarification(&self) -> bool {
        self.clarification.is_some()
    }
}

/// Resolves destination names to one-way distances: known table, learned
/// cache, geocoder, then a conservative default.
pub struct DistanceResolver {
    known: BTreeMap<String, f64>,
    learned: LearnedDestinations,
    geocoder: Option<Arc<dyn Geocoder>>,
    /// Geocoder answers by lowercase name, misses included
    geocoded: BTreeMap<String, Option<Coordinates>>,
    home: Coordinates,
    road_factor: f64,
    default_km: f64,
    local_activity_km: f64,
    suspicious_km: f64,
    logger: StructuredLogger,
}

impl DistanceResolver {
    pub fn new(
        config: &TripsConfig,
        learned: LearnedDestinations,
        geocoder: Option<Arc<dyn Geocoder>>,
    ) -> Self {
        let known = config
            .known_destinations
            .iter()
            .map(|(k, v)| (k.trim().to_lowercase(), *v))
            .collect();
        Self {
            known,
            learned,
            geocoder,
            geocoded: BTreeMap::new(),
            home: Coordinates::new(config.home_latitude, config.home_longitude),
            road_factor: config.road_factor,
            default_km: config.default_distance_km,
            local_activity_km: config.local_activity_km,
            suspicious_km: config.suspicious_distance_km,
            logger: get_logger("trips"),
        }
    }

    pub const fn learned(&self) -> &LearnedDestinations {
        &self.learned
    }

    pub fn learned_mut(&mut self) -> &mut LearnedDestinations {
        &mut self.learned
    }

    pub const fn local_activity_km(&self) -> f64 {
        self.local_activity_km
    }

    pub const fn default_km(&self) -> f64 {
        self.default_km
    }

    /// Known table: exact name first, then the longest key contained in the
    /// query (or containing it)
    pub fn known_distance(&self, name: &str) -> Option<f64> {
        let q = name.trim().to_lowercase();
        if let Some(km) = self.known.get(&q) {
            return Some(*km);
        }
        if q.chars().count() < 3 {
            return None;
        }
        self.known
            .iter()
            .filter(|(k, _)| k.chars().count() >= 3 && (q.contains(k.as_str()) || k.contains(&q)))
            .max_by_key(|(k, _)| k.chars().count())
            .map(|(_, km)| *km)
    }

    pub async fn resolve(&mut self, name: &str) -> Resolution {
        if let Some(km) = self.known_distance(name) {
            return Resolution::settled(km, DistanceSource::Known);
        }

        match self.learned.lookup(name) {
            LearnedLookup::Found(dest) => {
                return Resolution::settled(dest.distance_km, DistanceSource::Learned);
            }
            LearnedLookup::Ambiguous(options) => {
                let mut resolution = Resolution::unsure(
                    self.default_km,
                    DistanceSource::Default,
                    ClarificationReason::Ambiguous,
                );
                resolution.options = options;
                return resolution;
            }
            LearnedLookup::NotFound => {}
        }

        if let Some(coords) = self.geocode(name).await {
            let km = haversine_km(self.home, coords) * self.road_factor;
            if km > self.suspicious_km {
                self.logger.warn(&format!(
                    "Geocoded '{}' to {:.0} km one way, asking for confirmation",
                    name, km
                ));
                return Resolution::unsure(
                    km,
                    DistanceSource::Geocoded,
                    ClarificationReason::Suspicious,
                );
            }
            return Resolution::settled(km, DistanceSource::Geocoded);
        }

        Resolution::unsure(
            self.default_km,
            DistanceSource::Default,
            ClarificationReason::Unknown,
        )
    }

    /// Ask the geocoder once per name. Failures are retried on the next run.
    async fn geocode(&mut self, name: &str) -> Option<Coordinates> {
        let key = name.trim().to_lowercase();
        if let Some(cached) = self.geocoded.get(&key) {
            return *cached;
        }
        let geocoder = self.geocoder.clone()?;
        match geocoder.geocode(name).await {
            Ok(found) => {
                if found.is_none() {
                    self.logger
                        .debug(&format!("Geocoder found nothing for '{}'", name));
                }
                self.geocoded.insert(key, found);
                found
            }
            Err(e) => {
                self.logger
                    .warn(&format!("Geocoding '{}' failed: {}", name, e));
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(list: &[&str]) -> Vec<String> {
        list.iter().map(|w| (*w).to_string()).collect()
    }

    #[test]
    fn prefix_parsing_matches_configured_drivers() {
        let config = TripsConfig::default();
        let (driver, rest) = parse_driver_prefix("h:  Aachen", &config.drivers).unwrap();
        assert_eq!(driver.prefix, "H");
        assert_eq!(rest, "Aachen");
        assert!(parse_driver_prefix("X: Bonn", &config.drivers).is_none());
        assert!(parse_driver_prefix("Dentist", &config.drivers).is_none());
    }

    #[test]
    fn cleaning_strips_fillers_and_detects_activities() {
        let filler = words(&["nach", "zum", "in"]);
        let activity = words(&["sport", "arzt"]);
        assert_eq!(
            clean_destination("nach Köln", &filler, &activity),
            CleanedDestination::Place("Köln".to_string())
        );
        assert_eq!(
            clean_destination("Sport in Aachen", &filler, &activity),
            CleanedDestination::Place("Aachen".to_string())
        );
        assert_eq!(
            clean_destination("zum Arzt!", &filler, &activity),
            CleanedDestination::LocalActivity("Arzt".to_string())
        );
        assert_eq!(clean_destination(" in ", &filler, &activity), CleanedDestination::Empty);
    }

    #[tokio::test]
    async fn known_table_wins_and_unknown_falls_back() {
        let mut resolver =
            DistanceResolver::new(&TripsConfig::default(), LearnedDestinations::default(), None);
        let aachen = resolver.resolve("Aachen").await;
        assert_eq!(aachen.one_way_km, 80.0);
        assert_eq!(aachen.source, DistanceSource::Known);
        assert!(!aachen.needs_clarification());

        let partial = resolver.resolve("Aachen Zentrum").await;
        assert_eq!(partial.one_way_km, 80.0);

        let unknown = resolver.resolve("Kleinkleckersdorf").await;
        assert_eq!(unknown.one_way_km, 50.0);
        assert_eq!(unknown.clarification, Some(ClarificationReason::Unknown));
    }
}
