//! Place name to coordinates, and coordinates to distance

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[cfg(feature = "geocoding")]
use crate::config::GeocoderConfig;
#[cfg(feature = "geocoding")]
use crate::error::LadewerkError;

const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Great-circle distance in km
pub fn haversine_km(a: Coordinates, b: Coordinates) -> f64 {
    let (lat1, lat2) = (a.latitude.to_radians(), b.latitude.to_radians());
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// Geocoding provider
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Best match for a free-text place name, `None` when nothing was found
    async fn geocode(&self, query: &str) -> Result<Option<Coordinates>>;
}

#[cfg(feature = "geocoding")]
#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
}

/// OpenStreetMap Nominatim search client
#[cfg(feature = "geocoding")]
pub struct NominatimGeocoder {
    client: reqwest::Client,
    base_url: String,
    user_agent: String,
}

#[cfg(feature = "geocoding")]
impl NominatimGeocoder {
    pub fn new(config: &GeocoderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_seconds.max(1)))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            user_agent: config.user_agent.clone(),
        })
    }
}

#[cfg(feature = "geocoding")]
#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn geocode(&self, query: &str) -> Result<Option<Coordinates>> {
        let resp = self
            .client
            .get(format!("{}/search", self.base_url))
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .query(&[("q", query), ("format", "json"), ("limit", "1")])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(LadewerkError::geocoding(format!(
                "search for '{}' returned {}",
                query,
                resp.status()
            )));
        }
        let places: Vec<NominatimPlace> = resp.json().await?;
        let Some(place) = places.first() else {
            return Ok(None);
        };
        match (place.lat.parse::<f64>(), place.lon.parse::<f64>()) {
            (Ok(latitude), Ok(longitude)) => Ok(Some(Coordinates::new(latitude, longitude))),
            _ => Err(LadewerkError::geocoding(format!(
                "unparseable coordinates for '{}'",
                query
            ))),
        }
    }
}
