//! Location Provider
//!
//! Produces a simulated current location: a fixed base point with small
//! random jitter, refined by a best-effort reverse geocode.

use crate::config::Config;
use crate::error::{SosError, SosResult};
use anyhow::Result;
use async_trait::async_trait;
use rand::Rng;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Address used whenever reverse geocoding is unavailable
pub const FALLBACK_ADDRESS: &str = "National Highways Authority of India, Dabri, Sector 10 Dwarka, Dwarka, New Delhi, Delhi 110075, India";

const USER_AGENT: &str = "SOSEmergencyApp/1.0";

/// A fully populated location. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub address: String,
    pub map_link: String,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64, address: impl Into<String>) -> Self {
        let latitude = round6(latitude);
        let longitude = round6(longitude);
        Self {
            latitude,
            longitude,
            address: address.into(),
            map_link: format!("https://maps.google.com/?q={},{}", latitude, longitude),
        }
    }
}

fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

/// Trait for reverse geocoding backends
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Resolve coordinates to a human readable address
    async fn reverse_geocode(&self, latitude: f64, longitude: f64) -> SosResult<String>;
}

#[derive(Debug, Deserialize)]
struct NominatimReverse {
    display_name: Option<String>,
}

/// OpenStreetMap Nominatim reverse geocoder
pub struct NominatimGeocoder {
    client: Client,
    url: String,
}

impl NominatimGeocoder {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn reverse_geocode(&self, latitude: f64, longitude: f64) -> SosResult<String> {
        let url = format!(
            "{}/reverse?format=jsonv2&lat={}&lon={}",
            self.url,
            urlencoding::encode(&latitude.to_string()),
            urlencoding::encode(&longitude.to_string())
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SosError::Geocode(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SosError::Geocode(format!("geocoder returned {}", status)));
        }

        let body: NominatimReverse = response
            .json()
            .await
            .map_err(|e| SosError::Geocode(e.to_string()))?;

        body.display_name
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| SosError::Geocode("response had no display_name".to_string()))
    }
}

/// Computes simulated locations
#[derive(Clone)]
pub struct LocationProvider {
    base_latitude: f64,
    base_longitude: f64,
    jitter: f64,
    delay: Duration,
    lookup_timeout: Duration,
    geocoder: Option<Arc<dyn Geocoder>>,
}

impl LocationProvider {
    pub fn new(config: &Config, geocoder: Option<Arc<dyn Geocoder>>) -> Self {
        Self {
            base_latitude: config.base_latitude,
            base_longitude: config.base_longitude,
            jitter: config.jitter_degrees.abs(),
            delay: Duration::from_millis(config.location_delay_ms),
            lookup_timeout: config.geocoder_timeout(),
            geocoder,
        }
    }

    /// Build the provider with the Nominatim geocoder when enabled
    pub fn from_config(config: &Config) -> Result<Self> {
        let geocoder: Option<Arc<dyn Geocoder>> = if config.geocoder_enabled {
            Some(Arc::new(NominatimGeocoder::new(
                &config.geocoder_url,
                config.geocoder_timeout(),
            )?))
        } else {
            None
        };
        Ok(Self::new(config, geocoder))
    }

    pub fn base(&self) -> (f64, f64) {
        (self.base_latitude, self.base_longitude)
    }

    pub fn jitter(&self) -> f64 {
        self.jitter
    }

    /// Current location with fresh jitter. Always fully populated.
    pub async fn current_location(&self) -> Location {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let (latitude, longitude) = self.jittered();
        let address = self.lookup_address(latitude, longitude).await;
        Location::new(latitude, longitude, address)
    }

    fn jittered(&self) -> (f64, f64) {
        if self.jitter == 0.0 {
            return (self.base_latitude, self.base_longitude);
        }
        let mut rng = rand::thread_rng();
        (
            self.base_latitude + rng.gen_range(-self.jitter..=self.jitter),
            self.base_longitude + rng.gen_range(-self.jitter..=self.jitter),
        )
    }

    async fn lookup_address(&self, latitude: f64, longitude: f64) -> String {
        let Some(geocoder) = &self.geocoder else {
            return FALLBACK_ADDRESS.to_string();
        };

        match tokio::time::timeout(
            self.lookup_timeout,
            geocoder.reverse_geocode(latitude, longitude),
        )
        .await
        {
            Ok(Ok(address)) => address,
            Ok(Err(e)) => {
                debug!("Reverse geocoding failed, using fallback address: {}", e);
                FALLBACK_ADDRESS.to_string()
            }
            Err(_) => {
                debug!(
                    "Reverse geocoding timed out after {:?}, using fallback address",
                    self.lookup_timeout
                );
                FALLBACK_ADDRESS.to_string()
            }
        }
    }
}
