//! HTTP clients for the two network services the badge talks to: the
//! IP-geolocation fallback and the reverse geocoder used for the country name.

use crate::error::LocateError;
use crate::models::Coordinate;
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Position reported by an IP-geolocation service.
#[derive(Debug, Clone, PartialEq)]
pub struct IpFix {
    pub coordinate: Coordinate,
    pub country: Option<String>,
}

/// Coarse network-based location.
#[async_trait]
pub trait IpLookup: Send + Sync {
    async fn locate(&self) -> Result<IpFix, LocateError>;
}

/// Reverse lookup of a country name.
#[async_trait]
pub trait CountryLookup: Send + Sync {
    async fn country_at(&self, coordinate: Coordinate) -> Result<String, LocateError>;
}

pub struct IpLocator {
    client: Client,
    url: String,
}

// Services disagree on names: ipapi.co uses latitude/longitude/country_name,
// ip-api.com uses lat/lon/country.
#[derive(Deserialize)]
struct IpResponse {
    latitude: Option<Value>,
    lat: Option<Value>,
    longitude: Option<Value>,
    lon: Option<Value>,
    country_name: Option<Value>,
    country: Option<Value>,
}

impl IpLocator {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, LocateError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl IpLookup for IpLocator {
    async fn locate(&self) -> Result<IpFix, LocateError> {
        let res = self
            .client
            .get(&self.url)
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            return Err(LocateError::NetworkError(format!(
                "{} returned {}",
                self.url, status
            )));
        }

        let body = res.text().await?;
        let fix = parse_ip_response(&body)?;
        info!("IP geolocation resolved {}", fix.coordinate);
        Ok(fix)
    }
}

/// Extracts a fix from an IP-geolocation payload. Coordinates must be JSON numbers.
pub fn parse_ip_response(body: &str) -> Result<IpFix, LocateError> {
    let data: IpResponse = serde_json::from_str(body)
        .map_err(|e| LocateError::MalformedResponse(e.to_string()))?;

    let number = |primary: Option<Value>, alt: Option<Value>| {
        primary
            .filter(|v| !v.is_null())
            .or(alt)
            .and_then(|v| v.as_f64())
    };

    let lat = number(data.latitude, data.lat)
        .ok_or_else(|| LocateError::MalformedResponse("missing latitude".to_string()))?;
    let lng = number(data.longitude, data.lon)
        .ok_or_else(|| LocateError::MalformedResponse("missing longitude".to_string()))?;

    let coordinate = Coordinate::new(lat, lng);
    if !coordinate.is_valid() {
        return Err(LocateError::MalformedResponse(format!(
            "coordinate out of range {}",
            coordinate
        )));
    }

    let country = data
        .country_name
        .filter(|v| !v.is_null())
        .or(data.country)
        .and_then(|v| v.as_str().map(str::to_string));

    Ok(IpFix {
        coordinate,
        country,
    })
}

pub struct ReverseGeocoder {
    client: Client,
    base_url: String,
    zoom: u8,
}

#[derive(Deserialize)]
struct ReverseResponse {
    address: Option<Address>,
}

#[derive(Deserialize)]
struct Address {
    country: Option<String>,
}

impl ReverseGeocoder {
    pub fn new(
        base_url: impl Into<String>,
        zoom: u8,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<Self, LocateError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            zoom,
        })
    }
}

#[async_trait]
impl CountryLookup for ReverseGeocoder {
    async fn country_at(&self, coordinate: Coordinate) -> Result<String, LocateError> {
        let url = format!("{}/reverse", self.base_url.trim_end_matches('/'));
        let lat = coordinate.lat.to_string();
        let lon = coordinate.lng.to_string();
        let zoom = self.zoom.to_string();

        let res = self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
            .query(&[
                ("format", "jsonv2"),
                ("lat", lat.as_str()),
                ("lon", lon.as_str()),
                ("zoom", zoom.as_str()),
                ("addressdetails", "1"),
            ])
            .send()
            .await?;

        if !res.status().is_success() {
            return Err(LocateError::NetworkError(format!(
                "reverse geocoder returned {}",
                res.status()
            )));
        }

        let data = res.json::<ReverseResponse>().await?;
        data.address
            .and_then(|a| a.country)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| LocateError::MalformedResponse("no address.country".to_string()))
    }
}

/// Best-effort country name. Every failure is absorbed into `None`.
pub async fn enrich_country(
    lookup: Arc<dyn CountryLookup>,
    coordinate: Coordinate,
) -> Option<String> {
    match lookup.country_at(coordinate).await {
        Ok(country) => {
            debug!("Reverse geocoded {} to {}", coordinate, country);
            Some(country)
        }
        Err(e) => {
            warn!("Country enrichment failed for {}: {}", coordinate, e);
            None
        }
    }
}

/// Personalised line shown above the map, if the country is known.
pub fn greeting(country: Option<&str>, home_country: &str, home_message: &str) -> Option<String> {
    let c = country.map(str::trim).filter(|c| !c.is_empty())?;
    if c.eq_ignore_ascii_case(home_country.trim()) {
        Some(home_message.to_string())
    } else {
        Some(format!("Hi there from {}", c))
    }
}
