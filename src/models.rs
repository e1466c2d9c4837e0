use serde::{Deserialize, Serialize};
use std::fmt;

/// A point on the globe in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// True when both components are finite and inside the WGS84 ranges.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.4}, {:.4})", self.lat, self.lng)
    }
}

/// The fixed destination the badge measures against.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferencePoint {
    pub coordinate: Coordinate,
    pub city_label: String,
}

/// Which resolvers the strategy is allowed to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionMode {
    Geo,
    Ip,
    #[default]
    Auto,
}

/// Which resolver produced the viewer position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionSource {
    Device,
    Network,
}

impl fmt::Display for PositionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionSource::Device => write!(f, "device"),
            PositionSource::Network => write!(f, "network"),
        }
    }
}

/// A successfully resolved viewer position.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPosition {
    pub coordinate: Coordinate,
    /// Set when the resolver payload already carried a country name.
    pub country: Option<String>,
    pub source: PositionSource,
}

/// What the badge currently shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WidgetState {
    #[default]
    Loading,
    Hidden,
    Ready,
}

impl WidgetState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WidgetState::Loading)
    }
}
