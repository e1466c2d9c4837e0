use crate::models::{Coordinate, ReferencePoint, ResolutionMode};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable overriding the config file location.
pub const CONFIG_PATH_ENV: &str = "DISTANCE_BADGE_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub reference: ReferenceConfig,
    pub resolution: ResolutionConfig,
    pub enrichment: EnrichmentConfig,
    pub map: MapConfig,
    pub greeting: GreetingConfig,
    pub ui: UiConfig,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ReferenceConfig {
    pub lat: f64,
    pub lng: f64,
    pub city_label: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ResolutionConfig {
    pub mode: ResolutionMode,
    pub gpsd_addr: Option<String>, // None means the host has no device location
    pub high_accuracy: bool,
    pub geo_timeout_ms: u64,
    pub maximum_age_ms: u64,
    pub ip_url: String,
    pub ip_timeout_ms: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct EnrichmentConfig {
    pub enabled: bool,
    pub reverse_url: String,
    pub zoom: u8,
    pub user_agent: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct MapConfig {
    pub frame_interval_ms: u64, // dash animation period
    pub dash_on: f64,
    pub dash_off: f64,
    pub dash_step: f64,
    pub padding: f64, // fraction of the span added on every side
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct GreetingConfig {
    pub home_country: String,
    pub home_message: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct UiConfig {
    pub tick_rate_ms: u64,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            lat: 46.253,
            lng: 20.141,
            city_label: "Szeged, HU".to_string(),
        }
    }
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            mode: ResolutionMode::Auto,
            gpsd_addr: Some("127.0.0.1:2947".to_string()),
            high_accuracy: false,
            geo_timeout_ms: 8_000,
            maximum_age_ms: 600_000,
            ip_url: "https://ipapi.co/json/".to_string(),
            ip_timeout_ms: 10_000,
        }
    }
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            reverse_url: "https://nominatim.openstreetmap.org".to_string(),
            zoom: 3,
            user_agent: concat!("distance-badge/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: 33,
            dash_on: 10.0,
            dash_off: 12.0,
            dash_step: 2.0,
            padding: 0.25,
        }
    }
}

impl Default for GreetingConfig {
    fn default() -> Self {
        Self {
            home_country: "Hungary".to_string(),
            home_message: "Szia! seems we're in same paprika country :D".to_string(),
        }
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self { tick_rate_ms: 250 }
    }
}

impl Config {
    /// Loads the config file (path from `DISTANCE_BADGE_CONFIG`, else `config.toml`).
    /// If it doesn't exist, creates a default one.
    pub fn load() -> Self {
        let path = std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Self {
        if let Ok(content) = fs::read_to_string(path) {
            match toml::from_str(&content) {
                Ok(config) => {
                    info!("Loaded configuration from {}", path.display());
                    return config;
                }
                Err(e) => {
                    warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    return Config::default();
                }
            }
        }

        let default_config = Config::default();

        // Save default config to disk for the user to edit later
        match toml::to_string_pretty(&default_config) {
            Ok(toml_string) => {
                if fs::write(path, toml_string).is_err() {
                    warn!("Could not write default {} to disk.", path.display());
                }
            }
            Err(e) => warn!("Could not serialize default config: {}", e),
        }

        info!("Loaded default configuration.");
        default_config
    }

    pub fn reference_point(&self) -> ReferencePoint {
        ReferencePoint {
            coordinate: Coordinate::new(self.reference.lat, self.reference.lng),
            city_label: self.reference.city_label.clone(),
        }
    }
}

impl ResolutionConfig {
    pub fn geo_timeout(&self) -> Duration {
        Duration::from_millis(self.geo_timeout_ms)
    }

    pub fn maximum_age(&self) -> Duration {
        Duration::from_millis(self.maximum_age_ms)
    }

    pub fn ip_timeout(&self) -> Duration {
        Duration::from_millis(self.ip_timeout_ms)
    }
}

impl MapConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("distance-badge-{}-{}.toml", name, std::process::id()))
    }

    #[test]
    fn defaults_match_the_badge_behaviour() {
        let c = Config::default();
        assert_eq!(c.resolution.mode, ResolutionMode::Auto);
        assert_eq!(c.resolution.geo_timeout(), Duration::from_millis(8000));
        assert_eq!(c.resolution.maximum_age(), Duration::from_millis(600_000));
        assert!(!c.resolution.high_accuracy);
        assert_eq!(c.map.frame_interval(), Duration::from_millis(33));
        assert_eq!(c.enrichment.zoom, 3);
        assert_eq!(c.reference_point().city_label, "Szeged, HU");
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_keys() {
        let c: Config = toml::from_str(
            r#"
            [reference]
            city_label = "Lisbon, PT"
            lat = 38.72
            lng = -9.14

            [resolution]
            mode = "ip"
            "#,
        )
        .unwrap();

        assert_eq!(c.resolution.mode, ResolutionMode::Ip);
        assert_eq!(c.resolution.ip_url, "https://ipapi.co/json/");
        assert_eq!(c.reference_point().coordinate, Coordinate::new(38.72, -9.14));
        assert_eq!(c.map, MapConfig::default());
    }

    #[test]
    fn missing_file_is_created_with_defaults() {
        let path = scratch_path("missing");
        let _ = fs::remove_file(&path);

        let c = Config::load_from(&path);
        assert_eq!(c, Config::default());

        let written = fs::read_to_string(&path).unwrap();
        let reparsed: Config = toml::from_str(&written).unwrap();
        assert_eq!(reparsed, Config::default());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn unparsable_file_falls_back_to_defaults() {
        let path = scratch_path("broken");
        fs::write(&path, "[resolution\nmode = ").unwrap();

        assert_eq!(Config::load_from(&path), Config::default());
        let _ = fs::remove_file(&path);
    }
}
