//! Viewer location resolution for the distance badge.
//!
//! [`ResolutionStrategy`] combines the device resolver and the IP resolver
//! according to the configured [`ResolutionMode`]. In `auto` mode the device
//! is asked first and the network is only consulted after the device attempt
//! has failed; the two are never raced.

use crate::api::IpLookup;
use crate::error::LocateError;
use crate::geolocation::GeolocationResolver;
use crate::models::{PositionSource, ResolutionMode, ResolvedPosition};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Where the strategy is in its single run.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionPhase {
    NotStarted,
    Resolving,
    Resolved(ResolvedPosition),
    Failed,
}

pub struct ResolutionStrategy {
    mode: ResolutionMode,
    geo: Arc<GeolocationResolver>,
    ip: Arc<dyn IpLookup>,
    ip_timeout: Duration,
    phase: ResolutionPhase,
}

impl ResolutionStrategy {
    /// `ip_timeout` bounds the network leg independently of the HTTP client.
    pub fn new(
        mode: ResolutionMode,
        geo: Arc<GeolocationResolver>,
        ip: Arc<dyn IpLookup>,
        ip_timeout: Duration,
    ) -> Self {
        Self {
            mode,
            geo,
            ip,
            ip_timeout,
            phase: ResolutionPhase::NotStarted,
        }
    }

    pub fn mode(&self) -> ResolutionMode {
        self.mode
    }

    pub fn phase(&self) -> &ResolutionPhase {
        &self.phase
    }

    /// Runs the cascade once. After a terminal phase is reached, later calls
    /// return the recorded outcome without touching either resolver.
    pub async fn resolve(&mut self) -> Option<ResolvedPosition> {
        match &self.phase {
            ResolutionPhase::Resolved(position) => return Some(position.clone()),
            ResolutionPhase::Failed => return None,
            ResolutionPhase::NotStarted | ResolutionPhase::Resolving => {}
        }

        self.phase = ResolutionPhase::Resolving;
        let outcome = match self.mode {
            ResolutionMode::Geo => self.via_device().await,
            ResolutionMode::Ip => self.via_network().await,
            ResolutionMode::Auto => match self.via_device().await {
                Ok(position) => Ok(position),
                Err(e) => {
                    info!("Device location failed ({}), falling back to IP", e);
                    self.via_network().await
                }
            },
        };

        match outcome {
            Ok(position) => {
                info!(
                    "Resolved viewer at {} via {}",
                    position.coordinate, position.source
                );
                self.phase = ResolutionPhase::Resolved(position.clone());
                Some(position)
            }
            Err(e) => {
                warn!("Viewer location unresolved in {:?} mode: {}", self.mode, e);
                self.phase = ResolutionPhase::Failed;
                None
            }
        }
    }

    async fn via_device(&self) -> Result<ResolvedPosition, LocateError> {
        let coordinate = self.geo.locate().await?;
        Ok(ResolvedPosition {
            coordinate,
            country: None,
            source: PositionSource::Device,
        })
    }

    async fn via_network(&self) -> Result<ResolvedPosition, LocateError> {
        let fix = tokio::time::timeout(self.ip_timeout, self.ip.locate())
            .await
            .map_err(|_| LocateError::Timeout)??;
        Ok(ResolvedPosition {
            coordinate: fix.coordinate,
            country: fix.country,
            source: PositionSource::Network,
        })
    }
}
