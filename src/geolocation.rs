//! Device location for the distance badge.
//!
//! The host's location capability is abstracted as a [`DeviceLocator`]. The
//! shipped implementation, [`GpsdLocator`], talks to a local gpsd daemon over
//! its JSON protocol. [`GeolocationResolver`] wraps a locator with the
//! badge's timeout and cached-fix policy.

use crate::error::LocateError;
use crate::models::Coordinate;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::io::ErrorKind;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

const GPSD_WATCH: &[u8] = b"?WATCH={\"enable\":true,\"json\":true};\n";

/// Options passed to the device capability.
#[derive(Debug, Clone, PartialEq)]
pub struct GeolocationOptions {
    pub enable_high_accuracy: bool,
    pub timeout: Duration,
    /// A cached fix younger than this is returned without asking the device.
    pub maximum_age: Duration,
}

impl Default for GeolocationOptions {
    fn default() -> Self {
        Self {
            enable_high_accuracy: false,
            timeout: Duration::from_millis(8_000),
            maximum_age: Duration::from_millis(600_000),
        }
    }
}

/// A position reported by the device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fix {
    pub coordinate: Coordinate,
    pub taken_at: DateTime<Utc>,
}

/// The host's location capability.
#[async_trait]
pub trait DeviceLocator: Send + Sync {
    /// Produces exactly one fix or one failure. Implementations do not retry.
    async fn current_position(&self, options: &GeolocationOptions) -> Result<Fix, LocateError>;
}

/// Applies the timeout and staleness policy on top of a [`DeviceLocator`].
pub struct GeolocationResolver {
    locator: Option<Arc<dyn DeviceLocator>>,
    options: GeolocationOptions,
    cached: Mutex<Option<Fix>>,
}

impl GeolocationResolver {
    pub fn new(locator: Arc<dyn DeviceLocator>, options: GeolocationOptions) -> Self {
        Self {
            locator: Some(locator),
            options,
            cached: Mutex::new(None),
        }
    }

    /// A resolver for hosts without any location capability.
    pub fn unsupported() -> Self {
        Self {
            locator: None,
            options: GeolocationOptions::default(),
            cached: Mutex::new(None),
        }
    }

    pub async fn locate(&self) -> Result<Coordinate, LocateError> {
        let Some(locator) = &self.locator else {
            return Err(LocateError::Unsupported);
        };

        if let Some(fix) = self.fresh_cached_fix() {
            debug!("Using cached device fix {}", fix.coordinate);
            return Ok(fix.coordinate);
        }

        let fix = match tokio::time::timeout(
            self.options.timeout,
            locator.current_position(&self.options),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => return Err(LocateError::Timeout),
        };

        if !fix.coordinate.is_valid() {
            return Err(LocateError::PositionUnavailable);
        }

        if let Ok(mut cached) = self.cached.lock() {
            *cached = Some(fix);
        }
        info!("Device fix {}", fix.coordinate);
        Ok(fix.coordinate)
    }

    fn fresh_cached_fix(&self) -> Option<Fix> {
        let cached = (*self.cached.lock().ok()?)?;
        let age = Utc::now().signed_duration_since(cached.taken_at).to_std().ok()?;
        (age <= self.options.maximum_age).then_some(cached)
    }

    #[cfg(test)]
    fn seed_cache(&self, fix: Fix) {
        *self.cached.lock().unwrap() = Some(fix);
    }
}

/// Reads fixes from a gpsd daemon (`127.0.0.1:2947` by default).
pub struct GpsdLocator {
    addr: String,
}

#[derive(Deserialize)]
struct GpsdReport {
    class: String,
    #[serde(default)]
    mode: u8,
    lat: Option<f64>,
    lon: Option<f64>,
    time: Option<DateTime<Utc>>,
}

impl GpsdLocator {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

#[async_trait]
impl DeviceLocator for GpsdLocator {
    async fn current_position(&self, options: &GeolocationOptions) -> Result<Fix, LocateError> {
        let stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|e| io_to_locate_error(&self.addr, e))?;
        let (reader, mut writer) = stream.into_split();
        writer
            .write_all(GPSD_WATCH)
            .await
            .map_err(|e| io_to_locate_error(&self.addr, e))?;

        // 2D fixes are coarse enough unless the caller asked for precision.
        let min_mode = if options.enable_high_accuracy { 3 } else { 2 };
        let mut lines = BufReader::new(reader).lines();

        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| io_to_locate_error(&self.addr, e))?
        {
            let Ok(report) = serde_json::from_str::<GpsdReport>(&line) else {
                continue;
            };
            if report.class != "TPV" || report.mode < min_mode {
                continue;
            }
            let (Some(lat), Some(lon)) = (report.lat, report.lon) else {
                continue;
            };
            let taken_at = report.time.unwrap_or_else(Utc::now);
            if is_stale(taken_at, options.maximum_age) {
                debug!("Skipping gpsd fix from {}", taken_at);
                continue;
            }
            return Ok(Fix {
                coordinate: Coordinate::new(lat, lon),
                taken_at,
            });
        }

        warn!("gpsd at {} closed the stream without a fix", self.addr);
        Err(LocateError::PositionUnavailable)
    }
}

// gpsd replays the last known fix on WATCH, which may be hours old.
fn is_stale(taken_at: DateTime<Utc>, maximum_age: Duration) -> bool {
    Utc::now()
        .signed_duration_since(taken_at)
        .to_std()
        .is_ok_and(|age| age > maximum_age)
}

fn io_to_locate_error(addr: &str, e: std::io::Error) -> LocateError {
    debug!("gpsd at {}: {}", addr, e);
    match e.kind() {
        ErrorKind::ConnectionRefused | ErrorKind::AddrNotAvailable | ErrorKind::NotFound => {
            LocateError::Unsupported
        }
        ErrorKind::PermissionDenied => LocateError::PermissionDenied,
        ErrorKind::TimedOut => LocateError::Timeout,
        _ => LocateError::PositionUnavailable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;

    struct CountingLocator {
        calls: AtomicUsize,
        result: Result<Coordinate, LocateError>,
        delay: Duration,
    }

    #[async_trait]
    impl DeviceLocator for CountingLocator {
        async fn current_position(&self, _: &GeolocationOptions) -> Result<Fix, LocateError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.result.clone().map(|coordinate| Fix {
                coordinate,
                taken_at: Utc::now(),
            })
        }
    }

    fn counting(result: Result<Coordinate, LocateError>, delay: Duration) -> Arc<CountingLocator> {
        Arc::new(CountingLocator {
            calls: AtomicUsize::new(0),
            result,
            delay,
        })
    }

    fn options(timeout_ms: u64) -> GeolocationOptions {
        GeolocationOptions {
            timeout: Duration::from_millis(timeout_ms),
            ..GeolocationOptions::default()
        }
    }

    #[tokio::test]
    async fn unsupported_host_fails_without_a_locator() {
        let resolver = GeolocationResolver::unsupported();
        assert_eq!(resolver.locate().await, Err(LocateError::Unsupported));
    }

    #[tokio::test]
    async fn slow_device_times_out() {
        let locator = counting(Ok(Coordinate::new(1.0, 2.0)), Duration::from_millis(500));
        let resolver = GeolocationResolver::new(locator.clone(), options(20));
        assert_eq!(resolver.locate().await, Err(LocateError::Timeout));
        assert_eq!(locator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn device_failure_is_returned_once_without_retry() {
        let locator = counting(Err(LocateError::PermissionDenied), Duration::ZERO);
        let resolver = GeolocationResolver::new(locator.clone(), options(1000));
        assert_eq!(resolver.locate().await, Err(LocateError::PermissionDenied));
        assert_eq!(locator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fresh_fix_is_served_from_cache() {
        let locator = counting(Ok(Coordinate::new(1.0, 2.0)), Duration::ZERO);
        let resolver = GeolocationResolver::new(locator.clone(), options(1000));

        assert_eq!(resolver.locate().await, Ok(Coordinate::new(1.0, 2.0)));
        assert_eq!(resolver.locate().await, Ok(Coordinate::new(1.0, 2.0)));
        assert_eq!(locator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stale_fix_is_ignored() {
        let locator = counting(Ok(Coordinate::new(1.0, 2.0)), Duration::ZERO);
        let resolver = GeolocationResolver::new(locator.clone(), options(1000));
        resolver.seed_cache(Fix {
            coordinate: Coordinate::new(50.0, 50.0),
            taken_at: Utc::now() - chrono::Duration::minutes(11),
        });

        assert_eq!(resolver.locate().await, Ok(Coordinate::new(1.0, 2.0)));
        assert_eq!(locator.calls.load(Ordering::SeqCst), 1);
    }

    async fn fake_gpsd(lines: &'static [&'static str]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 64];
            let _ = tokio::io::AsyncReadExt::read(&mut socket, &mut buf).await;
            for line in lines {
                socket.write_all(line.as_bytes()).await.unwrap();
                socket.write_all(b"\n").await.unwrap();
            }
        });
        addr
    }

    #[tokio::test]
    async fn gpsd_skips_non_fix_reports() {
        let addr = fake_gpsd(&[
            r#"{"class":"VERSION","release":"3.25"}"#,
            r#"{"class":"TPV","mode":1}"#,
            "not json",
            r#"{"class":"TPV","mode":2,"lat":46.25,"lon":20.14}"#,
        ])
        .await;

        let fix = GpsdLocator::new(addr)
            .current_position(&GeolocationOptions::default())
            .await
            .unwrap();
        assert_eq!(fix.coordinate, Coordinate::new(46.25, 20.14));
    }

    #[tokio::test]
    async fn gpsd_skips_fixes_older_than_maximum_age() {
        let addr = fake_gpsd(&[
            r#"{"class":"TPV","mode":3,"lat":10.0,"lon":10.0,"time":"2020-01-01T00:00:00.000Z"}"#,
            r#"{"class":"TPV","mode":3,"lat":46.25,"lon":20.14}"#,
        ])
        .await;

        let fix = GpsdLocator::new(addr)
            .current_position(&GeolocationOptions::default())
            .await
            .unwrap();
        assert_eq!(fix.coordinate, Coordinate::new(46.25, 20.14));
    }

    #[tokio::test]
    async fn gpsd_with_only_stale_fixes_is_unavailable() {
        let addr = fake_gpsd(&[
            r#"{"class":"TPV","mode":3,"lat":10.0,"lon":10.0,"time":"2020-01-01T00:00:00.000Z"}"#,
        ])
        .await;

        let err = GpsdLocator::new(addr)
            .current_position(&GeolocationOptions::default())
            .await;
        assert_eq!(err, Err(LocateError::PositionUnavailable));
    }

    #[tokio::test]
    async fn gpsd_high_accuracy_needs_a_3d_fix() {
        let addr = fake_gpsd(&[
            r#"{"class":"TPV","mode":2,"lat":1.0,"lon":1.0}"#,
            r#"{"class":"TPV","mode":3,"lat":2.0,"lon":2.0}"#,
        ])
        .await;

        let opts = GeolocationOptions {
            enable_high_accuracy: true,
            ..GeolocationOptions::default()
        };
        let fix = GpsdLocator::new(addr).current_position(&opts).await.unwrap();
        assert_eq!(fix.coordinate, Coordinate::new(2.0, 2.0));
    }

    #[tokio::test]
    async fn gpsd_stream_without_fix_is_unavailable() {
        let addr = fake_gpsd(&[r#"{"class":"TPV","mode":1}"#]).await;
        let result = GpsdLocator::new(addr)
            .current_position(&GeolocationOptions::default())
            .await;
        assert_eq!(result, Err(LocateError::PositionUnavailable));
    }

    #[tokio::test]
    async fn missing_daemon_is_unsupported() {
        // Bind then drop to get a port nobody listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let result = GpsdLocator::new(addr)
            .current_position(&GeolocationOptions::default())
            .await;
        assert_eq!(result, Err(LocateError::Unsupported));
    }
}
