use crate::api::{self, CountryLookup, IpLocator, ReverseGeocoder};
use crate::config::Config;
use crate::distance::distance_km;
use crate::error::LocateError;
use crate::events::Event;
use crate::geolocation::{GeolocationOptions, GeolocationResolver, GpsdLocator};
use crate::location::ResolutionStrategy;
use crate::map::{MapHandle, RouteStyle};
use crate::models::{Coordinate, PositionSource, ReferencePoint, ResolvedPosition, WidgetState};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Span divisor applied per zoom key press.
const ZOOM_STEP: f64 = 1.5;
/// Share of the visible span moved per pan key press.
const PAN_STEP: f64 = 0.2;

/// Everything the badge needs to find the viewer.
pub struct Services {
    pub strategy: ResolutionStrategy,
    /// `None` disables country enrichment.
    pub countries: Option<Arc<dyn CountryLookup>>,
}

impl Services {
    /// Builds the real resolvers from configuration.
    pub fn from_config(config: &Config) -> Result<Self, LocateError> {
        let r = &config.resolution;
        let geo = match r.gpsd_addr.as_deref().filter(|a| !a.trim().is_empty()) {
            Some(addr) => GeolocationResolver::new(
                Arc::new(GpsdLocator::new(addr)),
                GeolocationOptions {
                    enable_high_accuracy: r.high_accuracy,
                    timeout: r.geo_timeout(),
                    maximum_age: r.maximum_age(),
                },
            ),
            None => GeolocationResolver::unsupported(),
        };
        let ip = IpLocator::new(r.ip_url.clone(), r.ip_timeout())?;
        let strategy = ResolutionStrategy::new(r.mode, Arc::new(geo), Arc::new(ip), r.ip_timeout());

        let e = &config.enrichment;
        let countries: Option<Arc<dyn CountryLookup>> = if e.enabled {
            Some(Arc::new(ReverseGeocoder::new(
                e.reverse_url.clone(),
                e.zoom,
                &e.user_agent,
                r.ip_timeout(),
            )?))
        } else {
            None
        };

        Ok(Self {
            strategy,
            countries,
        })
    }
}

/// Lifecycle controller for the distance badge.
///
/// Starts in [`WidgetState::Loading`] and settles once in either `Hidden` or
/// `Ready`. Background work reports back through [`Event`]s; after
/// [`teardown`](App::teardown) every event is discarded.
pub struct App {
    pub state: WidgetState,
    pub viewer: Option<Coordinate>,
    pub source: Option<PositionSource>,
    pub country: Option<String>,
    pub should_quit: bool,
    pub tick_count: usize,

    config: Config,
    reference: ReferencePoint,
    distance_km: Option<f64>,
    map: Option<MapHandle>,
    countries: Option<Arc<dyn CountryLookup>>,
    resolution_task: Option<JoinHandle<()>>,
    enrichment_task: Option<JoinHandle<()>>,
    events: UnboundedSender<Event>,
    activated: bool,
    destroyed: bool,
}

impl App {
    pub fn new(config: Config, events: UnboundedSender<Event>) -> Self {
        let reference = config.reference_point();
        Self {
            state: WidgetState::Loading,
            viewer: None,
            source: None,
            country: None,
            should_quit: false,
            tick_count: 0,
            config,
            reference,
            distance_km: None,
            map: None,
            countries: None,
            resolution_task: None,
            enrichment_task: None,
            events,
            activated: false,
            destroyed: false,
        }
    }

    pub fn reference(&self) -> &ReferencePoint {
        &self.reference
    }

    pub fn distance_km(&self) -> Option<f64> {
        self.distance_km
    }

    pub fn map(&self) -> Option<&MapHandle> {
        self.map.as_ref()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn greeting(&self) -> Option<String> {
        api::greeting(
            self.country.as_deref(),
            &self.config.greeting.home_country,
            &self.config.greeting.home_message,
        )
    }

    /// Kicks off resolution. A host that cannot resolve at all (no
    /// interactive terminal) hides the badge straight away. Only the first
    /// call has any effect.
    pub fn activate(&mut self, services: Services, interactive: bool) {
        if self.activated || self.destroyed {
            return;
        }
        self.activated = true;

        if !interactive {
            info!("Non-interactive host, hiding the badge");
            self.hide();
            return;
        }

        let Services {
            mut strategy,
            countries,
        } = services;
        self.countries = countries;

        info!("Resolving viewer location in {:?} mode", strategy.mode());
        let tx = self.events.clone();
        self.resolution_task = Some(tokio::spawn(async move {
            let outcome = strategy.resolve().await;
            tx.send(Event::Resolved(outcome)).ok();
        }));
    }

    /// Applies one event. Events arriving after teardown are dropped.
    pub fn handle_event(&mut self, event: Event) {
        if self.destroyed {
            debug!("Discarding {:?} after teardown", event);
            return;
        }
        match event {
            Event::Tick => self.on_tick(),
            Event::Input(key) => self.handle_key(key),
            Event::Resolved(outcome) => self.on_resolved(outcome),
            Event::Country(country) => self.on_country(country),
            Event::Redraw => {}
        }
    }

    pub fn on_tick(&mut self) {
        self.tick_count = self.tick_count.wrapping_add(1);
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.should_quit = true
            }
            code => self.navigate_map(code),
        }
    }

    /// Zoom, pan and reset keys. Only a ready badge has a map to move.
    fn navigate_map(&mut self, code: KeyCode) {
        if self.state != WidgetState::Ready {
            return;
        }
        let Some(map) = self.map.as_mut() else {
            return;
        };
        match code {
            KeyCode::Char('+') | KeyCode::Char('=') => map.zoom(ZOOM_STEP),
            KeyCode::Char('-') => map.zoom(1.0 / ZOOM_STEP),
            KeyCode::Left | KeyCode::Char('h') => map.pan(-PAN_STEP, 0.0),
            KeyCode::Right | KeyCode::Char('l') => map.pan(PAN_STEP, 0.0),
            KeyCode::Up | KeyCode::Char('k') => map.pan(0.0, PAN_STEP),
            KeyCode::Down | KeyCode::Char('j') => map.pan(0.0, -PAN_STEP),
            KeyCode::Char('0') => map.reset_view(),
            _ => return,
        }
        debug!("Map view now {:?}", map.viewport());
    }

    fn on_resolved(&mut self, outcome: Option<ResolvedPosition>) {
        self.resolution_task = None;
        if self.state.is_terminal() {
            debug!("Ignoring resolution outcome, badge already settled");
            return;
        }

        let Some(position) = outcome else {
            self.hide();
            return;
        };

        let you = position.coordinate;
        self.viewer = Some(you);
        self.source = Some(position.source);
        if self.distance_km.is_none() {
            self.distance_km = Some(distance_km(self.reference.coordinate, you));
        }

        match position.country {
            Some(country) => self.country = Some(country),
            None => self.spawn_enrichment(you),
        }

        let style = RouteStyle::from(&self.config.map);
        match MapHandle::acquire(you, &self.reference, &style, self.events.clone()) {
            Ok(map) => {
                self.map = Some(map);
                self.state = WidgetState::Ready;
                info!(
                    "Badge ready: {:.1} km to {}",
                    self.distance_km.unwrap_or_default(),
                    self.reference.city_label
                );
            }
            Err(e) => {
                warn!("Could not render the route map: {}", e);
                self.hide();
            }
        }
    }

    fn spawn_enrichment(&mut self, coordinate: Coordinate) {
        let Some(lookup) = self.countries.clone() else {
            return;
        };
        let tx = self.events.clone();
        self.enrichment_task = Some(tokio::spawn(async move {
            let country = api::enrich_country(lookup, coordinate).await;
            tx.send(Event::Country(country)).ok();
        }));
    }

    fn on_country(&mut self, country: Option<String>) {
        self.enrichment_task = None;
        if self.state == WidgetState::Hidden {
            return;
        }
        if let Some(c) = country {
            self.country = Some(c);
        }
    }

    fn hide(&mut self) {
        self.state = WidgetState::Hidden;
        if let Some(task) = self.enrichment_task.take() {
            task.abort();
        }
        if let Some(mut map) = self.map.take() {
            map.teardown();
        }
    }

    /// Cancels in-flight work and releases the map. Idempotent.
    pub fn teardown(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        if let Some(task) = self.resolution_task.take() {
            task.abort();
        }
        if let Some(task) = self.enrichment_task.take() {
            task.abort();
        }
        if let Some(map) = self.map.take() {
            map.release();
        }
        info!("Badge torn down");
    }
}

impl Drop for App {
    fn drop(&mut self) {
        self.teardown();
    }
}
