//! Route map between the viewer and the reference point.
//!
//! A [`MapHandle`] bundles everything the map owns: the fitted viewport, the
//! two markers, the dashed route line and the timer task that animates the
//! dash offset. It is acquired in one step and released in one step; a
//! failed acquisition allocates nothing.

use crate::config::MapConfig;
use crate::error::MapError;
use crate::events::Event;
use crate::models::{Coordinate, ReferencePoint};
use ratatui::{
    prelude::*,
    widgets::{canvas::*, *},
};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Smallest window, in degrees, the viewport shrinks to.
const MIN_SPAN_DEG: f64 = 1.0;
/// Width of the viewport expressed in dash units.
const DASH_UNITS_ACROSS: f64 = 400.0;

const VIEWER_COLOR: Color = Color::Cyan;
const REFERENCE_COLOR: Color = Color::Rgb(239, 68, 68);
const ROUTE_COLOR: Color = Color::Rgb(239, 68, 68);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DashPattern {
    pub on: f64,
    pub off: f64,
}

impl DashPattern {
    pub fn period(&self) -> f64 {
        self.on + self.off
    }
}

/// Styling and animation parameters for the route.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteStyle {
    pub dash: DashPattern,
    /// Offset advance per frame, in dash units.
    pub step: f64,
    pub frame_interval: Duration,
    pub padding: f64,
}

impl Default for RouteStyle {
    fn default() -> Self {
        (&MapConfig::default()).into()
    }
}

impl From<&MapConfig> for RouteStyle {
    fn from(c: &MapConfig) -> Self {
        Self {
            dash: DashPattern {
                on: c.dash_on,
                off: c.dash_off,
            },
            step: c.dash_step,
            frame_interval: c.frame_interval(),
            padding: c.padding,
        }
    }
}

/// Visible region: longitudes on x, latitudes on y.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x_bounds: [f64; 2],
    pub y_bounds: [f64; 2],
}

impl Viewport {
    /// Smallest box holding both points, grown by `padding` of its span on every side.
    pub fn fit(a: Coordinate, b: Coordinate, padding: f64) -> Self {
        let pad = padding.max(0.0);
        let (west, east) = (a.lng.min(b.lng), a.lng.max(b.lng));
        let (south, north) = (a.lat.min(b.lat), a.lat.max(b.lat));
        let x_pad = (east - west) * pad;
        let y_pad = (north - south) * pad;

        let (x0, x1) = at_least(west - x_pad, east + x_pad, MIN_SPAN_DEG);
        let (y0, y1) = at_least(south - y_pad, north + y_pad, MIN_SPAN_DEG);

        Self {
            x_bounds: clamp_axis(x0, x1, 180.0),
            y_bounds: clamp_axis(y0, y1, 90.0),
        }
    }

    pub fn contains(&self, c: Coordinate) -> bool {
        (self.x_bounds[0]..=self.x_bounds[1]).contains(&c.lng)
            && (self.y_bounds[0]..=self.y_bounds[1]).contains(&c.lat)
    }

    /// Same centre with each span divided by `factor`; above 1 zooms in.
    /// Never narrower than the minimum span nor wider than the world.
    pub fn zoomed(&self, factor: f64) -> Self {
        if !factor.is_finite() || factor <= 0.0 {
            return *self;
        }
        let zoom_axis = |[lo, hi]: [f64; 2], limit: f64| {
            let mid = (lo + hi) / 2.0;
            let half = ((hi - lo) / factor).max(MIN_SPAN_DEG) / 2.0;
            clamp_axis(mid - half, mid + half, limit)
        };
        Self {
            x_bounds: zoom_axis(self.x_bounds, 180.0),
            y_bounds: zoom_axis(self.y_bounds, 90.0),
        }
    }

    /// Moves the window by fractions of its own span, east and north positive.
    pub fn panned(&self, dx: f64, dy: f64) -> Self {
        let shift = |[lo, hi]: [f64; 2], by: f64, limit: f64| {
            let d = (hi - lo) * by;
            clamp_axis(lo + d, hi + d, limit)
        };
        Self {
            x_bounds: shift(self.x_bounds, dx, 180.0),
            y_bounds: shift(self.y_bounds, dy, 90.0),
        }
    }

    pub fn width(&self) -> f64 {
        self.x_bounds[1] - self.x_bounds[0]
    }

    pub fn height(&self) -> f64 {
        self.y_bounds[1] - self.y_bounds[0]
    }

    /// Grows one axis so a degree covers the same distance on screen both
    /// ways. Terminal cells are about twice as tall as they are wide.
    pub fn fitted_to(&self, area: Rect) -> Self {
        if area.width == 0 || area.height == 0 || self.width() <= 0.0 || self.height() <= 0.0 {
            return *self;
        }
        let screen_ratio = f64::from(area.width) / (2.0 * f64::from(area.height));
        let current = self.width() / self.height();

        let (mut x, mut y) = (self.x_bounds, self.y_bounds);
        if current < screen_ratio {
            let (x0, x1) = at_least(x[0], x[1], self.height() * screen_ratio);
            x = clamp_axis(x0, x1, 180.0);
        } else {
            let (y0, y1) = at_least(y[0], y[1], self.width() / screen_ratio);
            y = clamp_axis(y0, y1, 90.0);
        }
        Self {
            x_bounds: x,
            y_bounds: y,
        }
    }
}

fn at_least(lo: f64, hi: f64, span: f64) -> (f64, f64) {
    if hi - lo >= span {
        return (lo, hi);
    }
    let mid = (lo + hi) / 2.0;
    (mid - span / 2.0, mid + span / 2.0)
}

// Shift the window back inside [-limit, limit]; cap the span at the full axis.
fn clamp_axis(lo: f64, hi: f64, limit: f64) -> [f64; 2] {
    let span = (hi - lo).min(2.0 * limit);
    let lo = lo.max(-limit).min(limit - span);
    [lo, lo + span]
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapMarker {
    pub position: Coordinate,
    pub label: String,
    pub color: Color,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteLine {
    pub from: Coordinate,
    pub to: Coordinate,
    pub color: Color,
    pub dash: DashPattern,
}

type Point = (f64, f64);

/// Visible dashes of a straight line from `start` to `end` (x, y in degrees).
///
/// The pattern phase at distance `s` along the line is `(s + offset) mod period`,
/// so a growing offset moves the dashes towards `start`.
pub fn dash_segments(
    start: Point,
    end: Point,
    dash: DashPattern,
    offset: f64,
    units_per_degree: f64,
) -> Vec<(Point, Point)> {
    let (dx, dy) = (end.0 - start.0, end.1 - start.1);
    let len = dx.hypot(dy) * units_per_degree;
    if !len.is_finite() || len <= 0.0 || dash.on <= 0.0 {
        return Vec::new();
    }
    if dash.off <= 0.0 {
        return vec![(start, end)];
    }

    let at = |units: f64| {
        let t = units / len;
        (start.0 + dx * t, start.1 + dy * t)
    };

    let period = dash.period();
    let mut segments = Vec::new();
    let mut s = -offset.rem_euclid(period);
    while s < len {
        let a = s.max(0.0);
        let b = (s + dash.on).min(len);
        if b > a {
            segments.push((at(a), at(b)));
        }
        s += period;
    }
    segments
}

#[derive(Debug, Default)]
struct DashState {
    active: bool,
    offset: f64,
    frames: u64,
}

struct DashAnimation {
    state: Arc<Mutex<DashState>>,
    task: Option<JoinHandle<()>>,
}

fn lock(state: &Mutex<DashState>) -> MutexGuard<'_, DashState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl DashAnimation {
    /// Spawns the frame timer. Each frame advances the offset and posts
    /// [`Event::Redraw`] while holding the state lock, so once [`stop`] has
    /// returned no further frame can land.
    ///
    /// [`stop`]: DashAnimation::stop
    fn start(style: &RouteStyle, events: UnboundedSender<Event>) -> Self {
        let state = Arc::new(Mutex::new(DashState {
            active: true,
            ..DashState::default()
        }));
        let shared = Arc::clone(&state);
        let period = style.frame_interval;
        let step = style.step;
        let wrap = style.dash.period().max(f64::EPSILON);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await; // first tick completes immediately
            loop {
                ticker.tick().await;
                let active = {
                    let mut s = lock(&shared);
                    if s.active {
                        s.offset = (s.offset + step).rem_euclid(wrap);
                        s.frames += 1;
                        if events.send(Event::Redraw).is_err() {
                            s.active = false;
                        }
                    }
                    s.active
                };
                if !active {
                    break;
                }
            }
        });

        Self {
            state,
            task: Some(task),
        }
    }

    fn stop(&mut self) {
        lock(&self.state).active = false;
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Owned map resources. Dropping the handle releases them too.
pub struct MapHandle {
    /// The fitted view that [`reset_view`](MapHandle::reset_view) returns to.
    home: Viewport,
    viewport: Viewport,
    markers: [MapMarker; 2],
    route: RouteLine,
    animation: DashAnimation,
}

impl MapHandle {
    /// Validates input, lays out the map and starts the dash animation.
    /// The timer is started last, so an error leaves nothing running.
    pub fn acquire(
        viewer: Coordinate,
        reference: &ReferencePoint,
        style: &RouteStyle,
        events: UnboundedSender<Event>,
    ) -> Result<Self, MapError> {
        check("viewer", viewer)?;
        check("reference", reference.coordinate)?;

        let viewport = Viewport::fit(viewer, reference.coordinate, style.padding);
        let markers = [
            MapMarker {
                position: viewer,
                label: "You".to_string(),
                color: VIEWER_COLOR,
            },
            MapMarker {
                position: reference.coordinate,
                label: reference.city_label.clone(),
                color: REFERENCE_COLOR,
            },
        ];
        let route = RouteLine {
            from: viewer,
            to: reference.coordinate,
            color: ROUTE_COLOR,
            dash: style.dash,
        };
        let animation = DashAnimation::start(style, events);

        info!("Map acquired for {} -> {}", viewer, reference.coordinate);
        Ok(Self {
            home: viewport,
            viewport,
            markers,
            route,
            animation,
        })
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn zoom(&mut self, factor: f64) {
        self.viewport = self.viewport.zoomed(factor);
    }

    pub fn pan(&mut self, dx: f64, dy: f64) {
        self.viewport = self.viewport.panned(dx, dy);
    }

    /// Back to the view fitted around both points.
    pub fn reset_view(&mut self) {
        self.viewport = self.home;
    }

    pub fn dash_offset(&self) -> f64 {
        lock(&self.animation.state).offset
    }

    /// Number of animation frames applied so far.
    pub fn frames(&self) -> u64 {
        lock(&self.animation.state).frames
    }

    pub fn is_animating(&self) -> bool {
        lock(&self.animation.state).active
    }

    /// Stops the animation timer. Idempotent.
    pub fn teardown(&mut self) {
        if self.animation.task.is_some() {
            debug!("Releasing map handle");
        }
        self.animation.stop();
    }

    pub fn release(mut self) {
        self.teardown();
    }

    pub fn draw(&self, f: &mut Frame, area: Rect, title: &str) {
        let block = Block::default()
            .title(format!(" {} ", title))
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded);
        let viewport = self.viewport.fitted_to(block.inner(area));

        let offset = self.dash_offset();
        let units_per_degree = DASH_UNITS_ACROSS / viewport.width().max(f64::EPSILON);
        let dashes = dash_segments(
            (self.route.from.lng, self.route.from.lat),
            (self.route.to.lng, self.route.to.lat),
            self.route.dash,
            offset,
            units_per_degree,
        );
        let label_drop = viewport.height() * 0.06;

        let canvas = Canvas::default()
            .block(block)
            .marker(symbols::Marker::Braille)
            .x_bounds(viewport.x_bounds)
            .y_bounds(viewport.y_bounds)
            .paint(|ctx| {
                ctx.draw(&Map {
                    color: Color::Rgb(70, 70, 70),
                    resolution: MapResolution::High,
                });
                ctx.layer();

                for ((x1, y1), (x2, y2)) in &dashes {
                    ctx.draw(&canvas::Line {
                        x1: *x1,
                        y1: *y1,
                        x2: *x2,
                        y2: *y2,
                        color: self.route.color,
                    });
                }
                ctx.layer();

                for marker in self.markers.iter().filter(|m| viewport.contains(m.position)) {
                    let (x, y) = (marker.position.lng, marker.position.lat);
                    ctx.print(
                        x,
                        y,
                        Span::styled(
                            "●",
                            Style::default().fg(marker.color).add_modifier(Modifier::BOLD),
                        ),
                    );
                    ctx.print(
                        x,
                        (y - label_drop).max(viewport.y_bounds[0]),
                        Span::styled(marker.label.clone(), Style::default().fg(marker.color)),
                    );
                }
            });

        f.render_widget(canvas, area);
    }
}

impl Drop for MapHandle {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn check(which: &'static str, c: Coordinate) -> Result<(), MapError> {
    if c.is_valid() {
        Ok(())
    } else {
        Err(MapError::InvalidCoordinate {
            which,
            lat: c.lat,
            lng: c.lng,
        })
    }
}
