//! Distance badge: finds roughly where the viewer is, measures the
//! great-circle distance to a fixed reference point and draws the route on a
//! terminal world map.

pub mod api;
pub mod app;
pub mod config;
pub mod distance;
pub mod error;
pub mod events;
pub mod geolocation;
pub mod location;
pub mod logging;
pub mod map;
pub mod models;
pub mod ui;

pub use distance::distance_km;
pub use error::{LocateError, MapError};
pub use models::{Coordinate, ReferencePoint, ResolutionMode, WidgetState};
