use thiserror::Error;

/// Why a resolver could not produce a position.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocateError {
    #[error("location permission denied")]
    PermissionDenied,

    #[error("location request timed out")]
    Timeout,

    #[error("position unavailable")]
    PositionUnavailable,

    #[error("location capability unsupported on this host")]
    Unsupported,

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl From<reqwest::Error> for LocateError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            LocateError::MalformedResponse(e.to_string())
        } else {
            LocateError::NetworkError(e.to_string())
        }
    }
}

/// Map acquisition failures. Nothing is allocated when one of these is returned.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MapError {
    #[error("invalid {which} coordinate ({lat}, {lng})")]
    InvalidCoordinate {
        which: &'static str,
        lat: f64,
        lng: f64,
    },
}
