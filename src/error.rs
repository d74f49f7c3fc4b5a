//! Unified error handling for the route-intel library.
//!
//! Only validation failures reach callers. Router outages, trip anomalies and
//! persistence hiccups are recovered where they happen and logged instead.

use std::fmt;

/// Unified error type for route-intel operations.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteIntelError {
    /// A coordinate is NaN, infinite or outside the WGS84 range
    InvalidCoordinates { latitude: f64, longitude: f64 },
    /// A hazard record failed validation at ingestion time
    InvalidHazard { message: String },
    /// No hazard with this id is stored in the catalog
    UnknownHazard { id: String },
    /// An update tried to change the hazard's kind
    IncompatibleHazard { id: String, message: String },
    /// A route candidate violates one of its invariants
    InvalidRoute { route_id: String, message: String },
    /// Origin and destination are the same place
    DegenerateRequest { separation_meters: f64 },
    /// A lifecycle operation was called in the wrong state
    InvalidState { operation: String, state: String },
    /// External router failure (recovered inside the selector)
    RouterError { provider: String, message: String },
    /// Persistence/storage error
    PersistenceError { message: String },
    /// Configuration error
    ConfigError { message: String },
}

impl fmt::Display for RouteIntelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteIntelError::InvalidCoordinates {
                latitude,
                longitude,
            } => {
                write!(f, "Invalid coordinates ({}, {})", latitude, longitude)
            }
            RouteIntelError::InvalidHazard { message } => {
                write!(f, "Invalid hazard: {}", message)
            }
            RouteIntelError::UnknownHazard { id } => {
                write!(f, "Unknown hazard '{}'", id)
            }
            RouteIntelError::IncompatibleHazard { id, message } => {
                write!(f, "Incompatible update for hazard '{}': {}", id, message)
            }
            RouteIntelError::InvalidRoute { route_id, message } => {
                write!(f, "Route '{}' is invalid: {}", route_id, message)
            }
            RouteIntelError::DegenerateRequest { separation_meters } => {
                write!(
                    f,
                    "Degenerate request: origin and destination are {:.0}m apart",
                    separation_meters
                )
            }
            RouteIntelError::InvalidState { operation, state } => {
                write!(f, "Cannot {} while session is {}", operation, state)
            }
            RouteIntelError::RouterError { provider, message } => {
                write!(f, "Router '{}' failed: {}", provider, message)
            }
            RouteIntelError::PersistenceError { message } => {
                write!(f, "Persistence error: {}", message)
            }
            RouteIntelError::ConfigError { message } => {
                write!(f, "Configuration error: {}", message)
            }
        }
    }
}

impl std::error::Error for RouteIntelError {}

/// Result type alias for route-intel operations.
pub type Result<T> = std::result::Result<T, RouteIntelError>;

/// Extension trait for converting Option to RouteIntelError.
pub trait OptionExt<T> {
    /// Convert Option to Result with an unknown hazard error.
    fn ok_or_unknown_hazard(self, id: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_unknown_hazard(self, id: &str) -> Result<T> {
        self.ok_or_else(|| RouteIntelError::UnknownHazard { id: id.to_string() })
    }
}
