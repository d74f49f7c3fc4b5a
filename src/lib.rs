//! # Route Intel
//!
//! Route intelligence and hazard alerting for navigation apps.
//!
//! This library provides:
//! - Route selection from a learned-route cache, external routers and
//!   synthetic alternatives with traffic-aware multi-criteria scoring
//! - Route learning from recorded trips, merged back into the cache
//! - Geofenced hazard alerts (speed cameras, speed bumps, traffic hot-spots,
//!   road conditions) with distance/severity tiers and cooldown de-duplication
//!
//! ## Features
//!
//! - **`parallel`** - Evaluate hazard partitions and score alternatives with rayon
//! - **`http`** - Enable the OSRM HTTP router provider
//! - **`persistence`** - Enable SQLite persistence for routes and hazards
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use route_intel::{EngineConfig, GeoPoint, RouteEngine, RouteKind};
//!
//! let engine = RouteEngine::new(EngineConfig::default()).unwrap();
//! let origin = GeoPoint::new(35.700, 51.400);
//! let destination = GeoPoint::new(35.710, 51.410);
//!
//! let session = engine
//!     .start_navigation(origin, destination, RouteKind::Driving, None)
//!     .unwrap();
//! let alerts = session.on_position(origin, 42.0, 0);
//! assert!(alerts.is_empty());
//! session.stop();
//! ```

use rstar::AABB;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// Unified error handling
pub mod error;
pub use error::{OptionExt, Result, RouteIntelError};

// Geographic utilities (distance, bearing, local offsets)
pub mod geo_utils;

// Algorithm toolbox - polyline simplification and smoothing
pub mod algorithms;

// Grid-based spatial bucketing
pub mod grid;
pub use grid::{CellId, GeoIndex, GridConfig};

// Lock-sharded maps shared by the two stores
mod shard;

// Hazard catalog, hazard records and per-session snapshots
pub mod hazards;
pub use hazards::{
    BumpSeverity, CameraKind, ConditionKind, ConditionSeverity, Hazard, HazardCatalog,
    HazardConfig, HazardId, HazardKind, HazardRecord, HazardSnapshot, RoadCondition, SpeedBump,
    SpeedCamera, TrafficCell, TrafficLevel,
};

// Learned-route cache
pub mod store;
pub use store::{MergeOutcome, RouteKey, RouteStore, RouteStoreConfig};

// Trip recording and route learning
pub mod learning;
pub use learning::{LearningConfig, RouteLearningAccumulator, TripSummary};

// External router providers
pub mod router;
pub use router::{Directions, RouterProvider};

#[cfg(feature = "http")]
pub mod http;
#[cfg(feature = "http")]
pub use http::OsrmRouter;

// Route selection (cache -> alternatives -> optimization)
pub mod selector;
pub use selector::{RouteSelector, SelectorConfig};

// Hazard proximity evaluation
pub mod evaluator;
pub use evaluator::{Alert, AlertConfig, AlertHistory, AlertLevel, HazardEvaluator};

// Navigation session state machine
pub mod session;
pub use session::{
    NavigationSession, PositionFix, PositionSource, ReplaySource, SessionConfig, SessionStatus,
};

// Engine facade owning the stores
pub mod engine;
pub use engine::{EngineStats, RouteEngine};

// Persistence contract and optional SQLite store
pub mod persistence;
pub use persistence::RecordSink;
#[cfg(feature = "persistence")]
pub use persistence::SqliteStore;

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude in degrees.
///
/// Domain logic never compares points for exact equality; "same place" is
/// always decided through a distance threshold.
///
/// # Example
/// ```
/// use route_intel::GeoPoint;
/// let point = GeoPoint::new(35.700, 51.400);
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    /// Create a new point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }

    /// Return the point or an `InvalidCoordinates` error.
    pub fn validated(self) -> Result<Self> {
        if self.is_valid() {
            Ok(self)
        } else {
            Err(RouteIntelError::InvalidCoordinates {
                latitude: self.latitude,
                longitude: self.longitude,
            })
        }
    }

    /// Great-circle distance to another point in meters.
    pub fn distance_to(&self, other: &GeoPoint) -> f64 {
        geo_utils::haversine_distance(self, other)
    }
}

/// Axis-aligned latitude/longitude rectangle. `min <= max` on both axes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    /// Create bounds from points. Returns `None` for an empty slice.
    pub fn from_points(points: &[GeoPoint]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let mut min_lat = f64::MAX;
        let mut max_lat = f64::MIN;
        let mut min_lng = f64::MAX;
        let mut max_lng = f64::MIN;

        for p in points {
            min_lat = min_lat.min(p.latitude);
            max_lat = max_lat.max(p.latitude);
            min_lng = min_lng.min(p.longitude);
            max_lng = max_lng.max(p.longitude);
        }

        Some(Self {
            min_lat,
            max_lat,
            min_lng,
            max_lng,
        })
    }

    /// Grow the box by a margin in meters on every side.
    ///
    /// The longitude margin is computed at the box edge closest to a pole so
    /// the expanded box covers the full margin everywhere inside it.
    pub fn expand(&self, margin_meters: f64) -> Self {
        let widest_lat = self.min_lat.abs().max(self.max_lat.abs());
        let (dlat, dlng) = geo_utils::meters_to_degrees(margin_meters.max(0.0), widest_lat);
        Self {
            min_lat: (self.min_lat - dlat).max(-90.0),
            max_lat: (self.max_lat + dlat).min(90.0),
            min_lng: (self.min_lng - dlng).max(-180.0),
            max_lng: (self.max_lng + dlng).min(180.0),
        }
    }

    /// Whether the point lies inside the box (edges inclusive).
    pub fn contains(&self, point: &GeoPoint) -> bool {
        point.latitude >= self.min_lat
            && point.latitude <= self.max_lat
            && point.longitude >= self.min_lng
            && point.longitude <= self.max_lng
    }

    /// Get the center point of the bounds.
    pub fn center(&self) -> GeoPoint {
        GeoPoint::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }

    /// R-tree envelope in `[lat, lng]` order.
    pub fn envelope(&self) -> AABB<[f64; 2]> {
        AABB::from_corners([self.min_lat, self.min_lng], [self.max_lat, self.max_lng])
    }
}

/// Travel mode of a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteKind {
    Driving,
    Walking,
    Cycling,
    Transit,
}

impl RouteKind {
    pub const ALL: [RouteKind; 4] = [
        RouteKind::Driving,
        RouteKind::Walking,
        RouteKind::Cycling,
        RouteKind::Transit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RouteKind::Driving => "driving",
            RouteKind::Walking => "walking",
            RouteKind::Cycling => "cycling",
            RouteKind::Transit => "transit",
        }
    }
}

impl fmt::Display for RouteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RouteKind {
    type Err = RouteIntelError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "driving" | "drive" | "car" => Ok(RouteKind::Driving),
            "walking" | "walk" | "foot" => Ok(RouteKind::Walking),
            "cycling" | "bike" | "bicycle" => Ok(RouteKind::Cycling),
            "transit" | "bus" | "metro" => Ok(RouteKind::Transit),
            other => Err(RouteIntelError::ConfigError {
                message: format!("unknown route kind '{}'", other),
            }),
        }
    }
}

/// A concrete route between two places, either proposed by the selector or
/// learned from a recorded trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteCandidate {
    /// Unique identifier for this candidate
    pub id: String,
    pub origin: GeoPoint,
    pub destination: GeoPoint,
    /// Ordered waypoints, first near `origin`, last near `destination`
    pub waypoints: Vec<GeoPoint>,
    /// Total route distance in meters
    pub distance_meters: f64,
    /// Expected travel time in seconds
    pub duration_seconds: f64,
    pub kind: RouteKind,
    /// Trust in this route (0.0-1.0), grows only through repeated use
    pub confidence: f64,
    /// Number of observed trips merged into this candidate
    pub usage_count: u32,
    /// Fraction of trips that reached the destination (0.0-1.0)
    pub success_rate: f64,
    /// Unix timestamp in milliseconds
    pub last_used_at: i64,
}

impl RouteCandidate {
    /// Ranking score used by the cache: `usage_count * success_rate`.
    pub fn score(&self) -> f64 {
        self.usage_count as f64 * self.success_rate
    }

    /// Bounding box of the waypoints.
    pub fn bounds(&self) -> Option<BoundingBox> {
        BoundingBox::from_points(&self.waypoints)
    }

    /// Whether both endpoints lie within `radius` meters of the given places.
    pub fn endpoints_match(&self, origin: &GeoPoint, destination: &GeoPoint, radius: f64) -> bool {
        self.origin.distance_to(origin) <= radius
            && self.destination.distance_to(destination) <= radius
    }

    /// Check every candidate invariant.
    pub fn validate(&self, endpoint_radius: f64) -> Result<()> {
        let invalid = |message: String| RouteIntelError::InvalidRoute {
            route_id: self.id.clone(),
            message,
        };

        self.origin.validated()?;
        self.destination.validated()?;
        if self.waypoints.len() < 2 {
            return Err(invalid(format!(
                "{} waypoints, minimum 2 required",
                self.waypoints.len()
            )));
        }
        if let Some(bad) = self.waypoints.iter().find(|p| !p.is_valid()) {
            return Err(RouteIntelError::InvalidCoordinates {
                latitude: bad.latitude,
                longitude: bad.longitude,
            });
        }
        let first = &self.waypoints[0];
        let last = &self.waypoints[self.waypoints.len() - 1];
        if first.distance_to(&self.origin) > endpoint_radius {
            return Err(invalid("first waypoint is far from the origin".to_string()));
        }
        if last.distance_to(&self.destination) > endpoint_radius {
            return Err(invalid(
                "last waypoint is far from the destination".to_string(),
            ));
        }
        if !(self.distance_meters.is_finite() && self.distance_meters > 0.0) {
            return Err(invalid(format!("distance {} must be > 0", self.distance_meters)));
        }
        if !(self.duration_seconds.is_finite() && self.duration_seconds > 0.0) {
            return Err(invalid(format!("duration {} must be > 0", self.duration_seconds)));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(invalid(format!("confidence {} outside [0, 1]", self.confidence)));
        }
        if !(0.0..=1.0).contains(&self.success_rate) {
            return Err(invalid(format!(
                "success rate {} outside [0, 1]",
                self.success_rate
            )));
        }
        if self.usage_count == 0 {
            return Err(invalid("usage count must be >= 1".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Complete engine configuration. Every section falls back to its defaults
/// when absent from a config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub grid: GridConfig,
    pub hazards: HazardConfig,
    pub routes: RouteStoreConfig,
    pub learning: LearningConfig,
    pub selector: SelectorConfig,
    pub alerts: AlertConfig,
    pub session: SessionConfig,
}

impl EngineConfig {
    /// Parse and validate a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfig =
            serde_json::from_str(json).map_err(|e| RouteIntelError::ConfigError {
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would break the engine's invariants.
    pub fn validate(&self) -> Result<()> {
        let fail = |message: &str| {
            Err(RouteIntelError::ConfigError {
                message: message.to_string(),
            })
        };

        if !(self.grid.cell_size_degrees.is_finite() && self.grid.cell_size_degrees > 0.0) {
            return fail("grid.cell_size_degrees must be > 0");
        }
        if self.routes.endpoint_match_radius_m <= 0.0 {
            return fail("routes.endpoint_match_radius_m must be > 0");
        }
        if self.routes.max_candidates_per_key == 0 {
            return fail("routes.max_candidates_per_key must be >= 1");
        }
        if !(3..=5).contains(&self.selector.alternative_count) {
            return fail("selector.alternative_count must be between 3 and 5");
        }
        if !(0.0..=1.0).contains(&self.selector.max_distance_reduction) {
            return fail("selector.max_distance_reduction must be within [0, 1]");
        }
        if self.alerts.camera_critical_m > self.alerts.camera_warning_m {
            return fail("alerts.camera_critical_m must not exceed camera_warning_m");
        }
        if self.alerts.traffic_critical_m > self.alerts.traffic_warning_m {
            return fail("alerts.traffic_critical_m must not exceed traffic_warning_m");
        }
        if self.hazards.coalesce_radius_m < 0.0 {
            return fail("hazards.coalesce_radius_m must be >= 0");
        }
        Ok(())
    }
}

/// Current wall-clock time as Unix milliseconds.
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// ============================================================================
// Tests
// ============================================================================
