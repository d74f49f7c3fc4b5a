//! Trip recording and route learning.
//!
//! A [`RouteLearningAccumulator`] buffers the raw positions of one trip and,
//! when the trip ends, turns them into a [`RouteCandidate`] the route store
//! can merge. Anomalous trips (too short, zero duration, no movement) produce
//! no candidate at all.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::algorithms::{douglas_peucker, polyline_length, resample_track};
use crate::{GeoPoint, RouteCandidate, RouteKind};

/// Configuration for route learning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    /// Confidence of a freshly learned route.
    /// Default: 0.5
    pub baseline_confidence: f64,

    /// Douglas-Peucker tolerance in degrees.
    /// Default: 0.0001 (~11m)
    pub simplification_tolerance: f64,

    /// Upper bound on waypoints kept for a learned route.
    /// Default: 200
    pub max_waypoints: usize,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            baseline_confidence: 0.5,
            simplification_tolerance: 0.0001,
            max_waypoints: 200,
        }
    }
}

/// Statistics of the trip recorded so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripSummary {
    pub point_count: usize,
    pub distance_meters: f64,
    pub duration_seconds: f64,
    /// Distance over duration, 0 for an instantaneous trip
    pub average_speed_mps: f64,
    /// Highest reported speed
    pub max_speed_mps: f64,
}

#[derive(Debug, Clone, Copy)]
struct TracePoint {
    point: GeoPoint,
    timestamp_ms: i64,
    speed_mps: f64,
}

/// Buffers positions of one trip.
#[derive(Debug, Clone)]
pub struct RouteLearningAccumulator {
    id: String,
    kind: RouteKind,
    config: LearningConfig,
    trace: Vec<TracePoint>,
    /// Planned destination and the radius within which it counts as reached
    target: Option<(GeoPoint, f64)>,
}

impl RouteLearningAccumulator {
    pub fn new(id: impl Into<String>, kind: RouteKind, config: LearningConfig) -> Self {
        Self {
            id: id.into(),
            kind,
            config,
            trace: Vec::new(),
            target: None,
        }
    }

    /// Mark the trip as aimed at `destination`. Trips that end farther than
    /// `radius_meters` from it are learned as unsuccessful.
    pub fn with_target(mut self, destination: GeoPoint, radius_meters: f64) -> Self {
        self.target = Some((destination, radius_meters));
        self
    }

    pub fn kind(&self) -> RouteKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.trace.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trace.is_empty()
    }

    /// Append a position. Invalid coordinates are skipped.
    pub fn record(&mut self, point: GeoPoint, timestamp_ms: i64, speed_mps: f64) {
        if !point.is_valid() {
            debug!(
                "[RouteLearning] Skipping invalid point ({}, {})",
                point.latitude, point.longitude
            );
            return;
        }
        self.trace.push(TracePoint {
            point,
            timestamp_ms,
            speed_mps: if speed_mps.is_finite() { speed_mps.max(0.0) } else { 0.0 },
        });
    }

    fn points(&self) -> Vec<GeoPoint> {
        self.trace.iter().map(|t| t.point).collect()
    }

    fn duration_seconds(&self) -> f64 {
        match (self.trace.first(), self.trace.last()) {
            (Some(first), Some(last)) => (last.timestamp_ms - first.timestamp_ms) as f64 / 1000.0,
            _ => 0.0,
        }
    }

    /// Statistics of the trip so far, `None` before the first point.
    pub fn summary(&self) -> Option<TripSummary> {
        if self.trace.is_empty() {
            return None;
        }
        let distance_meters = polyline_length(&self.points());
        let duration_seconds = self.duration_seconds();
        let average_speed_mps = if duration_seconds > 0.0 {
            distance_meters / duration_seconds
        } else {
            0.0
        };
        let max_speed_mps = self.trace.iter().map(|t| t.speed_mps).fold(0.0, f64::max);

        Some(TripSummary {
            point_count: self.trace.len(),
            distance_meters,
            duration_seconds,
            average_speed_mps,
            max_speed_mps,
        })
    }

    /// Turn the recorded trip into a route candidate.
    ///
    /// Returns `None` for fewer than two points, a non-positive duration or
    /// a trip that never moved.
    pub fn finish(self) -> Option<RouteCandidate> {
        if self.trace.len() < 2 {
            debug!("[RouteLearning] {} ended with {} points, nothing learned", self.id, self.trace.len());
            return None;
        }
        let duration_seconds = self.duration_seconds();
        let points = self.points();
        let distance_meters = polyline_length(&points);
        if !(duration_seconds > 0.0) || !(distance_meters > 0.0) {
            debug!(
                "[RouteLearning] {} discarded: {:.1}s, {:.1}m",
                self.id, duration_seconds, distance_meters
            );
            return None;
        }

        let origin = points[0];
        let destination = points[points.len() - 1];

        let mut waypoints = douglas_peucker(&points, self.config.simplification_tolerance);
        let cap = self.config.max_waypoints.max(2);
        if waypoints.len() > cap {
            waypoints = resample_track(&waypoints, cap);
        }

        let success_rate = match self.target {
            Some((target, radius)) if destination.distance_to(&target) > radius => 0.0,
            _ => 1.0,
        };

        debug!(
            "[RouteLearning] {} learned: {} -> {} waypoints, {:.0}m in {:.0}s",
            self.id,
            points.len(),
            waypoints.len(),
            distance_meters,
            duration_seconds
        );

        Some(RouteCandidate {
            id: self.id,
            origin,
            destination,
            waypoints,
            distance_meters,
            duration_seconds,
            kind: self.kind,
            confidence: self.config.baseline_confidence.clamp(0.0, 1.0),
            usage_count: 1,
            success_rate,
            last_used_at: self.trace[self.trace.len() - 1].timestamp_ms,
        })
    }
}
