//! Synthetic route geometries.
//!
//! When no router answers (and alongside one that does) the selector
//! interpolates waypoints between origin and destination and pushes them
//! sideways with distinct offset patterns, so every alternative is a
//! genuinely different shape rather than a copy of the straight line.

use std::f64::consts::PI;

use crate::geo_utils::{haversine_distance, interpolate, local_vector, offset_point};
use crate::GeoPoint;

const MIN_SEGMENTS: usize = 8;
const MAX_SEGMENTS: usize = 128;

/// Lateral offset applied along the straight line, as a function of the
/// normalized position `t` in [0, 1] and the straight-line distance `D`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetPattern {
    Direct,
    /// `+0.15 D sin(pi t)`, bulging to the left of travel
    ArcLeft,
    ArcRight,
    /// `0.1 D sin(2 pi t)`
    SCurve,
    /// `0.25 D sin(pi t)`
    WideArc,
}

impl OffsetPattern {
    pub const ALL: [OffsetPattern; 5] = [
        OffsetPattern::Direct,
        OffsetPattern::ArcLeft,
        OffsetPattern::ArcRight,
        OffsetPattern::SCurve,
        OffsetPattern::WideArc,
    ];

    /// Offset to the left of travel in meters (negative = right).
    pub fn offset(&self, t: f64, straight_distance: f64) -> f64 {
        match self {
            OffsetPattern::Direct => 0.0,
            OffsetPattern::ArcLeft => 0.15 * straight_distance * (PI * t).sin(),
            OffsetPattern::ArcRight => -0.15 * straight_distance * (PI * t).sin(),
            OffsetPattern::SCurve => 0.1 * straight_distance * (2.0 * PI * t).sin(),
            OffsetPattern::WideArc => 0.25 * straight_distance * (PI * t).sin(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OffsetPattern::Direct => "direct",
            OffsetPattern::ArcLeft => "arc-left",
            OffsetPattern::ArcRight => "arc-right",
            OffsetPattern::SCurve => "s-curve",
            OffsetPattern::WideArc => "wide-arc",
        }
    }
}

/// Number of interpolation segments for a straight-line distance.
fn segment_count(straight_distance: f64, spacing_meters: f64) -> usize {
    if !(spacing_meters > 0.0) {
        return MIN_SEGMENTS;
    }
    let wanted = (straight_distance / spacing_meters).ceil();
    if !wanted.is_finite() {
        return MIN_SEGMENTS;
    }
    (wanted as usize).clamp(MIN_SEGMENTS, MAX_SEGMENTS)
}

/// Waypoints from `origin` to `destination` following `pattern`.
///
/// The first and last waypoints are exactly the endpoints.
pub fn generate(
    origin: &GeoPoint,
    destination: &GeoPoint,
    pattern: OffsetPattern,
    spacing_meters: f64,
) -> Vec<GeoPoint> {
    let straight = haversine_distance(origin, destination);
    let segments = segment_count(straight, spacing_meters);

    // Unit vector of travel in local meters; its left normal is (-north, east)
    let (east, north) = local_vector(origin, destination);
    let norm = (east * east + north * north).sqrt();
    let (ue, un) = if norm > 0.0 {
        (east / norm, north / norm)
    } else {
        (0.0, 0.0)
    };

    let mut waypoints = Vec::with_capacity(segments + 1);
    waypoints.push(*origin);
    for i in 1..segments {
        let t = i as f64 / segments as f64;
        let base = interpolate(origin, destination, t);
        let lateral = pattern.offset(t, straight);
        waypoints.push(offset_point(&base, -un * lateral, ue * lateral));
    }
    waypoints.push(*destination);
    waypoints
}

/// The first `count` patterns, each turned into waypoints.
pub fn alternatives(
    origin: &GeoPoint,
    destination: &GeoPoint,
    count: usize,
    spacing_meters: f64,
) -> Vec<(OffsetPattern, Vec<GeoPoint>)> {
    OffsetPattern::ALL
        .iter()
        .take(count)
        .map(|&pattern| (pattern, generate(origin, destination, pattern, spacing_meters)))
        .collect()
}
