//! # Algorithm Toolbox
//!
//! Polyline algorithms shared by route learning and route optimization.
//! Use these directly when you only need the geometry, not the engine.
//!
//! ## Line Processing
//!
//! - **Douglas-Peucker**: Simplification of recorded traces
//! - **Resampling**: Evenly spaced points along a polyline
//! - **Turn Pruning**: Drop near-straight interior points
//! - **Moving Average**: Smooth interior points, endpoints pinned
//!
//! ## Geographic Utilities
//!
//! - **Haversine Distance**: Great-circle distance between points
//! - **Polyline Length**: Total distance along a path
//! - **Turn Angle**: Heading change at a vertex
//!
//! # Example
//!
//! ```rust
//! use route_intel::algorithms::{douglas_peucker, polyline_length};
//! use route_intel::GeoPoint;
//!
//! let trace = vec![
//!     GeoPoint::new(35.7000, 51.4000),
//!     GeoPoint::new(35.7010, 51.40001),
//!     GeoPoint::new(35.7020, 51.4000),
//! ];
//! let simplified = douglas_peucker(&trace, 0.0001);
//! assert_eq!(simplified.len(), 2);
//! assert!(polyline_length(&simplified) > 200.0);
//! ```

use crate::GeoPoint;

// =============================================================================
// Geographic Utilities
// =============================================================================

pub use crate::geo_utils::{
    haversine_distance,
    meters_to_degrees,
    polyline_length,
    turn_angle,
};

// =============================================================================
// Line Simplification
// =============================================================================

/// Douglas-Peucker line simplification algorithm.
///
/// Reduces the number of points in a polyline while preserving shape.
/// Uses the geo crate's implementation. Both endpoints are always kept.
///
/// # Arguments
/// * `points` - Input polyline
/// * `tolerance` - Maximum deviation from original line (in degrees)
///
/// # Returns
/// Simplified polyline with fewer points
pub fn douglas_peucker(points: &[GeoPoint], tolerance: f64) -> Vec<GeoPoint> {
    use geo::{algorithm::simplify::Simplify, Coord, LineString};

    if points.len() < 3 {
        return points.to_vec();
    }

    let coords: Vec<Coord<f64>> = points
        .iter()
        .map(|p| Coord {
            x: p.longitude,
            y: p.latitude,
        })
        .collect();

    let line = LineString::new(coords);
    let simplified = line.simplify(&tolerance);

    simplified
        .coords()
        .map(|c| GeoPoint::new(c.y, c.x))
        .collect()
}

/// Resample a polyline to a fixed number of points.
///
/// Creates evenly-spaced points along the route using linear interpolation
/// between the original points. The first and last points are preserved.
///
/// # Example
/// ```rust
/// use route_intel::algorithms::resample_track;
/// use route_intel::GeoPoint;
///
/// let track = vec![
///     GeoPoint::new(35.700, 51.400),
///     GeoPoint::new(35.705, 51.400),
///     GeoPoint::new(35.710, 51.400),
/// ];
/// let resampled = resample_track(&track, 10);
/// assert_eq!(resampled.len(), 10);
/// ```
pub fn resample_track(points: &[GeoPoint], count: usize) -> Vec<GeoPoint> {
    let (first, last) = match (points.first(), points.last()) {
        (Some(first), Some(last)) if count > 0 => (*first, *last),
        _ => return vec![],
    };
    if points.len() == 1 || count == 1 {
        return vec![first];
    }

    let total_length = polyline_length(points);
    if total_length == 0.0 {
        return vec![first; count];
    }

    let segment_length = total_length / (count - 1) as f64;
    let mut result = Vec::with_capacity(count);
    result.push(first);

    let mut current_distance = 0.0;
    let mut target_distance = segment_length;

    for w in points.windows(2) {
        let seg_dist = haversine_distance(&w[0], &w[1]);
        while seg_dist > 0.0
            && current_distance + seg_dist >= target_distance
            && result.len() < count - 1
        {
            let ratio = (target_distance - current_distance) / seg_dist;
            result.push(crate::geo_utils::interpolate(&w[0], &w[1], ratio));
            target_distance += segment_length;
        }
        current_distance += seg_dist;
    }

    // Float drift can leave us one short before the final point
    while result.len() < count - 1 {
        result.push(last);
    }
    result.push(last);
    result
}

// =============================================================================
// Route Optimization
// =============================================================================

/// Drop interior points where the path barely changes heading.
///
/// Greedy pass: the turn angle of each interior point is measured from the
/// last kept point, so a long run of shallow bends collapses into a single
/// straight segment until the accumulated bend exceeds `min_turn_degrees`.
pub fn prune_shallow_turns(points: &[GeoPoint], min_turn_degrees: f64) -> Vec<GeoPoint> {
    if points.len() < 3 {
        return points.to_vec();
    }

    let mut kept = Vec::with_capacity(points.len());
    kept.push(points[0]);
    for i in 1..points.len() - 1 {
        let prev = kept[kept.len() - 1];
        if turn_angle(&prev, &points[i], &points[i + 1]) >= min_turn_degrees {
            kept.push(points[i]);
        }
    }
    kept.push(points[points.len() - 1]);
    kept
}

/// 3-point moving average over interior points. Endpoints never move.
pub fn moving_average(points: &[GeoPoint]) -> Vec<GeoPoint> {
    if points.len() < 3 {
        return points.to_vec();
    }

    let mut smoothed = Vec::with_capacity(points.len());
    smoothed.push(points[0]);
    for w in points.windows(3) {
        smoothed.push(GeoPoint::new(
            (w[0].latitude + w[1].latitude + w[2].latitude) / 3.0,
            (w[0].longitude + w[1].longitude + w[2].longitude) / 3.0,
        ));
    }
    smoothed.push(points[points.len() - 1]);
    smoothed
}

// =============================================================================
// Spatial Indexing
// =============================================================================

/// R-tree spatial index, as used by hazard snapshots.
pub use rstar::RTree;
