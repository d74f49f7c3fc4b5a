//! Geometry clean-up for the winning alternative.

use log::debug;

use crate::algorithms::{moving_average, polyline_length, prune_shallow_turns};
use crate::RouteCandidate;

/// Prune near-straight waypoints, then smooth what is left.
///
/// Endpoints never move. If the cleaned geometry is more than
/// `max_distance_reduction` shorter than the original the candidate is left
/// untouched; otherwise distance and duration are rescaled to the new length.
/// Returns whether the geometry changed.
pub fn optimize(
    candidate: &mut RouteCandidate,
    min_turn_degrees: f64,
    max_distance_reduction: f64,
) -> bool {
    let original_length = polyline_length(&candidate.waypoints);
    if candidate.waypoints.len() < 3 || !(original_length > 0.0) {
        return false;
    }

    let pruned = prune_shallow_turns(&candidate.waypoints, min_turn_degrees);
    let smoothed = moving_average(&pruned);
    let new_length = polyline_length(&smoothed);

    if !(new_length > 0.0) || new_length < original_length * (1.0 - max_distance_reduction) {
        debug!(
            "[RouteSelector] Optimization of {} rejected: {:.0}m -> {:.0}m",
            candidate.id, original_length, new_length
        );
        return false;
    }

    let ratio = new_length / original_length;
    debug!(
        "[RouteSelector] Optimized {}: {} -> {} waypoints, length x{:.3}",
        candidate.id,
        candidate.waypoints.len(),
        smoothed.len(),
        ratio
    );
    candidate.waypoints = smoothed;
    candidate.distance_meters *= ratio;
    candidate.duration_seconds *= ratio;
    true
}
