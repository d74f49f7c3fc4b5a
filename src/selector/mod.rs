//! Route selection: learned cache first, then scored alternatives.
//!
//! ## Pipeline
//!
//! 1. Reject invalid and degenerate requests
//! 2. Return a learned route from the [`RouteStore`] when one matches
//! 3. Ask the router fallback chain (each provider under a timeout) and
//!    generate synthetic alternatives
//! 4. Estimate traffic-aware durations and score every alternative with
//!    kind-specific weights
//! 5. Optimize the winner's geometry
//!
//! The selector only reads the store. Learned routes get there through
//! navigation sessions.

mod optimize;
pub mod synthetic;

pub use optimize::optimize;
pub use synthetic::OffsetPattern;

use chrono::{DateTime, Timelike, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::hazards::HazardCatalog;
use crate::router::{first_directions, RouterProvider};
use crate::store::RouteStore;
use crate::{now_millis, GeoPoint, Result, RouteCandidate, RouteIntelError, RouteKind};

/// Configuration for route selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Synthetic alternatives generated per request (3-5).
    /// Default: 5
    pub alternative_count: usize,

    /// Time budget of each router provider.
    /// Default: 3000 ms
    pub router_timeout_ms: u64,

    /// Confidence of a route returned by a router.
    /// Default: 0.8
    pub router_confidence: f64,

    /// Confidence of a synthetic route.
    /// Default: 0.4
    pub synthetic_confidence: f64,

    /// Spacing of interpolated synthetic waypoints.
    /// Default: 100.0 meters
    pub waypoint_spacing_m: f64,

    /// Interior waypoints turning less than this are pruned.
    /// Default: 15.0 degrees
    pub min_turn_degrees: f64,

    /// Optimization may not shorten a route by more than this fraction.
    /// Default: 0.1
    pub max_distance_reduction: f64,

    /// Local time offset used to pick the hour of day for traffic.
    /// Default: 0
    pub utc_offset_minutes: i32,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            alternative_count: 5,
            router_timeout_ms: 3_000,
            router_confidence: 0.8,
            synthetic_confidence: 0.4,
            waypoint_spacing_m: 100.0,
            min_turn_degrees: 15.0,
            max_distance_reduction: 0.1,
            utc_offset_minutes: 0,
        }
    }
}

// ============================================================================
// Per-kind constants
// ============================================================================

/// Free-flow speed in m/s.
fn base_speed_mps(kind: RouteKind) -> f64 {
    match kind {
        RouteKind::Driving => 11.1,
        RouteKind::Walking => 1.4,
        RouteKind::Cycling => 4.5,
        RouteKind::Transit => 8.3,
    }
}

/// Delay per kilometer at traffic factor 1.0, in seconds.
fn traffic_delay_per_km(kind: RouteKind) -> f64 {
    match kind {
        RouteKind::Driving => 60.0,
        RouteKind::Transit => 30.0,
        RouteKind::Walking | RouteKind::Cycling => 0.0,
    }
}

/// Weights of (time, distance, confidence).
fn score_weights(kind: RouteKind) -> (f64, f64, f64) {
    match kind {
        RouteKind::Driving => (0.5, 0.2, 0.3),
        RouteKind::Walking => (0.2, 0.5, 0.3),
        RouteKind::Cycling => (0.35, 0.35, 0.3),
        RouteKind::Transit => (0.5, 0.2, 0.3),
    }
}

/// An alternative before scoring.
#[derive(Debug, Clone)]
struct Alternative {
    source: String,
    candidate: RouteCandidate,
}

pub struct RouteSelector {
    config: SelectorConfig,
    store: Arc<RouteStore>,
    catalog: Arc<HazardCatalog>,
    routers: Vec<Arc<dyn RouterProvider>>,
    next_id: AtomicU64,
}

impl RouteSelector {
    pub fn new(config: SelectorConfig, store: Arc<RouteStore>, catalog: Arc<HazardCatalog>) -> Self {
        Self {
            config,
            store,
            catalog,
            routers: Vec::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Router providers in priority order.
    pub fn with_routers(mut self, routers: Vec<Arc<dyn RouterProvider>>) -> Self {
        self.routers = routers;
        self
    }

    pub fn add_router(&mut self, router: Arc<dyn RouterProvider>) {
        self.routers.push(router);
    }

    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    /// Best route from `origin` to `destination`.
    ///
    /// Only invalid coordinates and degenerate requests fail; router outages
    /// fall back to synthetic geometry.
    pub fn select(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
        kind: RouteKind,
        departure: Option<DateTime<Utc>>,
    ) -> Result<RouteCandidate> {
        self.check_request(&origin, &destination)?;

        if let Some(cached) = self.store.lookup(&origin, &destination, kind) {
            info!(
                "[RouteSelector] Cache hit {} (usage {}, success {:.2})",
                cached.id, cached.usage_count, cached.success_rate
            );
            return Ok(cached);
        }

        let alternatives = self.build_alternatives(origin, destination, kind, departure);
        let (source, mut winner) = self.pick(alternatives, kind).ok_or_else(|| {
            RouteIntelError::InvalidRoute {
                route_id: String::new(),
                message: "no usable alternative".to_string(),
            }
        })?;

        optimize(
            &mut winner,
            self.config.min_turn_degrees,
            self.config.max_distance_reduction,
        );
        info!(
            "[RouteSelector] Selected {} from {}: {:.0}m, {:.0}s, {} waypoints",
            winner.id,
            source,
            winner.distance_meters,
            winner.duration_seconds,
            winner.waypoints.len()
        );
        Ok(winner)
    }

    /// Every scored alternative for a request, best first, skipping the cache.
    pub fn alternatives(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
        kind: RouteKind,
        departure: Option<DateTime<Utc>>,
    ) -> Result<Vec<(f64, RouteCandidate)>> {
        self.check_request(&origin, &destination)?;
        let alternatives = self.build_alternatives(origin, destination, kind, departure);
        let scores = score_all(&alternatives, kind);
        let mut scored: Vec<(f64, RouteCandidate)> = scores
            .into_iter()
            .zip(alternatives)
            .map(|(s, a)| (s, a.candidate))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        Ok(scored)
    }

    fn check_request(&self, origin: &GeoPoint, destination: &GeoPoint) -> Result<()> {
        origin.validated()?;
        destination.validated()?;
        let separation = origin.distance_to(destination);
        if separation <= self.store.config().endpoint_match_radius_m {
            return Err(RouteIntelError::DegenerateRequest {
                separation_meters: separation,
            });
        }
        Ok(())
    }

    fn next_id(&self) -> String {
        format!("planned-{}", self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Hour of day used for traffic lookups.
    fn departure_hour(&self, departure: Option<DateTime<Utc>>) -> u32 {
        let at = departure.unwrap_or_else(Utc::now)
            + chrono::Duration::minutes(self.config.utc_offset_minutes as i64);
        at.hour()
    }

    fn build_alternatives(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
        kind: RouteKind,
        departure: Option<DateTime<Utc>>,
    ) -> Vec<Alternative> {
        let now = now_millis();
        let radius = self.store.config().endpoint_match_radius_m;
        let mut alternatives = Vec::new();

        let timeout = Duration::from_millis(self.config.router_timeout_ms);
        if let Some((name, directions)) =
            first_directions(&self.routers, origin, destination, kind, timeout)
        {
            alternatives.push(Alternative {
                source: name,
                candidate: RouteCandidate {
                    id: self.next_id(),
                    origin,
                    destination,
                    waypoints: directions.waypoints,
                    distance_meters: directions.distance_meters,
                    duration_seconds: directions.duration_seconds,
                    kind,
                    confidence: self.config.router_confidence,
                    usage_count: 1,
                    success_rate: 1.0,
                    last_used_at: now,
                },
            });
        }

        let count = self.config.alternative_count.clamp(3, OffsetPattern::ALL.len());
        for (pattern, waypoints) in synthetic::alternatives(
            &origin,
            &destination,
            count,
            self.config.waypoint_spacing_m,
        ) {
            let distance_meters = crate::geo_utils::polyline_length(&waypoints);
            alternatives.push(Alternative {
                source: pattern.as_str().to_string(),
                candidate: RouteCandidate {
                    id: self.next_id(),
                    origin,
                    destination,
                    waypoints,
                    distance_meters,
                    duration_seconds: distance_meters / base_speed_mps(kind),
                    kind,
                    confidence: self.config.synthetic_confidence,
                    usage_count: 1,
                    success_rate: 1.0,
                    last_used_at: now,
                },
            });
        }

        let hour = self.departure_hour(departure);
        self.apply_traffic(&mut alternatives, hour);

        alternatives.retain(|a| match a.candidate.validate(radius) {
            Ok(()) => true,
            Err(e) => {
                debug!("[RouteSelector] Dropping {} alternative: {}", a.source, e);
                false
            }
        });
        alternatives
    }

    /// Add the traffic delay sampled along each alternative.
    fn apply_traffic(&self, alternatives: &mut [Alternative], hour: u32) {
        let catalog = &self.catalog;
        let add_delay = |alt: &mut Alternative| {
            let c = &mut alt.candidate;
            let factor = traffic_factor(catalog, &c.waypoints, hour);
            c.duration_seconds += factor * traffic_delay_per_km(c.kind) * c.distance_meters / 1000.0;
        };

        #[cfg(feature = "parallel")]
        alternatives.par_iter_mut().for_each(add_delay);

        #[cfg(not(feature = "parallel"))]
        alternatives.iter_mut().for_each(add_delay);
    }

    /// Highest-scoring alternative and its source. Ties keep the earlier one.
    fn pick(&self, alternatives: Vec<Alternative>, kind: RouteKind) -> Option<(String, RouteCandidate)> {
        let scores = score_all(&alternatives, kind);
        let mut best: Option<(f64, Alternative)> = None;
        for (score, alt) in scores.into_iter().zip(alternatives) {
            debug!(
                "[RouteSelector] {} {}: score {:.3} ({:.0}m, {:.0}s, conf {:.1})",
                alt.source,
                alt.candidate.id,
                score,
                alt.candidate.distance_meters,
                alt.candidate.duration_seconds,
                alt.candidate.confidence
            );
            if best.as_ref().map_or(true, |(s, _)| score > *s) {
                best = Some((score, alt));
            }
        }
        best.map(|(_, alt)| (alt.source, alt.candidate))
    }
}

/// Mean traffic factor over the waypoints at the given hour.
fn traffic_factor(catalog: &HazardCatalog, waypoints: &[GeoPoint], hour: u32) -> f64 {
    if waypoints.is_empty() {
        return 0.0;
    }
    let total: f64 = waypoints
        .iter()
        .map(|p| catalog.traffic_level_at(p, hour).factor())
        .sum();
    total / waypoints.len() as f64
}

/// Weighted sum over `(1/duration_min, 1/distance_km, confidence)`, each
/// normalized by its maximum across the alternatives.
fn score_all(alternatives: &[Alternative], kind: RouteKind) -> Vec<f64> {
    let features: Vec<(f64, f64, f64)> = alternatives
        .iter()
        .map(|a| {
            let c = &a.candidate;
            (
                60.0 / c.duration_seconds,
                1000.0 / c.distance_meters,
                c.confidence,
            )
        })
        .collect();

    let max = |pick: fn(&(f64, f64, f64)) -> f64| {
        features.iter().map(pick).fold(0.0, f64::max)
    };
    let normalize = |value: f64, max: f64| if max > 0.0 { value / max } else { 0.0 };
    let (max_time, max_dist, max_conf) = (max(|f| f.0), max(|f| f.1), max(|f| f.2));
    let (wt, wd, wc) = score_weights(kind);

    features
        .iter()
        .map(|&(time, dist, conf)| {
            wt * normalize(time, max_time) + wd * normalize(dist, max_dist) + wc * normalize(conf, max_conf)
        })
        .collect()
}
