//! Navigation session lifecycle.
//!
//! ```text
//! Idle --start(route)--> Active --stop()--> Completed
//! ```
//!
//! `start` snapshots the hazards around the route once. Every position update
//! after that is evaluated against the snapshot in memory and recorded for
//! route learning. `stop` turns the recording into a learned route and merges
//! it into the shared [`RouteStore`].

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::evaluator::{Alert, AlertConfig, AlertHistory, HazardEvaluator};
use crate::geo_utils::polyline_length;
use crate::hazards::{Hazard, HazardCatalog, HazardSnapshot};
use crate::learning::{LearningConfig, RouteLearningAccumulator};
use crate::store::{MergeOutcome, RouteStore};
use crate::{now_millis, BoundingBox, GeoPoint, Result, RouteCandidate, RouteIntelError};

/// Configuration for navigation sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Hazards this far outside the route's bounding box are still
    /// included in the session snapshot.
    /// Default: 500.0 meters
    pub bbox_margin_m: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { bbox_margin_m: 500.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionStatus {
    Idle,
    Active,
    Completed,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Idle => f.write_str("Idle"),
            SessionStatus::Active => f.write_str("Active"),
            SessionStatus::Completed => f.write_str("Completed"),
        }
    }
}

/// One reading from a position source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionFix {
    pub point: GeoPoint,
    pub speed_kph: f64,
    /// Unix timestamp in milliseconds
    pub timestamp_ms: i64,
}

/// Anything that yields position fixes (GPS, replay file, simulator).
pub trait PositionSource {
    /// Next fix, or `None` when the source is exhausted.
    fn next_fix(&mut self) -> Option<PositionFix>;
}

/// Replays recorded fixes in order.
#[derive(Debug, Clone, Default)]
pub struct ReplaySource {
    fixes: VecDeque<PositionFix>,
}

impl ReplaySource {
    pub fn new(fixes: Vec<PositionFix>) -> Self {
        Self {
            fixes: fixes.into(),
        }
    }

    /// Parse a JSON array of fixes.
    pub fn from_json(json: &str) -> Result<Self> {
        let fixes: Vec<PositionFix> =
            serde_json::from_str(json).map_err(|e| RouteIntelError::ConfigError {
                message: format!("invalid replay: {}", e),
            })?;
        Ok(Self::new(fixes))
    }

    pub fn remaining(&self) -> usize {
        self.fixes.len()
    }
}

impl PositionSource for ReplaySource {
    fn next_fix(&mut self) -> Option<PositionFix> {
        self.fixes.pop_front()
    }
}

struct SessionState {
    status: SessionStatus,
    route: Option<RouteCandidate>,
    snapshot: Option<HazardSnapshot>,
    accumulator: Option<RouteLearningAccumulator>,
}

/// A single navigation from start to stop.
///
/// All methods take `&self`; the session is `Sync` and can be shared between
/// the thread feeding positions and the one that ends the trip. `stop` waits
/// for an `on_position` call already in progress.
pub struct NavigationSession {
    id: String,
    catalog: Arc<HazardCatalog>,
    store: Arc<RouteStore>,
    config: SessionConfig,
    learning: LearningConfig,
    evaluator: HazardEvaluator,
    history: AlertHistory,
    state: Mutex<SessionState>,
}

impl fmt::Debug for NavigationSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NavigationSession")
            .field("id", &self.id)
            .field("status", &self.status())
            .finish()
    }
}

impl NavigationSession {
    pub fn new(
        id: impl Into<String>,
        catalog: Arc<HazardCatalog>,
        store: Arc<RouteStore>,
        config: SessionConfig,
    ) -> Self {
        let alerts = AlertConfig::default();
        Self {
            id: id.into(),
            catalog,
            store,
            config,
            learning: LearningConfig::default(),
            history: AlertHistory::new(alerts.cooldown_ms),
            evaluator: HazardEvaluator::new(alerts),
            state: Mutex::new(SessionState {
                status: SessionStatus::Idle,
                route: None,
                snapshot: None,
                accumulator: None,
            }),
        }
    }

    pub fn with_alerts(mut self, alerts: AlertConfig) -> Self {
        self.history = AlertHistory::new(alerts.cooldown_ms);
        self.evaluator = HazardEvaluator::new(alerts);
        self
    }

    pub fn with_learning(mut self, learning: LearningConfig) -> Self {
        self.learning = learning;
        self
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> SessionStatus {
        self.lock().status
    }

    pub fn route(&self) -> Option<RouteCandidate> {
        self.lock().route.clone()
    }

    /// Number of hazards captured at start.
    pub fn snapshot_len(&self) -> usize {
        self.lock().snapshot.as_ref().map_or(0, HazardSnapshot::len)
    }

    /// Begin navigating `route`. Only valid while Idle.
    pub fn start(&self, route: RouteCandidate) -> Result<()> {
        let mut state = self.lock();
        if state.status != SessionStatus::Idle {
            return Err(RouteIntelError::InvalidState {
                operation: "start".to_string(),
                state: state.status.to_string(),
            });
        }
        let corridor = BoundingBox::from_points(&route.waypoints)
            .ok_or_else(|| RouteIntelError::InvalidRoute {
                route_id: route.id.clone(),
                message: "route has no waypoints".to_string(),
            })?
            .expand(self.config.bbox_margin_m);

        let records = self.catalog.query_bounding_box(&corridor);
        let alerts = self.evaluator.config();
        let snapshot = HazardSnapshot::new(corridor, records, &|h: &Hazard| alerts.warning_distance(h));

        let accumulator = RouteLearningAccumulator::new(
            format!("learned-{}-{}", self.id, now_millis()),
            route.kind,
            self.learning.clone(),
        )
        .with_target(route.destination, self.store.config().endpoint_match_radius_m);

        info!(
            "[NavigationSession] {} started on {} with {} hazards in corridor",
            self.id,
            route.id,
            snapshot.len()
        );

        self.history.clear();
        state.route = Some(route);
        state.snapshot = Some(snapshot);
        state.accumulator = Some(accumulator);
        state.status = SessionStatus::Active;
        Ok(())
    }

    /// Feed one position update. Returns the alerts to present, or nothing
    /// when the session is not active.
    pub fn on_position(&self, point: GeoPoint, speed_kph: f64, timestamp_ms: i64) -> Vec<Alert> {
        let mut state = self.lock();
        if state.status != SessionStatus::Active {
            return Vec::new();
        }
        if let Some(acc) = state.accumulator.as_mut() {
            acc.record(point, timestamp_ms, speed_kph / 3.6);
        }
        match state.snapshot.as_ref() {
            Some(snapshot) => {
                self.evaluator
                    .evaluate(&point, speed_kph, timestamp_ms, snapshot, &self.history)
            }
            None => Vec::new(),
        }
    }

    /// End the session, learn the trip and merge it into the route store.
    ///
    /// Returns the stored candidate, or `None` when nothing was learned or
    /// the store turned the trip away. Calling `stop` again is a no-op
    /// returning `None`.
    pub fn stop(&self) -> Option<RouteCandidate> {
        let mut state = self.lock();
        match state.status {
            SessionStatus::Completed => return None,
            SessionStatus::Idle => {
                debug!("[NavigationSession] {} stopped before starting", self.id);
                state.status = SessionStatus::Completed;
                return None;
            }
            SessionStatus::Active => {}
        }
        state.status = SessionStatus::Completed;
        state.snapshot = None;

        let learned = state.accumulator.take().and_then(RouteLearningAccumulator::finish);
        let Some(candidate) = learned else {
            info!("[NavigationSession] {} completed, nothing learned", self.id);
            return None;
        };

        match self.store.merge(candidate) {
            Ok(MergeOutcome::Rejected(rejected)) => {
                info!(
                    "[NavigationSession] {} completed, route {} not kept (bucket full)",
                    self.id, rejected.id
                );
                None
            }
            Ok(outcome) => {
                let merged = outcome.into_candidate();
                info!(
                    "[NavigationSession] {} completed, route {} now used {} times",
                    self.id, merged.id, merged.usage_count
                );
                Some(merged)
            }
            Err(e) => {
                warn!("[NavigationSession] {} could not merge learned route: {}", self.id, e);
                None
            }
        }
    }

    /// Distance left along the route from the waypoint nearest to `point`.
    pub fn remaining_distance(&self, point: &GeoPoint) -> Option<f64> {
        let state = self.lock();
        let waypoints = &state.route.as_ref()?.waypoints;
        let (nearest, gap) = waypoints
            .iter()
            .enumerate()
            .map(|(i, w)| (i, point.distance_to(w)))
            .min_by(|a, b| a.1.total_cmp(&b.1))?;
        Some(gap + polyline_length(&waypoints[nearest..]))
    }

    /// Pull fixes from `source` until it runs dry or the session ends,
    /// handing each non-empty batch of alerts to `sink`. Returns the number
    /// of fixes processed.
    pub fn drive(
        &self,
        source: &mut dyn PositionSource,
        mut sink: impl FnMut(&[Alert]),
    ) -> usize {
        let mut processed = 0;
        while self.status() == SessionStatus::Active {
            let Some(fix) = source.next_fix() else {
                break;
            };
            let alerts = self.on_position(fix.point, fix.speed_kph, fix.timestamp_ms);
            processed += 1;
            if !alerts.is_empty() {
                sink(&alerts);
            }
        }
        debug!("[NavigationSession] {} drove {} fixes", self.id, processed);
        processed
    }
}
