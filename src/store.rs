//! Learned-route cache.
//!
//! Candidates are bucketed by `(origin cell, destination cell, kind)`. A
//! bucket is only an index: two trips between the same places can start on
//! either side of a cell boundary, so lookups and merges search the buckets
//! whose cells lie within the endpoint-match radius and then confirm with a
//! true distance check on both endpoints.
//!
//! A second index lists, per origin cell and kind, the destination cells
//! that hold candidates. Lookups walk the origin neighborhood only and pick
//! the destination cells from that list, so the cost stays proportional to
//! the number of origin cells even on a fine grid.
//!
//! Candidate ids are unique within a store. An inserted trip whose id is
//! already taken gets a numeric suffix.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::grid::{CellId, GeoIndex};
use crate::persistence::RecordSink;
use crate::shard::{ShardedMap, DEFAULT_SHARDS};
use crate::{now_millis, GeoPoint, Result, RouteCandidate, RouteKind};

/// Configuration for the route cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteStoreConfig {
    /// Two endpoints closer than this are the same place.
    /// Default: 500.0 meters
    pub endpoint_match_radius_m: f64,

    /// Candidates kept per bucket; the lowest-scoring one is evicted beyond this.
    /// Default: 5
    pub max_candidates_per_key: usize,

    /// Confidence gained each time a trip confirms a candidate.
    /// Default: 0.1
    pub confidence_step: f64,

    /// Number of lock shards.
    /// Default: 16
    pub shard_count: usize,
}

impl Default for RouteStoreConfig {
    fn default() -> Self {
        Self {
            endpoint_match_radius_m: 500.0,
            max_candidates_per_key: 5,
            confidence_step: 0.1,
            shard_count: DEFAULT_SHARDS,
        }
    }
}

/// Bucket key of the route cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RouteKey {
    pub origin_cell: CellId,
    pub destination_cell: CellId,
    pub kind: RouteKind,
}

/// What a merge did with the observed trip.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    /// An existing candidate was confirmed; holds its updated state
    Reinforced(RouteCandidate),
    /// No matching candidate existed; holds the stored copy
    Inserted(RouteCandidate),
    /// No matching candidate existed and the bucket was full of better
    /// candidates; nothing was stored
    Rejected(RouteCandidate),
}

impl MergeOutcome {
    pub fn candidate(&self) -> &RouteCandidate {
        match self {
            MergeOutcome::Reinforced(c)
            | MergeOutcome::Inserted(c)
            | MergeOutcome::Rejected(c) => c,
        }
    }

    /// Whether the candidate is in the store after the merge.
    pub fn is_stored(&self) -> bool {
        !matches!(self, MergeOutcome::Rejected(_))
    }

    pub fn into_candidate(self) -> RouteCandidate {
        match self {
            MergeOutcome::Reinforced(c)
            | MergeOutcome::Inserted(c)
            | MergeOutcome::Rejected(c) => c,
        }
    }
}

pub struct RouteStore {
    grid: GeoIndex,
    config: RouteStoreConfig,
    buckets: ShardedMap<RouteKey, Vec<RouteCandidate>>,
    /// Destination cells holding candidates, per origin cell and kind
    destinations: ShardedMap<(CellId, RouteKind), Vec<CellId>>,
    /// Writer gate; guards the set of stored ids
    ids: Mutex<HashSet<String>>,
    sink: Option<Arc<dyn RecordSink>>,
}

impl std::fmt::Debug for RouteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteStore")
            .field("config", &self.config)
            .field("len", &self.len())
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}

/// Ranking used by lookups and eviction: score, then recency.
fn rank(c: &RouteCandidate) -> (f64, i64) {
    (c.score(), c.last_used_at)
}

fn outranks(a: &RouteCandidate, b: &RouteCandidate) -> bool {
    let (sa, ta) = rank(a);
    let (sb, tb) = rank(b);
    sa > sb || (sa == sb && ta > tb)
}

impl RouteStore {
    pub fn new(grid: GeoIndex, config: RouteStoreConfig) -> Self {
        let buckets = ShardedMap::new(config.shard_count);
        let destinations = ShardedMap::new(config.shard_count);
        Self {
            grid,
            config,
            buckets,
            destinations,
            ids: Mutex::new(HashSet::new()),
            sink: None,
        }
    }

    /// Notify `sink` of every saved or evicted candidate from now on.
    pub fn with_sink(mut self, sink: Arc<dyn RecordSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(&self) -> &RouteStoreConfig {
        &self.config
    }

    fn write_gate(&self) -> MutexGuard<'_, HashSet<String>> {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bucket a candidate is stored under.
    pub fn key_for(&self, origin: &GeoPoint, destination: &GeoPoint, kind: RouteKind) -> RouteKey {
        RouteKey {
            origin_cell: self.grid.cell_id(origin),
            destination_cell: self.grid.cell_id(destination),
            kind,
        }
    }

    /// Every non-empty bucket that may hold a candidate matching these
    /// endpoints.
    fn candidate_keys(&self, origin: &GeoPoint, destination: &GeoPoint, kind: RouteKind) -> Vec<RouteKey> {
        let radius = self.config.endpoint_match_radius_m;
        let mut keys = Vec::new();
        for origin_cell in self.grid.neighbor_cells(origin, radius) {
            self.destinations.read(&(origin_cell, kind), |cells| {
                for &destination_cell in cells.into_iter().flatten() {
                    if self.grid.cell_within(destination_cell, destination, radius) {
                        keys.push(RouteKey {
                            origin_cell,
                            destination_cell,
                            kind,
                        });
                    }
                }
            });
        }
        keys
    }

    /// Best cached route between two places, if any.
    ///
    /// Highest `usage_count * success_rate` wins; ties go to the most
    /// recently used candidate.
    pub fn lookup(
        &self,
        origin: &GeoPoint,
        destination: &GeoPoint,
        kind: RouteKind,
    ) -> Option<RouteCandidate> {
        if !origin.is_valid() || !destination.is_valid() {
            return None;
        }
        let radius = self.config.endpoint_match_radius_m;
        let mut best: Option<RouteCandidate> = None;

        for key in self.candidate_keys(origin, destination, kind) {
            self.buckets.read(&key, |bucket| {
                for c in bucket.into_iter().flatten() {
                    if !c.endpoints_match(origin, destination, radius) {
                        continue;
                    }
                    if best.as_ref().map_or(true, |b| outranks(c, b)) {
                        best = Some(c.clone());
                    }
                }
            });
        }
        best
    }

    /// Merge an observed trip at the current time.
    pub fn merge(&self, observed: RouteCandidate) -> Result<MergeOutcome> {
        self.merge_at(observed, now_millis())
    }

    /// Merge an observed trip into the cache.
    ///
    /// A stored candidate of the same kind whose endpoints both lie within
    /// the match radius is reinforced; otherwise the trip is inserted with a
    /// usage count of one. When the bucket is already full of candidates
    /// that outrank the trip, it is not stored and the outcome is
    /// [`MergeOutcome::Rejected`].
    pub fn merge_at(&self, observed: RouteCandidate, now_ms: i64) -> Result<MergeOutcome> {
        let radius = self.config.endpoint_match_radius_m;
        observed.validate(radius)?;

        let mut ids = self.write_gate();

        if let Some((key, id)) = self.find_match(&observed) {
            let step = self.config.confidence_step;
            let updated = self.buckets.write(key, Vec::is_empty, |bucket| {
                let existing = bucket.iter_mut().find(|c| c.id == id)?;
                existing.usage_count = existing.usage_count.saturating_add(1);
                existing.duration_seconds =
                    (existing.duration_seconds + observed.duration_seconds) / 2.0;
                existing.success_rate =
                    ((existing.success_rate + observed.success_rate) / 2.0).clamp(0.0, 1.0);
                existing.confidence = (existing.confidence + step).min(1.0);
                existing.last_used_at = now_ms;
                Some(existing.clone())
            });

            if let Some(candidate) = updated {
                debug!(
                    "[RouteStore] Reinforced {} (usage {}, success {:.2})",
                    candidate.id, candidate.usage_count, candidate.success_rate
                );
                self.notify_saved(&candidate);
                return Ok(MergeOutcome::Reinforced(candidate));
            }
        }

        let mut candidate = observed;
        candidate.usage_count = 1;
        candidate.last_used_at = now_ms;
        candidate.id = unused_id(&ids, candidate.id);
        let key = self.key_for(&candidate.origin, &candidate.destination, candidate.kind);

        match self.push_capped(&mut ids, key, candidate.clone()) {
            Some(evicted) if evicted.id == candidate.id => {
                debug!(
                    "[RouteStore] Rejected {} (score {:.2}), bucket {:?} is full",
                    candidate.id,
                    candidate.score(),
                    key
                );
                Ok(MergeOutcome::Rejected(candidate))
            }
            evicted => {
                debug!("[RouteStore] Inserted {} under {:?}", candidate.id, key);
                self.notify_saved(&candidate);
                if let Some(evicted) = evicted {
                    self.notify_evicted(&evicted);
                }
                Ok(MergeOutcome::Inserted(candidate))
            }
        }
    }

    /// Restore candidates saved by a previous run without merge semantics.
    pub fn load(&self, candidates: Vec<RouteCandidate>) -> usize {
        let radius = self.config.endpoint_match_radius_m;
        let mut ids = self.write_gate();
        let mut loaded = 0;
        for candidate in candidates {
            if let Err(e) = candidate.validate(radius) {
                warn!("[RouteStore] Skipping stored route {}: {}", candidate.id, e);
                continue;
            }
            if ids.contains(&candidate.id) {
                warn!("[RouteStore] Skipping duplicate stored route {}", candidate.id);
                continue;
            }
            let key = self.key_for(&candidate.origin, &candidate.destination, candidate.kind);
            if let Some(evicted) = self.push_capped(&mut ids, key, candidate) {
                self.notify_evicted(&evicted);
            }
            loaded += 1;
        }
        info!("[RouteStore] Loaded {} routes", loaded);
        loaded
    }

    /// Closest stored candidate the observed trip confirms.
    fn find_match(&self, observed: &RouteCandidate) -> Option<(RouteKey, String)> {
        let radius = self.config.endpoint_match_radius_m;
        let mut best: Option<(RouteKey, String, f64)> = None;
        for key in self.candidate_keys(&observed.origin, &observed.destination, observed.kind) {
            self.buckets.read(&key, |bucket| {
                for c in bucket.into_iter().flatten() {
                    if !c.endpoints_match(&observed.origin, &observed.destination, radius) {
                        continue;
                    }
                    let d = c.origin.distance_to(&observed.origin)
                        + c.destination.distance_to(&observed.destination);
                    if best.as_ref().map_or(true, |(_, _, bd)| d < *bd) {
                        best = Some((key, c.id.clone(), d));
                    }
                }
            });
        }
        best.map(|(key, id, _)| (key, id))
    }

    /// Add a candidate to its bucket and return whichever candidate the cap
    /// pushed out, possibly the new one. Takes the writer gate's id set.
    fn push_capped(
        &self,
        ids: &mut HashSet<String>,
        key: RouteKey,
        candidate: RouteCandidate,
    ) -> Option<RouteCandidate> {
        let cap = self.config.max_candidates_per_key.max(1);
        ids.insert(candidate.id.clone());
        self.destinations
            .write((key.origin_cell, key.kind), Vec::is_empty, |cells| {
                if !cells.contains(&key.destination_cell) {
                    cells.push(key.destination_cell);
                }
            });
        let evicted = self.buckets.write(key, Vec::is_empty, |bucket| {
            bucket.push(candidate);
            if bucket.len() <= cap {
                return None;
            }
            let worst = (0..bucket.len()).min_by(|&a, &b| {
                let (sa, ta) = rank(&bucket[a]);
                let (sb, tb) = rank(&bucket[b]);
                sa.total_cmp(&sb).then(ta.cmp(&tb))
            })?;
            Some(bucket.swap_remove(worst))
        });
        if let Some(evicted) = &evicted {
            ids.remove(&evicted.id);
        }
        evicted
    }

    fn notify_evicted(&self, evicted: &RouteCandidate) {
        debug!("[RouteStore] Evicted {} (score {:.2})", evicted.id, evicted.score());
        if let Some(sink) = &self.sink {
            if let Err(e) = sink.route_evicted(&evicted.id) {
                warn!("[RouteStore] Sink failed to evict {}: {}", evicted.id, e);
            }
        }
    }

    fn notify_saved(&self, candidate: &RouteCandidate) {
        if let Some(sink) = &self.sink {
            if let Err(e) = sink.route_saved(candidate) {
                warn!("[RouteStore] Sink failed to save {}: {}", candidate.id, e);
            }
        }
    }

    /// Number of stored candidates.
    pub fn len(&self) -> usize {
        let mut total = 0;
        self.buckets.for_each(|_, bucket| total += bucket.len());
        total
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of non-empty buckets.
    pub fn key_count(&self) -> usize {
        self.buckets.key_count()
    }

    pub fn all_candidates(&self) -> Vec<RouteCandidate> {
        let mut out = Vec::new();
        self.buckets
            .for_each(|_, bucket| out.extend(bucket.iter().cloned()));
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    pub fn clear(&self) {
        let mut ids = self.write_gate();
        self.buckets.clear();
        self.destinations.clear();
        ids.clear();
    }
}

/// `id`, or `id-2`, `id-3`, ... when it is already taken.
fn unused_id(ids: &HashSet<String>, id: String) -> String {
    if !ids.contains(&id) {
        return id;
    }
    let mut n = 2u64;
    loop {
        let candidate = format!("{}-{}", id, n);
        if !ids.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_utils::offset_point;
    use crate::grid::GridConfig;
    use std::thread;

    fn store() -> RouteStore {
        RouteStore::new(GeoIndex::new(GridConfig::default()), RouteStoreConfig::default())
    }

    fn trip(id: &str, origin: GeoPoint, destination: GeoPoint, success: f64) -> RouteCandidate {
        RouteCandidate {
            id: id.to_string(),
            origin,
            destination,
            waypoints: vec![origin, destination],
            distance_meters: origin.distance_to(&destination),
            duration_seconds: 300.0,
            kind: RouteKind::Driving,
            confidence: 0.5,
            usage_count: 1,
            success_rate: success,
            last_used_at: 0,
        }
    }

    fn home() -> GeoPoint {
        GeoPoint::new(35.700, 51.400)
    }

    fn work() -> GeoPoint {
        GeoPoint::new(35.710, 51.410)
    }

    #[test]
    fn test_lookup_empty() {
        let store = store();
        assert!(store.lookup(&home(), &work(), RouteKind::Driving).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_merge_inserts_then_reinforces() {
        let store = store();
        let first = store.merge_at(trip("a", home(), work(), 1.0), 1_000).unwrap();
        assert!(matches!(first, MergeOutcome::Inserted(_)));

        let mut second = trip("b", home(), work(), 0.0);
        second.duration_seconds = 500.0;
        let outcome = store.merge_at(second, 2_000).unwrap();
        let merged = match outcome {
            MergeOutcome::Reinforced(c) => c,
            other => panic!("expected reinforcement, got {:?}", other),
        };
        assert_eq!(merged.id, "a");
        assert_eq!(merged.usage_count, 2);
        assert_eq!(merged.duration_seconds, 400.0);
        assert_eq!(merged.success_rate, 0.5);
        assert!((merged.confidence - 0.6).abs() < 1e-9);
        assert_eq!(merged.last_used_at, 2_000);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_merge_rejects_invalid() {
        let store = store();
        let mut bad = trip("bad", home(), work(), 1.0);
        bad.success_rate = 1.5;
        assert!(store.merge(bad).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_kinds_are_separate() {
        let store = store();
        store.merge(trip("a", home(), work(), 1.0)).unwrap();
        assert!(store.lookup(&home(), &work(), RouteKind::Walking).is_none());
        assert!(store.lookup(&home(), &work(), RouteKind::Driving).is_some());
    }

    #[test]
    fn test_lookup_across_cell_boundary() {
        let store = store();
        // Origins 60m apart on opposite sides of a row boundary
        let south = GeoPoint::new(35.70475, 51.4025);
        let north = offset_point(&south, 0.0, 60.0);
        assert_ne!(store.key_for(&south, &work(), RouteKind::Driving), store.key_for(&north, &work(), RouteKind::Driving));

        store.merge(trip("a", south, work(), 1.0)).unwrap();
        let hit = store.lookup(&north, &work(), RouteKind::Driving).unwrap();
        assert_eq!(hit.id, "a");

        // And the second trip reinforces instead of inserting
        let outcome = store.merge(trip("b", north, work(), 1.0)).unwrap();
        assert!(matches!(outcome, MergeOutcome::Reinforced(_)));
    }

    #[test]
    fn test_lookup_radius_is_authoritative() {
        let store = store();
        store.merge(trip("a", home(), work(), 1.0)).unwrap();
        let far = offset_point(&home(), 0.0, -700.0);
        assert!(store.lookup(&far, &work(), RouteKind::Driving).is_none());
    }

    #[test]
    fn test_lookup_prefers_score_then_recency() {
        let store = store();
        let via = offset_point(&home(), 200.0, 0.0);
        store.load(vec![
            RouteCandidate { usage_count: 3, success_rate: 0.5, last_used_at: 10, ..trip("low", home(), work(), 0.5) },
            RouteCandidate { usage_count: 2, success_rate: 1.0, last_used_at: 5, ..trip("old", via, work(), 1.0) },
            RouteCandidate { usage_count: 2, success_rate: 1.0, last_used_at: 20, ..trip("new", home(), work(), 1.0) },
        ]);
        let best = store.lookup(&home(), &work(), RouteKind::Driving).unwrap();
        assert_eq!(best.id, "new");
    }

    #[test]
    fn test_cap_evicts_lowest_score() {
        let store = RouteStore::new(
            GeoIndex::new(GridConfig::default()),
            RouteStoreConfig {
                max_candidates_per_key: 2,
                ..RouteStoreConfig::default()
            },
        );
        store.load(vec![
            RouteCandidate { usage_count: 5, ..trip("keep", home(), work(), 1.0) },
            RouteCandidate { usage_count: 1, last_used_at: 1, ..trip("drop", home(), work(), 1.0) },
            RouteCandidate { usage_count: 3, ..trip("also", home(), work(), 1.0) },
        ]);
        let ids: Vec<String> = store.all_candidates().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["also".to_string(), "keep".to_string()]);
        assert_eq!(store.key_count(), 1);
    }

    #[test]
    fn test_concurrent_merges_count_every_trip() {
        let store = Arc::new(store());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    store
                        .merge(trip(&format!("t{}", i), home(), work(), 1.0))
                        .unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.len(), 1);
        let c = store.lookup(&home(), &work(), RouteKind::Driving).unwrap();
        assert_eq!(c.usage_count, 8);
        assert!((0.0..=1.0).contains(&c.success_rate));
        assert!(c.confidence <= 1.0);
    }

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<String>>,
    }

    impl RecordingSink {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    impl RecordSink for RecordingSink {
        fn route_saved(&self, candidate: &RouteCandidate) -> Result<()> {
            self.events.lock().unwrap().push(format!("saved {}", candidate.id));
            Ok(())
        }

        fn route_evicted(&self, route_id: &str) -> Result<()> {
            self.events.lock().unwrap().push(format!("evicted {}", route_id));
            Ok(())
        }

        fn hazard_saved(&self, _record: &crate::hazards::HazardRecord) -> Result<()> {
            Ok(())
        }

        fn hazard_removed(&self, _id: &crate::hazards::HazardId) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_taken_id_gets_suffix() {
        let store = store();
        let far_home = offset_point(&home(), 0.0, -14_000.0);
        let far_work = offset_point(&work(), 0.0, -14_000.0);

        let first = store.merge_at(trip("learned-session-1", home(), work(), 1.0), 1_000).unwrap();
        let second = store
            .merge_at(trip("learned-session-1", far_home, far_work, 1.0), 2_000)
            .unwrap();
        let third = store
            .merge_at(trip("learned-session-1", far_work, far_home, 1.0), 3_000)
            .unwrap();

        assert_eq!(first.candidate().id, "learned-session-1");
        assert_eq!(second.candidate().id, "learned-session-1-2");
        assert_eq!(third.candidate().id, "learned-session-1-3");
        assert_eq!(store.len(), 3);
        assert_eq!(store.lookup(&home(), &work(), RouteKind::Driving).unwrap().id, "learned-session-1");
    }

    #[test]
    fn test_full_bucket_rejects_weaker_trip() {
        // Endpoints share cells but sit more than 100m apart, so nothing merges
        let a = GeoPoint::new(35.7010, 51.4010);
        let b = GeoPoint::new(35.7040, 51.4010);
        let e = GeoPoint::new(35.7025, 51.4010);
        let c = GeoPoint::new(35.7110, 51.4110);
        let d = GeoPoint::new(35.7140, 51.4110);
        let f = GeoPoint::new(35.7125, 51.4110);

        let sink = Arc::new(RecordingSink::default());
        let store = RouteStore::new(
            GeoIndex::new(GridConfig::default()),
            RouteStoreConfig {
                endpoint_match_radius_m: 100.0,
                max_candidates_per_key: 2,
                ..RouteStoreConfig::default()
            },
        )
        .with_sink(sink.clone());
        store.load(vec![
            RouteCandidate { usage_count: 5, ..trip("keep", a, c, 1.0) },
            RouteCandidate { usage_count: 1, ..trip("poor", a, c, 0.2) },
        ]);
        assert!(sink.events().is_empty());

        // Outranks "poor", which makes room
        let fresh = store.merge_at(trip("fresh", b, d, 1.0), 1_000).unwrap();
        assert!(matches!(fresh, MergeOutcome::Inserted(_)));
        assert_eq!(sink.events(), vec!["saved fresh".to_string(), "evicted poor".to_string()]);

        // Ranks below everything in the full bucket
        let weak = store.merge_at(trip("weak", e, f, 0.5), 2_000).unwrap();
        assert!(matches!(weak, MergeOutcome::Rejected(_)));
        assert!(!weak.is_stored());
        assert_eq!(sink.events().len(), 2);
        assert!(store.lookup(&e, &f, RouteKind::Driving).is_none());

        let ids: Vec<String> = store.all_candidates().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["fresh".to_string(), "keep".to_string()]);
    }

    #[test]
    fn test_fine_grid_searches_only_occupied_buckets() {
        // ~22m cells: a 500m radius touches thousands of cells per endpoint
        let store = RouteStore::new(
            GeoIndex::new(GridConfig {
                cell_size_degrees: 0.0002,
                ..GridConfig::default()
            }),
            RouteStoreConfig::default(),
        );
        assert!(store.candidate_keys(&home(), &work(), RouteKind::Driving).is_empty());

        store.merge(trip("a", home(), work(), 1.0)).unwrap();
        let near_home = offset_point(&home(), 120.0, 80.0);
        let near_work = offset_point(&work(), -90.0, 40.0);
        assert_eq!(store.candidate_keys(&near_home, &near_work, RouteKind::Driving).len(), 1);
        assert_eq!(store.lookup(&near_home, &near_work, RouteKind::Driving).unwrap().id, "a");

        let outcome = store.merge(trip("b", near_home, near_work, 1.0)).unwrap();
        assert!(matches!(outcome, MergeOutcome::Reinforced(_)));
    }
}
