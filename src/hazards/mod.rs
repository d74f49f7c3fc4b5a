//! Hazard catalog: the shared, mutable, spatially bucketed store of hazards.
//!
//! Records live in grid cells spread over independent `RwLock` shards.
//! Readers only take shard read locks. Writers (insert, update, remove)
//! additionally pass through a single writer gate so the "is there already a
//! hazard within 50m?" check and the write that follows are atomic with
//! respect to other writers.

mod snapshot;
mod types;

pub use snapshot::{HazardSnapshot, Partition};
pub use types::{
    BumpSeverity, CameraKind, ConditionKind, ConditionSeverity, Hazard, HazardId, HazardKind,
    HazardRecord, RoadCondition, SpeedBump, SpeedCamera, TrafficCell, TrafficLevel,
};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::error::OptionExt;
use crate::grid::{CellId, GeoIndex};
use crate::persistence::RecordSink;
use crate::shard::{ShardedMap, DEFAULT_SHARDS};
use crate::{now_millis, BoundingBox, GeoPoint, Result, RouteIntelError};

/// Configuration for the hazard catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HazardConfig {
    /// Reports of a compatible hazard closer than this are merged into the
    /// existing record instead of creating a new one.
    /// Default: 50.0 meters
    pub coalesce_radius_m: f64,

    /// Number of lock shards.
    /// Default: 16
    pub shard_count: usize,
}

impl Default for HazardConfig {
    fn default() -> Self {
        Self {
            coalesce_radius_m: 50.0,
            shard_count: DEFAULT_SHARDS,
        }
    }
}

pub struct HazardCatalog {
    grid: GeoIndex,
    config: HazardConfig,
    cells: ShardedMap<CellId, Vec<HazardRecord>>,
    /// Cell currently holding each id
    locations: RwLock<HashMap<HazardId, CellId>>,
    write_gate: Mutex<()>,
    next_seq: AtomicU64,
    sink: Option<Arc<dyn RecordSink>>,
}

impl std::fmt::Debug for HazardCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HazardCatalog")
            .field("config", &self.config)
            .field("len", &self.len())
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}

impl HazardCatalog {
    pub fn new(grid: GeoIndex, config: HazardConfig) -> Self {
        let cells = ShardedMap::new(config.shard_count);
        Self {
            grid,
            config,
            cells,
            locations: RwLock::new(HashMap::new()),
            write_gate: Mutex::new(()),
            next_seq: AtomicU64::new(1),
            sink: None,
        }
    }

    /// Notify `sink` of every stored or removed record from now on.
    pub fn with_sink(mut self, sink: Arc<dyn RecordSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn grid(&self) -> &GeoIndex {
        &self.grid
    }

    pub fn config(&self) -> &HazardConfig {
        &self.config
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Validate and store a hazard.
    ///
    /// A compatible hazard within the coalescing radius (or, for traffic, in
    /// the same cell) is updated in place and keeps its id.
    pub fn insert(&self, hazard: Hazard) -> Result<HazardId> {
        hazard.validate(&self.grid)?;
        let _gate = self.write_gate.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.upsert_locked(hazard))
    }

    /// Replace the record stored under `id`. The kind can't change.
    pub fn update(&self, id: HazardId, hazard: Hazard) -> Result<()> {
        if hazard.kind() != id.kind {
            return Err(RouteIntelError::IncompatibleHazard {
                id: id.to_string(),
                message: format!("cannot change {} into {}", id.kind, hazard.kind()),
            });
        }
        hazard.validate(&self.grid)?;

        let _gate = self.write_gate.lock().unwrap_or_else(PoisonError::into_inner);
        let old_cell = self.cell_of(&id).ok_or_unknown_hazard(&id.to_string())?;
        self.replace_locked(id, old_cell, hazard);
        Ok(())
    }

    /// Delete a record, returning it if it existed.
    pub fn remove(&self, id: &HazardId) -> Option<HazardRecord> {
        let _gate = self.write_gate.lock().unwrap_or_else(PoisonError::into_inner);
        let cell = self.cell_of(id)?;
        let removed = self.cells.write(cell, Vec::is_empty, |records| {
            let pos = records.iter().position(|r| r.id == *id)?;
            Some(records.swap_remove(pos))
        });
        self.locations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);

        if removed.is_some() {
            debug!("[HazardCatalog] Removed {}", id);
            if let Some(sink) = &self.sink {
                if let Err(e) = sink.hazard_removed(id) {
                    warn!("[HazardCatalog] Sink failed to remove {}: {}", id, e);
                }
            }
        }
        removed
    }

    /// Set the congestion level of the traffic cell covering `point` for one
    /// hour, creating the cell (all other hours Low) if needed.
    pub fn record_traffic_level(
        &self,
        point: GeoPoint,
        hour: u32,
        level: TrafficLevel,
    ) -> Result<HazardId> {
        if hour >= 24 {
            return Err(RouteIntelError::InvalidHazard {
                message: format!("hour {} out of range 0-23", hour),
            });
        }
        point.validated()?;

        let _gate = self.write_gate.lock().unwrap_or_else(PoisonError::into_inner);
        let mut cell = self
            .traffic_cell(&point)
            .unwrap_or_else(|| TrafficCell::uniform(&self.grid, &point, TrafficLevel::Low));
        cell.hourly_levels[hour as usize] = level;
        Ok(self.upsert_locked(Hazard::Traffic(cell)))
    }

    /// Restore records saved by a previous run. Invalid records are skipped
    /// and no sink is notified.
    pub fn load(&self, records: Vec<HazardRecord>) -> usize {
        let _gate = self.write_gate.lock().unwrap_or_else(PoisonError::into_inner);
        let mut loaded = 0;
        for record in records {
            if let Err(e) = record.hazard.validate(&self.grid) {
                warn!("[HazardCatalog] Skipping stored hazard {}: {}", record.id, e);
                continue;
            }
            if record.hazard.kind() != record.id.kind || self.cell_of(&record.id).is_some() {
                warn!("[HazardCatalog] Skipping inconsistent stored hazard {}", record.id);
                continue;
            }
            self.next_seq.fetch_max(record.id.seq + 1, Ordering::SeqCst);
            self.place(record);
            loaded += 1;
        }
        info!("[HazardCatalog] Loaded {} hazards", loaded);
        loaded
    }

    /// Must be called with the writer gate held.
    fn upsert_locked(&self, hazard: Hazard) -> HazardId {
        if let Some((id, cell)) = self.coalesce_target(&hazard) {
            debug!("[HazardCatalog] Coalesced report into {}", id);
            self.replace_locked(id, cell, hazard);
            return id;
        }

        let id = HazardId::new(hazard.kind(), self.next_seq.fetch_add(1, Ordering::SeqCst));
        let record = HazardRecord {
            id,
            hazard,
            updated_at: now_millis(),
        };
        self.notify_saved(&record);
        self.place(record);
        debug!("[HazardCatalog] Inserted {}", id);
        id
    }

    /// Must be called with the writer gate held.
    fn replace_locked(&self, id: HazardId, old_cell: CellId, hazard: Hazard) {
        let record = HazardRecord {
            id,
            hazard,
            updated_at: now_millis(),
        };
        self.notify_saved(&record);

        let new_cell = self.grid.cell_id(&record.hazard.location());
        if new_cell == old_cell {
            self.cells.write(old_cell, Vec::is_empty, |records| {
                match records.iter_mut().find(|r| r.id == id) {
                    Some(slot) => *slot = record,
                    None => records.push(record),
                }
            });
            return;
        }

        // Moved to another cell: publish the new copy before dropping the old
        // one so readers never miss the hazard. Queries dedupe by id.
        self.place(record);
        self.cells.write(old_cell, Vec::is_empty, |records| {
            records.retain(|r| r.id != id);
        });
    }

    fn place(&self, record: HazardRecord) {
        let cell = self.grid.cell_id(&record.hazard.location());
        let id = record.id;
        self.cells
            .write(cell, Vec::is_empty, |records| records.push(record));
        self.locations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, cell);
    }

    fn notify_saved(&self, record: &HazardRecord) {
        if let Some(sink) = &self.sink {
            if let Err(e) = sink.hazard_saved(record) {
                warn!("[HazardCatalog] Sink failed to save {}: {}", record.id, e);
            }
        }
    }

    /// Existing record a new report should merge into, with its cell.
    fn coalesce_target(&self, hazard: &Hazard) -> Option<(HazardId, CellId)> {
        if let Hazard::Traffic(cell) = hazard {
            let key = cell.area_key;
            return self.cells.read(&key, |records| {
                records?
                    .iter()
                    .find(|r| r.hazard.is_compatible_with(hazard))
                    .map(|r| (r.id, key))
            });
        }

        let radius = self.config.coalesce_radius_m;
        if radius <= 0.0 {
            return None;
        }
        let location = hazard.location();
        let mut best: Option<(HazardId, CellId, f64)> = None;
        for cell in self.grid.neighbor_cells(&location, radius) {
            self.cells.read(&cell, |records| {
                for r in records.into_iter().flatten() {
                    if !r.hazard.is_compatible_with(hazard) {
                        continue;
                    }
                    let d = location.distance_to(&r.hazard.location());
                    if d <= radius && best.map_or(true, |(_, _, bd)| d < bd) {
                        best = Some((r.id, cell, d));
                    }
                }
            });
        }
        best.map(|(id, cell, _)| (id, cell))
    }

    fn cell_of(&self, id: &HazardId) -> Option<CellId> {
        self.locations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .copied()
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn get(&self, id: &HazardId) -> Option<HazardRecord> {
        let cell = self.cell_of(id)?;
        self.cells
            .read(&cell, |records| records?.iter().find(|r| r.id == *id).cloned())
    }

    pub fn len(&self) -> usize {
        self.locations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn all_records(&self) -> Vec<HazardRecord> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        self.cells.for_each(|_, records| {
            for r in records {
                if seen.insert(r.id) {
                    out.push(r.clone());
                }
            }
        });
        out.sort_by_key(|r| r.id);
        out
    }

    /// Hazards within `radius_meters` of `point`, nearest first.
    pub fn query_radius(&self, point: &GeoPoint, radius_meters: f64) -> Vec<HazardRecord> {
        if !point.is_valid() || !(radius_meters >= 0.0) {
            return Vec::new();
        }
        let mut seen = HashSet::new();
        let mut found: Vec<(f64, HazardRecord)> = Vec::new();
        for cell in self.grid.neighbor_cells(point, radius_meters) {
            self.cells.read(&cell, |records| {
                for r in records.into_iter().flatten() {
                    let d = point.distance_to(&r.hazard.location());
                    if d <= radius_meters && seen.insert(r.id) {
                        found.push((d, r.clone()));
                    }
                }
            });
        }
        found.sort_by(|a, b| a.0.total_cmp(&b.0));
        found.into_iter().map(|(_, r)| r).collect()
    }

    /// Hazards whose location lies inside `bounds`.
    pub fn query_bounding_box(&self, bounds: &BoundingBox) -> Vec<HazardRecord> {
        let mut seen = HashSet::new();
        let mut found = Vec::new();
        let mut collect = |records: &Vec<HazardRecord>| {
            for r in records {
                if bounds.contains(&r.hazard.location()) && seen.insert(r.id) {
                    found.push(r.clone());
                }
            }
        };

        match self.grid.cells_in_box(bounds) {
            Some(cells) => {
                for cell in cells {
                    self.cells.read(&cell, |records| {
                        if let Some(records) = records {
                            collect(records);
                        }
                    });
                }
            }
            None => {
                debug!("[HazardCatalog] Box too large for cell cover, scanning all cells");
                self.cells.for_each(|_, records| collect(records));
            }
        }
        found
    }

    /// Congestion at `point` for an hour of the day. Low when unknown.
    pub fn traffic_level_at(&self, point: &GeoPoint, hour: u32) -> TrafficLevel {
        self.traffic_cell(point)
            .map(|cell| cell.level_at(hour))
            .unwrap_or(TrafficLevel::Low)
    }

    fn traffic_cell(&self, point: &GeoPoint) -> Option<TrafficCell> {
        let key = self.grid.cell_id(point);
        self.cells.read(&key, |records| {
            records?.iter().find_map(|r| match &r.hazard {
                Hazard::Traffic(cell) if cell.area_key == key => Some(cell.clone()),
                _ => None,
            })
        })
    }
}
