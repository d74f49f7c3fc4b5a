//! Grid-based spatial bucketing.
//!
//! Quantizes latitude/longitude onto a fixed-size degree grid so the hazard
//! catalog and the route store can answer "what is near P" with a handful of
//! hash lookups. The grid is only an index: callers always confirm candidates
//! with a true great-circle distance check.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::geo_utils::{haversine_distance, meters_to_degrees};
use crate::hazards::{TrafficCell, TrafficLevel};
use crate::{BoundingBox, GeoPoint};

/// Configuration for the spatial grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Cell edge length in degrees.
    /// Default: 0.005 (~500m at mid-latitudes)
    pub cell_size_degrees: f64,

    /// Maximum number of cells a bounding-box cover may enumerate before
    /// callers fall back to a full scan.
    /// Default: 4096
    pub max_cells_per_query: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            cell_size_degrees: 0.005,
            max_cells_per_query: 4096,
        }
    }
}

/// Discrete grid cell identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellId {
    pub row: i64,
    pub col: i64,
}

impl CellId {
    pub fn new(row: i64, col: i64) -> Self {
        Self { row, col }
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.row, self.col)
    }
}

/// Pure function over a [`GridConfig`]: point -> cell and radius -> cells.
#[derive(Debug, Clone, Default)]
pub struct GeoIndex {
    config: GridConfig,
}

impl GeoIndex {
    pub fn new(config: GridConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    /// Cell edge length in degrees.
    pub fn cell_size(&self) -> f64 {
        self.config.cell_size_degrees
    }

    /// The cell containing `point`.
    pub fn cell_id(&self, point: &GeoPoint) -> CellId {
        let size = self.cell_size();
        CellId {
            row: (point.latitude / size).floor() as i64,
            col: (point.longitude / size).floor() as i64,
        }
    }

    /// Rectangle covered by a cell.
    pub fn cell_bounds(&self, cell: CellId) -> BoundingBox {
        let size = self.cell_size();
        BoundingBox {
            min_lat: cell.row as f64 * size,
            max_lat: (cell.row + 1) as f64 * size,
            min_lng: cell.col as f64 * size,
            max_lng: (cell.col + 1) as f64 * size,
        }
    }

    /// Center point of a cell.
    pub fn cell_center(&self, cell: CellId) -> GeoPoint {
        self.cell_bounds(cell).center()
    }

    /// Traffic profile for the cell containing `point`, located at the cell
    /// center.
    pub fn traffic_cell(&self, point: &GeoPoint, hourly_levels: [TrafficLevel; 24]) -> TrafficCell {
        TrafficCell::for_point(self, point, hourly_levels)
    }

    /// All cells intersecting the circle of `radius_meters` around `point`.
    ///
    /// The cell containing `point` is always returned. When the radius exceeds
    /// the cell size the result spans several rings.
    pub fn neighbor_cells(&self, point: &GeoPoint, radius_meters: f64) -> Vec<CellId> {
        let center = self.cell_id(point);
        if !(radius_meters > 0.0) {
            return vec![center];
        }

        // Widest longitude span is reached at the pole-ward edge of the circle
        let (dlat, _) = meters_to_degrees(radius_meters, point.latitude);
        let ref_lat = (point.latitude.abs() + dlat).min(89.9);
        let (_, dlng) = meters_to_degrees(radius_meters, ref_lat);

        let size = self.cell_size();
        let row_min = ((point.latitude - dlat) / size).floor() as i64;
        let row_max = ((point.latitude + dlat) / size).floor() as i64;
        let col_min = ((point.longitude - dlng) / size).floor() as i64;
        let col_max = ((point.longitude + dlng) / size).floor() as i64;

        let mut cells = Vec::new();
        for row in row_min..=row_max {
            for col in col_min..=col_max {
                let cell = CellId { row, col };
                if cell == center || self.cell_within(cell, point, radius_meters) {
                    cells.push(cell);
                }
            }
        }
        cells
    }

    /// Whether any part of `cell` lies within `radius_meters` of `point`.
    pub fn cell_within(&self, cell: CellId, point: &GeoPoint, radius_meters: f64) -> bool {
        let bounds = self.cell_bounds(cell);
        let closest = GeoPoint::new(
            point.latitude.clamp(bounds.min_lat, bounds.max_lat),
            point.longitude.clamp(bounds.min_lng, bounds.max_lng),
        );
        haversine_distance(point, &closest) <= radius_meters
    }

    /// Cells covering a bounding box, or `None` when the cover would exceed
    /// `max_cells_per_query` and a full scan is cheaper.
    pub fn cells_in_box(&self, bounds: &BoundingBox) -> Option<Vec<CellId>> {
        let min = self.cell_id(&GeoPoint::new(bounds.min_lat, bounds.min_lng));
        let max = self.cell_id(&GeoPoint::new(bounds.max_lat, bounds.max_lng));

        let rows = (max.row - min.row + 1).max(0) as u64;
        let cols = (max.col - min.col + 1).max(0) as u64;
        if rows.saturating_mul(cols) > self.config.max_cells_per_query as u64 {
            return None;
        }

        let mut cells = Vec::with_capacity((rows * cols) as usize);
        for row in min.row..=max.row {
            for col in min.col..=max.col {
                cells.push(CellId { row, col });
            }
        }
        Some(cells)
    }
}
