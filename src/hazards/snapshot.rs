//! Immutable per-session hazard snapshots.
//!
//! A snapshot copies every hazard inside a route corridor out of the catalog
//! once, then answers proximity queries from R-trees without touching the
//! catalog's locks again. Hazards are split into three partitions so each
//! evaluation pass only walks the records it can alert on.

use rstar::{PointDistance, RTree, RTreeObject, AABB};

use super::types::{Hazard, HazardId, HazardRecord};
use crate::geo_utils::{haversine_distance, meters_to_degrees};
use crate::{BoundingBox, GeoPoint};

/// Slack on the degree radius so a haversine filter never misses a record
/// whose latitude differs slightly from the query point's.
const DEGREE_RADIUS_SLACK: f64 = 1.1;

/// A hazard location with its index into the partition's record list.
#[derive(Debug, Clone, Copy)]
pub(crate) struct IndexedHazard {
    pub idx: usize,
    pub lat: f64,
    pub lng: f64,
}

impl RTreeObject for IndexedHazard {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.lat, self.lng])
    }
}

impl PointDistance for IndexedHazard {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dlat = self.lat - point[0];
        let dlng = self.lng - point[1];
        dlat * dlat + dlng * dlng
    }
}

/// One group of hazards evaluated together.
#[derive(Debug)]
pub struct Partition {
    records: Vec<HazardRecord>,
    tree: RTree<IndexedHazard>,
    /// Largest warning distance of any record, in meters
    reach_meters: f64,
}

impl Partition {
    fn build(records: Vec<HazardRecord>, warning_distance: &dyn Fn(&Hazard) -> f64) -> Self {
        let reach_meters = records
            .iter()
            .map(|r| warning_distance(&r.hazard))
            .fold(0.0, f64::max);
        let indexed: Vec<IndexedHazard> = records
            .iter()
            .enumerate()
            .map(|(idx, r)| {
                let loc = r.hazard.location();
                IndexedHazard {
                    idx,
                    lat: loc.latitude,
                    lng: loc.longitude,
                }
            })
            .collect();
        Self {
            records,
            tree: RTree::bulk_load(indexed),
            reach_meters,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn reach_meters(&self) -> f64 {
        self.reach_meters
    }

    pub fn records(&self) -> &[HazardRecord] {
        &self.records
    }

    /// Records within `radius_meters` of `point`, with their distances.
    pub fn within(&self, point: &GeoPoint, radius_meters: f64) -> Vec<(&HazardRecord, f64)> {
        if self.records.is_empty() || !(radius_meters >= 0.0) {
            return Vec::new();
        }
        let (_, dlng) = meters_to_degrees(radius_meters, point.latitude);
        let degree_radius = dlng * DEGREE_RADIUS_SLACK;

        self.tree
            .locate_within_distance([point.latitude, point.longitude], degree_radius * degree_radius)
            .filter_map(|indexed| {
                let record = &self.records[indexed.idx];
                let distance = haversine_distance(point, &record.hazard.location());
                (distance <= radius_meters).then_some((record, distance))
            })
            .collect()
    }
}

/// Hazards inside a route corridor at session start.
#[derive(Debug)]
pub struct HazardSnapshot {
    bounds: BoundingBox,
    /// Speed cameras and speed bumps
    speed: Partition,
    traffic: Partition,
    road: Partition,
}

impl HazardSnapshot {
    /// Partition `records` and index them.
    ///
    /// `warning_distance` gives the outermost alert radius of each hazard so
    /// every partition knows how far it needs to search.
    pub fn new(
        bounds: BoundingBox,
        records: Vec<HazardRecord>,
        warning_distance: &dyn Fn(&Hazard) -> f64,
    ) -> Self {
        let mut speed = Vec::new();
        let mut traffic = Vec::new();
        let mut road = Vec::new();
        for record in records {
            match record.hazard {
                Hazard::SpeedCamera(_) | Hazard::SpeedBump(_) => speed.push(record),
                Hazard::Traffic(_) => traffic.push(record),
                Hazard::RoadCondition(_) => road.push(record),
            }
        }
        Self {
            bounds,
            speed: Partition::build(speed, warning_distance),
            traffic: Partition::build(traffic, warning_distance),
            road: Partition::build(road, warning_distance),
        }
    }

    pub fn bounds(&self) -> &BoundingBox {
        &self.bounds
    }

    pub fn speed(&self) -> &Partition {
        &self.speed
    }

    pub fn traffic(&self) -> &Partition {
        &self.traffic
    }

    pub fn road(&self) -> &Partition {
        &self.road
    }

    pub fn len(&self) -> usize {
        self.speed.len() + self.traffic.len() + self.road.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &HazardId) -> bool {
        self.records().any(|r| r.id == *id)
    }

    /// Every record in the snapshot.
    pub fn records(&self) -> impl Iterator<Item = &HazardRecord> {
        self.speed
            .records()
            .iter()
            .chain(self.traffic.records())
            .chain(self.road.records())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_utils::offset_point;
    use crate::hazards::types::{
        BumpSeverity, CameraKind, ConditionKind, ConditionSeverity, HazardKind, RoadCondition,
        SpeedBump, SpeedCamera,
    };

    fn record(kind: HazardKind, seq: u64, hazard: Hazard) -> HazardRecord {
        HazardRecord {
            id: HazardId::new(kind, seq),
            hazard,
            updated_at: 0,
        }
    }

    fn camera_at(location: GeoPoint) -> Hazard {
        Hazard::SpeedCamera(SpeedCamera {
            location,
            speed_limit_kph: 60.0,
            kind: CameraKind::Fixed,
            active: true,
        })
    }

    fn warning(hazard: &Hazard) -> f64 {
        match hazard {
            Hazard::SpeedBump(b) => b.warning_distance_meters,
            _ => 200.0,
        }
    }

    #[test]
    fn test_partitions_and_queries() {
        let center = GeoPoint::new(35.70, 51.40);
        let records = vec![
            record(HazardKind::SpeedCamera, 1, camera_at(offset_point(&center, 150.0, 0.0))),
            record(HazardKind::SpeedCamera, 2, camera_at(offset_point(&center, 0.0, 900.0))),
            record(
                HazardKind::SpeedBump,
                3,
                Hazard::SpeedBump(SpeedBump {
                    location: offset_point(&center, -40.0, 0.0),
                    severity: BumpSeverity::High,
                    warning_distance_meters: 350.0,
                }),
            ),
            record(
                HazardKind::RoadCondition,
                4,
                Hazard::RoadCondition(RoadCondition {
                    location: center,
                    condition: ConditionKind::Ice,
                    severity: ConditionSeverity::High,
                    length_meters: 50.0,
                    description: String::new(),
                }),
            ),
        ];
        let bounds = BoundingBox::from_points(&[center]).unwrap().expand(1000.0);
        let snapshot = HazardSnapshot::new(bounds, records, &warning);

        assert_eq!(snapshot.len(), 4);
        assert_eq!(snapshot.speed().len(), 3);
        assert_eq!(snapshot.road().len(), 1);
        assert!(snapshot.traffic().is_empty());
        assert_eq!(snapshot.speed().reach_meters(), 350.0);
        assert!(snapshot.contains(&HazardId::new(HazardKind::SpeedBump, 3)));

        let near = snapshot.speed().within(&center, 200.0);
        let mut ids: Vec<u64> = near.iter().map(|(r, _)| r.id.seq).collect();
        ids.sort();
        assert_eq!(ids, vec![1, 3]);
        for (_, distance) in near {
            assert!(distance <= 200.0);
        }
    }

    #[test]
    fn test_east_west_radius_is_exact() {
        // Degree-space prefilter must not drop records purely east of the query
        let center = GeoPoint::new(60.0, 10.0);
        let records = vec![record(
            HazardKind::SpeedCamera,
            1,
            camera_at(offset_point(&center, 190.0, 0.0)),
        )];
        let bounds = BoundingBox::from_points(&[center]).unwrap().expand(500.0);
        let snapshot = HazardSnapshot::new(bounds, records, &warning);
        assert_eq!(snapshot.speed().within(&center, 200.0).len(), 1);
        assert!(snapshot.speed().within(&center, 150.0).is_empty());
    }
}
