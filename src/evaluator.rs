//! Hazard proximity evaluation.
//!
//! Each position update is checked against the session's [`HazardSnapshot`].
//! Every hazard within its warning band yields a tiered alert, then a single
//! cooldown pass drops alerts the driver has just heard about.
//!
//! ## Levels
//!
//! | Hazard         | Warning band                  | Critical                              |
//! |----------------|-------------------------------|---------------------------------------|
//! | Speed camera   | 200 m                         | within 50 m and over the posted limit |
//! | Speed bump     | record's warning distance     | within 30 m and over comfort speed    |
//! | Road condition | max(500 m, length + 200 m)    | within 100 m                          |
//! | Traffic        | 300 m, High/Severe only       | within 100 m and Severe               |

use chrono::{DateTime, Timelike, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use crate::hazards::{
    BumpSeverity, CameraKind, Hazard, HazardId, HazardKind, HazardRecord, HazardSnapshot,
    Partition, TrafficLevel,
};
use crate::GeoPoint;

/// Distance bands, speed thresholds and cooldown for alerts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Default: 200.0 meters
    pub camera_warning_m: f64,
    /// Default: 50.0 meters
    pub camera_critical_m: f64,
    /// Default: 30.0 meters
    pub bump_critical_m: f64,
    /// Comfortable speed over a low bump.
    /// Default: 40.0 km/h
    pub bump_comfort_low_kph: f64,
    /// Default: 30.0 km/h
    pub bump_comfort_medium_kph: f64,
    /// Default: 20.0 km/h
    pub bump_comfort_high_kph: f64,
    /// Road conditions warn at the larger of this and length + padding.
    /// Default: 500.0 meters
    pub road_min_warning_m: f64,
    /// Default: 200.0 meters
    pub road_warning_padding_m: f64,
    /// Default: 100.0 meters
    pub road_critical_m: f64,
    /// Default: 300.0 meters
    pub traffic_warning_m: f64,
    /// Default: 100.0 meters
    pub traffic_critical_m: f64,
    /// Repeats of an alert at the same or a lower level are suppressed for
    /// this long.
    /// Default: 30000 ms
    pub cooldown_ms: i64,
    /// Local time offset used to pick the hour of day for traffic.
    /// Default: 0
    pub utc_offset_minutes: i32,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            camera_warning_m: 200.0,
            camera_critical_m: 50.0,
            bump_critical_m: 30.0,
            bump_comfort_low_kph: 40.0,
            bump_comfort_medium_kph: 30.0,
            bump_comfort_high_kph: 20.0,
            road_min_warning_m: 500.0,
            road_warning_padding_m: 200.0,
            road_critical_m: 100.0,
            traffic_warning_m: 300.0,
            traffic_critical_m: 100.0,
            cooldown_ms: 30_000,
            utc_offset_minutes: 0,
        }
    }
}

impl AlertConfig {
    /// Outermost distance at which `hazard` can alert.
    pub fn warning_distance(&self, hazard: &Hazard) -> f64 {
        match hazard {
            Hazard::SpeedCamera(_) => self.camera_warning_m,
            Hazard::SpeedBump(b) => b.warning_distance_meters.max(self.bump_critical_m),
            Hazard::Traffic(_) => self.traffic_warning_m,
            Hazard::RoadCondition(r) => self
                .road_min_warning_m
                .max(r.length_meters + self.road_warning_padding_m),
        }
    }

    fn comfort_speed(&self, severity: BumpSeverity) -> f64 {
        match severity {
            BumpSeverity::Low => self.bump_comfort_low_kph,
            BumpSeverity::Medium => self.bump_comfort_medium_kph,
            BumpSeverity::High => self.bump_comfort_high_kph,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Warning,
    Critical,
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertLevel::Warning => f.write_str("warning"),
            AlertLevel::Critical => f.write_str("critical"),
        }
    }
}

/// An alert raised for one hazard at one position update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub hazard_id: HazardId,
    pub hazard_kind: HazardKind,
    pub level: AlertLevel,
    pub distance_meters: f64,
    /// Human-readable text, e.g. "Speed camera in 180 m, limit 60 km/h"
    pub message: String,
    pub timestamp_ms: i64,
}

// ============================================================================
// Cooldown
// ============================================================================

/// Last alert emitted per hazard, used to de-duplicate repeats.
#[derive(Debug)]
pub struct AlertHistory {
    cooldown_ms: i64,
    entries: Mutex<HashMap<HazardId, (i64, AlertLevel)>>,
}

impl AlertHistory {
    pub fn new(cooldown_ms: i64) -> Self {
        Self {
            cooldown_ms,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Keep the alerts that pass the cooldown and record them as emitted.
    ///
    /// An alert is dropped when the same hazard alerted at the same or a
    /// higher level less than the cooldown ago. Escalations always pass.
    pub fn admit(&self, alerts: Vec<Alert>) -> Vec<Alert> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        alerts
            .into_iter()
            .filter(|alert| {
                if let Some(&(last_ts, last_level)) = entries.get(&alert.hazard_id) {
                    let within = alert.timestamp_ms - last_ts < self.cooldown_ms;
                    if within && alert.level <= last_level {
                        return false;
                    }
                }
                entries.insert(alert.hazard_id, (alert.timestamp_ms, alert.level));
                true
            })
            .collect()
    }

    /// Last emission for a hazard.
    pub fn last(&self, id: &HazardId) -> Option<(i64, AlertLevel)> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .copied()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

// ============================================================================
// Evaluation
// ============================================================================

#[derive(Debug, Clone)]
pub struct HazardEvaluator {
    config: AlertConfig,
}

impl HazardEvaluator {
    pub fn new(config: AlertConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AlertConfig {
        &self.config
    }

    /// Alerts for a position update, after the cooldown pass, most urgent
    /// first.
    pub fn evaluate(
        &self,
        position: &GeoPoint,
        speed_kph: f64,
        timestamp_ms: i64,
        snapshot: &HazardSnapshot,
        history: &AlertHistory,
    ) -> Vec<Alert> {
        if !position.is_valid() {
            return Vec::new();
        }
        let hour = self.hour_of_day(timestamp_ms);
        let scan = |partition: &Partition| {
            self.scan(partition, position, speed_kph, timestamp_ms, hour)
        };

        #[cfg(feature = "parallel")]
        let (mut alerts, (traffic, road)) = rayon::join(
            || scan(snapshot.speed()),
            || rayon::join(|| scan(snapshot.traffic()), || scan(snapshot.road())),
        );

        #[cfg(not(feature = "parallel"))]
        let (mut alerts, traffic, road) = (
            scan(snapshot.speed()),
            scan(snapshot.traffic()),
            scan(snapshot.road()),
        );

        alerts.extend(traffic);
        alerts.extend(road);
        alerts.sort_by(|a, b| {
            b.level
                .cmp(&a.level)
                .then(a.distance_meters.total_cmp(&b.distance_meters))
        });

        let raised = alerts.len();
        let admitted = history.admit(alerts);
        if raised > 0 {
            debug!(
                "[HazardEvaluator] {} alerts raised, {} after cooldown",
                raised,
                admitted.len()
            );
        }
        admitted
    }

    fn hour_of_day(&self, timestamp_ms: i64) -> u32 {
        DateTime::<Utc>::from_timestamp_millis(timestamp_ms)
            .map(|t| (t + chrono::Duration::minutes(self.config.utc_offset_minutes as i64)).hour())
            .unwrap_or(0)
    }

    fn scan(
        &self,
        partition: &Partition,
        position: &GeoPoint,
        speed_kph: f64,
        timestamp_ms: i64,
        hour: u32,
    ) -> Vec<Alert> {
        partition
            .within(position, partition.reach_meters())
            .into_iter()
            .filter_map(|(record, distance)| {
                let level = self.level(&record.hazard, distance, speed_kph, hour)?;
                Some(Alert {
                    hazard_id: record.id,
                    hazard_kind: record.id.kind,
                    level,
                    distance_meters: distance,
                    message: message(record, distance, hour),
                    timestamp_ms,
                })
            })
            .collect()
    }

    /// Alert level for a hazard at a distance, `None` when out of range.
    ///
    /// For a fixed speed the level never drops as the distance shrinks.
    pub fn level(
        &self,
        hazard: &Hazard,
        distance: f64,
        speed_kph: f64,
        hour: u32,
    ) -> Option<AlertLevel> {
        let c = &self.config;
        let warning = c.warning_distance(hazard);
        let (critical_band, critical_allowed) = match hazard {
            Hazard::SpeedCamera(cam) => {
                if !cam.active {
                    return None;
                }
                (c.camera_critical_m, speed_kph > cam.speed_limit_kph)
            }
            Hazard::SpeedBump(bump) => (
                c.bump_critical_m,
                speed_kph > c.comfort_speed(bump.severity),
            ),
            Hazard::RoadCondition(_) => (c.road_critical_m, true),
            Hazard::Traffic(cell) => match cell.level_at(hour) {
                TrafficLevel::Low | TrafficLevel::Medium => return None,
                TrafficLevel::High => (c.traffic_critical_m, false),
                TrafficLevel::Severe => (c.traffic_critical_m, true),
            },
        };

        if critical_allowed && distance <= critical_band {
            Some(AlertLevel::Critical)
        } else if distance <= warning {
            Some(AlertLevel::Warning)
        } else {
            None
        }
    }
}

fn camera_name(kind: CameraKind) -> &'static str {
    match kind {
        CameraKind::Fixed => "Speed camera",
        CameraKind::Mobile => "Mobile speed camera",
        CameraKind::AverageSpeed => "Average speed camera",
        CameraKind::RedLight => "Red-light camera",
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn message(record: &HazardRecord, distance: f64, hour: u32) -> String {
    let d = distance.round();
    match &record.hazard {
        Hazard::SpeedCamera(c) => format!(
            "{} in {:.0} m, limit {:.0} km/h",
            camera_name(c.kind),
            d,
            c.speed_limit_kph
        ),
        Hazard::SpeedBump(b) => format!("{} speed bump in {:.0} m", capitalize(b.severity.as_str()), d),
        Hazard::Traffic(t) => format!(
            "{} traffic in {:.0} m",
            capitalize(t.level_at(hour).as_str()),
            d
        ),
        Hazard::RoadCondition(r) => {
            let what = capitalize(&r.condition.as_str().replace('_', " "));
            if r.description.is_empty() {
                format!("{} in {:.0} m ({} severity)", what, d, r.severity)
            } else {
                format!("{} in {:.0} m ({} severity): {}", what, d, r.severity, r.description)
            }
        }
    }
}
