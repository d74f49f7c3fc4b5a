//! Hazard records: speed cameras, speed bumps, traffic cells and road
//! conditions, plus their validation rules.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::grid::{CellId, GeoIndex};
use crate::{GeoPoint, Result, RouteIntelError};

/// Highest speed limit accepted for a camera record.
const MAX_SPEED_LIMIT_KPH: f64 = 300.0;

/// Longest warning distance accepted for a speed bump record.
const MAX_BUMP_WARNING_M: f64 = 2_000.0;

/// Defines `as_str`, `Display` and a case-insensitive `FromStr` for a
/// fieldless enum. Unknown names are rejected as invalid hazards.
macro_rules! named_enum {
    ($ty:ident { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $name),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = RouteIntelError;

            fn from_str(s: &str) -> Result<Self> {
                let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
                match normalized.as_str() {
                    $($name => Ok($ty::$variant),)+
                    _ => Err(RouteIntelError::InvalidHazard {
                        message: format!("unknown {} '{}'", stringify!($ty), s),
                    }),
                }
            }
        }
    };
}

/// Fieldless discriminant of [`Hazard`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HazardKind {
    SpeedCamera,
    SpeedBump,
    Traffic,
    RoadCondition,
}

named_enum!(HazardKind {
    SpeedCamera => "speed_camera",
    SpeedBump => "speed_bump",
    Traffic => "traffic",
    RoadCondition => "road_condition",
});

impl HazardKind {
    /// Short prefix used in hazard ids.
    pub fn prefix(&self) -> &'static str {
        match self {
            HazardKind::SpeedCamera => "camera",
            HazardKind::SpeedBump => "bump",
            HazardKind::Traffic => "traffic",
            HazardKind::RoadCondition => "road",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "camera" => Some(HazardKind::SpeedCamera),
            "bump" => Some(HazardKind::SpeedBump),
            "traffic" => Some(HazardKind::Traffic),
            "road" => Some(HazardKind::RoadCondition),
            _ => None,
        }
    }
}

/// Type-scoped hazard identifier, displayed as `camera:17`.
///
/// Two hazards of different kinds can never share an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HazardId {
    pub kind: HazardKind,
    pub seq: u64,
}

impl HazardId {
    pub fn new(kind: HazardKind, seq: u64) -> Self {
        Self { kind, seq }
    }
}

impl fmt::Display for HazardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.prefix(), self.seq)
    }
}

impl FromStr for HazardId {
    type Err = RouteIntelError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || RouteIntelError::InvalidHazard {
            message: format!("malformed hazard id '{}'", s),
        };
        let (prefix, seq) = s.split_once(':').ok_or_else(invalid)?;
        let kind = HazardKind::from_prefix(prefix).ok_or_else(invalid)?;
        let seq = seq.parse::<u64>().map_err(|_| invalid())?;
        Ok(HazardId { kind, seq })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraKind {
    Fixed,
    Mobile,
    AverageSpeed,
    RedLight,
}

named_enum!(CameraKind {
    Fixed => "fixed",
    Mobile => "mobile",
    AverageSpeed => "average_speed",
    RedLight => "red_light",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BumpSeverity {
    Low,
    Medium,
    High,
}

named_enum!(BumpSeverity {
    Low => "low",
    Medium => "medium",
    High => "high",
});

/// Congestion level of a traffic cell for one hour of the day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrafficLevel {
    Low,
    Medium,
    High,
    Severe,
}

named_enum!(TrafficLevel {
    Low => "low",
    Medium => "medium",
    High => "high",
    Severe => "severe",
});

impl TrafficLevel {
    /// Delay multiplier applied to the per-kilometer delay constant.
    pub fn factor(&self) -> f64 {
        match self {
            TrafficLevel::Low => 0.2,
            TrafficLevel::Medium => 0.5,
            TrafficLevel::High => 0.8,
            TrafficLevel::Severe => 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    Construction,
    Pothole,
    Flooding,
    Ice,
    Debris,
    Narrowing,
    BridgeWork,
    Landslide,
}

named_enum!(ConditionKind {
    Construction => "construction",
    Pothole => "pothole",
    Flooding => "flooding",
    Ice => "ice",
    Debris => "debris",
    Narrowing => "narrowing",
    BridgeWork => "bridge_work",
    Landslide => "landslide",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionSeverity {
    Low,
    Medium,
    High,
    Critical,
}

named_enum!(ConditionSeverity {
    Low => "low",
    Medium => "medium",
    High => "high",
    Critical => "critical",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedCamera {
    pub location: GeoPoint,
    pub speed_limit_kph: f64,
    pub kind: CameraKind,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedBump {
    pub location: GeoPoint,
    pub severity: BumpSeverity,
    /// Distance at which drivers are first warned, in meters
    pub warning_distance_meters: f64,
}

/// Hourly congestion profile of one grid cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficCell {
    /// Center of the cell
    pub location: GeoPoint,
    /// Grid cell this profile belongs to
    pub area_key: CellId,
    /// Congestion per hour of the day (index 0 = midnight)
    pub hourly_levels: [TrafficLevel; 24],
}

impl TrafficCell {
    /// Build the traffic cell covering `point` on the given grid.
    pub fn for_point(grid: &GeoIndex, point: &GeoPoint, hourly_levels: [TrafficLevel; 24]) -> Self {
        let area_key = grid.cell_id(point);
        Self {
            location: grid.cell_center(area_key),
            area_key,
            hourly_levels,
        }
    }

    /// Same level for every hour.
    pub fn uniform(grid: &GeoIndex, point: &GeoPoint, level: TrafficLevel) -> Self {
        Self::for_point(grid, point, [level; 24])
    }

    pub fn level_at(&self, hour: u32) -> TrafficLevel {
        self.hourly_levels[(hour % 24) as usize]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoadCondition {
    pub location: GeoPoint,
    pub condition: ConditionKind,
    pub severity: ConditionSeverity,
    /// Affected stretch of road in meters
    pub length_meters: f64,
    pub description: String,
}

/// A geofenced hazard. Every variant carries its own location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Hazard {
    SpeedCamera(SpeedCamera),
    SpeedBump(SpeedBump),
    Traffic(TrafficCell),
    RoadCondition(RoadCondition),
}

impl Hazard {
    pub fn location(&self) -> GeoPoint {
        match self {
            Hazard::SpeedCamera(c) => c.location,
            Hazard::SpeedBump(b) => b.location,
            Hazard::Traffic(t) => t.location,
            Hazard::RoadCondition(r) => r.location,
        }
    }

    pub fn kind(&self) -> HazardKind {
        match self {
            Hazard::SpeedCamera(_) => HazardKind::SpeedCamera,
            Hazard::SpeedBump(_) => HazardKind::SpeedBump,
            Hazard::Traffic(_) => HazardKind::Traffic,
            Hazard::RoadCondition(_) => HazardKind::RoadCondition,
        }
    }

    /// Whether a new report could describe the same physical hazard as `self`.
    ///
    /// Kinds must match; road conditions additionally need the same condition.
    pub fn is_compatible_with(&self, other: &Hazard) -> bool {
        match (self, other) {
            (Hazard::RoadCondition(a), Hazard::RoadCondition(b)) => a.condition == b.condition,
            (Hazard::Traffic(a), Hazard::Traffic(b)) => a.area_key == b.area_key,
            _ => self.kind() == other.kind(),
        }
    }

    /// Reject records the catalog must never hold.
    pub fn validate(&self, grid: &GeoIndex) -> Result<()> {
        let invalid = |message: String| Err(RouteIntelError::InvalidHazard { message });

        self.location().validated()?;
        match self {
            Hazard::SpeedCamera(c) => {
                if !(c.speed_limit_kph.is_finite()
                    && c.speed_limit_kph > 0.0
                    && c.speed_limit_kph <= MAX_SPEED_LIMIT_KPH)
                {
                    return invalid(format!("speed limit {} km/h out of range", c.speed_limit_kph));
                }
            }
            Hazard::SpeedBump(b) => {
                if !(b.warning_distance_meters.is_finite()
                    && b.warning_distance_meters > 0.0
                    && b.warning_distance_meters <= MAX_BUMP_WARNING_M)
                {
                    return invalid(format!(
                        "bump warning distance {}m out of range",
                        b.warning_distance_meters
                    ));
                }
            }
            Hazard::Traffic(t) => {
                let expected = grid.cell_id(&t.location);
                if t.area_key != expected {
                    return invalid(format!(
                        "traffic area key {} does not match location cell {}",
                        t.area_key, expected
                    ));
                }
            }
            Hazard::RoadCondition(r) => {
                if !(r.length_meters.is_finite() && r.length_meters >= 0.0) {
                    return invalid(format!("road condition length {} is invalid", r.length_meters));
                }
            }
        }
        Ok(())
    }
}

/// A validated hazard as stored in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HazardRecord {
    pub id: HazardId,
    pub hazard: Hazard,
    /// Unix timestamp in milliseconds of the last insert/update
    pub updated_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridConfig;

    fn camera(limit: f64) -> Hazard {
        Hazard::SpeedCamera(SpeedCamera {
            location: GeoPoint::new(35.705, 51.405),
            speed_limit_kph: limit,
            kind: CameraKind::Fixed,
            active: true,
        })
    }

    #[test]
    fn test_enum_parsing() {
        assert_eq!("Average Speed".parse::<CameraKind>().unwrap(), CameraKind::AverageSpeed);
        assert_eq!("bridge-work".parse::<ConditionKind>().unwrap(), ConditionKind::BridgeWork);
        assert_eq!("SEVERE".parse::<TrafficLevel>().unwrap(), TrafficLevel::Severe);
        assert!("extreme".parse::<BumpSeverity>().is_err());
        assert!(matches!(
            "apocalyptic".parse::<ConditionSeverity>(),
            Err(RouteIntelError::InvalidHazard { .. })
        ));
    }

    #[test]
    fn test_hazard_id_round_trip_text() {
        let id = HazardId::new(HazardKind::SpeedBump, 42);
        assert_eq!(id.to_string(), "bump:42");
        assert_eq!("bump:42".parse::<HazardId>().unwrap(), id);
        assert!("bump".parse::<HazardId>().is_err());
        assert!("volcano:1".parse::<HazardId>().is_err());
    }

    #[test]
    fn test_validation() {
        let grid = GeoIndex::new(GridConfig::default());
        assert!(camera(60.0).validate(&grid).is_ok());
        assert!(camera(0.0).validate(&grid).is_err());
        assert!(camera(f64::NAN).validate(&grid).is_err());

        let road = Hazard::RoadCondition(RoadCondition {
            location: GeoPoint::new(35.7, 51.4),
            condition: ConditionKind::Pothole,
            severity: ConditionSeverity::Medium,
            length_meters: -5.0,
            description: "deep pothole".to_string(),
        });
        assert!(road.validate(&grid).is_err());

        let mut traffic = TrafficCell::uniform(&grid, &GeoPoint::new(35.7, 51.4), TrafficLevel::High);
        assert!(Hazard::Traffic(traffic.clone()).validate(&grid).is_ok());
        traffic.area_key = CellId::new(0, 0);
        assert!(Hazard::Traffic(traffic).validate(&grid).is_err());
    }

    #[test]
    fn test_compatibility() {
        let pothole = |condition| {
            Hazard::RoadCondition(RoadCondition {
                location: GeoPoint::new(35.7, 51.4),
                condition,
                severity: ConditionSeverity::Low,
                length_meters: 10.0,
                description: String::new(),
            })
        };
        assert!(camera(50.0).is_compatible_with(&camera(80.0)));
        assert!(pothole(ConditionKind::Pothole).is_compatible_with(&pothole(ConditionKind::Pothole)));
        assert!(!pothole(ConditionKind::Pothole).is_compatible_with(&pothole(ConditionKind::Ice)));
        assert!(!camera(50.0).is_compatible_with(&pothole(ConditionKind::Ice)));
    }

    #[test]
    fn test_hazard_json_ingestion() {
        let json = r#"{
            "type": "speed_bump",
            "location": { "latitude": 35.70, "longitude": 51.40 },
            "severity": "high",
            "warning_distance_meters": 80.0
        }"#;
        let hazard: Hazard = serde_json::from_str(json).unwrap();
        assert_eq!(hazard.kind(), HazardKind::SpeedBump);

        let bad = json.replace("\"high\"", "\"extreme\"");
        assert!(serde_json::from_str::<Hazard>(&bad).is_err());
    }
}
