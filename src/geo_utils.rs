//! Geographic utilities: great-circle distance, bearings and small local
//! offsets, all measured with the `geo` crate's haversine metric space.

use geo::{Bearing, Destination, Distance, Haversine, InterpolatePoint, Point};

use crate::GeoPoint;

/// Latitudes used for longitude spans are clamped to this so spans stay
/// finite near the poles.
const MAX_SPAN_LATITUDE: f64 = 89.4;

impl From<GeoPoint> for Point<f64> {
    fn from(p: GeoPoint) -> Self {
        Point::new(p.longitude, p.latitude)
    }
}

impl From<Point<f64>> for GeoPoint {
    fn from(p: Point<f64>) -> Self {
        GeoPoint::new(p.y(), p.x())
    }
}

/// Great-circle distance between two points in meters.
///
/// # Example
/// ```
/// use route_intel::GeoPoint;
/// use route_intel::geo_utils::haversine_distance;
///
/// let a = GeoPoint::new(35.700, 51.400);
/// let b = GeoPoint::new(35.710, 51.400);
/// let d = haversine_distance(&a, &b);
/// assert!((d - 1112.0).abs() < 5.0);
/// ```
pub fn haversine_distance(p1: &GeoPoint, p2: &GeoPoint) -> f64 {
    Haversine::distance(Point::from(*p1), Point::from(*p2))
}

/// Total length of a polyline in meters.
pub fn polyline_length(points: &[GeoPoint]) -> f64 {
    points
        .windows(2)
        .map(|w| haversine_distance(&w[0], &w[1]))
        .sum()
}

/// Convert a distance in meters to `(lat_degrees, lng_degrees)` at the given
/// reference latitude.
pub fn meters_to_degrees(meters: f64, ref_lat: f64) -> (f64, f64) {
    let lat = ref_lat.clamp(-MAX_SPAN_LATITUDE, MAX_SPAN_LATITUDE);
    let origin = Point::new(0.0, lat);
    let north = Haversine::destination(origin, 0.0, meters);
    let east = Haversine::destination(origin, 90.0, meters);
    ((north.y() - lat).abs(), east.x().abs())
}

/// Initial bearing from `a` to `b` in degrees, in [0, 360).
pub fn bearing(a: &GeoPoint, b: &GeoPoint) -> f64 {
    Haversine::bearing(Point::from(*a), Point::from(*b)).rem_euclid(360.0)
}

/// Absolute heading change at `b` when travelling `a -> b -> c`, in [0, 180].
pub fn turn_angle(a: &GeoPoint, b: &GeoPoint, c: &GeoPoint) -> f64 {
    let delta = (bearing(b, c) - bearing(a, b)).rem_euclid(360.0);
    if delta > 180.0 {
        360.0 - delta
    } else {
        delta
    }
}

/// Move a point by a local east/north offset in meters.
pub fn offset_point(point: &GeoPoint, east_m: f64, north_m: f64) -> GeoPoint {
    let distance = east_m.hypot(north_m);
    if distance == 0.0 {
        return *point;
    }
    let heading = east_m.atan2(north_m).to_degrees();
    Haversine::destination(Point::from(*point), heading, distance).into()
}

/// Point a fraction `t` (in [0, 1]) of the way from `a` to `b` along the
/// great circle.
pub fn interpolate(a: &GeoPoint, b: &GeoPoint, t: f64) -> GeoPoint {
    // Zero-length arcs have no direction
    if a == b {
        return *a;
    }
    Haversine::point_at_ratio_between(Point::from(*a), Point::from(*b), t).into()
}

/// Local `(east_m, north_m)` vector from `a` to `b`.
pub fn local_vector(a: &GeoPoint, b: &GeoPoint) -> (f64, f64) {
    let distance = haversine_distance(a, b);
    if distance == 0.0 {
        return (0.0, 0.0);
    }
    let heading = bearing(a, b).to_radians();
    (distance * heading.sin(), distance * heading.cos())
}
