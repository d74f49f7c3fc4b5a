//! External router providers and the timeout-bounded fallback chain.
//!
//! Providers are plain blocking trait objects. Each call runs on a worker
//! thread so a hung provider can't stall route selection: after the timeout
//! the result channel is dropped and the worker is left to finish on its own.

use log::{debug, warn};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::geo_utils::polyline_length;
use crate::{GeoPoint, Result, RouteIntelError, RouteKind};

/// Geometry and metrics returned by a router.
#[derive(Debug, Clone, PartialEq)]
pub struct Directions {
    pub waypoints: Vec<GeoPoint>,
    /// Route distance in meters (0 lets the selector measure the geometry)
    pub distance_meters: f64,
    /// Router's travel time estimate in seconds
    pub duration_seconds: f64,
}

impl Directions {
    /// Reject geometry the selector can't use; fill in a missing distance.
    fn normalized(mut self, provider: &str) -> Result<Self> {
        let fail = |message: &str| RouteIntelError::RouterError {
            provider: provider.to_string(),
            message: message.to_string(),
        };
        if self.waypoints.len() < 2 {
            return Err(fail("fewer than 2 waypoints"));
        }
        if self.waypoints.iter().any(|p| !p.is_valid()) {
            return Err(fail("invalid coordinates in geometry"));
        }
        if !(self.distance_meters.is_finite() && self.distance_meters > 0.0) {
            self.distance_meters = polyline_length(&self.waypoints);
        }
        if !(self.distance_meters > 0.0) {
            return Err(fail("zero-length geometry"));
        }
        if !(self.duration_seconds.is_finite() && self.duration_seconds > 0.0) {
            return Err(fail("non-positive duration"));
        }
        Ok(self)
    }
}

/// A source of turn-by-turn geometry (OSRM, a vendor SDK, ...).
pub trait RouterProvider: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &str;

    fn directions(
        &self,
        origin: &GeoPoint,
        destination: &GeoPoint,
        kind: RouteKind,
    ) -> Result<Directions>;
}

/// Call one provider, giving up after `timeout`.
pub fn directions_with_timeout(
    provider: Arc<dyn RouterProvider>,
    origin: GeoPoint,
    destination: GeoPoint,
    kind: RouteKind,
    timeout: Duration,
) -> Result<Directions> {
    let name = provider.name().to_string();
    let (tx, rx) = mpsc::channel();

    let worker = Arc::clone(&provider);
    let spawned = thread::Builder::new()
        .name(format!("router-{}", name))
        .spawn(move || {
            let result = worker.directions(&origin, &destination, kind);
            // Receiver is gone after a timeout
            let _ = tx.send(result);
        });
    if let Err(e) = spawned {
        return Err(RouteIntelError::RouterError {
            provider: name,
            message: format!("failed to spawn worker: {}", e),
        });
    }

    match rx.recv_timeout(timeout) {
        Ok(result) => result.and_then(|d| d.normalized(&name)),
        Err(mpsc::RecvTimeoutError::Timeout) => Err(RouteIntelError::RouterError {
            provider: name,
            message: format!("timed out after {}ms", timeout.as_millis()),
        }),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(RouteIntelError::RouterError {
            provider: name,
            message: "worker exited without a result".to_string(),
        }),
    }
}

/// Try providers in priority order; the first usable answer wins.
///
/// Failures are logged and never surfaced.
pub fn first_directions(
    providers: &[Arc<dyn RouterProvider>],
    origin: GeoPoint,
    destination: GeoPoint,
    kind: RouteKind,
    timeout: Duration,
) -> Option<(String, Directions)> {
    for provider in providers {
        let start = Instant::now();
        match directions_with_timeout(Arc::clone(provider), origin, destination, kind, timeout) {
            Ok(directions) => {
                debug!(
                    "[Router] {} answered in {:?} with {} waypoints",
                    provider.name(),
                    start.elapsed(),
                    directions.waypoints.len()
                );
                return Some((provider.name().to_string(), directions));
            }
            Err(e) => warn!("[Router] {}", e),
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Straight;

    impl RouterProvider for Straight {
        fn name(&self) -> &str {
            "straight"
        }

        fn directions(&self, o: &GeoPoint, d: &GeoPoint, _kind: RouteKind) -> Result<Directions> {
            Ok(Directions {
                waypoints: vec![*o, *d],
                distance_meters: 0.0,
                duration_seconds: 60.0,
            })
        }
    }

    struct Down;

    impl RouterProvider for Down {
        fn name(&self) -> &str {
            "down"
        }

        fn directions(&self, _o: &GeoPoint, _d: &GeoPoint, _kind: RouteKind) -> Result<Directions> {
            Err(RouteIntelError::RouterError {
                provider: "down".to_string(),
                message: "503".to_string(),
            })
        }
    }

    struct Slow;

    impl RouterProvider for Slow {
        fn name(&self) -> &str {
            "slow"
        }

        fn directions(&self, o: &GeoPoint, d: &GeoPoint, kind: RouteKind) -> Result<Directions> {
            thread::sleep(Duration::from_millis(500));
            Straight.directions(o, d, kind)
        }
    }

    fn endpoints() -> (GeoPoint, GeoPoint) {
        (GeoPoint::new(35.700, 51.400), GeoPoint::new(35.710, 51.410))
    }

    #[test]
    fn test_distance_filled_from_geometry() {
        let (o, d) = endpoints();
        let result =
            directions_with_timeout(Arc::new(Straight), o, d, RouteKind::Driving, Duration::from_secs(1))
                .unwrap();
        assert!((result.distance_meters - o.distance_to(&d)).abs() < 1e-6);
    }

    #[test]
    fn test_timeout() {
        let (o, d) = endpoints();
        let start = Instant::now();
        let result =
            directions_with_timeout(Arc::new(Slow), o, d, RouteKind::Driving, Duration::from_millis(50));
        assert!(matches!(result, Err(RouteIntelError::RouterError { .. })));
        assert!(start.elapsed() < Duration::from_millis(400));
    }

    #[test]
    fn test_fallback_order() {
        let (o, d) = endpoints();
        let chain: Vec<Arc<dyn RouterProvider>> =
            vec![Arc::new(Down), Arc::new(Slow), Arc::new(Straight)];
        let (name, _) =
            first_directions(&chain, o, d, RouteKind::Driving, Duration::from_millis(50)).unwrap();
        assert_eq!(name, "straight");

        let dead: Vec<Arc<dyn RouterProvider>> = vec![Arc::new(Down)];
        assert!(first_directions(&dead, o, d, RouteKind::Driving, Duration::from_millis(50)).is_none());
    }
}
