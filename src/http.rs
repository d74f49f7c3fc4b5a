//! OSRM router provider over HTTP.
//!
//! Talks to any server exposing the OSRM `/route/v1` API and asks for the
//! full GeoJSON geometry of the best route. Requests run on a small private
//! tokio runtime so the provider stays a plain blocking [`RouterProvider`].
//! Throttled (429) and failed requests are retried with exponential backoff.

use log::{debug, info, warn};
use reqwest::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;

use crate::router::{Directions, RouterProvider};
use crate::{GeoPoint, Result, RouteIntelError, RouteKind};

const MAX_RETRIES: u32 = 2;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Public demo server; fine for tests, not for production traffic.
pub const DEFAULT_OSRM_URL: &str = "https://router.project-osrm.org";

/// API response for the route endpoint
#[derive(Debug, Deserialize)]
struct RouteResponse {
    code: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    routes: Vec<ApiRoute>,
}

#[derive(Debug, Deserialize)]
struct ApiRoute {
    distance: f64,
    duration: f64,
    geometry: ApiGeometry,
}

#[derive(Debug, Deserialize)]
struct ApiGeometry {
    coordinates: Vec<[f64; 2]>, // [lng, lat]
}

/// OSRM profile for a travel mode. Transit has no OSRM profile.
fn profile(kind: RouteKind) -> Option<&'static str> {
    match kind {
        RouteKind::Driving => Some("driving"),
        RouteKind::Walking => Some("foot"),
        RouteKind::Cycling => Some("bike"),
        RouteKind::Transit => None,
    }
}

/// Parse an OSRM route response body into directions for the first route.
pub fn parse_osrm_response(body: &str) -> Result<Directions> {
    let fail = |message: String| RouteIntelError::RouterError {
        provider: "osrm".to_string(),
        message,
    };

    let response: RouteResponse =
        serde_json::from_str(body).map_err(|e| fail(format!("Parse error: {}", e)))?;
    if response.code != "Ok" {
        return Err(fail(match response.message {
            Some(message) => format!("{}: {}", response.code, message),
            None => response.code,
        }));
    }
    let route = response
        .routes
        .into_iter()
        .next()
        .ok_or_else(|| fail("response contains no routes".to_string()))?;

    Ok(Directions {
        waypoints: route
            .geometry
            .coordinates
            .iter()
            .map(|[lng, lat]| GeoPoint::new(*lat, *lng))
            .collect(),
        distance_meters: route.distance,
        duration_seconds: route.duration,
    })
}

/// Router backed by an OSRM HTTP server.
pub struct OsrmRouter {
    base_url: String,
    client: Client,
    runtime: Runtime,
}

impl std::fmt::Debug for OsrmRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OsrmRouter")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl OsrmRouter {
    /// Create a router for the server at `base_url` (no trailing path).
    pub fn new(base_url: &str) -> Result<Self> {
        let fail = |message: String| RouteIntelError::RouterError {
            provider: "osrm".to_string(),
            message,
        };
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| fail(format!("Failed to create HTTP client: {}", e)))?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("osrm-router")
            .enable_all()
            .build()
            .map_err(|e| fail(format!("Failed to create tokio runtime: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            runtime,
        })
    }

    /// Request URL for a route; `None` when the mode has no OSRM profile.
    pub fn route_url(
        &self,
        origin: &GeoPoint,
        destination: &GeoPoint,
        kind: RouteKind,
    ) -> Option<String> {
        let profile = profile(kind)?;
        Some(format!(
            "{}/route/v1/{}/{},{};{},{}?overview=full&geometries=geojson",
            self.base_url,
            profile,
            origin.longitude,
            origin.latitude,
            destination.longitude,
            destination.latitude
        ))
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        let mut retries = 0;

        loop {
            let error = match self.client.get(url).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        "HTTP 429".to_string()
                    } else if !status.is_success() && !status.is_client_error() {
                        format!("HTTP {}", status)
                    } else {
                        // OSRM reports bad requests (e.g. NoRoute) in the body
                        return resp.text().await.map_err(|e| RouteIntelError::RouterError {
                            provider: self.name().to_string(),
                            message: format!("Read error: {}", e),
                        });
                    }
                }
                Err(e) => format!("Request error: {}", e),
            };

            retries += 1;
            if retries > MAX_RETRIES {
                return Err(RouteIntelError::RouterError {
                    provider: self.name().to_string(),
                    message: format!("{} (max retries exceeded)", error),
                });
            }
            // Exponential backoff: 400ms, 800ms
            let backoff = Duration::from_millis(200 * (1 << retries));
            warn!(
                "[OsrmRouter] {}, retry {} after {:?}",
                error, retries, backoff
            );
            tokio::time::sleep(backoff).await;
        }
    }
}

impl RouterProvider for OsrmRouter {
    fn name(&self) -> &str {
        "osrm"
    }

    fn directions(
        &self,
        origin: &GeoPoint,
        destination: &GeoPoint,
        kind: RouteKind,
    ) -> Result<Directions> {
        let url = self
            .route_url(origin, destination, kind)
            .ok_or_else(|| RouteIntelError::RouterError {
                provider: self.name().to_string(),
                message: format!("no profile for {}", kind),
            })?;
        debug!("[OsrmRouter] GET {}", url);

        let start = Instant::now();
        let body = self.runtime.block_on(self.fetch(&url))?;
        let directions = parse_osrm_response(&body)?;
        info!(
            "[OsrmRouter] {} route with {} points in {:.2}s",
            kind,
            directions.waypoints.len(),
            start.elapsed().as_secs_f64()
        );
        Ok(directions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OK_BODY: &str = r#"{
        "code": "Ok",
        "routes": [{
            "distance": 1523.4,
            "duration": 201.7,
            "geometry": {
                "type": "LineString",
                "coordinates": [[51.4, 35.7], [51.405, 35.706], [51.41, 35.71]]
            }
        }],
        "waypoints": []
    }"#;

    #[test]
    fn test_parse_ok_response() {
        let directions = parse_osrm_response(OK_BODY).unwrap();
        assert_eq!(directions.waypoints.len(), 3);
        // Coordinates arrive as [lng, lat]
        assert_eq!(directions.waypoints[0], GeoPoint::new(35.7, 51.4));
        assert_eq!(directions.waypoints[2], GeoPoint::new(35.71, 51.41));
        assert_eq!(directions.distance_meters, 1523.4);
        assert_eq!(directions.duration_seconds, 201.7);
    }

    #[test]
    fn test_parse_error_code() {
        let body = r#"{"code": "NoRoute", "message": "Impossible route between points"}"#;
        let err = parse_osrm_response(body).unwrap_err();
        match err {
            RouteIntelError::RouterError { provider, message } => {
                assert_eq!(provider, "osrm");
                assert!(message.starts_with("NoRoute"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_parse_garbage() {
        assert!(parse_osrm_response("<html>502</html>").is_err());
        assert!(parse_osrm_response(r#"{"code": "Ok", "routes": []}"#).is_err());
    }

    #[test]
    fn test_route_url() {
        let router = OsrmRouter::new("http://localhost:5000/").unwrap();
        let o = GeoPoint::new(35.7, 51.4);
        let d = GeoPoint::new(35.71, 51.41);
        assert_eq!(
            router.route_url(&o, &d, RouteKind::Cycling).unwrap(),
            "http://localhost:5000/route/v1/bike/51.4,35.7;51.41,35.71?overview=full&geometries=geojson"
        );
        assert!(router.route_url(&o, &d, RouteKind::Transit).is_none());
    }

    #[test]
    fn test_transit_is_unsupported() {
        let router = OsrmRouter::new(DEFAULT_OSRM_URL).unwrap();
        let o = GeoPoint::new(35.7, 51.4);
        let d = GeoPoint::new(35.71, 51.41);
        assert!(router.directions(&o, &d, RouteKind::Transit).is_err());
    }
}
