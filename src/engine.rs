//! # Route Engine
//!
//! Facade that owns the shared hazard catalog and route store and hands out
//! navigation sessions.
//!
//! ## Architecture
//!
//! The engine manages:
//! - The hazard catalog (sharded grid buckets)
//! - The learned-route store (sharded grid buckets)
//! - A route selector wired to both, plus any external routers
//!
//! Sessions share the stores through `Arc`s, so several sessions can run on
//! different threads while hazards are ingested concurrently. Nothing here is
//! global; hosts create as many engines as they need.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::info;

use crate::hazards::HazardCatalog;
use crate::router::RouterProvider;
use crate::selector::RouteSelector;
use crate::session::NavigationSession;
use crate::store::RouteStore;
use crate::{EngineConfig, GeoIndex, GeoPoint, Result, RouteCandidate, RouteKind};

// ============================================================================
// Route Engine
// ============================================================================

pub struct RouteEngine {
    config: EngineConfig,
    catalog: Arc<HazardCatalog>,
    store: Arc<RouteStore>,
    selector: RouteSelector,
    session_counter: AtomicU64,
}

impl std::fmt::Debug for RouteEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteEngine")
            .field("hazards", &self.catalog.len())
            .field("routes", &self.store.len())
            .finish()
    }
}

impl RouteEngine {
    /// Create an engine with empty in-memory stores.
    ///
    /// Fails with `ConfigError` when `config` does not validate.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::in_memory(config))
    }

    fn in_memory(config: EngineConfig) -> Self {
        let grid = GeoIndex::new(config.grid.clone());
        let catalog = HazardCatalog::new(grid.clone(), config.hazards.clone());
        let store = RouteStore::new(grid, config.routes.clone());
        Self::from_parts(config, catalog, store)
    }

    fn from_parts(config: EngineConfig, catalog: HazardCatalog, store: RouteStore) -> Self {
        let catalog = Arc::new(catalog);
        let store = Arc::new(store);
        let selector = RouteSelector::new(
            config.selector.clone(),
            Arc::clone(&store),
            Arc::clone(&catalog),
        );
        Self {
            config,
            catalog,
            store,
            selector,
            session_counter: AtomicU64::new(1),
        }
    }

    /// Open an engine backed by the SQLite database at `path`.
    ///
    /// Every stored route and hazard is loaded up front; later mutations are
    /// written through as they happen.
    #[cfg(feature = "persistence")]
    pub fn open(config: EngineConfig, path: &str) -> Result<Self> {
        use crate::persistence::{RecordSink, SqliteStore};

        config.validate()?;
        let db = Arc::new(SqliteStore::new(path)?);
        let routes = db.load_routes()?;
        let hazards = db.load_hazards()?;

        let sink: Arc<dyn RecordSink> = db;
        let grid = GeoIndex::new(config.grid.clone());
        let catalog = HazardCatalog::new(grid.clone(), config.hazards.clone())
            .with_sink(Arc::clone(&sink));
        let store = RouteStore::new(grid, config.routes.clone()).with_sink(sink);

        let hazard_count = catalog.load(hazards);
        let route_count = store.load(routes);
        info!(
            "[RouteEngine] Opened {} with {} hazards and {} routes",
            path, hazard_count, route_count
        );
        Ok(Self::from_parts(config, catalog, store))
    }

    /// External routers in priority order.
    pub fn with_routers(mut self, routers: Vec<Arc<dyn RouterProvider>>) -> Self {
        self.selector = self.selector.with_routers(routers);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<HazardCatalog> {
        &self.catalog
    }

    pub fn store(&self) -> &Arc<RouteStore> {
        &self.store
    }

    pub fn selector(&self) -> &RouteSelector {
        &self.selector
    }

    // ========================================================================
    // Planning & Navigation
    // ========================================================================

    /// Best route for a request without starting a session.
    pub fn plan_route(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
        kind: RouteKind,
        departure: Option<DateTime<Utc>>,
    ) -> Result<RouteCandidate> {
        self.selector.select(origin, destination, kind, departure)
    }

    /// Select a route and return an active session navigating it.
    pub fn start_navigation(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
        kind: RouteKind,
        departure: Option<DateTime<Utc>>,
    ) -> Result<NavigationSession> {
        let route = self.plan_route(origin, destination, kind, departure)?;
        let session = self.new_session();
        session.start(route)?;
        Ok(session)
    }

    /// An idle session sharing this engine's stores and configuration.
    pub fn new_session(&self) -> NavigationSession {
        let id = format!(
            "session-{}",
            self.session_counter.fetch_add(1, Ordering::Relaxed)
        );
        NavigationSession::new(
            id,
            Arc::clone(&self.catalog),
            Arc::clone(&self.store),
            self.config.session.clone(),
        )
        .with_alerts(self.config.alerts.clone())
        .with_learning(self.config.learning.clone())
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            hazard_count: self.catalog.len() as u32,
            route_count: self.store.len() as u32,
            route_key_count: self.store.key_count() as u32,
            sessions_started: (self.session_counter.load(Ordering::Relaxed) - 1) as u32,
        }
    }
}

impl Default for RouteEngine {
    fn default() -> Self {
        Self::in_memory(EngineConfig::default())
    }
}

/// Engine statistics for monitoring.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineStats {
    pub hazard_count: u32,
    pub route_count: u32,
    pub route_key_count: u32,
    pub sessions_started: u32,
}

// ============================================================================
// Tests
// ============================================================================
