//! # Persistence
//!
//! The stores notify a [`RecordSink`] after every mutation so learned routes
//! and hazards survive restarts. Sink failures are logged by the stores and
//! never fail the mutation itself.
//!
//! With the `persistence` feature, [`SqliteStore`] implements the sink on
//! SQLite. Records are stored as MessagePack blobs next to a few indexed
//! columns, and everything is loaded back at startup.

use crate::hazards::{HazardId, HazardRecord};
use crate::{Result, RouteCandidate};

/// Receives every change made to the route store and the hazard catalog.
pub trait RecordSink: Send + Sync {
    /// A route candidate was inserted or reinforced.
    fn route_saved(&self, candidate: &RouteCandidate) -> Result<()>;

    /// A route candidate was dropped by the per-key cap.
    fn route_evicted(&self, route_id: &str) -> Result<()>;

    /// A hazard was inserted, coalesced or updated.
    fn hazard_saved(&self, record: &HazardRecord) -> Result<()>;

    fn hazard_removed(&self, id: &HazardId) -> Result<()>;
}

#[cfg(feature = "persistence")]
pub use sqlite::SqliteStore;

#[cfg(feature = "persistence")]
mod sqlite {
    use log::{info, warn};
    use rusqlite::{params, Connection};
    use std::sync::{Mutex, MutexGuard, PoisonError};

    use super::RecordSink;
    use crate::hazards::{HazardId, HazardRecord};
    use crate::{Result, RouteCandidate, RouteIntelError};

    impl From<rusqlite::Error> for RouteIntelError {
        fn from(e: rusqlite::Error) -> Self {
            RouteIntelError::PersistenceError {
                message: e.to_string(),
            }
        }
    }

    fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        rmp_serde::to_vec_named(value).map_err(|e| RouteIntelError::PersistenceError {
            message: format!("encode failed: {}", e),
        })
    }

    /// SQLite-backed record sink.
    pub struct SqliteStore {
        db: Mutex<Connection>,
        db_path: String,
    }

    impl std::fmt::Debug for SqliteStore {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("SqliteStore")
                .field("db_path", &self.db_path)
                .finish()
        }
    }

    impl SqliteStore {
        // ====================================================================
        // Initialization
        // ====================================================================

        /// Open (or create) the database at `db_path`.
        pub fn new(db_path: &str) -> Result<Self> {
            let db = Connection::open(db_path)?;
            Self::init_schema(&db)?;
            info!("[SqliteStore] Opened {}", db_path);
            Ok(Self {
                db: Mutex::new(db),
                db_path: db_path.to_string(),
            })
        }

        /// Create an in-memory database (for testing).
        pub fn in_memory() -> Result<Self> {
            Self::new(":memory:")
        }

        fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
            conn.execute_batch(
                r#"
                -- Learned route candidates
                CREATE TABLE IF NOT EXISTS routes (
                    id TEXT PRIMARY KEY,
                    kind TEXT NOT NULL,
                    origin_lat REAL NOT NULL,
                    origin_lng REAL NOT NULL,
                    destination_lat REAL NOT NULL,
                    destination_lng REAL NOT NULL,
                    data BLOB NOT NULL,
                    last_used_at INTEGER NOT NULL
                );

                -- Hazard records
                CREATE TABLE IF NOT EXISTS hazards (
                    id TEXT PRIMARY KEY,
                    kind TEXT NOT NULL,
                    lat REAL NOT NULL,
                    lng REAL NOT NULL,
                    data BLOB NOT NULL,
                    updated_at INTEGER NOT NULL
                );

                -- Indexes
                CREATE INDEX IF NOT EXISTS idx_routes_kind ON routes(kind);
                CREATE INDEX IF NOT EXISTS idx_hazards_kind ON hazards(kind);
            "#,
            )
        }

        fn conn(&self) -> MutexGuard<'_, Connection> {
            self.db.lock().unwrap_or_else(PoisonError::into_inner)
        }

        pub fn path(&self) -> &str {
            &self.db_path
        }

        // ====================================================================
        // Loading
        // ====================================================================

        /// All stored route candidates. Undecodable rows are skipped.
        pub fn load_routes(&self) -> Result<Vec<RouteCandidate>> {
            let conn = self.conn();
            let mut stmt = conn.prepare("SELECT id, data FROM routes ORDER BY id")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
            })?;

            let mut routes = Vec::new();
            for row in rows {
                let (id, blob) = row?;
                match rmp_serde::from_slice::<RouteCandidate>(&blob) {
                    Ok(candidate) => routes.push(candidate),
                    Err(e) => warn!("[SqliteStore] Skipping undecodable route {}: {}", id, e),
                }
            }
            info!("[SqliteStore] Loaded {} routes", routes.len());
            Ok(routes)
        }

        /// All stored hazard records. Undecodable rows are skipped.
        pub fn load_hazards(&self) -> Result<Vec<HazardRecord>> {
            let conn = self.conn();
            let mut stmt = conn.prepare("SELECT id, data FROM hazards ORDER BY id")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
            })?;

            let mut hazards = Vec::new();
            for row in rows {
                let (id, blob) = row?;
                match rmp_serde::from_slice::<HazardRecord>(&blob) {
                    Ok(record) => hazards.push(record),
                    Err(e) => warn!("[SqliteStore] Skipping undecodable hazard {}: {}", id, e),
                }
            }
            info!("[SqliteStore] Loaded {} hazards", hazards.len());
            Ok(hazards)
        }

        pub fn route_count(&self) -> Result<usize> {
            let count: i64 = self
                .conn()
                .query_row("SELECT COUNT(*) FROM routes", [], |row| row.get(0))?;
            Ok(count as usize)
        }

        pub fn hazard_count(&self) -> Result<usize> {
            let count: i64 = self
                .conn()
                .query_row("SELECT COUNT(*) FROM hazards", [], |row| row.get(0))?;
            Ok(count as usize)
        }

        /// Delete every stored record.
        pub fn clear(&self) -> Result<()> {
            self.conn()
                .execute_batch("DELETE FROM routes; DELETE FROM hazards;")?;
            Ok(())
        }
    }

    impl RecordSink for SqliteStore {
        fn route_saved(&self, candidate: &RouteCandidate) -> Result<()> {
            let data = encode(candidate)?;
            self.conn().execute(
                "INSERT OR REPLACE INTO routes
                 (id, kind, origin_lat, origin_lng, destination_lat, destination_lng, data, last_used_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    candidate.id,
                    candidate.kind.as_str(),
                    candidate.origin.latitude,
                    candidate.origin.longitude,
                    candidate.destination.latitude,
                    candidate.destination.longitude,
                    data,
                    candidate.last_used_at,
                ],
            )?;
            Ok(())
        }

        fn route_evicted(&self, route_id: &str) -> Result<()> {
            self.conn()
                .execute("DELETE FROM routes WHERE id = ?", params![route_id])?;
            Ok(())
        }

        fn hazard_saved(&self, record: &HazardRecord) -> Result<()> {
            let data = encode(record)?;
            let location = record.hazard.location();
            self.conn().execute(
                "INSERT OR REPLACE INTO hazards (id, kind, lat, lng, data, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
                params![
                    record.id.to_string(),
                    record.id.kind.as_str(),
                    location.latitude,
                    location.longitude,
                    data,
                    record.updated_at,
                ],
            )?;
            Ok(())
        }

        fn hazard_removed(&self, id: &HazardId) -> Result<()> {
            self.conn()
                .execute("DELETE FROM hazards WHERE id = ?", params![id.to_string()])?;
            Ok(())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::grid::GridConfig;
        use crate::hazards::{
            ConditionKind, ConditionSeverity, Hazard, HazardKind, RoadCondition, TrafficCell,
            TrafficLevel,
        };
        use crate::{GeoIndex, GeoPoint, RouteKind};

        fn candidate(id: &str) -> RouteCandidate {
            let origin = GeoPoint::new(35.700, 51.400);
            let destination = GeoPoint::new(35.710, 51.410);
            RouteCandidate {
                id: id.to_string(),
                origin,
                destination,
                waypoints: vec![origin, destination],
                distance_meters: 1_430.0,
                duration_seconds: 200.0,
                kind: RouteKind::Cycling,
                confidence: 0.5,
                usage_count: 2,
                success_rate: 1.0,
                last_used_at: 1_700_000_000_000,
            }
        }

        #[test]
        fn test_routes_saved_and_evicted() {
            let store = SqliteStore::in_memory().unwrap();
            store.route_saved(&candidate("a")).unwrap();
            store.route_saved(&candidate("b")).unwrap();
            // Saving again replaces the row
            store.route_saved(&candidate("a")).unwrap();
            assert_eq!(store.route_count().unwrap(), 2);

            store.route_evicted("b").unwrap();
            let routes = store.load_routes().unwrap();
            assert_eq!(routes, vec![candidate("a")]);
        }

        #[test]
        fn test_hazards_saved_and_removed() {
            let store = SqliteStore::in_memory().unwrap();
            let grid = GeoIndex::new(GridConfig::default());
            let p = GeoPoint::new(35.7025, 51.4025);
            let traffic = HazardRecord {
                id: HazardId::new(HazardKind::Traffic, 1),
                hazard: Hazard::Traffic(TrafficCell::uniform(&grid, &p, TrafficLevel::High)),
                updated_at: 10,
            };
            let road = HazardRecord {
                id: HazardId::new(HazardKind::RoadCondition, 2),
                hazard: Hazard::RoadCondition(RoadCondition {
                    location: p,
                    condition: ConditionKind::BridgeWork,
                    severity: ConditionSeverity::Critical,
                    length_meters: 120.0,
                    description: "lane closed".to_string(),
                }),
                updated_at: 11,
            };
            store.hazard_saved(&traffic).unwrap();
            store.hazard_saved(&road).unwrap();

            let loaded = store.load_hazards().unwrap();
            assert_eq!(loaded.len(), 2);
            assert!(loaded.contains(&traffic));
            assert!(loaded.contains(&road));

            store.hazard_removed(&traffic.id).unwrap();
            assert_eq!(store.hazard_count().unwrap(), 1);

            store.clear().unwrap();
            assert_eq!(store.hazard_count().unwrap(), 0);
        }

        #[test]
        fn test_reopen_file() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("routes.db");
            let path = path.to_str().unwrap();
            {
                let store = SqliteStore::new(path).unwrap();
                store.route_saved(&candidate("kept")).unwrap();
            }
            let store = SqliteStore::new(path).unwrap();
            assert_eq!(store.load_routes().unwrap().len(), 1);
        }
    }
}
