//! Shared test harness: a temp-dir SQLite store plus the full engine
//! stack, and raw-sqlx seeding for the collaborator-owned tables.

use gridcover_core::messages::{ReceptionReport, UplinkMessage};
use gridcover_engine::{
    AntennaRegistry, GatewayRangeFilter, GridCellStore, LiveAggregator, ReprocessEngine,
};
use gridcover_store::{GridStore, SqliteStore};
use std::sync::Arc;
use tempfile::TempDir;
use time::OffsetDateTime;

/// Range limit used throughout the tests.
pub const MAX_RANGE_KM: f64 = 100.0;

#[allow(dead_code)]
pub struct Harness {
    pub sqlite: Arc<SqliteStore>,
    pub store: Arc<dyn GridStore>,
    pub registry: Arc<AntennaRegistry>,
    pub filter: Arc<GatewayRangeFilter>,
    pub cells: Arc<GridCellStore>,
    pub live: Arc<LiveAggregator>,
    pub reprocess: Arc<ReprocessEngine>,
    _temp: TempDir,
}

#[allow(dead_code)]
impl Harness {
    pub async fn new() -> Self {
        let temp = tempfile::tempdir().expect("failed to create temp directory");
        let sqlite = Arc::new(
            SqliteStore::new(temp.path().join("grid.db"))
                .await
                .expect("failed to open sqlite store"),
        );
        let store: Arc<dyn GridStore> = sqlite.clone();

        let registry = Arc::new(AntennaRegistry::new(store.clone()));
        let filter = Arc::new(GatewayRangeFilter::new(store.clone(), MAX_RANGE_KM));
        let cells = Arc::new(GridCellStore::new(store.clone()));
        let live = Arc::new(LiveAggregator::new(
            registry.clone(),
            filter.clone(),
            cells.clone(),
        ));
        let reprocess = Arc::new(ReprocessEngine::new(
            store.clone(),
            filter.clone(),
            cells.clone(),
        ));

        Self {
            sqlite,
            store,
            registry,
            filter,
            cells,
            live,
            reprocess,
            _temp: temp,
        }
    }

    pub async fn seed_gateway(
        &self,
        network_id: &str,
        gateway_id: &str,
        latitude: Option<f64>,
        longitude: Option<f64>,
    ) {
        sqlx::query(
            "INSERT INTO gateways (network_id, gateway_id, latitude, longitude) VALUES (?, ?, ?, ?)",
        )
        .bind(network_id)
        .bind(gateway_id)
        .bind(latitude)
        .bind(longitude)
        .execute(self.sqlite.pool())
        .await
        .unwrap();
    }

    pub async fn seed_installation(
        &self,
        network_id: &str,
        gateway_id: &str,
        latitude: f64,
        longitude: f64,
        installed_at: OffsetDateTime,
    ) {
        sqlx::query(
            "INSERT INTO gateway_locations (network_id, gateway_id, latitude, longitude, installed_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(network_id)
        .bind(gateway_id)
        .bind(latitude)
        .bind(longitude)
        .bind(installed_at)
        .execute(self.sqlite.pool())
        .await
        .unwrap();
    }

    pub async fn seed_packet(
        &self,
        antenna_id: i64,
        at: OffsetDateTime,
        latitude: f64,
        longitude: f64,
        rssi: f32,
        snr: f32,
        experiment_id: Option<i64>,
    ) {
        sqlx::query(
            "INSERT INTO packets (antenna_id, time, latitude, longitude, rssi, snr, experiment_id)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(antenna_id)
        .bind(at)
        .bind(latitude)
        .bind(longitude)
        .bind(rssi)
        .bind(snr)
        .bind(experiment_id)
        .execute(self.sqlite.pool())
        .await
        .unwrap();
    }

    /// Count of persisted cells for one key, straight from the store.
    pub async fn rows_for_key(&self, antenna_id: i64, x: i64, y: i64) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM grid_cells WHERE antenna_id = ? AND x = ? AND y = ?")
            .bind(antenna_id)
            .bind(x)
            .bind(y)
            .fetch_one(self.sqlite.pool())
            .await
            .unwrap()
    }
}

/// A reception report with sensible defaults.
#[allow(dead_code)]
pub fn report(network_id: &str, gateway_id: &str, rssi: f32, snr: f32) -> ReceptionReport {
    ReceptionReport {
        network_id: network_id.to_string(),
        gateway_id: gateway_id.to_string(),
        antenna_index: 0,
        rssi,
        snr,
    }
}

/// An uplink message carrying the given reception reports.
#[allow(dead_code)]
pub fn uplink(
    latitude: f64,
    longitude: f64,
    at: OffsetDateTime,
    gateways: Vec<ReceptionReport>,
) -> UplinkMessage {
    UplinkMessage {
        network_id: gateways
            .first()
            .map(|g| g.network_id.clone())
            .unwrap_or_default(),
        latitude,
        longitude,
        time: at.unix_timestamp_nanos() as i64,
        experiment: String::new(),
        gateways,
    }
}
