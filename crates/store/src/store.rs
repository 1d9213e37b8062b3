//! Combined store trait and the SQLite implementation.

use crate::error::{StoreError, StoreResult};
use crate::models::{AntennaRow, GatewayRow, GridCellRow, ObservationRow};
use crate::repos::{AntennaRepo, GatewayRepo, GridCellRepo, ObservationRepo};
use crate::{schema_statements, CELL_INSERT_CHUNK_ROWS};
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, QueryBuilder, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use time::OffsetDateTime;

/// SQLite schema (embedded).
const SQLITE_SCHEMA: &str = include_str!("sqlite_schema.sql");

/// Combined aggregation store trait.
#[async_trait]
pub trait GridStore:
    AntennaRepo + GatewayRepo + GridCellRepo + ObservationRepo + Send + Sync
{
    /// Apply the embedded schema.
    async fn migrate(&self) -> StoreResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> StoreResult<()>;
}

/// SQLite-based aggregation store, for development and tests.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Create a new SQLite store backed by a database file.
    pub async fn new(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // SQLite permits limited write concurrency; a single connection
            // avoids persistent "database is locked" failures under the
            // fire-and-continue worker load in tests.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl GridStore for SqliteStore {
    async fn migrate(&self) -> StoreResult<()> {
        for statement in schema_statements(SQLITE_SCHEMA) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl AntennaRepo for SqliteStore {
    async fn find_or_create_antenna(
        &self,
        network_id: &str,
        gateway_id: &str,
        antenna_index: i32,
    ) -> StoreResult<AntennaRow> {
        let existing = sqlx::query_as::<_, AntennaRow>(
            "SELECT * FROM antennas WHERE network_id = ? AND gateway_id = ? AND antenna_index = ?",
        )
        .bind(network_id)
        .bind(gateway_id)
        .bind(antenna_index)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = existing {
            return Ok(row);
        }

        sqlx::query(
            "INSERT INTO antennas (network_id, gateway_id, antenna_index) VALUES (?, ?, ?)
             ON CONFLICT (network_id, gateway_id, antenna_index) DO NOTHING",
        )
        .bind(network_id)
        .bind(gateway_id)
        .bind(antenna_index)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query_as::<_, AntennaRow>(
            "SELECT * FROM antennas WHERE network_id = ? AND gateway_id = ? AND antenna_index = ?",
        )
        .bind(network_id)
        .bind(gateway_id)
        .bind(antenna_index)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn antennas_for_gateway(
        &self,
        network_id: &str,
        gateway_id: &str,
    ) -> StoreResult<Vec<AntennaRow>> {
        let rows = sqlx::query_as::<_, AntennaRow>(
            "SELECT * FROM antennas WHERE network_id = ? AND gateway_id = ? ORDER BY antenna_index",
        )
        .bind(network_id)
        .bind(gateway_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl GatewayRepo for SqliteStore {
    async fn find_gateway(
        &self,
        network_id: &str,
        gateway_id: &str,
    ) -> StoreResult<Option<GatewayRow>> {
        let row = sqlx::query_as::<_, GatewayRow>(
            "SELECT * FROM gateways WHERE network_id = ? AND gateway_id = ?",
        )
        .bind(network_id)
        .bind(gateway_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_gateways(&self) -> StoreResult<Vec<GatewayRow>> {
        let rows = sqlx::query_as::<_, GatewayRow>(
            "SELECT * FROM gateways ORDER BY network_id, gateway_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn gateways_by_gateway_id(&self, gateway_id: &str) -> StoreResult<Vec<GatewayRow>> {
        let rows = sqlx::query_as::<_, GatewayRow>(
            "SELECT * FROM gateways WHERE gateway_id = ? ORDER BY network_id",
        )
        .bind(gateway_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn latest_installation(
        &self,
        network_id: &str,
        gateway_id: &str,
    ) -> StoreResult<Option<OffsetDateTime>> {
        let installed_at: Option<OffsetDateTime> = sqlx::query_scalar(
            "SELECT max(installed_at) FROM gateway_locations
             WHERE network_id = ? AND gateway_id = ?",
        )
        .bind(network_id)
        .bind(gateway_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(installed_at)
    }
}

#[async_trait]
impl GridCellRepo for SqliteStore {
    async fn find_or_create_cell(
        &self,
        antenna_id: i64,
        x: i64,
        y: i64,
    ) -> StoreResult<GridCellRow> {
        let existing = sqlx::query_as::<_, GridCellRow>(
            "SELECT * FROM grid_cells WHERE antenna_id = ? AND x = ? AND y = ?",
        )
        .bind(antenna_id)
        .bind(x)
        .bind(y)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = existing {
            return Ok(row);
        }

        sqlx::query(
            "INSERT INTO grid_cells (antenna_id, x, y, last_updated) VALUES (?, ?, ?, ?)
             ON CONFLICT (antenna_id, x, y) DO NOTHING",
        )
        .bind(antenna_id)
        .bind(x)
        .bind(y)
        .bind(OffsetDateTime::UNIX_EPOCH)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query_as::<_, GridCellRow>(
            "SELECT * FROM grid_cells WHERE antenna_id = ? AND x = ? AND y = ?",
        )
        .bind(antenna_id)
        .bind(x)
        .bind(y)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn save_cell(&self, cell: &GridCellRow) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO grid_cells (
                antenna_id, x, y, last_updated,
                bucket_high, bucket_100, bucket_105, bucket_110, bucket_115,
                bucket_120, bucket_125, bucket_130, bucket_135, bucket_140,
                bucket_145, bucket_low, bucket_no_signal
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (antenna_id, x, y) DO UPDATE SET
                last_updated = excluded.last_updated,
                bucket_high = excluded.bucket_high,
                bucket_100 = excluded.bucket_100,
                bucket_105 = excluded.bucket_105,
                bucket_110 = excluded.bucket_110,
                bucket_115 = excluded.bucket_115,
                bucket_120 = excluded.bucket_120,
                bucket_125 = excluded.bucket_125,
                bucket_130 = excluded.bucket_130,
                bucket_135 = excluded.bucket_135,
                bucket_140 = excluded.bucket_140,
                bucket_145 = excluded.bucket_145,
                bucket_low = excluded.bucket_low,
                bucket_no_signal = excluded.bucket_no_signal
            "#,
        )
        .bind(cell.antenna_id)
        .bind(cell.x)
        .bind(cell.y)
        .bind(cell.last_updated)
        .bind(cell.bucket_high)
        .bind(cell.bucket_100)
        .bind(cell.bucket_105)
        .bind(cell.bucket_110)
        .bind(cell.bucket_115)
        .bind(cell.bucket_120)
        .bind(cell.bucket_125)
        .bind(cell.bucket_130)
        .bind(cell.bucket_135)
        .bind(cell.bucket_140)
        .bind(cell.bucket_145)
        .bind(cell.bucket_low)
        .bind(cell.bucket_no_signal)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_cells_for_antenna(&self, antenna_id: i64) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM grid_cells WHERE antenna_id = ?")
            .bind(antenna_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert_cells(&self, cells: &[GridCellRow]) -> StoreResult<()> {
        if cells.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for chunk in cells.chunks(CELL_INSERT_CHUNK_ROWS) {
            let mut builder = QueryBuilder::<Sqlite>::new(
                "INSERT INTO grid_cells (
                    antenna_id, x, y, last_updated,
                    bucket_high, bucket_100, bucket_105, bucket_110, bucket_115,
                    bucket_120, bucket_125, bucket_130, bucket_135, bucket_140,
                    bucket_145, bucket_low, bucket_no_signal
                ) ",
            );
            builder.push_values(chunk, |mut b, cell| {
                b.push_bind(cell.antenna_id)
                    .push_bind(cell.x)
                    .push_bind(cell.y)
                    .push_bind(cell.last_updated)
                    .push_bind(cell.bucket_high)
                    .push_bind(cell.bucket_100)
                    .push_bind(cell.bucket_105)
                    .push_bind(cell.bucket_110)
                    .push_bind(cell.bucket_115)
                    .push_bind(cell.bucket_120)
                    .push_bind(cell.bucket_125)
                    .push_bind(cell.bucket_130)
                    .push_bind(cell.bucket_135)
                    .push_bind(cell.bucket_140)
                    .push_bind(cell.bucket_145)
                    .push_bind(cell.bucket_low)
                    .push_bind(cell.bucket_no_signal);
            });
            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn cells_for_antenna(&self, antenna_id: i64) -> StoreResult<Vec<GridCellRow>> {
        let rows = sqlx::query_as::<_, GridCellRow>(
            "SELECT * FROM grid_cells WHERE antenna_id = ? ORDER BY x, y",
        )
        .bind(antenna_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

impl ObservationRepo for SqliteStore {
    fn stream_observations(
        &self,
        antenna_id: i64,
        after: OffsetDateTime,
    ) -> BoxStream<'_, StoreResult<ObservationRow>> {
        sqlx::query_as::<_, ObservationRow>(
            "SELECT antenna_id, time, latitude, longitude, rssi, snr FROM packets
             WHERE antenna_id = ? AND time > ? AND experiment_id IS NULL",
        )
        .bind(antenna_id)
        .bind(after)
        .fetch(&self.pool)
        .map(|row| row.map_err(StoreError::from))
        .boxed()
    }
}
