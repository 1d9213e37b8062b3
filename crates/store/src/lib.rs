//! Persistent store for the coverage aggregation engine.
//!
//! This crate provides the relational data model:
//! - Antenna identities (find-or-create, never deleted)
//! - Coverage grid cells keyed uniquely on (antenna, x, y)
//! - Read access to the gateway registry and installation history
//! - Streaming read access to the raw observation history
//!
//! PostgreSQL is the production backend; SQLite backs development and
//! tests.

pub mod error;
pub mod models;
pub mod postgres;
pub mod repos;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use postgres::PostgresStore;
pub use store::{GridStore, SqliteStore};

use gridcover_core::config::StoreConfig;
use std::sync::Arc;

/// Rows per INSERT statement for bulk cell writes. A grid cell binds 17
/// values, so 500 rows stays an order of magnitude under both engines'
/// bind-parameter limits.
pub(crate) const CELL_INSERT_CHUNK_ROWS: usize = 500;

/// Split an embedded schema into individually executable statements.
pub(crate) fn schema_statements(schema: &str) -> impl Iterator<Item = &str> {
    schema.split(';').map(str::trim).filter(|statement| {
        statement.lines().any(|line| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with("--")
        })
    })
}

/// Create an aggregation store from configuration.
pub async fn from_config(config: &StoreConfig) -> StoreResult<Arc<dyn GridStore>> {
    match config {
        StoreConfig::Sqlite { path } => {
            let store = SqliteStore::new(path).await?;
            Ok(Arc::new(store) as Arc<dyn GridStore>)
        }
        StoreConfig::Postgres {
            url,
            host,
            port,
            username,
            password,
            database,
            max_connections,
            statement_timeout_ms,
        } => {
            let store = if let Some(url) = url {
                tracing::info!("Connecting to PostgreSQL using connection URL");
                PostgresStore::from_url(url, *max_connections, *statement_timeout_ms).await?
            } else if let (Some(host), Some(database)) = (host.as_ref(), database.as_ref()) {
                PostgresStore::from_params(
                    host,
                    port.unwrap_or(5432),
                    username.as_deref(),
                    password.as_deref(),
                    database,
                    *max_connections,
                    *statement_timeout_ms,
                )
                .await?
            } else {
                return Err(StoreError::Config(
                    "postgres config requires either 'url' or 'host' + 'database'".to_string(),
                ));
            };
            Ok(Arc::new(store) as Arc<dyn GridStore>)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GridCellRow;
    use crate::repos::observations::ObservationRepo;
    use futures::TryStreamExt;
    use gridcover_core::signal::SignalBucket;
    use time::macros::datetime;

    async fn open_store() -> (tempfile::TempDir, Arc<dyn GridStore>) {
        let temp = tempfile::tempdir().unwrap();
        let config = StoreConfig::Sqlite {
            path: temp.path().join("store.db"),
        };
        let store = from_config(&config).await.unwrap();
        store.health_check().await.unwrap();
        (temp, store)
    }

    #[test]
    fn schema_splits_into_statements() {
        let statements: Vec<_> = schema_statements(
            "-- leading comment\nCREATE TABLE a (x INTEGER);\n\nCREATE INDEX i ON a (x);\n-- trailing comment\n",
        )
        .collect();
        assert_eq!(statements.len(), 2);
        assert!(statements[0].starts_with("-- leading comment"));
        assert!(statements[1].starts_with("CREATE INDEX"));
    }

    #[tokio::test]
    async fn antenna_identity_is_minted_once() {
        let (_temp, store) = open_store().await;

        let first = store
            .find_or_create_antenna("NS_TTS_V3://ttn", "eui-aa01", 0)
            .await
            .unwrap();
        let second = store
            .find_or_create_antenna("NS_TTS_V3://ttn", "eui-aa01", 0)
            .await
            .unwrap();
        assert_eq!(first.id, second.id);

        // A different index on the same gateway is a different identity.
        let other = store
            .find_or_create_antenna("NS_TTS_V3://ttn", "eui-aa01", 1)
            .await
            .unwrap();
        assert_ne!(first.id, other.id);
    }

    #[tokio::test]
    async fn save_cell_upserts_by_key() {
        let (_temp, store) = open_store().await;

        let mut cell = store.find_or_create_cell(3, 100, 200).await.unwrap();
        cell.record(SignalBucket::High, datetime!(2024-05-01 08:00:00 UTC));
        store.save_cell(&cell).await.unwrap();
        cell.record(SignalBucket::B110, datetime!(2024-05-01 09:00:00 UTC));
        store.save_cell(&cell).await.unwrap();

        let rows = store.cells_for_antenna(3).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].bucket_high, 1);
        assert_eq!(rows[0].bucket_110, 1);
        assert_eq!(rows[0].last_updated, datetime!(2024-05-01 09:00:00 UTC));
    }

    #[tokio::test]
    async fn bulk_insert_lands_every_chunk() {
        let (_temp, store) = open_store().await;

        // More rows than one insert chunk holds.
        let cells: Vec<GridCellRow> = (0..1203)
            .map(|i| {
                let mut cell = GridCellRow::new(9, i, i + 1);
                cell.record(SignalBucket::B120, datetime!(2024-01-01 00:00:00 UTC));
                cell
            })
            .collect();

        store.insert_cells(&cells).await.unwrap();

        let rows = store.cells_for_antenna(9).await.unwrap();
        assert_eq!(rows.len(), 1203);
        assert!(rows.iter().all(|row| row.bucket_120 == 1));
    }

    #[tokio::test]
    async fn delete_cells_reports_count() {
        let (_temp, store) = open_store().await;

        for x in 0..4 {
            let cell = store.find_or_create_cell(5, x, 0).await.unwrap();
            store.save_cell(&cell).await.unwrap();
        }

        assert_eq!(store.delete_cells_for_antenna(5).await.unwrap(), 4);
        assert!(store.cells_for_antenna(5).await.unwrap().is_empty());
        assert_eq!(store.delete_cells_for_antenna(5).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn observation_stream_filters_cutoff_and_experiments() {
        let temp = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(temp.path().join("store.db")).await.unwrap();

        // Seed the collaborator-owned history table directly.
        for (time, experiment_id) in [
            (datetime!(2024-01-01 00:00:00 UTC), None),
            (datetime!(2024-03-01 00:00:00 UTC), None),
            (datetime!(2024-03-02 00:00:00 UTC), Some(7_i64)),
            (datetime!(2024-04-01 00:00:00 UTC), None),
        ] {
            sqlx::query(
                "INSERT INTO packets (antenna_id, time, latitude, longitude, rssi, snr, experiment_id)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(11_i64)
            .bind(time)
            .bind(52.1)
            .bind(4.3)
            .bind(-101.5_f32)
            .bind(2.0_f32)
            .bind(experiment_id)
            .execute(store.pool())
            .await
            .unwrap();
        }

        let rows: Vec<_> = store
            .stream_observations(11, datetime!(2024-02-01 00:00:00 UTC))
            .try_collect()
            .await
            .unwrap();

        // The pre-cutoff row and the experiment row are both excluded.
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row.antenna_id == 11));
        assert_eq!(rows[0].rssi, -101.5);
    }
}
