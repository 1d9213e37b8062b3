//! In-process seam between the bus transport and the aggregation engine.
//!
//! Each worker loop drains one queue of raw payloads and dispatches every
//! decoded message on its own task (fire-and-continue), so one slow store
//! lookup never stalls the stream behind it. Failures stay local to their
//! message; the loops themselves only end when the transport side hangs up.

use crate::metrics;
use gridcover_core::messages::{GatewayMovedMessage, UplinkMessage};
use gridcover_engine::{LiveAggregator, ReportOutcome, ReprocessEngine};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

/// Drain uplink payloads and fold each into the grid.
pub async fn run_live_worker(
    mut deliveries: mpsc::Receiver<Vec<u8>>,
    live: Arc<LiveAggregator>,
) {
    while let Some(payload) = deliveries.recv().await {
        let message: UplinkMessage = match serde_json::from_slice(&payload) {
            Ok(message) => message,
            Err(error) => {
                // Dropped without retry: the producer side does not
                // redeliver on our behalf.
                metrics::MALFORMED_MESSAGES.with_label_values(&["uplink"]).inc();
                tracing::debug!(error = %error, "Dropping malformed uplink payload");
                continue;
            }
        };

        let live = live.clone();
        tokio::spawn(async move {
            let started = Instant::now();
            let outcomes = live.apply(&message).await;

            metrics::OBSERVATIONS_PROCESSED.inc();
            for outcome in &outcomes {
                match outcome {
                    ReportOutcome::Updated(_) => metrics::CELLS_UPDATED.inc(),
                    ReportOutcome::Discarded(_) => metrics::REPORTS_DISCARDED.inc(),
                    ReportOutcome::Failed(_) => metrics::REPORTS_FAILED.inc(),
                }
            }
            metrics::LIVE_MESSAGE_DURATION.observe(started.elapsed().as_secs_f64());
        });
    }

    tracing::info!("Live worker stopped: uplink queue closed");
}

/// Drain relocation payloads and rebuild the affected antennas.
pub async fn run_relocation_worker(
    mut deliveries: mpsc::Receiver<Vec<u8>>,
    reprocess: Arc<ReprocessEngine>,
) {
    while let Some(payload) = deliveries.recv().await {
        let message: GatewayMovedMessage = match serde_json::from_slice(&payload) {
            Ok(message) => message,
            Err(error) => {
                metrics::MALFORMED_MESSAGES
                    .with_label_values(&["gateway_moved"])
                    .inc();
                tracing::debug!(error = %error, "Dropping malformed relocation payload");
                continue;
            }
        };

        let reprocess = reprocess.clone();
        tokio::spawn(async move {
            let started = Instant::now();
            metrics::RELOCATIONS_PROCESSED.inc();

            match reprocess.handle_relocation(&message).await {
                Ok(summaries) => {
                    for summary in &summaries {
                        metrics::CELLS_DELETED.inc_by(summary.cells_deleted);
                        metrics::HISTORY_ROWS_REPLAYED.inc_by(summary.observations_replayed);
                        metrics::CELLS_REBUILT.inc_by(summary.cells_written as u64);
                    }
                }
                Err(error) => {
                    // Fatal for this rebuild only: the affected antennas are
                    // left with zero cells and self-heal on the next rebuild.
                    tracing::error!(
                        network_id = %message.network_id,
                        gateway_id = %message.gateway_id,
                        error = %error,
                        "Gateway rebuild failed"
                    );
                }
            }
            metrics::REBUILD_DURATION.observe(started.elapsed().as_secs_f64());
        });
    }

    tracing::info!("Relocation worker stopped: event queue closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppState;
    use gridcover_core::config::AppConfig;
    use gridcover_store::{GridStore, SqliteStore};
    use std::time::Duration;
    use time::macros::datetime;

    async fn build_state(temp: &tempfile::TempDir) -> (Arc<SqliteStore>, AppState) {
        let sqlite = Arc::new(
            SqliteStore::new(temp.path().join("grid.db")).await.unwrap(),
        );
        let store: Arc<dyn GridStore> = sqlite.clone();
        (sqlite, AppState::new(AppConfig::default(), store))
    }

    #[tokio::test]
    async fn live_worker_survives_malformed_payloads() {
        let temp = tempfile::tempdir().unwrap();
        let (sqlite, state) = build_state(&temp).await;

        sqlx::query("INSERT INTO gateways (network_id, gateway_id, latitude, longitude) VALUES (?, ?, ?, ?)")
            .bind("net")
            .bind("gw-1")
            .bind(52.3)
            .bind(4.9)
            .execute(sqlite.pool())
            .await
            .unwrap();

        let (tx, rx) = mpsc::channel(16);
        let worker = tokio::spawn(run_live_worker(rx, state.live.clone()));

        tx.send(b"not json at all".to_vec()).await.unwrap();

        let valid = serde_json::json!({
            "network_id": "net",
            "latitude": 52.301,
            "longitude": 4.901,
            "time": datetime!(2024-06-01 10:00:00 UTC).unix_timestamp_nanos() as i64,
            "gateways": [{"network_id": "net", "gateway_id": "gw-1", "rssi": -90.0, "snr": 0.0}]
        });
        tx.send(serde_json::to_vec(&valid).unwrap()).await.unwrap();

        // The dispatched task lands asynchronously; poll the store for it.
        let antenna = state.store.find_or_create_antenna("net", "gw-1", 0).await.unwrap();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            let cells = state.store.cells_for_antenna(antenna.id).await.unwrap();
            if cells.len() == 1 && cells[0].bucket_high == 1 {
                break;
            }
            if tokio::time::Instant::now() > deadline {
                panic!("observation never reached the grid");
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        drop(tx);
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn relocation_worker_drops_malformed_payloads_and_continues() {
        let temp = tempfile::tempdir().unwrap();
        let (sqlite, state) = build_state(&temp).await;

        sqlx::query("INSERT INTO gateways (network_id, gateway_id, latitude, longitude) VALUES (?, ?, ?, ?)")
            .bind("net")
            .bind("gw-2")
            .bind(52.3)
            .bind(4.9)
            .execute(sqlite.pool())
            .await
            .unwrap();
        let antenna = state.store.find_or_create_antenna("net", "gw-2", 0).await.unwrap();
        let stale = gridcover_store::models::GridCellRow::new(antenna.id, 4, 4);
        state.store.save_cell(&stale).await.unwrap();

        let (tx, rx) = mpsc::channel(16);
        let worker = tokio::spawn(run_relocation_worker(rx, state.reprocess.clone()));

        tx.send(b"{\"gateway_id\": 42}".to_vec()).await.unwrap();

        let valid = serde_json::json!({
            "network_id": "net",
            "gateway_id": "gw-2",
            "time": datetime!(2024-06-01 10:00:00 UTC).unix_timestamp_nanos() as i64
        });
        tx.send(serde_json::to_vec(&valid).unwrap()).await.unwrap();

        // No history after the (missing) install cutoff: the rebuild must
        // leave the antenna empty.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            if state.store.cells_for_antenna(antenna.id).await.unwrap().is_empty() {
                break;
            }
            if tokio::time::Instant::now() > deadline {
                panic!("stale cells were never removed");
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        drop(tx);
        worker.await.unwrap();
    }
}
