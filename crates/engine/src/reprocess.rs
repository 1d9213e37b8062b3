//! Rebuild-on-relocation.
//!
//! When a gateway's known location changes, every coverage cell derived
//! from it is stale. The rebuild discards an antenna's cells up front,
//! replays the raw history after the latest installation through the same
//! gates as the live path, and lands the result in one transaction — so an
//! antenna is always either fully rebuilt or visibly empty, never a
//! convincing half-state.

use crate::cells::GridCellStore;
use crate::error::{EngineError, EngineResult};
use crate::range::GatewayRangeFilter;
use dashmap::DashMap;
use futures::TryStreamExt;
use gridcover_core::messages::GatewayMovedMessage;
use gridcover_core::signal::classify;
use gridcover_core::tile;
use gridcover_store::models::{AntennaRow, GridCellKey, GridCellRow};
use gridcover_store::GridStore;
use std::collections::HashMap;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::Mutex;

/// What one antenna rebuild did.
#[derive(Debug, Clone, Copy)]
pub struct RebuildSummary {
    pub antenna_id: i64,
    pub cells_deleted: u64,
    pub observations_replayed: u64,
    pub cells_written: usize,
}

/// Rebuilds antennas' coverage from raw observation history.
pub struct ReprocessEngine {
    store: Arc<dyn GridStore>,
    filter: Arc<GatewayRangeFilter>,
    cells: Arc<GridCellStore>,
    /// One lock per antenna id: two concurrent rebuilds of the same
    /// antenna would race their delete/insert pairs on the unique key.
    locks: DashMap<i64, Arc<Mutex<()>>>,
}

impl ReprocessEngine {
    pub fn new(
        store: Arc<dyn GridStore>,
        filter: Arc<GatewayRangeFilter>,
        cells: Arc<GridCellStore>,
    ) -> Self {
        Self {
            store,
            filter,
            cells,
            locks: DashMap::new(),
        }
    }

    /// Handle a relocation event: evict the now-stale cached gateway
    /// record, then rebuild every antenna of that gateway.
    pub async fn handle_relocation(
        &self,
        message: &GatewayMovedMessage,
    ) -> EngineResult<Vec<RebuildSummary>> {
        tracing::info!(
            network_id = %message.network_id,
            gateway_id = %message.gateway_id,
            moved_at = %message.timestamp(),
            "Gateway relocated"
        );
        self.filter
            .invalidate(&message.network_id, &message.gateway_id);
        self.rebuild_gateway(&message.network_id, &message.gateway_id)
            .await
    }

    /// Rebuild every antenna of one gateway.
    pub async fn rebuild_gateway(
        &self,
        network_id: &str,
        gateway_id: &str,
    ) -> EngineResult<Vec<RebuildSummary>> {
        let antennas = self
            .store
            .antennas_for_gateway(network_id, gateway_id)
            .await
            .map_err(EngineError::Lookup)?;

        let mut summaries = Vec::with_capacity(antennas.len());
        for antenna in &antennas {
            summaries.push(self.rebuild_antenna(antenna).await?);
        }
        Ok(summaries)
    }

    /// Operator entry: rebuild a named set of gateway ids. The same id can
    /// exist in several networks; all of them are rebuilt.
    pub async fn rebuild_gateways(&self, gateway_ids: &[String]) -> EngineResult<Vec<RebuildSummary>> {
        let mut summaries = Vec::new();
        for gateway_id in gateway_ids {
            let gateways = self
                .store
                .gateways_by_gateway_id(gateway_id)
                .await
                .map_err(EngineError::Lookup)?;
            if gateways.is_empty() {
                tracing::warn!(gateway_id = %gateway_id, "No gateway with this id, nothing to rebuild");
            }
            for gateway in &gateways {
                summaries
                    .extend(self.rebuild_gateway(&gateway.network_id, &gateway.gateway_id).await?);
            }
        }
        Ok(summaries)
    }

    /// Operator entry: rebuild every known gateway, skipping the first
    /// `offset` to resume an interrupted run.
    pub async fn rebuild_all(&self, offset: usize) -> EngineResult<Vec<RebuildSummary>> {
        let gateways = self.store.list_gateways().await.map_err(EngineError::Lookup)?;
        let total = gateways.len();

        let mut summaries = Vec::new();
        for (position, gateway) in gateways.into_iter().enumerate().skip(offset) {
            tracing::info!(
                position,
                total,
                network_id = %gateway.network_id,
                gateway_id = %gateway.gateway_id,
                "Rebuilding gateway"
            );
            summaries.extend(
                self.rebuild_gateway(&gateway.network_id, &gateway.gateway_id)
                    .await?,
            );
        }
        Ok(summaries)
    }

    /// Rebuild one antenna from its raw history.
    ///
    /// Serialized per antenna id; a relocation event arriving while the
    /// same antenna is mid-rebuild queues behind it instead of racing.
    pub async fn rebuild_antenna(&self, antenna: &AntennaRow) -> EngineResult<RebuildSummary> {
        let lock = self
            .locks
            .entry(antenna.id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // History at or before the latest installation belongs to the
        // previous location; no recorded installation means replay all.
        let cutoff = self
            .store
            .latest_installation(&antenna.network_id, &antenna.gateway_id)
            .await
            .map_err(EngineError::Lookup)?
            .unwrap_or(OffsetDateTime::UNIX_EPOCH);

        let cells_deleted = self.cells.invalidate_antenna(antenna.id).await?;

        // Resolve the gateway location once, outside the cursor: the
        // per-row gate below is then a pure distance check.
        let location = self
            .filter
            .locate(&antenna.network_id, &antenna.gateway_id)
            .await?;

        let mut rebuilt: HashMap<GridCellKey, GridCellRow> = HashMap::new();
        let mut observations_replayed = 0_u64;

        {
            let mut history = self.store.stream_observations(antenna.id, cutoff);
            while let Some(observation) = history.try_next().await.map_err(EngineError::Lookup)? {
                observations_replayed += 1;

                if !self
                    .filter
                    .check(location, observation.latitude, observation.longitude)
                {
                    continue;
                }
                if tile::check_coordinates(observation.latitude, observation.longitude).is_err() {
                    continue;
                }

                let tile = tile::tile_at(observation.latitude, observation.longitude);
                let key = GridCellKey {
                    antenna_id: antenna.id,
                    x: tile.x,
                    y: tile.y,
                };
                rebuilt
                    .entry(key)
                    .or_insert_with(|| GridCellRow::new(antenna.id, tile.x, tile.y))
                    .record(classify(observation.rssi, observation.snr), observation.time);
            }
        }

        let cells_written = rebuilt.len();
        self.cells
            .bulk_replace(rebuilt.into_values().collect())
            .await?;

        tracing::info!(
            antenna_id = antenna.id,
            cells_deleted,
            observations_replayed,
            cells_written,
            "Antenna rebuilt"
        );

        Ok(RebuildSummary {
            antenna_id: antenna.id,
            cells_deleted,
            observations_replayed,
            cells_written,
        })
    }
}
