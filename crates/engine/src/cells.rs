//! Read-through cache over the grid-cell table.
//!
//! The cache and the store are not transactionally linked: a crash between
//! the two writes leaves them divergent until the next restart (which
//! starts cold) or the next antenna invalidation. That weak consistency is
//! an accepted property of a coverage-map aggregate, and the unique key on
//! (antenna, x, y) in the store remains the final arbiter.

use crate::error::{EngineError, EngineResult};
use dashmap::DashMap;
use gridcover_core::tile;
use gridcover_store::models::{GridCellKey, GridCellRow};
use gridcover_store::GridStore;
use std::sync::Arc;

/// Read-through cache plus persistence for coverage grid cells.
pub struct GridCellStore {
    store: Arc<dyn GridStore>,
    cache: DashMap<GridCellKey, GridCellRow>,
}

impl GridCellStore {
    pub fn new(store: Arc<dyn GridStore>) -> Self {
        Self {
            store,
            cache: DashMap::new(),
        }
    }

    /// Locate (and on first use create) the cell an observation falls in.
    ///
    /// The single [`tile::tile_at`] call here feeds both the cache key and
    /// the store key, so the two can never disagree about where a fix
    /// lands.
    pub async fn get_or_create(
        &self,
        antenna_id: i64,
        latitude: f64,
        longitude: f64,
    ) -> EngineResult<GridCellRow> {
        tile::check_coordinates(latitude, longitude)?;
        let tile = tile::tile_at(latitude, longitude);
        let key = GridCellKey {
            antenna_id,
            x: tile.x,
            y: tile.y,
        };

        if let Some(cell) = self.cache.get(&key) {
            return Ok(cell.clone());
        }

        let row = self
            .store
            .find_or_create_cell(antenna_id, tile.x, tile.y)
            .await
            .map_err(EngineError::Lookup)?;
        self.cache.insert(key, row.clone());
        Ok(row)
    }

    /// Persist one live-path cell, then write the identical value through
    /// to the cache.
    pub async fn save(&self, cell: GridCellRow) -> EngineResult<()> {
        self.store
            .save_cell(&cell)
            .await
            .map_err(EngineError::Persistence)?;
        self.cache.insert(cell.key(), cell);
        Ok(())
    }

    /// Evict and delete every cell an antenna ever produced, returning the
    /// number of persisted rows removed.
    ///
    /// First step of a rebuild: once this ran, a crash leaves the antenna
    /// visibly empty and self-healing — never a stale/fresh mixture that
    /// looks complete.
    pub async fn invalidate_antenna(&self, antenna_id: i64) -> EngineResult<u64> {
        self.cache.retain(|key, _| key.antenna_id != antenna_id);
        let deleted = self
            .store
            .delete_cells_for_antenna(antenna_id)
            .await
            .map_err(EngineError::Persistence)?;
        Ok(deleted)
    }

    /// Bulk-load a rebuilt antenna: one all-or-nothing insert (pure insert,
    /// the old rows were deleted up front), then warm the cache with the
    /// rows that are now authoritative.
    pub async fn bulk_replace(&self, cells: Vec<GridCellRow>) -> EngineResult<()> {
        self.store
            .insert_cells(&cells)
            .await
            .map_err(EngineError::Persistence)?;
        for cell in cells {
            self.cache.insert(cell.key(), cell);
        }
        Ok(())
    }

    /// Number of currently cached cells (metrics).
    pub fn cached_cells(&self) -> usize {
        self.cache.len()
    }
}
