//! Grid-cell repository trait.

use crate::error::StoreResult;
use crate::models::GridCellRow;
use async_trait::async_trait;

/// Persistence for coverage grid cells, keyed uniquely on
/// (antenna_id, x, y). The unique key is the final arbiter of correctness:
/// a unique-violation from a concurrent creator resolves by re-reading,
/// never by failing.
#[async_trait]
pub trait GridCellRepo: Send + Sync {
    /// Fetch the cell for a key, inserting a zeroed row on first use.
    async fn find_or_create_cell(
        &self,
        antenna_id: i64,
        x: i64,
        y: i64,
    ) -> StoreResult<GridCellRow>;

    /// Idempotent full-row upsert of one cell.
    async fn save_cell(&self, cell: &GridCellRow) -> StoreResult<()>;

    /// Delete every cell belonging to an antenna, returning the count.
    async fn delete_cells_for_antenna(&self, antenna_id: i64) -> StoreResult<u64>;

    /// Insert a batch of freshly rebuilt cells in one all-or-nothing
    /// transaction. Statements are chunked to stay under bind-parameter
    /// limits, but a failure in any chunk rolls back the entire batch.
    async fn insert_cells(&self, cells: &[GridCellRow]) -> StoreResult<()>;

    /// Every cell for an antenna, in (x, y) order.
    async fn cells_for_antenna(&self, antenna_id: i64) -> StoreResult<Vec<GridCellRow>>;
}
