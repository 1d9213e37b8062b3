//! Antenna identity repository trait.

use crate::error::StoreResult;
use crate::models::AntennaRow;
use async_trait::async_trait;

/// Repository for antenna identity records.
///
/// Identities are permanent once minted: there is no update or delete.
/// Stale coverage is removed at the grid-cell level instead.
#[async_trait]
pub trait AntennaRepo: Send + Sync {
    /// Resolve the row for a (network, gateway, antenna index) triple,
    /// creating it on first use. Losing a creation race to a concurrent
    /// writer is benign; the winner's row is returned.
    async fn find_or_create_antenna(
        &self,
        network_id: &str,
        gateway_id: &str,
        antenna_index: i32,
    ) -> StoreResult<AntennaRow>;

    /// Every antenna recorded for one gateway.
    async fn antennas_for_gateway(
        &self,
        network_id: &str,
        gateway_id: &str,
    ) -> StoreResult<Vec<AntennaRow>>;
}
