//! Gateway lookup trait.
//!
//! Gateways and their location history are owned by the location-management
//! service; this side only reads them.

use crate::error::StoreResult;
use crate::models::GatewayRow;
use async_trait::async_trait;
use time::OffsetDateTime;

/// Read access to gateway records and their installation history.
#[async_trait]
pub trait GatewayRepo: Send + Sync {
    /// Look up one gateway; absence is not an error.
    async fn find_gateway(
        &self,
        network_id: &str,
        gateway_id: &str,
    ) -> StoreResult<Option<GatewayRow>>;

    /// Every known gateway in a stable order, so operator rebuilds can
    /// resume from an offset.
    async fn list_gateways(&self) -> StoreResult<Vec<GatewayRow>>;

    /// All gateways sharing a gateway id. The same id can exist in several
    /// networks, so operator commands addressing a bare id fan out.
    async fn gateways_by_gateway_id(&self, gateway_id: &str) -> StoreResult<Vec<GatewayRow>>;

    /// Most recent recorded installation time for a gateway, if any.
    /// Observations at or before this instant predate the current location.
    async fn latest_installation(
        &self,
        network_id: &str,
        gateway_id: &str,
    ) -> StoreResult<Option<OffsetDateTime>>;
}
