//! Gateway distance gate.
//!
//! Discards observations that would pollute a stationary gateway's
//! coverage map: GPS glitches and mobile test devices can report fixes
//! hundreds of kilometers from where the gateway actually hears them.

use crate::error::{EngineError, EngineResult};
use dashmap::DashMap;
use gridcover_core::geo::haversine_km;
use gridcover_store::models::GatewayRow;
use gridcover_store::GridStore;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct GatewayKey {
    network_id: String,
    gateway_id: String,
}

/// Find-with-cache gate on the distance between an observation and its
/// gateway's installed location.
///
/// Unlike the antenna registry there is no create path: a gateway this
/// service has never heard of means the distance is unknown, and an
/// unknown distance always rejects.
pub struct GatewayRangeFilter {
    store: Arc<dyn GridStore>,
    cache: DashMap<GatewayKey, GatewayRow>,
    max_range_km: f64,
}

impl GatewayRangeFilter {
    pub fn new(store: Arc<dyn GridStore>, max_range_km: f64) -> Self {
        Self {
            store,
            cache: DashMap::new(),
            max_range_km,
        }
    }

    /// Resolve a gateway's usable location through the cache.
    ///
    /// `Ok(None)` covers both an unknown gateway and one whose location is
    /// NULL or the (0, 0) placeholder — never trust a distance from an
    /// unset location.
    pub async fn locate(
        &self,
        network_id: &str,
        gateway_id: &str,
    ) -> EngineResult<Option<(f64, f64)>> {
        let key = GatewayKey {
            network_id: network_id.to_string(),
            gateway_id: gateway_id.to_string(),
        };

        if let Some(gateway) = self.cache.get(&key) {
            return Ok(gateway.location());
        }

        match self
            .store
            .find_gateway(network_id, gateway_id)
            .await
            .map_err(EngineError::Lookup)?
        {
            Some(gateway) => {
                let location = gateway.location();
                self.cache.insert(key, gateway);
                Ok(location)
            }
            None => {
                tracing::warn!(network_id, gateway_id, "Gateway unknown, cannot check distance");
                Ok(None)
            }
        }
    }

    /// Distance gate against an already resolved location. `None` rejects.
    pub fn check(&self, location: Option<(f64, f64)>, latitude: f64, longitude: f64) -> bool {
        match location {
            Some((gateway_lat, gateway_lon)) => {
                haversine_km(gateway_lat, gateway_lon, latitude, longitude) <= self.max_range_km
            }
            None => false,
        }
    }

    /// Whether an observation is close enough to its gateway to count.
    pub async fn within_range(
        &self,
        network_id: &str,
        gateway_id: &str,
        latitude: f64,
        longitude: f64,
    ) -> EngineResult<bool> {
        let location = self.locate(network_id, gateway_id).await?;
        Ok(self.check(location, latitude, longitude))
    }

    /// Drop a gateway's cached record, e.g. when it relocated and the
    /// stored row is about to change under us.
    pub fn invalidate(&self, network_id: &str, gateway_id: &str) {
        self.cache.remove(&GatewayKey {
            network_id: network_id.to_string(),
            gateway_id: gateway_id.to_string(),
        });
    }
}
