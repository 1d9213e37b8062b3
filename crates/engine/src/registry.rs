//! Antenna identity resolution with a process-wide cache.

use crate::error::{EngineError, EngineResult};
use dashmap::DashMap;
use gridcover_store::GridStore;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct AntennaKey {
    network_id: String,
    gateway_id: String,
    antenna_index: i32,
}

/// Resolves (network, gateway, antenna index) triples to stable antenna
/// ids, minting an identity on first use.
///
/// The cache is unbounded and never evicts: identities are permanent, so a
/// cached id cannot go stale. A relocated gateway keeps its antenna ids;
/// only its grid cells are invalidated.
pub struct AntennaRegistry {
    store: Arc<dyn GridStore>,
    cache: DashMap<AntennaKey, i64>,
}

impl AntennaRegistry {
    pub fn new(store: Arc<dyn GridStore>) -> Self {
        Self {
            store,
            cache: DashMap::new(),
        }
    }

    /// Resolve an antenna id. Absence is not a failure — it triggers the
    /// create; only an unreachable store errors.
    pub async fn resolve(
        &self,
        network_id: &str,
        gateway_id: &str,
        antenna_index: i32,
    ) -> EngineResult<i64> {
        let key = AntennaKey {
            network_id: network_id.to_string(),
            gateway_id: gateway_id.to_string(),
            antenna_index,
        };

        if let Some(id) = self.cache.get(&key) {
            return Ok(*id);
        }

        let row = self
            .store
            .find_or_create_antenna(network_id, gateway_id, antenna_index)
            .await
            .map_err(EngineError::Lookup)?;

        tracing::debug!(
            antenna_id = row.id,
            network_id,
            gateway_id,
            antenna_index,
            "Antenna resolved from store"
        );
        self.cache.insert(key, row.id);
        Ok(row.id)
    }
}
