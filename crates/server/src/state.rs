//! Application state shared across the workers and the HTTP surface.

use gridcover_core::config::AppConfig;
use gridcover_engine::{
    AntennaRegistry, GatewayRangeFilter, GridCellStore, LiveAggregator, ReprocessEngine,
};
use gridcover_store::GridStore;
use std::sync::Arc;

/// Shared state: the opened store plus the wired aggregation engine.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn GridStore>,
    pub live: Arc<LiveAggregator>,
    pub reprocess: Arc<ReprocessEngine>,
}

impl AppState {
    /// Wire the engine stack on top of an opened store. The antenna and
    /// grid-cell caches live inside the components built here, one instance
    /// per process.
    pub fn new(config: AppConfig, store: Arc<dyn GridStore>) -> Self {
        let registry = Arc::new(AntennaRegistry::new(store.clone()));
        let filter = Arc::new(GatewayRangeFilter::new(
            store.clone(),
            config.aggregation.max_gateway_range_km,
        ));
        let cells = Arc::new(GridCellStore::new(store.clone()));

        let live = Arc::new(LiveAggregator::new(
            registry,
            filter.clone(),
            cells.clone(),
        ));
        let reprocess = Arc::new(ReprocessEngine::new(store.clone(), filter, cells));

        Self {
            config,
            store,
            live,
            reprocess,
        }
    }
}
