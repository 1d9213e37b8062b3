//! Coverage grid aggregation engine.
//!
//! Two paths funnel into the grid-cell store:
//! - [`LiveAggregator`] folds incoming uplink observations into cells, one
//!   independent outcome per reporting gateway.
//! - [`ReprocessEngine`] discards and deterministically rebuilds all of an
//!   antenna's cells from raw history after its gateway relocates.
//!
//! The antenna and grid-cell caches are process-wide, unbounded and never
//! expire on their own; correctness rests on explicit invalidation.

pub mod cells;
pub mod error;
pub mod live;
pub mod range;
pub mod registry;
pub mod reprocess;

pub use cells::GridCellStore;
pub use error::{EngineError, EngineResult};
pub use live::{DiscardReason, LiveAggregator, ReportOutcome};
pub use range::GatewayRangeFilter;
pub use registry::AntennaRegistry;
pub use reprocess::{RebuildSummary, ReprocessEngine};
