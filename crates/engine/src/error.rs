//! Engine error types.
//!
//! Failures are local to their unit of work: one reception report on the
//! live path, one antenna's rebuild on the reprocess path. Nothing here
//! aborts a worker loop.

use gridcover_core::tile::CoordinateError;
use gridcover_store::StoreError;
use thiserror::Error;

/// Errors from the aggregation engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The backing store failed while resolving an antenna, gateway or
    /// cell. Drops the current observation or aborts the current rebuild.
    #[error("lookup failed: {0}")]
    Lookup(#[source] StoreError),

    /// Writing a cell (or a rebuilt batch) to the backing store failed.
    #[error("persistence failed: {0}")]
    Persistence(#[source] StoreError),

    /// The observation's coordinates cannot be placed on the grid.
    /// Expected and frequent; not worth more than a debug log.
    #[error(transparent)]
    InvalidCoordinate(#[from] CoordinateError),
}

/// Result type for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;
