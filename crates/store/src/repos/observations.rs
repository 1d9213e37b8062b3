//! Raw observation history trait.

use crate::error::StoreResult;
use crate::models::ObservationRow;
use futures::stream::BoxStream;
use time::OffsetDateTime;

/// Streaming read access to the raw observation history (owned by the
/// ingestion pipeline; read-only here).
pub trait ObservationRepo: Send + Sync {
    /// Stream the live (non-experiment) observations of one antenna with a
    /// timestamp strictly after the cutoff.
    ///
    /// Backed by the driver's server-side cursor: memory stays bounded even
    /// for antennas with millions of rows. The stream holds a pooled
    /// connection until dropped and cannot be resumed mid-way; restarting
    /// means re-issuing the query.
    fn stream_observations(
        &self,
        antenna_id: i64,
        after: OffsetDateTime,
    ) -> BoxStream<'_, StoreResult<ObservationRow>>;
}
