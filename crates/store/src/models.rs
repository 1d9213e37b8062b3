//! Row models mapping to the aggregation schema.

use gridcover_core::signal::SignalBucket;
use sqlx::FromRow;
use time::OffsetDateTime;

/// Stable identity of one receive antenna on one gateway in one network.
///
/// Minted on first observation, never updated, never deleted: a relocated
/// gateway keeps its antenna identities and only the derived grid cells are
/// discarded.
#[derive(Debug, Clone, FromRow)]
pub struct AntennaRow {
    pub id: i64,
    pub network_id: String,
    pub gateway_id: String,
    pub antenna_index: i32,
}

/// Gateway record, owned by the location-management service; read-only here.
#[derive(Debug, Clone, FromRow)]
pub struct GatewayRow {
    pub id: i64,
    pub network_id: String,
    pub gateway_id: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl GatewayRow {
    /// Location usable for distance checks.
    ///
    /// `None` both when the columns are NULL and when they hold the (0, 0)
    /// placeholder: distance from an unset location means nothing.
    pub fn location(&self) -> Option<(f64, f64)> {
        let (lat, lon) = (self.latitude?, self.longitude?);
        if lat == 0.0 && lon == 0.0 {
            return None;
        }
        Some((lat, lon))
    }
}

/// One raw historical observation, as replayed from the packets table
/// (owned by the ingestion pipeline; read-only here).
#[derive(Debug, Clone, FromRow)]
pub struct ObservationRow {
    pub antenna_id: i64,
    pub time: OffsetDateTime,
    pub latitude: f64,
    pub longitude: f64,
    pub rssi: f32,
    pub snr: f32,
}

/// Uniqueness / cache key of one grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridCellKey {
    pub antenna_id: i64,
    pub x: i64,
    pub y: i64,
}

/// One coverage histogram cell: a zoom-19 tile as seen by one antenna.
///
/// Counters only ever increment and `last_updated` only ever advances, so
/// applying a set of observations is order-independent.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct GridCellRow {
    pub antenna_id: i64,
    pub x: i64,
    pub y: i64,
    pub last_updated: OffsetDateTime,
    pub bucket_high: i64,
    pub bucket_100: i64,
    pub bucket_105: i64,
    pub bucket_110: i64,
    pub bucket_115: i64,
    pub bucket_120: i64,
    pub bucket_125: i64,
    pub bucket_130: i64,
    pub bucket_135: i64,
    pub bucket_140: i64,
    pub bucket_145: i64,
    pub bucket_low: i64,
    pub bucket_no_signal: i64,
}

impl GridCellRow {
    /// Fresh zeroed cell for a tile.
    pub fn new(antenna_id: i64, x: i64, y: i64) -> Self {
        Self {
            antenna_id,
            x,
            y,
            last_updated: OffsetDateTime::UNIX_EPOCH,
            bucket_high: 0,
            bucket_100: 0,
            bucket_105: 0,
            bucket_110: 0,
            bucket_115: 0,
            bucket_120: 0,
            bucket_125: 0,
            bucket_130: 0,
            bucket_135: 0,
            bucket_140: 0,
            bucket_145: 0,
            bucket_low: 0,
            bucket_no_signal: 0,
        }
    }

    pub fn key(&self) -> GridCellKey {
        GridCellKey {
            antenna_id: self.antenna_id,
            x: self.x,
            y: self.y,
        }
    }

    /// Record one classified observation: bump its bucket and advance the
    /// timestamp when strictly newer. Commutative and associative, so any
    /// replay order converges on the same row.
    pub fn record(&mut self, bucket: SignalBucket, seen_at: OffsetDateTime) {
        *self.bucket_mut(bucket) += 1;
        if seen_at > self.last_updated {
            self.last_updated = seen_at;
        }
    }

    /// Current count of one bucket.
    pub fn bucket(&self, bucket: SignalBucket) -> i64 {
        match bucket {
            SignalBucket::High => self.bucket_high,
            SignalBucket::B100 => self.bucket_100,
            SignalBucket::B105 => self.bucket_105,
            SignalBucket::B110 => self.bucket_110,
            SignalBucket::B115 => self.bucket_115,
            SignalBucket::B120 => self.bucket_120,
            SignalBucket::B125 => self.bucket_125,
            SignalBucket::B130 => self.bucket_130,
            SignalBucket::B135 => self.bucket_135,
            SignalBucket::B140 => self.bucket_140,
            SignalBucket::B145 => self.bucket_145,
            SignalBucket::Low => self.bucket_low,
            SignalBucket::NoSignal => self.bucket_no_signal,
        }
    }

    fn bucket_mut(&mut self, bucket: SignalBucket) -> &mut i64 {
        match bucket {
            SignalBucket::High => &mut self.bucket_high,
            SignalBucket::B100 => &mut self.bucket_100,
            SignalBucket::B105 => &mut self.bucket_105,
            SignalBucket::B110 => &mut self.bucket_110,
            SignalBucket::B115 => &mut self.bucket_115,
            SignalBucket::B120 => &mut self.bucket_120,
            SignalBucket::B125 => &mut self.bucket_125,
            SignalBucket::B130 => &mut self.bucket_130,
            SignalBucket::B135 => &mut self.bucket_135,
            SignalBucket::B140 => &mut self.bucket_140,
            SignalBucket::B145 => &mut self.bucket_145,
            SignalBucket::Low => &mut self.bucket_low,
            SignalBucket::NoSignal => &mut self.bucket_no_signal,
        }
    }
}
