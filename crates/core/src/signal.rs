//! Signal-quality histogram bucketing.

/// One histogram counter of a grid cell, strongest to weakest.
///
/// The persisted schema carries a thirteenth counter, [`NoSignal`], that
/// [`classify`] never produces: it is reserved for callers that positively
/// know no signal was received at a location.
///
/// [`NoSignal`]: SignalBucket::NoSignal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalBucket {
    /// Stronger than -95 dBm.
    High,
    /// (-100, -95] dBm.
    B100,
    B105,
    B110,
    B115,
    B120,
    B125,
    B130,
    B135,
    B140,
    /// (-145, -140] dBm.
    B145,
    /// -145 dBm or weaker.
    Low,
    /// Reserved: a confirmed absence of signal.
    NoSignal,
}

impl SignalBucket {
    /// Every bucket an observation can classify into, strongest first.
    pub const CLASSIFIABLE: [SignalBucket; 12] = [
        SignalBucket::High,
        SignalBucket::B100,
        SignalBucket::B105,
        SignalBucket::B110,
        SignalBucket::B115,
        SignalBucket::B120,
        SignalBucket::B125,
        SignalBucket::B130,
        SignalBucket::B135,
        SignalBucket::B140,
        SignalBucket::B145,
        SignalBucket::Low,
    ];
}

/// Map an RSSI/SNR pair onto its histogram bucket.
///
/// The combined signal estimate is the RSSI, degraded by the SNR when the
/// SNR is negative; a non-negative SNR never improves a reading. The ladder
/// compares with strict greater-than, so a value exactly on a boundary falls
/// into the weaker bucket.
pub fn classify(rssi: f32, snr: f32) -> SignalBucket {
    let mut signal = rssi;
    if snr < 0.0 {
        signal += snr;
    }

    if signal > -95.0 {
        SignalBucket::High
    } else if signal > -100.0 {
        SignalBucket::B100
    } else if signal > -105.0 {
        SignalBucket::B105
    } else if signal > -110.0 {
        SignalBucket::B110
    } else if signal > -115.0 {
        SignalBucket::B115
    } else if signal > -120.0 {
        SignalBucket::B120
    } else if signal > -125.0 {
        SignalBucket::B125
    } else if signal > -130.0 {
        SignalBucket::B130
    } else if signal > -135.0 {
        SignalBucket::B135
    } else if signal > -140.0 {
        SignalBucket::B140
    } else if signal > -145.0 {
        SignalBucket::B145
    } else {
        SignalBucket::Low
    }
}
