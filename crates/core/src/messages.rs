//! Inbound event payloads delivered by the message bus.
//!
//! The bus transport itself lives at the server edge; these types are the
//! wire contract the aggregation core consumes.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// One gateway's reception report inside an uplink message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceptionReport {
    #[serde(default)]
    pub network_id: String,
    pub gateway_id: String,
    /// Index of the receiving antenna on the gateway; 0 when the network
    /// does not report one.
    #[serde(default)]
    pub antenna_index: i32,
    #[serde(default)]
    pub rssi: f32,
    #[serde(default)]
    pub snr: f32,
}

/// A mapped uplink: one device transmission plus every gateway that heard
/// it. Each report in `gateways` is aggregated independently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct UplinkMessage {
    #[serde(default)]
    pub network_id: String,
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
    /// Nanoseconds since the Unix epoch.
    #[serde(default)]
    pub time: i64,
    /// Non-empty for experiment traffic, which never feeds the live map.
    #[serde(default)]
    pub experiment: String,
    #[serde(default)]
    pub gateways: Vec<ReceptionReport>,
}

impl UplinkMessage {
    /// The device's GPS fix is present (a (0, 0) pair means "no fix").
    pub fn has_fix(&self) -> bool {
        self.latitude != 0.0 || self.longitude != 0.0
    }

    /// Message timestamp as a wall-clock instant.
    pub fn timestamp(&self) -> OffsetDateTime {
        nanos_to_timestamp(self.time)
    }
}

/// Notification that a gateway's recorded location changed.
///
/// Only the gateway identity matters here: the authoritative install-time
/// cutoff is re-derived from the location history, not from this payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayMovedMessage {
    #[serde(default)]
    pub network_id: String,
    pub gateway_id: String,
    /// Nanoseconds since the Unix epoch.
    #[serde(default)]
    pub time: i64,
}

impl GatewayMovedMessage {
    /// Event timestamp as a wall-clock instant.
    pub fn timestamp(&self) -> OffsetDateTime {
        nanos_to_timestamp(self.time)
    }
}

fn nanos_to_timestamp(nanos: i64) -> OffsetDateTime {
    // Any i64 nanosecond count is representable, so the fallback is
    // unreachable; it only guards the type-level Result.
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(nanos))
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn decodes_an_uplink_payload() {
        let payload = r#"{
            "network_id": "NS_TTS_V3://ttn@000013",
            "latitude": 52.37,
            "longitude": 4.89,
            "time": 1700000000000000000,
            "gateways": [
                {"network_id": "NS_TTS_V3://ttn@000013", "gateway_id": "eui-a84041ffff1e2b3c", "rssi": -102.0, "snr": -3.5},
                {"network_id": "NS_TTS_V3://ttn@000013", "gateway_id": "eui-7276fffffe0b2a91", "antenna_index": 1, "rssi": -88.0, "snr": 7.25}
            ]
        }"#;

        let msg: UplinkMessage = serde_json::from_str(payload).unwrap();
        assert!(msg.has_fix());
        assert!(msg.experiment.is_empty());
        assert_eq!(msg.gateways.len(), 2);
        assert_eq!(msg.gateways[0].antenna_index, 0);
        assert_eq!(msg.gateways[1].antenna_index, 1);
        assert_eq!(msg.timestamp(), datetime!(2023-11-14 22:13:20 UTC));
    }

    #[test]
    fn missing_fix_is_detected() {
        let msg = UplinkMessage::default();
        assert!(!msg.has_fix());
        let msg = UplinkMessage { latitude: 0.0, longitude: 4.89, ..Default::default() };
        assert!(msg.has_fix());
    }

    #[test]
    fn decodes_a_gateway_moved_payload() {
        let payload = r#"{
            "network_id": "thethingsnetwork.org",
            "gateway_id": "eui-58a0cbfffe8023e7",
            "time": 1600000000000000000,
            "new_latitude": 1.0,
            "new_longitude": 2.0
        }"#;

        // Coordinates in the payload are informational and ignored.
        let msg: GatewayMovedMessage = serde_json::from_str(payload).unwrap();
        assert_eq!(msg.gateway_id, "eui-58a0cbfffe8023e7");
        assert_eq!(msg.timestamp(), datetime!(2020-09-13 12:26:40 UTC));
    }
}
