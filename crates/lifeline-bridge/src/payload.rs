// ── Boundary validation ──
//
// The native module speaks loosely-typed dictionaries. Everything is
// validated here, once, into the typed values the rest of the system
// uses. Field names follow the platform convention (camelCase).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use url::Url;

use crate::error::BridgeError;

// ── NetworkSnapshot ─────────────────────────────────────────────────

/// Which interface currently carries traffic.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionType {
    Wifi,
    Cellular,
    Other,
    None,
}

/// One immutable observation of the device network path.
///
/// Produced on every platform path change. Carries no identity beyond
/// its timestamp; a superseded snapshot is simply discarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    pub is_connected: bool,
    pub connection_type: ConnectionType,
    /// Metered path (e.g. cellular with a data cap).
    pub is_expensive: bool,
    /// Low-data mode or an otherwise throttled path.
    pub is_constrained: bool,
    pub observed_at: DateTime<Utc>,
}

impl NetworkSnapshot {
    /// A fully-offline observation, timestamped now.
    pub fn offline() -> Self {
        Self {
            is_connected: false,
            connection_type: ConnectionType::None,
            is_expensive: false,
            is_constrained: false,
            observed_at: Utc::now(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNetworkStatus {
    is_connected: bool,
    connection_type: String,
    #[serde(default)]
    is_expensive: bool,
    #[serde(default)]
    is_constrained: bool,
    /// Epoch seconds. Absent on the synchronous status query.
    timestamp: Option<f64>,
}

/// Validate a raw network-status payload.
///
/// Unknown `connectionType` strings degrade to [`ConnectionType::Other`]
/// rather than rejecting the whole event; a missing timestamp takes the
/// receive time.
pub fn decode_network_snapshot(payload: &Value) -> Result<NetworkSnapshot, BridgeError> {
    let raw: RawNetworkStatus = serde_json::from_value(payload.clone())
        .map_err(|e| BridgeError::invalid_payload("network status", e))?;

    let connection_type = ConnectionType::from_str(&raw.connection_type).unwrap_or_else(|_| {
        tracing::debug!(value = %raw.connection_type, "unrecognized connection type");
        ConnectionType::Other
    });

    let observed_at = raw
        .timestamp
        .and_then(epoch_seconds_to_datetime)
        .unwrap_or_else(Utc::now);

    Ok(NetworkSnapshot {
        is_connected: raw.is_connected,
        connection_type,
        is_expensive: raw.is_expensive,
        is_constrained: raw.is_constrained,
        observed_at,
    })
}

/// Re-encode a snapshot into the platform dictionary shape. Used by test
/// doubles to feed the same path the real platform exercises.
pub fn encode_network_snapshot(snapshot: &NetworkSnapshot) -> Value {
    serde_json::json!({
        "isConnected": snapshot.is_connected,
        "connectionType": snapshot.connection_type.to_string(),
        "isExpensive": snapshot.is_expensive,
        "isConstrained": snapshot.is_constrained,
        "timestamp": snapshot.observed_at.timestamp_millis() as f64 / 1000.0,
    })
}

#[allow(clippy::cast_possible_truncation)]
fn epoch_seconds_to_datetime(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    DateTime::from_timestamp_millis((secs * 1000.0) as i64)
}

// ── SimIdentity ─────────────────────────────────────────────────────

/// Identity of the primary SIM, as reported by the carrier stack.
///
/// Equality is full-field: two readings describe the same SIM only when
/// carrier and all network codes agree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimIdentity {
    pub carrier_name: String,
    pub mobile_country_code: String,
    pub mobile_network_code: String,
    pub iso_country_code: String,
}

impl fmt::Display for SimIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}/{})",
            self.carrier_name, self.mobile_country_code, self.mobile_network_code
        )
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSimInfo {
    carrier: String,
    #[serde(default)]
    mobile_country_code: String,
    #[serde(default)]
    mobile_network_code: String,
    #[serde(default)]
    iso_country_code: String,
}

/// Validate a raw SIM-info payload. JSON `null` means no readable SIM and
/// decodes to `None`.
pub fn decode_sim_identity(payload: &Value) -> Result<Option<SimIdentity>, BridgeError> {
    if payload.is_null() {
        return Ok(None);
    }
    let raw: RawSimInfo = serde_json::from_value(payload.clone())
        .map_err(|e| BridgeError::invalid_payload("sim info", e))?;
    Ok(Some(SimIdentity {
        carrier_name: raw.carrier,
        mobile_country_code: raw.mobile_country_code,
        mobile_network_code: raw.mobile_network_code,
        iso_country_code: raw.iso_country_code,
    }))
}

/// Re-encode a SIM identity into the platform dictionary shape.
pub fn encode_sim_identity(sim: &SimIdentity) -> Value {
    serde_json::json!({
        "carrier": sim.carrier_name,
        "mobileCountryCode": sim.mobile_country_code,
        "mobileNetworkCode": sim.mobile_network_code,
        "isoCountryCode": sim.iso_country_code,
    })
}

// ── Provisioning acknowledgements ───────────────────────────────────

/// Typed acknowledgement from an install / remove / line-switch call.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionAck {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    /// Machine-readable failure code, when the platform supplies one.
    #[serde(default)]
    pub code: Option<String>,
}

/// Validate a raw provisioning acknowledgement payload.
pub fn decode_provision_ack(payload: &Value) -> Result<ProvisionAck, BridgeError> {
    serde_json::from_value(payload.clone())
        .map_err(|e| BridgeError::invalid_payload("provisioning ack", e))
}

// ── ProfileReference ────────────────────────────────────────────────

/// Carrier activation address for an eSIM profile (SM-DP+ URL).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileReference(Url);

impl ProfileReference {
    pub fn new(url: Url) -> Self {
        Self(url)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for ProfileReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ProfileReference {
    type Err = url::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Url::parse(s)?))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn snapshot_decodes_platform_shape() {
        let payload = json!({
            "isConnected": true,
            "connectionType": "cellular",
            "isExpensive": true,
            "isConstrained": false,
            "timestamp": 1_700_000_000.5,
        });
        let snap = decode_network_snapshot(&payload).unwrap();
        assert!(snap.is_connected);
        assert_eq!(snap.connection_type, ConnectionType::Cellular);
        assert!(snap.is_expensive);
        assert!(!snap.is_constrained);
        assert_eq!(snap.observed_at.timestamp_millis(), 1_700_000_000_500);
    }

    #[test]
    fn snapshot_missing_required_field_is_rejected() {
        let payload = json!({ "connectionType": "wifi" });
        assert!(matches!(
            decode_network_snapshot(&payload),
            Err(BridgeError::InvalidPayload { .. })
        ));
    }

    #[test]
    fn snapshot_unknown_connection_type_degrades_to_other() {
        let payload = json!({
            "isConnected": true,
            "connectionType": "satellite",
        });
        let snap = decode_network_snapshot(&payload).unwrap();
        assert_eq!(snap.connection_type, ConnectionType::Other);
    }

    #[test]
    fn snapshot_round_trips_through_encode() {
        let snap = NetworkSnapshot {
            is_connected: true,
            connection_type: ConnectionType::Wifi,
            is_expensive: false,
            is_constrained: true,
            observed_at: DateTime::from_timestamp_millis(1_700_000_000_000).unwrap(),
        };
        let decoded = decode_network_snapshot(&encode_network_snapshot(&snap)).unwrap();
        assert_eq!(decoded, snap);
    }

    #[test]
    fn sim_null_decodes_to_none() {
        assert_eq!(decode_sim_identity(&Value::Null).unwrap(), None);
    }

    #[test]
    fn sim_decodes_platform_shape() {
        let payload = json!({
            "carrier": "Vodafone",
            "mobileCountryCode": "262",
            "mobileNetworkCode": "02",
            "isoCountryCode": "de",
        });
        let sim = decode_sim_identity(&payload).unwrap().unwrap();
        assert_eq!(sim.carrier_name, "Vodafone");
        assert_eq!(sim.iso_country_code, "de");
    }

    #[test]
    fn ack_carries_optional_code() {
        let payload = json!({ "success": false, "message": "no slot", "code": "storage_full" });
        let ack = decode_provision_ack(&payload).unwrap();
        assert!(!ack.success);
        assert_eq!(ack.code.as_deref(), Some("storage_full"));
    }

    #[test]
    fn profile_reference_rejects_garbage() {
        assert!("not a url".parse::<ProfileReference>().is_err());
        let r: ProfileReference = "https://smdp.example.com/profile/123".parse().unwrap();
        assert_eq!(r.as_str(), "https://smdp.example.com/profile/123");
    }
}
