// ── Connectivity tier ──

use lifeline_bridge::{ConnectionType, NetworkSnapshot};
use serde::{Deserialize, Serialize};

/// Coarse connectivity classification derived from the latest
/// [`NetworkSnapshot`].
///
/// The derivation is pure and total: every snapshot maps to exactly one
/// tier, with no history dependence. "Unknown" connectivity is the
/// *absence* of a trustworthy snapshot and is modeled as
/// `Option<ConnectivityTier>::None` in the engine state, never as a
/// fourth variant here.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ConnectivityTier {
    Connected,
    /// Connected via cellular in low-data / constrained mode.
    Weak,
    Disconnected,
}

impl ConnectivityTier {
    /// Classify a snapshot:
    /// - not connected → `Disconnected`
    /// - cellular and constrained → `Weak`
    /// - otherwise → `Connected`
    pub fn classify(snapshot: &NetworkSnapshot) -> Self {
        if !snapshot.is_connected {
            Self::Disconnected
        } else if snapshot.connection_type == ConnectionType::Cellular && snapshot.is_constrained {
            Self::Weak
        } else {
            Self::Connected
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn snapshot(
        is_connected: bool,
        connection_type: ConnectionType,
        is_constrained: bool,
    ) -> NetworkSnapshot {
        NetworkSnapshot {
            is_connected,
            connection_type,
            is_expensive: false,
            is_constrained,
            observed_at: Utc::now(),
        }
    }

    #[test]
    fn disconnected_wins_regardless_of_interface() {
        for ct in [
            ConnectionType::Wifi,
            ConnectionType::Cellular,
            ConnectionType::Other,
            ConnectionType::None,
        ] {
            assert_eq!(
                ConnectivityTier::classify(&snapshot(false, ct, true)),
                ConnectivityTier::Disconnected
            );
        }
    }

    #[test]
    fn constrained_cellular_is_weak() {
        assert_eq!(
            ConnectivityTier::classify(&snapshot(true, ConnectionType::Cellular, true)),
            ConnectivityTier::Weak
        );
    }

    #[test]
    fn constrained_wifi_is_still_connected() {
        assert_eq!(
            ConnectivityTier::classify(&snapshot(true, ConnectionType::Wifi, true)),
            ConnectivityTier::Connected
        );
    }

    #[test]
    fn unconstrained_cellular_is_connected() {
        assert_eq!(
            ConnectivityTier::classify(&snapshot(true, ConnectionType::Cellular, false)),
            ConnectivityTier::Connected
        );
    }

    #[test]
    fn classification_is_deterministic() {
        let s = snapshot(true, ConnectionType::Cellular, true);
        assert_eq!(
            ConnectivityTier::classify(&s),
            ConnectivityTier::classify(&s)
        );
    }
}
