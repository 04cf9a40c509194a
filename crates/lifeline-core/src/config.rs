// ── Engine runtime configuration ──
//
// Built by the host application and handed to the engine -- the core
// never reads config files.

use std::time::Duration;

use crate::model::ConnectivityTier;

/// Which tier is bad enough to auto-activate backup.
///
/// The product default only reacts to a full outage; carriers piloting a
/// more aggressive policy also treat constrained cellular as a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActivationTrigger {
    /// Only a full outage activates backup.
    #[default]
    DisconnectedOnly,
    /// Constrained cellular (`Weak`) also activates backup.
    WeakOrDisconnected,
}

impl ActivationTrigger {
    /// Whether `tier` crosses this trigger's threshold.
    pub fn fires_on(self, tier: ConnectivityTier) -> bool {
        match self {
            Self::DisconnectedOnly => tier == ConnectivityTier::Disconnected,
            Self::WeakOrDisconnected => {
                matches!(tier, ConnectivityTier::Weak | ConnectivityTier::Disconnected)
            }
        }
    }
}

/// Tuning for a [`ConnectivityEngine`](crate::ConnectivityEngine).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Watchdog on every provisioning call. Mobile bridges can silently
    /// drop callbacks; when this expires the engine records a timeout
    /// error instead of waiting forever.
    pub provisioning_timeout: Duration,
    /// How often to re-read the SIM identity while the feature is active.
    /// Zero disables the poll; hosts can still force a read with
    /// [`Command::RefreshSimStatus`](crate::Command::RefreshSimStatus).
    pub sim_poll_interval: Duration,
    /// Auto-activation threshold policy.
    pub activation_trigger: ActivationTrigger,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            provisioning_timeout: Duration::from_secs(60),
            sim_poll_interval: Duration::from_secs(30),
            activation_trigger: ActivationTrigger::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_trigger_ignores_weak() {
        let trigger = ActivationTrigger::DisconnectedOnly;
        assert!(!trigger.fires_on(ConnectivityTier::Connected));
        assert!(!trigger.fires_on(ConnectivityTier::Weak));
        assert!(trigger.fires_on(ConnectivityTier::Disconnected));
    }

    #[test]
    fn aggressive_trigger_includes_weak() {
        let trigger = ActivationTrigger::WeakOrDisconnected;
        assert!(!trigger.fires_on(ConnectivityTier::Connected));
        assert!(trigger.fires_on(ConnectivityTier::Weak));
        assert!(trigger.fires_on(ConnectivityTier::Disconnected));
    }
}
