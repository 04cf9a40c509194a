// ── Observable engine state ──
//
// The single snapshot every consumer reads. Screens map this to display;
// none of them re-derive policy from raw flags.

use lifeline_bridge::SimIdentity;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::model::{BackupSession, ConnectivityTier, PolicySettings};

/// Where the engine's state machine currently sits.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EnginePhase {
    /// No subscription, or the feature is switched off.
    Idle,
    /// Observing the network path, ready to activate.
    Monitoring,
    /// An install / removal / line-switch call is outstanding. Acts as
    /// the mutual-exclusion gate: no new provisioning may start.
    ProvisioningInFlight,
    /// The backup path is carrying traffic.
    BackupActive,
    /// Force-disabled on a SIM mismatch; needs user resolution.
    Suspended,
    /// A provisioning call failed; waiting for an explicit retry.
    Error,
}

/// The detected SIM no longer matches the one the backup profile was
/// provisioned against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimMismatch {
    /// Identity the profile was provisioned against.
    pub provisioned: SimIdentity,
    /// What the device reports now; `None` when the SIM was removed.
    pub observed: Option<SimIdentity>,
}

/// Complete externally-visible engine state.
///
/// Invariant, checked on every publish:
/// `is_backup_active == active_session.is_some()`.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineState {
    pub phase: EnginePhase,
    /// Tier of the latest snapshot; `None` until the first snapshot
    /// arrives or while monitoring is unavailable.
    pub tier: Option<ConnectivityTier>,
    pub is_backup_active: bool,
    pub active_session: Option<BackupSession>,
    pub settings: PolicySettings,
    /// Set while the engine is [`Suspended`](EnginePhase::Suspended).
    pub sim_mismatch: Option<SimMismatch>,
    /// A profile removal was requested but the platform could only open
    /// settings; cleared once the SIM state is re-verified.
    pub removal_pending: bool,
    /// Cleared on the next successful transition or explicit retry.
    pub last_error: Option<EngineError>,
}

impl Default for EngineState {
    fn default() -> Self {
        Self {
            phase: EnginePhase::Idle,
            tier: None,
            is_backup_active: false,
            active_session: None,
            settings: PolicySettings::default(),
            sim_mismatch: None,
            removal_pending: false,
            last_error: None,
        }
    }
}
