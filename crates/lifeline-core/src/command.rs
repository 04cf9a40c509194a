// ── Command API ──
//
// Every user intent flows through a unified `Command` enum into the
// engine's single processing loop. Settings changes included -- there is
// no ambient mutable settings object to race against snapshots.

use lifeline_bridge::SimIdentity;

use crate::error::EngineError;
use crate::model::SubscriberInfo;

/// A command envelope sent through the engine channel.
/// Carries the command and a oneshot response channel.
pub(crate) struct CommandEnvelope {
    pub command: Command,
    pub response_tx: tokio::sync::oneshot::Sender<Result<CommandResult, EngineError>>,
}

/// All user intents the engine accepts from the presentation layer.
#[derive(Debug, Clone)]
pub enum Command {
    // ── Settings ─────────────────────────────────────────────────────
    SetAutoActivation(bool),
    SetBackupFeatureEnabled(bool),

    // ── Backup control ───────────────────────────────────────────────
    /// Switch to backup now. Valid while monitoring.
    ActivateBackup,
    /// Switch back to the primary line. Valid while backup is active.
    DeactivateBackup,

    // ── SIM resolution ───────────────────────────────────────────────
    /// Adopt the currently-observed SIM as the new provisioned identity
    /// and leave suspension.
    ConfirmSimChange,
    /// Force a SIM re-read (e.g. on app foreground).
    RefreshSimStatus,

    // ── Provisioning ─────────────────────────────────────────────────
    /// Re-attempt the transition that last failed.
    RetryProvisioning,

    // ── Subscription lifecycle ───────────────────────────────────────
    Subscribe(SubscriberInfo),
    CancelSubscription,
}

impl Command {
    /// Stable name used in logs and `InvalidPhase` errors.
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::SetAutoActivation(_) => "set_auto_activation",
            Self::SetBackupFeatureEnabled(_) => "set_backup_feature_enabled",
            Self::ActivateBackup => "activate_backup",
            Self::DeactivateBackup => "deactivate_backup",
            Self::ConfirmSimChange => "confirm_sim_change",
            Self::RefreshSimStatus => "refresh_sim_status",
            Self::RetryProvisioning => "retry_provisioning",
            Self::Subscribe(_) => "subscribe",
            Self::CancelSubscription => "cancel_subscription",
        }
    }
}

/// Result of a command execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    Ok,
    /// The SIM identity read by [`Command::RefreshSimStatus`].
    Sim(Option<SimIdentity>),
}
