// ── Engine error types ──
//
// User-facing errors from lifeline-core. Raw bridge failures are
// translated here -- consumers never see platform plumbing directly.
// `Clone + PartialEq` so the latest error can live inside `EngineState`
// and be asserted on in tests.

use thiserror::Error;

use lifeline_bridge::{BridgeError, InstallError, RemoveError};

use crate::model::EnginePhase;

/// Unified error type for the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    // ── Monitoring ───────────────────────────────────────────────────
    /// The platform cannot observe the network path. Connectivity is
    /// unknown (never "disconnected") and auto-activation is suppressed
    /// until monitoring resumes.
    #[error("Network monitoring unavailable: {0}")]
    MonitoringUnavailable(String),

    // ── Provisioning ─────────────────────────────────────────────────
    #[error("eSIM install failed: {0}")]
    Install(#[from] InstallError),

    #[error("eSIM removal failed: {0}")]
    Remove(#[from] RemoveError),

    /// The provisioning watchdog expired before the platform called back.
    #[error("Provisioning timed out after {timeout_secs}s")]
    ProvisioningTimeout { timeout_secs: u64 },

    // ── Command validation ───────────────────────────────────────────
    #[error("An active subscription is required")]
    NotSubscribed,

    #[error("This device does not support eSIM")]
    NotEsimCapable,

    #[error("Cannot {command} while {phase}")]
    InvalidPhase {
        phase: EnginePhase,
        command: &'static str,
    },

    // ── Device queries ───────────────────────────────────────────────
    #[error("SIM read failed: {0}")]
    SimReadFailed(String),

    // ── Lifecycle ────────────────────────────────────────────────────
    #[error("Engine is not running")]
    EngineStopped,
}

impl EngineError {
    /// Whether an explicit retry can plausibly succeed. Device-terminal
    /// conditions (no eSIM support, platform cannot monitor) are not
    /// retryable; the user has to act outside the engine.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Install(InstallError::PlatformUnavailable(_) | InstallError::AlreadyInProgress)
            | Self::Remove(_)
            | Self::ProvisioningTimeout { .. }
            | Self::MonitoringUnavailable(_)
            | Self::SimReadFailed(_) => true,
            Self::Install(_)
            | Self::NotSubscribed
            | Self::NotEsimCapable
            | Self::InvalidPhase { .. }
            | Self::EngineStopped => false,
        }
    }

    pub(crate) fn sim_read(err: BridgeError) -> Self {
        Self::SimReadFailed(err.to_string())
    }

    pub(crate) fn monitoring(err: BridgeError) -> Self {
        Self::MonitoringUnavailable(err.to_string())
    }
}
