// ── Bridge error types ──
//
// Raw platform failures live here. The core crate translates these into
// its own domain errors -- consumers of lifeline-core never see a bridge
// error directly.

use thiserror::Error;

/// Failures raised by the platform bridge itself (call plumbing, missing
/// capabilities, garbled payloads). Not the typed provisioning outcomes --
/// those are [`InstallError`] / [`RemoveError`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// The platform does not provide this capability at all
    /// (e.g. no path-monitoring API on this OS build).
    #[error("Platform capability unavailable: {0}")]
    Unavailable(String),

    /// The native call was made but failed.
    #[error("Platform call failed: {message}")]
    Call { message: String },

    /// The platform returned a payload that failed boundary validation.
    #[error("Invalid bridge payload for {context}: {message}")]
    InvalidPayload { context: String, message: String },
}

impl BridgeError {
    pub(crate) fn invalid_payload(context: &str, err: impl std::fmt::Display) -> Self {
        Self::InvalidPayload {
            context: context.to_owned(),
            message: err.to_string(),
        }
    }
}

/// Why an eSIM profile install (or line activation) failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstallError {
    /// The profile reference was rejected before reaching the carrier.
    #[error("Invalid eSIM profile reference")]
    InvalidReference,

    /// The device has no embedded SIM support.
    #[error("Device does not support eSIM")]
    DeviceNotCapable,

    /// No room for another profile; the user must free a slot.
    #[error("No storage available for another eSIM profile")]
    StorageFull,

    /// The user dismissed the system install sheet.
    #[error("User declined the eSIM install")]
    UserDeclined,

    /// The platform provisioning service was unreachable or errored.
    #[error("Platform provisioning unavailable: {0}")]
    PlatformUnavailable(String),

    /// Another provisioning operation is still pending. Callers must wait
    /// for it to resolve; requests are never queued.
    #[error("A provisioning operation is already in progress")]
    AlreadyInProgress,
}

/// Why an eSIM profile removal failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoveError {
    /// The platform removal service was unreachable or errored.
    #[error("Platform removal unavailable: {0}")]
    PlatformUnavailable(String),

    /// Another provisioning operation is still pending.
    #[error("A provisioning operation is already in progress")]
    AlreadyInProgress,
}

/// What a successful `remove()` actually achieved.
///
/// Some platforms cannot delete a profile programmatically and can only
/// deep-link the user into system settings. Callers must not assume the
/// profile is gone on [`RequiresUserAction`] until re-verified via
/// [`SimInspector`](crate::SimInspector).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalOutcome {
    /// The platform confirmed the profile was deleted.
    Removed,
    /// The platform handed the user off to settings; removal is pending
    /// their action.
    RequiresUserAction,
}
