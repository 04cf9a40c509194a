// ── eSIM provisioning ──
//
// Install, removal, and line-switch calls with an at-most-once-in-flight
// gate. Platform provisioning is long-running and on some platforms not
// cancelable once started; a second request while one is pending fails
// fast with `AlreadyInProgress` instead of queuing or racing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::bridge::PlatformBridge;
use crate::error::{BridgeError, InstallError, RemovalOutcome, RemoveError};
use crate::payload::{self, ProfileReference, ProvisionAck};

/// Ack code platforms use when removal can only be requested, not
/// performed (deep-link into system settings).
const CODE_REQUIRES_USER_ACTION: &str = "requires_user_action";

/// Provisioning operations over a [`PlatformBridge`].
pub struct EsimProvisioner<B: PlatformBridge> {
    bridge: Arc<B>,
    in_flight: AtomicBool,
}

impl<B: PlatformBridge> EsimProvisioner<B> {
    pub fn new(bridge: Arc<B>) -> Self {
        Self {
            bridge,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Whether a provisioning operation is currently outstanding.
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Install the profile behind `reference`.
    pub async fn install(&self, reference: &ProfileReference) -> Result<ProvisionAck, InstallError> {
        let _guard = self.acquire().ok_or(InstallError::AlreadyInProgress)?;
        info!(profile = %reference, "installing eSIM profile");

        let payload = self
            .bridge
            .install_esim_profile(reference.as_str())
            .await
            .map_err(bridge_to_install)?;
        let ack = payload::decode_provision_ack(&payload).map_err(bridge_to_install)?;

        if ack.success {
            info!("eSIM profile installed");
            Ok(ack)
        } else {
            warn!(code = ?ack.code, message = %ack.message, "eSIM install failed");
            Err(install_error_from_ack(&ack))
        }
    }

    /// Request removal of the backup profile.
    ///
    /// A [`RemovalOutcome::RequiresUserAction`] result means the platform
    /// only opened settings -- re-verify via
    /// [`SimInspector`](crate::SimInspector) before treating the profile
    /// as gone.
    pub async fn remove(&self) -> Result<RemovalOutcome, RemoveError> {
        let _guard = self.acquire().ok_or(RemoveError::AlreadyInProgress)?;
        info!("requesting eSIM profile removal");

        let payload = self
            .bridge
            .remove_esim_profile()
            .await
            .map_err(bridge_to_remove)?;
        let ack = payload::decode_provision_ack(&payload).map_err(bridge_to_remove)?;

        if ack.code.as_deref() == Some(CODE_REQUIRES_USER_ACTION) {
            debug!("removal requires user action in system settings");
            return Ok(RemovalOutcome::RequiresUserAction);
        }
        if ack.success {
            info!("eSIM profile removed");
            Ok(RemovalOutcome::Removed)
        } else {
            warn!(code = ?ack.code, message = %ack.message, "eSIM removal failed");
            Err(RemoveError::PlatformUnavailable(ack.message))
        }
    }

    /// Switch traffic onto the backup line.
    pub async fn activate(&self) -> Result<ProvisionAck, InstallError> {
        let _guard = self.acquire().ok_or(InstallError::AlreadyInProgress)?;
        debug!("activating backup line");
        self.line_switch_ack(self.bridge.activate_backup_line().await)
    }

    /// Switch traffic back to the primary line.
    pub async fn deactivate(&self) -> Result<ProvisionAck, InstallError> {
        let _guard = self.acquire().ok_or(InstallError::AlreadyInProgress)?;
        debug!("deactivating backup line");
        self.line_switch_ack(self.bridge.deactivate_backup_line().await)
    }

    fn line_switch_ack(
        &self,
        payload: Result<serde_json::Value, BridgeError>,
    ) -> Result<ProvisionAck, InstallError> {
        let payload = payload.map_err(bridge_to_install)?;
        let ack = payload::decode_provision_ack(&payload).map_err(bridge_to_install)?;
        if ack.success {
            Ok(ack)
        } else {
            warn!(code = ?ack.code, message = %ack.message, "line switch failed");
            Err(install_error_from_ack(&ack))
        }
    }

    /// Take the in-flight gate. Released when the returned guard drops,
    /// including when the caller's future is dropped at a watchdog
    /// timeout -- the gate tracks our bookkeeping, not the platform's.
    fn acquire(&self) -> Option<InFlightGuard<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard(&self.in_flight))
    }
}

struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn bridge_to_install(err: BridgeError) -> InstallError {
    InstallError::PlatformUnavailable(err.to_string())
}

fn bridge_to_remove(err: BridgeError) -> RemoveError {
    RemoveError::PlatformUnavailable(err.to_string())
}

/// Map a failed acknowledgement onto the typed install error taxonomy.
fn install_error_from_ack(ack: &ProvisionAck) -> InstallError {
    match ack.code.as_deref() {
        Some("invalid_reference") => InstallError::InvalidReference,
        Some("device_not_capable") => InstallError::DeviceNotCapable,
        Some("storage_full") => InstallError::StorageFull,
        Some("user_declined") => InstallError::UserDeclined,
        _ => InstallError::PlatformUnavailable(ack.message.clone()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn ack(success: bool, code: Option<&str>, message: &str) -> ProvisionAck {
        ProvisionAck {
            success,
            message: message.into(),
            code: code.map(str::to_owned),
        }
    }

    #[test]
    fn ack_codes_map_to_typed_errors() {
        assert_eq!(
            install_error_from_ack(&ack(false, Some("invalid_reference"), "")),
            InstallError::InvalidReference
        );
        assert_eq!(
            install_error_from_ack(&ack(false, Some("storage_full"), "")),
            InstallError::StorageFull
        );
        assert_eq!(
            install_error_from_ack(&ack(false, Some("user_declined"), "")),
            InstallError::UserDeclined
        );
        assert_eq!(
            install_error_from_ack(&ack(false, Some("device_not_capable"), "")),
            InstallError::DeviceNotCapable
        );
        assert_eq!(
            install_error_from_ack(&ack(false, None, "bridge gone")),
            InstallError::PlatformUnavailable("bridge gone".into())
        );
    }
}
