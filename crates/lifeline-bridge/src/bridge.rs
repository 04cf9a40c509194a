// ── Platform bridge abstraction ──
//
// One trait per target platform implementation. The methods mirror the
// native module surface one-to-one and deliberately return raw
// `serde_json::Value` payloads: validation into typed values happens in
// the `payload` module, never in platform code.

use std::future::Future;

use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::BridgeError;

/// Event name the platform uses for network path changes.
pub const NETWORK_STATUS_EVENT: &str = "network_status_change";

/// A raw event emitted by the platform's event channel.
///
/// `name` discriminates the event kind, `payload` is the untrusted
/// platform dictionary that goes through boundary validation.
#[derive(Debug, Clone)]
pub struct BridgeEvent {
    pub name: String,
    pub payload: Value,
}

/// The native platform module, as seen from Rust.
///
/// Platform-specific implementations:
/// - iOS: CoreTelephony + Network.framework module
/// - Android: TelephonyManager / ConnectivityManager module
/// - Testing: deterministic [`MockBridge`](crate::MockBridge)
///
/// All calls are asynchronous device queries. None of them hold state on
/// behalf of the caller; the leaf components (`NetworkObserver`,
/// `SimInspector`, `EsimProvisioner`) own caching, gating, and delivery
/// semantics.
pub trait PlatformBridge: Send + Sync + 'static {
    /// Whether the device supports embedded SIM profiles.
    fn is_esim_supported(&self) -> impl Future<Output = Result<bool, BridgeError>> + Send;

    /// Current primary SIM description. JSON `null` when no SIM is
    /// present or the carrier info is unreadable.
    fn current_sim_info(&self) -> impl Future<Output = Result<Value, BridgeError>> + Send;

    /// Begin installing the eSIM profile behind `reference`.
    /// Resolves with an acknowledgement payload (`{success, message, code?}`).
    fn install_esim_profile(
        &self,
        reference: &str,
    ) -> impl Future<Output = Result<Value, BridgeError>> + Send;

    /// Request removal of the backup profile. On platforms without a
    /// programmatic delete this opens system settings and the ack carries
    /// a `requires_user_action` code.
    fn remove_esim_profile(&self) -> impl Future<Output = Result<Value, BridgeError>> + Send;

    /// Switch traffic onto the backup line, where the platform exposes an
    /// explicit call. Platforms that rely on OS-side failover acknowledge
    /// immediately.
    fn activate_backup_line(&self) -> impl Future<Output = Result<Value, BridgeError>> + Send;

    /// Switch traffic back to the primary line.
    fn deactivate_backup_line(&self) -> impl Future<Output = Result<Value, BridgeError>> + Send;

    /// Current network path description.
    fn network_status(&self) -> impl Future<Output = Result<Value, BridgeError>> + Send;

    /// Start platform-level path monitoring. Fails with
    /// [`BridgeError::Unavailable`] when the OS offers no monitoring API.
    fn start_network_monitoring(&self) -> impl Future<Output = Result<(), BridgeError>> + Send;

    /// Stop platform-level path monitoring and release its resources.
    fn stop_network_monitoring(&self) -> impl Future<Output = Result<(), BridgeError>> + Send;

    /// Subscribe to the platform event channel. Events arrive on
    /// arbitrary tasks; callers are responsible for marshaling them into
    /// their own serialization point.
    fn subscribe_events(&self) -> broadcast::Receiver<BridgeEvent>;
}
