// lifeline-bridge: typed boundary between the native platform module and
// the connectivity core. Raw bridge payloads are validated here; nothing
// untyped crosses into lifeline-core.

pub mod bridge;
pub mod error;
pub mod mock;
pub mod observer;
pub mod payload;
pub mod provisioner;
pub mod sim;

// ── Primary re-exports ──────────────────────────────────────────────
pub use bridge::{BridgeEvent, PlatformBridge, NETWORK_STATUS_EVENT};
pub use error::{BridgeError, InstallError, RemovalOutcome, RemoveError};
pub use mock::MockBridge;
pub use observer::{NetworkObserver, SnapshotStream};
pub use payload::{
    ConnectionType, NetworkSnapshot, ProfileReference, ProvisionAck, SimIdentity,
};
pub use provisioner::EsimProvisioner;
pub use sim::SimInspector;
