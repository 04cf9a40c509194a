// lifeline-core: the backup-connectivity decision engine. Consumes the
// typed bridge boundary from lifeline-bridge, owns the policy state
// machine, and exposes one observable EngineState to presentation layers.

pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod stream;
pub mod usage;

// ── Primary re-exports ──────────────────────────────────────────────
pub use command::{Command, CommandResult};
pub use config::{ActivationTrigger, EngineConfig};
pub use engine::{ConnectivityEngine, EngineEvent};
pub use error::EngineError;
pub use stream::StateStream;
pub use usage::{UsageAccumulator, UsageSummary};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    BackupSession, ConnectivityTier, EnginePhase, EngineState, PolicySettings, SimMismatch,
    SubscriberInfo,
};

// Boundary types consumers need without depending on the bridge crate
// directly.
pub use lifeline_bridge::{
    ConnectionType, InstallError, NetworkSnapshot, ProfileReference, RemovalOutcome, RemoveError,
    SimIdentity,
};

// Hosts build `SubscriberInfo` with a secret payment token; re-export the
// type so they don't need a direct secrecy dependency.
pub use secrecy::SecretString;
