// ── Domain model ──

mod session;
mod settings;
mod state;
mod tier;

pub use session::BackupSession;
pub use settings::{PolicySettings, SubscriberInfo};
pub use state::{EnginePhase, EngineState, SimMismatch};
pub use tier::ConnectivityTier;
