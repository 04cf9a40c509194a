// ── Connectivity policy engine ──
//
// Full lifecycle management for the backup connectivity path. One
// processing loop owns all state: network snapshots, SIM readings, and
// user commands are serialized through it, so a snapshot-triggered
// auto-activation can never race a user-triggered deactivation.
//
// Provisioning calls are awaited inline under a watchdog timeout. The
// `ProvisioningInFlight` phase is therefore the mutual-exclusion gate by
// construction: new work queues behind the outstanding call and is never
// lost, and nothing provisions twice.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use lifeline_bridge::{
    BridgeError, EsimProvisioner, NetworkObserver, NetworkSnapshot, PlatformBridge,
    RemovalOutcome, SimIdentity, SimInspector, SnapshotStream,
};

use crate::command::{Command, CommandEnvelope, CommandResult};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::model::{
    BackupSession, ConnectivityTier, EnginePhase, EngineState, SimMismatch, SubscriberInfo,
};
use crate::stream::StateStream;
use crate::usage::{UsageAccumulator, UsageSummary};

const COMMAND_CHANNEL_SIZE: usize = 32;
const EVENT_CHANNEL_SIZE: usize = 128;

/// Discrete notifications emitted alongside state updates. The usage
/// accumulator feeds off session edges; hosts can log or surface the
/// rest.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    TierChanged {
        from: Option<ConnectivityTier>,
        to: Option<ConnectivityTier>,
    },
    SessionOpened(BackupSession),
    SessionClosed(BackupSession),
    SuspendedOnSimMismatch(SimMismatch),
    Resumed,
}

// ── Engine handle ────────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc`. Construct with [`new`](Self::new), call
/// [`start`](Self::start) to spawn the processing loop, then drive it
/// with [`execute`](Self::execute) and observe it through
/// [`watch_state`](Self::watch_state).
pub struct ConnectivityEngine<B: PlatformBridge> {
    inner: Arc<EngineInner<B>>,
}

impl<B: PlatformBridge> Clone for ConnectivityEngine<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct EngineInner<B: PlatformBridge> {
    config: EngineConfig,
    observer: NetworkObserver<B>,
    inspector: SimInspector<B>,
    provisioner: EsimProvisioner<B>,
    state: watch::Sender<EngineState>,
    events: broadcast::Sender<EngineEvent>,
    usage_rx: watch::Receiver<UsageSummary>,
    command_tx: mpsc::Sender<CommandEnvelope>,
    /// Consumed by the run loop on start.
    command_rx: Mutex<Option<mpsc::Receiver<CommandEnvelope>>>,
    /// Consumed by the run loop on start.
    usage: Mutex<Option<UsageAccumulator>>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<B: PlatformBridge> ConnectivityEngine<B> {
    /// Create an engine over `bridge`. Does not spawn anything -- call
    /// [`start`](Self::start).
    pub fn new(bridge: Arc<B>, config: EngineConfig) -> Self {
        let observer = NetworkObserver::new(Arc::clone(&bridge));
        let inspector = SimInspector::new(Arc::clone(&bridge));
        let provisioner = EsimProvisioner::new(bridge);

        let (state, _) = watch::channel(EngineState::default());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let (usage_tx, usage_rx) = watch::channel(UsageSummary::default());
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);

        Self {
            inner: Arc::new(EngineInner {
                config,
                observer,
                inspector,
                provisioner,
                state,
                events,
                usage_rx,
                command_tx,
                command_rx: Mutex::new(Some(command_rx)),
                usage: Mutex::new(Some(UsageAccumulator::with_publisher(usage_tx))),
                cancel: CancellationToken::new(),
                task: Mutex::new(None),
            }),
        }
    }

    /// Spawn the processing loop. A second call while running is a
    /// no-op; an engine cannot be restarted after
    /// [`shutdown`](Self::shutdown).
    pub async fn start(&self) -> Result<(), EngineError> {
        let mut task = self.inner.task.lock().await;
        if task.is_some() {
            debug!("engine already running");
            return Ok(());
        }

        let command_rx = self
            .inner
            .command_rx
            .lock()
            .await
            .take()
            .ok_or(EngineError::EngineStopped)?;
        let usage = self
            .inner
            .usage
            .lock()
            .await
            .take()
            .ok_or(EngineError::EngineStopped)?;

        let run = RunLoop {
            inner: Arc::clone(&self.inner),
            usage,
            st: EngineState::default(),
            provisioned_sim: None,
            pending: None,
        };
        *task = Some(tokio::spawn(run.run(command_rx)));

        info!("connectivity engine started");
        Ok(())
    }

    /// Cancel the processing loop and join it.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        if let Some(task) = self.inner.task.lock().await.take() {
            let _ = task.await;
        }
        self.inner.observer.stop().await;
        debug!("connectivity engine shut down");
    }

    /// Execute a command through the engine's serialization point and
    /// await the result.
    pub async fn execute(&self, command: Command) -> Result<CommandResult, EngineError> {
        if self.inner.task.lock().await.is_none() {
            return Err(EngineError::EngineStopped);
        }

        let (response_tx, response_rx) = oneshot::channel();
        self.inner
            .command_tx
            .send(CommandEnvelope {
                command,
                response_tx,
            })
            .await
            .map_err(|_| EngineError::EngineStopped)?;

        response_rx.await.map_err(|_| EngineError::EngineStopped)?
    }

    // ── State observation ────────────────────────────────────────────

    /// Current state snapshot.
    pub fn state(&self) -> EngineState {
        self.inner.state.borrow().clone()
    }

    /// Subscribe to state changes.
    pub fn watch_state(&self) -> watch::Receiver<EngineState> {
        self.inner.state.subscribe()
    }

    /// State changes as a `Stream`.
    pub fn state_stream(&self) -> StateStream {
        StateStream::new(self.inner.state.subscribe())
    }

    /// Subscribe to discrete engine events.
    pub fn events(&self) -> broadcast::Receiver<EngineEvent> {
        self.inner.events.subscribe()
    }

    /// Subscribe to monthly usage updates.
    pub fn usage(&self) -> watch::Receiver<UsageSummary> {
        self.inner.usage_rx.clone()
    }
}

// ── Processing loop ──────────────────────────────────────────────────

/// The transition a failed provisioning call would have completed.
/// Retained so `retry_provisioning` can re-attempt exactly it.
#[derive(Clone)]
enum PendingOp {
    Activate { auto: bool },
    Deactivate,
    Install(SubscriberInfo),
    Remove,
    StartMonitoring,
}

struct RunLoop<B: PlatformBridge> {
    inner: Arc<EngineInner<B>>,
    usage: UsageAccumulator,
    /// Working copy of the observable state; cloned into the watch
    /// channel on every publish.
    st: EngineState,
    /// Identity the backup profile was provisioned against.
    provisioned_sim: Option<SimIdentity>,
    pending: Option<PendingOp>,
}

impl<B: PlatformBridge> RunLoop<B> {
    async fn run(mut self, mut command_rx: mpsc::Receiver<CommandEnvelope>) {
        let cancel = self.inner.cancel.clone();
        let mut snapshots: Option<SnapshotStream> = None;

        let mut sim_timer = match self.inner.config.sim_poll_interval {
            d if d.is_zero() => None,
            d => {
                let mut timer = tokio::time::interval(d);
                timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                timer.tick().await; // consume the immediate first tick
                Some(timer)
            }
        };

        self.publish();

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                envelope = command_rx.recv() => {
                    let Some(CommandEnvelope { command, response_tx }) = envelope else { break };
                    let result = self.handle_command(command, &mut snapshots).await;
                    let _ = response_tx.send(result);
                }
                snapshot = next_snapshot(&mut snapshots) => {
                    match snapshot {
                        Some(snapshot) => {
                            self.handle_snapshot(snapshot);
                            self.apply_tier_policy().await;
                        }
                        None => {
                            warn!("snapshot stream ended");
                            snapshots = None;
                        }
                    }
                }
                () = tick(&mut sim_timer) => {
                    if self.sim_guard_active() {
                        if let Err(e) = self.read_sim().await {
                            debug!(error = %e, "sim poll failed");
                        }
                    }
                }
            }
        }

        debug!("engine loop stopped");
    }

    /// Whether the SIM-mismatch guard should poll right now.
    fn sim_guard_active(&self) -> bool {
        self.st.settings.is_subscribed && self.st.phase != EnginePhase::Idle
    }

    // ── Snapshot handling ────────────────────────────────────────────

    fn handle_snapshot(&mut self, snapshot: NetworkSnapshot) {
        let tier = ConnectivityTier::classify(&snapshot);
        let previous = self.st.tier;
        if previous != Some(tier) {
            debug!(%tier, "connectivity tier changed");
            self.st.tier = Some(tier);
            self.emit(EngineEvent::TierChanged {
                from: previous,
                to: Some(tier),
            });
        }
        self.publish();
    }

    /// React to the tier recorded by [`handle_snapshot`]. Split out so
    /// the async part runs after the pure reclassification.
    async fn apply_tier_policy(&mut self) {
        let Some(tier) = self.st.tier else { return };

        match self.st.phase {
            EnginePhase::Monitoring => {
                if self.st.settings.auto_activation_enabled
                    && self.inner.config.activation_trigger.fires_on(tier)
                {
                    info!(%tier, "auto-activating backup");
                    let _ = self.activate(true).await;
                }
            }
            EnginePhase::BackupActive => {
                if tier == ConnectivityTier::Connected {
                    info!("primary connectivity restored");
                    let _ = self.deactivate().await;
                }
            }
            _ => {}
        }
    }

    // ── Command handling ─────────────────────────────────────────────

    async fn handle_command(
        &mut self,
        command: Command,
        snapshots: &mut Option<SnapshotStream>,
    ) -> Result<CommandResult, EngineError> {
        debug!(command = command.name(), "handling command");
        match command {
            Command::SetAutoActivation(enabled) => {
                self.st.settings.auto_activation_enabled = enabled;
                self.publish();
                Ok(CommandResult::Ok)
            }
            Command::SetBackupFeatureEnabled(enabled) => {
                self.st.settings.backup_feature_enabled = enabled;
                self.reconcile_feature(snapshots).await;
                Ok(CommandResult::Ok)
            }
            Command::ActivateBackup => {
                if !self.st.settings.is_subscribed {
                    return Err(EngineError::NotSubscribed);
                }
                if self.st.phase != EnginePhase::Monitoring {
                    return Err(EngineError::InvalidPhase {
                        phase: self.st.phase,
                        command: "activate_backup",
                    });
                }
                self.activate(false).await
            }
            Command::DeactivateBackup => {
                if self.st.phase != EnginePhase::BackupActive {
                    return Err(EngineError::InvalidPhase {
                        phase: self.st.phase,
                        command: "deactivate_backup",
                    });
                }
                self.deactivate().await
            }
            Command::ConfirmSimChange => self.confirm_sim_change(),
            Command::RefreshSimStatus => {
                let sim = self.read_sim().await?;
                Ok(CommandResult::Sim(sim))
            }
            Command::RetryProvisioning => self.retry(snapshots).await,
            Command::Subscribe(info) => self.subscribe(info, snapshots).await,
            Command::CancelSubscription => self.cancel_subscription(snapshots).await,
        }
    }

    // ── Activation / deactivation ────────────────────────────────────

    async fn activate(&mut self, auto: bool) -> Result<CommandResult, EngineError> {
        self.pending = Some(PendingOp::Activate { auto });
        self.st.phase = EnginePhase::ProvisioningInFlight;
        self.st.last_error = None;
        self.publish();

        let timeout = self.inner.config.provisioning_timeout;
        match tokio::time::timeout(timeout, self.inner.provisioner.activate()).await {
            Err(_elapsed) => {
                let err = EngineError::ProvisioningTimeout {
                    timeout_secs: timeout.as_secs(),
                };
                warn!("activation watchdog fired");
                self.fail(err.clone());
                Err(err)
            }
            Ok(Err(install_err)) => {
                let err = EngineError::from(install_err);
                self.fail(err.clone());
                Err(err)
            }
            Ok(Ok(_ack)) => {
                self.pending = None;
                let session = BackupSession::open(auto);
                info!(session = %session.id, auto, "backup session opened");
                self.st.phase = EnginePhase::BackupActive;
                self.st.is_backup_active = true;
                self.st.active_session = Some(session.clone());
                self.st.last_error = None;
                self.usage.on_session_opened(&session);
                self.emit(EngineEvent::SessionOpened(session));
                self.publish();
                Ok(CommandResult::Ok)
            }
        }
    }

    async fn deactivate(&mut self) -> Result<CommandResult, EngineError> {
        self.pending = Some(PendingOp::Deactivate);
        self.st.phase = EnginePhase::ProvisioningInFlight;
        self.publish();

        let timeout = self.inner.config.provisioning_timeout;
        match tokio::time::timeout(timeout, self.inner.provisioner.deactivate()).await {
            Err(_elapsed) => {
                let err = EngineError::ProvisioningTimeout {
                    timeout_secs: timeout.as_secs(),
                };
                warn!("deactivation watchdog fired");
                // The session stays open: the line switch did not happen.
                self.fail(err.clone());
                Err(err)
            }
            Ok(Err(install_err)) => {
                let err = EngineError::from(install_err);
                self.fail(err.clone());
                Err(err)
            }
            Ok(Ok(_ack)) => {
                self.pending = None;
                self.close_session();
                self.st.phase = EnginePhase::Monitoring;
                self.st.last_error = None;
                self.publish();
                Ok(CommandResult::Ok)
            }
        }
    }

    /// Bookkeeping close of the open session, if any.
    fn close_session(&mut self) {
        if let Some(mut session) = self.st.active_session.take() {
            session.close(Utc::now());
            self.st.is_backup_active = false;
            info!(session = %session.id, "backup session closed");
            self.usage.on_session_closed(&session);
            self.emit(EngineEvent::SessionClosed(session));
        }
    }

    // ── Subscription lifecycle ───────────────────────────────────────

    async fn subscribe(
        &mut self,
        info: SubscriberInfo,
        snapshots: &mut Option<SnapshotStream>,
    ) -> Result<CommandResult, EngineError> {
        match self.inner.inspector.is_esim_capable().await {
            Ok(true) => {}
            Ok(false) => {
                let err = EngineError::NotEsimCapable;
                self.st.last_error = Some(err.clone());
                self.publish();
                return Err(err);
            }
            Err(e) => {
                let err = EngineError::sim_read(e);
                self.st.last_error = Some(err.clone());
                self.publish();
                return Err(err);
            }
        }
        self.install_profile(info, snapshots).await
    }

    async fn install_profile(
        &mut self,
        info: SubscriberInfo,
        snapshots: &mut Option<SnapshotStream>,
    ) -> Result<CommandResult, EngineError> {
        self.pending = Some(PendingOp::Install(info.clone()));
        self.st.phase = EnginePhase::ProvisioningInFlight;
        self.st.last_error = None;
        self.publish();

        let timeout = self.inner.config.provisioning_timeout;
        match tokio::time::timeout(
            timeout,
            self.inner.provisioner.install(&info.esim_profile),
        )
        .await
        {
            Err(_elapsed) => {
                let err = EngineError::ProvisioningTimeout {
                    timeout_secs: timeout.as_secs(),
                };
                warn!("install watchdog fired");
                self.fail(err.clone());
                Err(err)
            }
            Ok(Err(install_err)) => {
                let err = EngineError::from(install_err);
                self.fail(err.clone());
                Err(err)
            }
            Ok(Ok(_ack)) => {
                self.pending = None;
                info!("backup profile provisioned");

                // Record which SIM the profile protects; the mismatch
                // guard compares against this from now on.
                self.inner.inspector.invalidate();
                self.provisioned_sim = match self.inner.inspector.refresh().await {
                    Ok(sim) => sim,
                    Err(e) => {
                        warn!(error = %e, "sim read after install failed");
                        None
                    }
                };

                self.st.settings.is_subscribed = true;
                self.st.removal_pending = false;
                self.st.last_error = None;
                self.enter_monitoring(snapshots).await;
                Ok(CommandResult::Ok)
            }
        }
    }

    async fn cancel_subscription(
        &mut self,
        snapshots: &mut Option<SnapshotStream>,
    ) -> Result<CommandResult, EngineError> {
        if !self.st.settings.is_subscribed {
            return Err(EngineError::NotSubscribed);
        }
        self.close_session();
        self.remove_profile(snapshots).await
    }

    async fn remove_profile(
        &mut self,
        snapshots: &mut Option<SnapshotStream>,
    ) -> Result<CommandResult, EngineError> {
        self.pending = Some(PendingOp::Remove);
        self.st.phase = EnginePhase::ProvisioningInFlight;
        self.publish();

        let timeout = self.inner.config.provisioning_timeout;
        match tokio::time::timeout(timeout, self.inner.provisioner.remove()).await {
            Err(_elapsed) => {
                let err = EngineError::ProvisioningTimeout {
                    timeout_secs: timeout.as_secs(),
                };
                warn!("removal watchdog fired");
                self.fail(err.clone());
                Err(err)
            }
            Ok(Err(remove_err)) => {
                let err = EngineError::from(remove_err);
                self.fail(err.clone());
                Err(err)
            }
            Ok(Ok(outcome)) => {
                self.pending = None;

                // The ack alone never proves the profile is gone; only a
                // fresh SIM read clears the pending flag.
                self.st.removal_pending = outcome == RemovalOutcome::RequiresUserAction;
                if self.st.removal_pending {
                    info!("profile removal handed off to system settings");
                    self.inner.inspector.invalidate();
                }

                self.st.settings.is_subscribed = false;
                self.provisioned_sim = None;
                self.st.sim_mismatch = None;
                self.st.phase = EnginePhase::Idle;
                self.st.tier = None;
                self.st.last_error = None;
                self.inner.observer.stop().await;
                *snapshots = None;
                info!("subscription cancelled");
                self.publish();
                Ok(CommandResult::Ok)
            }
        }
    }

    // ── Feature toggling / monitoring lifecycle ──────────────────────

    async fn reconcile_feature(&mut self, snapshots: &mut Option<SnapshotStream>) {
        let want = self.st.settings.backup_feature_enabled && self.st.settings.is_subscribed;
        let running = self.st.phase != EnginePhase::Idle;

        if want && !running {
            info!("backup feature enabled");
            self.enter_monitoring(snapshots).await;
        } else if !want && running {
            info!("backup feature disabled");
            self.close_session();
            self.st.sim_mismatch = None;
            self.st.phase = EnginePhase::Idle;
            self.st.tier = None;
            self.inner.observer.stop().await;
            *snapshots = None;
            self.publish();
        } else {
            self.publish();
        }
    }

    async fn enter_monitoring(&mut self, snapshots: &mut Option<SnapshotStream>) {
        self.st.phase = EnginePhase::Monitoring;
        match self.inner.observer.start().await {
            Ok(()) => match self.inner.observer.subscribe().await {
                Ok(stream) => *snapshots = Some(stream),
                Err(e) => self.monitoring_lost(e),
            },
            Err(e) => self.monitoring_lost(e),
        }
        self.publish();
    }

    /// The platform cannot observe the path. Connectivity is unknown --
    /// never "disconnected" -- and with no snapshots arriving,
    /// auto-activation cannot fire.
    fn monitoring_lost(&mut self, err: BridgeError) {
        warn!(error = %err, "network monitoring unavailable");
        self.st.tier = None;
        self.pending = Some(PendingOp::StartMonitoring);
        self.st.last_error = Some(EngineError::monitoring(err));
    }

    // ── SIM guard ────────────────────────────────────────────────────

    async fn read_sim(&mut self) -> Result<Option<SimIdentity>, EngineError> {
        let observed = self
            .inner
            .inspector
            .refresh()
            .await
            .map_err(EngineError::sim_read)?;

        if self.st.removal_pending {
            debug!("sim state re-verified after removal request");
            self.st.removal_pending = false;
            self.publish();
        }

        self.apply_sim_reading(observed.clone());
        Ok(observed)
    }

    fn apply_sim_reading(&mut self, observed: Option<SimIdentity>) {
        if !self.st.settings.is_subscribed {
            return;
        }
        let Some(provisioned) = self.provisioned_sim.clone() else {
            return;
        };
        let matches = observed.as_ref() == Some(&provisioned);

        match self.st.phase {
            EnginePhase::Suspended => {
                if matches {
                    info!("original SIM restored");
                    self.resume();
                } else {
                    self.st.sim_mismatch = Some(SimMismatch {
                        provisioned,
                        observed,
                    });
                    self.publish();
                }
            }
            EnginePhase::Idle => {}
            _ if !matches => self.suspend(provisioned, observed),
            _ => {}
        }
    }

    fn suspend(&mut self, provisioned: SimIdentity, observed: Option<SimIdentity>) {
        warn!(?observed, "sim mismatch detected -- suspending backup");
        self.close_session();
        let mismatch = SimMismatch {
            provisioned,
            observed,
        };
        self.st.sim_mismatch = Some(mismatch.clone());
        self.st.phase = EnginePhase::Suspended;
        self.emit(EngineEvent::SuspendedOnSimMismatch(mismatch));
        self.publish();
    }

    fn confirm_sim_change(&mut self) -> Result<CommandResult, EngineError> {
        if self.st.phase != EnginePhase::Suspended {
            return Err(EngineError::InvalidPhase {
                phase: self.st.phase,
                command: "confirm_sim_change",
            });
        }
        let observed = self
            .st
            .sim_mismatch
            .as_ref()
            .and_then(|m| m.observed.clone());
        let Some(observed) = observed else {
            return Err(EngineError::SimReadFailed(
                "no SIM present to confirm".into(),
            ));
        };

        info!(sim = %observed, "user confirmed new SIM");
        self.provisioned_sim = Some(observed);
        self.resume();
        Ok(CommandResult::Ok)
    }

    fn resume(&mut self) {
        self.st.sim_mismatch = None;
        self.st.phase = EnginePhase::Monitoring;
        self.st.last_error = None;
        self.emit(EngineEvent::Resumed);
        self.publish();
    }

    // ── Retry ────────────────────────────────────────────────────────

    async fn retry(
        &mut self,
        snapshots: &mut Option<SnapshotStream>,
    ) -> Result<CommandResult, EngineError> {
        let Some(op) = self.pending.clone() else {
            return Err(EngineError::InvalidPhase {
                phase: self.st.phase,
                command: "retry_provisioning",
            });
        };
        self.st.last_error = None;

        match op {
            PendingOp::Activate { auto } => self.activate(auto).await,
            PendingOp::Deactivate => self.deactivate().await,
            PendingOp::Install(info) => self.install_profile(info, snapshots).await,
            PendingOp::Remove => self.remove_profile(snapshots).await,
            PendingOp::StartMonitoring => {
                self.pending = None;
                self.enter_monitoring(snapshots).await;
                Ok(CommandResult::Ok)
            }
        }
    }

    // ── Plumbing ─────────────────────────────────────────────────────

    fn fail(&mut self, err: EngineError) {
        self.st.phase = EnginePhase::Error;
        self.st.last_error = Some(err);
        self.publish();
    }

    fn emit(&self, event: EngineEvent) {
        let _ = self.inner.events.send(event);
    }

    fn publish(&mut self) {
        debug_assert_eq!(
            self.st.is_backup_active,
            self.st.active_session.is_some(),
            "backup-active flag must track the open session"
        );
        self.inner.state.send_replace(self.st.clone());
    }
}

async fn next_snapshot(snapshots: &mut Option<SnapshotStream>) -> Option<NetworkSnapshot> {
    match snapshots {
        Some(stream) => stream.recv().await,
        None => std::future::pending().await,
    }
}

async fn tick(timer: &mut Option<tokio::time::Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}
