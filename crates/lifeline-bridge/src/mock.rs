// ── Mock platform bridge ──
//
// Deterministic, scriptable stand-in for the native module. Tests set
// the device state up front, push path-change events, and assert on
// per-method call counts. Defaults describe a healthy eSIM-capable
// device on WiFi.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::broadcast;

use crate::bridge::{BridgeEvent, PlatformBridge, NETWORK_STATUS_EVENT};
use crate::error::BridgeError;
use crate::payload::{self, NetworkSnapshot, SimIdentity};

const EVENT_CHANNEL_SIZE: usize = 64;

/// Scriptable [`PlatformBridge`] implementation for tests.
pub struct MockBridge {
    esim_supported: AtomicBool,
    monitoring_unavailable: AtomicBool,
    sim_info: Mutex<Value>,
    network_status: Mutex<Value>,
    install_ack: Mutex<Value>,
    remove_ack: Mutex<Value>,
    activate_ack: Mutex<Value>,
    deactivate_ack: Mutex<Value>,
    /// Artificial latency applied to install/remove/line-switch calls.
    op_delay: Mutex<Option<Duration>>,
    install_calls: AtomicU32,
    remove_calls: AtomicU32,
    activate_calls: AtomicU32,
    deactivate_calls: AtomicU32,
    sim_info_calls: AtomicU32,
    monitoring_start_calls: AtomicU32,
    events: broadcast::Sender<BridgeEvent>,
}

impl MockBridge {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let online = NetworkSnapshot {
            is_connected: true,
            connection_type: crate::payload::ConnectionType::Wifi,
            is_expensive: false,
            is_constrained: false,
            observed_at: chrono::Utc::now(),
        };
        Self {
            esim_supported: AtomicBool::new(true),
            monitoring_unavailable: AtomicBool::new(false),
            sim_info: Mutex::new(Value::Null),
            network_status: Mutex::new(payload::encode_network_snapshot(&online)),
            install_ack: Mutex::new(Self::ok_ack("profile installed")),
            remove_ack: Mutex::new(json!({
                "success": true,
                "message": "opened cellular settings",
                "code": "requires_user_action",
            })),
            activate_ack: Mutex::new(Self::ok_ack("backup line active")),
            deactivate_ack: Mutex::new(Self::ok_ack("primary line active")),
            op_delay: Mutex::new(None),
            install_calls: AtomicU32::new(0),
            remove_calls: AtomicU32::new(0),
            activate_calls: AtomicU32::new(0),
            deactivate_calls: AtomicU32::new(0),
            sim_info_calls: AtomicU32::new(0),
            monitoring_start_calls: AtomicU32::new(0),
            events,
        }
    }

    // ── Scripting ────────────────────────────────────────────────────

    pub fn set_esim_supported(&self, supported: bool) {
        self.esim_supported.store(supported, Ordering::Release);
    }

    /// Make `start_network_monitoring` fail with `Unavailable`.
    pub fn set_monitoring_unavailable(&self, unavailable: bool) {
        self.monitoring_unavailable
            .store(unavailable, Ordering::Release);
    }

    pub fn set_sim(&self, sim: Option<SimIdentity>) {
        *lock(&self.sim_info) = match sim {
            Some(ref s) => payload::encode_sim_identity(s),
            None => Value::Null,
        };
    }

    pub fn set_network_status(&self, snapshot: &NetworkSnapshot) {
        *lock(&self.network_status) = payload::encode_network_snapshot(snapshot);
    }

    pub fn set_install_ack(&self, ack: Value) {
        *lock(&self.install_ack) = ack;
    }

    pub fn set_remove_ack(&self, ack: Value) {
        *lock(&self.remove_ack) = ack;
    }

    pub fn set_activate_ack(&self, ack: Value) {
        *lock(&self.activate_ack) = ack;
    }

    /// Apply `delay` to every provisioning call from now on.
    pub fn set_op_delay(&self, delay: Duration) {
        *lock(&self.op_delay) = Some(delay);
    }

    /// Make provisioning calls resolve immediately again.
    pub fn clear_op_delay(&self) {
        *lock(&self.op_delay) = None;
    }

    /// A successful acknowledgement payload.
    pub fn ok_ack(message: &str) -> Value {
        json!({ "success": true, "message": message })
    }

    /// A failed acknowledgement payload with a machine code.
    pub fn err_ack(code: &str, message: &str) -> Value {
        json!({ "success": false, "message": message, "code": code })
    }

    /// Emit a path-change event, exactly as the platform would.
    pub fn push_network_event(&self, snapshot: &NetworkSnapshot) {
        self.push_raw_event(
            NETWORK_STATUS_EVENT,
            payload::encode_network_snapshot(snapshot),
        );
    }

    /// Emit an arbitrary raw event.
    pub fn push_raw_event(&self, name: &str, payload: Value) {
        let _ = self.events.send(BridgeEvent {
            name: name.to_owned(),
            payload,
        });
    }

    // ── Call counters ────────────────────────────────────────────────

    pub fn install_calls(&self) -> u32 {
        self.install_calls.load(Ordering::Acquire)
    }

    pub fn remove_calls(&self) -> u32 {
        self.remove_calls.load(Ordering::Acquire)
    }

    pub fn activate_calls(&self) -> u32 {
        self.activate_calls.load(Ordering::Acquire)
    }

    pub fn deactivate_calls(&self) -> u32 {
        self.deactivate_calls.load(Ordering::Acquire)
    }

    pub fn sim_info_calls(&self) -> u32 {
        self.sim_info_calls.load(Ordering::Acquire)
    }

    pub fn monitoring_start_calls(&self) -> u32 {
        self.monitoring_start_calls.load(Ordering::Acquire)
    }

    async fn apply_delay(&self) {
        let delay = *lock(&self.op_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for MockBridge {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl PlatformBridge for MockBridge {
    async fn is_esim_supported(&self) -> Result<bool, BridgeError> {
        Ok(self.esim_supported.load(Ordering::Acquire))
    }

    async fn current_sim_info(&self) -> Result<Value, BridgeError> {
        self.sim_info_calls.fetch_add(1, Ordering::AcqRel);
        Ok(lock(&self.sim_info).clone())
    }

    async fn install_esim_profile(&self, _reference: &str) -> Result<Value, BridgeError> {
        self.install_calls.fetch_add(1, Ordering::AcqRel);
        self.apply_delay().await;
        Ok(lock(&self.install_ack).clone())
    }

    async fn remove_esim_profile(&self) -> Result<Value, BridgeError> {
        self.remove_calls.fetch_add(1, Ordering::AcqRel);
        self.apply_delay().await;
        Ok(lock(&self.remove_ack).clone())
    }

    async fn activate_backup_line(&self) -> Result<Value, BridgeError> {
        self.activate_calls.fetch_add(1, Ordering::AcqRel);
        self.apply_delay().await;
        Ok(lock(&self.activate_ack).clone())
    }

    async fn deactivate_backup_line(&self) -> Result<Value, BridgeError> {
        self.deactivate_calls.fetch_add(1, Ordering::AcqRel);
        self.apply_delay().await;
        Ok(lock(&self.deactivate_ack).clone())
    }

    async fn network_status(&self) -> Result<Value, BridgeError> {
        Ok(lock(&self.network_status).clone())
    }

    async fn start_network_monitoring(&self) -> Result<(), BridgeError> {
        if self.monitoring_unavailable.load(Ordering::Acquire) {
            return Err(BridgeError::Unavailable(
                "path monitoring not available on this platform".into(),
            ));
        }
        self.monitoring_start_calls.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    async fn stop_network_monitoring(&self) -> Result<(), BridgeError> {
        Ok(())
    }

    fn subscribe_events(&self) -> broadcast::Receiver<BridgeEvent> {
        self.events.subscribe()
    }
}
