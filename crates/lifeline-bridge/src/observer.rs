// ── Network path observer ──
//
// Wraps the platform's path monitoring into a lazy, restartable stream of
// validated snapshots. Platform callbacks arrive on arbitrary tasks; a
// single pump task marshals them into one broadcast channel so every
// subscriber sees the same FIFO sequence.

use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::bridge::{PlatformBridge, NETWORK_STATUS_EVENT};
use crate::error::BridgeError;
use crate::payload::{self, NetworkSnapshot};

const SNAPSHOT_CHANNEL_SIZE: usize = 256;

/// Continuous network-path observation over a [`PlatformBridge`].
///
/// `start()` is idempotent; `stop()` halts monitoring and releases the
/// pump task. Subscribers created via [`subscribe`](Self::subscribe)
/// receive the current path immediately, then every subsequent validated
/// path change.
pub struct NetworkObserver<B: PlatformBridge> {
    bridge: Arc<B>,
    snapshots: broadcast::Sender<NetworkSnapshot>,
    pump: Mutex<Option<PumpHandle>>,
}

struct PumpHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl<B: PlatformBridge> NetworkObserver<B> {
    pub fn new(bridge: Arc<B>) -> Self {
        let (snapshots, _) = broadcast::channel(SNAPSHOT_CHANNEL_SIZE);
        Self {
            bridge,
            snapshots,
            pump: Mutex::new(None),
        }
    }

    /// Begin platform-level monitoring and start the event pump.
    ///
    /// A second call while running is a no-op. Fails with
    /// [`BridgeError::Unavailable`] when the platform cannot monitor the
    /// path at all -- callers must treat that as unknown connectivity,
    /// never as disconnected.
    pub async fn start(&self) -> Result<(), BridgeError> {
        let mut pump = self.pump.lock().await;
        if pump.is_some() {
            debug!("network monitoring already running");
            return Ok(());
        }

        self.bridge.start_network_monitoring().await?;

        let cancel = CancellationToken::new();
        let task = tokio::spawn(pump_task(
            self.bridge.subscribe_events(),
            self.snapshots.clone(),
            cancel.clone(),
        ));
        *pump = Some(PumpHandle { cancel, task });

        debug!("network monitoring started");
        Ok(())
    }

    /// Stop monitoring and release the pump task. No-op when not running.
    pub async fn stop(&self) {
        let Some(handle) = self.pump.lock().await.take() else {
            return;
        };
        handle.cancel.cancel();
        let _ = handle.task.await;

        if let Err(e) = self.bridge.stop_network_monitoring().await {
            warn!(error = %e, "stopping platform monitoring failed (non-fatal)");
        }
        debug!("network monitoring stopped");
    }

    /// Whether the pump is currently running.
    pub async fn is_running(&self) -> bool {
        self.pump.lock().await.is_some()
    }

    /// Subscribe to the snapshot sequence.
    ///
    /// Queries the platform for the current path so a late subscriber is
    /// never left without an initial value. The subscription is taken
    /// before the query -- at worst a subscriber sees the same state
    /// twice, never a gap.
    pub async fn subscribe(&self) -> Result<SnapshotStream, BridgeError> {
        let rx = self.snapshots.subscribe();
        let payload = self.bridge.network_status().await?;
        let initial = payload::decode_network_snapshot(&payload)?;
        Ok(SnapshotStream {
            initial: Some(initial),
            rx,
        })
    }
}

/// Pump raw platform events into the snapshot channel, validating each
/// payload at the boundary. Malformed events are logged and dropped.
async fn pump_task(
    mut events: broadcast::Receiver<crate::bridge::BridgeEvent>,
    snapshots: broadcast::Sender<NetworkSnapshot>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = events.recv() => match result {
                Ok(event) => {
                    if event.name != NETWORK_STATUS_EVENT {
                        continue;
                    }
                    match payload::decode_network_snapshot(&event.payload) {
                        Ok(snapshot) => {
                            let _ = snapshots.send(snapshot);
                        }
                        Err(e) => warn!(error = %e, "dropping malformed network event"),
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "network event pump lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}

/// A subscription to the observer's snapshot sequence.
///
/// Yields the path captured at subscription time first, then live
/// changes in FIFO order. A receiver that falls too far behind skips
/// ahead with a logged warning rather than silently coalescing.
pub struct SnapshotStream {
    initial: Option<NetworkSnapshot>,
    rx: broadcast::Receiver<NetworkSnapshot>,
}

impl SnapshotStream {
    /// Next snapshot, or `None` once the observer is gone.
    pub async fn recv(&mut self) -> Option<NetworkSnapshot> {
        if let Some(initial) = self.initial.take() {
            return Some(initial);
        }
        loop {
            match self.rx.recv().await {
                Ok(snapshot) => return Some(snapshot),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "snapshot subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Convert into a `Stream` for use with `StreamExt` combinators.
    pub fn into_stream(self) -> SnapshotWatchStream {
        SnapshotWatchStream {
            initial: self.initial,
            inner: BroadcastStream::new(self.rx),
        }
    }
}

/// `Stream` adapter over a [`SnapshotStream`], with the same initial-value
/// and lag semantics as [`SnapshotStream::recv`].
pub struct SnapshotWatchStream {
    initial: Option<NetworkSnapshot>,
    inner: BroadcastStream<NetworkSnapshot>,
}

impl futures_core::Stream for SnapshotWatchStream {
    type Item = NetworkSnapshot;

    fn poll_next(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        use std::task::Poll;

        let this = self.get_mut();
        if let Some(initial) = this.initial.take() {
            return Poll::Ready(Some(initial));
        }
        loop {
            match std::pin::Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(snapshot))) => return Poll::Ready(Some(snapshot)),
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(n)))) => {
                    warn!(skipped = n, "snapshot subscriber lagged");
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::mock::MockBridge;
    use crate::payload::ConnectionType;

    fn wifi() -> NetworkSnapshot {
        NetworkSnapshot {
            is_connected: true,
            connection_type: ConnectionType::Wifi,
            is_expensive: false,
            is_constrained: false,
            observed_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn subscriber_gets_initial_value_immediately() {
        let bridge = Arc::new(MockBridge::new());
        bridge.set_network_status(&wifi());
        let observer = NetworkObserver::new(bridge);
        observer.start().await.unwrap();

        let mut stream = observer.subscribe().await.unwrap();
        let first = stream.recv().await.unwrap();
        assert!(first.is_connected);
        assert_eq!(first.connection_type, ConnectionType::Wifi);
    }

    #[tokio::test]
    async fn events_flow_through_in_order() {
        let bridge = Arc::new(MockBridge::new());
        bridge.set_network_status(&wifi());
        let observer = NetworkObserver::new(Arc::clone(&bridge));
        observer.start().await.unwrap();

        let mut stream = observer.subscribe().await.unwrap();
        let _initial = stream.recv().await.unwrap();

        let offline = NetworkSnapshot::offline();
        bridge.push_network_event(&offline);
        bridge.push_network_event(&wifi());

        let first = stream.recv().await.unwrap();
        assert!(!first.is_connected);
        let second = stream.recv().await.unwrap();
        assert!(second.is_connected);
    }

    #[tokio::test]
    async fn malformed_events_are_dropped() {
        let bridge = Arc::new(MockBridge::new());
        bridge.set_network_status(&wifi());
        let observer = NetworkObserver::new(Arc::clone(&bridge));
        observer.start().await.unwrap();

        let mut stream = observer.subscribe().await.unwrap();
        let _initial = stream.recv().await.unwrap();

        bridge.push_raw_event(NETWORK_STATUS_EVENT, serde_json::json!({ "garbage": true }));
        bridge.push_network_event(&wifi());

        // Only the valid event comes through.
        let next = stream.recv().await.unwrap();
        assert!(next.is_connected);
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let bridge = Arc::new(MockBridge::new());
        let observer = NetworkObserver::new(Arc::clone(&bridge));
        observer.start().await.unwrap();
        observer.start().await.unwrap();
        assert_eq!(bridge.monitoring_start_calls(), 1);
        assert!(observer.is_running().await);

        observer.stop().await;
        assert!(!observer.is_running().await);
    }

    #[tokio::test]
    async fn start_surfaces_unavailable_monitoring() {
        let bridge = Arc::new(MockBridge::new());
        bridge.set_monitoring_unavailable(true);
        let observer = NetworkObserver::new(bridge);
        assert!(matches!(
            observer.start().await,
            Err(BridgeError::Unavailable(_))
        ));
        assert!(!observer.is_running().await);
    }
}
