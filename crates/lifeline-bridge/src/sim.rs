// ── SIM inspection ──
//
// Point-in-time reads of the primary SIM identity and eSIM capability.
// Reads are cached; there is no platform push for SIM swaps, so callers
// invalidate (or force a refresh) after any event that could change the
// card -- app foreground, provisioning, a poll tick.

use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::bridge::PlatformBridge;
use crate::error::BridgeError;
use crate::payload::{self, SimIdentity};

enum Cache {
    Empty,
    Filled(Option<SimIdentity>),
}

/// On-demand SIM/eSIM queries over a [`PlatformBridge`], with an
/// explicitly-invalidated cache.
pub struct SimInspector<B: PlatformBridge> {
    bridge: Arc<B>,
    cache: Mutex<Cache>,
}

impl<B: PlatformBridge> SimInspector<B> {
    pub fn new(bridge: Arc<B>) -> Self {
        Self {
            bridge,
            cache: Mutex::new(Cache::Empty),
        }
    }

    /// Current primary SIM identity, `None` when no SIM is readable.
    ///
    /// Served from cache until [`invalidate`](Self::invalidate) or
    /// [`refresh`](Self::refresh) is called.
    pub async fn current_sim(&self) -> Result<Option<SimIdentity>, BridgeError> {
        if let Cache::Filled(ref sim) = *self.lock_cache() {
            return Ok(sim.clone());
        }
        self.refresh().await
    }

    /// Re-query the device, replacing the cache.
    pub async fn refresh(&self) -> Result<Option<SimIdentity>, BridgeError> {
        let raw = self.bridge.current_sim_info().await?;
        let sim = payload::decode_sim_identity(&raw)?;
        debug!(?sim, "sim identity read");
        *self.lock_cache() = Cache::Filled(sim.clone());
        Ok(sim)
    }

    /// Drop the cached reading; the next query hits the device.
    pub fn invalidate(&self) {
        *self.lock_cache() = Cache::Empty;
    }

    /// Whether this device supports embedded SIM profiles. Never cached --
    /// the answer is cheap and capability can change with carrier policy.
    pub async fn is_esim_capable(&self) -> Result<bool, BridgeError> {
        self.bridge.is_esim_supported().await
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, Cache> {
        // Cache mutations never panic, so poisoning cannot occur in
        // practice; recover rather than propagate.
        self.cache.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::mock::MockBridge;

    fn sim_a() -> SimIdentity {
        SimIdentity {
            carrier_name: "Telenor".into(),
            mobile_country_code: "242".into(),
            mobile_network_code: "01".into(),
            iso_country_code: "no".into(),
        }
    }

    fn sim_b() -> SimIdentity {
        SimIdentity {
            carrier_name: "Telia".into(),
            mobile_country_code: "242".into(),
            mobile_network_code: "02".into(),
            iso_country_code: "no".into(),
        }
    }

    #[tokio::test]
    async fn reads_are_cached_until_invalidated() {
        let bridge = Arc::new(MockBridge::new());
        bridge.set_sim(Some(sim_a()));
        let inspector = SimInspector::new(Arc::clone(&bridge));

        assert_eq!(inspector.current_sim().await.unwrap(), Some(sim_a()));
        bridge.set_sim(Some(sim_b()));
        // Still the cached value.
        assert_eq!(inspector.current_sim().await.unwrap(), Some(sim_a()));

        inspector.invalidate();
        assert_eq!(inspector.current_sim().await.unwrap(), Some(sim_b()));
        assert_eq!(bridge.sim_info_calls(), 2);
    }

    #[tokio::test]
    async fn refresh_replaces_cache() {
        let bridge = Arc::new(MockBridge::new());
        bridge.set_sim(Some(sim_a()));
        let inspector = SimInspector::new(Arc::clone(&bridge));

        assert_eq!(inspector.current_sim().await.unwrap(), Some(sim_a()));
        bridge.set_sim(None);
        assert_eq!(inspector.refresh().await.unwrap(), None);
        assert_eq!(inspector.current_sim().await.unwrap(), None);
    }

    #[tokio::test]
    async fn capability_is_passed_through() {
        let bridge = Arc::new(MockBridge::new());
        let inspector = SimInspector::new(Arc::clone(&bridge));
        assert!(inspector.is_esim_capable().await.unwrap());

        bridge.set_esim_supported(false);
        assert!(!inspector.is_esim_capable().await.unwrap());
    }
}
