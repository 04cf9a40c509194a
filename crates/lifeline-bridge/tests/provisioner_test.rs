#![allow(clippy::unwrap_used)]
// Integration tests for `EsimProvisioner` against the mock bridge.

use std::sync::Arc;
use std::time::Duration;

use lifeline_bridge::{
    EsimProvisioner, InstallError, MockBridge, ProfileReference, RemovalOutcome,
};

// ── Helpers ─────────────────────────────────────────────────────────

fn profile() -> ProfileReference {
    "https://smdp.example.com/profiles/backup-1".parse().unwrap()
}

fn setup() -> (Arc<MockBridge>, EsimProvisioner<MockBridge>) {
    let bridge = Arc::new(MockBridge::new());
    let provisioner = EsimProvisioner::new(Arc::clone(&bridge));
    (bridge, provisioner)
}

// ── Install ─────────────────────────────────────────────────────────

#[tokio::test]
async fn install_succeeds_against_healthy_platform() {
    let (bridge, provisioner) = setup();
    let ack = provisioner.install(&profile()).await.unwrap();
    assert!(ack.success);
    assert_eq!(bridge.install_calls(), 1);
}

#[tokio::test]
async fn install_maps_platform_codes_to_typed_errors() {
    let (bridge, provisioner) = setup();
    bridge.set_install_ack(MockBridge::err_ack("user_declined", "dismissed sheet"));

    let result = provisioner.install(&profile()).await;
    assert_eq!(result, Err(InstallError::UserDeclined));
}

#[tokio::test(start_paused = true)]
async fn second_concurrent_install_fails_fast_without_reaching_platform() {
    let (bridge, provisioner) = setup();
    bridge.set_op_delay(Duration::from_millis(200));

    let (first, second) = tokio::join!(
        provisioner.install(&profile()),
        provisioner.install(&profile()),
    );

    assert!(first.is_ok());
    assert_eq!(second, Err(InstallError::AlreadyInProgress));
    assert_eq!(bridge.install_calls(), 1, "platform must be hit exactly once");
}

#[tokio::test(start_paused = true)]
async fn gate_releases_after_completion() {
    let (bridge, provisioner) = setup();
    bridge.set_op_delay(Duration::from_millis(50));

    provisioner.install(&profile()).await.unwrap();
    assert!(!provisioner.is_in_flight());

    // A sequential second install is fine.
    provisioner.install(&profile()).await.unwrap();
    assert_eq!(bridge.install_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn gate_spans_operation_kinds() {
    let (bridge, provisioner) = setup();
    bridge.set_op_delay(Duration::from_millis(200));

    let (install, remove) = tokio::join!(provisioner.install(&profile()), provisioner.remove());

    assert!(install.is_ok());
    assert!(matches!(
        remove,
        Err(lifeline_bridge::RemoveError::AlreadyInProgress)
    ));
    assert_eq!(bridge.remove_calls(), 0);
}

// ── Removal ─────────────────────────────────────────────────────────

#[tokio::test]
async fn removal_distinguishes_user_action_from_confirmed() {
    let (bridge, provisioner) = setup();

    // Default mock behaves like iOS: it can only open settings.
    assert_eq!(
        provisioner.remove().await.unwrap(),
        RemovalOutcome::RequiresUserAction
    );

    bridge.set_remove_ack(MockBridge::ok_ack("profile deleted"));
    assert_eq!(provisioner.remove().await.unwrap(), RemovalOutcome::Removed);
}

// ── Line switching ──────────────────────────────────────────────────

#[tokio::test]
async fn line_switch_round_trip() {
    let (bridge, provisioner) = setup();

    provisioner.activate().await.unwrap();
    provisioner.deactivate().await.unwrap();

    assert_eq!(bridge.activate_calls(), 1);
    assert_eq!(bridge.deactivate_calls(), 1);
}
