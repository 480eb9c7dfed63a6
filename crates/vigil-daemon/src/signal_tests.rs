use super::*;
use std::time::Duration;

#[test]
fn test_intent_display() {
    assert_eq!(Intent::Reload.to_string(), "RELOAD");
    assert_eq!(Intent::Stop.to_string(), "STOP");
    assert_eq!(Intent::UserSignal1.to_string(), "USER_SIGNAL_1");
    assert_eq!(Intent::UserSignal2.to_string(), "USER_SIGNAL_2");
}

#[test]
fn test_intent_serde() {
    let json = serde_json::to_string(&Intent::UserSignal1).unwrap();
    assert_eq!(json, "\"user_signal1\"");
    let intent: Intent = serde_json::from_str("\"reload\"").unwrap();
    assert_eq!(intent, Intent::Reload);
}

#[tokio::test]
async fn test_channel_preserves_order() {
    let (sender, mut rx) = intent_channel();

    assert!(sender.request_reload());
    assert!(sender.send(Intent::UserSignal2));
    assert!(sender.request_stop());
    assert!(sender.request_stop());

    assert_eq!(rx.recv().await, Some(Intent::Reload));
    assert_eq!(rx.recv().await, Some(Intent::UserSignal2));
    assert_eq!(rx.recv().await, Some(Intent::Stop));
    assert_eq!(rx.recv().await, Some(Intent::Stop));
}

#[tokio::test]
async fn test_send_after_receiver_dropped() {
    let (sender, rx) = intent_channel();
    drop(rx);

    assert!(sender.is_closed());
    assert!(!sender.request_stop());
}

#[cfg(unix)]
#[tokio::test]
async fn test_bridge_relays_signals() {
    use nix::sys::signal::{raise, Signal};

    let (sender, mut rx) = intent_channel();
    let bridge = SignalBridge::install(sender).unwrap();

    raise(Signal::SIGUSR1).unwrap();
    let intent = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap();
    assert_eq!(intent, Some(Intent::UserSignal1));

    send_signal_to_pid(std::process::id(), Intent::Reload).unwrap();
    let intent = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap();
    assert_eq!(intent, Some(Intent::Reload));

    bridge.uninstall();
    // The relay held the only sender.
    let closed = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap();
    assert_eq!(closed, None);
}
