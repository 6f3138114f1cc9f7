//! Polling helpers for asserting on the supervisor actor.

use conference_client::supervisor::{ClientHandle, ClientNotification, ClientSnapshot};
use std::time::Duration;
use tokio::sync::mpsc;

/// Default time to wait for a condition.
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Poll the client snapshot until `check` holds; panics after
/// [`WAIT_TIMEOUT`].
pub async fn wait_for(
    handle: &ClientHandle,
    check: impl Fn(&ClientSnapshot) -> bool,
) -> ClientSnapshot {
    tokio::time::timeout(WAIT_TIMEOUT, async {
        loop {
            let snapshot = handle.snapshot().await.expect("client should answer");
            if check(&snapshot) {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached before timeout")
}

/// Collect every notification already queued.
pub fn drain_notifications(
    notifications: &mut mpsc::UnboundedReceiver<ClientNotification>,
) -> Vec<ClientNotification> {
    let mut drained = Vec::new();
    while let Ok(notification) = notifications.try_recv() {
        drained.push(notification);
    }
    drained
}

/// Poll `check` until it holds; panics after [`WAIT_TIMEOUT`].
pub async fn eventually(check: impl Fn() -> bool) {
    tokio::time::timeout(WAIT_TIMEOUT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached before timeout");
}

/// Give the actor time to drain events that have no observable effect.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

/// Receive notifications until one matches `check`; panics after
/// [`WAIT_TIMEOUT`]. Earlier notifications are discarded.
pub async fn wait_for_notification(
    notifications: &mut mpsc::UnboundedReceiver<ClientNotification>,
    check: impl Fn(&ClientNotification) -> bool,
) -> ClientNotification {
    tokio::time::timeout(WAIT_TIMEOUT, async {
        loop {
            let notification = notifications
                .recv()
                .await
                .expect("notification channel closed");
            if check(&notification) {
                return notification;
            }
        }
    })
    .await
    .expect("notification not received before timeout")
}
