//! Status events emitted around each cycle.
//!
//! Delivery is fire-and-forget: the reconciler never looks at whether
//! anybody received an event.

use serde::Serialize;
use tokio::sync::broadcast;

pub const EVENT_SYNC_STARTED: &str = "sync-started";
pub const EVENT_SYNC_SUCCEEDED: &str = "sync-succeeded";
pub const EVENT_SYNC_FAILED: &str = "sync-failed";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncEvent {
    Started,
    Succeeded { summary: String },
    Failed { reason: String },
}

impl SyncEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SyncEvent::Started => EVENT_SYNC_STARTED,
            SyncEvent::Succeeded { .. } => EVENT_SYNC_SUCCEEDED,
            SyncEvent::Failed { .. } => EVENT_SYNC_FAILED,
        }
    }

    /// Text suitable for a status notification.
    pub fn message(&self) -> String {
        match self {
            SyncEvent::Started => "Syncing attendance data…".to_string(),
            SyncEvent::Succeeded { summary } => format!("Sync complete: {summary}"),
            SyncEvent::Failed { reason } => format!("Sync failed, will retry: {reason}"),
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, event: SyncEvent);
}

/// Writes events to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: SyncEvent) {
        match &event {
            SyncEvent::Failed { .. } => {
                tracing::warn!(event = event.name(), "{}", event.message())
            }
            _ => tracing::info!(event = event.name(), "{}", event.message()),
        }
    }
}

/// Fans events out to any number of subscribers.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<SyncEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }
}

impl Notifier for BroadcastNotifier {
    fn notify(&self, event: SyncEvent) {
        // No subscribers is not an error.
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_human_readable() {
        let failed = SyncEvent::Failed {
            reason: "remote unavailable".into(),
        };
        assert_eq!(failed.name(), "sync-failed");
        assert!(failed.message().contains("remote unavailable"));
        assert!(SyncEvent::Started.message().starts_with("Syncing"));
    }

    #[tokio::test]
    async fn broadcast_without_subscribers_is_silent() {
        let notifier = BroadcastNotifier::new(4);
        notifier.notify(SyncEvent::Started);

        let mut rx = notifier.subscribe();
        notifier.notify(SyncEvent::Succeeded {
            summary: "ok".into(),
        });
        assert_eq!(
            rx.recv().await.unwrap(),
            SyncEvent::Succeeded {
                summary: "ok".into()
            }
        );
    }

    #[test]
    fn serializes_with_kind_tag() {
        let json = serde_json::to_value(SyncEvent::Failed {
            reason: "x".into(),
        })
        .unwrap();
        assert_eq!(json["kind"], "failed");
    }
}
