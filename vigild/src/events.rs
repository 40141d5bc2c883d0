//! Event broadcast for health changes and sweep results.

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tokio::sync::broadcast;
use tracing::warn;
use vigil_common::ErrorCode;

const DEFAULT_BUFFER: usize = 256;

/// A session's state changed between two sweeps.
pub const HEALTH_CHANGED: &str = "health_changed";
/// The startup sweep flagged sessions that need attention.
pub const STARTUP_ATTENTION: &str = "startup_attention";
/// A poll sweep finished.
pub const SWEEP_COMPLETED: &str = "sweep_completed";

/// Broadcast channel for daemon events (JSON lines).
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<String>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER)
    }
}

impl EventBus {
    /// Create a new event bus with the provided buffer size.
    ///
    /// The effective buffer is clamped to at least `DEFAULT_BUFFER` so a burst
    /// of `health_changed` events from one sweep does not lag subscribers.
    pub fn new(buffer: usize) -> Self {
        let buffer = buffer.max(1).max(DEFAULT_BUFFER);
        let (sender, _) = broadcast::channel(buffer);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.sender.subscribe()
    }

    /// Emit a structured event with payload.
    ///
    /// A payload that cannot be encoded is logged and dropped.
    pub fn emit<T: Serialize>(&self, event: &str, data: &T) {
        let encoded = serde_json::to_value(data).and_then(|data| {
            serde_json::to_string(&json!({
                "event": event,
                "data": data,
                "timestamp": Utc::now().to_rfc3339(),
            }))
        });
        match encoded {
            Ok(serialized) => {
                // No subscribers is fine.
                let _ = self.sender.send(serialized);
            }
            Err(err) => warn!(
                event,
                code = %ErrorCode::InternalEventEncoding.code_string(),
                "Failed to serialize event: {}",
                err
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_small_buffer_clamped_to_default() {
        let bus = EventBus::new(1);
        let mut rx = bus.subscribe();

        for idx in 0..DEFAULT_BUFFER {
            bus.emit("tick", &idx);
        }

        let first = rx.recv().await.expect("recv should not lag");
        let value: serde_json::Value = serde_json::from_str(&first).unwrap();
        assert_eq!(value["data"], 0);
    }

    #[tokio::test]
    async fn test_emit_shape() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.emit(HEALTH_CHANGED, &json!({"session_id": "s-1", "state": "stopped"}));

        let line = rx.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["event"], "health_changed");
        assert_eq!(value["data"]["session_id"], "s-1");
        assert!(value["timestamp"].as_str().is_some());
    }

    #[test]
    fn test_unencodable_payload_is_dropped() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        // JSON object keys must be strings.
        let payload: std::collections::HashMap<(u8, u8), u8> = [((1, 2), 3)].into_iter().collect();
        bus.emit(SWEEP_COMPLETED, &payload);
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));

        bus.emit(SWEEP_COMPLETED, &json!({"total": 1}));
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_emit_without_subscribers_is_silent() {
        let bus = EventBus::new(8);
        bus.emit(SWEEP_COMPLETED, &json!({"total": 0}));
    }
}
