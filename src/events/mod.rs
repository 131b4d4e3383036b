//! Event system for state notifications
//!
//! The event bus is how the UI collaborator learns about delivered and failed
//! reports and gadget changes without implementing callbacks itself.

pub mod types;

pub use types::SystemEvent;

use tokio::sync::broadcast;
use tracing::trace;

use crate::error::AppError;
use crate::hid::sender::SendObserver;

/// Event channel capacity (ring buffer size)
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Event bus for broadcasting system events
pub struct EventBus {
    tx: broadcast::Sender<SystemEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publish an event to all subscribers
    ///
    /// Without subscribers the event is dropped.
    pub fn publish(&self, event: SystemEvent) {
        trace!("Publishing event: {}", event.event_name());
        let _ = self.tx.send(event);
    }

    /// Subscribe to all future events
    ///
    /// A subscriber that falls too far behind receives `Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<SystemEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SendObserver for EventBus {
    fn on_success(&self, device: &str) {
        self.publish(SystemEvent::HidReportDelivered {
            device: device.to_string(),
        });
    }

    fn on_failure(&self, device: &str, error: &AppError) {
        self.publish(SystemEvent::HidReportFailed {
            device: device.to_string(),
            reason: error.to_string(),
            error_code: error.kind().code().to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HidErrorKind;

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.publish(SystemEvent::HidSinkChanged {
            channel: "touchpad".to_string(),
            device: "uhid".to_string(),
        });

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, SystemEvent::HidSinkChanged { .. }));
    }

    #[tokio::test]
    async fn test_observer_publishes_failures() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        let err = AppError::hid("/dev/hidg0", "gone", HidErrorKind::DeviceDisconnected);
        bus.on_failure("/dev/hidg0", &err);

        match rx.recv().await.unwrap() {
            SystemEvent::HidReportFailed {
                device, error_code, ..
            } => {
                assert_eq!(device, "/dev/hidg0");
                assert_eq!(error_code, "device_disconnected");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_no_subscribers() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);
        bus.on_success("/dev/hidg1");
    }
}
