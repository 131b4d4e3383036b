//! System event types
//!
//! Defines all event types that can be broadcast through the event bus.

use serde::{Deserialize, Serialize};

/// System event enumeration
///
/// Serialized as:
/// ```json
/// {
///   "event": "hid.report_failed",
///   "data": { "device": "/dev/hidg0", "reason": "...", "error_code": "device_disconnected" }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum SystemEvent {
    // ============================================================================
    // HID Events
    // ============================================================================
    /// A report and its release were written to the sink
    #[serde(rename = "hid.report_delivered")]
    HidReportDelivered {
        /// Sink name, e.g. /dev/hidg0 or uhid
        device: String,
    },

    /// A write to the sink failed; the sender keeps draining
    #[serde(rename = "hid.report_failed")]
    HidReportFailed {
        device: String,
        reason: String,
        /// "device_missing", "device_disconnected", "permission_denied", "io_error"
        error_code: String,
    },

    /// The sender was pointed at a different sink
    #[serde(rename = "hid.sink_changed")]
    HidSinkChanged {
        /// Which pipeline: "keyboard" or "touchpad"
        channel: String,
        /// New sink name
        device: String,
    },

    // ============================================================================
    // Gadget Events
    // ============================================================================
    /// Gadget configuration finished (create or delete)
    #[serde(rename = "gadget.state_changed")]
    GadgetStateChanged {
        /// Gadget directory name, e.g. "g1"
        gadget: String,
        /// "unconfigured", "functions_added", "linked", "enabled"
        phase: String,
        /// UDC bound after the operation
        enabled: bool,
        /// Steps that failed, empty on full success
        #[serde(default)]
        failed_steps: Vec<String>,
    },

    /// Ownership and labels were applied to a device node
    #[serde(rename = "gadget.permissions_fixed")]
    GadgetPermissionsFixed {
        device: String,
        #[serde(default)]
        failed_steps: Vec<String>,
    },
}

impl SystemEvent {
    /// Get the event name (for filtering/routing)
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::HidReportDelivered { .. } => "hid.report_delivered",
            Self::HidReportFailed { .. } => "hid.report_failed",
            Self::HidSinkChanged { .. } => "hid.sink_changed",
            Self::GadgetStateChanged { .. } => "gadget.state_changed",
            Self::GadgetPermissionsFixed { .. } => "gadget.permissions_fixed",
        }
    }

    /// Check if event name matches a topic pattern
    ///
    /// `*` matches everything, `hid.*` a whole prefix, anything else exactly.
    pub fn matches_topic(&self, topic: &str) -> bool {
        if topic == "*" {
            return true;
        }

        let event_name = self.event_name();

        match topic.strip_suffix(".*") {
            Some(prefix) => event_name
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('.')),
            None => event_name == topic,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_topic() {
        let event = SystemEvent::HidReportDelivered {
            device: "/dev/hidg0".to_string(),
        };

        assert!(event.matches_topic("*"));
        assert!(event.matches_topic("hid.*"));
        assert!(event.matches_topic("hid.report_delivered"));
        assert!(!event.matches_topic("gadget.*"));
        assert!(!event.matches_topic("hi.*"));
    }

    #[test]
    fn test_serialization() {
        let event = SystemEvent::GadgetStateChanged {
            gadget: "g1".to_string(),
            phase: "enabled".to_string(),
            enabled: true,
            failed_steps: vec![],
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("gadget.state_changed"));
        assert!(json.contains("\"g1\""));

        let deserialized: SystemEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.event_name(), "gadget.state_changed");
    }
}
