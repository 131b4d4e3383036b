use std::sync::Arc;

use tracing::info;

use crate::config::ConfigStore;
use crate::error::Result;
use crate::events::EventBus;
use crate::hid::HidClient;
use crate::otg::{GadgetService, RootShell};

/// Application-wide state shared by the UI collaborator
///
/// Owns the two report pipelines and the gadget service; both read their
/// settings from the same [`ConfigStore`] and report through the same
/// [`EventBus`].
pub struct AppState {
    pub config: ConfigStore,
    pub events: Arc<EventBus>,
    pub hid: Arc<HidClient>,
    pub gadget: Arc<GadgetService>,
}

impl AppState {
    pub fn new(config: ConfigStore, shell: Arc<dyn RootShell>) -> Result<Arc<Self>> {
        let events = Arc::new(EventBus::new());
        let hid = Arc::new(HidClient::new(&config.get().hid, events.clone())?);
        let gadget = Arc::new(GadgetService::new(config.clone(), shell, events.clone()));

        Ok(Arc::new(Self {
            config,
            events,
            hid,
            gadget,
        }))
    }

    /// Start the report senders and follow configuration changes
    pub fn start(&self) -> Result<()> {
        self.hid.start()?;
        self.hid.watch_config(self.config.clone());
        Ok(())
    }

    /// Stop the senders; queued reports are dropped with the state
    pub async fn shutdown(&self) {
        self.hid.stop().await;
        info!("HID client stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::events::SystemEvent;
    use crate::otg::permissions::testing::ScriptedShell;
    use std::time::Duration;

    #[tokio::test]
    async fn test_state_delivers_through_event_bus() {
        let dir = tempfile::tempdir().unwrap();
        let keyboard = dir.path().join("hidg0");
        std::fs::write(&keyboard, b"").unwrap();

        let mut config = AppConfig::default();
        config.hid.keyboard_path = keyboard.display().to_string();
        config.hid.touchpad_path = dir.path().join("hidg1").display().to_string();

        let state = AppState::new(ConfigStore::new(config), Arc::new(ScriptedShell::new(false)))
            .unwrap();
        let mut rx = state.events.subscribe();
        state.start().unwrap();

        state.hid.enqueue_standard_key(0, 4);
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, SystemEvent::HidReportDelivered { .. }));
        assert_eq!(std::fs::read(&keyboard).unwrap(), vec![1, 0, 0, 0, 0]);

        // Touchpad node does not exist
        state.hid.enqueue_mouse_click(0);
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        match event {
            SystemEvent::HidReportFailed { error_code, .. } => {
                assert_eq!(error_code, "device_missing")
            }
            other => panic!("unexpected event {:?}", other),
        }

        assert!(state.gadget.any_character_device_missing());
        state.shutdown().await;
    }
}
