//! HID report pipeline
//!
//! Input events become reports and flow to the device sinks:
//! ```text
//! key / char ──► keymap ──► report ──► keyboard ReportSender ──► /dev/hidg0
//! pointer / touch ───────► report ──► pointer  ReportSender ──► /dev/hidg1 | uhid
//! ```
//!
//! [`HidClient`] owns one sender per sink and re-targets them when the HID
//! section of the configuration changes.

pub mod keymap;
pub mod report;
pub mod sender;
pub mod sink;
pub mod types;

pub use keymap::KeyIdentifier;
pub use report::{RelativePointer, Report};
pub use sender::{ReportSender, SendObserver, SenderState};
pub use sink::{CharacterDevice, DeviceSink, UhidDevice, UhidDeviceInfo};
pub use types::{
    DevicePath, KeyboardDevicePath, KeyboardModifiers, MouseButton, TouchContact,
    TouchpadDevicePath,
};

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::{ConfigStore, HidConfig};
use crate::error::{AppError, HidErrorKind, Result};
use crate::events::{EventBus, SystemEvent};
use crate::otg::report_desc::TOUCHPAD;

/// Build the sink for the keyboard pipeline
pub fn keyboard_sink(config: &HidConfig) -> Box<dyn DeviceSink> {
    Box::new(CharacterDevice::new(&KeyboardDevicePath::new(
        &config.keyboard_path,
    )))
}

/// Build the sink for the pointer pipeline: the touchpad gadget, or uhid in loopback mode
pub fn pointer_sink(config: &HidConfig) -> Result<Box<dyn DeviceSink>> {
    if config.loopback {
        let device = UhidDevice::open(
            Path::new(&config.uhid_path),
            &UhidDeviceInfo::default(),
            TOUCHPAD,
        )?;
        return Ok(Box::new(device));
    }
    Ok(Box::new(CharacterDevice::new(&TouchpadDevicePath::new(
        &config.touchpad_path,
    ))))
}

/// Keyboard and pointer report pipelines
pub struct HidClient {
    keyboard: ReportSender,
    pointer: ReportSender,
    relative: Mutex<RelativePointer>,
    events: Arc<EventBus>,
    applied: Mutex<HidConfig>,
    watcher: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl HidClient {
    /// Create both pipelines from the HID configuration
    pub fn new(config: &HidConfig, events: Arc<EventBus>) -> Result<Self> {
        let pointer = pointer_sink(config)?;
        Ok(Self::with_sinks(
            config,
            keyboard_sink(config),
            pointer,
            events,
        ))
    }

    /// Create the pipelines over explicit sinks
    pub fn with_sinks(
        config: &HidConfig,
        keyboard: Box<dyn DeviceSink>,
        pointer: Box<dyn DeviceSink>,
        events: Arc<EventBus>,
    ) -> Self {
        let observer: Arc<dyn SendObserver> = events.clone();
        Self {
            keyboard: ReportSender::new("keyboard", keyboard, observer.clone()),
            pointer: ReportSender::new("touchpad", pointer, observer),
            relative: Mutex::new(RelativePointer::new()),
            events,
            applied: Mutex::new(config.clone()),
            watcher: Mutex::new(None),
        }
    }

    pub fn keyboard(&self) -> &ReportSender {
        &self.keyboard
    }

    pub fn pointer(&self) -> &ReportSender {
        &self.pointer
    }

    /// Start both senders
    pub fn start(&self) -> Result<()> {
        self.keyboard.start()?;
        self.pointer.start()?;
        info!(
            "HID pipelines started (keyboard: {}, touchpad: {})",
            self.keyboard.sink_name(),
            self.pointer.sink_name()
        );
        Ok(())
    }

    /// Stop both senders and the configuration watcher; queues are kept
    pub async fn stop(&self) {
        let watcher = self.watcher.lock().take();
        if let Some((cancel, handle)) = watcher {
            cancel.cancel();
            join_watcher(handle).await;
        }
        self.keyboard.stop().await;
        self.pointer.stop().await;
    }

    /// Follow configuration changes, re-targeting the sinks when HID settings change
    pub fn watch_config(self: &Arc<Self>, store: ConfigStore) {
        let mut watcher = self.watcher.lock();
        if watcher.is_some() {
            return;
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let client = Arc::clone(self);
        let mut rx = store.subscribe();

        let handle = tokio::spawn(async move {
            loop {
                let change = tokio::select! {
                    _ = token.cancelled() => break,
                    change = rx.recv() => change,
                };
                match change {
                    Ok(change) => {
                        debug!("Config change '{}'", change.key);
                        client.apply_config(&store.get().hid);
                    }
                    Err(RecvError::Lagged(n)) => {
                        debug!("Missed {} config changes, re-reading", n);
                        client.apply_config(&store.get().hid);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        *watcher = Some((cancel, handle));
    }

    /// Rebuild the sinks whose settings differ from the applied ones
    pub fn apply_config(&self, config: &HidConfig) {
        let mut applied = self.applied.lock();

        if applied.keyboard_path != config.keyboard_path {
            self.keyboard.set_sink(keyboard_sink(config));
            applied.keyboard_path = config.keyboard_path.clone();
            self.publish_sink_change(&self.keyboard);
        }

        let pointer_changed = applied.loopback != config.loopback
            || (config.loopback && applied.uhid_path != config.uhid_path)
            || (!config.loopback && applied.touchpad_path != config.touchpad_path);
        if !pointer_changed {
            return;
        }

        match pointer_sink(config) {
            Ok(sink) => {
                self.pointer.set_sink(sink);
                applied.loopback = config.loopback;
                applied.touchpad_path = config.touchpad_path.clone();
                applied.uhid_path = config.uhid_path.clone();
                self.relative.lock().reset();
                self.publish_sink_change(&self.pointer);
            }
            Err(e) => {
                error!("Failed to switch touchpad sink: {}", e);
            }
        }
    }

    fn publish_sink_change(&self, sender: &ReportSender) {
        self.events.publish(SystemEvent::HidSinkChanged {
            channel: sender.label().to_string(),
            device: sender.sink_name(),
        });
    }

    pub fn enqueue_standard_key(&self, modifier: u8, keycode: u8) {
        self.keyboard.enqueue(report::standard_key(modifier, keycode));
    }

    pub fn enqueue_media_key(&self, usage: u8) {
        self.keyboard.enqueue(report::media_key(usage));
    }

    pub fn enqueue_mouse_move(&self, dx: i8, dy: i8) {
        self.pointer.enqueue(report::mouse(0, dx, dy));
    }

    pub fn enqueue_mouse_click(&self, buttons: u8) {
        self.pointer.enqueue(report::mouse(buttons, 0, 0));
    }

    pub fn enqueue_touch_contact(&self, contact: TouchContact) {
        self.pointer.enqueue(report::touch_contact(&contact));
    }

    /// Move the mouse by the distance from the previous absolute position
    pub fn enqueue_pointer_position(&self, buttons: u8, x: i32, y: i32) {
        let report = self.relative.lock().track(buttons, x, y);
        self.pointer.enqueue(report);
    }

    /// The finger was lifted; the next position starts from zero motion
    pub fn release_pointer(&self) {
        self.relative.lock().reset();
    }

    /// Press and release a key, routing media keys to the media report
    pub fn press_key(&self, key: KeyIdentifier<'_>, modifiers: &KeyboardModifiers) -> Result<()> {
        let code = keymap::key_identifier_to_scan_code(key).ok_or_else(|| {
            AppError::hid(
                self.keyboard.sink_name(),
                format!("no scan code for key {:?}", key),
                HidErrorKind::UnsupportedInput,
            )
        })?;

        let modifier = keymap::modifiers_to_scan_code(modifiers);
        if keymap::is_media_key(key) {
            self.enqueue_media_key(code);
        } else if let Some(bit) = keymap::modifier_bit(code) {
            // A modifier on its own lives in the modifier byte, not a key slot
            self.enqueue_standard_key(modifier | bit, 0);
        } else {
            self.enqueue_standard_key(modifier, code);
        }
        Ok(())
    }

    /// Type a string; nothing is queued if any character is unmapped
    pub fn type_text(&self, text: &str) -> Result<usize> {
        let codes = text
            .chars()
            .map(|ch| {
                keymap::char_to_scan_codes(ch).ok_or_else(|| {
                    AppError::hid(
                        self.keyboard.sink_name(),
                        format!("no scan code for character {:?}", ch),
                        HidErrorKind::UnsupportedInput,
                    )
                })
            })
            .collect::<Result<Vec<_>>>()?;

        for (modifier, keycode) in &codes {
            self.enqueue_standard_key(*modifier, *keycode);
        }
        Ok(codes.len())
    }
}

/// Wait for the config watcher; false when it panicked or was aborted
async fn join_watcher(handle: JoinHandle<()>) -> bool {
    match handle.await {
        Ok(()) => true,
        Err(e) => {
            error!("Config watcher task failed: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hid::sink::testing::MemorySink;
    use std::time::Duration;

    struct SharedSink(Arc<MemorySink>);

    impl DeviceSink for SharedSink {
        fn name(&self) -> &str {
            self.0.name()
        }

        fn write(&self, buf: &[u8]) -> Result<()> {
            self.0.write(buf)
        }
    }

    fn client() -> (HidClient, Arc<MemorySink>, Arc<MemorySink>, Arc<EventBus>) {
        let kbd = Arc::new(MemorySink::new("kbd"));
        let ptr = Arc::new(MemorySink::new("ptr"));
        let events = Arc::new(EventBus::new());
        let client = HidClient::with_sinks(
            &HidConfig::default(),
            Box::new(SharedSink(kbd.clone())),
            Box::new(SharedSink(ptr.clone())),
            events.clone(),
        );
        (client, kbd, ptr, events)
    }

    async fn wait_writes(sink: &MemorySink, n: usize) {
        for _ in 0..200 {
            if sink.written().len() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {} writes, got {}", n, sink.written().len());
    }

    #[tokio::test]
    async fn test_type_text() {
        let (client, kbd, _, _) = client();
        client.start().unwrap();

        assert_eq!(client.type_text("Hi!").unwrap(), 3);
        wait_writes(&kbd, 6).await;

        let presses: Vec<Vec<u8>> = kbd.written().into_iter().step_by(2).collect();
        assert_eq!(
            presses,
            vec![
                vec![1, 0x02, 0, 0x0B, 0],
                vec![1, 0x00, 0, 0x0C, 0],
                vec![1, 0x02, 0, 0x1E, 0],
            ]
        );
        client.stop().await;
    }

    #[tokio::test]
    async fn test_type_text_rejects_unmapped() {
        let (client, kbd, _, _) = client();
        client.start().unwrap();

        let err = client.type_text("ok é").unwrap_err();
        assert_eq!(err.kind(), HidErrorKind::UnsupportedInput);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(kbd.written().is_empty());
    }

    #[tokio::test]
    async fn test_press_key_routes_media() {
        let (client, kbd, _, _) = client();
        client.start().unwrap();

        client
            .press_key(KeyIdentifier::Name("volume-up"), &KeyboardModifiers::default())
            .unwrap();
        let ctrl = KeyboardModifiers {
            left_ctrl: true,
            ..Default::default()
        };
        client.press_key(KeyIdentifier::Name("c"), &ctrl).unwrap();
        assert!(client
            .press_key(KeyIdentifier::Name("hyper"), &ctrl)
            .is_err());

        wait_writes(&kbd, 4).await;
        let written = kbd.written();
        assert_eq!(written[0], vec![2, 0xE9, 0]);
        assert_eq!(written[1], vec![2, 0, 0]);
        assert_eq!(written[2], vec![1, 0x01, 0, 0x06, 0]);
    }

    #[tokio::test]
    async fn test_press_modifier_key_sets_modifier_byte() {
        let (client, kbd, _, _) = client();
        client.start().unwrap();

        client
            .press_key(KeyIdentifier::Name("right-alt"), &KeyboardModifiers::default())
            .unwrap();
        let shift = KeyboardModifiers {
            left_shift: true,
            ..Default::default()
        };
        client
            .press_key(KeyIdentifier::Android(113), &shift)
            .unwrap();

        wait_writes(&kbd, 4).await;
        let written = kbd.written();
        assert_eq!(written[0], vec![1, 0x40, 0, 0, 0]);
        assert_eq!(written[1], vec![1, 0, 0, 0, 0]);
        assert_eq!(written[2], vec![1, 0x03, 0, 0, 0]);
        client.stop().await;
    }

    #[tokio::test]
    async fn test_stop_survives_failed_watcher() {
        let (client, _, _, _) = client();
        client.start().unwrap();

        let handle = tokio::spawn(async { panic!("watcher blew up") });
        *client.watcher.lock() = Some((CancellationToken::new(), handle));

        client.stop().await;
        assert!(client.watcher.lock().is_none());
        assert_eq!(client.keyboard.state(), SenderState::Stopped);
        assert_eq!(client.pointer.state(), SenderState::Stopped);

        assert!(!join_watcher(tokio::spawn(async { panic!("again") })).await);
        assert!(join_watcher(tokio::spawn(async {})).await);
    }

    #[tokio::test]
    async fn test_pointer_reports() {
        let (client, _, ptr, _) = client();
        client.start().unwrap();

        client.enqueue_pointer_position(0, 100, 100);
        client.enqueue_pointer_position(0, 103, 98);
        client.enqueue_mouse_click(MouseButton::Left.to_hid_bit());
        client.enqueue_touch_contact(TouchContact {
            id: 0,
            tip_switch: true,
            x: 10,
            y: 20,
            scan_time: 1,
            contact_count: 1,
        });

        wait_writes(&ptr, 8).await;
        let written = ptr.written();
        assert_eq!(written[0], vec![0, 0, 0]);
        assert_eq!(written[2], vec![0, 3, (-2i8) as u8]);
        assert_eq!(written[4], vec![1, 0, 0]);
        assert_eq!(written[6][0], 4);
        assert_eq!(written[7], vec![4, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[tokio::test]
    async fn test_config_change_retargets_keyboard() {
        let dir = tempfile::tempdir().unwrap();
        let new_path = dir.path().join("hidg5");
        std::fs::write(&new_path, b"").unwrap();

        let (client, kbd, _, events) = client();
        let client = Arc::new(client);
        let mut rx = events.subscribe();
        client.start().unwrap();

        let store = ConfigStore::default();
        client.watch_config(store.clone());
        store.update(|c| c.hid.keyboard_path = new_path.display().to_string());

        let event = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if let Ok(SystemEvent::HidSinkChanged { channel, device }) = rx.recv().await {
                    return (channel, device);
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(event.0, "keyboard");
        assert_eq!(event.1, new_path.display().to_string());

        client.enqueue_standard_key(0, 0x04);
        let delivered = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if let Ok(SystemEvent::HidReportDelivered { device }) = rx.recv().await {
                    return device;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(delivered, new_path.display().to_string());

        // Each write reopens the node, so the release overwrote the press
        assert_eq!(std::fs::read(&new_path).unwrap(), vec![1, 0, 0, 0, 0]);
        assert!(kbd.written().is_empty());

        client.stop().await;
    }
}
