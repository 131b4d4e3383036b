//! Report sinks
//!
//! A sink is where a sender writes its reports: the HID gadget character
//! device (`/dev/hidgN`) or, in loopback mode, a virtual device created
//! through `/dev/uhid`.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::os::fd::OwnedFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use bytes::{BufMut, BytesMut};
use tracing::{debug, info, warn};

use super::types::DevicePath;
use crate::error::{AppError, HidErrorKind, Result};

/// Blocking write target for one report stream
///
/// Writes are called from a blocking thread, one at a time per sink.
pub trait DeviceSink: Send + Sync {
    /// Name used in logs and events
    fn name(&self) -> &str;

    fn write(&self, buf: &[u8]) -> Result<()>;
}

/// Classify an I/O error from a sink write
pub fn classify_io_error(device: &str, e: &io::Error) -> AppError {
    let kind = match e.raw_os_error() {
        Some(libc::ENOENT) => HidErrorKind::DeviceMissing,
        Some(libc::ESHUTDOWN)
        | Some(libc::ENODEV)
        | Some(libc::ENXIO)
        | Some(libc::ETIMEDOUT)
        | Some(libc::EPIPE) => HidErrorKind::DeviceDisconnected,
        Some(libc::EACCES) | Some(libc::EPERM) => HidErrorKind::PermissionDenied,
        _ => {
            let message = e.to_string().to_ascii_lowercase();
            if message.contains("errno 108") {
                HidErrorKind::DeviceDisconnected
            } else if message.contains("permission denied") {
                HidErrorKind::PermissionDenied
            } else {
                HidErrorKind::Io
            }
        }
    };

    AppError::hid(device, e.to_string(), kind)
}

/// HID gadget character device
///
/// The device is opened for every write and closed right after, so a node
/// recreated by the gadget manager is picked up without a reconnect step.
#[derive(Debug, Clone)]
pub struct CharacterDevice {
    path: PathBuf,
    name: String,
}

impl CharacterDevice {
    pub fn new(device: &impl DevicePath) -> Self {
        let path = device.path().to_path_buf();
        Self {
            name: path.display().to_string(),
            path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DeviceSink for CharacterDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn write(&self, buf: &[u8]) -> Result<()> {
        if !self.path.exists() {
            return Err(AppError::hid(
                &self.name,
                "character device does not exist",
                HidErrorKind::DeviceMissing,
            ));
        }

        let mut file = OpenOptions::new()
            .write(true)
            .open(&self.path)
            .map_err(|e| classify_io_error(&self.name, &e))?;

        file.write_all(buf)
            .map_err(|e| classify_io_error(&self.name, &e))
    }
}

/// uhid event types (linux/uhid.h)
pub mod uhid {
    pub const UHID_DESTROY: u32 = 1;
    pub const UHID_CREATE2: u32 = 11;
    pub const UHID_INPUT2: u32 = 12;

    pub const BUS_USB: u16 = 0x03;

    pub const NAME_LEN: usize = 128;
    pub const PHYS_LEN: usize = 64;
    pub const UNIQ_LEN: usize = 64;
    pub const DATA_MAX: usize = 4096;
}

/// Identity of the virtual device created in loopback mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UhidDeviceInfo {
    pub name: String,
    pub vendor: u32,
    pub product: u32,
    pub version: u32,
}

impl Default for UhidDeviceInfo {
    fn default() -> Self {
        Self {
            name: "uhid-touchpad".to_string(),
            vendor: 0x15d9,
            product: 0x0a37,
            version: 0,
        }
    }
}

/// `UHID_INPUT2` envelope: `[type u32 LE][size u16 LE][report]`
pub fn uhid_input2_event(report: &[u8]) -> Result<BytesMut> {
    if report.len() > uhid::DATA_MAX {
        return Err(AppError::hid(
            "uhid",
            format!("report of {} bytes exceeds uhid limit", report.len()),
            HidErrorKind::UnsupportedInput,
        ));
    }

    let mut buf = BytesMut::with_capacity(6 + report.len());
    buf.put_u32_le(uhid::UHID_INPUT2);
    buf.put_u16_le(report.len() as u16);
    buf.put_slice(report);
    Ok(buf)
}

fn put_padded(buf: &mut BytesMut, value: &str, len: usize) {
    let bytes = value.as_bytes();
    // Keep room for the NUL terminator
    let n = bytes.len().min(len - 1);
    buf.put_slice(&bytes[..n]);
    buf.put_bytes(0, len - n);
}

/// `UHID_CREATE2` event carrying the report descriptor
pub fn uhid_create2_event(info: &UhidDeviceInfo, descriptor: &[u8]) -> Result<BytesMut> {
    if descriptor.len() > uhid::DATA_MAX {
        return Err(AppError::Internal(format!(
            "report descriptor of {} bytes exceeds uhid limit",
            descriptor.len()
        )));
    }

    let mut buf = BytesMut::with_capacity(
        4 + uhid::NAME_LEN + uhid::PHYS_LEN + uhid::UNIQ_LEN + 20 + uhid::DATA_MAX,
    );
    buf.put_u32_le(uhid::UHID_CREATE2);
    put_padded(&mut buf, &info.name, uhid::NAME_LEN);
    buf.put_bytes(0, uhid::PHYS_LEN);
    buf.put_bytes(0, uhid::UNIQ_LEN);
    buf.put_u16_le(descriptor.len() as u16);
    buf.put_u16_le(uhid::BUS_USB);
    buf.put_u32_le(info.vendor);
    buf.put_u32_le(info.product);
    buf.put_u32_le(info.version);
    // country
    buf.put_u32_le(0);
    buf.put_slice(descriptor);
    buf.put_bytes(0, uhid::DATA_MAX - descriptor.len());
    Ok(buf)
}

/// Virtual HID device on the local machine, driven through `/dev/uhid`
///
/// Every write goes through a freshly duplicated descriptor so the owned fd
/// is never handed to code that might close it.
pub struct UhidDevice {
    fd: OwnedFd,
    name: String,
    created: bool,
}

impl UhidDevice {
    /// Open the uhid node and create the virtual device
    pub fn open(path: &Path, info: &UhidDeviceInfo, descriptor: &[u8]) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_CLOEXEC)
            .open(path)
            .map_err(|e| classify_io_error(&path.display().to_string(), &e))?;

        let mut device = Self::from_fd(file.into(), &info.name);
        device.send_event(&uhid_create2_event(info, descriptor)?)?;
        device.created = true;

        info!(
            "Created uhid device '{}' ({:04x}:{:04x}) via {}",
            info.name,
            info.vendor,
            info.product,
            path.display()
        );
        Ok(device)
    }

    /// Wrap an already open uhid descriptor without creating a device
    pub fn from_fd(fd: OwnedFd, name: &str) -> Self {
        Self {
            fd,
            name: name.to_string(),
            created: false,
        }
    }

    fn send_event(&self, event: &[u8]) -> Result<()> {
        let fd = self
            .fd
            .try_clone()
            .map_err(|e| classify_io_error(&self.name, &e))?;

        let written = nix::unistd::write(&fd, event)
            .map_err(|errno| classify_io_error(&self.name, &io::Error::from(errno)))?;

        if written != event.len() {
            return Err(AppError::hid(
                &self.name,
                format!("short write: {} of {} bytes", written, event.len()),
                HidErrorKind::Io,
            ));
        }
        Ok(())
    }
}

impl DeviceSink for UhidDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn write(&self, buf: &[u8]) -> Result<()> {
        self.send_event(&uhid_input2_event(buf)?)
    }
}

impl Drop for UhidDevice {
    fn drop(&mut self) {
        if !self.created {
            return;
        }
        let mut event = BytesMut::with_capacity(4);
        event.put_u32_le(uhid::UHID_DESTROY);
        match self.send_event(&event) {
            Ok(()) => debug!("Destroyed uhid device '{}'", self.name),
            Err(e) => warn!("Failed to destroy uhid device '{}': {}", self.name, e),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;

    use parking_lot::Mutex;

    use super::*;

    /// Records writes; fails the writes whose index is listed in `fail_at`
    #[derive(Default)]
    pub struct MemorySink {
        pub name: String,
        pub writes: Mutex<Vec<Vec<u8>>>,
        pub fail_at: Mutex<VecDeque<usize>>,
        attempts: Mutex<usize>,
    }

    impl MemorySink {
        pub fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                ..Default::default()
            }
        }

        pub fn failing_at(name: &str, indexes: &[usize]) -> Self {
            let sink = Self::new(name);
            sink.fail_at.lock().extend(indexes.iter().copied());
            sink
        }

        pub fn written(&self) -> Vec<Vec<u8>> {
            self.writes.lock().clone()
        }
    }

    impl DeviceSink for MemorySink {
        fn name(&self) -> &str {
            &self.name
        }

        fn write(&self, buf: &[u8]) -> Result<()> {
            let mut attempts = self.attempts.lock();
            let index = *attempts;
            *attempts += 1;

            if self.fail_at.lock().contains(&index) {
                return Err(AppError::hid(
                    &self.name,
                    "injected failure",
                    HidErrorKind::DeviceDisconnected,
                ));
            }
            self.writes.lock().push(buf.to_vec());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hid::types::KeyboardDevicePath;

    #[test]
    fn test_classify_errors() {
        let cases = [
            (libc::ENOENT, HidErrorKind::DeviceMissing),
            (libc::ESHUTDOWN, HidErrorKind::DeviceDisconnected),
            (libc::ENODEV, HidErrorKind::DeviceDisconnected),
            (libc::ETIMEDOUT, HidErrorKind::DeviceDisconnected),
            (libc::EACCES, HidErrorKind::PermissionDenied),
            (libc::EIO, HidErrorKind::Io),
        ];
        for (errno, kind) in cases {
            let err = classify_io_error("/dev/hidg0", &io::Error::from_raw_os_error(errno));
            assert_eq!(err.kind(), kind, "errno {}", errno);
        }

        let err = classify_io_error("x", &io::Error::other("write failed: errno 108"));
        assert_eq!(err.kind(), HidErrorKind::DeviceDisconnected);
        let err = classify_io_error("x", &io::Error::other("Permission denied (os)"));
        assert_eq!(err.kind(), HidErrorKind::PermissionDenied);
    }

    #[test]
    fn test_character_device_missing() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CharacterDevice::new(&KeyboardDevicePath::new(dir.path().join("hidg0")));
        let err = sink.write(&[1, 0, 0, 0, 0]).unwrap_err();
        assert_eq!(err.kind(), HidErrorKind::DeviceMissing);
    }

    #[test]
    fn test_character_device_writes_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hidg0");
        std::fs::write(&path, b"").unwrap();

        let sink = CharacterDevice::new(&KeyboardDevicePath::new(&path));
        sink.write(&[1, 2, 0, 4, 0]).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), vec![1, 2, 0, 4, 0]);
    }

    #[test]
    fn test_input2_envelope() {
        let event = uhid_input2_event(&[4, 0x13, 100, 0]).unwrap();
        assert_eq!(&event[..], &[12, 0, 0, 0, 4, 0, 4, 0x13, 100, 0]);
        assert!(uhid_input2_event(&[0u8; 5000]).is_err());
    }

    #[test]
    fn test_create2_layout() {
        let info = UhidDeviceInfo::default();
        let event = uhid_create2_event(&info, &[0x05, 0x0D, 0x09, 0x05]).unwrap();

        assert_eq!(&event[0..4], &11u32.to_le_bytes());
        assert_eq!(&event[4..17], b"uhid-touchpad");
        assert_eq!(event[17], 0);

        let tail = 4 + uhid::NAME_LEN + uhid::PHYS_LEN + uhid::UNIQ_LEN;
        assert_eq!(&event[tail..tail + 2], &4u16.to_le_bytes());
        assert_eq!(&event[tail + 2..tail + 4], &3u16.to_le_bytes());
        assert_eq!(&event[tail + 4..tail + 8], &0x15d9u32.to_le_bytes());
        assert_eq!(&event[tail + 8..tail + 12], &0x0a37u32.to_le_bytes());
        assert_eq!(&event[tail + 20..tail + 24], &[0x05, 0x0D, 0x09, 0x05]);
        assert_eq!(event.len(), tail + 20 + uhid::DATA_MAX);
    }

    #[test]
    fn test_uhid_writes_through_duplicated_fd() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uhid");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .unwrap();

        let sink = UhidDevice::from_fd(file.into(), "uhid");
        sink.write(&[4, 1]).unwrap();
        sink.write(&[4, 0]).unwrap();
        drop(sink);

        assert_eq!(
            std::fs::read(&path).unwrap(),
            vec![12, 0, 0, 0, 2, 0, 4, 1, 12, 0, 0, 0, 2, 0, 4, 0]
        );
    }

    #[test]
    fn test_uhid_open_creates_and_drop_destroys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uhid");
        std::fs::write(&path, b"").unwrap();

        let info = UhidDeviceInfo::default();
        let sink = UhidDevice::open(&path, &info, &[0x05, 0x0D, 0x09, 0x05]).unwrap();
        assert_eq!(sink.name(), "uhid-touchpad");

        let created = std::fs::read(&path).unwrap();
        assert_eq!(created.len(), 4376);
        assert_eq!(&created[0..4], &uhid::UHID_CREATE2.to_le_bytes());
        assert_eq!(&created[4..17], b"uhid-touchpad");

        sink.write(&[4, 1, 0]).unwrap();
        let written = std::fs::read(&path).unwrap();
        assert_eq!(&written[4376..], &[12, 0, 0, 0, 3, 0, 4, 1, 0]);

        drop(sink);
        let destroyed = std::fs::read(&path).unwrap();
        assert_eq!(destroyed.len(), 4376 + 9 + 4);
        assert_eq!(&destroyed[4376 + 9..], &uhid::UHID_DESTROY.to_le_bytes());
    }

    #[test]
    fn test_uhid_open_missing_node() {
        let dir = tempfile::tempdir().unwrap();
        let err = UhidDevice::open(
            &dir.path().join("uhid"),
            &UhidDeviceInfo::default(),
            &[0x05, 0x0D],
        )
        .err()
        .unwrap();
        assert_eq!(err.kind(), HidErrorKind::DeviceMissing);
    }
}
