//! HID input types and device paths

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Keyboard modifier flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyboardModifiers {
    /// Left Control
    #[serde(default)]
    pub left_ctrl: bool,
    /// Left Shift
    #[serde(default)]
    pub left_shift: bool,
    /// Left Alt
    #[serde(default)]
    pub left_alt: bool,
    /// Left Meta (Windows/Super key)
    #[serde(default)]
    pub left_meta: bool,
    /// Right Control
    #[serde(default)]
    pub right_ctrl: bool,
    /// Right Shift
    #[serde(default)]
    pub right_shift: bool,
    /// Right Alt (AltGr)
    #[serde(default)]
    pub right_alt: bool,
    /// Right Meta
    #[serde(default)]
    pub right_meta: bool,
}

impl KeyboardModifiers {
    /// Convert to USB HID modifier byte
    pub fn to_hid_byte(&self) -> u8 {
        [
            (self.left_ctrl, 0x01),
            (self.left_shift, 0x02),
            (self.left_alt, 0x04),
            (self.left_meta, 0x08),
            (self.right_ctrl, 0x10),
            (self.right_shift, 0x20),
            (self.right_alt, 0x40),
            (self.right_meta, 0x80),
        ]
        .iter()
        .filter(|(active, _)| *active)
        .fold(0u8, |byte, (_, bit)| byte | bit)
    }

    /// Create from USB HID modifier byte
    pub fn from_hid_byte(byte: u8) -> Self {
        Self {
            left_ctrl: byte & 0x01 != 0,
            left_shift: byte & 0x02 != 0,
            left_alt: byte & 0x04 != 0,
            left_meta: byte & 0x08 != 0,
            right_ctrl: byte & 0x10 != 0,
            right_shift: byte & 0x20 != 0,
            right_alt: byte & 0x40 != 0,
            right_meta: byte & 0x80 != 0,
        }
    }

    /// Check if any modifier is active
    pub fn any(&self) -> bool {
        self.to_hid_byte() != 0
    }
}

/// Mouse button
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    /// Convert to USB HID button bit
    pub fn to_hid_bit(&self) -> u8 {
        match self {
            MouseButton::Left => 0x01,
            MouseButton::Right => 0x02,
            MouseButton::Middle => 0x04,
        }
    }
}

/// A single digitizer contact in touchpad logical coordinates (0..2500 x 0..5000)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TouchContact {
    /// Contact identifier, only the low nibble is reported
    pub id: u8,
    /// Finger is touching the surface
    pub tip_switch: bool,
    pub x: i16,
    pub y: i16,
    /// Scan time in 100 µs ticks, wraps at 16 bits
    pub scan_time: u16,
    /// Number of contacts in this frame
    pub contact_count: u8,
}

/// Path of a HID character device
///
/// Equality is by path; `exists()` always asks the filesystem.
pub trait DevicePath: fmt::Debug + Send + Sync {
    fn path(&self) -> &Path;

    fn exists(&self) -> bool {
        self.path().exists()
    }
}

macro_rules! device_path {
    ($name:ident, $what:literal) => {
        #[doc = concat!("Character device path of the ", $what, " function")]
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub struct $name(PathBuf);

        impl $name {
            pub fn new(path: impl Into<PathBuf>) -> Self {
                Self(path.into())
            }
        }

        impl DevicePath for $name {
            fn path(&self) -> &Path {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0.display())
            }
        }
    };
}

device_path!(KeyboardDevicePath, "keyboard");
device_path!(TouchpadDevicePath, "touchpad");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modifier_conversion() {
        let mods = KeyboardModifiers {
            left_ctrl: true,
            left_shift: true,
            ..Default::default()
        };
        assert_eq!(mods.to_hid_byte(), 0x03);
        assert!(mods.any());

        let mods2 = KeyboardModifiers::from_hid_byte(0x03);
        assert!(mods2.left_ctrl);
        assert!(mods2.left_shift);
        assert!(!mods2.left_alt);
        assert_eq!(KeyboardModifiers::from_hid_byte(0xFF).to_hid_byte(), 0xFF);
    }

    #[test]
    fn test_device_path_exists_is_live() {
        let dir = tempfile::tempdir().unwrap();
        let path = KeyboardDevicePath::new(dir.path().join("hidg0"));
        assert!(!path.exists());

        std::fs::write(path.path(), b"").unwrap();
        assert!(path.exists());

        std::fs::remove_file(path.path()).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_device_path_equality() {
        assert_eq!(
            TouchpadDevicePath::new("/dev/hidg1"),
            TouchpadDevicePath::new("/dev/hidg1")
        );
        assert_eq!(KeyboardDevicePath::new("/dev/hidg0").to_string(), "/dev/hidg0");
    }
}
