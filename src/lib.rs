//! usb-hid-client - USB keyboard and touchpad emulation
//!
//! Turns a rooted Linux/Android device into a USB HID keyboard and precision
//! touchpad by adding HID functions to the device's ConfigFS gadget and
//! writing input reports to the resulting `/dev/hidg*` character devices.

pub mod config;
pub mod error;
pub mod events;
pub mod hid;
pub mod otg;
pub mod state;
pub mod utils;

pub use error::{AppError, Result};
