//! HID report encoding
//!
//! Report layouts follow the keyboard and touchpad descriptors in
//! [`crate::otg::report_desc`]:
//! - Standard key: `[0x01, modifier, reserved, keycode, reserved]`
//! - Media key: `[0x02, usage, 0]`
//! - Mouse: `[buttons, dx, dy]` (no report ID)
//! - Touch contact: 12 bytes, report ID 0x04
//!
//! Encoders never validate coordinates. Scaling into the 2500x5000 logical
//! space is done by the caller.

use bytes::{BufMut, Bytes, BytesMut};

use super::types::TouchContact;

pub const STANDARD_KEY_REPORT_ID: u8 = 0x01;
pub const MEDIA_KEY_REPORT_ID: u8 = 0x02;
pub const TOUCH_REPORT_ID: u8 = 0x04;

pub const STANDARD_KEY_REPORT_LEN: usize = 5;
pub const MEDIA_KEY_REPORT_LEN: usize = 3;
pub const MOUSE_REPORT_LEN: usize = 3;
pub const TOUCH_REPORT_LEN: usize = 12;

/// Immutable report buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    bytes: Bytes,
    has_report_id: bool,
}

impl Report {
    pub fn new(bytes: impl Into<Bytes>, has_report_id: bool) -> Self {
        Self {
            bytes: bytes.into(),
            has_report_id,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn has_report_id(&self) -> bool {
        self.has_report_id
    }

    /// The "nothing pressed" report that follows this one
    pub fn release(&self) -> Report {
        let mut buf = BytesMut::zeroed(self.bytes.len());
        if self.has_report_id {
            if let (Some(dst), Some(id)) = (buf.first_mut(), self.bytes.first()) {
                *dst = *id;
            }
        }
        Report::new(buf.freeze(), self.has_report_id)
    }
}

impl AsRef<[u8]> for Report {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

/// `[1, modifier, 0, keycode, 0]`
pub fn standard_key(modifier: u8, keycode: u8) -> Report {
    Report::new(
        Bytes::copy_from_slice(&[STANDARD_KEY_REPORT_ID, modifier, 0, keycode, 0]),
        true,
    )
}

/// `[2, usage, 0]`
pub fn media_key(usage: u8) -> Report {
    Report::new(
        Bytes::copy_from_slice(&[MEDIA_KEY_REPORT_ID, usage, 0]),
        true,
    )
}

/// `[buttons, dx, dy]`
pub fn mouse(buttons: u8, dx: i8, dy: i8) -> Report {
    Report::new(
        Bytes::copy_from_slice(&[buttons, dx as u8, dy as u8]),
        false,
    )
}

/// Flags byte: bit0 confidence, bit1 tip switch, high nibble contact id
fn touch_flags(contact: &TouchContact) -> u8 {
    let tip = if contact.tip_switch { 0x02 } else { 0x00 };
    0x01 | tip | ((contact.id & 0x0F) << 4)
}

/// 12-byte digitizer report for one contact
///
/// The contact count is only reported on the contact with ID 0; the host
/// reads it once per frame.
pub fn touch_contact(contact: &TouchContact) -> Report {
    let count = if contact.id == 0 {
        contact.contact_count
    } else {
        0
    };

    let mut buf = BytesMut::with_capacity(TOUCH_REPORT_LEN);
    buf.put_u8(TOUCH_REPORT_ID);
    buf.put_u8(touch_flags(contact));
    buf.put_i16_le(contact.x);
    buf.put_i16_le(contact.y);
    buf.put_u16_le(contact.scan_time);
    buf.put_u8(count);
    buf.put_bytes(0, 3);

    Report::new(buf.freeze(), true)
}

/// Turns absolute touch positions into relative mouse reports
///
/// The first contact after a reset produces no motion.
#[derive(Debug, Default)]
pub struct RelativePointer {
    last: Option<(i32, i32)>,
}

impl RelativePointer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mouse report for the move from the previous position to `(x, y)`
    pub fn track(&mut self, buttons: u8, x: i32, y: i32) -> Report {
        let (dx, dy) = match self.last {
            Some((lx, ly)) => (saturate(x.saturating_sub(lx)), saturate(y.saturating_sub(ly))),
            None => (0, 0),
        };
        self.last = Some((x, y));
        mouse(buttons, dx, dy)
    }

    /// Forget the previous position (finger lifted)
    pub fn reset(&mut self) {
        self.last = None;
    }
}

fn saturate(delta: i32) -> i8 {
    delta.clamp(i8::MIN as i32, i8::MAX as i32) as i8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_key_and_release() {
        let report = standard_key(0x02, 0x04);
        assert_eq!(report.as_bytes(), &[1, 2, 0, 4, 0]);
        assert_eq!(report.release().as_bytes(), &[1, 0, 0, 0, 0]);
    }

    #[test]
    fn test_standard_key_shape() {
        for keycode in [0x04u8, 0x1E, 0x28, 0x45, 0x52] {
            for modifier in [0x00u8, 0x02, 0x81, 0xFF] {
                let report = standard_key(modifier, keycode);
                assert_eq!(report.len(), STANDARD_KEY_REPORT_LEN);
                assert_eq!(report.as_bytes()[0], 1);
                assert_eq!(report.as_bytes()[1], modifier);
                assert_eq!(report.as_bytes()[3], keycode);
            }
        }
    }

    #[test]
    fn test_media_key() {
        let report = media_key(0xE9);
        assert_eq!(report.as_bytes(), &[2, 0xE9, 0]);
        assert_eq!(report.release().as_bytes(), &[2, 0, 0]);
    }

    #[test]
    fn test_mouse_release_has_no_id() {
        let report = mouse(0x01, -5, 7);
        assert_eq!(report.as_bytes(), &[0x01, 0xFB, 0x07]);
        assert_eq!(report.release().as_bytes(), &[0, 0, 0]);
    }

    #[test]
    fn test_touch_contact_example() {
        let contact = TouchContact {
            id: 1,
            tip_switch: true,
            x: 100,
            y: 200,
            scan_time: 0x1234,
            contact_count: 3,
        };
        let report = touch_contact(&contact);
        assert_eq!(
            report.as_bytes(),
            &[4, 0x13, 100, 0, 200, 0, 0x34, 0x12, 0, 0, 0, 0]
        );
        assert_eq!(report.release().as_bytes(), &[4, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_touch_first_contact_carries_count() {
        let contact = TouchContact {
            id: 0,
            tip_switch: true,
            x: 100,
            y: 200,
            scan_time: 5000,
            contact_count: 2,
        };
        let bytes = touch_contact(&contact).as_bytes().to_vec();
        assert_eq!(bytes[1], 0x03);
        assert_eq!(&bytes[2..4], &100i16.to_le_bytes());
        assert_eq!(&bytes[4..6], &200i16.to_le_bytes());
        assert_eq!(&bytes[6..8], &5000u16.to_le_bytes());
        assert_eq!(bytes[8], 2);
    }

    #[test]
    fn test_touch_contact_count_only_on_first() {
        for id in 0u8..16 {
            let contact = TouchContact {
                id,
                tip_switch: false,
                x: -1,
                y: 4999,
                scan_time: 0,
                contact_count: 2,
            };
            let report = touch_contact(&contact);
            let expected = if id == 0 { 2 } else { 0 };
            assert_eq!(report.as_bytes()[8], expected);
            assert_eq!(report.as_bytes()[1] & 0x0C, 0);
            assert_eq!(report.as_bytes()[1] >> 4, id);
            assert_eq!(report.len(), TOUCH_REPORT_LEN);
        }
    }

    #[test]
    fn test_relative_pointer() {
        let mut pointer = RelativePointer::new();
        assert_eq!(pointer.track(0, 500, 500).as_bytes(), &[0, 0, 0]);
        assert_eq!(pointer.track(0, 510, 495).as_bytes(), &[0, 10, (-5i8) as u8]);
        assert_eq!(pointer.track(1, 1500, 495).as_bytes(), &[1, 127, 0]);

        pointer.reset();
        assert_eq!(pointer.track(0, 0, 0).as_bytes(), &[0, 0, 0]);
    }

    #[test]
    fn test_relative_pointer_extreme_positions() {
        let mut pointer = RelativePointer::new();
        pointer.track(0, -10, 10);
        assert_eq!(pointer.track(0, i32::MAX, i32::MIN).as_bytes(), &[0, 127, (-128i8) as u8]);
        assert_eq!(pointer.track(0, i32::MIN, i32::MAX).as_bytes(), &[0, (-128i8) as u8, 127]);
    }
}
