//! HID Report Descriptors

/// Keyboard HID Report Descriptor
/// Report ID 1, standard key (4 bytes after the ID):
///   [0] Modifier keys (8 bits)
///   [1] Reserved
///   [2-3] Key codes (2 keys, only the first is used)
/// Report ID 2, consumer control (2 bytes after the ID):
///   [0-1] Usage (16 bits, 0..0x7FF)
pub const KEYBOARD: &[u8] = &[
    0x05, 0x01, // Usage Page (Generic Desktop)
    0x09, 0x06, // Usage (Keyboard)
    0xA1, 0x01, // Collection (Application)
    0x85, 0x01, //   Report ID (1)
    // Modifier keys input (8 bits)
    0x75, 0x01, //   Report Size (1)
    0x95, 0x08, //   Report Count (8)
    0x05, 0x07, //   Usage Page (Key Codes)
    0x19, 0xE0, //   Usage Minimum (224) - Left Control
    0x29, 0xE7, //   Usage Maximum (231) - Right GUI
    0x15, 0x00, //   Logical Minimum (0)
    0x25, 0x01, //   Logical Maximum (1)
    0x81, 0x02, //   Input (Data, Variable, Absolute) - Modifier byte
    // Reserved byte
    0x75, 0x01, //   Report Size (1)
    0x95, 0x08, //   Report Count (8)
    0x81, 0x03, //   Input (Constant) - Reserved byte
    // Key array (2 bytes)
    0x95, 0x02, //   Report Count (2)
    0x75, 0x08, //   Report Size (8)
    0x15, 0x00, //   Logical Minimum (0)
    0x25, 0xFF, //   Logical Maximum (255)
    0x05, 0x07, //   Usage Page (Key Codes)
    0x19, 0x00, //   Usage Minimum (0)
    0x29, 0xFF, //   Usage Maximum (255)
    0x81, 0x00, //   Input (Data, Array)
    0xC0, // End Collection
    0x05, 0x0C, // Usage Page (Consumer)
    0x09, 0x01, // Usage (Consumer Control)
    0xA1, 0x01, // Collection (Application)
    0x85, 0x02, //   Report ID (2)
    0x75, 0x10, //   Report Size (16)
    0x95, 0x01, //   Report Count (1)
    0x26, 0xFF, 0x07, // Logical Maximum (2047)
    0x19, 0x00, //   Usage Minimum (0)
    0x2A, 0xFF, 0x07, // Usage Maximum (2047)
    0x81, 0x00, //   Input (Data, Array)
    0xC0, // End Collection
];

/// Precision touchpad HID Report Descriptor
/// Report ID 4, one contact per report (11 bytes after the ID):
///   [0] Confidence, tip switch, 2 bits padding, contact ID (4 bits)
///   [1-2] X (0..2500), [3-4] Y (0..5000)
///   [5-6] Scan time (100 µs units)
///   [7] Contact count
///   [8] Button 1 + padding
///   [9-10] Padding
/// Feature reports: 2 (max contacts, pad type), 7 (input mode), 6 (vendor blob)
pub const TOUCHPAD: &[u8] = &[
    0x05, 0x0D, // Usage Page (Digitizer)
    0x09, 0x05, // Usage (Touch Pad)
    0xA1, 0x01, // Collection (Application)
    0x85, 0x04, //   Report ID (4)
    0x09, 0x22, //   Usage (Finger)
    0xA1, 0x02, //   Collection (Logical)
    0x15, 0x00, //     Logical Minimum (0)
    0x25, 0x01, //     Logical Maximum (1)
    0x09, 0x47, //     Usage (Confidence)
    0x09, 0x42, //     Usage (Tip Switch)
    0x95, 0x02, //     Report Count (2)
    0x75, 0x01, //     Report Size (1)
    0x81, 0x02, //     Input (Data, Variable, Absolute)
    0x75, 0x01, //     Report Size (1)
    0x95, 0x02, //     Report Count (2)
    0x81, 0x03, //     Input (Constant) - padding
    0x95, 0x01, //     Report Count (1)
    0x75, 0x04, //     Report Size (4)
    0x25, 0x0F, //     Logical Maximum (15)
    0x09, 0x51, //     Usage (Contact Identifier)
    0x81, 0x02, //     Input (Data, Variable, Absolute)
    0x05, 0x01, //     Usage Page (Generic Desktop)
    0x15, 0x00, //     Logical Minimum (0)
    0x26, 0xC4, 0x09, // Logical Maximum (2500)
    0x75, 0x10, //     Report Size (16)
    0x55, 0x0D, //     Unit Exponent (-3)
    0x65, 0x11, //     Unit (cm)
    0x09, 0x30, //     Usage (X)
    0x35, 0x00, //     Physical Minimum (0)
    0x46, 0x88, 0x13, // Physical Maximum (5000)
    0x95, 0x01, //     Report Count (1)
    0x81, 0x02, //     Input (Data, Variable, Absolute)
    0x46, 0x10, 0x27, // Physical Maximum (10000)
    0x26, 0x88, 0x13, // Logical Maximum (5000)
    0x26, 0x88, 0x13, // Logical Maximum (5000)
    0x09, 0x31, //     Usage (Y)
    0x81, 0x02, //     Input (Data, Variable, Absolute)
    0x05, 0x0D, //     Usage Page (Digitizer)
    0x15, 0x00, //     Logical Minimum (0)
    0x25, 0x64, //     Logical Maximum (100)
    0x95, 0x03, //     Report Count (3)
    0xC0, //   End Collection
    0x55, 0x0C, //   Unit Exponent (-4)
    0x66, 0x01, 0x10, // Unit (seconds)
    0x47, 0xFF, 0xFF, 0x00, 0x00, // Physical Maximum (65535)
    0x27, 0xFF, 0xFF, 0x00, 0x00, // Logical Maximum (65535)
    0x75, 0x10, //   Report Size (16)
    0x95, 0x01, //   Report Count (1)
    0x09, 0x56, //   Usage (Scan Time)
    0x81, 0x02, //   Input (Data, Variable, Absolute)
    0x09, 0x54, //   Usage (Contact Count)
    0x25, 0x7F, //   Logical Maximum (127)
    0x95, 0x01, //   Report Count (1)
    0x75, 0x08, //   Report Size (8)
    0x81, 0x02, //   Input (Data, Variable, Absolute)
    0x05, 0x09, //   Usage Page (Button)
    0x09, 0x01, //   Usage (Button 1)
    0x25, 0x01, //   Logical Maximum (1)
    0x75, 0x01, //   Report Size (1)
    0x95, 0x01, //   Report Count (1)
    0x81, 0x02, //   Input (Data, Variable, Absolute)
    0x95, 0x07, //   Report Count (7)
    0x81, 0x03, //   Input (Constant) - padding
    0x09, 0xC5, //   Usage (0xC5)
    0x75, 0x08, //   Report Size (8)
    0x95, 0x02, //   Report Count (2)
    0x81, 0x03, //   Input (Constant) - padding
    0x05, 0x0D, //   Usage Page (Digitizer)
    0x85, 0x02, //   Report ID (2)
    0x09, 0x55, //   Usage (Contact Count Maximum)
    0x09, 0x59, //   Usage (Pad Type)
    0x75, 0x04, //   Report Size (4)
    0x95, 0x02, //   Report Count (2)
    0x25, 0x0F, //   Logical Maximum (15)
    0xB1, 0x02, //   Feature (Data, Variable, Absolute)
    0x85, 0x07, //   Report ID (7)
    0x09, 0x60, //   Usage (Button Type)
    0x75, 0x01, //   Report Size (1)
    0x95, 0x01, //   Report Count (1)
    0x15, 0x00, //   Logical Minimum (0)
    0x25, 0x01, //   Logical Maximum (1)
    0xB1, 0x02, //   Feature (Data, Variable, Absolute)
    0x95, 0x0F, //   Report Count (15)
    0xB1, 0x03, //   Feature (Constant) - padding
    0x06, 0x00, 0xFF, // Usage Page (Vendor Defined 0xFF00)
    0x06, 0x00, 0xFF, // Usage Page (Vendor Defined 0xFF00)
    0x85, 0x06, //   Report ID (6)
    0x09, 0xC5, //   Usage (0xC5)
    0x15, 0x00, //   Logical Minimum (0)
    0x26, 0xFF, 0x00, // Logical Maximum (255)
    0x75, 0x08, //   Report Size (8)
    0x96, 0x00, 0x01, // Report Count (256)
    0xB1, 0x02, //   Feature (Data, Variable, Absolute)
    0xC0, // End Collection
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_framing() {
        for desc in [KEYBOARD, TOUCHPAD] {
            assert!(desc.len() < 4096);
            assert_eq!(desc.last(), Some(&0xC0));
        }
        assert_eq!(&KEYBOARD[..6], &[0x05, 0x01, 0x09, 0x06, 0xA1, 0x01]);
        assert_eq!(&TOUCHPAD[..8], &[0x05, 0x0D, 0x09, 0x05, 0xA1, 0x01, 0x85, 0x04]);
    }

    #[test]
    fn test_collections_balanced() {
        // Short items: the low two bits of the prefix give the payload size (3 means 4)
        for desc in [KEYBOARD, TOUCHPAD] {
            let mut depth = 0i32;
            let mut i = 0;
            while i < desc.len() {
                let prefix = desc[i];
                match prefix {
                    0xA1 => depth += 1,
                    0xC0 => depth -= 1,
                    _ => {}
                }
                assert!(depth >= 0);
                let size = match prefix & 0x03 {
                    3 => 4,
                    n => n as usize,
                };
                i += 1 + size;
            }
            assert_eq!(i, desc.len());
            assert_eq!(depth, 0);
        }
    }
}
