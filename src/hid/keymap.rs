//! Scan code table
//!
//! Translates Unicode characters, symbolic key names and Android `KeyEvent`
//! key codes into USB HID usage codes.
//! Reference: USB HID Usage Tables 1.12, Section 10 (Keyboard/Keypad Page)
//! and Section 15 (Consumer Page) for media keys.

use super::types::KeyboardModifiers;

/// USB HID key codes (Usage Page 0x07)
pub mod usb {
    // Letters A-Z (0x04 - 0x1D)
    pub const KEY_A: u8 = 0x04;
    pub const KEY_Z: u8 = 0x1D;

    // Numbers 1-9, 0 (0x1E - 0x27)
    pub const KEY_1: u8 = 0x1E;
    pub const KEY_7: u8 = 0x24;
    pub const KEY_8: u8 = 0x25;
    pub const KEY_9: u8 = 0x26;
    pub const KEY_0: u8 = 0x27;

    // Control keys
    pub const KEY_ENTER: u8 = 0x28;
    pub const KEY_ESCAPE: u8 = 0x29;
    pub const KEY_BACKSPACE: u8 = 0x2A;
    pub const KEY_TAB: u8 = 0x2B;
    pub const KEY_SPACE: u8 = 0x2C;
    pub const KEY_MINUS: u8 = 0x2D;
    pub const KEY_EQUAL: u8 = 0x2E;
    pub const KEY_LEFT_BRACKET: u8 = 0x2F;
    pub const KEY_RIGHT_BRACKET: u8 = 0x30;
    pub const KEY_BACKSLASH: u8 = 0x31;
    pub const KEY_SEMICOLON: u8 = 0x33;
    pub const KEY_APOSTROPHE: u8 = 0x34;
    pub const KEY_GRAVE: u8 = 0x35;
    pub const KEY_COMMA: u8 = 0x36;
    pub const KEY_PERIOD: u8 = 0x37;
    pub const KEY_SLASH: u8 = 0x38;

    // Function keys F1-F12
    pub const KEY_F1: u8 = 0x3A;
    pub const KEY_F12: u8 = 0x45;

    // Special keys
    pub const KEY_PRINT_SCREEN: u8 = 0x46;
    pub const KEY_SCROLL_LOCK: u8 = 0x47;
    pub const KEY_PAUSE: u8 = 0x48;
    pub const KEY_INSERT: u8 = 0x49;
    pub const KEY_HOME: u8 = 0x4A;
    pub const KEY_PAGE_UP: u8 = 0x4B;
    pub const KEY_DELETE: u8 = 0x4C;
    pub const KEY_END: u8 = 0x4D;
    pub const KEY_PAGE_DOWN: u8 = 0x4E;
    pub const KEY_RIGHT_ARROW: u8 = 0x4F;
    pub const KEY_LEFT_ARROW: u8 = 0x50;
    pub const KEY_DOWN_ARROW: u8 = 0x51;
    pub const KEY_UP_ARROW: u8 = 0x52;
    pub const KEY_NUM_LOCK: u8 = 0x53;
    pub const KEY_NUMPAD_MULTIPLY: u8 = 0x55;
    pub const KEY_NUMPAD_PLUS: u8 = 0x57;

    // Modifier keys (these are handled separately in the modifier byte)
    pub const KEY_LEFT_CTRL: u8 = 0xE0;
    pub const KEY_LEFT_SHIFT: u8 = 0xE1;
    pub const KEY_LEFT_ALT: u8 = 0xE2;
    pub const KEY_LEFT_META: u8 = 0xE3;
    pub const KEY_RIGHT_CTRL: u8 = 0xE4;
    pub const KEY_RIGHT_SHIFT: u8 = 0xE5;
    pub const KEY_RIGHT_ALT: u8 = 0xE6;
    pub const KEY_RIGHT_META: u8 = 0xE7;

    // Consumer page (media report)
    pub const MEDIA_NEXT: u8 = 0xB5;
    pub const MEDIA_PREVIOUS: u8 = 0xB6;
    pub const MEDIA_PLAY_PAUSE: u8 = 0xCD;
    pub const MEDIA_VOLUME_UP: u8 = 0xE9;
    pub const MEDIA_VOLUME_DOWN: u8 = 0xEA;
}

/// Android `KeyEvent.KEYCODE_*` values
pub mod android {
    pub const KEYCODE_0: u16 = 7;
    pub const KEYCODE_STAR: u16 = 17;
    pub const KEYCODE_DPAD_UP: u16 = 19;
    pub const KEYCODE_DPAD_DOWN: u16 = 20;
    pub const KEYCODE_DPAD_LEFT: u16 = 21;
    pub const KEYCODE_DPAD_RIGHT: u16 = 22;
    pub const KEYCODE_VOLUME_UP: u16 = 24;
    pub const KEYCODE_VOLUME_DOWN: u16 = 25;
    pub const KEYCODE_ALT_LEFT: u16 = 57;
    pub const KEYCODE_ALT_RIGHT: u16 = 58;
    pub const KEYCODE_SHIFT_LEFT: u16 = 59;
    pub const KEYCODE_SHIFT_RIGHT: u16 = 60;
    pub const KEYCODE_A: u16 = 29;
    pub const KEYCODE_Z: u16 = 54;
    pub const KEYCODE_COMMA: u16 = 55;
    pub const KEYCODE_PERIOD: u16 = 56;
    pub const KEYCODE_TAB: u16 = 61;
    pub const KEYCODE_SPACE: u16 = 62;
    pub const KEYCODE_ENTER: u16 = 66;
    pub const KEYCODE_DEL: u16 = 67;
    pub const KEYCODE_GRAVE: u16 = 68;
    pub const KEYCODE_MINUS: u16 = 69;
    pub const KEYCODE_EQUALS: u16 = 70;
    pub const KEYCODE_LEFT_BRACKET: u16 = 71;
    pub const KEYCODE_RIGHT_BRACKET: u16 = 72;
    pub const KEYCODE_BACKSLASH: u16 = 73;
    pub const KEYCODE_SEMICOLON: u16 = 74;
    pub const KEYCODE_APOSTROPHE: u16 = 75;
    pub const KEYCODE_SLASH: u16 = 76;
    pub const KEYCODE_PLUS: u16 = 81;
    pub const KEYCODE_MEDIA_PLAY_PAUSE: u16 = 85;
    pub const KEYCODE_MEDIA_NEXT: u16 = 87;
    pub const KEYCODE_MEDIA_PREVIOUS: u16 = 88;
    pub const KEYCODE_PAGE_UP: u16 = 92;
    pub const KEYCODE_PAGE_DOWN: u16 = 93;
    pub const KEYCODE_ESCAPE: u16 = 111;
    pub const KEYCODE_FORWARD_DEL: u16 = 112;
    pub const KEYCODE_CTRL_LEFT: u16 = 113;
    pub const KEYCODE_CTRL_RIGHT: u16 = 114;
    pub const KEYCODE_SCROLL_LOCK: u16 = 116;
    pub const KEYCODE_META_LEFT: u16 = 117;
    pub const KEYCODE_META_RIGHT: u16 = 118;
    pub const KEYCODE_SYSRQ: u16 = 120;
    pub const KEYCODE_BREAK: u16 = 121;
    pub const KEYCODE_MOVE_HOME: u16 = 122;
    pub const KEYCODE_MOVE_END: u16 = 123;
    pub const KEYCODE_INSERT: u16 = 124;
    pub const KEYCODE_F1: u16 = 131;
    pub const KEYCODE_F12: u16 = 142;
    pub const KEYCODE_NUM_LOCK: u16 = 143;
}

/// Shift modifier applied to uppercase letters and shifted punctuation
pub const LEFT_SHIFT_SCAN_CODE: u8 = 0x02;

/// A key identifier coming from the platform input layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyIdentifier<'a> {
    /// Symbolic name such as `"f1"`, `"page-up"` or `"volume-up"`
    Name(&'a str),
    /// Android `KeyEvent` key code
    Android(u16),
}

struct NamedKey {
    name: &'static str,
    android: u16,
    code: u8,
    media: bool,
}

const fn key(name: &'static str, android: u16, code: u8) -> NamedKey {
    NamedKey {
        name,
        android,
        code,
        media: false,
    }
}

const fn media(name: &'static str, android: u16, code: u8) -> NamedKey {
    NamedKey {
        name,
        android,
        code,
        media: true,
    }
}

/// Keys that are not reachable through a single printable character
static NAMED_KEYS: &[NamedKey] = &[
    key("enter", android::KEYCODE_ENTER, usb::KEY_ENTER),
    key("escape", android::KEYCODE_ESCAPE, usb::KEY_ESCAPE),
    key("backspace", android::KEYCODE_DEL, usb::KEY_BACKSPACE),
    key("tab", android::KEYCODE_TAB, usb::KEY_TAB),
    key("space", android::KEYCODE_SPACE, usb::KEY_SPACE),
    key("delete", android::KEYCODE_FORWARD_DEL, usb::KEY_DELETE),
    key("print", android::KEYCODE_SYSRQ, usb::KEY_PRINT_SCREEN),
    key("scroll-lock", android::KEYCODE_SCROLL_LOCK, usb::KEY_SCROLL_LOCK),
    key("num-lock", android::KEYCODE_NUM_LOCK, usb::KEY_NUM_LOCK),
    key("pause", android::KEYCODE_BREAK, usb::KEY_PAUSE),
    key("insert", android::KEYCODE_INSERT, usb::KEY_INSERT),
    key("home", android::KEYCODE_MOVE_HOME, usb::KEY_HOME),
    key("end", android::KEYCODE_MOVE_END, usb::KEY_END),
    key("page-up", android::KEYCODE_PAGE_UP, usb::KEY_PAGE_UP),
    key("page-down", android::KEYCODE_PAGE_DOWN, usb::KEY_PAGE_DOWN),
    key("right", android::KEYCODE_DPAD_RIGHT, usb::KEY_RIGHT_ARROW),
    key("left", android::KEYCODE_DPAD_LEFT, usb::KEY_LEFT_ARROW),
    key("down", android::KEYCODE_DPAD_DOWN, usb::KEY_DOWN_ARROW),
    key("up", android::KEYCODE_DPAD_UP, usb::KEY_UP_ARROW),
    // Keypad variants Android reports for '*' and '+'
    key("keypad-star", android::KEYCODE_STAR, usb::KEY_NUMPAD_MULTIPLY),
    key("keypad-plus", android::KEYCODE_PLUS, usb::KEY_NUMPAD_PLUS),
    // Pressed alone, these set their bit in the modifier byte
    key("left-ctrl", android::KEYCODE_CTRL_LEFT, usb::KEY_LEFT_CTRL),
    key("left-shift", android::KEYCODE_SHIFT_LEFT, usb::KEY_LEFT_SHIFT),
    key("left-alt", android::KEYCODE_ALT_LEFT, usb::KEY_LEFT_ALT),
    key("left-meta", android::KEYCODE_META_LEFT, usb::KEY_LEFT_META),
    key("right-ctrl", android::KEYCODE_CTRL_RIGHT, usb::KEY_RIGHT_CTRL),
    key("right-shift", android::KEYCODE_SHIFT_RIGHT, usb::KEY_RIGHT_SHIFT),
    key("right-alt", android::KEYCODE_ALT_RIGHT, usb::KEY_RIGHT_ALT),
    key("right-meta", android::KEYCODE_META_RIGHT, usb::KEY_RIGHT_META),
    media("next", android::KEYCODE_MEDIA_NEXT, usb::MEDIA_NEXT),
    media("previous", android::KEYCODE_MEDIA_PREVIOUS, usb::MEDIA_PREVIOUS),
    media("play-pause", android::KEYCODE_MEDIA_PLAY_PAUSE, usb::MEDIA_PLAY_PAUSE),
    media("volume-up", android::KEYCODE_VOLUME_UP, usb::MEDIA_VOLUME_UP),
    media("volume-down", android::KEYCODE_VOLUME_DOWN, usb::MEDIA_VOLUME_DOWN),
];

/// Unshifted punctuation and whitespace characters
static PUNCTUATION: &[(char, u8)] = &[
    (' ', usb::KEY_SPACE),
    ('\n', usb::KEY_ENTER),
    ('\t', usb::KEY_TAB),
    ('-', usb::KEY_MINUS),
    ('=', usb::KEY_EQUAL),
    ('[', usb::KEY_LEFT_BRACKET),
    (']', usb::KEY_RIGHT_BRACKET),
    ('\\', usb::KEY_BACKSLASH),
    (';', usb::KEY_SEMICOLON),
    ('\'', usb::KEY_APOSTROPHE),
    ('`', usb::KEY_GRAVE),
    (',', usb::KEY_COMMA),
    ('.', usb::KEY_PERIOD),
    ('/', usb::KEY_SLASH),
];

/// Characters typed as another key plus shift (US layout)
static SHIFTED: &[(char, char)] = &[
    ('<', ','),
    ('>', '.'),
    ('?', '/'),
    (':', ';'),
    ('"', '\''),
    ('{', '['),
    ('}', ']'),
    ('|', '\\'),
    ('~', '`'),
    ('!', '1'),
    ('@', '2'),
    ('#', '3'),
    ('$', '4'),
    ('%', '5'),
    ('^', '6'),
    ('&', '7'),
    ('*', '8'),
    ('(', '9'),
    (')', '0'),
    ('_', '-'),
    ('+', '='),
];

/// Android keyCode to USB HID keyCode mapping table
/// Index = Android keyCode, Value = USB HID keyCode (0 means unmapped)
static ANDROID_TO_USB_TABLE: [u8; 256] = {
    let mut table = [0u8; 256];

    // Letters A-Z (KEYCODE_A..KEYCODE_Z -> USB 0x04-0x1D)
    let mut i = 0u16;
    while i < 26 {
        table[(android::KEYCODE_A + i) as usize] = usb::KEY_A + i as u8;
        i += 1;
    }

    // Digits: KEYCODE_0 is 7, USB puts 0 after 9
    table[android::KEYCODE_0 as usize] = usb::KEY_0;
    let mut d = 1u16;
    while d < 10 {
        table[(android::KEYCODE_0 + d) as usize] = usb::KEY_1 + (d - 1) as u8;
        d += 1;
    }

    // Function keys F1-F12
    let mut f = 0u16;
    while f < 12 {
        table[(android::KEYCODE_F1 + f) as usize] = usb::KEY_F1 + f as u8;
        f += 1;
    }

    table[android::KEYCODE_MINUS as usize] = usb::KEY_MINUS;
    table[android::KEYCODE_EQUALS as usize] = usb::KEY_EQUAL;
    table[android::KEYCODE_LEFT_BRACKET as usize] = usb::KEY_LEFT_BRACKET;
    table[android::KEYCODE_RIGHT_BRACKET as usize] = usb::KEY_RIGHT_BRACKET;
    table[android::KEYCODE_BACKSLASH as usize] = usb::KEY_BACKSLASH;
    table[android::KEYCODE_SEMICOLON as usize] = usb::KEY_SEMICOLON;
    table[android::KEYCODE_APOSTROPHE as usize] = usb::KEY_APOSTROPHE;
    table[android::KEYCODE_GRAVE as usize] = usb::KEY_GRAVE;
    table[android::KEYCODE_COMMA as usize] = usb::KEY_COMMA;
    table[android::KEYCODE_PERIOD as usize] = usb::KEY_PERIOD;
    table[android::KEYCODE_SLASH as usize] = usb::KEY_SLASH;

    // Named keys (including media) are looked up through NAMED_KEYS
    table
};

fn base_char_to_keycode(ch: char) -> Option<u8> {
    match ch {
        'a'..='z' => Some(usb::KEY_A + (ch as u8 - b'a')),
        '0' => Some(usb::KEY_0),
        '1'..='9' => Some(usb::KEY_1 + (ch as u8 - b'1')),
        _ => PUNCTUATION
            .iter()
            .find(|(c, _)| *c == ch)
            .map(|(_, code)| *code),
    }
}

fn keycode_to_base_char(code: u8) -> Option<char> {
    match code {
        usb::KEY_A..=usb::KEY_Z => Some((b'a' + (code - usb::KEY_A)) as char),
        usb::KEY_1..=usb::KEY_9 => Some((b'1' + (code - usb::KEY_1)) as char),
        usb::KEY_0 => Some('0'),
        _ => PUNCTUATION
            .iter()
            .find(|(_, c)| *c == code)
            .map(|(ch, _)| *ch),
    }
}

/// Convert a character to `(modifier, keycode)`
///
/// Uppercase ASCII letters and shifted punctuation carry the left-shift
/// modifier. Returns `None` when the character has no mapping.
pub fn char_to_scan_codes(ch: char) -> Option<(u8, u8)> {
    if let Some((_, base)) = SHIFTED.iter().find(|(c, _)| *c == ch) {
        return base_char_to_keycode(*base).map(|code| (LEFT_SHIFT_SCAN_CODE, code));
    }

    if ch.is_ascii_uppercase() {
        return base_char_to_keycode(ch.to_ascii_lowercase())
            .map(|code| (LEFT_SHIFT_SCAN_CODE, code));
    }

    base_char_to_keycode(ch).map(|code| (0, code))
}

/// Reverse of [`char_to_scan_codes`] for a US layout
pub fn scan_codes_to_char(modifier: u8, keycode: u8) -> Option<char> {
    let base = keycode_to_base_char(keycode)?;
    if modifier & (LEFT_SHIFT_SCAN_CODE | 0x20) == 0 {
        return Some(base);
    }
    if base.is_ascii_lowercase() {
        return Some(base.to_ascii_uppercase());
    }
    SHIFTED
        .iter()
        .find(|(_, b)| *b == base)
        .map(|(shifted, _)| *shifted)
}

fn find_named(id: KeyIdentifier<'_>) -> Option<&'static NamedKey> {
    match id {
        KeyIdentifier::Name(name) => NAMED_KEYS
            .iter()
            .find(|k| k.name.eq_ignore_ascii_case(name)),
        KeyIdentifier::Android(code) => NAMED_KEYS.iter().find(|k| k.android == code),
    }
}

/// Convert a key identifier to a USB HID usage code
///
/// Single-character names resolve to their unshifted key ("a" and "A" both
/// give 0x04). Function keys are accepted as "f1".."f12".
pub fn key_identifier_to_scan_code(id: KeyIdentifier<'_>) -> Option<u8> {
    if let Some(named) = find_named(id) {
        return Some(named.code);
    }

    match id {
        KeyIdentifier::Android(code) => {
            let usb_code = *ANDROID_TO_USB_TABLE.get(code as usize)?;
            (usb_code != 0).then_some(usb_code)
        }
        KeyIdentifier::Name(name) => {
            let mut chars = name.chars();
            if let (Some(ch), None) = (chars.next(), chars.next()) {
                return base_char_to_keycode(ch.to_ascii_lowercase());
            }
            let lower = name.to_ascii_lowercase();
            let n: u8 = lower.strip_prefix('f')?.parse().ok()?;
            (1..=12).contains(&n).then(|| usb::KEY_F1 + n - 1)
        }
    }
}

/// Whether the key belongs to the media (consumer control) report
pub fn is_media_key(id: KeyIdentifier<'_>) -> bool {
    find_named(id).map(|k| k.media).unwrap_or(false)
}

/// Fold a set of active modifiers into the report's modifier byte
pub fn modifiers_to_scan_code(modifiers: &KeyboardModifiers) -> u8 {
    modifiers.to_hid_byte()
}

/// Check if a key code is a modifier key
pub fn is_modifier_key(usb_code: u8) -> bool {
    (usb::KEY_LEFT_CTRL..=usb::KEY_RIGHT_META).contains(&usb_code)
}

/// Get modifier bit for a modifier key
pub fn modifier_bit(usb_code: u8) -> Option<u8> {
    is_modifier_key(usb_code).then(|| 1 << (usb_code - usb::KEY_LEFT_CTRL))
}
