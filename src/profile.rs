//! Button profiles and their on-flash record layout.
//!
//! A profile is a fixed array of 20 button records, stored as one binary
//! file per target OS. The record layout mirrors the packed C structure of
//! earlier firmware revisions byte for byte, including the three alignment
//! padding bytes after the action type, so that files written by any prior
//! revision remain readable.

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use crate::error::Error;

/// Buttons per profile. The touch grid never exposes more than 20 cells.
pub const BUTTON_COUNT: usize = 20;

pub const LABEL_LEN: usize = 16;
pub const VALUE_LEN: usize = 256;
pub const ICON_LEN: usize = 8;
pub const IMAGE_PATH_LEN: usize = 32;

/// The command-value buffer of the previous record layout.
pub const LEGACY_VALUE_LEN: usize = 128;

// label | value | type + 3 pad bytes | color u32 LE | icon | image path
pub const RECORD_SIZE: usize = LABEL_LEN + VALUE_LEN + 4 + 4 + ICON_LEN + IMAGE_PATH_LEN;
pub const LEGACY_RECORD_SIZE: usize =
    LABEL_LEN + LEGACY_VALUE_LEN + 4 + 4 + ICON_LEN + IMAGE_PATH_LEN;

pub const PROFILE_SIZE: usize = BUTTON_COUNT * RECORD_SIZE;
pub const LEGACY_PROFILE_SIZE: usize = BUTTON_COUNT * LEGACY_RECORD_SIZE;

const _: () = assert!(RECORD_SIZE == 320, "record layout drifted");
const _: () = assert!(LEGACY_RECORD_SIZE == 192, "legacy record layout drifted");

/// What a button press does on the host.
#[derive(strum::FromRepr, strum::Display, Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ActionType {
    /// Open the OS launcher (Win+R / Cmd+Space) and type the value.
    #[default]
    Launch = 0,
    /// A media key named by the value ("mute", "volup", ...).
    MediaKey = 1,
    /// Ctrl/Cmd plus the first character of the value.
    BasicCombo = 2,
    /// A full modifier chord described by the value.
    AdvancedCombo = 3,
}

/// One grid cell. String fields are capped by the record layout and
/// truncated on encode; `color` carries 0xRRGGBB in its low three bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ButtonConfig {
    pub label: String,
    pub value: String,
    pub action: ActionType,
    pub color: u32,
    /// UTF-8 bytes of an LVGL symbol glyph, or empty. See [`symbol_code`].
    pub icon: String,
    /// `/`-rooted name of an uploaded image asset, or empty. When both an
    /// icon and an image are set, rendering prefers the image.
    pub image_path: String,
}

impl Default for ButtonConfig {
    fn default() -> Self {
        Self {
            label: String::from("Button"),
            value: String::new(),
            action: ActionType::Launch,
            color: 0x333333,
            icon: String::new(),
            image_path: String::new(),
        }
    }
}

/// The 20 buttons bound to one target OS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonProfile {
    pub buttons: [ButtonConfig; BUTTON_COUNT],
}

impl Default for ButtonProfile {
    fn default() -> Self {
        Self {
            buttons: core::array::from_fn(|_| ButtonConfig::default()),
        }
    }
}

impl ButtonProfile {
    /// Serialize to the current on-flash layout.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![0u8; PROFILE_SIZE];
        for (cfg, chunk) in self.buttons.iter().zip(out.chunks_exact_mut(RECORD_SIZE)) {
            encode_record(cfg, chunk);
        }
        out
    }

    /// Deserialize from the current on-flash layout. The length has to
    /// match exactly; anything else is a different (or corrupt) layout.
    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != PROFILE_SIZE {
            return Err(Error::RecordSizeMismatch(bytes.len()));
        }
        let mut profile = ButtonProfile::default();
        for (cfg, chunk) in profile
            .buttons
            .iter_mut()
            .zip(bytes.chunks_exact(RECORD_SIZE))
        {
            *cfg = decode_record(chunk, VALUE_LEN);
        }
        Ok(profile)
    }

    /// Deserialize from the previous layout (128-byte command values).
    pub fn decode_legacy(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != LEGACY_PROFILE_SIZE {
            return Err(Error::RecordSizeMismatch(bytes.len()));
        }
        let mut profile = ButtonProfile::default();
        for (cfg, chunk) in profile
            .buttons
            .iter_mut()
            .zip(bytes.chunks_exact(LEGACY_RECORD_SIZE))
        {
            *cfg = decode_record(chunk, LEGACY_VALUE_LEN);
        }
        Ok(profile)
    }
}

/// Decode one legacy-layout record, the shape the ancient key-value button
/// entries were stored in.
pub fn decode_legacy_record(bytes: &[u8]) -> Result<ButtonConfig, Error> {
    if bytes.len() != LEGACY_RECORD_SIZE {
        return Err(Error::RecordSizeMismatch(bytes.len()));
    }
    Ok(decode_record(bytes, LEGACY_VALUE_LEN))
}

fn encode_record(cfg: &ButtonConfig, out: &mut [u8]) {
    debug_assert_eq!(out.len(), RECORD_SIZE);
    let mut at = 0;
    put_cstr(&mut out[at..at + LABEL_LEN], &cfg.label);
    at += LABEL_LEN;
    put_cstr(&mut out[at..at + VALUE_LEN], &cfg.value);
    at += VALUE_LEN;
    out[at] = cfg.action as u8;
    at += 4; // type byte + struct padding
    out[at..at + 4].copy_from_slice(&(cfg.color & 0x00FF_FFFF).to_le_bytes());
    at += 4;
    put_cstr(&mut out[at..at + ICON_LEN], &cfg.icon);
    at += ICON_LEN;
    put_cstr(&mut out[at..at + IMAGE_PATH_LEN], &cfg.image_path);
}

fn decode_record(bytes: &[u8], value_len: usize) -> ButtonConfig {
    let mut at = 0;
    let label = read_cstr(&bytes[at..at + LABEL_LEN]);
    at += LABEL_LEN;
    let value = read_cstr(&bytes[at..at + value_len]);
    at += value_len;
    // unknown action bytes decode as Launch rather than poisoning the record
    let action = ActionType::from_repr(bytes[at]).unwrap_or_default();
    at += 4;
    let color = u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
        & 0x00FF_FFFF;
    at += 4;
    let icon = read_cstr(&bytes[at..at + ICON_LEN]);
    at += ICON_LEN;
    let image_path = read_cstr(&bytes[at..at + IMAGE_PATH_LEN]);
    ButtonConfig {
        label,
        value,
        action,
        color,
        icon,
        image_path,
    }
}

/// `strncpy` semantics: at most `dst.len() - 1` bytes plus a terminator,
/// truncated at a UTF-8 character boundary.
fn put_cstr(dst: &mut [u8], s: &str) {
    let mut take = s.len().min(dst.len() - 1);
    while !s.is_char_boundary(take) {
        take -= 1;
    }
    dst[..take].copy_from_slice(&s.as_bytes()[..take]);
    for b in &mut dst[take..] {
        *b = 0;
    }
}

/// Reads up to the first NUL. Records written by earlier firmware are C
/// strings, so the terminator is authoritative, not the array length.
fn read_cstr(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Display names and glyph bytes of the icons the on-device editor offers.
/// Storage keeps the glyph bytes; the backup document keeps the name.
pub const SYMBOLS: [(&str, &str); 16] = [
    ("None", ""),
    ("OK", "\u{f00c}"),
    ("Close", "\u{f00d}"),
    ("Copy", "\u{f0c5}"),
    ("Paste", "\u{f0ea}"),
    ("Cut", "\u{f0c4}"),
    ("Play", "\u{f04b}"),
    ("Pause", "\u{f04c}"),
    ("Mute", "\u{f026}"),
    ("Settings", "\u{f013}"),
    ("Home", "\u{f015}"),
    ("Save", "\u{f0c7}"),
    ("Edit", "\u{f304}"),
    ("File", "\u{f15b}"),
    ("Dir", "\u{f07b}"),
    ("Plus", "\u{f067}"),
];

/// Glyph bytes for a display name; unknown names map to no icon.
pub fn symbol_code(name: &str) -> &'static str {
    SYMBOLS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, c)| *c)
        .unwrap_or("")
}

/// Display name for glyph bytes; unknown glyphs map to "None".
pub fn symbol_name(code: &str) -> &'static str {
    if code.is_empty() {
        return "None";
    }
    SYMBOLS
        .iter()
        .find(|(_, c)| *c == code)
        .map(|(n, _)| *n)
        .unwrap_or("None")
}
