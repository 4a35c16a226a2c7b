//! Device-wide settings and their key-value representation.

use alloc::string::String;

/// Dark gray shown instead of a pure black background. A black background
/// is indistinguishable from a dead panel, so 0x000000 is never persisted
/// or loaded as-is.
pub const DEFAULT_BACKGROUND: u32 = 0x121212;

pub const DEFAULT_ROWS: u8 = 3;
pub const DEFAULT_COLS: u8 = 3;

pub const WIFI_SSID_MAX: usize = 31;
pub const WIFI_PASSWORD_MAX: usize = 63;

/// Settings keys in the `deck` NVS namespace. All within the 15-byte key
/// limit of the store.
pub mod keys {
    pub const ROWS: &str = "rows";
    pub const COLS: &str = "cols";
    pub const TARGET_OS: &str = "os";
    pub const LANGUAGE: &str = "lang";
    pub const BACKGROUND: &str = "bg";
    pub const WIFI_SSID: &str = "wssid";
    pub const WIFI_PASSWORD: &str = "wpass";

    /// One-shot flag: legacy key-value button entries have been
    /// consolidated into profile files.
    pub const PROFILES_ON_FILES: &str = "init_os_v4";
}

/// Which host OS the key sequences target. Selects the active profile.
#[derive(strum::FromRepr, strum::Display, Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum TargetOs {
    #[default]
    Windows = 0,
    MacOs = 1,
}

impl TargetOs {
    /// Profile file for this OS. These two files are system files: they are
    /// not listed as assets and cannot be removed through asset management.
    pub fn profile_path(self) -> &'static str {
        match self {
            TargetOs::Windows => "/win_btns.bin",
            TargetOs::MacOs => "/mac_btns.bin",
        }
    }

    pub fn other(self) -> Self {
        match self {
            TargetOs::Windows => TargetOs::MacOs,
            TargetOs::MacOs => TargetOs::Windows,
        }
    }
}

/// Keyboard layout used when typing command values over BLE.
#[derive(strum::FromRepr, strum::Display, Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum KeyboardLanguage {
    #[default]
    Primary = 0,
    Secondary = 1,
}

/// The single in-memory copy of the device settings, owned by
/// [`ConfigStore`](crate::store::ConfigStore).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceSettings {
    pub background_color: u32,
    pub grid_rows: u8,
    pub grid_cols: u8,
    pub target_os: TargetOs,
    pub keyboard_language: KeyboardLanguage,
    pub wifi_ssid: String,
    pub wifi_password: String,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            background_color: DEFAULT_BACKGROUND,
            grid_rows: DEFAULT_ROWS,
            grid_cols: DEFAULT_COLS,
            target_os: TargetOs::default(),
            keyboard_language: KeyboardLanguage::default(),
            wifi_ssid: String::new(),
            wifi_password: String::new(),
        }
    }
}

impl DeviceSettings {
    /// Enforce the storage invariants in place. Applied on every load and
    /// before every save, so out-of-range values can exist only
    /// transiently in memory.
    pub fn normalize(&mut self) {
        self.background_color &= 0x00FF_FFFF;
        if self.background_color == 0x000000 {
            self.background_color = DEFAULT_BACKGROUND;
        }
        let cells = u16::from(self.grid_rows) * u16::from(self.grid_cols);
        if self.grid_rows == 0 || self.grid_cols == 0 || cells > 20 {
            self.grid_rows = DEFAULT_ROWS;
            self.grid_cols = DEFAULT_COLS;
        }
        truncate_in_place(&mut self.wifi_ssid, WIFI_SSID_MAX);
        truncate_in_place(&mut self.wifi_password, WIFI_PASSWORD_MAX);
    }
}

fn truncate_in_place(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
}
