//! The configuration store: the single owner of the in-memory settings and
//! the active button profile.
//!
//! One store exists per device. Request handlers and touchscreen callbacks
//! receive it by reference from the main loop; there are no ambient
//! globals. All execution is single-threaded and cooperative, so a handler
//! must fully apply and persist a mutation before yielding back to the
//! loop.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use crate::error::Error;
use crate::migrate;
use crate::platform::Platform;
use crate::profile::ButtonProfile;
use crate::settings::{DeviceSettings, KeyboardLanguage, TargetOs, keys};

pub struct ConfigStore<P: Platform> {
    pub(crate) platform: P,
    pub(crate) settings: DeviceSettings,
    pub(crate) profile: ButtonProfile,
}

impl<P: Platform> ConfigStore<P> {
    /// Load the device state from storage.
    ///
    /// Never fails: any missing or unreadable record falls back to its
    /// documented default so the device always boots into a usable state.
    /// Pending migrations run first: the one-shot key-value consolidation
    /// if its flag is unset, the record-size upgrade whenever a stale file
    /// is encountered.
    pub fn open(mut platform: P) -> Self {
        if platform.get_bool(keys::PROFILES_ON_FILES) != Some(true) {
            match migrate::consolidate_legacy_kv(&mut platform) {
                Ok(()) => {
                    let _ = platform.set_bool(keys::PROFILES_ON_FILES, true);
                }
                Err(_e) => {
                    // boot continues on the old layout, retried next time
                    #[cfg(feature = "defmt")]
                    defmt::warn!("legacy profile consolidation failed: {}", _e);
                }
            }
        }

        let settings = load_settings(&mut platform);
        let profile = load_profile_or_default(&mut platform, settings.target_os);
        Self {
            platform,
            settings,
            profile,
        }
    }

    pub fn settings(&self) -> &DeviceSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut DeviceSettings {
        &mut self.settings
    }

    /// The active profile, matching `settings().target_os`. The inactive
    /// OS's profile lives only on storage.
    pub fn profile(&self) -> &ButtonProfile {
        &self.profile
    }

    pub fn profile_mut(&mut self) -> &mut ButtonProfile {
        &mut self.profile
    }

    /// Persist the settings, and the active profile only when the caller
    /// explicitly says so.
    ///
    /// The flag is stated intent, not inferred: a handler that merely
    /// switches the target OS passes `false`, otherwise the buttons held
    /// in memory for the *previous* OS would overwrite the new OS's saved
    /// profile. A write failure leaves the in-memory state authoritative;
    /// the device keeps running with unsaved changes.
    pub fn save(&mut self, persist_profile: bool) -> Result<(), Error> {
        self.settings.normalize();

        self.platform
            .set_u32(keys::BACKGROUND, self.settings.background_color)?;
        self.platform.set_u8(keys::ROWS, self.settings.grid_rows)?;
        self.platform.set_u8(keys::COLS, self.settings.grid_cols)?;
        self.platform
            .set_u8(keys::TARGET_OS, self.settings.target_os as u8)?;
        self.platform
            .set_u8(keys::LANGUAGE, self.settings.keyboard_language as u8)?;
        self.platform
            .set_str(keys::WIFI_SSID, &self.settings.wifi_ssid)?;
        self.platform
            .set_str(keys::WIFI_PASSWORD, &self.settings.wifi_password)?;

        if persist_profile {
            self.platform.write(
                self.settings.target_os.profile_path(),
                &self.profile.encode(),
            )?;
        }
        Ok(())
    }

    /// Switch the active OS: persist settings without touching any profile
    /// file, then load the new OS's buttons from storage. The previous
    /// OS's in-memory buttons are discarded; whatever was last saved for
    /// it is what a switch back will restore.
    pub fn switch_os(&mut self, os: TargetOs) -> Result<(), Error> {
        self.settings.target_os = os;
        let saved = self.save(false);
        self.profile = load_profile_or_default(&mut self.platform, os);
        saved
    }

    /// Uploaded image assets, excluding the profile system files. Sorted
    /// for stable output.
    pub fn list_assets(&mut self) -> Vec<String> {
        let mut names: Vec<String> = self
            .platform
            .list()
            .into_iter()
            .filter(|name| !is_system_file(name))
            .collect();
        names.sort();
        names
    }

    /// Store an asset under its `/`-rooted name, replacing any previous
    /// content. System files cannot be overwritten this way.
    pub fn store_asset(&mut self, name: &str, data: &[u8]) -> Result<(), Error> {
        let path = asset_path(name);
        if is_system_file(&path) {
            return Err(Error::ProtectedFile);
        }
        self.platform.write(&path, data)
    }

    pub fn remove_asset(&mut self, name: &str) -> Result<(), Error> {
        let path = asset_path(name);
        if is_system_file(&path) {
            return Err(Error::ProtectedFile);
        }
        self.platform.remove(&path)
    }

    pub fn read_asset(&mut self, name: &str) -> Result<Vec<u8>, Error> {
        self.platform.read(&asset_path(name))
    }

    /// Hand the platform back, e.g. to start an OTA session on shared
    /// hardware. Consumes the store; in-memory state is dropped.
    pub fn into_platform(self) -> P {
        self.platform
    }
}

fn load_settings<P: Platform>(platform: &mut P) -> DeviceSettings {
    let mut s = DeviceSettings::default();
    if let Some(v) = platform.get_u8(keys::ROWS) {
        s.grid_rows = v;
    }
    if let Some(v) = platform.get_u8(keys::COLS) {
        s.grid_cols = v;
    }
    if let Some(v) = platform.get_u8(keys::TARGET_OS) {
        s.target_os = TargetOs::from_repr(v).unwrap_or_default();
    }
    if let Some(v) = platform.get_u8(keys::LANGUAGE) {
        s.keyboard_language = KeyboardLanguage::from_repr(v).unwrap_or_default();
    }
    if let Some(v) = platform.get_u32(keys::BACKGROUND) {
        s.background_color = v;
    }
    if let Some(v) = platform.get_str(keys::WIFI_SSID) {
        s.wifi_ssid = v;
    }
    if let Some(v) = platform.get_str(keys::WIFI_PASSWORD) {
        s.wifi_password = v;
    }
    s.normalize();
    s
}

fn load_profile_or_default<P: Platform>(platform: &mut P, os: TargetOs) -> ButtonProfile {
    match migrate::load_profile(platform, os) {
        Ok(profile) => profile,
        Err(_e) => {
            #[cfg(feature = "defmt")]
            defmt::warn!("profile for {} unreadable ({}), using defaults", os, _e);
            ButtonProfile::default()
        }
    }
}

/// The per-OS profile files are system files: invisible to asset listing
/// and protected from overwrite and removal.
pub fn is_system_file(path: &str) -> bool {
    path == TargetOs::Windows.profile_path() || path == TargetOs::MacOs.profile_path()
}

/// Asset names arrive from the dashboard with or without the leading `/`.
pub fn asset_path(name: &str) -> String {
    if name.starts_with('/') {
        String::from(name)
    } else {
        format!("/{name}")
    }
}
