//! Whole-device backup as a single JSON document.
//!
//! Export is self-contained: settings, both OS profiles and every uploaded
//! asset (base64). Import is a merge, not a replace: absent fields leave
//! the current state untouched, and a malformed document is rejected
//! before anything is mutated. The Wi-Fi password deliberately never
//! leaves the device.

use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::migrate;
use crate::platform::Platform;
use crate::profile::{BUTTON_COUNT, ActionType, ButtonConfig, ButtonProfile, symbol_code, symbol_name};
use crate::settings::{KeyboardLanguage, TargetOs};
use crate::store::{ConfigStore, asset_path, is_system_file};

#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(default)]
struct BackupDoc {
    bg: Option<String>,
    rows: Option<u8>,
    cols: Option<u8>,
    os: Option<u8>,
    lang: Option<u8>,
    wifi_ssid: Option<String>,
    win_btns: Option<Vec<BackupButton>>,
    mac_btns: Option<Vec<BackupButton>>,
    assets: Option<BTreeMap<String, String>>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(default)]
struct BackupButton {
    label: Option<String>,
    value: Option<String>,
    #[serde(rename = "type")]
    action: Option<u8>,
    color: Option<String>,
    /// Icon by display name ("Play"), not by glyph bytes.
    icon: Option<String>,
    img: Option<String>,
}

impl BackupButton {
    fn from_config(cfg: &ButtonConfig) -> Self {
        Self {
            label: Some(cfg.label.clone()),
            value: Some(cfg.value.clone()),
            action: Some(cfg.action as u8),
            color: Some(format!("{:06x}", cfg.color)),
            icon: Some(symbol_name(&cfg.icon).to_string()),
            img: Some(cfg.image_path.clone()),
        }
    }

    /// Missing or unparsable fields take the default button's values; a
    /// half-described button never aborts the whole import.
    fn into_config(self) -> ButtonConfig {
        let defaults = ButtonConfig::default();
        ButtonConfig {
            label: self.label.unwrap_or(defaults.label),
            value: self.value.unwrap_or(defaults.value),
            action: self
                .action
                .and_then(ActionType::from_repr)
                .unwrap_or_default(),
            color: self
                .color
                .as_deref()
                .and_then(parse_hex_color)
                .unwrap_or(defaults.color),
            icon: self
                .icon
                .as_deref()
                .map(|name| symbol_code(name).to_string())
                .unwrap_or(defaults.icon),
            image_path: self
                .img
                .map(|p| normalize_image_path(&p))
                .unwrap_or(defaults.image_path),
        }
    }
}

impl<P: Platform> ConfigStore<P> {
    /// Serialize the entire device state to one JSON document.
    ///
    /// The active profile is taken from memory, the inactive one from
    /// storage (upgrading a legacy-layout file in passing). Unreadable
    /// assets are skipped rather than failing the export.
    pub fn export_backup(&mut self) -> Result<String, Error> {
        let mut settings = self.settings.clone();
        settings.normalize();

        let mut assets = BTreeMap::new();
        for name in self.platform.list() {
            if is_system_file(&name) {
                continue;
            }
            if let Ok(bytes) = self.platform.read(&name) {
                let exported = name.strip_prefix('/').unwrap_or(&name).to_string();
                assets.insert(exported, BASE64.encode(bytes));
            }
        }

        let doc = BackupDoc {
            bg: Some(format!("{:06x}", settings.background_color)),
            rows: Some(settings.grid_rows),
            cols: Some(settings.grid_cols),
            os: Some(settings.target_os as u8),
            lang: Some(settings.keyboard_language as u8),
            wifi_ssid: Some(settings.wifi_ssid.clone()),
            win_btns: Some(self.profile_for_export(TargetOs::Windows)),
            mac_btns: Some(self.profile_for_export(TargetOs::MacOs)),
            assets: Some(assets),
        };

        serde_json::to_string(&doc).map_err(|_| Error::BackupParse)
    }

    /// Merge a backup document into the device state.
    ///
    /// Parsing and asset decoding happen up front: a malformed document,
    /// an undecodable asset payload or an asset named like a protected
    /// system file rejects the import with no mutation. Present fields are
    /// applied and persisted; absent fields keep their current values.
    pub fn import_backup(&mut self, json: &str) -> Result<(), Error> {
        let doc: BackupDoc = serde_json::from_str(json).map_err(|_| Error::BackupParse)?;

        let mut assets: Vec<(String, Vec<u8>)> = Vec::new();
        if let Some(map) = &doc.assets {
            for (name, payload) in map {
                let path = asset_path(name);
                // the asset map must not smuggle a profile file past the
                // protected-file rule of the upload surface
                if is_system_file(&path) {
                    return Err(Error::ProtectedFile);
                }
                let bytes = BASE64.decode(payload).map_err(|_| Error::BackupParse)?;
                assets.push((path, bytes));
            }
        }

        let os_before = self.settings.target_os;

        if let Some(hex) = doc.bg.as_deref() {
            if let Some(color) = parse_hex_color(hex) {
                self.settings.background_color = color;
            }
        }
        if let Some(v) = doc.rows {
            self.settings.grid_rows = v;
        }
        if let Some(v) = doc.cols {
            self.settings.grid_cols = v;
        }
        if let Some(v) = doc.os {
            self.settings.target_os = TargetOs::from_repr(v).unwrap_or(os_before);
        }
        if let Some(v) = doc.lang {
            if let Some(lang) = KeyboardLanguage::from_repr(v) {
                self.settings.keyboard_language = lang;
            }
        }
        if let Some(ssid) = doc.wifi_ssid {
            self.settings.wifi_ssid = ssid;
        }
        self.save(false)?;

        let win_imported = self.import_profile(TargetOs::Windows, doc.win_btns)?;
        let mac_imported = self.import_profile(TargetOs::MacOs, doc.mac_btns)?;

        for (path, bytes) in &assets {
            self.platform.write(path, bytes)?;
        }

        // Refresh the in-memory profile only when the import could have
        // changed what "active" means or contains.
        let os_now = self.settings.target_os;
        let active_imported = match os_now {
            TargetOs::Windows => win_imported,
            TargetOs::MacOs => mac_imported,
        };
        if os_now != os_before || active_imported {
            self.profile = migrate::load_profile(&mut self.platform, os_now).unwrap_or_default();
        }
        Ok(())
    }

    fn profile_for_export(&mut self, os: TargetOs) -> Vec<BackupButton> {
        let profile = if os == self.settings.target_os {
            self.profile.clone()
        } else {
            migrate::load_profile(&mut self.platform, os).unwrap_or_default()
        };
        profile.buttons.iter().map(BackupButton::from_config).collect()
    }

    fn import_profile(
        &mut self,
        os: TargetOs,
        buttons: Option<Vec<BackupButton>>,
    ) -> Result<bool, Error> {
        let Some(buttons) = buttons else {
            return Ok(false);
        };
        let mut profile = ButtonProfile::default();
        for (slot, button) in profile.buttons.iter_mut().zip(buttons.into_iter().take(BUTTON_COUNT)) {
            *slot = button.into_config();
        }
        self.platform.write(os.profile_path(), &profile.encode())?;
        Ok(true)
    }
}

fn parse_hex_color(s: &str) -> Option<u32> {
    let s = s.strip_prefix('#').unwrap_or(s);
    u32::from_str_radix(s, 16).ok().map(|c| c & 0x00FF_FFFF)
}

fn normalize_image_path(p: &str) -> String {
    if p.is_empty() || p.starts_with('/') {
        p.to_string()
    } else {
        format!("/{p}")
    }
}
