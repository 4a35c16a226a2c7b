//! One-time and size-triggered upgrades of stored profiles.
//!
//! Two independent mechanisms, deliberately kept apart:
//!
//! * [`consolidate_legacy_kv`] is **event-gated**: it runs once, ever,
//!   controlled by a persisted flag owned by the caller. It collects button
//!   records that very old firmware kept as many small key-value entries
//!   and writes them out as one profile file per OS.
//! * [`upgrade_profile_image`] is **content-gated**: it fires purely on the
//!   byte length of a profile file and has to be checked on every load,
//!   because a device can carry a stale file from any prior firmware.
//!
//! Neither stage touches its source before the destination write has
//! succeeded; a failed rewrite leaves the original bytes intact.

use alloc::format;
use alloc::vec::Vec;

use crate::error::Error;
use crate::platform::{FileStore, KvStore, Platform};
use crate::profile::{
    BUTTON_COUNT, ButtonProfile, LEGACY_PROFILE_SIZE, LEGACY_RECORD_SIZE, decode_legacy_record,
};
use crate::settings::TargetOs;

// Half-profile blobs written by the intermediate key-value scheme.
const WIN_BLOB_KEYS: (&str, &str) = ("w_pA", "w_pB");
const MAC_BLOB_KEYS: (&str, &str) = ("m_pA", "m_pB");

/// Consolidate legacy key-value button entries into profile files.
///
/// Runs for both OS profiles. Three historical key schemes are recognized,
/// newest first: half-profile blobs (`w_pA`/`w_pB`, `m_pA`/`m_pB`), OS
/// prefixed per-button keys (`wb{i}`, `mb{i}`) and unprefixed per-button
/// keys (`b{i}`, Windows only). Buttons with no legacy entry keep their
/// defaults.
///
/// The caller gates this with a one-shot persisted flag and must set the
/// flag only when this returns `Ok`. The legacy entries are removed once
/// both destination files are safely written.
pub fn consolidate_legacy_kv<P: Platform>(platform: &mut P) -> Result<(), Error> {
    for os in [TargetOs::Windows, TargetOs::MacOs] {
        let profile = collect_legacy_profile(platform, os);
        platform.write(os.profile_path(), &profile.encode())?;
    }

    // Destinations are durable; the sources may go. Failures here are
    // ignored, stale keys are merely dead weight.
    scrub_legacy_keys(platform);
    Ok(())
}

fn collect_legacy_profile<P: KvStore>(kv: &mut P, os: TargetOs) -> ButtonProfile {
    let mut profile = ButtonProfile::default();

    let (lo_key, hi_key) = match os {
        TargetOs::Windows => WIN_BLOB_KEYS,
        TargetOs::MacOs => MAC_BLOB_KEYS,
    };

    if let Some(lo) = read_half_blob(kv, lo_key) {
        apply_half(&mut profile, 0, &lo);
        if let Some(hi) = read_half_blob(kv, hi_key) {
            apply_half(&mut profile, BUTTON_COUNT / 2, &hi);
        }
        return profile;
    }

    for (i, cfg) in profile.buttons.iter_mut().enumerate() {
        let prefixed = match os {
            TargetOs::Windows => format!("wb{i}"),
            TargetOs::MacOs => format!("mb{i}"),
        };
        let record = kv.get_bytes(&prefixed).or_else(|| {
            // the oldest scheme predates macOS support
            (os == TargetOs::Windows).then(|| kv.get_bytes(&format!("b{i}"))).flatten()
        });
        if let Some(decoded) = record.and_then(|b| decode_legacy_record(&b).ok()) {
            *cfg = decoded;
        }
    }
    profile
}

fn read_half_blob<P: KvStore>(kv: &mut P, key: &str) -> Option<Vec<u8>> {
    kv.get_bytes(key)
        .filter(|b| b.len() == BUTTON_COUNT / 2 * LEGACY_RECORD_SIZE)
}

fn apply_half(profile: &mut ButtonProfile, start: usize, bytes: &[u8]) {
    for (cfg, chunk) in profile.buttons[start..]
        .iter_mut()
        .zip(bytes.chunks_exact(LEGACY_RECORD_SIZE))
    {
        if let Ok(decoded) = decode_legacy_record(chunk) {
            *cfg = decoded;
        }
    }
}

fn scrub_legacy_keys<P: KvStore>(kv: &mut P) {
    for key in [WIN_BLOB_KEYS.0, WIN_BLOB_KEYS.1, MAC_BLOB_KEYS.0, MAC_BLOB_KEYS.1] {
        let _ = kv.remove_key(key);
    }
    for i in 0..BUTTON_COUNT {
        let _ = kv.remove_key(&format!("b{i}"));
        let _ = kv.remove_key(&format!("wb{i}"));
        let _ = kv.remove_key(&format!("mb{i}"));
    }
}

/// Rewrite a profile image from the previous record layout into the
/// current one. Pure: dispatches on the exact byte length alone.
///
/// Returns `None` when there is nothing to migrate: the image already has
/// the current size, or a size no known layout ever produced (the caller
/// decides how to fail). Field values survive unchanged; the widened
/// command-value capacity is zero-filled.
pub fn upgrade_profile_image(bytes: &[u8]) -> Option<Vec<u8>> {
    if bytes.len() != LEGACY_PROFILE_SIZE {
        return None;
    }
    // length is exact, decode_legacy cannot fail
    ButtonProfile::decode_legacy(bytes).ok().map(|p| p.encode())
}

/// Read one OS's profile from storage, upgrading a legacy-layout file on
/// the way through.
///
/// The upgraded bytes are written back opportunistically: if the write
/// fails the old file stays exactly as it was, the decoded profile is
/// still returned, and the upgrade is retried on the next load.
pub fn load_profile<P: FileStore>(files: &mut P, os: TargetOs) -> Result<ButtonProfile, Error> {
    let path = os.profile_path();
    let bytes = files.read(path)?;

    if let Some(upgraded) = upgrade_profile_image(&bytes) {
        if files.write(path, &upgraded).is_err() {
            #[cfg(feature = "defmt")]
            defmt::warn!("profile {} kept in legacy layout, rewrite failed", path);
        }
        return ButtonProfile::decode(&upgraded);
    }

    ButtonProfile::decode(&bytes)
}
