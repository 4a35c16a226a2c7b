#![doc = include_str!("../README.md")]
#![cfg_attr(not(target_arch = "x86_64"), no_std)]

extern crate alloc;

pub mod backup;
pub mod error;
pub mod migrate;
pub mod ota;
pub mod platform;
pub mod profile;
pub mod settings;
pub mod store;

pub use error::Error;
pub use ota::{OtaPhase, OtaStatus, OtaUpdater};
pub use platform::{Crc, FileStore, FlashRegion, KvStore, Platform, Supervisor, UpdateTarget};
pub use profile::{ActionType, ButtonConfig, ButtonProfile};
pub use settings::{DeviceSettings, KeyboardLanguage, TargetOs};
pub use store::ConfigStore;
