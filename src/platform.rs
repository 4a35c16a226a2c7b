//! Seams between the storage/update core and the device.
//!
//! The firmware binary implements these traits on top of the real NVS
//! partition, the LittleFS asset volume, the OTA partition and the task
//! watchdog. Host tests implement them in memory. See README.md for an
//! example implementation.

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use embedded_storage::nor_flash::NorFlash;

use crate::error::Error;

/// Key-value settings store, NVS style.
///
/// Keys are limited to 15 bytes (the NVS key limit); the store is expected
/// to persist each entry durably on `set_*`. Reads return `None` for absent
/// keys or unreadable media so that callers can fall back to defaults.
pub trait KvStore {
    fn get_u8(&mut self, key: &str) -> Option<u8>;
    fn set_u8(&mut self, key: &str, value: u8) -> Result<(), Error>;

    fn get_u32(&mut self, key: &str) -> Option<u32>;
    fn set_u32(&mut self, key: &str, value: u32) -> Result<(), Error>;

    fn get_bool(&mut self, key: &str) -> Option<bool>;
    fn set_bool(&mut self, key: &str, value: bool) -> Result<(), Error>;

    fn get_str(&mut self, key: &str) -> Option<String>;
    fn set_str(&mut self, key: &str, value: &str) -> Result<(), Error>;

    /// Raw blob read, used only by the legacy-profile consolidation.
    fn get_bytes(&mut self, key: &str) -> Option<Vec<u8>>;

    /// Ignores missing keys. Named apart from [`FileStore::remove`] so the
    /// two seams stay callable through a combined `Platform` bound.
    fn remove_key(&mut self, key: &str) -> Result<(), Error>;
}

/// Flat file store for profile records and uploaded image assets,
/// LittleFS style. Paths are `/`-rooted names without subdirectories.
pub trait FileStore {
    /// `Error::StorageRead` if the file does not exist or cannot be read.
    fn read(&mut self, path: &str) -> Result<Vec<u8>, Error>;

    /// Creates or truncates; `Error::StorageWrite` if the medium refuses.
    fn write(&mut self, path: &str, data: &[u8]) -> Result<(), Error>;

    fn remove(&mut self, path: &str) -> Result<(), Error>;

    fn exists(&mut self, path: &str) -> bool;

    /// All stored file names, `/`-rooted, in no particular order.
    fn list(&mut self) -> Vec<String>;
}

/// Everything the configuration store needs from the device.
pub trait Platform: KvStore + FileStore {}

impl<T: KvStore + FileStore> Platform for T {}

/// CRC32 as provided by the platform (the ESP32 ROM routine on the chip,
/// a software implementation in tests).
pub trait Crc {
    fn crc32(init: u32, data: &[u8]) -> u32;
}

impl<T: Crc> Crc for &mut T {
    fn crc32(init: u32, data: &[u8]) -> u32 {
        T::crc32(init, data)
    }
}

/// Cooperative liveness supervision around the main loop.
///
/// `suspend` stops deadline enforcement before a known-long blocking
/// operation, `resume` re-arms it. `yield_now` cedes control to the loop in
/// short bursts and is only called from the bounded OTA settle loop.
pub trait Supervisor {
    fn suspend(&mut self);
    fn resume(&mut self);
    fn yield_now(&mut self);
}

/// Destination for a streamed firmware image.
///
/// `write` appends at an internal cursor and reports how many bytes the
/// medium actually accepted; anything short of the full slice is fatal to
/// the update attempt. `finish` flushes buffered bytes, `read` is used for
/// post-write verification.
pub trait UpdateTarget {
    fn capacity(&self) -> usize;

    /// Prepare the partition for a fresh image (typically an erase).
    fn begin(&mut self) -> Result<(), Error>;

    fn write(&mut self, data: &[u8]) -> Result<usize, Error>;

    /// Flush any buffered tail once the stream is complete.
    fn finish(&mut self) -> Result<(), Error>;

    fn read(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), Error>;

    /// Whether previously accepted writes are still settling in the
    /// controller. Targets with synchronous writes keep the default.
    fn is_busy(&self) -> bool {
        false
    }
}

/// [`UpdateTarget`] over a region of NOR flash.
///
/// Chunks arrive with arbitrary lengths while the flash accepts writes only
/// in `WRITE_SIZE` units, so the region buffers the unaligned tail of each
/// chunk and carries it into the next write. `finish` pads the remainder
/// with `0xFF`, the erased state of the flash.
pub struct FlashRegion<T: NorFlash> {
    flash: T,
    offset: u32,
    size: u32,
    flushed: u32,
    pending: Vec<u8>,
}

impl<T: NorFlash> FlashRegion<T> {
    /// The region has to be aligned to the erase unit of the flash, like a
    /// partition table entry would be.
    pub fn new(flash: T, offset: u32, size: u32) -> Result<Self, Error> {
        if !(offset as usize).is_multiple_of(T::ERASE_SIZE) {
            return Err(Error::UpdateBegin);
        }
        if size == 0 || !(size as usize).is_multiple_of(T::ERASE_SIZE) {
            return Err(Error::UpdateBegin);
        }
        Ok(Self {
            flash,
            offset,
            size,
            flushed: 0,
            pending: Vec::new(),
        })
    }

    pub fn into_flash(self) -> T {
        self.flash
    }

    fn flush_aligned(&mut self) -> Result<(), Error> {
        let aligned = self.pending.len() / T::WRITE_SIZE * T::WRITE_SIZE;
        if aligned == 0 {
            return Ok(());
        }
        self.flash
            .write(self.offset + self.flushed, &self.pending[..aligned])
            .map_err(|_| Error::StorageWrite)?;
        self.flushed += aligned as u32;
        self.pending.drain(..aligned);
        Ok(())
    }
}

impl<T: NorFlash> UpdateTarget for FlashRegion<T> {
    fn capacity(&self) -> usize {
        self.size as usize
    }

    fn begin(&mut self) -> Result<(), Error> {
        self.flushed = 0;
        self.pending.clear();
        self.flash
            .erase(self.offset, self.offset + self.size)
            .map_err(|_| Error::UpdateBegin)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, Error> {
        let total = self.flushed as usize + self.pending.len() + data.len();
        if total > self.size as usize {
            return Err(Error::UpdateOversize(total));
        }
        self.pending.extend_from_slice(data);
        self.flush_aligned()?;
        Ok(data.len())
    }

    fn finish(&mut self) -> Result<(), Error> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let mut tail = vec![0xFFu8; T::WRITE_SIZE];
        tail[..self.pending.len()].copy_from_slice(&self.pending);
        self.flash
            .write(self.offset + self.flushed, &tail)
            .map_err(|_| Error::StorageWrite)?;
        self.flushed += self.pending.len() as u32;
        self.pending.clear();
        Ok(())
    }

    fn read(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), Error> {
        self.flash
            .read(self.offset + offset, buf)
            .map_err(|_| Error::StorageRead)
    }
}

impl<T: NorFlash + Crc> Crc for FlashRegion<T> {
    fn crc32(init: u32, data: &[u8]) -> u32 {
        T::crc32(init, data)
    }
}
