#![allow(dead_code)]

// filename according to https://doc.rust-lang.org/book/ch11-03-test-organization.html
use std::cell::Cell;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use embedded_storage::nor_flash::{
    ErrorType, NorFlash, NorFlashError, NorFlashErrorKind, ReadNorFlash,
};

use deck_core::error::Error;
use deck_core::platform::{FileStore, KvStore, Supervisor, UpdateTarget};
use deck_core::profile::{
    ICON_LEN, IMAGE_PATH_LEN, LABEL_LEN, LEGACY_RECORD_SIZE, LEGACY_VALUE_LEN,
};

pub const FLASH_SECTOR_SIZE: usize = 4096;
pub const WORD_SIZE: usize = 4;

/// CRC32 with zlib chaining semantics, like the ESP32 ROM routine the
/// device implementation forwards to.
pub fn crc32(init: u32, data: &[u8]) -> u32 {
    const ALG: crc::Crc<u32> = crc::Crc::<u32>::new(&crc::CRC_32_ISO_HDLC);
    // digest_with_initial reflects its argument into the register, so the
    // zlib register value (!init) has to be pre-reversed
    let mut digest = ALG.digest_with_initial((!init).reverse_bits());
    digest.update(data);
    digest.finalize()
}

#[derive(Debug, PartialEq, Clone)]
pub enum KvValue {
    U8(u8),
    U32(u32),
    Bool(bool),
    Str(String),
    Bytes(Vec<u8>),
}

/// In-memory stand-in for the NVS namespace plus the LittleFS volume.
/// `fail_after_operation` counts mutating operations (kv sets and removes,
/// file writes and removes) and fails every one from that point on.
pub struct MemPlatform {
    pub kv: BTreeMap<String, KvValue>,
    pub files: BTreeMap<String, Vec<u8>>,
    pub fail_after_operation: usize,
    pub operations: usize,
}

impl Default for MemPlatform {
    fn default() -> Self {
        Self {
            kv: BTreeMap::new(),
            files: BTreeMap::new(),
            fail_after_operation: usize::MAX,
            operations: 0,
        }
    }
}

impl MemPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_with_fault(fail_after_operation: usize) -> Self {
        Self {
            fail_after_operation,
            ..Self::default()
        }
    }

    pub fn disable_faults(&mut self) {
        self.fail_after_operation = usize::MAX;
    }

    fn mutating_op(&mut self) -> Result<(), Error> {
        let faulted = self.operations >= self.fail_after_operation;
        self.operations += 1;
        if faulted {
            println!("    platform: FAULT at op #{}", self.operations - 1);
            Err(Error::StorageWrite)
        } else {
            Ok(())
        }
    }
}

impl KvStore for MemPlatform {
    fn get_u8(&mut self, key: &str) -> Option<u8> {
        match self.kv.get(key) {
            Some(KvValue::U8(v)) => Some(*v),
            _ => None,
        }
    }

    fn set_u8(&mut self, key: &str, value: u8) -> Result<(), Error> {
        self.mutating_op()?;
        self.kv.insert(key.into(), KvValue::U8(value));
        Ok(())
    }

    fn get_u32(&mut self, key: &str) -> Option<u32> {
        match self.kv.get(key) {
            Some(KvValue::U32(v)) => Some(*v),
            _ => None,
        }
    }

    fn set_u32(&mut self, key: &str, value: u32) -> Result<(), Error> {
        self.mutating_op()?;
        self.kv.insert(key.into(), KvValue::U32(value));
        Ok(())
    }

    fn get_bool(&mut self, key: &str) -> Option<bool> {
        match self.kv.get(key) {
            Some(KvValue::Bool(v)) => Some(*v),
            _ => None,
        }
    }

    fn set_bool(&mut self, key: &str, value: bool) -> Result<(), Error> {
        self.mutating_op()?;
        self.kv.insert(key.into(), KvValue::Bool(value));
        Ok(())
    }

    fn get_str(&mut self, key: &str) -> Option<String> {
        match self.kv.get(key) {
            Some(KvValue::Str(v)) => Some(v.clone()),
            _ => None,
        }
    }

    fn set_str(&mut self, key: &str, value: &str) -> Result<(), Error> {
        self.mutating_op()?;
        self.kv.insert(key.into(), KvValue::Str(value.into()));
        Ok(())
    }

    fn get_bytes(&mut self, key: &str) -> Option<Vec<u8>> {
        match self.kv.get(key) {
            Some(KvValue::Bytes(v)) => Some(v.clone()),
            _ => None,
        }
    }

    fn remove_key(&mut self, key: &str) -> Result<(), Error> {
        self.mutating_op()?;
        self.kv.remove(key);
        Ok(())
    }
}

impl FileStore for MemPlatform {
    fn read(&mut self, path: &str) -> Result<Vec<u8>, Error> {
        self.files.get(path).cloned().ok_or(Error::StorageRead)
    }

    fn write(&mut self, path: &str, data: &[u8]) -> Result<(), Error> {
        self.mutating_op()?;
        self.files.insert(path.into(), data.to_vec());
        Ok(())
    }

    fn remove(&mut self, path: &str) -> Result<(), Error> {
        self.mutating_op()?;
        self.files.remove(path);
        Ok(())
    }

    fn exists(&mut self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    fn list(&mut self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }
}

/// Build one legacy-layout (192-byte) button record.
pub fn legacy_record(label: &str, value: &str, ty: u8, color: u32, icon: &str, img: &str) -> Vec<u8> {
    fn put(dst: &mut [u8], s: &str) {
        let take = s.len().min(dst.len() - 1);
        dst[..take].copy_from_slice(&s.as_bytes()[..take]);
    }
    let mut out = vec![0u8; LEGACY_RECORD_SIZE];
    let mut at = 0;
    put(&mut out[at..at + LABEL_LEN], label);
    at += LABEL_LEN;
    put(&mut out[at..at + LEGACY_VALUE_LEN], value);
    at += LEGACY_VALUE_LEN;
    out[at] = ty;
    at += 4;
    out[at..at + 4].copy_from_slice(&color.to_le_bytes());
    at += 4;
    put(&mut out[at..at + ICON_LEN], icon);
    at += ICON_LEN;
    put(&mut out[at..at + IMAGE_PATH_LEN], img);
    out
}

#[derive(Debug, Default)]
pub struct SupervisorLog {
    pub suspends: usize,
    pub resumes: usize,
    pub yields: usize,
}

/// Supervisor that only counts. Clone the handle before moving it into an
/// updater to keep observing the counters.
#[derive(Clone, Default)]
pub struct CountingSupervisor {
    pub log: Rc<RefCell<SupervisorLog>>,
}

impl Supervisor for CountingSupervisor {
    fn suspend(&mut self) {
        self.log.borrow_mut().suspends += 1;
    }

    fn resume(&mut self) {
        self.log.borrow_mut().resumes += 1;
    }

    fn yield_now(&mut self) {
        self.log.borrow_mut().yields += 1;
    }
}

/// In-memory update partition with scriptable misbehavior.
pub struct MemTarget {
    pub buf: Vec<u8>,
    pub written: usize,
    pub begun: bool,
    pub finished: bool,
    /// Zero-based write index that accepts one byte less than offered.
    pub short_write_at: Option<usize>,
    pub write_count: usize,
    /// How many times `is_busy` still answers true. Shared so a test can
    /// arm it after the target moved into an updater.
    pub busy_polls: Rc<Cell<usize>>,
    /// Flip a written byte in `finish`, so read-back verification fails.
    pub corrupt_on_finish: bool,
    pub fail_begin: bool,
}

impl MemTarget {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0xff; capacity],
            written: 0,
            begun: false,
            finished: false,
            short_write_at: None,
            write_count: 0,
            busy_polls: Rc::new(Cell::new(0)),
            corrupt_on_finish: false,
            fail_begin: false,
        }
    }

    pub fn image(&self) -> &[u8] {
        &self.buf[..self.written]
    }
}

impl UpdateTarget for MemTarget {
    fn capacity(&self) -> usize {
        self.buf.len()
    }

    fn begin(&mut self) -> Result<(), Error> {
        if self.fail_begin {
            return Err(Error::UpdateBegin);
        }
        self.buf.fill(0xff);
        self.written = 0;
        self.begun = true;
        self.finished = false;
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, Error> {
        let idx = self.write_count;
        self.write_count += 1;

        let mut take = data.len();
        if self.short_write_at == Some(idx) && take > 0 {
            take -= 1;
        }
        if self.written + take > self.buf.len() {
            return Err(Error::UpdateOversize(self.written + take));
        }
        self.buf[self.written..self.written + take].copy_from_slice(&data[..take]);
        self.written += take;
        Ok(take)
    }

    fn finish(&mut self) -> Result<(), Error> {
        if self.corrupt_on_finish && self.written > 0 {
            self.buf[self.written / 2] ^= 0x01;
        }
        self.finished = true;
        Ok(())
    }

    fn read(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), Error> {
        let offset = offset as usize;
        if offset + buf.len() > self.buf.len() {
            return Err(Error::StorageRead);
        }
        buf.copy_from_slice(&self.buf[offset..offset + buf.len()]);
        Ok(())
    }

    fn is_busy(&self) -> bool {
        let left = self.busy_polls.get();
        if left == 0 {
            return false;
        }
        self.busy_polls.set(left - 1);
        true
    }
}

impl deck_core::platform::Crc for MemTarget {
    fn crc32(init: u32, data: &[u8]) -> u32 {
        crc32(init, data)
    }
}

/// NOR flash mock for exercising `FlashRegion`.
#[derive(Default)]
pub struct Flash {
    pub buf: Vec<u8>,
    pub fail_after_operation: usize,
    pub operations: usize,
}

impl Flash {
    pub fn new(sectors: usize) -> Self {
        Self {
            buf: vec![0xffu8; FLASH_SECTOR_SIZE * sectors],
            fail_after_operation: usize::MAX,
            operations: 0,
        }
    }

    fn op(&mut self) -> Result<(), FlashError> {
        let faulted = self.operations >= self.fail_after_operation;
        self.operations += 1;
        if faulted { Err(FlashError) } else { Ok(()) }
    }
}

#[derive(Debug)]
pub struct FlashError;

impl NorFlashError for FlashError {
    fn kind(&self) -> NorFlashErrorKind {
        NorFlashErrorKind::Other
    }
}

impl ErrorType for Flash {
    type Error = FlashError;
}

impl ReadNorFlash for Flash {
    const READ_SIZE: usize = WORD_SIZE;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        assert!(offset.is_multiple_of(Self::READ_SIZE as _));
        self.op()?;
        let offset = offset as usize;
        bytes.copy_from_slice(&self.buf[offset..offset + bytes.len()]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.buf.len()
    }
}

impl NorFlash for Flash {
    const WRITE_SIZE: usize = WORD_SIZE;
    const ERASE_SIZE: usize = FLASH_SECTOR_SIZE;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        assert!(from.is_multiple_of(Self::ERASE_SIZE as _));
        assert!(to.is_multiple_of(Self::ERASE_SIZE as _));
        self.op()?;
        for addr in from..to {
            self.buf[addr as usize] = 0xff;
        }
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        assert!(offset.is_multiple_of(Self::WRITE_SIZE as _));
        assert!(bytes.len().is_multiple_of(Self::WRITE_SIZE as _));
        self.op()?;
        let offset = offset as usize;
        for (i, &val) in bytes.iter().enumerate() {
            // NOR flash can only flip bits from 1 to 0
            self.buf[offset + i] &= val;
        }
        Ok(())
    }
}

impl deck_core::platform::Crc for Flash {
    fn crc32(init: u32, data: &[u8]) -> u32 {
        crc32(init, data)
    }
}
