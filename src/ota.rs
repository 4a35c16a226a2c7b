//! Streamed firmware update sessions.
//!
//! An update arrives as ordered chunks from the dashboard upload handler.
//! The updater owns the state machine around a raw [`UpdateTarget`]: one
//! session at a time, every accepted byte folded into a running CRC32, and
//! a read-back verification of the whole image before success is reported.
//! While a session is open the liveness supervisor stays suspended, since
//! erase and write bursts stall the main loop far past its usual deadline.
//! Every exit path, success or failure, resumes it exactly once.
//!
//! The updater never restarts the device. It reports
//! [`OtaStatus::Complete`] and leaves the restart to the caller, which
//! still has a response to flush back to the dashboard.

use crate::error::Error;
use crate::platform::{Crc, Supervisor, UpdateTarget};

/// Upper bound on busy polls while waiting for the target to settle after
/// the last chunk. Each poll yields once through the supervisor.
pub const SETTLE_POLL_LIMIT: usize = 400;

/// Block size for read-back verification. Keeps the verify buffer small
/// and every read offset aligned.
const VERIFY_CHUNK: usize = 256;

/// Observable session state.
#[derive(strum::Display, Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OtaPhase {
    #[default]
    Idle,
    Receiving,
    Finalizing,
    Succeeded,
    Failed,
}

/// Outcome of a successfully handled chunk.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OtaStatus {
    /// Chunk written, more expected.
    Accepted { bytes_written: usize },
    /// Final chunk written and the whole image verified. The caller should
    /// restart the device once its response is out.
    Complete { bytes_written: usize },
}

struct Session {
    expected_size: Option<usize>,
    bytes_written: usize,
    stream_crc: u32,
}

/// Drives one firmware image into an [`UpdateTarget`].
pub struct OtaUpdater<T: UpdateTarget + Crc, S: Supervisor> {
    target: T,
    supervisor: S,
    session: Option<Session>,
    phase: OtaPhase,
}

impl<T: UpdateTarget + Crc, S: Supervisor> OtaUpdater<T, S> {
    pub fn new(target: T, supervisor: S) -> Self {
        Self {
            target,
            supervisor,
            session: None,
            phase: OtaPhase::Idle,
        }
    }

    /// The phase left behind by the last operation. `Succeeded` and
    /// `Failed` are sticky until the next session begins.
    pub fn phase(&self) -> OtaPhase {
        self.phase
    }

    /// Open a session, optionally with an advisory image size (a
    /// Content-Length, typically).
    ///
    /// A second session while one is open is rejected with `UpdateBusy`;
    /// an advisory size beyond the partition capacity with
    /// `UpdateOversize`. Both checks run before the target is touched, so
    /// a rejected begin never disturbs a running session or erases
    /// anything. The supervisor is suspended for the whole session.
    pub fn begin(&mut self, expected_size: Option<usize>) -> Result<(), Error> {
        if self.session.is_some() || self.target.is_busy() {
            return Err(Error::UpdateBusy);
        }
        if let Some(size) = expected_size {
            if size > self.target.capacity() {
                return Err(Error::UpdateOversize(size));
            }
        }

        self.supervisor.suspend();
        if let Err(e) = self.target.begin() {
            self.supervisor.resume();
            self.phase = OtaPhase::Failed;
            return Err(e);
        }

        self.session = Some(Session {
            expected_size,
            bytes_written: 0,
            stream_crc: 0,
        });
        self.phase = OtaPhase::Receiving;
        Ok(())
    }

    /// Write one chunk of the image stream.
    ///
    /// `index` is the byte offset of the chunk within the stream. A chunk
    /// at offset 0 with no open session implicitly begins one, matching
    /// the shape of a raw upload whose first callback carries no separate
    /// begin event; any other offset without a session is
    /// `UpdateNotStarted`. The advisory size is advisory only; the stream
    /// may end earlier or later, and only `is_final` ends it.
    ///
    /// Any storage error fails the whole session: the partition content is
    /// undefined mid-write, so there is nothing to salvage. A new session
    /// may begin immediately afterwards.
    pub fn accept_chunk(
        &mut self,
        index: usize,
        data: &[u8],
        is_final: bool,
    ) -> Result<OtaStatus, Error> {
        if self.session.is_none() {
            if index != 0 {
                return Err(Error::UpdateNotStarted);
            }
            self.begin(None)?;
        }
        let Some(session) = self.session.as_mut() else {
            return Err(Error::UpdateNotStarted);
        };

        let accepted = match self.target.write(data) {
            Ok(n) => n,
            Err(e) => return self.fail(e),
        };
        if accepted != data.len() {
            return self.fail(Error::UpdateShortWrite);
        }
        session.bytes_written += data.len();
        session.stream_crc = T::crc32(session.stream_crc, data);

        if !is_final {
            return Ok(OtaStatus::Accepted {
                bytes_written: session.bytes_written,
            });
        }
        self.finalize()
    }

    /// Abandon the current session, if any. The supervisor is re-armed and
    /// the target is left with a partial image that the next session will
    /// erase.
    pub fn abort(&mut self) {
        if self.session.take().is_some() {
            self.supervisor.resume();
            self.phase = OtaPhase::Failed;
        }
    }

    pub fn into_parts(self) -> (T, S) {
        (self.target, self.supervisor)
    }

    fn finalize(&mut self) -> Result<OtaStatus, Error> {
        self.phase = OtaPhase::Finalizing;

        // Let queued writes drain, ceding the CPU between polls. The bound
        // keeps a stuck controller from wedging the loop forever.
        let mut polls = 0;
        while self.target.is_busy() {
            if polls >= SETTLE_POLL_LIMIT {
                return self.fail(Error::UpdateFinalize);
            }
            self.supervisor.yield_now();
            polls += 1;
        }

        if let Err(e) = self.target.finish() {
            return self.fail(e);
        }

        let Some(session) = self.session.as_ref() else {
            return Err(Error::UpdateNotStarted);
        };
        let bytes_written = session.bytes_written;
        let stream_crc = session.stream_crc;

        match self.verify(bytes_written, stream_crc) {
            Ok(()) => {}
            Err(e) => return self.fail(e),
        }

        self.session = None;
        self.supervisor.resume();
        self.phase = OtaPhase::Succeeded;
        Ok(OtaStatus::Complete { bytes_written })
    }

    /// Read the written image back and compare its CRC32 with the running
    /// CRC of the received stream.
    fn verify(&mut self, len: usize, expected: u32) -> Result<(), Error> {
        let mut buf = [0u8; VERIFY_CHUNK];
        let mut crc = 0u32;
        let mut at = 0usize;
        while at < len {
            let take = (len - at).min(VERIFY_CHUNK);
            self.target.read(at as u32, &mut buf[..take])?;
            crc = T::crc32(crc, &buf[..take]);
            at += take;
        }
        if crc != expected {
            return Err(Error::UpdateFinalize);
        }
        Ok(())
    }

    fn fail(&mut self, e: Error) -> Result<OtaStatus, Error> {
        if self.session.take().is_some() {
            self.supervisor.resume();
        }
        self.phase = OtaPhase::Failed;
        Err(e)
    }
}
