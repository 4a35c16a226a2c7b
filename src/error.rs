use thiserror::Error;

/// Errors that can occur while loading, saving, migrating, importing or
/// updating device state. Marked as non-exhaustive to allow for future
/// additions without breaking the API.
///
/// None of these is fatal to the device: reads fall back to defaults at the
/// call site, failed writes leave the in-memory state authoritative, and a
/// failed update attempt leaves the running firmware untouched.
#[derive(Error, Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// A stored record is absent or could not be read.
    #[error("storage read failed")]
    StorageRead,

    /// A stored record exists but its length matches no known layout.
    #[error("record size mismatch: {0} bytes")]
    RecordSizeMismatch(usize),

    /// The underlying medium refused a write. In-memory state is kept.
    #[error("storage write failed")]
    StorageWrite,

    /// Rewriting an old-layout record failed. The original bytes are left
    /// untouched and the device keeps operating in the old layout.
    #[error("profile migration failed")]
    Migration,

    /// The backup document is malformed or a field has the wrong type.
    /// Rejected before any state is mutated.
    #[error("malformed backup document")]
    BackupParse,

    /// Attempt to delete or overwrite a protected system file.
    #[error("file is protected")]
    ProtectedFile,

    /// An update session is already in flight. Concurrent sessions are
    /// rejected, never queued.
    #[error("update already in progress")]
    UpdateBusy,

    /// No update session exists for the received chunk.
    #[error("no update in progress")]
    UpdateNotStarted,

    /// The announced or received image size exceeds the update partition.
    #[error("image size {0} exceeds update partition capacity")]
    UpdateOversize(usize),

    /// Preparing the update partition failed.
    #[error("update begin failed")]
    UpdateBegin,

    /// The update partition accepted fewer bytes than supplied.
    #[error("short write to update partition")]
    UpdateShortWrite,

    /// The written image failed verification or could not be activated.
    #[error("update finalize failed")]
    UpdateFinalize,
}

impl Error {
    /// HTTP-style status code for the request-handling boundary.
    ///
    /// The dashboard handlers answer 200 on success; this maps every error
    /// of the taxonomy onto the matching failure code.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::BackupParse | Error::RecordSizeMismatch(_) | Error::UpdateNotStarted => 400,
            Error::ProtectedFile => 403,
            _ => 500,
        }
    }
}
