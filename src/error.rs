//! Error types for archive operations.

use thiserror::Error;

/// Convenience return type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the archive engine.
#[derive(Debug, Error)]
pub enum Error {
    /// No valid End of Central Directory record could be located.
    #[error("Not a valid ZIP file")]
    NotAnArchive,

    /// A mutation was attempted on an archive opened for reading.
    #[error("Writing is not allowed on an archive opened for reading")]
    WriteNotAllowed,

    /// The stream handed to a write-mode open cannot seek.
    #[error("Stream cannot seek")]
    StreamNotSeekable,

    /// The entry uses a compression method other than STORED or DEFLATE.
    #[error("Unsupported compression method: {0}")]
    UnsupportedMethod(u16),

    /// The bytes at the recorded local header offset are not a local header.
    #[error("Invalid Local File Header at offset {offset}")]
    LocalHeaderMismatch { offset: u32 },

    /// Entry removal needs an archive backed by a named file.
    #[error("Removing entries is only supported on file-backed archives")]
    RemovalNotSupported,

    /// A value does not fit the 16/32-bit fields of the format (ZIP64 is not supported).
    #[error("{0} exceeds the limits of the ZIP format")]
    SizeLimit(&'static str),

    /// The entry name would escape the extraction directory.
    #[error("Refusing to extract unsafe entry name: {0}")]
    UnsafeEntryName(String),

    /// The payload ended before the recorded uncompressed size was produced.
    #[error("Truncated payload for entry {name}")]
    TruncatedPayload { name: String },

    /// The extracted bytes do not match the recorded CRC-32.
    #[error("CRC-32 mismatch for entry {name}: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        name: String,
        expected: u32,
        actual: u32,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Fieldless discriminant of [`Error`], handy for matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotAnArchive,
    WriteNotAllowed,
    StreamNotSeekable,
    UnsupportedMethod,
    LocalHeaderMismatch,
    RemovalNotSupported,
    SizeLimit,
    UnsafeEntryName,
    TruncatedPayload,
    ChecksumMismatch,
    IoFailure,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotAnArchive => ErrorKind::NotAnArchive,
            Error::WriteNotAllowed => ErrorKind::WriteNotAllowed,
            Error::StreamNotSeekable => ErrorKind::StreamNotSeekable,
            Error::UnsupportedMethod(_) => ErrorKind::UnsupportedMethod,
            Error::LocalHeaderMismatch { .. } => ErrorKind::LocalHeaderMismatch,
            Error::RemovalNotSupported => ErrorKind::RemovalNotSupported,
            Error::SizeLimit(_) => ErrorKind::SizeLimit,
            Error::UnsafeEntryName(_) => ErrorKind::UnsafeEntryName,
            Error::TruncatedPayload { .. } => ErrorKind::TruncatedPayload,
            Error::ChecksumMismatch { .. } => ErrorKind::ChecksumMismatch,
            Error::Io(_) => ErrorKind::IoFailure,
        }
    }
}
