//! Errors specific to reading and writing generation directories on disk,
//! kept distinct from [`crate::error::EngineError`] so I/O-layer detail
//! (which file, what checksum mismatch) survives until it's translated into
//! the coarser error the rest of the engine deals in.

use std::fmt;
use std::io;

#[derive(Debug)]
pub enum PersistenceError {
    Io(io::Error),
    Encode(postcard::Error),
    Decode(postcard::Error),
    /// The section's magic bytes didn't match what this crate writes.
    BadMagic { file: String },
    /// The section's format version is newer (or otherwise unrecognized)
    /// than this build knows how to read.
    UnsupportedVersion { file: String, version: u16 },
    /// The trailing CRC32 didn't match the section payload.
    ChecksumMismatch { file: String },
    /// No `CURRENT` pointer, or it names a generation directory that
    /// doesn't exist.
    NoGeneration,
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistenceError::Io(e) => write!(f, "persistence i/o error: {e}"),
            PersistenceError::Encode(e) => write!(f, "persistence encode error: {e}"),
            PersistenceError::Decode(e) => write!(f, "persistence decode error: {e}"),
            PersistenceError::BadMagic { file } => write!(f, "{file}: bad magic bytes"),
            PersistenceError::UnsupportedVersion { file, version } => {
                write!(f, "{file}: unsupported format version {version}")
            }
            PersistenceError::ChecksumMismatch { file } => write!(f, "{file}: checksum mismatch"),
            PersistenceError::NoGeneration => write!(f, "no persisted generation found"),
        }
    }
}

impl std::error::Error for PersistenceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PersistenceError::Io(e) => Some(e),
            PersistenceError::Encode(e) | PersistenceError::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for PersistenceError {
    fn from(e: io::Error) -> Self {
        PersistenceError::Io(e)
    }
}

impl From<PersistenceError> for crate::error::EngineError {
    fn from(e: PersistenceError) -> Self {
        crate::error::EngineError::index_io(e.to_string())
    }
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;
