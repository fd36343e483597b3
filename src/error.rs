//! Error types for ziprw
//!
//! This module defines all error types that can occur while opening,
//! editing, committing or extracting an archive.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification of a [`ZipError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ZipErrorCode {
    NotFound,
    Exists,
    FormatError,
    InvalidName,
    MissingPassword,
    WrongPassword,
    IntegrityError,
    Truncated,
    Cancelled,
    IntegerOverflow,
    Unsupported,
    ReadOnly,
    IoError,
    InternalInconsistency,
}

impl ZipErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ZipErrorCode::NotFound => "not found",
            ZipErrorCode::Exists => "already exists",
            ZipErrorCode::FormatError => "format error",
            ZipErrorCode::InvalidName => "invalid name",
            ZipErrorCode::MissingPassword => "missing password",
            ZipErrorCode::WrongPassword => "wrong password",
            ZipErrorCode::IntegrityError => "integrity error",
            ZipErrorCode::Truncated => "truncated",
            ZipErrorCode::Cancelled => "cancelled",
            ZipErrorCode::IntegerOverflow => "integer overflow",
            ZipErrorCode::Unsupported => "unsupported",
            ZipErrorCode::ReadOnly => "read-only",
            ZipErrorCode::IoError => "i/o error",
            ZipErrorCode::InternalInconsistency => "internal inconsistency",
        }
    }
}

/// Main error type for ziprw
#[derive(Error, Debug)]
pub enum ZipError {
    /// Archive path does not exist and `create` was not requested
    #[error("archive '{path}' does not exist")]
    NotFound { path: PathBuf },

    /// Archive path exists and `exclusive` was requested
    #[error("archive '{path}' already exists")]
    AlreadyExists { path: PathBuf },

    /// Bad signature or corrupt structure
    #[error("not a valid ZIP archive: {reason}")]
    FormatError { reason: String },

    /// Entry name rejected
    #[error("invalid entry name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },

    /// No live entry carries the given name
    #[error("entry '{name}' not found in archive")]
    EntryNotFound { name: String },

    /// Index is out of range or refers to a deleted slot
    #[error("no entry at index {index}")]
    NoSuchEntry { index: u64 },

    /// Another live entry already carries the name
    #[error("entry '{name}' already exists in archive")]
    EntryExists { name: String },

    /// Encrypted entry but neither an explicit nor a default password
    #[error("entry '{name}' is encrypted and no password was supplied")]
    MissingPassword { name: String },

    /// Password verification or authentication failed
    #[error("wrong password for entry '{name}'")]
    WrongPassword { name: String },

    /// CRC32 mismatch
    #[error("CRC32 mismatch for entry '{name}': expected 0x{expected:08x}, got 0x{actual:08x}")]
    IntegrityError {
        name: String,
        expected: u32,
        actual: u32,
    },

    /// Fewer bytes than announced
    #[error("entry '{name}' is truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        name: String,
        expected: u64,
        actual: u64,
    },

    /// A progress callback asked to stop
    #[error("operation cancelled")]
    Cancelled,

    /// Size, offset or count exceeds what the format can represent
    #[error("{what} exceeds the representable range")]
    IntegerOverflow { what: &'static str },

    /// Method or feature not compiled in
    #[error("unsupported: {feature}")]
    Unsupported { feature: String },

    /// Mutation attempted on an archive opened read-only
    #[error("archive is opened read-only")]
    ReadOnly,

    /// File open failed
    #[error("cannot open file '{path}': {source}")]
    FileOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// File write failed
    #[error("cannot write file '{path}': {source}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Overwrite conflict
    #[error("not overwriting '{path}'")]
    OverwriteConflict { path: PathBuf },

    /// Directory creation failed
    #[error("cannot create directory '{path}': {source}")]
    CreateDirFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Permission setting failed
    #[error("cannot set permissions for '{path}': {source}")]
    SetPermFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Modification time setting failed
    #[error("failed to set mtime on '{path}': {source}")]
    SetMtimeFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// IO error with context
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Invariant violation, e.g. use after close
    #[error("internal inconsistency: {0}")]
    InternalInconsistency(String),
}

impl ZipError {
    pub fn code(&self) -> ZipErrorCode {
        match self {
            ZipError::NotFound { .. }
            | ZipError::EntryNotFound { .. }
            | ZipError::NoSuchEntry { .. } => ZipErrorCode::NotFound,
            ZipError::AlreadyExists { .. }
            | ZipError::EntryExists { .. }
            | ZipError::OverwriteConflict { .. } => ZipErrorCode::Exists,
            ZipError::FormatError { .. } => ZipErrorCode::FormatError,
            ZipError::InvalidName { .. } => ZipErrorCode::InvalidName,
            ZipError::MissingPassword { .. } => ZipErrorCode::MissingPassword,
            ZipError::WrongPassword { .. } => ZipErrorCode::WrongPassword,
            ZipError::IntegrityError { .. } => ZipErrorCode::IntegrityError,
            ZipError::Truncated { .. } => ZipErrorCode::Truncated,
            ZipError::Cancelled => ZipErrorCode::Cancelled,
            ZipError::IntegerOverflow { .. } => ZipErrorCode::IntegerOverflow,
            ZipError::Unsupported { .. } => ZipErrorCode::Unsupported,
            ZipError::ReadOnly => ZipErrorCode::ReadOnly,
            ZipError::FileOpen { .. }
            | ZipError::FileWrite { .. }
            | ZipError::CreateDirFailed { .. }
            | ZipError::SetPermFailed { .. }
            | ZipError::SetMtimeFailed { .. }
            | ZipError::Io(_) => ZipErrorCode::IoError,
            ZipError::InternalInconsistency(_) => ZipErrorCode::InternalInconsistency,
        }
    }

    /// Create a file open error
    pub fn file_open(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ZipError::FileOpen {
            path: path.into(),
            source,
        }
    }

    /// Create a file write error
    pub fn file_write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ZipError::FileWrite {
            path: path.into(),
            source,
        }
    }

    /// Create a format error
    pub fn format(reason: impl Into<String>) -> Self {
        ZipError::FormatError {
            reason: reason.into(),
        }
    }

    pub fn unsupported(feature: impl Into<String>) -> Self {
        ZipError::Unsupported {
            feature: feature.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        ZipError::InternalInconsistency(msg.into())
    }
}

/// Result type for ziprw operations
pub type Result<T> = std::result::Result<T, ZipError>;

/// Convert a `u64` to a narrower integer, reporting `IntegerOverflow`.
pub(crate) fn narrow<T: TryFrom<u64>>(value: u64, what: &'static str) -> Result<T> {
    T::try_from(value).map_err(|_| ZipError::IntegerOverflow { what })
}
