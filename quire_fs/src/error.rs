//! Failure taxonomy shared by the loader and the saver.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::encoding::ConversionError;

/// Category of a load/save failure, independent of the concrete OS error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    PermissionDenied,
    /// The destination exists but is not writable.
    ReadOnly,
    NotRegularFile,
    IsDirectory,
    InvalidByteSequence,
    UnsupportedEncoding,
    /// Generic read/write/rename/copy failure.
    IoFailure,
    /// Exclusive creation lost a race with another process.
    AlreadyExists,
    /// The file changed on disk since it was loaded or last saved.
    ExternallyModified,
    /// The operation was cancelled at a phase boundary.
    Cancelled,
}

impl ErrorKind {
    /// Map an OS error onto the taxonomy.
    pub fn from_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => ErrorKind::NotFound,
            io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            io::ErrorKind::AlreadyExists => ErrorKind::AlreadyExists,
            io::ErrorKind::IsADirectory => ErrorKind::IsDirectory,
            io::ErrorKind::ReadOnlyFilesystem => ErrorKind::ReadOnly,
            io::ErrorKind::InvalidData => ErrorKind::InvalidByteSequence,
            _ => Self::from_raw_os_error(err),
        }
    }

    #[cfg(unix)]
    fn from_raw_os_error(err: &io::Error) -> Self {
        match err.raw_os_error() {
            Some(libc::EISDIR) => ErrorKind::IsDirectory,
            Some(libc::EROFS) => ErrorKind::ReadOnly,
            Some(libc::EACCES) | Some(libc::EPERM) => ErrorKind::PermissionDenied,
            Some(libc::ENOENT) => ErrorKind::NotFound,
            Some(libc::EEXIST) => ErrorKind::AlreadyExists,
            _ => ErrorKind::IoFailure,
        }
    }

    #[cfg(not(unix))]
    fn from_raw_os_error(_err: &io::Error) -> Self {
        ErrorKind::IoFailure
    }

    fn describe(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "file not found",
            ErrorKind::PermissionDenied => "permission denied",
            ErrorKind::ReadOnly => "file is read-only",
            ErrorKind::NotRegularFile => "not a regular file",
            ErrorKind::IsDirectory => "is a directory",
            ErrorKind::InvalidByteSequence => "invalid byte sequence",
            ErrorKind::UnsupportedEncoding => "unsupported encoding",
            ErrorKind::IoFailure => "I/O failure",
            ErrorKind::AlreadyExists => "file already exists",
            ErrorKind::ExternallyModified => "file was modified externally",
            ErrorKind::Cancelled => "operation cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// A failed load or save, as reported in the terminal event.
///
/// Cloneable so it can be carried by events and kept as `last_error` at the
/// same time; the OS error is shared behind an `Arc`.
#[derive(Debug, Clone, Error)]
#[error("{}: {kind}{}", .path.display(), detail_suffix(.detail))]
pub struct FsError {
    kind: ErrorKind,
    path: PathBuf,
    detail: Option<String>,
    #[source]
    source: Option<Arc<io::Error>>,
}

impl FsError {
    pub fn new(kind: ErrorKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
            detail: None,
            source: None,
        }
    }

    pub fn from_io(err: io::Error, path: impl Into<PathBuf>) -> Self {
        Self {
            kind: ErrorKind::from_io(&err),
            path: path.into(),
            detail: None,
            source: Some(Arc::new(err)),
        }
    }

    pub fn from_conversion(err: ConversionError, path: impl Into<PathBuf>) -> Self {
        let kind = match err {
            ConversionError::IllegalSequence { .. } | ConversionError::Unrepresentable { .. } => {
                ErrorKind::InvalidByteSequence
            }
            ConversionError::Unsupported { .. } => ErrorKind::UnsupportedEncoding,
        };
        Self {
            kind,
            path: path.into(),
            detail: Some(err.to_string()),
            source: None,
        }
    }

    /// Override the kind while keeping the OS error as source.
    pub fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn io_error(&self) -> Option<&io::Error> {
        self.source.as_deref()
    }
}

fn detail_suffix(detail: &Option<String>) -> String {
    detail.as_deref().map(|d| format!(" ({d})")).unwrap_or_default()
}

/// Misuse of a single-use loader/saver or of a busy document.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UsageError {
    #[error("loader already used (phase {0})")]
    LoaderNotIdle(&'static str),
    #[error("saver already used (phase {0})")]
    SaverNotIdle(&'static str),
    #[error("a load is already in progress")]
    LoadInProgress,
    #[error("a save is already in progress")]
    SaveInProgress,
    #[error("document has no path")]
    Untitled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_kind_mapping() {
        let err = io::Error::from(io::ErrorKind::NotFound);
        assert_eq!(ErrorKind::from_io(&err), ErrorKind::NotFound);

        let err = io::Error::from(io::ErrorKind::PermissionDenied);
        assert_eq!(ErrorKind::from_io(&err), ErrorKind::PermissionDenied);

        let err = io::Error::from(io::ErrorKind::AlreadyExists);
        assert_eq!(ErrorKind::from_io(&err), ErrorKind::AlreadyExists);

        let err = io::Error::other("boom");
        assert_eq!(ErrorKind::from_io(&err), ErrorKind::IoFailure);
    }

    #[cfg(unix)]
    #[test]
    fn test_raw_errno_mapping() {
        let err = io::Error::from_raw_os_error(libc::EISDIR);
        assert_eq!(ErrorKind::from_io(&err), ErrorKind::IsDirectory);

        let err = io::Error::from_raw_os_error(libc::EROFS);
        assert_eq!(ErrorKind::from_io(&err), ErrorKind::ReadOnly);
    }

    #[test]
    fn test_error_display_and_source() {
        let err = FsError::from_io(io::Error::from(io::ErrorKind::NotFound), "/tmp/missing.txt");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.to_string().starts_with("/tmp/missing.txt: file not found"));
        assert!(std::error::Error::source(&err).is_some());

        let cloned = err.clone();
        assert_eq!(cloned.kind(), ErrorKind::NotFound);
        assert!(cloned.io_error().is_some());
    }
}
