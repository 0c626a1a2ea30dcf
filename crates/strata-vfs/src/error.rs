//! VFS error types.

use std::io;
use thiserror::Error;

/// VFS error type.
#[derive(Debug, Error)]
pub enum VfsError {
    /// No store and no case-insensitive variant resolves the path.
    #[error("not found: {0}")]
    NotFound(String),

    /// Path already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Store-reported access failure (including read-only stores).
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Expected a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Expected a file.
    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// Path escapes the logical root or is malformed.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// The same store instance is already on the mount stack.
    #[error("already mounted: {0}")]
    AlreadyMounted(String),

    /// The store is not on the mount stack.
    #[error("not mounted: {0}")]
    NotMounted(String),

    /// Write or append requested with no write directory configured.
    #[error("no write directory set")]
    NoWriteDir,

    /// Bad seek origin or similar caller mistake.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Malformed glob pattern.
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    /// Seek target is negative or does not fit a stream offset.
    #[error("offset out of range: {0}")]
    OutOfRange(i128),

    /// Operation on a handle that was already closed.
    #[error("file handle is closed")]
    Closed,

    /// No more bytes remain. A normal terminal read signal.
    #[error("end of stream")]
    EndOfStream,

    /// A walk was cancelled through its token.
    #[error("walk cancelled")]
    Cancelled,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl VfsError {
    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create an AlreadyExists error.
    pub fn already_exists(path: impl Into<String>) -> Self {
        Self::AlreadyExists(path.into())
    }

    /// Create a PermissionDenied error.
    pub fn permission_denied(path: impl Into<String>) -> Self {
        Self::PermissionDenied(path.into())
    }

    /// Create a NotADirectory error.
    pub fn not_a_directory(path: impl Into<String>) -> Self {
        Self::NotADirectory(path.into())
    }

    /// Create an IsADirectory error.
    pub fn is_a_directory(path: impl Into<String>) -> Self {
        Self::IsADirectory(path.into())
    }

    /// Create an InvalidPath error.
    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath(path.into())
    }

    /// Create an InvalidArgument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create an InvalidPattern error.
    pub fn invalid_pattern(msg: impl Into<String>) -> Self {
        Self::InvalidPattern(msg.into())
    }

    /// Create an Other error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Map an I/O error from a host call, keeping the path for the
    /// kinds callers branch on.
    pub fn from_io(err: io::Error, path: impl Into<String>) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.into()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.into()),
            io::ErrorKind::AlreadyExists => Self::AlreadyExists(path.into()),
            io::ErrorKind::NotADirectory => Self::NotADirectory(path.into()),
            io::ErrorKind::IsADirectory => Self::IsADirectory(path.into()),
            _ => Self::Io(err),
        }
    }

    /// True when the error only means "this store does not have it".
    ///
    /// The mount stack moves on to the next store for these instead of
    /// recording a failure.
    pub fn is_miss(&self) -> bool {
        match self {
            Self::NotFound(_) | Self::NotADirectory(_) => true,
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
            ),
            _ => false,
        }
    }

    /// True for the invalid-argument family (bad seek origin, bad glob).
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_) | Self::InvalidPattern(_))
    }

    /// True for the terminal read signal.
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Self::EndOfStream)
    }
}

/// Convert VfsError to std::io::Error for compatibility.
impl From<VfsError> for io::Error {
    fn from(e: VfsError) -> Self {
        match e {
            VfsError::NotFound(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            VfsError::AlreadyExists(msg) => io::Error::new(io::ErrorKind::AlreadyExists, msg),
            VfsError::PermissionDenied(msg) => {
                io::Error::new(io::ErrorKind::PermissionDenied, msg)
            }
            VfsError::NotADirectory(msg) => io::Error::new(io::ErrorKind::NotADirectory, msg),
            VfsError::IsADirectory(msg) => io::Error::new(io::ErrorKind::IsADirectory, msg),
            VfsError::InvalidPath(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            VfsError::AlreadyMounted(msg) => io::Error::new(io::ErrorKind::AlreadyExists, msg),
            VfsError::NotMounted(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            VfsError::NoWriteDir => {
                io::Error::new(io::ErrorKind::PermissionDenied, "no write directory set")
            }
            VfsError::InvalidArgument(msg) | VfsError::InvalidPattern(msg) => {
                io::Error::new(io::ErrorKind::InvalidInput, msg)
            }
            VfsError::OutOfRange(offset) => io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("offset out of range: {offset}"),
            ),
            VfsError::Closed => io::Error::other("file handle is closed"),
            VfsError::EndOfStream => io::Error::new(io::ErrorKind::UnexpectedEof, "end of stream"),
            VfsError::Cancelled => io::Error::new(io::ErrorKind::Interrupted, "walk cancelled"),
            VfsError::Io(e) => e,
            VfsError::Other(msg) => io::Error::other(msg),
        }
    }
}

/// VFS result type.
pub type VfsResult<T> = Result<T, VfsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_io_keeps_kind() {
        let err = VfsError::from_io(io::Error::from(io::ErrorKind::NotFound), "a/b");
        assert!(matches!(err, VfsError::NotFound(ref p) if p == "a/b"));
        assert!(err.is_miss());

        let err = VfsError::from_io(io::Error::from(io::ErrorKind::PermissionDenied), "x");
        assert!(matches!(err, VfsError::PermissionDenied(_)));
        assert!(!err.is_miss());
    }

    #[test]
    fn test_into_io_error() {
        let io_err: io::Error = VfsError::not_found("gone.txt").into();
        assert_eq!(io_err.kind(), io::ErrorKind::NotFound);

        let io_err: io::Error = VfsError::EndOfStream.into();
        assert_eq!(io_err.kind(), io::ErrorKind::UnexpectedEof);

        let io_err: io::Error = VfsError::invalid_pattern("[a").into();
        assert_eq!(io_err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_invalid_argument_family() {
        assert!(VfsError::invalid_argument("whence 7").is_invalid_argument());
        assert!(VfsError::invalid_pattern("[z-a]").is_invalid_argument());
        assert!(!VfsError::Closed.is_invalid_argument());
    }
}
