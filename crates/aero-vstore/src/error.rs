use std::io;

use thiserror::Error;

use crate::AccessMode;

pub type Result<T> = std::result::Result<T, StorageError>;

/// Direction of a storage operation, used when reporting access violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Write,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Read => f.write_str("read"),
            Operation::Write => f.write_str("write"),
        }
    }
}

/// Unified error type for storage, window, stream adapter and copy operations.
///
/// [`StorageError::Io`] carries the medium's own `std::io::Error` untouched so callers can still
/// inspect the original [`io::ErrorKind`].
#[derive(Debug, Error)]
pub enum StorageError {
    /// A window was requested that does not fit inside its parent.
    #[error("invalid range: start={start} len={len:?} parent_len={parent_len}")]
    InvalidRange {
        start: u64,
        len: Option<u64>,
        parent_len: u64,
    },

    #[error("out of range: offset={offset} len={len} capacity={capacity}")]
    OutOfRange {
        offset: u64,
        len: usize,
        capacity: u64,
    },

    #[error("integer overflow while computing byte offsets")]
    OffsetOverflow,

    #[error("{op} access denied (access mode {mode:?})")]
    AccessDenied { op: Operation, mode: AccessMode },

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    #[error("operation cancelled")]
    Cancelled,

    #[error("storage is closed")]
    Closed,

    #[error("failed to allocate a {len} byte buffer")]
    AllocationFailed { len: u64 },

    /// Failure reported by the underlying medium.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl From<StorageError> for io::Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Io(err) => err,
            err @ (StorageError::InvalidRange { .. }
            | StorageError::OffsetOverflow
            | StorageError::InvalidArgument(_)
            | StorageError::InvalidConfig(_)) => io::Error::new(io::ErrorKind::InvalidInput, err),
            err @ StorageError::OutOfRange { .. } => {
                io::Error::new(io::ErrorKind::UnexpectedEof, err)
            }
            err @ StorageError::AccessDenied { .. } => {
                io::Error::new(io::ErrorKind::PermissionDenied, err)
            }
            err @ StorageError::Cancelled => io::Error::new(io::ErrorKind::Interrupted, err),
            err @ StorageError::Closed => io::Error::new(io::ErrorKind::NotConnected, err),
            err @ StorageError::AllocationFailed { .. } => {
                io::Error::new(io::ErrorKind::OutOfMemory, err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_pass_through_unchanged() {
        let err: io::Error =
            StorageError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "gone")).into();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert_eq!(err.to_string(), "gone");
    }

    #[test]
    fn bounds_and_access_errors_are_classified() {
        let err: io::Error = StorageError::OutOfRange {
            offset: 4,
            len: 1,
            capacity: 4,
        }
        .into();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert!(matches!(
            err.get_ref().and_then(|e| e.downcast_ref::<StorageError>()),
            Some(StorageError::OutOfRange {
                offset: 4,
                len: 1,
                capacity: 4
            })
        ));

        let err: io::Error = StorageError::AccessDenied {
            op: Operation::Write,
            mode: AccessMode::READ,
        }
        .into();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);

        let err: io::Error = StorageError::OffsetOverflow.into();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);

        let err: io::Error = StorageError::Closed.into();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);

        let err: io::Error = StorageError::Cancelled.into();
        assert_eq!(err.kind(), io::ErrorKind::Interrupted);
    }

    #[test]
    fn access_denied_message_names_the_operation() {
        let err = StorageError::AccessDenied {
            op: Operation::Read,
            mode: AccessMode::WRITE,
        };
        assert_eq!(err.to_string(), "read access denied (access mode AccessMode(WRITE))");
    }
}
