//! Storage virtualization for Aero's image and container parsers.
//!
//! Parsers address byte regions without caring whether those bytes live in a file, in memory or
//! behind a seekable stream. This crate provides:
//!
//! - [`Storage`]: positioned read/write contract with a bounded or unbounded [`StorageLength`]
//! - [`Window`]: sub-range view of a parent storage, doubling as an access-restricted view
//!   ([`AccessMode`])
//! - [`StorageStream`] / [`StreamStorage`]: adapters to and from `std::io` streams
//! - [`CopyEngine`]: chunked storage-to-storage and storage-to-stream copies with progress
//!   reporting and a pooled buffer
//! - [`MemStorage`], [`FileStorage`], [`SharedStorage`]: minimal backing mediums
//!
//! ```rust
//! use aero_vstore::{AccessMode, MemStorage, Storage, StorageExt};
//!
//! let mut disk = MemStorage::from_vec((0u8..64).collect());
//! let mut partition = (&mut disk).slice_range(16, 32).unwrap();
//! let mut header = [0u8; 4];
//! partition.read_at(0, &mut header).unwrap();
//! assert_eq!(header, [16, 17, 18, 19]);
//!
//! let mut ro = partition.with_access(AccessMode::READ).unwrap();
//! assert!(ro.write_at(0, &[0]).is_err());
//! ```

mod backend;
mod copy;
mod error;
mod pool;
mod storage;
mod stream;
mod util;
mod window;

pub use backend::{FileStorage, MemStorage, SharedStorage};
pub use copy::{
    copy, copy_to_stream, write_all_bytes, CopyEngine, CopyOptions, ProgressReport,
    COPY_CHUNK_SIZE, STREAM_COPY_CHUNK_SIZE,
};
pub use error::{Operation, Result, StorageError};
pub use pool::{BufferPool, BufferPoolStats, PooledBuffer};
pub use storage::{Storage, StorageExt, StorageLength};
pub use stream::{StorageStream, StreamStorage};
pub use window::{AccessMode, Window};

pub use tokio_util::sync::CancellationToken;


#[cfg(all(test, not(target_arch = "wasm32")))]
mod proptests;
