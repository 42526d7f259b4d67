use std::io::Write;

use crate::copy::{self, ProgressReport};
use crate::{AccessMode, Result, StorageStream, Window};

/// Total size of a storage.
///
/// Growable or streaming mediums that cannot report a fixed size are [`StorageLength::Unbounded`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageLength {
    Bounded(u64),
    Unbounded,
}

impl StorageLength {
    pub fn bounded(self) -> Option<u64> {
        match self {
            StorageLength::Bounded(len) => Some(len),
            StorageLength::Unbounded => None,
        }
    }

    pub fn is_unbounded(self) -> bool {
        matches!(self, StorageLength::Unbounded)
    }

    /// Smaller of two lengths; an unbounded length never constrains the other side.
    pub fn min(self, other: StorageLength) -> StorageLength {
        match (self, other) {
            (StorageLength::Bounded(a), StorageLength::Bounded(b)) => {
                StorageLength::Bounded(a.min(b))
            }
            (StorageLength::Bounded(a), StorageLength::Unbounded)
            | (StorageLength::Unbounded, StorageLength::Bounded(a)) => StorageLength::Bounded(a),
            (StorageLength::Unbounded, StorageLength::Unbounded) => StorageLength::Unbounded,
        }
    }

    /// Length remaining after skipping `start` bytes, or `None` if `start` lies past the end.
    pub fn checked_sub(self, start: u64) -> Option<StorageLength> {
        match self {
            StorageLength::Bounded(len) => len.checked_sub(start).map(StorageLength::Bounded),
            StorageLength::Unbounded => Some(StorageLength::Unbounded),
        }
    }
}

impl From<u64> for StorageLength {
    fn from(len: u64) -> Self {
        StorageLength::Bounded(len)
    }
}

/// Random-access byte storage.
///
/// All offsets are absolute within the storage's own coordinate space; there is no cursor.
/// Callers pass exact-size buffers: a read fills all of `buf` or fails.
///
/// Implementations must reject accesses whose end lies past a bounded [`Storage::length`] with
/// [`crate::StorageError::OutOfRange`].
pub trait Storage {
    fn length(&mut self) -> Result<StorageLength>;

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()>;

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// Releases the underlying medium. Later operations fail with
    /// [`crate::StorageError::Closed`] on mediums that track it.
    fn close(&mut self) -> Result<()> {
        self.flush()
    }
}

impl<S: Storage + ?Sized> Storage for &mut S {
    fn length(&mut self) -> Result<StorageLength> {
        (**self).length()
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        (**self).read_at(offset, buf)
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        (**self).write_at(offset, buf)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

impl<S: Storage + ?Sized> Storage for Box<S> {
    fn length(&mut self) -> Result<StorageLength> {
        (**self).length()
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        (**self).read_at(offset, buf)
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        (**self).write_at(offset, buf)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// Composition helpers available on every sized [`Storage`].
///
/// [`Window`] provides inherent methods with the same names that compose against the window's
/// parent instead of stacking another layer.
pub trait StorageExt: Storage + Sized {
    /// Window from `start` to the end of the storage. The storage is left open when the window
    /// is dropped.
    fn slice(self, start: u64) -> Result<Window<Self>> {
        Window::new(self, start, None, true, AccessMode::READ_WRITE)
    }

    fn slice_range(self, start: u64, len: u64) -> Result<Window<Self>> {
        Window::new(self, start, Some(len), true, AccessMode::READ_WRITE)
    }

    fn slice_with(self, start: u64, len: Option<u64>, leave_open: bool) -> Result<Window<Self>> {
        Window::new(self, start, len, leave_open, AccessMode::READ_WRITE)
    }

    /// Full-range view that only permits the operations allowed by `mode`.
    fn with_access(self, mode: AccessMode) -> Result<Window<Self>> {
        Window::new(self, 0, None, true, mode)
    }

    fn with_access_leave_open(self, mode: AccessMode, leave_open: bool) -> Result<Window<Self>> {
        Window::new(self, 0, None, leave_open, mode)
    }

    /// Sequential `Read + Write + Seek` view starting at offset 0.
    fn into_stream(self) -> StorageStream<Self> {
        StorageStream::new(self, true)
    }

    fn copy_to<O: Storage + ?Sized>(
        &mut self,
        output: &mut O,
        progress: Option<&mut dyn ProgressReport>,
    ) -> Result<u64> {
        copy::copy(self, output, progress)
    }

    fn copy_to_stream<W: Write + ?Sized>(
        &mut self,
        output: &mut W,
        length: Option<u64>,
        progress: Option<&mut dyn ProgressReport>,
    ) -> Result<u64> {
        copy::copy_to_stream(self, output, length, progress)
    }
}

impl<S: Storage + Sized> StorageExt for S {}
