use bitflags::bitflags;

use crate::util::checked_range;
use crate::{Operation, Result, Storage, StorageError, StorageLength};

bitflags! {
    /// Operations a [`Window`] lets through to its parent.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct AccessMode: u8 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const READ_WRITE = Self::READ.bits() | Self::WRITE.bits();
    }
}

impl AccessMode {
    pub fn allows_read(self) -> bool {
        self.contains(AccessMode::READ)
    }

    pub fn allows_write(self) -> bool {
        self.contains(AccessMode::WRITE)
    }
}

impl Default for AccessMode {
    fn default() -> Self {
        AccessMode::READ_WRITE
    }
}

/// A storage view mapping `0..len` onto `start..start + len` of a parent storage.
///
/// Windows also act as access-restricted views: an operation not permitted by
/// [`Window::access`] fails with [`StorageError::AccessDenied`] before the parent is touched.
///
/// When `leave_open` is `false` the window owns the parent's medium and closes it when the
/// window is closed or dropped. Windows are leave-open by default so several windows can share
/// one parent (see [`crate::SharedStorage`]).
pub struct Window<S: Storage> {
    // Only `None` once `into_inner` has taken the parent out.
    parent: Option<S>,
    start: u64,
    len: StorageLength,
    access: AccessMode,
    leave_open: bool,
    closed: bool,
}

impl<S: Storage> Window<S> {
    /// Creates a window over `parent` starting at `start`.
    ///
    /// With `len == None` the window extends to the end of a bounded parent, or stays unbounded
    /// over an unbounded one. Ranges that do not fit inside a bounded parent are rejected with
    /// [`StorageError::InvalidRange`].
    pub fn new(
        mut parent: S,
        start: u64,
        len: Option<u64>,
        leave_open: bool,
        access: AccessMode,
    ) -> Result<Self> {
        let parent_len = parent.length()?;
        let len = resolve_len(parent_len, start, len)?;
        tracing::trace!(start, len = ?len, ?access, leave_open, "created storage window");
        Ok(Self {
            parent: Some(parent),
            start,
            len,
            access,
            leave_open,
            closed: false,
        })
    }

    /// Offset of this window within the parent.
    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn len(&self) -> StorageLength {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == StorageLength::Bounded(0)
    }

    pub fn access(&self) -> AccessMode {
        self.access
    }

    pub fn leave_open(&self) -> bool {
        self.leave_open
    }

    pub fn get_ref(&self) -> &S {
        match &self.parent {
            Some(parent) => parent,
            None => unreachable!("window parent is only taken by into_inner"),
        }
    }

    /// Returns the parent without closing it, whatever the `leave_open` setting.
    pub fn into_inner(mut self) -> S {
        match self.parent.take() {
            Some(parent) => parent,
            None => unreachable!("window parent is only taken by into_inner"),
        }
    }

    /// Narrows this window to `start..` of its current range.
    ///
    /// The result addresses the same parent directly (offsets summed, lengths intersected)
    /// instead of wrapping this window, and keeps this window's ownership of the parent.
    pub fn slice(self, start: u64) -> Result<Self> {
        self.compose(start, None, AccessMode::READ_WRITE)
    }

    pub fn slice_range(self, start: u64, len: u64) -> Result<Self> {
        self.compose(start, Some(len), AccessMode::READ_WRITE)
    }

    /// Further restricts the operations this window permits.
    pub fn with_access(self, mode: AccessMode) -> Result<Self> {
        self.compose(0, None, mode)
    }

    /// Creates a leave-open sibling window over a shared parent handle.
    pub fn subwindow(&self, start: u64, len: Option<u64>) -> Result<Self>
    where
        S: Clone,
    {
        let len = resolve_len(self.len, start, len)?;
        let start = self
            .start
            .checked_add(start)
            .ok_or(StorageError::OffsetOverflow)?;
        Ok(Self {
            parent: Some(self.get_ref().clone()),
            start,
            len,
            access: self.access,
            leave_open: true,
            closed: self.closed,
        })
    }

    fn compose(mut self, start: u64, len: Option<u64>, access: AccessMode) -> Result<Self> {
        let len = resolve_len(self.len, start, len)?;
        self.start = self
            .start
            .checked_add(start)
            .ok_or(StorageError::OffsetOverflow)?;
        self.len = len;
        self.access &= access;
        Ok(self)
    }

    fn parent_mut(&mut self) -> Result<&mut S> {
        if self.closed {
            return Err(StorageError::Closed);
        }
        self.parent.as_mut().ok_or(StorageError::Closed)
    }

    fn check_access(&self, op: Operation) -> Result<()> {
        let allowed = match op {
            Operation::Read => self.access.allows_read(),
            Operation::Write => self.access.allows_write(),
        };
        if !allowed {
            return Err(StorageError::AccessDenied {
                op,
                mode: self.access,
            });
        }
        Ok(())
    }

    fn parent_offset(&self, offset: u64, len: usize) -> Result<u64> {
        checked_range(offset, len, self.len)?;
        self.start
            .checked_add(offset)
            .ok_or(StorageError::OffsetOverflow)
    }
}

impl<S: Storage> Storage for Window<S> {
    fn length(&mut self) -> Result<StorageLength> {
        self.parent_mut()?;
        Ok(self.len)
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.check_access(Operation::Read)?;
        let offset = self.parent_offset(offset, buf.len())?;
        self.parent_mut()?.read_at(offset, buf)
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        self.check_access(Operation::Write)?;
        let offset = self.parent_offset(offset, buf.len())?;
        self.parent_mut()?.write_at(offset, buf)
    }

    fn flush(&mut self) -> Result<()> {
        self.parent_mut()?.flush()
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        match (self.leave_open, self.parent.as_mut()) {
            (false, Some(parent)) => {
                tracing::debug!(start = self.start, "closing parent of owning window");
                parent.close()
            }
            _ => Ok(()),
        }
    }
}

impl<S: Storage> Drop for Window<S> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::debug!("failed to close window parent on drop: {err}");
        }
    }
}

impl<S: Storage + std::fmt::Debug> std::fmt::Debug for Window<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Window")
            .field("parent", &self.parent)
            .field("start", &self.start)
            .field("len", &self.len)
            .field("access", &self.access)
            .field("leave_open", &self.leave_open)
            .finish()
    }
}

/// Resolves the length of a window placed at `start` inside a range of `parent_len` bytes.
fn resolve_len(parent_len: StorageLength, start: u64, len: Option<u64>) -> Result<StorageLength> {
    match parent_len {
        StorageLength::Bounded(parent_len) => {
            let invalid = StorageError::InvalidRange {
                start,
                len,
                parent_len,
            };
            let available = parent_len.checked_sub(start).ok_or(invalid)?;
            match len {
                None => Ok(StorageLength::Bounded(available)),
                Some(len) if len <= available => Ok(StorageLength::Bounded(len)),
                Some(_) => Err(StorageError::InvalidRange {
                    start,
                    len,
                    parent_len,
                }),
            }
        }
        StorageLength::Unbounded => match len {
            None => Ok(StorageLength::Unbounded),
            Some(len) => {
                start.checked_add(len).ok_or(StorageError::OffsetOverflow)?;
                Ok(StorageLength::Bounded(len))
            }
        },
    }
}
