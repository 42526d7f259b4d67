use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock, PoisonError};

use crate::{Result, StorageError};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BufferPoolStats {
    pub rented: u64,
    pub returned: u64,
    pub allocated: u64,
}

/// Pool of reusable byte buffers for chunked transfers.
///
/// Buffers are handed out as [`PooledBuffer`] guards that go back to the pool when dropped, so a
/// buffer is returned exactly once on every exit path. At most `max_retained` idle buffers are
/// kept; extra returns are freed.
#[derive(Debug)]
pub struct BufferPool {
    idle: Mutex<Vec<Vec<u8>>>,
    max_retained: usize,
    rented: AtomicU64,
    returned: AtomicU64,
    allocated: AtomicU64,
}

impl BufferPool {
    pub const DEFAULT_MAX_RETAINED: usize = 16;

    pub fn new(max_retained: usize) -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
            max_retained,
            rented: AtomicU64::new(0),
            returned: AtomicU64::new(0),
            allocated: AtomicU64::new(0),
        }
    }

    /// Process-wide pool used by [`crate::CopyEngine::default`].
    pub fn shared() -> &'static BufferPool {
        static SHARED: OnceLock<BufferPool> = OnceLock::new();
        SHARED.get_or_init(|| BufferPool::new(Self::DEFAULT_MAX_RETAINED))
    }

    /// Rents a zeroed buffer of exactly `len` bytes.
    pub fn rent(&self, len: usize) -> Result<PooledBuffer<'_>> {
        let reused = {
            let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
            idle.iter()
                .position(|buf| buf.capacity() >= len)
                .map(|idx| idle.swap_remove(idx))
        };

        let mut buf = match reused {
            Some(buf) => buf,
            None => {
                let mut buf = Vec::new();
                buf.try_reserve_exact(len)
                    .map_err(|_| StorageError::AllocationFailed { len: len as u64 })?;
                self.allocated.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(len, "allocated pooled buffer");
                buf
            }
        };
        buf.clear();
        buf.resize(len, 0);

        self.rented.fetch_add(1, Ordering::Relaxed);
        Ok(PooledBuffer { pool: self, buf })
    }

    pub fn stats(&self) -> BufferPoolStats {
        BufferPoolStats {
            rented: self.rented.load(Ordering::Relaxed),
            returned: self.returned.load(Ordering::Relaxed),
            allocated: self.allocated.load(Ordering::Relaxed),
        }
    }

    /// Number of idle buffers currently held.
    pub fn idle_buffers(&self) -> usize {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn give_back(&self, buf: Vec<u8>) {
        self.returned.fetch_add(1, Ordering::Relaxed);
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        if idle.len() < self.max_retained {
            idle.push(buf);
        }
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_RETAINED)
    }
}

/// Buffer rented from a [`BufferPool`]; returned to the pool on drop.
pub struct PooledBuffer<'a> {
    pool: &'a BufferPool,
    buf: Vec<u8>,
}

impl Deref for PooledBuffer<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf
    }
}

impl DerefMut for PooledBuffer<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}

impl Drop for PooledBuffer<'_> {
    fn drop(&mut self) {
        self.pool.give_back(std::mem::take(&mut self.buf));
    }
}
