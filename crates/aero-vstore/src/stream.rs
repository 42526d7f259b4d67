//! Adapters between [`Storage`] and `std::io` streams.

use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::util::checked_range;
use crate::{AccessMode, Result, Storage, StorageError, StorageLength, Window};

/// Exposes a [`Storage`] as a cursor-based `Read + Write + Seek` stream.
///
/// Reads stop at the end of a bounded storage (`Ok(0)` at or past the end). Writes are clamped to
/// the remaining length; a write starting at or past the end fails with
/// [`io::ErrorKind::UnexpectedEof`]. Seeking past the end is allowed.
///
/// An unbounded storage has no known end, so a read that runs past the end of its medium is
/// retried with halved requests: the stream yields a short read and then `Ok(0)`.
pub struct StorageStream<S: Storage> {
    // Only `None` once `into_inner` has taken the storage out.
    storage: Option<S>,
    position: u64,
    leave_open: bool,
}

impl<S: Storage> StorageStream<S> {
    pub fn new(storage: S, leave_open: bool) -> Self {
        Self {
            storage: Some(storage),
            position: 0,
            leave_open,
        }
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn get_ref(&self) -> &S {
        match &self.storage {
            Some(storage) => storage,
            None => unreachable!("stream storage is only taken by into_inner"),
        }
    }

    pub fn get_mut(&mut self) -> &mut S {
        match &mut self.storage {
            Some(storage) => storage,
            None => unreachable!("stream storage is only taken by into_inner"),
        }
    }

    /// Returns the storage without closing it, whatever the `leave_open` setting.
    pub fn into_inner(mut self) -> S {
        match self.storage.take() {
            Some(storage) => storage,
            None => unreachable!("stream storage is only taken by into_inner"),
        }
    }

    /// Bytes that can be transferred at the cursor, clamped to `want`.
    fn available(&mut self, want: usize) -> Result<Option<usize>> {
        match self.get_mut().length()? {
            StorageLength::Bounded(total) if self.position >= total => Ok(None),
            StorageLength::Bounded(total) => {
                let remaining = total - self.position;
                Ok(Some(usize::try_from(remaining).map_or(want, |r| r.min(want))))
            }
            StorageLength::Unbounded => Ok(Some(want)),
        }
    }
}

impl<S: Storage> Read for StorageStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let Some(mut n) = self.available(buf.len())? else {
            return Ok(0);
        };
        let position = self.position;
        loop {
            match self.get_mut().read_at(position, &mut buf[..n]) {
                Ok(()) => break,
                // An unbounded storage only reveals its end by failing a read past it.
                Err(StorageError::Io(err))
                    if err.kind() == io::ErrorKind::UnexpectedEof
                        && self.get_mut().length()?.is_unbounded() =>
                {
                    if n == 1 {
                        return Ok(0);
                    }
                    n /= 2;
                }
                Err(err) => return Err(err.into()),
            }
        }
        self.position += n as u64;
        Ok(n)
    }
}

impl<S: Storage> Write for StorageStream<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let position = self.position;
        let n = match self.available(buf.len())? {
            Some(n) => n,
            None => {
                let capacity = self.get_mut().length()?.bounded().unwrap_or(position);
                return Err(StorageError::OutOfRange {
                    offset: position,
                    len: buf.len(),
                    capacity,
                }
                .into());
            }
        };
        self.get_mut().write_at(position, &buf[..n])?;
        self.position += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.get_mut().flush()?;
        Ok(())
    }
}

impl<S: Storage> Seek for StorageStream<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let (base, delta) = match pos {
            SeekFrom::Start(offset) => {
                self.position = offset;
                return Ok(offset);
            }
            SeekFrom::Current(delta) => (self.position, delta),
            SeekFrom::End(delta) => match self.get_mut().length()? {
                StorageLength::Bounded(total) => (total, delta),
                StorageLength::Unbounded => {
                    return Err(io::Error::new(
                        io::ErrorKind::Unsupported,
                        "cannot seek from the end of an unbounded storage",
                    ));
                }
            },
        };
        let position = base.checked_add_signed(delta).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )
        })?;
        self.position = position;
        Ok(position)
    }
}

impl<S: Storage> Drop for StorageStream<S> {
    fn drop(&mut self) {
        if self.leave_open {
            return;
        }
        if let Some(storage) = self.storage.as_mut() {
            if let Err(err) = storage.close() {
                tracing::debug!("failed to close storage behind stream on drop: {err}");
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LengthSource {
    /// Ask the stream via `seek(SeekFrom::End(0))`.
    Query,
    Unbounded,
}

/// Exposes a seekable `std::io` stream as a [`Storage`].
///
/// There is no cursor at this layer: every access seeks the stream to the requested offset
/// first, so interleaved reads and writes at different offsets never observe each other's
/// position.
#[derive(Debug)]
pub struct StreamStorage<T> {
    stream: Option<T>,
    length_source: LengthSource,
    leave_open: bool,
}

impl<T: Read + Write + Seek> StreamStorage<T> {
    /// The storage length is whatever the stream reports for `seek(SeekFrom::End(0))`, or
    /// unbounded when the stream does not support that query.
    pub fn new(stream: T, leave_open: bool) -> Self {
        Self {
            stream: Some(stream),
            length_source: LengthSource::Query,
            leave_open,
        }
    }

    /// Reports an unbounded length so accesses past the stream's current end reach the stream
    /// (e.g. to grow a `Cursor<Vec<u8>>` or a file).
    pub fn unbounded(stream: T, leave_open: bool) -> Self {
        Self {
            stream: Some(stream),
            length_source: LengthSource::Unbounded,
            leave_open,
        }
    }

    /// Adapts `stream` and windows it from `start` to its end in one step.
    pub fn open_slice(stream: T, start: u64) -> Result<Window<Self>> {
        Window::new(Self::new(stream, true), start, None, true, AccessMode::READ_WRITE)
    }

    /// Adapts `stream` and windows `start..start + len` of it in one step.
    pub fn open_slice_range(stream: T, start: u64, len: u64) -> Result<Window<Self>> {
        Window::new(
            Self::new(stream, true),
            start,
            Some(len),
            true,
            AccessMode::READ_WRITE,
        )
    }

    pub fn leave_open(&self) -> bool {
        self.leave_open
    }

    /// Returns the stream unless an owning [`Storage::close`] already released it.
    pub fn into_inner(self) -> Result<T> {
        self.stream.ok_or(StorageError::Closed)
    }

    fn stream(&mut self) -> Result<&mut T> {
        self.stream.as_mut().ok_or(StorageError::Closed)
    }

    fn seek_to(&mut self, offset: u64, len: usize) -> Result<&mut T> {
        let length = self.length()?;
        checked_range(offset, len, length)?;
        let stream = self.stream()?;
        stream.seek(SeekFrom::Start(offset))?;
        Ok(stream)
    }
}

impl<T: Read + Write + Seek> Storage for StreamStorage<T> {
    fn length(&mut self) -> Result<StorageLength> {
        let source = self.length_source;
        let stream = self.stream()?;
        if source == LengthSource::Unbounded {
            return Ok(StorageLength::Unbounded);
        }
        match stream.seek(SeekFrom::End(0)) {
            Ok(len) => Ok(StorageLength::Bounded(len)),
            Err(err) if err.kind() == io::ErrorKind::Unsupported => Ok(StorageLength::Unbounded),
            Err(err) => Err(err.into()),
        }
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.seek_to(offset, buf.len())?.read_exact(buf)?;
        Ok(())
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        self.seek_to(offset, buf.len())?.write_all(buf)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.stream()?.flush()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(());
        };
        stream.flush()?;
        if !self.leave_open {
            tracing::debug!("releasing stream owned by storage adapter");
            self.stream = None;
        }
        Ok(())
    }
}
