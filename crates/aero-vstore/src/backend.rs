//! Minimal backing mediums for the [`Storage`] contract.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::util::checked_range;
use crate::{AccessMode, Operation, Result, Storage, StorageError, StorageLength};

/// Fixed-length in-memory storage.
#[derive(Debug, Default, Clone)]
pub struct MemStorage {
    data: Vec<u8>,
    closed: bool,
}

impl MemStorage {
    /// Allocates `len` zeroed bytes.
    pub fn new(len: u64) -> Result<Self> {
        let len_usize: usize = len
            .try_into()
            .map_err(|_| StorageError::AllocationFailed { len })?;
        let mut data = Vec::new();
        data.try_reserve_exact(len_usize)
            .map_err(|_| StorageError::AllocationFailed { len })?;
        data.resize(len_usize, 0);
        Ok(Self::from_vec(data))
    }

    pub fn from_vec(data: Vec<u8>) -> Self {
        Self {
            data,
            closed: false,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(StorageError::Closed);
        }
        Ok(())
    }
}

impl Storage for MemStorage {
    fn length(&mut self) -> Result<StorageLength> {
        self.ensure_open()?;
        Ok(StorageLength::Bounded(self.data.len() as u64))
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.ensure_open()?;
        checked_range(offset, buf.len(), StorageLength::Bounded(self.data.len() as u64))?;
        let start = offset as usize;
        buf.copy_from_slice(&self.data[start..start + buf.len()]);
        Ok(())
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        self.ensure_open()?;
        checked_range(offset, buf.len(), StorageLength::Bounded(self.data.len() as u64))?;
        let start = offset as usize;
        self.data[start..start + buf.len()].copy_from_slice(buf);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.data = Vec::new();
        Ok(())
    }
}

/// File-backed storage using positioned I/O.
///
/// Reads and writes never move the file's own cursor on Unix and Windows. The file length is
/// queried on every access, so growth through [`FileStorage::set_len`] (or another handle) is
/// visible immediately.
#[derive(Debug)]
pub struct FileStorage {
    file: Option<File>,
    read_only: bool,
}

impl FileStorage {
    pub fn from_file(file: File) -> Self {
        Self {
            file: Some(file),
            read_only: false,
        }
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self::from_file(file))
    }

    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self::from_file(file).with_read_only(true))
    }

    /// Creates (or truncates) a file at `path` and sizes it to `len` bytes.
    pub fn create(path: impl AsRef<Path>, len: u64) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(len)?;
        Ok(Self::from_file(file))
    }

    /// Rejects mutations at this layer regardless of the handle's OS permissions.
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn set_len(&mut self, len: u64) -> Result<()> {
        self.ensure_writable()?;
        self.file()?.set_len(len)?;
        Ok(())
    }

    pub fn into_file(mut self) -> Result<File> {
        self.file.take().ok_or(StorageError::Closed)
    }

    fn file(&self) -> Result<&File> {
        self.file.as_ref().ok_or(StorageError::Closed)
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.read_only {
            return Err(StorageError::AccessDenied {
                op: Operation::Write,
                mode: AccessMode::READ,
            });
        }
        Ok(())
    }
}

impl Storage for FileStorage {
    fn length(&mut self) -> Result<StorageLength> {
        Ok(StorageLength::Bounded(self.file()?.metadata()?.len()))
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let length = self.length()?;
        checked_range(offset, buf.len(), length)?;
        read_exact_at(self.file()?, offset, buf)?;
        Ok(())
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        self.ensure_writable()?;
        let length = self.length()?;
        checked_range(offset, buf.len(), length)?;
        write_all_at(self.file()?, offset, buf)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.read_only {
            return Ok(());
        }
        self.file()?.sync_data()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.file.is_some() {
            self.flush()?;
        }
        self.file = None;
        Ok(())
    }
}

#[cfg(unix)]
fn read_exact_at(file: &File, offset: u64, buf: &mut [u8]) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(unix)]
fn write_all_at(file: &File, offset: u64, buf: &[u8]) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(buf, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut offset: u64, mut buf: &mut [u8]) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
            Ok(n) => {
                buf = &mut std::mem::take(&mut buf)[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(windows)]
fn write_all_at(file: &File, mut offset: u64, mut buf: &[u8]) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_write(buf, offset) {
            Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
            Ok(n) => {
                buf = &buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(not(any(unix, windows)))]
fn read_exact_at(mut file: &File, offset: u64, buf: &mut [u8]) -> io::Result<()> {
    use std::io::{Read, Seek, SeekFrom};
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(buf)
}

#[cfg(not(any(unix, windows)))]
fn write_all_at(mut file: &File, offset: u64, buf: &[u8]) -> io::Result<()> {
    use std::io::{Seek, SeekFrom, Write};
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(buf)
}

/// Cloneable handle to a storage shared by several windows or adapters.
///
/// Every clone refers to the same medium: closing one closes it for all of them.
#[derive(Debug)]
pub struct SharedStorage<S> {
    inner: Arc<Mutex<S>>,
}

impl<S> Clone for SharedStorage<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: Storage> SharedStorage<S> {
    pub fn new(storage: S) -> Self {
        Self {
            inner: Arc::new(Mutex::new(storage)),
        }
    }

    pub fn lock(&self) -> Result<MutexGuard<'_, S>> {
        self.inner
            .lock()
            .map_err(|_| StorageError::Io(io::Error::other("shared storage lock poisoned")))
    }

    /// Returns the storage if this is the last handle, otherwise hands the handle back.
    pub fn try_unwrap(self) -> std::result::Result<S, Self> {
        match Arc::try_unwrap(self.inner) {
            Ok(mutex) => Ok(mutex.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner())),
            Err(inner) => Err(Self { inner }),
        }
    }

    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl<S: Storage> Storage for SharedStorage<S> {
    fn length(&mut self) -> Result<StorageLength> {
        self.lock()?.length()
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.lock()?.read_at(offset, buf)
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        self.lock()?.write_at(offset, buf)
    }

    fn flush(&mut self) -> Result<()> {
        self.lock()?.flush()
    }

    fn close(&mut self) -> Result<()> {
        self.lock()?.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_storage_roundtrip_and_bounds() {
        let mut mem = MemStorage::new(8).unwrap();
        assert_eq!(mem.length().unwrap(), StorageLength::Bounded(8));

        mem.write_at(2, &[1, 2, 3]).unwrap();
        let mut buf = [0u8; 8];
        mem.read_at(0, &mut buf).unwrap();
        assert_eq!(buf, [0, 0, 1, 2, 3, 0, 0, 0]);

        let err = mem.read_at(6, &mut [0u8; 3]).unwrap_err();
        assert!(matches!(
            err,
            StorageError::OutOfRange {
                offset: 6,
                len: 3,
                capacity: 8
            }
        ));

        let err = mem.write_at(u64::MAX, &[0u8; 2]).unwrap_err();
        assert!(matches!(err, StorageError::OffsetOverflow));
    }

    #[test]
    fn unallocatable_length_is_reported_as_requested() {
        let err = MemStorage::new(u64::MAX).unwrap_err();
        assert!(matches!(err, StorageError::AllocationFailed { len: u64::MAX }));
    }

    #[test]
    fn zero_length_access_at_end_is_allowed() {
        let mut mem = MemStorage::new(4).unwrap();
        mem.read_at(4, &mut []).unwrap();
        mem.write_at(4, &[]).unwrap();
        assert!(mem.read_at(5, &mut []).is_err());
    }

    #[test]
    fn closed_mem_storage_rejects_everything() {
        let mut mem = MemStorage::from_vec(vec![1, 2, 3]);
        mem.close().unwrap();
        assert!(mem.is_closed());
        assert!(matches!(mem.length().unwrap_err(), StorageError::Closed));
        assert!(matches!(
            mem.read_at(0, &mut [0u8; 1]).unwrap_err(),
            StorageError::Closed
        ));
        assert!(matches!(
            mem.write_at(0, &[0u8; 1]).unwrap_err(),
            StorageError::Closed
        ));
    }

    #[test]
    fn shared_storage_clones_see_the_same_bytes() {
        let mut a = SharedStorage::new(MemStorage::new(4).unwrap());
        let mut b = a.clone();
        assert_eq!(a.handle_count(), 2);

        a.write_at(0, b"abcd").unwrap();
        let mut buf = [0u8; 4];
        b.read_at(0, &mut buf).unwrap();
        assert_eq!(&buf, b"abcd");

        drop(a);
        let mem = b.try_unwrap().unwrap();
        assert_eq!(mem.as_slice(), b"abcd");
    }

    #[test]
    fn closing_one_shared_handle_closes_the_medium() {
        let mut a = SharedStorage::new(MemStorage::new(4).unwrap());
        let mut b = a.clone();
        a.close().unwrap();
        assert!(matches!(b.length().unwrap_err(), StorageError::Closed));
    }
}
