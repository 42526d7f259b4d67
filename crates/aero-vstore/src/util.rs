use crate::{Result, StorageError, StorageLength};

/// Returns `offset + len`, reporting overflow as [`StorageError::OffsetOverflow`].
pub fn checked_end(offset: u64, len: usize) -> Result<u64> {
    offset
        .checked_add(len as u64)
        .ok_or(StorageError::OffsetOverflow)
}

/// Validates that `offset..offset + len` lies within a storage of the given length.
///
/// Unbounded storages accept any range that does not overflow `u64`.
pub fn checked_range(offset: u64, len: usize, length: StorageLength) -> Result<()> {
    let end = checked_end(offset, len)?;
    match length {
        StorageLength::Bounded(capacity) if end > capacity => Err(StorageError::OutOfRange {
            offset,
            len,
            capacity,
        }),
        _ => Ok(()),
    }
}
