//! Chunked bulk copies between storages, or from a storage into a `std::io::Write` sink.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use tokio_util::sync::CancellationToken;

use crate::{BufferPool, Result, Storage, StorageError, StorageLength};

/// Chunk size for storage-to-storage copies.
pub const COPY_CHUNK_SIZE: usize = 81920;

/// Chunk size for storage-to-stream copies.
pub const STREAM_COPY_CHUNK_SIZE: usize = 32768;

/// Receives progress for a transfer.
///
/// A transfer calls `set_total` with its byte count before the first chunk, `report_add` after
/// every chunk, and `set_total(0)` once it has completed. A failed transfer skips the final
/// `set_total(0)`.
pub trait ProgressReport {
    fn set_total(&mut self, total: u64);
    fn report_add(&mut self, bytes: u64);
}

#[derive(Debug, Clone)]
pub struct CopyOptions {
    /// Buffer size used by [`CopyEngine::copy`].
    pub chunk_size: usize,
    /// Buffer size used by [`CopyEngine::copy_to_stream`].
    pub stream_chunk_size: usize,
    /// Checked before every chunk; a cancelled token aborts the copy with
    /// [`StorageError::Cancelled`], leaving the bytes copied so far in place.
    pub cancellation: Option<CancellationToken>,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            chunk_size: COPY_CHUNK_SIZE,
            stream_chunk_size: STREAM_COPY_CHUNK_SIZE,
            cancellation: None,
        }
    }
}

impl CopyOptions {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(StorageError::InvalidConfig("chunk_size must be > 0"));
        }
        if self.stream_chunk_size == 0 {
            return Err(StorageError::InvalidConfig("stream_chunk_size must be > 0"));
        }
        Ok(())
    }
}

/// Moves bytes in fixed-size chunks through a single pooled buffer, so peak memory is bounded by
/// the chunk size regardless of the transfer size.
#[derive(Debug)]
pub struct CopyEngine<'a> {
    pool: &'a BufferPool,
    options: CopyOptions,
}

impl CopyEngine<'static> {
    /// Engine drawing buffers from [`BufferPool::shared`].
    pub fn new(options: CopyOptions) -> Result<Self> {
        CopyEngine::with_pool(BufferPool::shared(), options)
    }
}

impl Default for CopyEngine<'static> {
    fn default() -> Self {
        Self {
            pool: BufferPool::shared(),
            options: CopyOptions::default(),
        }
    }
}

impl<'a> CopyEngine<'a> {
    pub fn with_pool(pool: &'a BufferPool, options: CopyOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self { pool, options })
    }

    pub fn options(&self) -> &CopyOptions {
        &self.options
    }

    /// Copies `min(input.len, output.len)` bytes from `input` to the same offsets of `output`.
    ///
    /// Both storages must have a bounded length; otherwise this fails with
    /// [`StorageError::InvalidArgument`] before any byte is moved. A failure part-way through
    /// leaves `output` written up to the last completed chunk.
    pub fn copy<I, O>(
        &self,
        input: &mut I,
        output: &mut O,
        mut progress: Option<&mut dyn ProgressReport>,
    ) -> Result<u64>
    where
        I: Storage + ?Sized,
        O: Storage + ?Sized,
    {
        let (Some(input_len), Some(output_len)) =
            (input.length()?.bounded(), output.length()?.bounded())
        else {
            return Err(StorageError::InvalidArgument(
                "storage must have an explicit length",
            ));
        };
        let total = input_len.min(output_len);
        tracing::debug!(total, input_len, output_len, "starting storage copy");

        if let Some(progress) = progress.as_deref_mut() {
            progress.set_total(total);
        }

        let mut buffer = self.pool.rent(chunk_len(self.options.chunk_size, total))?;
        let mut position = 0u64;
        while position < total {
            self.check_cancelled(position)?;

            let n = chunk_len(buffer.len(), total - position);
            let chunk = &mut buffer[..n];
            input.read_at(position, chunk)?;
            output.write_at(position, chunk)?;
            position += n as u64;

            if let Some(progress) = progress.as_deref_mut() {
                progress.report_add(n as u64);
            }
        }
        drop(buffer);

        if let Some(progress) = progress.as_deref_mut() {
            progress.set_total(0);
        }
        tracing::debug!(bytes = total, "storage copy complete");
        Ok(total)
    }

    /// Appends `length` bytes of `input` (from offset 0) to `output`.
    ///
    /// `length` defaults to the input's length. A `length` larger than a bounded input fails
    /// with [`StorageError::OutOfRange`] before any byte is moved; an unbounded input requires
    /// an explicit `length`.
    pub fn copy_to_stream<I, W>(
        &self,
        input: &mut I,
        output: &mut W,
        length: Option<u64>,
        mut progress: Option<&mut dyn ProgressReport>,
    ) -> Result<u64>
    where
        I: Storage + ?Sized,
        W: Write + ?Sized,
    {
        let total = match (length, input.length()?) {
            (Some(length), StorageLength::Bounded(capacity)) if length > capacity => {
                return Err(StorageError::OutOfRange {
                    offset: 0,
                    len: usize::try_from(length).unwrap_or(usize::MAX),
                    capacity,
                });
            }
            (Some(length), _) => length,
            (None, StorageLength::Bounded(capacity)) => capacity,
            (None, StorageLength::Unbounded) => {
                return Err(StorageError::InvalidArgument(
                    "length is required when copying an unbounded storage",
                ));
            }
        };
        tracing::debug!(total, "starting storage to stream copy");

        if let Some(progress) = progress.as_deref_mut() {
            progress.set_total(total);
        }

        let mut buffer = self
            .pool
            .rent(chunk_len(self.options.stream_chunk_size, total))?;
        let mut position = 0u64;
        while position < total {
            self.check_cancelled(position)?;

            let n = chunk_len(buffer.len(), total - position);
            let chunk = &mut buffer[..n];
            input.read_at(position, chunk)?;
            output.write_all(chunk)?;
            position += n as u64;

            if let Some(progress) = progress.as_deref_mut() {
                progress.report_add(n as u64);
            }
        }
        drop(buffer);
        output.flush()?;

        if let Some(progress) = progress.as_deref_mut() {
            progress.set_total(0);
        }
        tracing::debug!(bytes = total, "storage to stream copy complete");
        Ok(total)
    }

    fn check_cancelled(&self, position: u64) -> Result<()> {
        match &self.options.cancellation {
            Some(token) if token.is_cancelled() => {
                tracing::debug!(position, "copy cancelled");
                Err(StorageError::Cancelled)
            }
            _ => Ok(()),
        }
    }
}

fn chunk_len(chunk_size: usize, remaining: u64) -> usize {
    usize::try_from(remaining).map_or(chunk_size, |remaining| remaining.min(chunk_size))
}

/// [`CopyEngine::copy`] with default options and the shared buffer pool.
pub fn copy<I, O>(
    input: &mut I,
    output: &mut O,
    progress: Option<&mut dyn ProgressReport>,
) -> Result<u64>
where
    I: Storage + ?Sized,
    O: Storage + ?Sized,
{
    CopyEngine::default().copy(input, output, progress)
}

/// [`CopyEngine::copy_to_stream`] with default options and the shared buffer pool.
pub fn copy_to_stream<I, W>(
    input: &mut I,
    output: &mut W,
    length: Option<u64>,
    progress: Option<&mut dyn ProgressReport>,
) -> Result<u64>
where
    I: Storage + ?Sized,
    W: Write + ?Sized,
{
    CopyEngine::default().copy_to_stream(input, output, length, progress)
}

/// Writes the whole of `input` to a new file at `path`, replacing any existing file.
pub fn write_all_bytes<I>(
    input: &mut I,
    path: impl AsRef<Path>,
    progress: Option<&mut dyn ProgressReport>,
) -> Result<u64>
where
    I: Storage + ?Sized,
{
    let mut file = File::create(path)?;
    copy_to_stream(input, &mut file, None, progress)
}
