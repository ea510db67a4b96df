//! Pooled fixed-size buffers for streaming copies.
//!
//! Buffers are recycled through a lock-free queue. A [`PooledBuffer`] goes
//! back to its pool when dropped, so early returns and errors release it too.

use crate::error::TandemResult;
use crossbeam_queue::ArrayQueue;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of every pooled buffer: 2KB
pub const STREAM_BUFFER_SIZE: usize = 2 << 10;

/// Default number of idle buffers retained by a pool
pub const DEFAULT_POOL_CAPACITY: usize = 64;

/// Pool of `STREAM_BUFFER_SIZE` byte buffers
#[derive(Debug, Clone)]
pub struct BufferPool {
    idle: Arc<ArrayQueue<Box<[u8]>>>,
}

impl BufferPool {
    /// Create a pool retaining at most `max_idle` buffers (minimum 1)
    pub fn new(max_idle: usize) -> Self {
        Self {
            idle: Arc::new(ArrayQueue::new(max_idle.max(1))),
        }
    }

    /// Take a buffer from the pool, allocating when none is idle
    pub fn acquire(&self) -> PooledBuffer {
        let buf = self
            .idle
            .pop()
            .unwrap_or_else(|| vec![0u8; STREAM_BUFFER_SIZE].into_boxed_slice());

        PooledBuffer {
            buf: Some(buf),
            idle: Arc::clone(&self.idle),
        }
    }

    /// Number of idle buffers currently held
    pub fn idle(&self) -> usize {
        self.idle.len()
    }

    /// Maximum number of idle buffers retained
    pub fn capacity(&self) -> usize {
        self.idle.capacity()
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_CAPACITY)
    }
}

/// Buffer on loan from a [`BufferPool`]
pub struct PooledBuffer {
    buf: Option<Box<[u8]>>,
    idle: Arc<ArrayQueue<Box<[u8]>>>,
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.buf.as_deref().unwrap_or(&[])
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.buf.as_deref_mut().unwrap_or(&mut [])
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            // A full pool just lets the buffer go.
            let _ = self.idle.push(buf);
        }
    }
}

/// Copy `reader` into `writer` through a single pooled buffer.
///
/// Returns the number of bytes copied. The writer is flushed at EOF.
pub async fn copy_with_pool<R, W>(pool: &BufferPool, reader: &mut R, writer: &mut W) -> TandemResult<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = pool.acquire();
    let mut copied = 0u64;

    loop {
        let n = reader.read(&mut buf[..]).await?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).await?;
        copied += n as u64;
    }

    writer.flush().await?;
    tracing::debug!(bytes = copied, "stream copy complete");
    Ok(copied)
}
