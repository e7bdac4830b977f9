//! Buffer pool for serialized blocks.
//!
//! Sustained sync traffic stores thousands of blocks; drawing their buffers
//! from a free-list keeps allocation churn bounded. A buffer is owned by a
//! [`PooledBuffer`] handle and goes back to the pool when the handle drops,
//! which for stored blocks is after the entry is removed *and* every reader
//! sharing it is gone.

use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Default number of idle buffers kept by a pool.
pub const DEFAULT_MAX_RETAINED: usize = 64;

/// A free-list of byte buffers with a capacity ceiling.
#[derive(Debug)]
pub struct BufferPool {
    free: Mutex<Vec<Vec<u8>>>,
    /// Buffers that grew beyond this are dropped instead of retained.
    max_capacity: usize,
    max_retained: usize,
    allocated: AtomicU64,
    reused: AtomicU64,
}

impl BufferPool {
    /// Create a pool for buffers of up to `max_capacity` bytes.
    pub fn new(max_capacity: usize, max_retained: usize) -> Arc<Self> {
        Arc::new(Self {
            free: Mutex::new(Vec::with_capacity(max_retained)),
            max_capacity,
            max_retained,
            allocated: AtomicU64::new(0),
            reused: AtomicU64::new(0),
        })
    }

    /// Take an empty buffer from the pool, allocating if none is idle.
    pub fn acquire(self: &Arc<Self>) -> PooledBuffer {
        let buf = match self.free.lock().pop() {
            Some(buf) => {
                self.reused.fetch_add(1, Ordering::Relaxed);
                buf
            }
            None => {
                self.allocated.fetch_add(1, Ordering::Relaxed);
                Vec::new()
            }
        };
        PooledBuffer {
            buf,
            pool: Arc::clone(self),
        }
    }

    /// Number of idle buffers.
    pub fn available(&self) -> usize {
        self.free.lock().len()
    }

    /// Number of buffers allocated fresh because the pool was empty.
    pub fn allocated(&self) -> u64 {
        self.allocated.load(Ordering::Relaxed)
    }

    /// Number of acquisitions served from the free-list.
    pub fn reused(&self) -> u64 {
        self.reused.load(Ordering::Relaxed)
    }

    /// Largest buffer capacity the pool retains.
    pub fn max_capacity(&self) -> usize {
        self.max_capacity
    }

    fn release(&self, mut buf: Vec<u8>) {
        if buf.capacity() > self.max_capacity {
            return;
        }
        buf.clear();
        let mut free = self.free.lock();
        if free.len() < self.max_retained {
            free.push(buf);
        }
    }
}

/// An owned buffer on loan from a [`BufferPool`].
///
/// Dropping the handle returns the allocation to the pool.
#[derive(Debug)]
pub struct PooledBuffer {
    buf: Vec<u8>,
    pool: Arc<BufferPool>,
}

impl PooledBuffer {
    /// Mutable access for filling the buffer.
    pub fn as_mut_vec(&mut self) -> &mut Vec<u8> {
        &mut self.buf
    }

    /// Length of the contents.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf
    }
}

impl AsRef<[u8]> for PooledBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.buf
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.buf));
    }
}
