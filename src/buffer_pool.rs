//! A bounded free-list of reusable growable byte buffers, shared across the
//! read and write paths so that steady-state traffic doesn't allocate a fresh
//! buffer per frame.

use bytes::BytesMut;
use std::sync::Mutex;

const DEFAULT_MAX_POOLED: usize = 64;
const DEFAULT_MAX_CAPACITY: usize = 64 * 1024;
const DEFAULT_INITIAL_CAPACITY: usize = 4 * 1024;

pub struct BufferPool {
    free: Mutex<Vec<BytesMut>>,
    max_pooled: usize,
    max_capacity: usize,
}

impl BufferPool {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_POOLED, DEFAULT_MAX_CAPACITY)
    }

    pub fn with_limits(max_pooled: usize, max_capacity: usize) -> Self {
        Self { free: Mutex::new(Vec::new()), max_pooled, max_capacity }
    }

    /// Borrows a buffer in the reset state (length 0). Allocates fresh if the
    /// pool is empty.
    pub fn acquire(&self) -> BytesMut {
        let mut free = self.free.lock().unwrap();
        free.pop().unwrap_or_else(|| BytesMut::with_capacity(DEFAULT_INITIAL_CAPACITY))
    }

    /// Returns a buffer to the pool for reuse. Buffers whose capacity exceeds
    /// `max_capacity` are dropped rather than retained, so one pathologically
    /// large frame doesn't pin that memory for the pool's lifetime.
    pub fn release(&self, mut buf: BytesMut) {
        if buf.capacity() > self.max_capacity {
            return;
        }
        buf.clear();
        let mut free = self.free.lock().unwrap();
        if free.len() < self.max_pooled {
            free.push(buf);
        }
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquired_buffer_is_empty() {
        let pool = BufferPool::new();
        let buf = pool.acquire();
        assert_eq!(buf.len(), 0);
    }

    #[test]
    fn released_buffer_is_reused() {
        let pool = BufferPool::new();
        let mut buf = pool.acquire();
        buf.extend_from_slice(b"hello");
        let cap = buf.capacity();
        pool.release(buf);

        let reused = pool.acquire();
        assert_eq!(reused.len(), 0);
        assert_eq!(reused.capacity(), cap);
    }

    #[test]
    fn oversized_buffer_is_discarded() {
        let pool = BufferPool::with_limits(4, 16);
        let mut buf = BytesMut::with_capacity(1024);
        buf.extend_from_slice(&[0u8; 1024]);
        pool.release(buf);

        let next = pool.acquire();
        assert!(next.capacity() < 1024);
    }

    #[test]
    fn pool_does_not_grow_past_max_pooled() {
        let pool = BufferPool::with_limits(2, DEFAULT_MAX_CAPACITY);
        pool.release(BytesMut::new());
        pool.release(BytesMut::new());
        pool.release(BytesMut::new());
        assert_eq!(pool.free.lock().unwrap().len(), 2);
    }
}
