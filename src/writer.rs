//! Serializes all outbound frame writes so concurrent callers never
//! interleave bytes on the wire.

use crate::buffer_pool::BufferPool;
use crate::error::{RpcError, RpcResult};
use crate::frame::Frame;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

struct Inner {
    stream: Box<dyn AsyncWrite + Unpin + Send>,
    closed: bool,
}

/// Guards the write half of the stream behind a single mutex. After
/// [`WriterGate::close`], every subsequent write fails fast with
/// [`RpcError::EndpointClosed`] instead of touching the stream.
pub struct WriterGate {
    inner: Mutex<Inner>,
    pool: Arc<BufferPool>,
}

impl WriterGate {
    pub fn new(stream: Box<dyn AsyncWrite + Unpin + Send>, pool: Arc<BufferPool>) -> Self {
        Self { inner: Mutex::new(Inner { stream, closed: false }), pool }
    }

    pub async fn write_frame(&self, frame: &Frame) -> RpcResult<()> {
        let mut guard = self.inner.lock().await;
        if guard.closed {
            return Err(RpcError::EndpointClosed);
        }

        let mut buf = self.pool.acquire();
        frame.encode(&mut buf);
        let result = guard.stream.write_all(&buf).await.and(guard.stream.flush().await);
        self.pool.release(buf);
        result.map_err(RpcError::from)
    }

    /// Idempotent. Marks the gate closed and shuts down the underlying
    /// stream's write half.
    pub async fn close(&self) {
        let mut guard = self.inner.lock().await;
        if guard.closed {
            return;
        }
        guard.closed = true;
        let _ = guard.stream.shutdown().await;
    }
}
