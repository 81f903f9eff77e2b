//! Buffered length-prefixed frame reading over an async byte stream.
//!
//! Mirrors the read discipline of a typical length-prefixed protocol
//! reader: try to parse a frame out of whatever's already buffered, and
//! only read more off the stream when that fails. `Bytes::split_to` gives
//! each parsed frame its own refcounted slice of the buffer, so handing a
//! frame's body off to a dispatch queue never aliases memory the next read
//! might overwrite.

use crate::error::RpcResult;
use crate::frame::{self, Frame, FrameError, LENGTH_PREFIX_LEN};
use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

pub struct FrameReader<R> {
    stream: R,
    buffer: BytesMut,
    max_frame_len: u32,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(stream: R, max_frame_len: u32) -> Self {
        Self { stream, buffer: BytesMut::with_capacity(4096), max_frame_len }
    }

    /// Reads the next frame. Returns `Ok(None)` on a clean EOF with no
    /// partial frame pending; an EOF mid-frame is reported as an error.
    pub async fn read_frame(&mut self) -> RpcResult<Option<Frame>> {
        loop {
            if let Some(frame) = self.try_parse()? {
                return Ok(Some(frame));
            }
            if 0 == self.stream.read_buf(&mut self.buffer).await? {
                return if self.buffer.is_empty() {
                    Ok(None)
                } else {
                    Err(FrameError::IncompleteAtEof.into())
                };
            }
        }
    }

    fn try_parse(&mut self) -> Result<Option<Frame>, FrameError> {
        if self.buffer.len() < LENGTH_PREFIX_LEN {
            return Ok(None);
        }
        let len = u32::from_le_bytes(self.buffer[..LENGTH_PREFIX_LEN].try_into().unwrap());
        frame::validate_length(len, self.max_frame_len)?;

        let total = LENGTH_PREFIX_LEN + len as usize;
        if self.buffer.len() < total {
            return Ok(None);
        }

        self.buffer.advance(LENGTH_PREFIX_LEN);
        let body = self.buffer.split_to(len as usize).freeze();
        Frame::decode(body).map(Some)
    }
}
