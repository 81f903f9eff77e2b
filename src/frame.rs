//! Wire framing for the multiplexed call protocol.
//!
//! Every frame on the stream is a 4-byte little-endian length prefix
//! followed by that many body bytes. The first body byte is a type tag
//! (`CALL` = 1, `ONEWAY` = 2, `REPLY` = 3); the remaining bytes are
//! type-dependent and are treated as opaque payload by everything above
//! this module.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use num_enum::TryFromPrimitiveError;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use thiserror::Error;

/// Size in bytes of the little-endian length prefix that precedes every frame.
pub const LENGTH_PREFIX_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum FrameType {
    Call = 1,
    OneWay = 2,
    Reply = 3,
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame length {0} exceeds configured maximum {1}")]
    TooLarge(u32, u32),

    #[error("frame length is zero")]
    ZeroLength,

    #[error("unknown frame type tag {0}")]
    UnknownType(u8),

    #[error("frame body is too short to contain its fixed fields")]
    Truncated,

    #[error("stream ended with an incomplete frame buffered")]
    IncompleteAtEof,
}

impl From<TryFromPrimitiveError<FrameType>> for FrameError {
    fn from(e: TryFromPrimitiveError<FrameType>) -> Self {
        FrameError::UnknownType(e.number)
    }
}

/// A decoded frame. `args`/`body` are cheap, refcounted views into the
/// buffer the reader read from the stream (see [`bytes::BytesMut::split_to`]),
/// never copies of it.
#[derive(Debug, Clone)]
pub enum Frame {
    Call { pid: i32, seq: u32, args: Bytes },
    OneWay { pid: i32, args: Bytes },
    Reply { seq: u32, body: Bytes },
}

impl Frame {
    pub fn frame_type(&self) -> FrameType {
        match self {
            Frame::Call { .. } => FrameType::Call,
            Frame::OneWay { .. } => FrameType::OneWay,
            Frame::Reply { .. } => FrameType::Reply,
        }
    }

    /// Appends this frame's wire representation (length prefix included) to `out`.
    pub fn encode(&self, out: &mut BytesMut) {
        let len_pos = out.len();
        out.put_u32_le(0); // patched below once the body length is known
        let body_start = out.len();
        match self {
            Frame::Call { pid, seq, args } => {
                out.put_u8(FrameType::Call.into());
                out.put_i32_le(*pid);
                out.put_u32_le(*seq);
                out.extend_from_slice(args);
            }
            Frame::OneWay { pid, args } => {
                out.put_u8(FrameType::OneWay.into());
                out.put_i32_le(*pid);
                out.extend_from_slice(args);
            }
            Frame::Reply { seq, body } => {
                out.put_u8(FrameType::Reply.into());
                out.put_u32_le(*seq);
                out.extend_from_slice(body);
            }
        }
        let body_len = (out.len() - body_start) as u32;
        out[len_pos..len_pos + LENGTH_PREFIX_LEN].copy_from_slice(&body_len.to_le_bytes());
    }

    /// Decodes a frame body (the bytes following the length prefix, exactly
    /// `length` bytes long).
    pub fn decode(mut body: Bytes) -> Result<Frame, FrameError> {
        if body.is_empty() {
            return Err(FrameError::Truncated);
        }
        let tag = body.get_u8();
        let frame_type = FrameType::try_from_primitive(tag)?;
        match frame_type {
            FrameType::Call => {
                if body.remaining() < 8 {
                    return Err(FrameError::Truncated);
                }
                let pid = body.get_i32_le();
                let seq = body.get_u32_le();
                Ok(Frame::Call { pid, seq, args: body })
            }
            FrameType::OneWay => {
                if body.remaining() < 4 {
                    return Err(FrameError::Truncated);
                }
                let pid = body.get_i32_le();
                Ok(Frame::OneWay { pid, args: body })
            }
            FrameType::Reply => {
                if body.remaining() < 4 {
                    return Err(FrameError::Truncated);
                }
                let seq = body.get_u32_le();
                Ok(Frame::Reply { seq, body })
            }
        }
    }
}

/// Rejects a just-read length prefix before it's used to size a read.
pub fn validate_length(len: u32, max: u32) -> Result<(), FrameError> {
    if len == 0 {
        return Err(FrameError::ZeroLength);
    }
    if len > max {
        return Err(FrameError::TooLarge(len, max));
    }
    Ok(())
}
