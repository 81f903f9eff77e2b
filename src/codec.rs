//! Optional payload (de)serialization layer, entirely above the core engine.
//!
//! The endpoint itself only ever moves opaque bytes; `call`/`one_way`/`reply`
//! never require this module. It exists so application code that wants
//! typed request/reply bodies doesn't have to hand-roll its own encoding on
//! top of `Bytes`. Only built with the `codec` feature enabled.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to encode or decode value: {0}")]
    Bincode(#[from] bincode::Error),
}

/// Serializes/deserializes call and reply payloads. The default
/// implementation, [`BincodeCodec`], uses `bincode` over `serde`; callers
/// needing wire compatibility with non-Rust peers can implement `Codec`
/// themselves over whatever format they need.
pub trait Codec: Send + Sync {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Bytes, CodecError>;
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError>;
}

/// The default `Codec`, backed by `bincode`'s compact binary encoding.
#[derive(Debug, Default, Clone, Copy)]
pub struct BincodeCodec;

impl Codec for BincodeCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Bytes, CodecError> {
        Ok(Bytes::from(bincode::serialize(value)?))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        Ok(bincode::deserialize(bytes)?)
    }
}
