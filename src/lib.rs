//! A multiplexed, bidirectional, message-oriented RPC engine over a single
//! reliable ordered byte stream.
//!
//! Each [`Endpoint`] acts simultaneously as a client (issuing calls via
//! [`Endpoint::call`]/[`Endpoint::go`]/[`Endpoint::one_way`]) and a server
//! (dispatching incoming calls to handlers registered with
//! [`Endpoint::register_call`]/[`Endpoint::register_one_way`]) over the same
//! connection. Three message kinds share the wire: a two-way call, a
//! fire-and-forget one-way notification, and a reply to a prior call.
//!
//! # Example
//!
//! ```rust,no_run
//! use bytes::Bytes;
//! use muxrpc::{Endpoint, EndpointConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (endpoint, driver) = Endpoint::connect("127.0.0.1:9000", EndpointConfig::new()).await?;
//!
//!     const ECHO: i32 = 1;
//!     endpoint.register_call(ECHO, |_seq, args, replier| async move {
//!         let _ = replier.reply(args).await;
//!     })?;
//!
//!     tokio::spawn(driver.run());
//!
//!     let reply = endpoint.call(ECHO, Bytes::from_static(b"hello")).await?;
//!     assert_eq!(&reply[..], b"hello");
//!
//!     endpoint.close().await;
//!     Ok(())
//! }
//! ```

pub mod buffer_pool;
#[cfg(feature = "codec")]
pub mod codec;
pub mod dispatcher;
pub mod endpoint;
pub mod error;
pub mod frame;
pub mod pending;
pub mod reader;
pub mod registry;
pub mod writer;

pub use endpoint::{Endpoint, EndpointConfig, EndpointDriver, GoHandle};
pub use error::{RpcError, RpcResult};
pub use frame::{Frame, FrameError, FrameType};
pub use registry::Replier;

/// Convenience boxed-error alias for examples and binaries that don't need
/// the structured [`RpcError`] distinctions.
pub type Error = Box<dyn std::error::Error + Send + Sync>;

/// A specialized `Result` type matching [`Error`], for convenience in
/// examples and application code.
pub type Result<T> = std::result::Result<T, Error>;
