//! Protocol-id keyed handler registry.
//!
//! Handlers are stored as boxed trait objects behind an `Arc`, so a lookup
//! can clone the `Arc` out from under the registry's lock and invoke the
//! handler after releasing it -- callers never run application code while
//! holding the registry lock.

use crate::error::{RpcError, RpcResult};
use crate::frame::Frame;
use crate::writer::WriterGate;
use bytes::Bytes;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

pub(crate) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

type CallHandler = Arc<dyn Fn(u32, Bytes, Replier) -> BoxFuture<'static, ()> + Send + Sync>;
type OneWayHandler = Arc<dyn Fn(Bytes) -> BoxFuture<'static, ()> + Send + Sync>;

/// Handle passed to a registered call handler, used to send back exactly one
/// reply for the sequence it was invoked with. The handler may call
/// [`Replier::reply`] synchronously or after arbitrary further async work;
/// nothing enforces that it does so at all (a handler that never replies
/// leaves the caller to observe a timeout).
#[derive(Clone)]
pub struct Replier {
    seq: u32,
    writer: Arc<WriterGate>,
}

impl Replier {
    pub(crate) fn new(seq: u32, writer: Arc<WriterGate>) -> Self {
        Self { seq, writer }
    }

    pub fn sequence(&self) -> u32 {
        self.seq
    }

    pub async fn reply(&self, body: Bytes) -> RpcResult<()> {
        self.writer.write_frame(&Frame::Reply { seq: self.seq, body }).await
    }
}

#[derive(Default)]
pub struct HandlerRegistry {
    call_handlers: RwLock<HashMap<i32, CallHandler>>,
    one_way_handlers: RwLock<HashMap<i32, OneWayHandler>>,
    default_one_way: RwLock<Option<OneWayHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a two-way call handler for `pid`. Fails if `pid` already has
    /// a call handler bound.
    pub fn register_call<F, Fut>(&self, pid: i32, handler: F) -> RpcResult<()>
    where
        F: Fn(u32, Bytes, Replier) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut map = self.call_handlers.write().unwrap();
        if map.contains_key(&pid) {
            return Err(RpcError::RegistrationConflict(pid));
        }
        map.insert(pid, Arc::new(move |seq, args, replier| Box::pin(handler(seq, args, replier))));
        Ok(())
    }

    /// Registers a one-way (no reply) handler for `pid`.
    pub fn register_one_way<F, Fut>(&self, pid: i32, handler: F) -> RpcResult<()>
    where
        F: Fn(Bytes) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut map = self.one_way_handlers.write().unwrap();
        if map.contains_key(&pid) {
            return Err(RpcError::RegistrationConflict(pid));
        }
        map.insert(pid, Arc::new(move |args| Box::pin(handler(args))));
        Ok(())
    }

    /// Installs a catch-all handler for one-way frames whose pid has no
    /// specific registration.
    pub fn set_one_way_default<F, Fut>(&self, handler: F)
    where
        F: Fn(Bytes) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        *self.default_one_way.write().unwrap() = Some(Arc::new(move |args| Box::pin(handler(args))));
    }

    pub(crate) fn call_handler(&self, pid: i32) -> Option<CallHandler> {
        self.call_handlers.read().unwrap().get(&pid).cloned()
    }

    pub(crate) fn one_way_handler(&self, pid: i32) -> Option<OneWayHandler> {
        self.one_way_handlers.read().unwrap().get(&pid).cloned()
    }

    pub(crate) fn default_one_way_handler(&self) -> Option<OneWayHandler> {
        self.default_one_way.read().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn duplicate_call_registration_conflicts() {
        let registry = HandlerRegistry::new();
        registry.register_call(1, |_seq, _args, _replier| async {}).unwrap();
        let err = registry.register_call(1, |_seq, _args, _replier| async {}).unwrap_err();
        assert!(matches!(err, RpcError::RegistrationConflict(1)));
    }

    #[test]
    fn duplicate_one_way_registration_conflicts() {
        let registry = HandlerRegistry::new();
        registry.register_one_way(2, |_args| async {}).unwrap();
        let err = registry.register_one_way(2, |_args| async {}).unwrap_err();
        assert!(matches!(err, RpcError::RegistrationConflict(2)));
    }

    #[tokio::test]
    async fn registered_one_way_handler_is_invoked() {
        let registry = HandlerRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        registry
            .register_one_way(3, move |_args| {
                let count = count_clone.clone();
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                }
            })
            .unwrap();

        let handler = registry.one_way_handler(3).unwrap();
        handler(Bytes::new()).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unregistered_pid_has_no_handler() {
        let registry = HandlerRegistry::new();
        assert!(registry.call_handler(42).is_none());
        assert!(registry.one_way_handler(42).is_none());
        assert!(registry.default_one_way_handler().is_none());
    }
}
