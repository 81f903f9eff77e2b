//! Dispatches incoming CALL/ONEWAY frames to registered handlers on a bounded
//! pool of concurrent workers, decoupling slow handlers from the reader loop.
//!
//! The queue feeding the workers is bounded; once it's full, `dispatch` backs
//! up and the reader loop (which awaits it) stops pulling new frames off the
//! stream. This is a deliberate choice: bounded memory and head-of-line
//! blocking over unbounded growth or silently dropped frames.

use crate::registry::{HandlerRegistry, Replier};
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tracing::debug;

pub enum Inbound {
    Call { pid: i32, seq: u32, args: Bytes, replier: Replier },
    OneWay { pid: i32, args: Bytes },
}

#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::Sender<Inbound>,
}

impl Dispatcher {
    /// Spawns the dispatch loop and its pool of at most `worker_count`
    /// concurrently running handler invocations, fed by a channel of
    /// `queue_capacity` slots.
    pub fn spawn(registry: Arc<HandlerRegistry>, worker_count: usize, queue_capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel(queue_capacity);
        let semaphore = Arc::new(Semaphore::new(worker_count.max(1)));

        tokio::spawn(async move {
            while let Some(inbound) = rx.recv().await {
                let permit = match semaphore.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => break,
                };
                let registry = registry.clone();
                tokio::spawn(async move {
                    Dispatcher::handle(&registry, inbound).await;
                    drop(permit);
                });
            }
        });

        Self { tx }
    }

    /// Enqueues a frame for dispatch, awaiting room in the queue if it's full.
    pub async fn dispatch(&self, inbound: Inbound) -> Result<(), mpsc::error::SendError<Inbound>> {
        self.tx.send(inbound).await
    }

    async fn handle(registry: &HandlerRegistry, inbound: Inbound) {
        match inbound {
            Inbound::OneWay { pid, args } => {
                if let Some(handler) = registry.one_way_handler(pid) {
                    handler(args).await;
                } else if let Some(default) = registry.default_one_way_handler() {
                    default(args).await;
                } else {
                    debug!(pid, "dropping one-way frame: no handler registered");
                }
            }
            Inbound::Call { pid, seq, args, replier } => {
                if let Some(handler) = registry.call_handler(pid) {
                    handler(seq, args, replier).await;
                } else {
                    debug!(pid, seq, "dropping call frame: no handler registered");
                }
            }
        }
    }
}
