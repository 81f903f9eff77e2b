//! Sequence allocation and the table of in-flight two-way calls.
//!
//! Each outstanding call is represented on the wire by its sequence number
//! and, locally, by a oneshot channel the caller is awaiting. Reply delivery
//! and timeout expiry race to remove the same map entry; whichever side wins
//! that removal owns the call's terminal transition, so a call completes
//! exactly once.

use crate::error::{RpcError, RpcResult};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::sleep;

type Outcome = Result<Bytes, RpcError>;

struct Entry {
    tx: oneshot::Sender<Outcome>,
}

struct Inner {
    next_seq: u32,
    entries: HashMap<u32, Entry>,
}

/// Map of sequence -> in-flight call, guarded by a single mutex.
pub struct PendingTable {
    inner: Mutex<Inner>,
    default_timeout: Mutex<Duration>,
}

/// A ticket for one call, handed to the caller by [`PendingTable::acquire`].
/// Waiting on it races the reply against the call's timeout.
pub struct PendingTicket {
    seq: u32,
    rx: oneshot::Receiver<Outcome>,
}

impl PendingTicket {
    pub fn sequence(&self) -> u32 {
        self.seq
    }

    /// Waits for a reply or the given timeout, whichever comes first. On
    /// timeout, removes this call's entry from `table` so a later-arriving
    /// reply for the same sequence is dropped rather than delivered.
    pub async fn wait(self, table: &PendingTable, timeout: Duration) -> RpcResult<Bytes> {
        tokio::select! {
            biased;
            result = self.rx => result.unwrap_or(Err(RpcError::EndpointClosed)),
            _ = sleep(timeout) => {
                table.fail(self.seq, RpcError::Timeout);
                Err(RpcError::Timeout)
            }
        }
    }
}

impl PendingTable {
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner { next_seq: 0, entries: HashMap::new() }),
            default_timeout: Mutex::new(default_timeout),
        }
    }

    pub fn default_timeout(&self) -> Duration {
        *self.default_timeout.lock().unwrap()
    }

    pub fn set_default_timeout(&self, timeout: Duration) {
        *self.default_timeout.lock().unwrap() = timeout;
    }

    /// Allocates the next sequence number (wrapping on overflow) and installs
    /// a fresh entry for it.
    pub fn acquire(&self) -> (PendingTicket, u32) {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.inner.lock().unwrap();
        let seq = inner.next_seq;
        inner.next_seq = inner.next_seq.wrapping_add(1);
        inner.entries.insert(seq, Entry { tx });
        (PendingTicket { seq, rx }, seq)
    }

    /// Delivers a reply to its caller. A reply for an unknown or already
    /// terminated sequence (late arrival racing a timeout) is dropped silently.
    pub fn deliver_reply(&self, seq: u32, body: Bytes) {
        let entry = self.inner.lock().unwrap().entries.remove(&seq);
        if let Some(entry) = entry {
            let _ = entry.tx.send(Ok(body));
        }
    }

    /// Fails a single outstanding call, e.g. because the write that was
    /// supposed to carry it never made it onto the wire.
    pub fn fail(&self, seq: u32, err: RpcError) {
        let entry = self.inner.lock().unwrap().entries.remove(&seq);
        if let Some(entry) = entry {
            let _ = entry.tx.send(Err(err));
        }
    }

    /// Fails every outstanding call, used on transport failure or endpoint
    /// close. `make_err` is invoked once per call so the failure doesn't
    /// require `RpcError` to be `Clone`.
    pub fn fail_all(&self, make_err: impl Fn() -> RpcError) {
        let entries: Vec<Entry> = self.inner.lock().unwrap().entries.drain().map(|(_, e)| e).collect();
        for entry in entries {
            let _ = entry.tx.send(Err(make_err()));
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }
}
