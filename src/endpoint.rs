//! The composite object: one duplex stream, playing both client (issuing
//! calls) and server (dispatching to registered handlers) roles at once.

use crate::buffer_pool::BufferPool;
use crate::dispatcher::{Dispatcher, Inbound};
use crate::error::{RpcError, RpcResult};
use crate::frame::Frame;
use crate::pending::{PendingTable, PendingTicket};
use crate::reader::FrameReader;
use crate::registry::{HandlerRegistry, Replier};
use crate::writer::WriterGate;

use bytes::Bytes;
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::oneshot;
use tracing::{debug, info, instrument, warn};

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(8);
const DEFAULT_MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;
const DEFAULT_WORKER_COUNT: usize = 16;
const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Builder-style configuration for an [`Endpoint`], mirroring the
/// `with_*`-chained-setter shape used elsewhere in this crate's family for
/// small config structs.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    call_timeout: Duration,
    max_frame_len: u32,
    worker_count: usize,
    queue_capacity: usize,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            worker_count: DEFAULT_WORKER_COUNT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl EndpointConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_max_frame_len(mut self, max_frame_len: u32) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }

    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum State {
    Fresh = 0,
    Running = 1,
    Closed = 2,
}

/// A handle to a call issued with [`Endpoint::go`]: the request has already
/// been written to the wire; awaiting this handle observes the eventual
/// reply, timeout, or failure.
pub struct GoHandle<'a> {
    ticket: PendingTicket,
    pending: &'a PendingTable,
    timeout: Duration,
}

impl<'a> GoHandle<'a> {
    pub fn sequence(&self) -> u32 {
        self.ticket.sequence()
    }

    pub async fn wait(self) -> RpcResult<Bytes> {
        self.ticket.wait(self.pending, self.timeout).await
    }
}

/// One multiplexed RPC endpoint. Construct with [`Endpoint::new`], which
/// returns this handle (used to `register`/`call`/`one_way`/`close`) plus an
/// [`EndpointDriver`] that must be `run()` on its own task to actually pump
/// frames.
pub struct Endpoint {
    registry: Arc<HandlerRegistry>,
    pending: Arc<PendingTable>,
    writer: Arc<WriterGate>,
    state: Arc<AtomicU8>,
    close_tx: std::sync::Mutex<Option<oneshot::Sender<()>>>,
}

/// Drives the reader loop. Must be polled (via [`EndpointDriver::run`]) for
/// the endpoint to make any progress at all; typically spawned as its own
/// task immediately after construction.
pub struct EndpointDriver<S> {
    frames: FrameReader<ReadHalf<S>>,
    pending: Arc<PendingTable>,
    dispatcher: Dispatcher,
    writer: Arc<WriterGate>,
    state: Arc<AtomicU8>,
    close_rx: oneshot::Receiver<()>,
}

impl Endpoint {
    /// Wraps a duplex stream into an [`Endpoint`] + [`EndpointDriver`] pair.
    /// The endpoint starts in the `Fresh` state; calls against it fail with
    /// [`RpcError::NotRunning`] until the driver's `run()` has been spawned.
    pub fn new<S>(stream: S, config: EndpointConfig) -> (Self, EndpointDriver<S>)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let pool = Arc::new(BufferPool::new());
        let pending = Arc::new(PendingTable::new(config.call_timeout));
        let registry = Arc::new(HandlerRegistry::new());
        let writer = Arc::new(WriterGate::new(Box::new(write_half), pool));
        let dispatcher = Dispatcher::spawn(registry.clone(), config.worker_count, config.queue_capacity);
        let state = Arc::new(AtomicU8::new(State::Fresh as u8));
        let (close_tx, close_rx) = oneshot::channel();

        let driver = EndpointDriver {
            frames: FrameReader::new(read_half, config.max_frame_len),
            pending: pending.clone(),
            dispatcher,
            writer: writer.clone(),
            state: state.clone(),
            close_rx,
        };

        let endpoint = Self {
            registry,
            pending,
            writer,
            state,
            close_tx: std::sync::Mutex::new(Some(close_tx)),
        };

        (endpoint, driver)
    }

    /// Convenience constructor for the common case: dial a TCP peer and wrap
    /// the resulting socket into an endpoint. The transport itself (DNS,
    /// connect, TLS, reconnection) is out of this crate's scope beyond this;
    /// for anything else, construct the stream yourself and use [`Endpoint::new`].
    pub async fn connect<A: ToSocketAddrs>(
        addr: A,
        config: EndpointConfig,
    ) -> std::io::Result<(Self, EndpointDriver<TcpStream>)> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream, config))
    }

    pub fn register_call<F, Fut>(&self, pid: i32, handler: F) -> RpcResult<()>
    where
        F: Fn(u32, Bytes, Replier) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.registry.register_call(pid, handler)
    }

    pub fn register_one_way<F, Fut>(&self, pid: i32, handler: F) -> RpcResult<()>
    where
        F: Fn(Bytes) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.registry.register_one_way(pid, handler)
    }

    pub fn set_one_way_default<F, Fut>(&self, handler: F)
    where
        F: Fn(Bytes) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.registry.set_one_way_default(handler)
    }

    pub fn set_call_timeout(&self, timeout: Duration) {
        self.pending.set_default_timeout(timeout);
    }

    fn check_running(&self) -> RpcResult<()> {
        match self.state.load(Ordering::Acquire) {
            s if s == State::Closed as u8 => Err(RpcError::EndpointClosed),
            s if s == State::Fresh as u8 => Err(RpcError::NotRunning),
            _ => Ok(()),
        }
    }

    /// Issues a two-way call and waits for its reply, timeout, or endpoint
    /// failure -- whichever comes first. Safe to call concurrently from many
    /// tasks sharing this endpoint.
    #[instrument(skip(self, args), fields(pid))]
    pub async fn call(&self, pid: i32, args: Bytes) -> RpcResult<Bytes> {
        self.check_running()?;
        let timeout = self.pending.default_timeout();
        let (ticket, seq) = self.pending.acquire();
        let frame = Frame::Call { pid, seq, args };
        if let Err(e) = self.writer.write_frame(&frame).await {
            self.pending.fail(seq, err_like(&e));
            return Err(e);
        }
        ticket.wait(&self.pending, timeout).await
    }

    /// Non-blocking variant of `call`: writes the request immediately and
    /// returns a handle observed later, rather than waiting inline.
    pub async fn go(&self, pid: i32, args: Bytes) -> RpcResult<GoHandle<'_>> {
        self.check_running()?;
        let timeout = self.pending.default_timeout();
        let (ticket, seq) = self.pending.acquire();
        let frame = Frame::Call { pid, seq, args };
        if let Err(e) = self.writer.write_frame(&frame).await {
            self.pending.fail(seq, err_like(&e));
            return Err(e);
        }
        Ok(GoHandle { ticket, pending: &self.pending, timeout })
    }

    /// Fire-and-forget notification. Resolves once the frame is enqueued to
    /// the stream; does not wait for (or know about) any remote processing.
    pub async fn one_way(&self, pid: i32, args: Bytes) -> RpcResult<()> {
        self.check_running()?;
        self.writer.write_frame(&Frame::OneWay { pid, args }).await
    }

    /// Sends a reply for `seq`. Called by call handlers via their
    /// [`Replier`]; exposed here too so application code that already has a
    /// sequence number (e.g. from a custom dispatch path) can reply directly.
    pub async fn reply(&self, seq: u32, body: Bytes) -> RpcResult<()> {
        self.writer.write_frame(&Frame::Reply { seq, body }).await
    }

    /// Idempotent. Fails every outstanding call with `ENDPOINT_CLOSED`,
    /// signals the driver's reader loop to stop, and closes the writer gate.
    pub async fn close(&self) {
        let previous = self.state.swap(State::Closed as u8, Ordering::AcqRel);
        if previous == State::Closed as u8 {
            return;
        }

        self.pending.fail_all(|| RpcError::EndpointClosed);
        self.writer.close().await;
        if let Some(tx) = self.close_tx.lock().unwrap().take() {
            let _ = tx.send(());
        }
        info!("endpoint closed");
    }
}

fn err_like(e: &RpcError) -> RpcError {
    match e {
        RpcError::Timeout => RpcError::Timeout,
        RpcError::EndpointClosed => RpcError::EndpointClosed,
        RpcError::NotRunning => RpcError::NotRunning,
        RpcError::Transport(io_err) => RpcError::Transport(std::io::Error::new(io_err.kind(), io_err.to_string())),
        RpcError::Framing(_) => RpcError::Transport(std::io::Error::other("framing error on write path")),
        RpcError::UnknownProtocol(p) => RpcError::UnknownProtocol(*p),
        RpcError::RegistrationConflict(p) => RpcError::RegistrationConflict(*p),
        RpcError::Remote(msg) => RpcError::Remote(msg.clone()),
    }
}

impl<S> EndpointDriver<S>
where
    S: AsyncRead + Unpin + Send + 'static,
{
    /// Drives the reader loop until the stream ends, a framing/transport
    /// error occurs, or [`Endpoint::close`] is called. Returns the terminal
    /// error (an `EndpointClosed` result means a local `close()` call won the
    /// race, not a stream failure).
    #[instrument(skip(self))]
    pub async fn run(mut self) -> RpcError {
        // Only advance Fresh -> Running; a concurrent `close()` may already
        // have taken the endpoint to Closed before this task was first
        // scheduled, and that transition must not be clobbered (state is
        // monotonic: Fresh -> Running -> Closed).
        if self
            .state
            .compare_exchange(State::Fresh as u8, State::Running as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("close raced driver startup; reader loop exiting without running");
            return RpcError::EndpointClosed;
        }
        info!("endpoint driver running");

        let terminal = loop {
            tokio::select! {
                frame = self.frames.read_frame() => {
                    match frame {
                        Ok(Some(frame)) => {
                            if let Err(e) = self.route(frame).await {
                                break e;
                            }
                        }
                        Ok(None) => {
                            debug!("stream closed cleanly by peer");
                            break RpcError::Transport(std::io::Error::new(
                                std::io::ErrorKind::UnexpectedEof,
                                "peer closed the connection",
                            ));
                        }
                        Err(e) => break e,
                    }
                }
                _ = &mut self.close_rx => {
                    debug!("close requested; reader loop exiting");
                    return RpcError::EndpointClosed;
                }
            }
        };

        warn!(error = %terminal, "reader loop terminating on transport failure");
        self.state.store(State::Closed as u8, Ordering::Release);
        self.pending.fail_all(|| {
            RpcError::Transport(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "transport failure"))
        });
        self.writer.close().await;
        terminal
    }

    async fn route(&mut self, frame: Frame) -> RpcResult<()> {
        match frame {
            Frame::Reply { seq, body } => {
                debug!(seq, "reply frame received");
                self.pending.deliver_reply(seq, body);
                Ok(())
            }
            Frame::Call { pid, seq, args } => {
                let replier = Replier::new(seq, self.writer.clone());
                self.dispatcher
                    .dispatch(Inbound::Call { pid, seq, args, replier })
                    .await
                    .map_err(|_| RpcError::EndpointClosed)
            }
            Frame::OneWay { pid, args } => self
                .dispatcher
                .dispatch(Inbound::OneWay { pid, args })
                .await
                .map_err(|_| RpcError::EndpointClosed),
        }
    }
}
