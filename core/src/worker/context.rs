//! Stream primitives as seen from inside the execution context
//!
//! The interpreter calls [`WorkerContext::read`] / [`WorkerContext::write`] on
//! handles as if they were file descriptors. Reads that the local buffer can't
//! satisfy become `input` requests to the host and suspend until the matching
//! response is dispatched.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{BridgeError, Result};
use crate::pending::PendingRequestTable;
use crate::protocol::{wire_to_bytes, BindPayload, InputPayload, Message, Outbox};
use crate::random::RandomSource;
use crate::registry::StreamRegistry;
use crate::stream::InputBuffer;
use crate::types::{to_primitive, Handle, StreamKind, Target};

/* ===================== Worker-side stream ===================== */

/// The execution context's view of a bound handle: its variant and the bytes
/// already received but not yet read.
#[derive(Debug)]
pub struct WorkerStream {
    kind: StreamKind,
    input: InputBuffer,
}

impl WorkerStream {
    pub fn new(kind: StreamKind) -> Self {
        Self {
            kind,
            input: InputBuffer::new(),
        }
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    pub fn buffered(&self) -> usize {
        self.input.len()
    }

    /// Take a host response and return the byte the waiting read yields.
    ///
    /// Interactive payloads are lines and always yield at least the
    /// terminator. Storage and resource payloads are raw; empty means
    /// exhausted.
    fn deliver(&mut self, payload: &[u8]) -> Option<u8> {
        match self.kind {
            StreamKind::Interactive => self.input.load_line(payload),
            StreamKind::Persistent | StreamKind::Remote => self.input.load_raw(payload),
        }
        self.input.pop()
    }
}

/* ===================== Context ===================== */

#[derive(Debug, Default)]
struct WorkerState {
    streams: StreamRegistry<WorkerStream>,
    pending: PendingRequestTable<String>,
}

impl WorkerState {
    fn rebind(&mut self, handle: Handle, kind: StreamKind) {
        if self.pending.cancel(handle) {
            debug!(%handle, "rebind cancelled a read in flight");
        }
        self.streams.bind(handle, WorkerStream::new(kind));
    }
}

/// Handle-indexed I/O primitives for the interpreter. Cheap to clone.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    state: Arc<Mutex<WorkerState>>,
    outbox: Outbox,
    random: RandomSource,
    sentinel: Arc<str>,
}

impl WorkerContext {
    pub fn new(outbox: Outbox, sentinel: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(WorkerState::default())),
            outbox,
            random: RandomSource::new(),
            sentinel: Arc::from(sentinel),
        }
    }

    /// Bind `handle` locally and tell the host to mirror it.
    ///
    /// Rebinding discards whatever the previous stream had buffered and fails
    /// a read still waiting on the old stream.
    pub async fn bind(&self, handle: Handle, target: &str) -> Result<()> {
        let kind = Target::parse(target, &self.sentinel).kind();
        self.state.lock().await.rebind(handle, kind);
        debug!(%handle, target, ?kind, "bound handle");
        self.outbox.send(Message::bind(handle, target))
    }

    /// Read one byte; `None` means the stream is exhausted.
    ///
    /// Suspends only this call while the host answers; other handles and the
    /// dispatch loop keep running.
    pub async fn read(&self, handle: Handle) -> Result<Option<u8>> {
        let response = {
            let mut state = self.state.lock().await;
            let stream = state.streams.get_mut(handle)?;
            if let Some(byte) = stream.input.pop() {
                return Ok(Some(byte));
            }

            let response = state.pending.register(handle)?;
            if let Err(e) = self.outbox.send(Message::input_request(handle)) {
                state.pending.cancel(handle);
                return Err(e);
            }
            response
        };

        let payload = response.await.map_err(|_| BridgeError::ChannelClosed)?;
        let bytes = wire_to_bytes(&payload);

        let mut state = self.state.lock().await;
        let stream = state.streams.get_mut(handle)?;
        Ok(stream.deliver(&bytes))
    }

    /// [`WorkerContext::read`] as the interpreter's integer primitive.
    pub async fn read_primitive(&self, handle: Handle) -> Result<i32> {
        self.read(handle).await.map(to_primitive)
    }

    /// Send one byte to the host. Never waits on the host.
    pub async fn write(&self, handle: Handle, byte: u8) -> Result<()> {
        self.write_all(handle, &[byte]).await
    }

    pub async fn write_all(&self, handle: Handle, bytes: &[u8]) -> Result<()> {
        {
            let state = self.state.lock().await;
            state.streams.get(handle)?;
        }
        self.outbox.send(Message::output(handle, bytes))
    }

    pub fn random(&self) -> Result<u64> {
        self.random.next()
    }

    /// Apply a message from the host.
    ///
    /// Unexpected messages are logged and dropped; nothing here fails the
    /// context.
    pub async fn dispatch(&self, message: Message) {
        match message {
            Message::Input(InputPayload {
                pointer,
                buffer: Some(buffer),
            }) => {
                let mut state = self.state.lock().await;
                state.pending.resolve(pointer, buffer);
            }
            Message::Bind(BindPayload { pointer, path }) => {
                let kind = Target::parse(&path, &self.sentinel).kind();
                self.state.lock().await.rebind(pointer, kind);
                debug!(handle = %pointer, target = %path, "mirrored host bind");
            }
            other => {
                warn!(name = other.name(), handle = ?other.handle(), "worker discarding unexpected message");
            }
        }
    }

    /// Fail every suspended read. Called when the channel is gone.
    pub async fn abandon_pending(&self) {
        let mut state = self.state.lock().await;
        if !state.pending.is_empty() {
            warn!(count = state.pending.len(), "channel closed with reads in flight");
        }
        state.pending.clear();
    }

    pub async fn is_bound(&self, handle: Handle) -> bool {
        self.state.lock().await.streams.contains(handle)
    }

    pub async fn is_pending(&self, handle: Handle) -> bool {
        self.state.lock().await.pending.is_pending(handle)
    }

    pub async fn stream_kind(&self, handle: Handle) -> Result<StreamKind> {
        let state = self.state.lock().await;
        state.streams.get(handle).map(WorkerStream::kind)
    }
}
