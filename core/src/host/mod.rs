//! Host context: owns the console, persistent storage and resource fetching
//!
//! The host mirrors every bind it sees, answers `input` requests with whatever
//! the bound stream produces, applies `output` bytes to streams and records
//! when a run completes.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::fetch::Fetcher;
use crate::protocol::{wire_to_bytes, BindPayload, Inbox, InputPayload, Message, OutputPayload, Outbox};
use crate::registry::StreamRegistry;
use crate::storage::{storage_key, KeyValueStore};
use crate::stream::{line_body, Console, OpenContext, PendingRead, Stream};
use crate::types::{Handle, RunOutcome, StreamKind, Target};

#[cfg(test)]
mod tests;

/// Host behaviour knobs, usually taken from [`crate::config::Config`]
#[derive(Debug, Clone)]
pub struct HostOptions {
    pub sentinel: String,
    pub key_prefix: String,
    pub echo_input: bool,
}

impl Default for HostOptions {
    fn default() -> Self {
        Self {
            sentinel: crate::types::INTERACTIVE_SENTINEL.to_string(),
            key_prefix: crate::storage::DEFAULT_KEY_PREFIX.to_string(),
            echo_input: false,
        }
    }
}

struct HostState {
    streams: StreamRegistry<Stream>,
    store: Box<dyn KeyValueStore>,
}

#[derive(Clone)]
pub struct HostContext {
    state: Arc<Mutex<HostState>>,
    outbox: Outbox,
    open: OpenContext,
    options: Arc<HostOptions>,
    completion: Arc<watch::Sender<Option<RunOutcome>>>,
}

impl HostContext {
    pub fn new(
        outbox: Outbox,
        store: Box<dyn KeyValueStore>,
        fetcher: Arc<dyn Fetcher>,
        options: HostOptions,
    ) -> Self {
        let open = OpenContext {
            console: Console::new(),
            fetcher,
            key_prefix: options.key_prefix.clone(),
        };
        let (completion, _) = watch::channel(None);

        Self {
            state: Arc::new(Mutex::new(HostState {
                streams: StreamRegistry::new(),
                store,
            })),
            outbox,
            open,
            options: Arc::new(options),
            completion: Arc::new(completion),
        }
    }

    pub fn console(&self) -> &Console {
        &self.open.console
    }

    /* ===================== Commands ===================== */

    /// Bind `handle` here and in the worker.
    pub async fn bind(&self, handle: Handle, target: &str) -> Result<()> {
        self.bind_local(handle, target).await;
        self.outbox.send(Message::bind(handle, target))
    }

    pub fn load_archive(&self, archive: Vec<u8>) -> Result<()> {
        self.outbox.send(Message::LoadJar(archive))
    }

    /// Ask the worker to start interpreting. Clears any previous outcome.
    pub fn run(&self, entry: Option<String>) -> Result<()> {
        self.completion.send_replace(None);
        self.outbox.send(Message::Run(entry))
    }

    /// A line typed by the person. Every prompt waiting right now gets it.
    pub fn deliver_input(&self, line: &str) -> usize {
        self.open.console.deliver(line)
    }

    pub fn transcript(&self) -> String {
        self.open.console.transcript()
    }

    /// Bytes a persistent target currently holds
    pub async fn stored(&self, target: &str) -> Result<Option<Vec<u8>>> {
        let state = self.state.lock().await;
        state.store.get(&storage_key(&self.options.key_prefix, target))
    }

    pub async fn stream_kind(&self, handle: Handle) -> Result<StreamKind> {
        let state = self.state.lock().await;
        state.streams.get(handle).map(Stream::kind)
    }

    pub fn outcome(&self) -> Option<RunOutcome> {
        self.completion.borrow().clone()
    }

    /// Wait until the worker reports the current run finished.
    ///
    /// Returns `None` if the host context is torn down first.
    pub async fn wait_for_completion(&self) -> Option<RunOutcome> {
        let mut rx = self.completion.subscribe();
        let outcome = rx.wait_for(|outcome| outcome.is_some()).await.ok()?;
        outcome.clone()
    }

    /* ===================== Dispatch ===================== */

    pub async fn dispatch(&self, message: Message) {
        match message {
            Message::Bind(BindPayload { pointer, path }) => {
                self.bind_local(pointer, &path).await;
            }
            Message::Input(InputPayload {
                pointer,
                buffer: None,
            }) => {
                self.serve_input(pointer).await;
            }
            Message::Output(OutputPayload { pointer, buffer }) => {
                self.apply_output(pointer, &wire_to_bytes(&buffer)).await;
            }
            Message::Run(report) => {
                let report = report.unwrap_or_default();
                info!(%report, "worker finished run");
                self.completion.send_replace(Some(RunOutcome {
                    report,
                    finished_at: Utc::now(),
                }));
            }
            other => {
                warn!(name = other.name(), handle = ?other.handle(), "host discarding unexpected message");
            }
        }
    }

    async fn bind_local(&self, handle: Handle, target: &str) {
        let parsed = Target::parse(target, &self.options.sentinel);
        let stream = Stream::open(&parsed, &self.open);
        let mut state = self.state.lock().await;
        state.streams.bind(handle, stream);
        debug!(%handle, target, kind = ?parsed.kind(), "host bound handle");
    }

    async fn serve_input(&self, handle: Handle) {
        let pending = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            let stream = match state.streams.get_mut(handle) {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(error = %e, "input request for unbound handle");
                    return;
                }
            };
            match stream.begin_read(state.store.as_ref()) {
                Ok(pending) => pending,
                Err(e) => {
                    warn!(%handle, error = %e, "read failed, answering exhausted");
                    PendingRead::Ready(None)
                }
            }
        };

        match pending {
            PendingRead::Ready(byte) => {
                let bytes: Vec<u8> = byte.into_iter().collect();
                self.reply(handle, &bytes);
            }
            PendingRead::Prompt(line) => {
                let host = self.clone();
                tokio::spawn(async move {
                    let Ok(line) = line.await else {
                        debug!(%handle, "prompt dropped before input arrived");
                        return;
                    };
                    if host.options.echo_input {
                        host.open.console.append(line_body(line.as_bytes()));
                        host.open.console.append(b"\n");
                    }
                    host.reply(handle, line.as_bytes());
                });
            }
            PendingRead::Remote(stream) => {
                let host = self.clone();
                tokio::spawn(async move {
                    let byte = stream.read().await;
                    let bytes: Vec<u8> = byte.into_iter().collect();
                    host.reply(handle, &bytes);
                });
            }
        }
    }

    async fn apply_output(&self, handle: Handle, bytes: &[u8]) {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let result = state
            .streams
            .get_mut(handle)
            .and_then(|stream| stream.write(state.store.as_mut(), bytes));
        if let Err(e) = result {
            warn!(%handle, error = %e, "dropping output");
        }
    }

    fn reply(&self, handle: Handle, bytes: &[u8]) {
        if self.outbox.send(Message::input_response(handle, bytes)).is_err() {
            warn!(%handle, "worker gone before input could be delivered");
        }
    }
}

/// Apply worker messages until the worker side of the channel closes.
pub async fn serve(host: HostContext, mut inbox: Inbox) {
    while let Some(message) = inbox.recv().await {
        host.dispatch(message).await;
    }
    info!("worker channel closed, host loop finished");
}
