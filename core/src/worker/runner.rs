//! Worker dispatch loop
//!
//! Owns the interpreter for the lifetime of the execution context. Messages
//! from the host are applied in arrival order; a `run` spawns the interpreter
//! so the loop keeps delivering input responses while the program is
//! suspended on a read. The loop never waits on the interpreter: archives
//! that arrive mid-run are queued and loaded when the run ends, or before
//! the next run starts.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::context::WorkerContext;
use crate::error::Result;
use crate::protocol::{Endpoint, Message, Outbox};

pub type RunFuture<'a> = Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;

/// Archives received while the interpreter was busy
type Deferred = Arc<Mutex<VecDeque<Vec<u8>>>>;

/// The bytecode interpreter, seen as a black box
pub trait Interpreter: Send + 'static {
    /// Load an archive; returns the name of the module it provided.
    fn load_archive(&mut self, archive: &[u8]) -> Result<String>;

    /// Run `entry` (or the interpreter's default) to completion, doing all
    /// stream I/O through `io`. The returned string is the completion report.
    fn run<'a>(&'a mut self, entry: Option<String>, io: WorkerContext) -> RunFuture<'a>;
}

/// Serve the execution context until the host side of the channel closes.
///
/// Returns once the inbox is exhausted. Any read still suspended at that
/// point fails with `ChannelClosed`.
pub async fn serve<I: Interpreter>(endpoint: Endpoint, interpreter: I, sentinel: &str) -> Result<()> {
    let Endpoint { outbox, mut inbox } = endpoint;
    let context = WorkerContext::new(outbox.clone(), sentinel);
    let interpreter = Arc::new(Mutex::new(interpreter));
    let deferred: Deferred = Arc::default();
    let mut running: Option<JoinHandle<()>> = None;

    while let Some(message) = inbox.recv().await {
        match message {
            Message::LoadJar(archive) => match interpreter.try_lock() {
                Ok(mut guard) => {
                    load_deferred(&mut *guard, &deferred).await;
                    load(&mut *guard, &archive);
                }
                Err(_) => {
                    debug!(bytes = archive.len(), "run in progress, deferring archive");
                    deferred.lock().await.push_back(archive);
                }
            },
            Message::Run(entry) => {
                if running.as_ref().is_some_and(|task| !task.is_finished()) {
                    warn!("ignoring run while a program is already running");
                    continue;
                }
                running = Some(spawn_run(
                    interpreter.clone(),
                    deferred.clone(),
                    entry,
                    context.clone(),
                    outbox.clone(),
                ));
            }
            other => context.dispatch(other).await,
        }
    }

    info!("host channel closed, worker shutting down");
    context.abandon_pending().await;
    if let Some(task) = running {
        if let Err(e) = task.await {
            error!(error = %e, "interpreter task panicked");
        }
    }

    Ok(())
}

fn load<I: Interpreter>(interpreter: &mut I, archive: &[u8]) {
    match interpreter.load_archive(archive) {
        Ok(module) => info!(%module, bytes = archive.len(), "loaded archive"),
        Err(e) => error!(error = %e, "failed to load archive"),
    }
}

/// Apply queued archives in arrival order.
async fn load_deferred<I: Interpreter>(interpreter: &mut I, deferred: &Deferred) {
    let archives: Vec<Vec<u8>> = deferred.lock().await.drain(..).collect();
    for archive in archives {
        load(interpreter, &archive);
    }
}

fn spawn_run<I: Interpreter>(
    interpreter: Arc<Mutex<I>>,
    deferred: Deferred,
    entry: Option<String>,
    context: WorkerContext,
    outbox: Outbox,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(entry = ?entry, "run started");
        let report = {
            let mut guard = interpreter.lock().await;
            load_deferred(&mut *guard, &deferred).await;
            let report = match guard.run(entry, context).await {
                Ok(report) => report,
                Err(e) => {
                    error!(error = %e, "run failed");
                    format!("Error: {}", e)
                }
            };
            load_deferred(&mut *guard, &deferred).await;
            report
        };
        info!(%report, "run finished");

        if outbox.send(Message::Run(Some(report))).is_err() {
            warn!("host gone before completion could be reported");
        }
    })
}
