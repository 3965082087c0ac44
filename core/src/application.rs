//! The Tether application instance
//!
//! Wires a host context to a worker: in-process over a channel pair, over any
//! framed byte stream, or as a child `tether worker` process.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::fetch::{FileFetcher, Fetcher, HttpFetcher, SchemeFetcher};
use crate::host::{self, HostContext, HostOptions};
use crate::protocol::{framing, pair, Endpoint, FramedTransport};
use crate::storage::{storage_key, FileStore, KeyValueStore, MemoryStore};
use crate::types::RunOutcome;
use crate::worker::{self, Interpreter};

/// How long an isolated worker gets to exit after its stdin closes
const CHILD_EXIT_GRACE: Duration = Duration::from_secs(2);

pub struct Application {
    pub config: Config,
}

impl Application {
    /// Pure instantiation, no I/O
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn host_options(&self) -> HostOptions {
        HostOptions {
            sentinel: self.config.streams.interactive_sentinel.clone(),
            key_prefix: self.config.storage.key_prefix.clone(),
            echo_input: self.config.streams.echo_input,
        }
    }

    /// Directory store when `storage.dir` is set, otherwise in-memory
    pub fn open_store(&self) -> Result<Box<dyn KeyValueStore>> {
        match &self.config.storage.dir {
            Some(dir) => Ok(Box::new(FileStore::open(dir)?)),
            None => Ok(Box::new(MemoryStore::new())),
        }
    }

    /// `file://` under `remote.root`, `http(s)://` over the network
    pub fn fetcher(&self) -> Result<Arc<dyn Fetcher>> {
        let file = FileFetcher::new(self.config.remote.root.clone());
        Ok(Arc::new(SchemeFetcher::new(file, HttpFetcher::new()?)))
    }

    /// What a persistent target currently holds in the configured store
    pub fn stored(&self, target: &str) -> Result<Option<Vec<u8>>> {
        let store = self.open_store()?;
        Ok(store.get(&storage_key(&self.config.storage.key_prefix, target))?)
    }

    /* ===================== Host side ===================== */

    /// Run `interpreter` in this process, on its own task.
    pub fn start<I: Interpreter>(&self, interpreter: I) -> Result<Session> {
        let (worker_end, host_end) = pair();
        let sentinel = self.config.streams.interactive_sentinel.clone();
        let worker = tokio::spawn(async move { worker::serve(worker_end, interpreter, &sentinel).await });

        let mut session = self.attach(host_end)?;
        session.worker = Some(worker);
        Ok(session)
    }

    /// Host a worker reachable through `endpoint`.
    pub fn attach(&self, endpoint: Endpoint) -> Result<Session> {
        let Endpoint { outbox, inbox } = endpoint;
        let host = HostContext::new(
            outbox,
            self.open_store()?,
            self.fetcher()?,
            self.host_options(),
        );
        let host_loop = tokio::spawn(host::serve(host.clone(), inbox));

        Ok(Session {
            host,
            host_loop,
            worker: None,
            transport: None,
            child: None,
        })
    }

    /// Host a worker that speaks newline-delimited JSON on `reader`/`writer`.
    pub fn attach_framed<R, W>(&self, reader: R, writer: W) -> Result<Session>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (endpoint, transport) = framing::connect(reader, writer, CancellationToken::new());
        let mut session = self.attach(endpoint)?;
        session.transport = Some(transport);
        Ok(session)
    }

    /// Spawn `program worker` and host it over the child's stdio.
    pub fn spawn_isolated(&self, program: &Path) -> Result<Session> {
        let mut child = Command::new(program)
            .arg("worker")
            .env(
                "TETHER_STREAMS__INTERACTIVE_SENTINEL",
                &self.config.streams.interactive_sentinel,
            )
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn worker {}", program.display()))?;

        let stdin = child.stdin.take().context("worker stdin not captured")?;
        let stdout = child.stdout.take().context("worker stdout not captured")?;
        info!(pid = ?child.id(), "spawned isolated worker");

        let mut session = self.attach_framed(stdout, stdin)?;
        session.child = Some(child);
        Ok(session)
    }

    /* ===================== Worker side ===================== */

    /// Serve the execution context over a framed byte stream until the host
    /// closes it.
    pub async fn serve_worker<R, W, I>(&self, reader: R, writer: W, interpreter: I) -> Result<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
        I: Interpreter,
    {
        let (endpoint, transport) = framing::connect(reader, writer, CancellationToken::new());
        worker::serve(endpoint, interpreter, &self.config.streams.interactive_sentinel).await?;

        // Let the completion report reach the host before the pumps stop.
        if let Err(e) = transport.writer.await {
            warn!(error = %e, "frame writer task failed");
        }
        transport.reader.abort();
        Ok(())
    }
}

/// A host context attached to a running worker
pub struct Session {
    host: HostContext,
    host_loop: JoinHandle<()>,
    worker: Option<JoinHandle<crate::error::Result<()>>>,
    transport: Option<FramedTransport>,
    child: Option<Child>,
}

impl Session {
    pub fn host(&self) -> &HostContext {
        &self.host
    }

    /// Load `archive` and start running `entry`.
    pub fn submit(&self, archive: Vec<u8>, entry: Option<String>) -> Result<()> {
        self.host.load_archive(archive)?;
        self.host.run(entry)?;
        Ok(())
    }

    /// Submit and wait for the completion report.
    ///
    /// Nothing answers interactive prompts here; use [`Session::submit`] and
    /// drive [`HostContext::console`] for programs that read from a person.
    pub async fn execute(&self, archive: Vec<u8>, entry: Option<String>) -> Result<RunOutcome> {
        self.submit(archive, entry)?;
        self.host
            .wait_for_completion()
            .await
            .context("worker stopped before reporting completion")
    }

    pub async fn shutdown(self) {
        self.host_loop.abort();
        if let Some(worker) = self.worker {
            worker.abort();
        }
        if let Some(transport) = &self.transport {
            transport.shutdown();
        }
        if let Some(mut child) = self.child {
            match tokio::time::timeout(CHILD_EXIT_GRACE, child.wait()).await {
                Ok(Ok(status)) => info!(%status, "worker exited"),
                Ok(Err(e)) => warn!(error = %e, "failed waiting on worker"),
                Err(_) => {
                    warn!("worker did not exit, killing it");
                    if let Err(e) = child.kill().await {
                        warn!(error = %e, "failed to kill worker");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::ScriptInterpreter;

    fn app(dir: Option<&Path>) -> Application {
        let mut config = Config::default();
        config.storage.dir = dir.map(Path::to_path_buf);
        Application::new(config)
    }

    #[tokio::test]
    async fn test_in_process_session_persists_to_directory() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(Some(dir.path()));
        let session = app.start(ScriptInterpreter::new()).unwrap();

        let outcome = session
            .execute(b"bind 4 \"log\" write 4 \"ok\"".to_vec(), None)
            .await
            .unwrap();
        assert_eq!(outcome.report, "main finished");
        session.shutdown().await;

        // A fresh application sees what the run stored.
        assert_eq!(app.stored("log").unwrap(), Some(b"ok".to_vec()));
    }

    #[tokio::test]
    async fn test_framed_worker_round_trip() {
        let app = Arc::new(app(None));
        let (host_io, worker_io) = tokio::io::duplex(4096);
        let (worker_read, worker_write) = tokio::io::split(worker_io);
        let (host_read, host_write) = tokio::io::split(host_io);

        let worker = tokio::spawn({
            let app = app.clone();
            async move {
                app.serve_worker(worker_read, worker_write, ScriptInterpreter::new())
                    .await
            }
        });

        let session = app.attach_framed(host_read, host_write).unwrap();
        let outcome = session
            .execute(
                b"module \"framed\" bind 2 \"n\" write 2 \"a\\tb\" bind 3 \"m\" copy 2 -> 3".to_vec(),
                Some("framed".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(outcome.report, "framed finished");
        assert_eq!(session.host().stored("m").await.unwrap(), Some(b"a\tb".to_vec()));

        session.shutdown().await;
        worker.await.unwrap().unwrap();
    }
}
