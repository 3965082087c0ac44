use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::application::Application;
use crate::host::HostContext;
use crate::init::{initialize, InitOptions};
use crate::script::ScriptInterpreter;
use crate::stream::{Console, ConsoleEvent};
use crate::types::RunOutcome;

#[derive(Parser, Debug)]
#[command(name = "tether")]
#[command(about = "Tether - run stream scripts against a sandboxed worker", long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default search)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory for persistent targets (overrides config)
    #[arg(long, global = true)]
    pub storage_dir: Option<PathBuf>,

    /// Directory file:// resources resolve against (overrides config)
    #[arg(long, global = true)]
    pub remote_root: Option<PathBuf>,

    /// Echo console input into the transcript
    #[arg(long, global = true)]
    pub echo_input: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a script, prompting on stdin for interactive reads
    Run {
        /// Script source file
        script: PathBuf,

        /// Module to run (default: the one the script declares)
        #[arg(long)]
        entry: Option<String>,

        /// Run the worker in a separate process
        #[arg(long)]
        isolated: bool,
    },

    /// Serve the execution context over stdin/stdout
    Worker,

    /// Print the effective configuration as TOML
    Config,

    /// Print what a persistent target currently stores
    Storage {
        /// Target name, as passed to `bind`
        target: String,
    },
}

/// Run the CLI by parsing process arguments
pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    run_cli_with_args(cli).await
}

/// Run the CLI with provided arguments (for embedders that filter args)
pub async fn run_cli_from_args(args: Vec<String>) -> Result<()> {
    let cli = Cli::parse_from(args);
    run_cli_with_args(cli).await
}

async fn run_cli_with_args(cli: Cli) -> Result<()> {
    let app = initialize(InitOptions {
        config_path: cli.config,
        storage_dir: cli.storage_dir,
        remote_root: cli.remote_root,
        echo_input: cli.echo_input.then_some(true),
    })
    .await?;
    init_tracing(&app.config().logging.filter);

    match cli.command {
        Commands::Run {
            script,
            entry,
            isolated,
        } => {
            let source = tokio::fs::read(&script)
                .await
                .with_context(|| format!("Failed to read {}", script.display()))?;
            let outcome = run_script(&app, source, entry, isolated).await?;

            if let Some(error) = outcome.report.strip_prefix("Error: ") {
                anyhow::bail!("{}", error);
            }
            info!(report = %outcome.report, finished_at = %outcome.finished_at, "run complete");
        }

        Commands::Worker => {
            app.serve_worker(tokio::io::stdin(), tokio::io::stdout(), ScriptInterpreter::new())
                .await?;
        }

        Commands::Config => {
            print!("{}", app.config().to_toml_string()?);
        }

        Commands::Storage { target } => match app.stored(&target)? {
            Some(bytes) => {
                let mut stdout = tokio::io::stdout();
                stdout.write_all(&bytes).await?;
                stdout.flush().await?;
            }
            None => eprintln!("Nothing stored for {}", target),
        },
    }

    Ok(())
}

/// Install the stderr subscriber. `RUST_LOG` wins over the configured filter.
fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    // Already installed (embedded use) is fine.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn run_script(
    app: &Application,
    source: Vec<u8>,
    entry: Option<String>,
    isolated: bool,
) -> Result<RunOutcome> {
    let session = if isolated {
        let program = std::env::current_exe().context("Cannot locate the tether binary")?;
        app.spawn_isolated(&program)?
    } else {
        app.start(ScriptInterpreter::new())?
    };

    session.submit(source, entry)?;
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let outcome = drive_console(session.host(), stdin, &mut stdout).await;

    session.shutdown().await;
    outcome
}

/* ===================== Console ===================== */

/// Mirror the console to `output` and answer prompts from `input` until the
/// run completes.
pub async fn drive_console<R, W>(host: &HostContext, input: R, output: &mut W) -> Result<RunOutcome>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let console = host.console();
    let mut events = console.subscribe();
    let mut lines = input.lines();
    let mut printed = 0;

    let completion = host.wait_for_completion();
    tokio::pin!(completion);

    loop {
        if console.waiting() > 0 {
            printed = flush_transcript(console, printed, output).await?;
            let line = lines
                .next_line()
                .await?
                .context("Input closed while the program was waiting for a line")?;
            host.deliver_input(&line);
            continue;
        }

        tokio::select! {
            outcome = &mut completion => {
                flush_transcript(console, printed, output).await?;
                return outcome.context("Worker stopped before reporting completion");
            }
            event = events.recv() => match event {
                Ok(ConsoleEvent::Output(_)) | Err(RecvError::Lagged(_)) => {
                    printed = flush_transcript(console, printed, output).await?;
                }
                Ok(ConsoleEvent::Prompt) => {}
                Err(RecvError::Closed) => anyhow::bail!("Console closed"),
            }
        }
    }
}

/// Write transcript bytes past `printed`; returns the new offset.
async fn flush_transcript<W: AsyncWrite + Unpin>(
    console: &Console,
    printed: usize,
    output: &mut W,
) -> Result<usize> {
    let transcript = console.transcript_bytes();
    if let Some(fresh) = transcript.get(printed..) {
        output.write_all(fresh).await?;
        output.flush().await?;
    }
    Ok(transcript.len())
}
