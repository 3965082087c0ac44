/// Tether CLI
///
/// Runs stream scripts against a worker, either in-process or as an isolated
/// child, and doubles as that child via `tether worker`.

use tether_core::cli;

#[tokio::main]
async fn main() {
    if let Err(e) = cli::run_cli().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
