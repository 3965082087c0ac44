//! Initialization for Tether
//!
//! Loads configuration and produces an [`Application`]. Embedders and the CLI
//! both go through here.
//!
//! # Example
//!
//! ```rust,no_run
//! use tether_core::init::InitBuilder;
//! use tether_core::script::ScriptInterpreter;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let app = InitBuilder::new().storage_dir("./state").init().await?;
//! let session = app.start(ScriptInterpreter::new())?;
//! let outcome = session.execute(b"bind 1 \"log\" write 1 \"hi\"".to_vec(), None).await?;
//! println!("{}", outcome.report);
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::debug;

use crate::application::Application;
use crate::config::Config;

/// Options for initializing Tether
#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    /// Config file path (overrides default search)
    pub config_path: Option<PathBuf>,

    /// Directory for persistent targets (overrides config)
    pub storage_dir: Option<PathBuf>,

    /// Directory `file://` resources resolve against (overrides config)
    pub remote_root: Option<PathBuf>,

    /// Copy delivered console lines into the transcript (overrides config)
    pub echo_input: Option<bool>,
}

/// Builder for constructing InitOptions
#[derive(Debug, Default)]
pub struct InitBuilder {
    options: InitOptions,
}

impl InitBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.options.storage_dir = Some(dir.into());
        self
    }

    pub fn remote_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.options.remote_root = Some(root.into());
        self
    }

    pub fn echo_input(mut self, echo: bool) -> Self {
        self.options.echo_input = Some(echo);
        self
    }

    pub async fn init(self) -> Result<Application> {
        initialize(self.options).await
    }
}

/// Load configuration and return an Application instance
pub async fn initialize(options: InitOptions) -> Result<Application> {
    let config = Config::builder()
        .config_path(options.config_path)
        .storage_dir(options.storage_dir)
        .remote_root(options.remote_root)
        .echo_input(options.echo_input)
        .build()
        .context("Failed to load configuration")?;
    debug!(?config, "configuration loaded");

    if let Some(dir) = &config.storage.dir {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create storage directory {}", dir.display()))?;
    }

    Ok(Application::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init_applies_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let storage = dir.path().join("state");
        let config_path = dir.path().join("tether.toml");
        std::fs::write(&config_path, "[streams]\necho_input = false\n").unwrap();

        let app = InitBuilder::new()
            .config_path(&config_path)
            .storage_dir(&storage)
            .remote_root(dir.path())
            .echo_input(true)
            .init()
            .await
            .unwrap();

        assert!(storage.is_dir());
        assert_eq!(app.config().storage.dir.as_deref(), Some(storage.as_path()));
        assert_eq!(app.config().remote.root, dir.path());
        assert!(app.host_options().echo_input);
    }

    #[tokio::test]
    async fn test_init_rejects_missing_config_file() {
        let result = InitBuilder::new()
            .config_path("/nonexistent/tether.toml")
            .init()
            .await;
        assert!(result.is_err());
    }
}
