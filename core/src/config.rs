//! Layered configuration
//!
//! Precedence, lowest first: built-in defaults, an optional TOML file
//! (`tether.toml` in the working directory, or an explicit path), `TETHER_`
//! environment variables (`__` separates sections, e.g.
//! `TETHER_STREAMS__ECHO_INPUT=true`), then builder overrides.

use std::path::PathBuf;

use anyhow::{Context, Result};
use config::{Environment, File};
use serde::{Deserialize, Serialize};

use crate::storage::DEFAULT_KEY_PREFIX;
use crate::types::INTERACTIVE_SENTINEL;

pub const ENV_PREFIX: &str = "TETHER";
pub const CONFIG_PATH_VAR: &str = "TETHER_CONFIG_PATH";
const DEFAULT_FILE: &str = "tether";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub streams: StreamsConfig,
    pub storage: StorageConfig,
    pub remote: RemoteConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamsConfig {
    /// Target string that selects the interactive console
    pub interactive_sentinel: String,
    /// Copy each delivered line into the console transcript. Off by default:
    /// a terminal feeding stdin already shows what was typed, so echoing
    /// there would print every line twice. Turn it on for piped input or
    /// when the transcript must read as a full session log.
    pub echo_input: bool,
}

impl Default for StreamsConfig {
    fn default() -> Self {
        Self {
            interactive_sentinel: INTERACTIVE_SENTINEL.to_string(),
            echo_input: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub key_prefix: String,
    /// Directory for persistent targets; in-memory when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Directory `file://` locators resolve against
    pub root: PathBuf,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive, used when `RUST_LOG` is unset
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Load from file and environment with no overrides
    pub fn load() -> Result<Self> {
        Self::builder().build()
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to render configuration")
    }
}

#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config_path: Option<PathBuf>,
    storage_dir: Option<PathBuf>,
    remote_root: Option<PathBuf>,
    echo_input: Option<bool>,
    skip_env: bool,
}

impl ConfigBuilder {
    pub fn config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    pub fn storage_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.storage_dir = dir;
        self
    }

    pub fn remote_root(mut self, root: Option<PathBuf>) -> Self {
        self.remote_root = root;
        self
    }

    pub fn echo_input(mut self, echo: Option<bool>) -> Self {
        self.echo_input = echo;
        self
    }

    /// Ignore `.env` and `TETHER_*` variables
    pub fn skip_env(mut self, skip: bool) -> Self {
        self.skip_env = skip;
        self
    }

    pub fn build(self) -> Result<Config> {
        let mut loader = config::Config::builder();

        if !self.skip_env {
            dotenvy::dotenv().ok();
        }

        let explicit = self.config_path.or_else(|| {
            if self.skip_env {
                None
            } else {
                std::env::var_os(CONFIG_PATH_VAR).map(PathBuf::from)
            }
        });
        loader = match &explicit {
            Some(path) => loader.add_source(File::from(path.as_path()).required(true)),
            None => loader.add_source(File::with_name(DEFAULT_FILE).required(false)),
        };

        if !self.skip_env {
            loader = loader.add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        if let Some(dir) = self.storage_dir {
            loader = loader.set_override("storage.dir", dir.to_string_lossy().into_owned())?;
        }
        if let Some(root) = self.remote_root {
            loader = loader.set_override("remote.root", root.to_string_lossy().into_owned())?;
        }
        if let Some(echo) = self.echo_input {
            loader = loader.set_override("streams.echo_input", echo)?;
        }

        let config = loader
            .build()
            .with_context(|| match &explicit {
                Some(path) => format!("Failed to load configuration from {}", path.display()),
                None => "Failed to load configuration".to_string(),
            })?
            .try_deserialize()
            .context("Invalid configuration")?;

        Ok(config)
    }
}
