pub mod application;
pub mod cli;
pub mod config;
pub mod error;
pub mod fetch;
pub mod host;
pub mod init;
pub mod pending;
pub mod protocol;
pub mod random;
pub mod registry;
pub mod script;
pub mod storage;
pub mod stream;
pub mod types;
pub mod worker;

// Re-export main types
pub use types::*;

pub use application::{Application, Session};
pub use error::{BridgeError, Result};
pub use host::{HostContext, HostOptions};
pub use worker::{Interpreter, WorkerContext};

// Re-export init API for convenience
pub use init::{initialize, InitBuilder, InitOptions};
