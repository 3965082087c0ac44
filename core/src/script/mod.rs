//! # Stream scripts
//!
//! A small line-oriented language for driving handle-indexed streams. It is
//! the interpreter the `tether` binary runs inside the worker.
//!
//! Execution is stack-driven: all state sits in [`VM::frames`], each `step`
//! either continues, completes, or yields a [`Syscall`]. The async driver in
//! [`exec_loop`] performs the syscall through the worker context and resumes.

pub mod exec_loop;
pub mod parser;
pub mod types;
pub mod vm;


use std::collections::HashMap;

use tracing::info;

use crate::error::{BridgeError, Result};
use crate::worker::{Interpreter, RunFuture, WorkerContext};

pub use exec_loop::run_until_done;
pub use parser::{parse_module, ParseError, DEFAULT_MODULE};
pub use types::{Module, Resume, Stmt, Syscall};
pub use vm::{step, Step, VM};

/// [`Interpreter`] over script sources. Archives are UTF-8 script text.
#[derive(Debug, Default)]
pub struct ScriptInterpreter {
    modules: HashMap<String, Module>,
    last_loaded: Option<String>,
}

impl ScriptInterpreter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn modules(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.modules.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn resolve(&self, entry: Option<&str>) -> Result<&Module> {
        let name = match entry {
            Some(name) => name,
            None => self
                .last_loaded
                .as_deref()
                .ok_or_else(|| BridgeError::Interpreter("no module loaded".to_string()))?,
        };
        self.modules
            .get(name)
            .ok_or_else(|| BridgeError::Interpreter(format!("unknown module: {}", name)))
    }
}

impl Interpreter for ScriptInterpreter {
    fn load_archive(&mut self, archive: &[u8]) -> Result<String> {
        let source = std::str::from_utf8(archive)
            .map_err(|e| BridgeError::Interpreter(format!("script is not UTF-8: {}", e)))?;
        let module = parse_module(source)?;
        let name = module.name.clone();

        self.modules.insert(name.clone(), module);
        self.last_loaded = Some(name.clone());
        Ok(name)
    }

    fn run<'a>(&'a mut self, entry: Option<String>, io: WorkerContext) -> RunFuture<'a> {
        Box::pin(async move {
            let module = self.resolve(entry.as_deref())?;
            info!(module = %module.name, "running script");

            let mut vm = VM::new(&module.body);
            run_until_done(&mut vm, &io).await?;
            Ok(format!("{} finished", module.name))
        })
    }
}
