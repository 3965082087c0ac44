//! Execution context: the side of the channel the interpreter runs in

pub mod context;
pub mod runner;


pub use context::{WorkerContext, WorkerStream};
pub use runner::{serve, Interpreter, RunFuture};
