//! Async driver: steps the VM and performs its syscalls through the worker
//! context.

use tracing::debug;

use super::types::{Resume, Syscall};
use super::vm::{step, Step, VM};
use crate::error::{BridgeError, Result};
use crate::worker::WorkerContext;

/// Steps between cooperative yields when a script never touches a stream
const YIELD_EVERY: usize = 1024;

/// Run the VM until it completes or fails.
pub async fn run_until_done(vm: &mut VM, io: &WorkerContext) -> Result<()> {
    let mut quiet_steps = 0;
    loop {
        match step(vm) {
            Step::Continue => {
                quiet_steps += 1;
                if quiet_steps == YIELD_EVERY {
                    quiet_steps = 0;
                    tokio::task::yield_now().await;
                }
            }
            Step::Syscall(call) => {
                quiet_steps = 0;
                let value = perform(&call, io).await?;
                vm.resume(value);
            }
            Step::Done => break,
        }
    }

    match vm.error() {
        Some(message) => Err(BridgeError::Interpreter(message.to_string())),
        None => Ok(()),
    }
}

async fn perform(call: &Syscall, io: &WorkerContext) -> Result<Resume> {
    debug!(?call, "syscall");
    match call {
        Syscall::Bind { handle, target } => {
            io.bind(*handle, target).await?;
            Ok(Resume::Unit)
        }
        Syscall::Read { handle } => Ok(Resume::Byte(io.read(*handle).await?)),
        Syscall::Write { handle, bytes } => {
            io.write_all(*handle, bytes).await?;
            Ok(Resume::Unit)
        }
        Syscall::Random => Ok(Resume::Number(io.random()?)),
    }
}
