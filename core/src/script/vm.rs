//! Virtual machine state and the step function
//!
//! All execution state lives in `frames`, so a VM suspended on a syscall can
//! be serialized and resumed later. `step` never performs I/O; it yields a
//! [`Syscall`] and waits for [`VM::resume`].

use serde::{Deserialize, Serialize};

use crate::types::Handle;

use super::types::{
    CallPhase, Control, Frame, FrameKind, RandomPhase, Resume, Stmt, Syscall, TransferPhase,
};

/* ===================== VM ===================== */

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VM {
    pub frames: Vec<Frame>,
    pub control: Control,
    /// Answer to the last syscall, consumed by the frame that issued it
    pub resume_value: Option<Resume>,
}

impl VM {
    pub fn new(program: &Stmt) -> Self {
        let mut vm = VM {
            frames: vec![],
            control: Control::None,
            resume_value: None,
        };
        push_stmt(&mut vm, program);
        vm
    }

    /// Hand the result of the pending syscall back to the VM.
    pub fn resume(&mut self, value: Resume) {
        if matches!(self.control, Control::Suspend(_)) {
            self.control = Control::None;
        }
        self.resume_value = Some(value);
    }

    pub fn is_suspended(&self) -> bool {
        matches!(self.control, Control::Suspend(_))
    }

    pub fn error(&self) -> Option<&str> {
        match &self.control {
            Control::Throw(message) => Some(message),
            _ => None,
        }
    }
}

/// Result of executing one step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Continue,
    /// Perform this, then call [`VM::resume`]
    Syscall(Syscall),
    Done,
}

/* ===================== Frame management ===================== */

pub fn push_stmt(vm: &mut VM, stmt: &Stmt) {
    let kind = match stmt {
        Stmt::Block { .. } => FrameKind::Block { idx: 0 },
        Stmt::Bind { .. } | Stmt::Write { .. } => FrameKind::Call {
            phase: CallPhase::Issue,
        },
        Stmt::Line { .. } | Stmt::Copy { .. } => FrameKind::Transfer {
            phase: TransferPhase::Read,
        },
        Stmt::Random { .. } => FrameKind::Random {
            phase: RandomPhase::Draw,
        },
        Stmt::Repeat { count, .. } => FrameKind::Repeat { remaining: *count },
    };

    vm.frames.push(Frame {
        kind,
        node: stmt.clone(),
    });
}

fn set_kind(vm: &mut VM, kind: FrameKind) {
    if let Some(frame) = vm.frames.last_mut() {
        frame.kind = kind;
    }
}

fn suspend(vm: &mut VM, call: Syscall) -> Step {
    vm.control = Control::Suspend(call.clone());
    Step::Syscall(call)
}

fn throw(vm: &mut VM, message: impl Into<String>) -> Step {
    vm.control = Control::Throw(message.into());
    vm.frames.clear();
    Step::Done
}

/* ===================== Step ===================== */

pub fn step(vm: &mut VM) -> Step {
    match &vm.control {
        Control::Suspend(call) if vm.resume_value.is_none() => return Step::Syscall(call.clone()),
        Control::Throw(_) => return Step::Done,
        _ => {}
    }

    let Some(frame) = vm.frames.last() else {
        return Step::Done;
    };
    let (kind, node) = (frame.kind.clone(), frame.node.clone());

    match (kind, node) {
        (FrameKind::Block { idx }, Stmt::Block { body }) => execute_block(vm, idx, &body),
        (FrameKind::Call { phase }, node @ (Stmt::Bind { .. } | Stmt::Write { .. })) => {
            execute_call(vm, phase, node)
        }
        (FrameKind::Transfer { phase }, Stmt::Line { from, to }) => {
            execute_transfer(vm, phase, from, to, true)
        }
        (FrameKind::Transfer { phase }, Stmt::Copy { from, to }) => {
            execute_transfer(vm, phase, from, to, false)
        }
        (FrameKind::Random { phase }, Stmt::Random { handle }) => {
            execute_random(vm, phase, handle)
        }
        (FrameKind::Repeat { remaining }, Stmt::Repeat { body, .. }) => {
            execute_repeat(vm, remaining, &body)
        }
        (kind, node) => throw(
            vm,
            format!("frame {:?} does not match statement {:?}", kind, node),
        ),
    }
}

/* ===================== Statement handlers ===================== */

fn execute_block(vm: &mut VM, idx: usize, body: &[Stmt]) -> Step {
    let Some(child) = body.get(idx) else {
        vm.frames.pop();
        return Step::Continue;
    };
    set_kind(vm, FrameKind::Block { idx: idx + 1 });
    push_stmt(vm, child);
    Step::Continue
}

fn execute_repeat(vm: &mut VM, remaining: u32, body: &Stmt) -> Step {
    if remaining == 0 {
        vm.frames.pop();
        return Step::Continue;
    }
    set_kind(
        vm,
        FrameKind::Repeat {
            remaining: remaining - 1,
        },
    );
    push_stmt(vm, body);
    Step::Continue
}

fn execute_call(vm: &mut VM, phase: CallPhase, node: Stmt) -> Step {
    match phase {
        CallPhase::Issue => {
            let call = match node {
                Stmt::Bind { handle, target } => Syscall::Bind { handle, target },
                Stmt::Write { handle, text } => Syscall::Write {
                    handle,
                    bytes: text.into_bytes(),
                },
                other => return throw(vm, format!("not a call statement: {:?}", other)),
            };
            set_kind(
                vm,
                FrameKind::Call {
                    phase: CallPhase::Await,
                },
            );
            suspend(vm, call)
        }
        CallPhase::Await => match vm.resume_value.take() {
            Some(Resume::Unit) => {
                vm.frames.pop();
                Step::Continue
            }
            other => throw(vm, format!("call resumed with {:?}", other)),
        },
    }
}

fn execute_transfer(
    vm: &mut VM,
    phase: TransferPhase,
    from: Handle,
    to: Handle,
    stop_at_newline: bool,
) -> Step {
    match phase {
        TransferPhase::Read => {
            set_kind(
                vm,
                FrameKind::Transfer {
                    phase: TransferPhase::Forward,
                },
            );
            suspend(vm, Syscall::Read { handle: from })
        }
        TransferPhase::Forward => match vm.resume_value.take() {
            Some(Resume::Byte(None)) => {
                vm.frames.pop();
                Step::Continue
            }
            Some(Resume::Byte(Some(byte))) => {
                set_kind(
                    vm,
                    FrameKind::Transfer {
                        phase: TransferPhase::Written { byte },
                    },
                );
                suspend(
                    vm,
                    Syscall::Write {
                        handle: to,
                        bytes: vec![byte],
                    },
                )
            }
            other => throw(vm, format!("read resumed with {:?}", other)),
        },
        TransferPhase::Written { byte } => match vm.resume_value.take() {
            Some(Resume::Unit) => {
                if stop_at_newline && byte == b'\n' {
                    vm.frames.pop();
                } else {
                    set_kind(
                        vm,
                        FrameKind::Transfer {
                            phase: TransferPhase::Read,
                        },
                    );
                }
                Step::Continue
            }
            other => throw(vm, format!("write resumed with {:?}", other)),
        },
    }
}

fn execute_random(vm: &mut VM, phase: RandomPhase, handle: Handle) -> Step {
    match phase {
        RandomPhase::Draw => {
            set_kind(
                vm,
                FrameKind::Random {
                    phase: RandomPhase::Emit,
                },
            );
            suspend(vm, Syscall::Random)
        }
        RandomPhase::Emit => match vm.resume_value.take() {
            Some(Resume::Number(n)) => {
                set_kind(
                    vm,
                    FrameKind::Random {
                        phase: RandomPhase::Await,
                    },
                );
                suspend(
                    vm,
                    Syscall::Write {
                        handle,
                        bytes: n.to_string().into_bytes(),
                    },
                )
            }
            other => throw(vm, format!("random resumed with {:?}", other)),
        },
        RandomPhase::Await => match vm.resume_value.take() {
            Some(Resume::Unit) => {
                vm.frames.pop();
                Step::Continue
            }
            other => throw(vm, format!("write resumed with {:?}", other)),
        },
    }
}
