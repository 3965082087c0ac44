//! Script AST, frames and the syscalls the VM yields

use serde::{Deserialize, Serialize};

use crate::types::Handle;

/* ===================== AST ===================== */

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum Stmt {
    Block { body: Vec<Stmt> },
    Bind { handle: Handle, target: String },
    Write { handle: Handle, text: String },
    /// Copy bytes through the first '\n' (inclusive) or exhaustion
    Line { from: Handle, to: Handle },
    /// Copy bytes until `from` is exhausted
    Copy { from: Handle, to: Handle },
    /// Write a random number in decimal
    Random { handle: Handle },
    Repeat { count: u32, body: Box<Stmt> },
}

/// One loaded script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    pub body: Stmt,
}

/* ===================== Syscalls ===================== */

/// Stream operation the VM needs the driver to perform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum Syscall {
    Bind { handle: Handle, target: String },
    Read { handle: Handle },
    Write { handle: Handle, bytes: Vec<u8> },
    Random,
}

/// What the driver hands back after a syscall
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum Resume {
    Unit,
    Byte(Option<u8>),
    Number(u64),
}

/* ===================== Control ===================== */

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum Control {
    None,
    /// Waiting on the driver to perform this syscall
    Suspend(Syscall),
    /// Execution stopped with an error
    Throw(String),
}

/* ===================== Phases ===================== */

/// Statements that issue one syscall and finish
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum CallPhase {
    Issue = 0,
    Await = 1,
}

/// `line` and `copy`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "p")]
pub enum TransferPhase {
    Read,
    Forward,
    Written { byte: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum RandomPhase {
    Draw = 0,
    Emit = 1,
    Await = 2,
}

/* ===================== Frames ===================== */

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum FrameKind {
    Block { idx: usize },
    Call { phase: CallPhase },
    Transfer { phase: TransferPhase },
    Random { phase: RandomPhase },
    Repeat { remaining: u32 },
}

/// One active statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    #[serde(flatten)]
    pub kind: FrameKind,
    pub node: Stmt,
}
