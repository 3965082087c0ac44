//! The host's interactive surface
//!
//! Owns the display accumulator and the queue of prompts waiting on a
//! person. A UI subscribes to [`ConsoleEvent`]s to learn when output grows and
//! when input is wanted.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{broadcast, oneshot};

use super::buffer::OutputAccumulator;
use crate::pending::WaitList;

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleEvent {
    /// Bytes appended to the transcript
    Output(Vec<u8>),
    /// A stream is waiting on a line from the person
    Prompt,
}

#[derive(Debug, Default)]
struct ConsoleState {
    transcript: OutputAccumulator,
    prompts: WaitList<String>,
}

#[derive(Debug, Clone)]
pub struct Console {
    inner: Arc<Mutex<ConsoleState>>,
    events: broadcast::Sender<ConsoleEvent>,
}

impl Console {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Mutex::new(ConsoleState::default())),
            events,
        }
    }

    fn state(&self) -> MutexGuard<'_, ConsoleState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConsoleEvent> {
        self.events.subscribe()
    }

    pub fn append(&self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        self.state().transcript.append(bytes);
        // No subscriber is fine; the transcript still holds the bytes.
        let _ = self.events.send(ConsoleEvent::Output(bytes.to_vec()));
    }

    /// Queue a prompt; the receiver resolves with the next delivered line.
    pub fn prompt(&self) -> oneshot::Receiver<String> {
        let rx = self.state().prompts.push();
        let _ = self.events.send(ConsoleEvent::Prompt);
        rx
    }

    /// Hand a line from the person to every waiting prompt.
    ///
    /// Returns the number of prompts satisfied; zero means the line was not
    /// wanted and is dropped.
    pub fn deliver(&self, line: &str) -> usize {
        self.state().prompts.resolve_all(line.to_string())
    }

    /// Prompts currently waiting on input
    pub fn waiting(&self) -> usize {
        self.state().prompts.len()
    }

    pub fn transcript(&self) -> String {
        self.state().transcript.text()
    }

    pub fn transcript_bytes(&self) -> Vec<u8> {
        self.state().transcript.as_bytes().to_vec()
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}
