//! Host-side streams
//!
//! A [`Stream`] is a tagged union over the three variants; the host's
//! registry holds one per bound handle and dispatches on the tag.

pub mod buffer;
pub mod console;
pub mod persistent;
pub mod remote;

use std::sync::Arc;

use tokio::sync::oneshot;

use crate::error::Result;
use crate::fetch::Fetcher;
use crate::storage::{storage_key, KeyValueStore};
use crate::types::{StreamKind, Target};

pub use buffer::{line_body, InputBuffer, OutputAccumulator};
pub use console::{Console, ConsoleEvent};
pub use persistent::PersistentStream;
pub use remote::RemoteStream;

/// What a stream needs from the host to open
#[derive(Clone)]
pub struct OpenContext {
    pub console: Console,
    pub fetcher: Arc<dyn Fetcher>,
    pub key_prefix: String,
}

#[derive(Debug)]
pub enum Stream {
    Interactive(InteractiveStream),
    Persistent(PersistentStream),
    Remote(RemoteStream),
}

/// How the host answers one read request
pub enum PendingRead {
    /// Answer available now; `None` is exhausted
    Ready(Option<u8>),
    /// Waiting on a person; resolves with the delivered line
    Prompt(oneshot::Receiver<String>),
    /// Needs the resource body, which may not be fetched yet
    Remote(RemoteStream),
}

impl Stream {
    pub fn open(target: &Target, ctx: &OpenContext) -> Self {
        match target {
            Target::Interactive => Stream::Interactive(InteractiveStream {
                console: ctx.console.clone(),
            }),
            Target::Persistent(path) => {
                Stream::Persistent(PersistentStream::new(storage_key(&ctx.key_prefix, path)))
            }
            Target::Remote(locator) => {
                Stream::Remote(RemoteStream::new(locator.clone(), ctx.fetcher.clone()))
            }
        }
    }

    pub fn kind(&self) -> StreamKind {
        match self {
            Stream::Interactive(_) => StreamKind::Interactive,
            Stream::Persistent(_) => StreamKind::Persistent,
            Stream::Remote(_) => StreamKind::Remote,
        }
    }

    pub fn begin_read(&mut self, store: &dyn KeyValueStore) -> Result<PendingRead> {
        match self {
            Stream::Interactive(stream) => Ok(PendingRead::Prompt(stream.console.prompt())),
            Stream::Persistent(stream) => Ok(PendingRead::Ready(stream.read(store)?)),
            Stream::Remote(stream) => Ok(PendingRead::Remote(stream.clone())),
        }
    }

    pub fn write(&mut self, store: &mut dyn KeyValueStore, bytes: &[u8]) -> Result<()> {
        match self {
            Stream::Interactive(stream) => {
                stream.console.append(bytes);
                Ok(())
            }
            Stream::Persistent(stream) => stream.write(store, bytes),
            Stream::Remote(stream) => {
                stream.write(bytes);
                Ok(())
            }
        }
    }
}

/// Host end of the interactive console binding
#[derive(Debug, Clone)]
pub struct InteractiveStream {
    console: Console,
}
