//! Per-context handle → stream registry

use std::collections::HashMap;

use tracing::debug;

use crate::error::{BridgeError, Result};
use crate::types::Handle;

/// Maps handles to the streams bound in one context.
///
/// Each context owns exactly one registry; nothing here is global.
#[derive(Debug)]
pub struct StreamRegistry<S> {
    streams: HashMap<Handle, S>,
}

impl<S> StreamRegistry<S> {
    pub fn new() -> Self {
        Self {
            streams: HashMap::new(),
        }
    }

    /// Bind `handle` to `stream`, returning the stream it replaced.
    ///
    /// The replaced stream is dropped by the caller along with any buffered
    /// state it held.
    pub fn bind(&mut self, handle: Handle, stream: S) -> Option<S> {
        let previous = self.streams.insert(handle, stream);
        if previous.is_some() {
            debug!(%handle, "rebinding handle");
        }
        previous
    }

    pub fn get(&self, handle: Handle) -> Result<&S> {
        self.streams
            .get(&handle)
            .ok_or(BridgeError::UnboundHandle(handle))
    }

    pub fn get_mut(&mut self, handle: Handle) -> Result<&mut S> {
        self.streams
            .get_mut(&handle)
            .ok_or(BridgeError::UnboundHandle(handle))
    }

    pub fn unbind(&mut self, handle: Handle) -> Option<S> {
        self.streams.remove(&handle)
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.streams.contains_key(&handle)
    }

    /// Bound handles in ascending order
    pub fn handles(&self) -> Vec<Handle> {
        let mut handles: Vec<Handle> = self.streams.keys().copied().collect();
        handles.sort();
        handles
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}

impl<S> Default for StreamRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}
