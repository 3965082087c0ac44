//! Host-side persistent key-value storage
//!
//! Values are raw byte sequences. Writes through a stream are read-modify-write
//! appends; nothing here locks, so two bindings on the same path race.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::{BridgeError, Result};

/// Default prefix combined with a binding target to form its storage key
pub const DEFAULT_KEY_PREFIX: &str = "path-";

/// Storage key for a persistent binding target
pub fn storage_key(prefix: &str, target: &str) -> String {
    format!("{}{}", prefix, target)
}

pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    fn set(&mut self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Append `bytes` to the value under `key`, creating it if missing.
    fn append(&mut self, key: &str, bytes: &[u8]) -> Result<()> {
        let mut stored = self.get(key)?.unwrap_or_default();
        stored.extend_from_slice(bytes);
        self.set(key, stored)
    }
}

/* ===================== In-memory ===================== */

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: HashMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: HashMap<String, Vec<u8>>) -> Self {
        Self { entries }
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: Vec<u8>) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn append(&mut self, key: &str, bytes: &[u8]) -> Result<()> {
        self.entries
            .entry(key.to_string())
            .or_default()
            .extend_from_slice(bytes);
        Ok(())
    }
}

/* ===================== Directory-backed ===================== */

/// One file per key under `root`; file names are the SHA-256 of the key so
/// arbitrary target strings are safe on disk.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| {
            BridgeError::Storage(format!("cannot create {}: {}", root.display(), e))
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.root.join(format!("{:x}.bin", digest))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match std::fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BridgeError::Storage(format!("read {}: {}", key, e))),
        }
    }

    fn set(&mut self, key: &str, value: Vec<u8>) -> Result<()> {
        std::fs::write(self.path_for(key), value)
            .map_err(|e| BridgeError::Storage(format!("write {}: {}", key, e)))
    }
}
