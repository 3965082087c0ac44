use crate::error::Result;
use crate::storage::KeyValueStore;

/// Cursor over a byte sequence kept in the host's key-value store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistentStream {
    key: String,
    cursor: usize,
}

impl PersistentStream {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            cursor: 0,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Next stored byte, or `None` when nothing is stored or the cursor is at
    /// the end. The cursor only moves when a byte is returned.
    pub fn read(&mut self, store: &dyn KeyValueStore) -> Result<Option<u8>> {
        let Some(stored) = store.get(&self.key)? else {
            return Ok(None);
        };

        match stored.get(self.cursor) {
            Some(&byte) => {
                self.cursor += 1;
                Ok(Some(byte))
            }
            None => Ok(None),
        }
    }

    pub fn write(&self, store: &mut dyn KeyValueStore, bytes: &[u8]) -> Result<()> {
        store.append(&self.key, bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn test_round_trip_then_exhausted() {
        let mut store = MemoryStore::new();
        let mut stream = PersistentStream::new("path-save");

        for byte in b"hi!" {
            stream.write(&mut store, &[*byte]).unwrap();
        }

        assert_eq!(stream.read(&store).unwrap(), Some(b'h'));
        assert_eq!(stream.read(&store).unwrap(), Some(b'i'));
        assert_eq!(stream.read(&store).unwrap(), Some(b'!'));
        assert_eq!(stream.read(&store).unwrap(), None);
        assert_eq!(stream.read(&store).unwrap(), None);
        assert_eq!(stream.cursor(), 3);
    }

    #[test]
    fn test_missing_key_reads_exhausted_without_moving() {
        let store = MemoryStore::new();
        let mut stream = PersistentStream::new("path-none");
        assert_eq!(stream.read(&store).unwrap(), None);
        assert_eq!(stream.cursor(), 0);
    }

    #[test]
    fn test_reads_see_later_appends() {
        let mut store = MemoryStore::new();
        let mut stream = PersistentStream::new("path-log");

        stream.write(&mut store, b"a").unwrap();
        assert_eq!(stream.read(&store).unwrap(), Some(b'a'));
        assert_eq!(stream.read(&store).unwrap(), None);

        stream.write(&mut store, b"b").unwrap();
        assert_eq!(stream.read(&store).unwrap(), Some(b'b'));
    }
}
