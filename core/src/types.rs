use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default target string selecting the interactive console
pub const INTERACTIVE_SENTINEL: &str = "<sys>";

/// Value returned to the interpreter when a stream has no more data
pub const EXHAUSTED: i32 = 0;

/// Opaque integer naming one logical stream within a context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(pub u32);

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u32> for Handle {
    fn from(value: u32) -> Self {
        Handle(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Interactive,
    Persistent,
    Remote,
}

/// What a handle is bound to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// The host's interactive console
    Interactive,
    /// A key in the host's persistent store
    Persistent(String),
    /// A fetchable, read-only resource
    Remote(String),
}

impl Target {
    /// Classify a raw binding target.
    ///
    /// Both contexts call this with the same sentinel so their registries agree
    /// on the variant behind every handle.
    pub fn parse(raw: &str, sentinel: &str) -> Self {
        if raw == sentinel {
            Target::Interactive
        } else if raw.contains("://") {
            Target::Remote(raw.to_string())
        } else {
            Target::Persistent(raw.to_string())
        }
    }

    pub fn kind(&self) -> StreamKind {
        match self {
            Target::Interactive => StreamKind::Interactive,
            Target::Persistent(_) => StreamKind::Persistent,
            Target::Remote(_) => StreamKind::Remote,
        }
    }
}

/// Completion record the host keeps for a finished run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub report: String,
    pub finished_at: DateTime<Utc>,
}

/// Convert a read result into the primitive the interpreter sees
pub fn to_primitive(byte: Option<u8>) -> i32 {
    byte.map(i32::from).unwrap_or(EXHAUSTED)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_classification() {
        assert_eq!(Target::parse("<sys>", INTERACTIVE_SENTINEL), Target::Interactive);
        assert_eq!(
            Target::parse("saves/slot1", INTERACTIVE_SENTINEL),
            Target::Persistent("saves/slot1".to_string())
        );
        assert_eq!(
            Target::parse("file://words.txt", INTERACTIVE_SENTINEL),
            Target::Remote("file://words.txt".to_string())
        );
    }

    #[test]
    fn test_custom_sentinel() {
        assert_eq!(Target::parse("stdin", "stdin"), Target::Interactive);
        assert_eq!(Target::parse("<sys>", "stdin").kind(), StreamKind::Persistent);
    }

    #[test]
    fn test_exhausted_primitive() {
        assert_eq!(to_primitive(None), EXHAUSTED);
        assert_eq!(to_primitive(Some(b'A')), 65);
    }
}
