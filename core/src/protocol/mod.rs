//! Messages exchanged between the worker (execution context) and the host
//!
//! Every message is a `{ "name": ..., "payload": ... }` record. The same enum
//! is used in both directions; `input` and `run` carry a different payload
//! shape depending on which side sent them.

pub mod channel;
pub mod framing;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};
use crate::types::Handle;

pub use channel::{pair, Endpoint, Inbox, Outbox};
pub use framing::FramedTransport;

/* ===================== Messages ===================== */

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "payload", rename_all = "camelCase")]
pub enum Message {
    /// Associate a handle with a target; either side may originate it
    Bind(BindPayload),
    /// Request (no buffer, worker → host) or response (buffer, host → worker)
    Input(InputPayload),
    /// Bytes written by the interpreter (worker → host)
    Output(OutputPayload),
    /// host → worker: start interpreting, optionally naming the entry module.
    /// worker → host: the interpreter halted, payload is its report.
    Run(Option<String>),
    /// host → worker: archive bytes to load into the interpreter
    LoadJar(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindPayload {
    pub pointer: Handle,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputPayload {
    pub pointer: Handle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputPayload {
    pub pointer: Handle,
    pub buffer: String,
}

impl Message {
    pub fn bind(pointer: Handle, path: impl Into<String>) -> Self {
        Message::Bind(BindPayload {
            pointer,
            path: path.into(),
        })
    }

    pub fn input_request(pointer: Handle) -> Self {
        Message::Input(InputPayload {
            pointer,
            buffer: None,
        })
    }

    pub fn input_response(pointer: Handle, bytes: &[u8]) -> Self {
        Message::Input(InputPayload {
            pointer,
            buffer: Some(bytes_to_wire(bytes)),
        })
    }

    pub fn output(pointer: Handle, bytes: &[u8]) -> Self {
        Message::Output(OutputPayload {
            pointer,
            buffer: bytes_to_wire(bytes),
        })
    }

    /// The handle this message concerns, if any
    pub fn handle(&self) -> Option<Handle> {
        match self {
            Message::Bind(p) => Some(p.pointer),
            Message::Input(p) => Some(p.pointer),
            Message::Output(p) => Some(p.pointer),
            Message::Run(_) | Message::LoadJar(_) => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Message::Bind(_) => "bind",
            Message::Input(_) => "input",
            Message::Output(_) => "output",
            Message::Run(_) => "run",
            Message::LoadJar(_) => "loadJar",
        }
    }

    /// Encode as a single JSON line (without the trailing newline)
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(line: &str) -> Result<Self> {
        serde_json::from_str(line).map_err(|e| BridgeError::Malformed(e.to_string()))
    }
}

/* ===================== Byte ↔ wire text ===================== */

/// One character per byte: the character's code point is the byte value.
pub fn bytes_to_wire(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Inverse of [`bytes_to_wire`]. Characters outside the byte range keep
/// their low eight bits.
pub fn wire_to_bytes(text: &str) -> Vec<u8> {
    text.chars().map(|c| (u32::from(c) & 0xff) as u8).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shape_matches_named_records() {
        let value = serde_json::to_value(Message::bind(Handle(3), "<sys>")).unwrap();
        assert_eq!(
            value,
            json!({"name": "bind", "payload": {"pointer": 3, "path": "<sys>"}})
        );

        let value = serde_json::to_value(Message::input_request(Handle(3))).unwrap();
        assert_eq!(value, json!({"name": "input", "payload": {"pointer": 3}}));

        let value = serde_json::to_value(Message::LoadJar(vec![1, 2])).unwrap();
        assert_eq!(value, json!({"name": "loadJar", "payload": [1, 2]}));
    }

    #[test]
    fn test_decode_input_response() {
        let message =
            Message::decode(r#"{"name":"input","payload":{"pointer":7,"buffer":"hi"}}"#).unwrap();
        assert_eq!(
            message,
            Message::Input(InputPayload {
                pointer: Handle(7),
                buffer: Some("hi".to_string()),
            })
        );
        assert_eq!(message.handle(), Some(Handle(7)));
    }

    #[test]
    fn test_decode_rejects_unknown_name() {
        let err = Message::decode(r#"{"name":"teleport","payload":{}}"#).unwrap_err();
        assert!(matches!(err, BridgeError::Malformed(_)));
    }

    #[test]
    fn test_high_bytes_survive_wire_text() {
        let bytes = [0x00, 0x41, 0x7f, 0x80, 0xe9, 0xff];
        assert_eq!(wire_to_bytes(&bytes_to_wire(&bytes)), bytes.to_vec());
    }
}
