//! Attribute value kinds and the session-wide type registry
//!
//! The remote store carries attribute payloads as raw bytes; the browser
//! needs to know how to encode free-form operator text into those bytes and
//! how to render them back. The registry maps attribute names to a chosen
//! `ValueKind` and is owned by the Session (not a process global), so
//! independent sessions can be instantiated in tests. Entries are sticky for
//! the session lifetime: once an attribute name is resolved, later commands
//! never re-prompt.

use std::collections::HashMap;
use std::io::Write as _;

use crate::error::{BrowseError, Result};
use crate::input::LineSource;

/// A registered attribute value encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// UTF-8 text.
    Text,
    /// Signed 64-bit integer, 8-byte big-endian.
    Integer,
    /// IEEE-754 double, 8-byte big-endian.
    Decimal,
    /// Boolean, single byte 0 or 1.
    Flag,
    /// Raw bytes, entered and shown as hex.
    Raw,
}

impl ValueKind {
    /// All supported kinds, in prompt order.
    pub const ALL: [ValueKind; 5] = [
        ValueKind::Text,
        ValueKind::Integer,
        ValueKind::Decimal,
        ValueKind::Flag,
        ValueKind::Raw,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ValueKind::Text => "text",
            ValueKind::Integer => "integer",
            ValueKind::Decimal => "decimal",
            ValueKind::Flag => "flag",
            ValueKind::Raw => "raw (hex)",
        }
    }

    /// Encode operator-supplied text into a payload.
    pub fn encode(self, input: &str) -> Result<Vec<u8>> {
        let fail = |reason: String| BrowseError::EncodingFailed {
            kind: self.label(),
            input: input.to_string(),
            reason,
        };
        match self {
            ValueKind::Text => Ok(input.as_bytes().to_vec()),
            ValueKind::Integer => input
                .trim()
                .parse::<i64>()
                .map(|v| v.to_be_bytes().to_vec())
                .map_err(|e| fail(e.to_string())),
            ValueKind::Decimal => input
                .trim()
                .parse::<f64>()
                .map(|v| v.to_be_bytes().to_vec())
                .map_err(|e| fail(e.to_string())),
            ValueKind::Flag => match input.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(vec![1]),
                "false" | "0" | "no" | "off" => Ok(vec![0]),
                other => Err(fail(format!("\"{other}\" is not a boolean"))),
            },
            ValueKind::Raw => hex::decode(input.trim()).map_err(|e| fail(e.to_string())),
        }
    }

    /// Render a payload for display. Falls back to hex when the payload does
    /// not match the kind's expected shape.
    pub fn decode(self, payload: &[u8]) -> String {
        match self {
            ValueKind::Text => String::from_utf8_lossy(payload).into_owned(),
            ValueKind::Integer => match <[u8; 8]>::try_from(payload) {
                Ok(b) => i64::from_be_bytes(b).to_string(),
                Err(_) => hex::encode(payload),
            },
            ValueKind::Decimal => match <[u8; 8]>::try_from(payload) {
                Ok(b) => f64::from_be_bytes(b).to_string(),
                Err(_) => hex::encode(payload),
            },
            ValueKind::Flag => match payload {
                [0] => "false".to_string(),
                [1] => "true".to_string(),
                other => hex::encode(other),
            },
            ValueKind::Raw => hex::encode(payload),
        }
    }
}

/// Attribute name → value kind mapping, owned by the Session.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    kinds: HashMap<String, ValueKind>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, name: &str) -> Option<ValueKind> {
        self.kinds.get(name).copied()
    }

    pub fn register(&mut self, name: &str, kind: ValueKind) {
        self.kinds.insert(name.to_string(), kind);
    }

    /// Render a payload using the registered kind for `name`, or hex when the
    /// name was never resolved in this session.
    pub fn render(&self, name: &str, payload: &[u8]) -> String {
        match self.lookup(name) {
            Some(kind) => kind.decode(payload),
            None => match std::str::from_utf8(payload) {
                Ok(s) if !s.is_empty() && s.chars().all(|c| !c.is_control()) => s.to_string(),
                _ => hex::encode(payload),
            },
        }
    }
}

/// Maximum interactive attempts to resolve an unknown attribute type.
pub const NEGOTIATION_ATTEMPTS: u32 = 3;

/// Resolve `name` to a value kind, prompting the operator when the registry
/// has no entry.
///
/// The prompt enumerates the supported kinds and reads an index. An
/// out-of-range or non-numeric selection consumes an attempt; exhausting all
/// attempts (or input closing) aborts with `TypeNotRecognized`. A valid
/// selection is registered session-wide before returning.
pub fn negotiate_kind(
    registry: &mut TypeRegistry,
    name: &str,
    input: &mut dyn LineSource,
) -> Result<ValueKind> {
    if let Some(kind) = registry.lookup(name) {
        return Ok(kind);
    }

    println!("Unknown attribute type for \"{name}\". Select one:");
    for (i, kind) in ValueKind::ALL.iter().enumerate() {
        println!("  {}) {}", i + 1, kind.label());
    }

    for attempt in 1..=NEGOTIATION_ATTEMPTS {
        print!("Type [1-{}]: ", ValueKind::ALL.len());
        std::io::stdout().flush().ok();

        let Some(line) = input.next_line_blocking() else {
            break;
        };
        match line.trim().parse::<usize>() {
            Ok(n) if (1..=ValueKind::ALL.len()).contains(&n) => {
                let kind = ValueKind::ALL[n - 1];
                registry.register(name, kind);
                tracing::debug!("registered attribute type {} for \"{name}\"", kind.label());
                return Ok(kind);
            }
            _ => {
                if attempt < NEGOTIATION_ATTEMPTS {
                    println!("Invalid selection \"{}\". Try again.", line.trim());
                }
            }
        }
    }
    Err(BrowseError::TypeNotRecognized {
        name: name.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::ScriptedSource;

    #[test]
    fn test_encode_decode_integer() {
        let payload = ValueKind::Integer.encode("-42").unwrap();
        assert_eq!(payload.len(), 8);
        assert_eq!(ValueKind::Integer.decode(&payload), "-42");
    }

    #[test]
    fn test_encode_flag_spellings() {
        assert_eq!(ValueKind::Flag.encode("yes").unwrap(), vec![1]);
        assert_eq!(ValueKind::Flag.encode("0").unwrap(), vec![0]);
        assert!(ValueKind::Flag.encode("maybe").is_err());
    }

    #[test]
    fn test_encode_raw_hex() {
        assert_eq!(ValueKind::Raw.encode("dead").unwrap(), vec![0xde, 0xad]);
        assert!(ValueKind::Raw.encode("xyz").is_err());
    }

    #[test]
    fn test_negotiate_registers_on_valid_selection() {
        let mut reg = TypeRegistry::new();
        let mut input = ScriptedSource::new(["2"]);
        let kind = negotiate_kind(&mut reg, "temperature", &mut input).unwrap();
        assert_eq!(kind, ValueKind::Integer);
        assert_eq!(reg.lookup("temperature"), Some(ValueKind::Integer));
    }

    #[test]
    fn test_negotiate_bad_selections_consume_attempts() {
        let mut reg = TypeRegistry::new();
        // Two bad attempts, then a valid one on the last try.
        let mut input = ScriptedSource::new(["9", "abc", "1"]);
        let kind = negotiate_kind(&mut reg, "label", &mut input).unwrap();
        assert_eq!(kind, ValueKind::Text);
        assert_eq!(input.consumed, 3);
    }

    #[test]
    fn test_negotiate_exhaustion_aborts_without_registering() {
        let mut reg = TypeRegistry::new();
        let mut input = ScriptedSource::new(["0", "six", "99", "1"]);
        let err = negotiate_kind(&mut reg, "label", &mut input).unwrap_err();
        assert!(matches!(err, BrowseError::TypeNotRecognized { .. }));
        assert!(reg.lookup("label").is_none());
        // The fourth, valid line was never consumed.
        assert_eq!(input.consumed, 3);
    }

    #[test]
    fn test_registry_is_sticky_no_reprompt() {
        let mut reg = TypeRegistry::new();
        let mut input = ScriptedSource::new(["3"]);
        negotiate_kind(&mut reg, "weight", &mut input).unwrap();
        assert_eq!(input.consumed, 1);

        // Second resolution must not touch the input source.
        let mut empty = ScriptedSource::new(Vec::<String>::new());
        let kind = negotiate_kind(&mut reg, "weight", &mut empty).unwrap();
        assert_eq!(kind, ValueKind::Decimal);
        assert_eq!(empty.consumed, 0);
    }
}
