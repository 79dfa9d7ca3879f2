//! Core data types for the world model store
//!
//! Identifiers are opaque entity names; Attributes are timestamped, typed,
//! originated facts about them. A Snapshot maps Identifiers to the Attribute
//! values visible at a single instant.

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A timestamped fact attached to one Identifier.
///
/// Attributes are immutable once sent: a new value for the same name creates
/// a new, later-timestamped Attribute rather than overwriting the old one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    /// The Identifier this fact is attached to.
    pub identifier: String,
    /// Attribute name, e.g. "location" or "temperature".
    pub name: String,
    /// Creation timestamp, epoch milliseconds.
    pub created_ms: i64,
    /// Raw encoded payload. The encoding is chosen by the value kind
    /// registered for `name`.
    pub payload: Vec<u8>,
    /// Attribution string identifying the writer.
    pub origin: String,
}

impl Attribute {
    /// Return a copy of this Attribute re-targeted at a different Identifier,
    /// keeping name, timestamp, payload, and origin intact. Used by `cp`.
    pub fn retargeted(&self, identifier: &str) -> Self {
        Attribute {
            identifier: identifier.to_string(),
            ..self.clone()
        }
    }

    /// Format the creation timestamp as a UTC date-time for display.
    pub fn created_display(&self) -> String {
        match Utc.timestamp_millis_opt(self.created_ms).single() {
            Some(dt) => dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
            None => format!("@{}ms", self.created_ms),
        }
    }
}

/// The state of the world at a single instant, either "now" or a point
/// inside a historical range: a mapping from Identifier to its ordered
/// Attribute values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub entries: BTreeMap<String, Vec<Attribute>>,
}

impl Snapshot {
    /// File an Attribute under its own Identifier, preserving order.
    pub fn insert(&mut self, attr: Attribute) {
        self.entries
            .entry(attr.identifier.clone())
            .or_default()
            .push(attr);
    }

    /// True when the snapshot carries no Attribute values at all.
    pub fn is_empty(&self) -> bool {
        self.entries.values().all(|v| v.is_empty())
    }

    /// The Identifiers present, in order.
    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Every Attribute in the snapshot, grouped by Identifier.
    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.entries.values().flatten()
    }
}

/// Current epoch milliseconds.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attr(id: &str, name: &str) -> Attribute {
        Attribute {
            identifier: id.to_string(),
            name: name.to_string(),
            created_ms: 1_700_000_000_000,
            payload: vec![1, 2, 3],
            origin: "tester".to_string(),
        }
    }

    #[test]
    fn test_retargeted_keeps_everything_but_identifier() {
        let a = attr("src", "temp");
        let b = a.retargeted("dst");
        assert_eq!(b.identifier, "dst");
        assert_eq!(b.name, a.name);
        assert_eq!(b.created_ms, a.created_ms);
        assert_eq!(b.payload, a.payload);
        assert_eq!(b.origin, a.origin);
    }

    #[test]
    fn test_created_display_is_utc() {
        let a = attr("x", "y");
        assert!(a.created_display().starts_with("2023-11-14"));
    }

    #[test]
    fn test_snapshot_groups_by_identifier() {
        let mut s = Snapshot::default();
        s.insert(attr("b", "one"));
        s.insert(attr("a", "two"));
        s.insert(attr("b", "three"));
        assert!(!s.is_empty());
        assert_eq!(s.identifiers().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(s.attributes().count(), 3);
        assert_eq!(s.entries["b"].len(), 2);
    }

    #[test]
    fn test_empty_snapshot() {
        assert!(Snapshot::default().is_empty());
    }
}
