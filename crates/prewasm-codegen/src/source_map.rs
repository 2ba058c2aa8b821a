//! Source mapping: record uid → name, kind and source location.
//!
//! Lets tools resolve a uid seen by the interpreter (for example in a trap)
//! back to the declaration it came from, and locate its body in the stream.

use prewasm_types::Span;
use serde::{Deserialize, Serialize};

/// A complete source map for an encoded module.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceMap {
    pub entries: Vec<SourceMapEntry>,
}

/// One function or extern record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMapEntry {
    /// Position in the shared extern-then-function uid space.
    pub uid: u32,
    pub name: String,
    pub kind: RecordKind,
    /// Declaration span, when the parser supplied one.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub span: Option<Span>,
    /// Body offsets in the binary; both zero for externs.
    pub body_begin: u32,
    pub body_end: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// An imported function.
    Extern,
    /// A module-internal function.
    Function,
    /// An exported function.
    Export,
}

impl SourceMap {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, entry: SourceMapEntry) {
        self.entries.push(entry);
    }

    pub fn find_by_uid(&self, uid: u32) -> Option<&SourceMapEntry> {
        self.entries.iter().find(|e| e.uid == uid)
    }

    /// The function whose body contains stream offset `offset`.
    pub fn find_by_offset(&self, offset: u32) -> Option<&SourceMapEntry> {
        self.entries
            .iter()
            .find(|e| e.kind != RecordKind::Extern && e.body_begin <= offset && offset < e.body_end)
    }

    pub fn to_json(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }

    pub fn from_json(data: &[u8]) -> Option<Self> {
        serde_json::from_slice(data).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(uid: u32, name: &str, kind: RecordKind, begin: u32, end: u32) -> SourceMapEntry {
        SourceMapEntry {
            uid,
            name: name.into(),
            kind,
            span: Some(Span::new(uid + 1, 1, uid + 1, 20)),
            body_begin: begin,
            body_end: end,
        }
    }

    #[test]
    fn round_trip_json() {
        let mut sm = SourceMap::new();
        sm.push(entry(0, "print", RecordKind::Extern, 0, 0));
        sm.push(entry(1, "main", RecordKind::Export, 40, 52));

        let sm2 = SourceMap::from_json(&sm.to_json()).expect("parse failed");
        assert_eq!(sm2, sm);
        assert_eq!(sm2.entries[1].kind, RecordKind::Export);
    }

    #[test]
    fn lookups() {
        let mut sm = SourceMap::new();
        sm.push(entry(0, "print", RecordKind::Extern, 0, 0));
        sm.push(entry(1, "helper", RecordKind::Function, 40, 52));
        sm.push(entry(2, "main", RecordKind::Export, 52, 60));

        assert_eq!(sm.find_by_uid(2).unwrap().name, "main");
        assert!(sm.find_by_uid(9).is_none());
        assert_eq!(sm.find_by_offset(52).unwrap().name, "main");
        assert_eq!(sm.find_by_offset(41).unwrap().name, "helper");
        assert!(sm.find_by_offset(0).is_none());
    }
}
