use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
};

use serde::{Deserialize, Serialize};

/// A stable document identifier derived from the document's source reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentId {
    /// The numeric ID used as the key in store tables and as the vector
    /// point id for chunk 0.
    pub numeric: u64,
    /// The short hex string for human display (e.g. "a1b2c3").
    pub short: String,
}

impl DocumentId {
    /// Generate a stable document ID from a source reference (usually the
    /// file path the document was loaded from).
    pub fn from_source(source: &str) -> Self {
        let mut hasher = DefaultHasher::new();
        source.hash(&mut hasher);
        let numeric = hasher.finish();
        Self {
            numeric,
            short: short_hex(numeric, 6),
        }
    }

    /// The full 16-character hex form used in store keys.
    pub fn hex(&self) -> String {
        format!("{:016x}", self.numeric)
    }

    /// Whether a user-supplied reference (short hex, `#`-prefixed short hex,
    /// or full hex) names this document.
    pub fn matches(&self, reference: &str) -> bool {
        let reference = reference.strip_prefix('#').unwrap_or(reference);
        reference == self.short || reference == self.hex()
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.short)
    }
}

fn short_hex(value: u64, len: usize) -> String {
    let full = format!("{value:016x}");
    full[..len].to_string()
}

/// Derive a node's numeric id from its document id and chunk index.
///
/// Format: `doc_numeric XOR (chunk_index << 48)`; chunk 0 keeps the document
/// id unchanged. The result doubles as the vector point id.
pub fn node_id(doc_numeric: u64, chunk_index: usize) -> u64 {
    if chunk_index == 0 {
        doc_numeric
    } else {
        doc_numeric ^ ((chunk_index as u64) << 48)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        let a = DocumentId::from_source("notes/hello.md");
        let b = DocumentId::from_source("notes/hello.md");
        assert_eq!(a, b);
    }

    #[test]
    fn different_sources_differ() {
        let a = DocumentId::from_source("notes/hello.md");
        let b = DocumentId::from_source("notes/world.md");
        assert_ne!(a.numeric, b.numeric);
    }

    #[test]
    fn display_has_hash_prefix() {
        let id = DocumentId::from_source("notes/hello.md");
        let s = id.to_string();
        assert!(s.starts_with('#'));
        assert_eq!(s.len(), 7); // # + 6 hex chars
    }

    #[test]
    fn matches_short_and_full_forms() {
        let id = DocumentId::from_source("notes/hello.md");
        assert!(id.matches(&id.short));
        assert!(id.matches(&format!("#{}", id.short)));
        assert!(id.matches(&id.hex()));
        assert!(!id.matches("ffffff"));
    }

    #[test]
    fn node_id_chunk_zero_is_document_id() {
        let id = DocumentId::from_source("a.md");
        assert_eq!(node_id(id.numeric, 0), id.numeric);
    }

    #[test]
    fn node_id_distinct_per_chunk() {
        let base = 12345678u64;
        let ids: Vec<u64> = (0..4).map(|i| node_id(base, i)).collect();
        for (i, a) in ids.iter().enumerate() {
            for b in &ids[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
