//! The persisted document/node store backing the index.
//!
//! One redb database with a single `entries` table. Document-kind and
//! Node-kind entries share the table and are distinguished by key prefix
//! (`doc:` / `node:`), each keyed by the 16-hex form of its numeric id.
//!
//! Binary format of a node entry:
//! - 4 bytes: metadata length M (u32 LE)
//! - M bytes: JSON metadata (id, document, index, text, prev/next relations)
//! - remainder: embedding as f32 LE values
//!
//! Document entries are plain JSON. All writes of a mutation batch are
//! applied in a single write transaction, so a snapshot on disk always
//! reflects whole batches.

use std::{collections::BTreeMap, path::Path};

use redb::{
    Database, ReadableDatabase, ReadableTable, TableDefinition,
};
use serde::{Deserialize, Serialize};

use crate::{
    doc_id::DocumentId,
    error::{Error, Result},
};

const ENTRIES: TableDefinition<&str, &[u8]> = TableDefinition::new("entries");

const DOC_PREFIX: &str = "doc:";
const NODE_PREFIX: &str = "node:";

/// Metadata length header size.
const HEADER_SIZE: usize = 4;

/// Raw ingested content, produced by the loader and handed to the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    /// Source reference, usually the originating file path.
    pub source: String,
    pub text: String,
    pub metadata: BTreeMap<String, String>,
}

impl Document {
    pub fn new(source: impl Into<String>, text: impl Into<String>) -> Self {
        let source = source.into();
        Self {
            id: DocumentId::from_source(&source),
            source,
            text: text.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Persisted record for an ingested document. Content lives in its nodes;
/// the record keeps the identity, provenance, and node membership.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: DocumentId,
    pub source: String,
    pub metadata: BTreeMap<String, String>,
    pub node_ids: Vec<u64>,
}

/// A chunk of a document with its embedding and sibling relations.
///
/// Never mutated after creation; deleted only with its owning document.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: u64,
    pub document: DocumentId,
    /// Zero-based chunk index within the document.
    pub index: usize,
    pub text: String,
    pub prev: Option<u64>,
    pub next: Option<u64>,
    pub embedding: Vec<f32>,
}

#[derive(Serialize, Deserialize)]
struct NodeMeta {
    id: u64,
    document: DocumentId,
    index: usize,
    text: String,
    prev: Option<u64>,
    next: Option<u64>,
}

impl Node {
    pub fn key(&self) -> String {
        node_key(self.id)
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        let meta = NodeMeta {
            id: self.id,
            document: self.document.clone(),
            index: self.index,
            text: self.text.clone(),
            prev: self.prev,
            next: self.next,
        };
        let meta_bytes = serde_json::to_vec(&meta)
            .map_err(|e| Error::Config(format!("node serialization: {e}")))?;

        let mut bytes = Vec::with_capacity(
            HEADER_SIZE + meta_bytes.len() + self.embedding.len() * 4,
        );
        bytes.extend_from_slice(&(meta_bytes.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&meta_bytes);
        bytes.extend_from_slice(bytemuck::cast_slice(&self.embedding));
        Ok(bytes)
    }

    fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < HEADER_SIZE {
            return None;
        }
        let meta_len =
            u32::from_le_bytes(bytes[0..HEADER_SIZE].try_into().ok()?) as usize;
        let body = bytes.get(HEADER_SIZE..HEADER_SIZE + meta_len)?;
        let meta: NodeMeta = serde_json::from_slice(body).ok()?;

        let rest = &bytes[HEADER_SIZE + meta_len..];
        if rest.len() % 4 != 0 {
            return None;
        }
        let embedding: Vec<f32> = bytemuck::pod_collect_to_vec(rest);

        Some(Self {
            id: meta.id,
            document: meta.document,
            index: meta.index,
            text: meta.text,
            prev: meta.prev,
            next: meta.next,
            embedding,
        })
    }
}

pub fn doc_key(id: u64) -> String {
    format!("{DOC_PREFIX}{id:016x}")
}

pub fn node_key(id: u64) -> String {
    format!("{NODE_PREFIX}{id:016x}")
}

/// A journaled write, applied to the store as part of a batch.
#[derive(Debug, Clone)]
pub enum PendingWrite {
    PutDocument(DocumentRecord),
    PutNode(Node),
    /// Removal of either entry kind, by full key.
    Remove(String),
}

/// The on-disk document/node store.
pub struct NodeStore {
    db: Database,
}

impl NodeStore {
    /// Open or create the store at the given path.
    ///
    /// An absent or empty database is the normal first-run state; the tables
    /// are created and committed immediately so subsequent loads succeed.
    /// Any failure here means the persistence backend is not usable at all.
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)
            .map_err(|e| Error::StorageUnavailable(e.to_string()))?;

        let txn = db
            .begin_write()
            .map_err(|e| Error::StorageUnavailable(e.to_string()))?;
        txn.open_table(ENTRIES)
            .map_err(|e| Error::StorageUnavailable(e.to_string()))?;
        txn.commit()
            .map_err(|e| Error::StorageUnavailable(e.to_string()))?;

        Ok(Self { db })
    }

    /// Apply a batch of journaled writes in a single transaction.
    pub fn apply(&self, writes: &[PendingWrite]) -> Result<()> {
        if writes.is_empty() {
            return Ok(());
        }
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(ENTRIES)?;
            for write in writes {
                match write {
                    PendingWrite::PutDocument(record) => {
                        let bytes =
                            serde_json::to_vec(record).map_err(|e| {
                                Error::Config(format!(
                                    "document serialization: {e}"
                                ))
                            })?;
                        table.insert(
                            doc_key(record.id.numeric).as_str(),
                            bytes.as_slice(),
                        )?;
                    }
                    PendingWrite::PutNode(node) => {
                        let bytes = node.to_bytes()?;
                        table.insert(node.key().as_str(), bytes.as_slice())?;
                    }
                    PendingWrite::Remove(key) => {
                        table.remove(key.as_str())?;
                    }
                }
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// Fetch a document record by numeric id.
    pub fn document(&self, id: u64) -> Result<Option<DocumentRecord>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(ENTRIES)?;
        let Some(guard) = table.get(doc_key(id).as_str())? else {
            return Ok(None);
        };
        Ok(serde_json::from_slice(guard.value()).ok())
    }

    /// Fetch a node by numeric id.
    pub fn node(&self, id: u64) -> Result<Option<Node>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(ENTRIES)?;
        let Some(guard) = table.get(node_key(id).as_str())? else {
            return Ok(None);
        };
        Ok(Node::from_bytes(guard.value()))
    }

    /// Count of Document-kind entries.
    pub fn document_count(&self) -> Result<usize> {
        self.count_prefix(DOC_PREFIX)
    }

    /// Count of Node-kind entries.
    pub fn node_count(&self) -> Result<usize> {
        self.count_prefix(NODE_PREFIX)
    }

    fn count_prefix(&self, prefix: &str) -> Result<usize> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(ENTRIES)?;
        let mut count = 0;
        for entry in table.iter()? {
            let (key, _) = entry?;
            if key.value().starts_with(prefix) {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Load every persisted document and node, for index initialization.
    pub fn load_all(&self) -> Result<(Vec<DocumentRecord>, Vec<Node>)> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(ENTRIES)?;

        let mut documents = Vec::new();
        let mut nodes = Vec::new();
        for entry in table.iter()? {
            let (key, value) = entry?;
            let key = key.value();
            if key.starts_with(DOC_PREFIX) {
                if let Ok(record) = serde_json::from_slice(value.value()) {
                    documents.push(record);
                }
            } else if key.starts_with(NODE_PREFIX)
                && let Some(node) = Node::from_bytes(value.value())
            {
                nodes.push(node);
            }
        }
        Ok((documents, nodes))
    }
}

impl std::fmt::Debug for NodeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeStore").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> (tempfile::TempDir, NodeStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store = NodeStore::open(&tmp.path().join("store.redb")).unwrap();
        (tmp, store)
    }

    fn make_node(id: u64, text: &str) -> Node {
        Node {
            id,
            document: DocumentId::from_source("notes/a.md"),
            index: 0,
            text: text.to_string(),
            prev: None,
            next: Some(id + 1),
            embedding: vec![0.1, 0.2, 0.3],
        }
    }

    fn make_record(id: &DocumentId, node_ids: Vec<u64>) -> DocumentRecord {
        DocumentRecord {
            id: id.clone(),
            source: "notes/a.md".to_string(),
            metadata: BTreeMap::new(),
            node_ids,
        }
    }

    #[test]
    fn empty_store_has_zero_counts() {
        let (_tmp, store) = test_store();
        assert_eq!(store.document_count().unwrap(), 0);
        assert_eq!(store.node_count().unwrap(), 0);
    }

    #[test]
    fn apply_and_load_roundtrip() {
        let (_tmp, store) = test_store();
        let id = DocumentId::from_source("notes/a.md");
        let node = make_node(id.numeric, "hello world");

        store
            .apply(&[
                PendingWrite::PutDocument(make_record(&id, vec![node.id])),
                PendingWrite::PutNode(node.clone()),
            ])
            .unwrap();

        assert_eq!(store.document_count().unwrap(), 1);
        assert_eq!(store.node_count().unwrap(), 1);

        let loaded = store.node(node.id).unwrap().unwrap();
        assert_eq!(loaded, node);

        let record = store.document(id.numeric).unwrap().unwrap();
        assert_eq!(record.node_ids, vec![node.id]);
    }

    #[test]
    fn node_binary_roundtrip_preserves_relations() {
        let node = Node {
            id: 7,
            document: DocumentId::from_source("b.md"),
            index: 2,
            text: "chunk with unicode: 日本語 🎉".to_string(),
            prev: Some(6),
            next: None,
            embedding: (0..16).map(|i| i as f32 * 0.25).collect(),
        };
        let bytes = node.to_bytes().unwrap();
        let restored = Node::from_bytes(&bytes).unwrap();
        assert_eq!(restored, node);
    }

    #[test]
    fn from_bytes_rejects_truncated_entries() {
        let node = make_node(1, "text");
        let bytes = node.to_bytes().unwrap();

        assert!(Node::from_bytes(&bytes[..2]).is_none());
        // Drop one byte of the embedding so the float region is ragged.
        assert!(Node::from_bytes(&bytes[..bytes.len() - 1]).is_none());
    }

    #[test]
    fn remove_deletes_entries() {
        let (_tmp, store) = test_store();
        let id = DocumentId::from_source("notes/a.md");
        let node = make_node(id.numeric, "hello");

        store
            .apply(&[
                PendingWrite::PutDocument(make_record(&id, vec![node.id])),
                PendingWrite::PutNode(node.clone()),
            ])
            .unwrap();
        store
            .apply(&[
                PendingWrite::Remove(doc_key(id.numeric)),
                PendingWrite::Remove(node_key(node.id)),
            ])
            .unwrap();

        assert_eq!(store.document_count().unwrap(), 0);
        assert_eq!(store.node_count().unwrap(), 0);
        assert!(store.node(node.id).unwrap().is_none());
    }

    #[test]
    fn batch_applies_atomically_in_one_snapshot() {
        let (_tmp, store) = test_store();
        let id = DocumentId::from_source("multi.md");
        let writes: Vec<PendingWrite> = (0..3)
            .map(|i| {
                PendingWrite::PutNode(Node {
                    id: 100 + i,
                    document: id.clone(),
                    index: i as usize,
                    text: format!("chunk {i}"),
                    prev: None,
                    next: None,
                    embedding: vec![1.0],
                })
            })
            .collect();

        store.apply(&writes).unwrap();
        assert_eq!(store.node_count().unwrap(), 3);
    }

    #[test]
    fn reopen_preserves_data() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("store.redb");
        let id = DocumentId::from_source("keep.md");

        {
            let store = NodeStore::open(&path).unwrap();
            store
                .apply(&[PendingWrite::PutDocument(make_record(&id, vec![]))])
                .unwrap();
        }

        {
            let store = NodeStore::open(&path).unwrap();
            assert_eq!(store.document_count().unwrap(), 1);
            let record = store.document(id.numeric).unwrap().unwrap();
            assert_eq!(record.source, "notes/a.md");
        }
    }

    #[test]
    fn load_all_partitions_by_kind() {
        let (_tmp, store) = test_store();
        let id = DocumentId::from_source("notes/a.md");
        let node = make_node(id.numeric, "hello");

        store
            .apply(&[
                PendingWrite::PutDocument(make_record(&id, vec![node.id])),
                PendingWrite::PutNode(node),
            ])
            .unwrap();

        let (documents, nodes) = store.load_all().unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(nodes.len(), 1);
        assert_eq!(documents[0].id, id);
    }
}
