//! The index lifecycle manager: single authority for index creation,
//! mutation, and persistence.
//!
//! The manager owns the in-memory index (document and node maps), the
//! pending-write journal, and the structural-mutation lock. Every mutation
//! batch (ingest or delete) runs under the lock and ends with one persist
//! call that applies the whole journal in a single store transaction. If the
//! persist fails the journal is kept, the caller gets [`Error::Persist`], and
//! the next successful persist reconciles disk with memory.
//!
//! Counts and retrieval reads go through store read transactions and take no
//! lock; they observe the last committed snapshot and may lag an in-flight
//! batch.

use std::{
    collections::HashMap,
    path::Path,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tracing::{debug, info, warn};

use crate::{
    chunking::{self, ChunkingConfig},
    doc_id::node_id,
    embedder::EmbeddingProvider,
    error::{Error, Result},
    store::{
        Document, DocumentRecord, Node, NodeStore, PendingWrite, doc_key,
        node_key,
    },
    vector_store::{VectorPoint, VectorStore},
};

/// Lifecycle states of the index.
///
/// `Uninitialized` and `Loading` cover the window before
/// [`IndexManager::initialize`] returns; a constructed manager is observed
/// in one of the remaining states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    Uninitialized,
    Loading,
    Ready,
    Mutating,
    /// A mutation committed in memory but not on disk; the journal is
    /// retried on the next mutation.
    PersistFailed,
}

impl std::fmt::Display for IndexState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            IndexState::Uninitialized => "uninitialized",
            IndexState::Loading => "loading",
            IndexState::Ready => "ready",
            IndexState::Mutating => "mutating",
            IndexState::PersistFailed => "persist-failed",
        };
        f.write_str(name)
    }
}

struct IndexInner {
    state: IndexState,
    documents: HashMap<u64, DocumentRecord>,
    nodes: HashMap<u64, Node>,
    pending: Vec<PendingWrite>,
}

/// Owns the vector index's lifecycle: load-or-create, ingest, delete,
/// persist, count. Exactly one instance is active per process.
pub struct IndexManager {
    store: Arc<NodeStore>,
    vectors: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    chunking: ChunkingConfig,
    inner: Mutex<IndexInner>,
}

impl IndexManager {
    /// Load a persisted index from `store_path`, or create an empty one if
    /// no persisted state exists (the normal first-run case).
    ///
    /// Fails with [`Error::StorageUnavailable`] if the vector store or the
    /// local store cannot be reached at all.
    pub fn initialize(
        store_path: &Path,
        vectors: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        chunking: ChunkingConfig,
    ) -> Result<Self> {
        debug!(path = %store_path.display(), "loading index");
        vectors.ensure_ready()?;

        // Opening creates the store on first run and commits its tables, so
        // a subsequent load always finds valid persisted state.
        let store = Arc::new(NodeStore::open(store_path)?);
        let (document_list, node_list) = store.load_all()?;

        if document_list.is_empty() && node_list.is_empty() {
            info!("no persisted state found, creating a new index");
        } else {
            info!(
                documents = document_list.len(),
                nodes = node_list.len(),
                "loaded persisted index"
            );
        }

        let documents = document_list
            .into_iter()
            .map(|record| (record.id.numeric, record))
            .collect();
        let nodes = node_list.into_iter().map(|node| (node.id, node)).collect();

        Ok(Self {
            store,
            vectors,
            embedder,
            chunking,
            inner: Mutex::new(IndexInner {
                state: IndexState::Ready,
                documents,
                nodes,
                pending: Vec::new(),
            }),
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> IndexState {
        self.lock().state
    }

    /// Shared handle to the backing store, for lock-free readers.
    pub fn store(&self) -> Arc<NodeStore> {
        Arc::clone(&self.store)
    }

    /// Chunk, embed, and insert a batch of documents, then persist once.
    ///
    /// Returns the same documents on success (acknowledgement, not a
    /// transformation). An empty batch logs a warning and returns empty.
    /// Re-ingesting a known document replaces its nodes.
    pub fn ingest(&self, documents: Vec<Document>) -> Result<Vec<Document>> {
        if documents.is_empty() {
            warn!("no documents provided for indexing");
            return Ok(documents);
        }

        let mut inner = self.lock();
        inner.state = IndexState::Mutating;

        for document in &documents {
            if let Err(e) = self.insert_document(&mut inner, document) {
                // Aborted mid-batch: earlier documents stay in memory and in
                // the journal, reaching disk with the next persist.
                inner.state = settled_state(&inner);
                return Err(e);
            }
        }

        self.persist(&mut inner)?;
        info!(documents = documents.len(), "ingest complete");
        Ok(documents)
    }

    /// Remove a document and its nodes, then persist.
    ///
    /// The reference may be a short or full hex id (with or without `#`) or
    /// the source path. An unknown reference is a no-op, not an error.
    pub fn delete(&self, reference: &str) -> Result<()> {
        let mut inner = self.lock();
        let Some(record) = find_document(&inner.documents, reference) else {
            debug!(reference, "delete of unknown document is a no-op");
            return Ok(());
        };

        inner.state = IndexState::Mutating;
        if let Err(e) = self.vectors.delete(&record.node_ids) {
            inner.state = settled_state(&inner);
            return Err(e);
        }

        for id in &record.node_ids {
            inner.nodes.remove(id);
            inner.pending.push(PendingWrite::Remove(node_key(*id)));
        }
        inner.documents.remove(&record.id.numeric);
        inner
            .pending
            .push(PendingWrite::Remove(doc_key(record.id.numeric)));

        self.persist(&mut inner)?;
        info!(
            document = %record.id,
            nodes = record.node_ids.len(),
            "document deleted"
        );
        Ok(())
    }

    /// Count of Document-kind entries in the persisted store.
    pub fn get_document_count(&self) -> Result<usize> {
        self.store.document_count()
    }

    /// Count of Node-kind entries in the persisted store.
    pub fn get_node_count(&self) -> Result<usize> {
        self.store.node_count()
    }

    /// Snapshot of the known documents, sorted by source.
    pub fn documents(&self) -> Vec<DocumentRecord> {
        let inner = self.lock();
        let mut records: Vec<DocumentRecord> =
            inner.documents.values().cloned().collect();
        records.sort_by(|a, b| a.source.cmp(&b.source));
        records
    }

    fn lock(&self) -> MutexGuard<'_, IndexInner> {
        // A poisoned lock only means another thread panicked mid-mutation;
        // the journal still reflects every applied write.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply the transformation pipeline (chunk, embed) to one document and
    /// insert its nodes. Runs under the structural-mutation lock.
    fn insert_document(
        &self,
        inner: &mut IndexInner,
        document: &Document,
    ) -> Result<()> {
        let chunks = chunking::split_markdown(&document.text, self.chunking);
        if chunks.is_empty() {
            warn!(document = %document.id, "document produced no chunks");
        }
        let ids: Vec<u64> = chunks
            .iter()
            .map(|chunk| node_id(document.id.numeric, chunk.index))
            .collect();

        let mut points = Vec::with_capacity(chunks.len());
        let mut nodes = Vec::with_capacity(chunks.len());
        for (i, chunk) in chunks.iter().enumerate() {
            let embedding = self.embedder.embed(&chunk.text)?;
            points.push(VectorPoint {
                id: ids[i],
                vector: embedding.clone(),
                payload: serde_json::json!({
                    "document": document.id.hex(),
                    "chunk": chunk.index,
                }),
            });
            nodes.push(Node {
                id: ids[i],
                document: document.id.clone(),
                index: chunk.index,
                text: chunk.text.clone(),
                prev: (i > 0).then(|| ids[i - 1]),
                next: ids.get(i + 1).copied(),
                embedding,
            });
        }

        self.vectors.upsert(&points)?;

        // Replacing an existing document: drop nodes the new version no
        // longer produces.
        if let Some(old) = inner.documents.get(&document.id.numeric).cloned() {
            let stale: Vec<u64> = old
                .node_ids
                .iter()
                .copied()
                .filter(|id| !ids.contains(id))
                .collect();
            if !stale.is_empty() {
                self.vectors.delete(&stale)?;
                for id in &stale {
                    inner.nodes.remove(id);
                    inner.pending.push(PendingWrite::Remove(node_key(*id)));
                }
            }
        }

        for node in nodes {
            inner.pending.push(PendingWrite::PutNode(node.clone()));
            inner.nodes.insert(node.id, node);
        }
        let record = DocumentRecord {
            id: document.id.clone(),
            source: document.source.clone(),
            metadata: document.metadata.clone(),
            node_ids: ids,
        };
        inner
            .pending
            .push(PendingWrite::PutDocument(record.clone()));
        inner.documents.insert(document.id.numeric, record);

        debug!(document = %document.id, nodes = chunks.len(), "document inserted");
        Ok(())
    }

    /// Flush the journal in one store transaction.
    fn persist(&self, inner: &mut IndexInner) -> Result<()> {
        match self.store.apply(&inner.pending) {
            Ok(()) => {
                if !inner.pending.is_empty() {
                    debug!(writes = inner.pending.len(), "index persisted");
                }
                inner.pending.clear();
                inner.state = IndexState::Ready;
                Ok(())
            }
            Err(e) => {
                inner.state = IndexState::PersistFailed;
                warn!(error = %e, "persist failed; will retry on next mutation");
                Err(Error::Persist(e.to_string()))
            }
        }
    }
}

/// The state a manager settles into when a mutation aborts before its
/// persist: journaled-but-unflushed writes keep the durable-pending signal.
fn settled_state(inner: &IndexInner) -> IndexState {
    if inner.pending.is_empty() {
        IndexState::Ready
    } else {
        IndexState::PersistFailed
    }
}

fn find_document(
    documents: &HashMap<u64, DocumentRecord>,
    reference: &str,
) -> Option<DocumentRecord> {
    documents
        .values()
        .find(|record| record.id.matches(reference) || record.source == reference)
        .cloned()
}

impl std::fmt::Debug for IndexManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexManager").finish_non_exhaustive()
    }
}
