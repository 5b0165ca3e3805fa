//! The retrieval-chat pipeline: embed the query, retrieve nearest nodes,
//! expand and filter them, and synthesize an answer.
//!
//! `answer` is the user-facing surface and never propagates an error; every
//! failure is logged and mapped to a fixed apology. Retrieval is a pure read
//! pipeline over the store's committed snapshot.

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::{
    embedder::EmbeddingProvider,
    error::Result,
    llm::Llm,
    store::{Node, NodeStore},
    vector_store::VectorStore,
};

pub const ERROR_APOLOGY: &str = "I apologize, but an error occurred while \
     processing your request. Please try again or contact support if the \
     issue persists.";

pub const EMPTY_RESPONSE_APOLOGY: &str = "I apologize, but I couldn't \
     generate a response based on the retrieved information. This might be \
     due to insufficient or irrelevant context. Could you please rephrase \
     your question or ask about a different topic?";

/// Upper bound on the compacted context handed to the model.
const MAX_CONTEXT_CHARS: usize = 8000;

/// Tunables for the retrieval pipeline.
#[derive(Debug, Clone)]
pub struct ChatOptions {
    /// Nearest neighbours fetched per query.
    pub similarity_top_k: usize,
    /// Candidates scoring below this are dropped before synthesis.
    pub similarity_cutoff: f32,
    /// System prompt for the synthesis request.
    pub system_prompt: String,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            similarity_top_k: 5,
            similarity_cutoff: 0.2,
            system_prompt: crate::config::DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

/// A retrieval candidate after postprocessing.
#[derive(Debug, Clone)]
pub struct RetrievedNode {
    pub node: Node,
    pub score: f32,
    /// Node text expanded with its prev/next neighbours.
    pub window: String,
}

/// Answers natural-language queries against the current index.
///
/// Construction is cheap; long-lived handles (store, providers) are shared
/// by reference from the composition root.
pub struct ChatEngine {
    store: Arc<NodeStore>,
    vectors: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    llm: Arc<dyn Llm>,
    options: ChatOptions,
}

impl ChatEngine {
    pub fn new(
        store: Arc<NodeStore>,
        vectors: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn Llm>,
        options: ChatOptions,
    ) -> Self {
        Self {
            store,
            vectors,
            embedder,
            llm,
            options,
        }
    }

    /// Answer a query. Never fails: pipeline errors become a fixed apology,
    /// an empty model response becomes the fixed empty-response message.
    pub fn answer(&self, query: &str) -> String {
        match self.try_answer(query) {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                warn!("empty response from language model");
                EMPTY_RESPONSE_APOLOGY.to_string()
            }
            Err(e) => {
                error!(error = %e, "chat pipeline failed");
                ERROR_APOLOGY.to_string()
            }
        }
    }

    fn try_answer(&self, query: &str) -> Result<String> {
        let candidates = self.retrieve(query)?;
        if candidates.is_empty() {
            // Intentionally still ask the model: a "no context" answer comes
            // from the model, not from a hand-coded reply.
            debug!("no candidates above cutoff, answering without context");
        }
        let context = compact_context(&candidates);
        self.llm
            .complete(&self.options.system_prompt, &build_prompt(&context, query))
    }

    /// Run retrieval and postprocessing:
    /// 1. embed the query and fetch top-K neighbours (descending score)
    /// 2. expand each hit's text with its prev/next window
    /// 3. drop hits below the similarity cutoff
    pub fn retrieve(&self, query: &str) -> Result<Vec<RetrievedNode>> {
        let query_vector = self.embedder.embed(query)?;
        let hits = self
            .vectors
            .query(&query_vector, self.options.similarity_top_k)?;
        debug!(hits = hits.len(), "retrieved candidates");

        let mut results = Vec::with_capacity(hits.len());
        for hit in hits {
            let Some(node) = self.store.node(hit.id)? else {
                // The vector store can be momentarily ahead of or behind the
                // local snapshot; a dangling hit is skipped, not an error.
                debug!(id = hit.id, "hit without a stored node, skipping");
                continue;
            };
            let window = expand_window(&self.store, &node)?;
            results.push(RetrievedNode {
                node,
                score: hit.score,
                window,
            });
        }

        results.retain(|r| r.score >= self.options.similarity_cutoff);
        Ok(results)
    }
}

/// Replace a node's text with the window spanning its prev/next siblings.
fn expand_window(store: &NodeStore, node: &Node) -> Result<String> {
    let mut parts = Vec::with_capacity(3);
    if let Some(prev) = node.prev
        && let Some(previous) = store.node(prev)?
    {
        parts.push(previous.text);
    }
    parts.push(node.text.clone());
    if let Some(next) = node.next
        && let Some(following) = store.node(next)?
    {
        parts.push(following.text);
    }
    Ok(parts.join("\n"))
}

/// Join candidate windows into one bounded context block.
fn compact_context(candidates: &[RetrievedNode]) -> String {
    let mut context = String::new();
    for candidate in candidates {
        if !context.is_empty() {
            context.push_str("\n\n---\n\n");
        }
        context.push_str(candidate.window.trim());
    }

    if context.chars().count() > MAX_CONTEXT_CHARS {
        let cut = context
            .char_indices()
            .nth(MAX_CONTEXT_CHARS)
            .map(|(byte_idx, _)| byte_idx)
            .unwrap_or(context.len());
        context.truncate(cut);
        context.push_str("...");
    }
    context
}

fn build_prompt(context: &str, query: &str) -> String {
    format!(
        "Context information is below.\n\
         ---------------------\n\
         {context}\n\
         ---------------------\n\
         Given the context information and not prior knowledge, answer the \
         query.\n\
         Query: {query}\n\
         Answer:"
    )
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, sync::Mutex};

    use super::*;
    use crate::{
        doc_id::DocumentId,
        error::Error,
        store::PendingWrite,
        vector_store::{ScoredPoint, VectorPoint},
    };

    struct MockEmbedder;

    const KEYWORDS: [&str; 4] = ["rust", "pasta", "garden", "music"];

    fn keyword_vector(text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        KEYWORDS
            .iter()
            .map(|kw| if lower.contains(kw) { 1.0 } else { 0.0 })
            .collect()
    }

    impl EmbeddingProvider for MockEmbedder {
        fn embed(&self, text: &str) -> Result<Vec<f32>> {
            Ok(keyword_vector(text))
        }

        fn model_name(&self) -> &str {
            "mock-embed"
        }

        fn dimensions(&self) -> usize {
            KEYWORDS.len()
        }
    }

    struct FailingEmbedder;

    impl EmbeddingProvider for FailingEmbedder {
        fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(Error::provider("embedding", "mock outage"))
        }

        fn model_name(&self) -> &str {
            "failing-embed"
        }

        fn dimensions(&self) -> usize {
            KEYWORDS.len()
        }
    }

    #[derive(Default)]
    struct MemoryVectorStore {
        points: Mutex<HashMap<u64, Vec<f32>>>,
    }

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        if na == 0.0 || nb == 0.0 { 0.0 } else { dot / (na * nb) }
    }

    impl VectorStore for MemoryVectorStore {
        fn ensure_ready(&self) -> Result<()> {
            Ok(())
        }

        fn upsert(&self, points: &[VectorPoint]) -> Result<()> {
            let mut map = self.points.lock().unwrap();
            for point in points {
                map.insert(point.id, point.vector.clone());
            }
            Ok(())
        }

        fn delete(&self, ids: &[u64]) -> Result<()> {
            let mut map = self.points.lock().unwrap();
            for id in ids {
                map.remove(id);
            }
            Ok(())
        }

        fn query(
            &self,
            vector: &[f32],
            top_k: usize,
        ) -> Result<Vec<ScoredPoint>> {
            let map = self.points.lock().unwrap();
            let mut hits: Vec<ScoredPoint> = map
                .iter()
                .map(|(id, v)| ScoredPoint {
                    id: *id,
                    score: cosine(vector, v),
                })
                .collect();
            hits.sort_by(|a, b| b.score.total_cmp(&a.score));
            hits.truncate(top_k);
            Ok(hits)
        }
    }

    /// LLM that records its prompts and echoes a canned answer.
    struct RecordingLlm {
        prompts: Mutex<Vec<String>>,
        reply: &'static str,
    }

    impl RecordingLlm {
        fn new(reply: &'static str) -> Self {
            Self {
                prompts: Mutex::new(Vec::new()),
                reply,
            }
        }
    }

    impl Llm for RecordingLlm {
        fn complete(&self, _system: &str, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.reply.to_string())
        }

        fn model_name(&self) -> &str {
            "recording-llm"
        }
    }

    struct FailingLlm;

    impl Llm for FailingLlm {
        fn complete(&self, _system: &str, _prompt: &str) -> Result<String> {
            Err(Error::provider("llm", "mock outage"))
        }

        fn model_name(&self) -> &str {
            "failing-llm"
        }
    }

    /// Store three linked nodes about distinct topics and index their
    /// vectors.
    fn seeded_engine(
        llm: Arc<dyn Llm>,
    ) -> (tempfile::TempDir, ChatEngine, Arc<MemoryVectorStore>) {
        let tmp = tempfile::tempdir().unwrap();
        let store =
            Arc::new(NodeStore::open(&tmp.path().join("store.redb")).unwrap());
        let vectors = Arc::new(MemoryVectorStore::default());

        let document = DocumentId::from_source("notes/a.md");
        let texts = [
            "Rust is a systems programming language.",
            "Cook pasta in salted boiling water.",
            "Water the garden every morning.",
        ];
        let mut writes = Vec::new();
        for (i, text) in texts.iter().enumerate() {
            let id = 100 + i as u64;
            writes.push(PendingWrite::PutNode(Node {
                id,
                document: document.clone(),
                index: i,
                text: text.to_string(),
                prev: (i > 0).then(|| id - 1),
                next: (i + 1 < texts.len()).then(|| id + 1),
                embedding: keyword_vector(text),
            }));
            vectors
                .upsert(&[VectorPoint {
                    id,
                    vector: keyword_vector(text),
                    payload: serde_json::json!({}),
                }])
                .unwrap();
        }
        store.apply(&writes).unwrap();

        let engine = ChatEngine::new(
            store,
            Arc::clone(&vectors) as Arc<dyn VectorStore>,
            Arc::new(MockEmbedder),
            llm,
            ChatOptions::default(),
        );
        (tmp, engine, vectors)
    }

    #[test]
    fn retrieve_ranks_and_filters_by_cutoff() {
        let llm = Arc::new(RecordingLlm::new("answer"));
        let (_tmp, engine, _vectors) = seeded_engine(llm);

        let results = engine.retrieve("tell me about rust").unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].node.text, "Rust is a systems programming language.");
        for result in &results {
            assert!(result.score >= 0.2);
        }
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn retrieve_expands_windows_with_neighbours() {
        let llm = Arc::new(RecordingLlm::new("answer"));
        let (_tmp, engine, _vectors) = seeded_engine(llm);

        let results = engine.retrieve("pasta recipe").unwrap();
        let top = &results[0];
        assert!(top.window.contains("Rust is a systems"));
        assert!(top.window.contains("Cook pasta"));
        assert!(top.window.contains("Water the garden"));
    }

    #[test]
    fn answer_includes_context_in_prompt() {
        let llm = Arc::new(RecordingLlm::new("Pasta goes in boiling water."));
        let (_tmp, engine, _vectors) =
            seeded_engine(Arc::clone(&llm) as Arc<dyn Llm>);

        let answer = engine.answer("how do I cook pasta?");
        assert_eq!(answer, "Pasta goes in boiling water.");

        let prompts = llm.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Cook pasta in salted boiling water."));
        assert!(prompts[0].contains("Query: how do I cook pasta?"));
    }

    #[test]
    fn empty_candidates_still_invoke_the_model() {
        let llm = Arc::new(RecordingLlm::new("I have no context for that."));
        let (_tmp, engine, _vectors) =
            seeded_engine(Arc::clone(&llm) as Arc<dyn Llm>);

        // No keyword overlap: every candidate scores 0, below the cutoff.
        let answer = engine.answer("quantum entanglement");
        assert_eq!(answer, "I have no context for that.");
        assert_eq!(llm.prompts.lock().unwrap().len(), 1);
    }

    #[test]
    fn empty_query_does_not_panic() {
        let llm = Arc::new(RecordingLlm::new("nothing to go on"));
        let (_tmp, engine, _vectors) = seeded_engine(llm);

        let answer = engine.answer("");
        assert!(!answer.is_empty());
    }

    #[test]
    fn provider_failure_returns_fixed_apology() {
        let (_tmp, engine, _vectors) = seeded_engine(Arc::new(FailingLlm));
        assert_eq!(engine.answer("anything"), ERROR_APOLOGY);
    }

    #[test]
    fn embedding_failure_returns_fixed_apology() {
        let tmp = tempfile::tempdir().unwrap();
        let store =
            Arc::new(NodeStore::open(&tmp.path().join("store.redb")).unwrap());
        let engine = ChatEngine::new(
            store,
            Arc::new(MemoryVectorStore::default()),
            Arc::new(FailingEmbedder),
            Arc::new(RecordingLlm::new("unused")),
            ChatOptions::default(),
        );
        assert_eq!(engine.answer("anything"), ERROR_APOLOGY);
    }

    #[test]
    fn empty_model_response_returns_empty_response_apology() {
        let (_tmp, engine, _vectors) =
            seeded_engine(Arc::new(RecordingLlm::new("  ")));
        assert_eq!(engine.answer("rust"), EMPTY_RESPONSE_APOLOGY);
    }

    #[test]
    fn dangling_vector_hits_are_skipped() {
        let llm = Arc::new(RecordingLlm::new("answer"));
        let (_tmp, engine, vectors) = seeded_engine(llm);

        // A vector with no stored node, similar to everything.
        vectors
            .upsert(&[VectorPoint {
                id: 999,
                vector: vec![1.0, 1.0, 1.0, 1.0],
                payload: serde_json::json!({}),
            }])
            .unwrap();

        let results = engine.retrieve("rust").unwrap();
        assert!(results.iter().all(|r| r.node.id != 999));
    }

    #[test]
    fn compact_context_caps_length() {
        let node = Node {
            id: 1,
            document: DocumentId::from_source("big.md"),
            index: 0,
            text: String::new(),
            prev: None,
            next: None,
            embedding: vec![],
        };
        let candidates = vec![RetrievedNode {
            node,
            score: 1.0,
            window: "x".repeat(20_000),
        }];
        let context = compact_context(&candidates);
        assert!(context.chars().count() <= MAX_CONTEXT_CHARS + 3);
        assert!(context.ends_with("..."));
    }
}
