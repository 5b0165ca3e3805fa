//! docchat - a local retrieval-augmented chat assistant for your documents.
//!
//! docchat ingests markdown and text files, chunks and embeds them through a
//! local [Ollama](https://ollama.com) endpoint, indexes the vectors in
//! [Qdrant](https://qdrant.tech), and answers text or voice queries by
//! retrieving relevant chunks and synthesizing an answer with a local
//! language model. Node and document content is persisted in a local redb
//! store so the index survives restarts.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use docchat::{
//!     ChatEngine, Config, DataDir, IndexManager,
//!     chat::ChatOptions,
//!     chunking::ChunkingConfig,
//!     embedder::OllamaEmbedder,
//!     llm::OllamaLlm,
//!     loader,
//!     vector_store::QdrantStore,
//! };
//!
//! let config = Config::from_env();
//! let data_dir = DataDir::resolve(None).unwrap();
//!
//! let vectors = Arc::new(QdrantStore::new(
//!     config.qdrant_url(),
//!     &config.collection,
//!     config.embed_dim,
//! ));
//! let embedder = Arc::new(OllamaEmbedder::new(
//!     &config.ollama_url,
//!     &config.embed_model,
//!     config.embed_dim,
//! ));
//! let index = IndexManager::initialize(
//!     &data_dir.store_db(),
//!     vectors.clone(),
//!     embedder.clone(),
//!     ChunkingConfig::default(),
//! )
//! .unwrap();
//!
//! let documents = loader::load_path("notes/".as_ref()).unwrap();
//! index.ingest(documents).unwrap();
//!
//! let llm = Arc::new(
//!     OllamaLlm::new(
//!         &config.ollama_url,
//!         &config.llm_model,
//!         config.temperature,
//!         config.request_timeout,
//!     )
//!     .unwrap(),
//! );
//! let chat = ChatEngine::new(
//!     index.store(),
//!     vectors,
//!     embedder,
//!     llm,
//!     ChatOptions::default(),
//! );
//! println!("{}", chat.answer("what do my notes say about pasta?"));
//! ```

pub mod chat;
pub mod chunking;
pub mod config;
pub mod data_dir;
pub mod doc_id;
pub mod embedder;
pub mod error;
pub mod index;
pub mod llm;
pub mod loader;
pub mod speech;
pub mod store;
pub mod vector_store;
pub mod voice;

pub use chat::ChatEngine;
pub use config::Config;
pub use data_dir::DataDir;
pub use doc_id::DocumentId;
pub use error::{Error, Result};
pub use index::{IndexManager, IndexState};
pub use store::{Document, Node, NodeStore};
pub use voice::VoiceChat;
