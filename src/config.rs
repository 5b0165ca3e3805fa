use std::{path::PathBuf, time::Duration};

/// Runtime configuration for every external collaborator and tunable.
///
/// Defaults target a fully local stack: Qdrant on `localhost:6333`, Ollama on
/// `localhost:11434`, and an OpenAI-compatible audio server for speech. Any
/// field can be overridden through a `DOCCHAT_*` environment variable; values
/// that fail to parse fall back to the default.
#[derive(Debug, Clone)]
pub struct Config {
    /// Qdrant host.
    pub qdrant_host: String,
    /// Qdrant REST port.
    pub qdrant_port: u16,
    /// Name of the vector collection.
    pub collection: String,

    /// Base URL of the Ollama endpoint serving embeddings and completions.
    pub ollama_url: String,
    /// Embedding model identifier.
    pub embed_model: String,
    /// Dimension of the embedding vectors, used when creating the collection.
    pub embed_dim: usize,
    /// Completion model identifier.
    pub llm_model: String,
    /// Sampling temperature for completions.
    pub temperature: f32,
    /// HTTP request timeout for completions.
    pub request_timeout: Duration,

    /// Number of nearest neighbours fetched per query.
    pub similarity_top_k: usize,
    /// Candidates scoring below this are dropped before synthesis.
    pub similarity_cutoff: f32,
    /// System prompt prepended to every synthesis request.
    pub system_prompt: String,

    /// Maximum chunk size in characters.
    pub chunk_chars: usize,
    /// Overlap between adjacent chunks in characters.
    pub chunk_overlap: usize,

    /// Show progress bars during ingest.
    pub show_progress: bool,

    /// Base URL of the OpenAI-compatible audio API (transcription + speech).
    pub audio_url: String,
    /// Transcription model identifier.
    pub stt_model: String,
    /// Speech synthesis model identifier.
    pub tts_model: String,
    /// Speech synthesis voice.
    pub tts_voice: String,
    /// Fixed recording duration for voice queries.
    pub recording_duration: Duration,
    /// Pre-captured audio clip consumed by the file-backed recorder.
    pub audio_input: Option<PathBuf>,
}

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant. \
     Use the provided context to answer the user's questions.";

impl Default for Config {
    fn default() -> Self {
        Self {
            qdrant_host: "localhost".into(),
            qdrant_port: 6333,
            collection: "docchat".into(),
            ollama_url: "http://localhost:11434".into(),
            embed_model: "nomic-embed-text:latest".into(),
            embed_dim: 768,
            llm_model: "gemma2:2b".into(),
            temperature: 0.1,
            request_timeout: Duration::from_secs(300),
            similarity_top_k: 5,
            similarity_cutoff: 0.2,
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            chunk_chars: 4096,
            chunk_overlap: 0,
            show_progress: true,
            audio_url: "http://localhost:8880".into(),
            stt_model: "whisper-1".into(),
            tts_model: "tts-1".into(),
            tts_voice: "alloy".into(),
            recording_duration: Duration::from_secs(5),
            audio_input: None,
        }
    }
}

impl Config {
    /// Build a configuration from defaults plus `DOCCHAT_*` overrides.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        override_string(&mut config.qdrant_host, "DOCCHAT_QDRANT_HOST");
        override_parsed(&mut config.qdrant_port, "DOCCHAT_QDRANT_PORT");
        override_string(&mut config.collection, "DOCCHAT_COLLECTION");
        override_string(&mut config.ollama_url, "DOCCHAT_OLLAMA_URL");
        override_string(&mut config.embed_model, "DOCCHAT_EMBED_MODEL");
        override_parsed(&mut config.embed_dim, "DOCCHAT_EMBED_DIM");
        override_string(&mut config.llm_model, "DOCCHAT_LLM_MODEL");
        override_parsed(&mut config.temperature, "DOCCHAT_TEMPERATURE");
        override_secs(&mut config.request_timeout, "DOCCHAT_TIMEOUT");
        override_parsed(&mut config.similarity_top_k, "DOCCHAT_TOP_K");
        override_parsed(&mut config.similarity_cutoff, "DOCCHAT_CUTOFF");
        override_string(&mut config.system_prompt, "DOCCHAT_SYSTEM_PROMPT");
        override_parsed(&mut config.chunk_chars, "DOCCHAT_CHUNK_CHARS");
        override_parsed(&mut config.chunk_overlap, "DOCCHAT_CHUNK_OVERLAP");
        override_string(&mut config.audio_url, "DOCCHAT_AUDIO_URL");
        override_string(&mut config.stt_model, "DOCCHAT_STT_MODEL");
        override_string(&mut config.tts_model, "DOCCHAT_TTS_MODEL");
        override_string(&mut config.tts_voice, "DOCCHAT_TTS_VOICE");
        override_secs(
            &mut config.recording_duration,
            "DOCCHAT_RECORDING_SECONDS",
        );

        if let Ok(val) = std::env::var("DOCCHAT_AUDIO_INPUT") {
            config.audio_input = Some(PathBuf::from(val));
        }

        config
    }

    /// Base URL of the Qdrant REST endpoint.
    pub fn qdrant_url(&self) -> String {
        format!("http://{}:{}", self.qdrant_host, self.qdrant_port)
    }
}

fn override_string(field: &mut String, var: &str) {
    if let Ok(val) = std::env::var(var)
        && !val.is_empty()
    {
        *field = val;
    }
}

fn override_parsed<T: std::str::FromStr>(field: &mut T, var: &str) {
    if let Ok(val) = std::env::var(var)
        && let Ok(parsed) = val.parse()
    {
        *field = parsed;
    }
}

fn override_secs(field: &mut Duration, var: &str) {
    if let Ok(val) = std::env::var(var)
        && let Ok(secs) = val.parse::<u64>()
    {
        *field = Duration::from_secs(secs);
    }
}
