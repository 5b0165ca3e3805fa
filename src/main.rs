use std::sync::Arc;

use clap::Parser;
use kdam::{BarExt, tqdm};
use tracing_subscriber::EnvFilter;

use docchat::{
    Config, DataDir, IndexManager,
    chat::{ChatEngine, ChatOptions},
    chunking::ChunkingConfig,
    embedder::{EmbeddingProvider, OllamaEmbedder},
    error::{Error, Result},
    llm::{Llm, OllamaLlm},
    loader,
    speech::{FileAudioInput, HttpSynthesizer, HttpTranscriber},
    vector_store::{QdrantStore, VectorStore},
    voice::{VoiceChat, VoiceOptions},
};

pub mod cli;

use cli::{Cli, Command};

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("DOCCHAT_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

/// Long-lived provider handles, built once and shared by reference.
struct Providers {
    vectors: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
}

fn build_providers(config: &Config) -> Providers {
    Providers {
        vectors: Arc::new(QdrantStore::new(
            config.qdrant_url(),
            &config.collection,
            config.embed_dim,
        )),
        embedder: Arc::new(OllamaEmbedder::new(
            &config.ollama_url,
            &config.embed_model,
            config.embed_dim,
        )),
    }
}

fn build_index(
    config: &Config,
    data_dir: &DataDir,
    providers: &Providers,
) -> Result<IndexManager> {
    IndexManager::initialize(
        &data_dir.store_db(),
        Arc::clone(&providers.vectors),
        Arc::clone(&providers.embedder),
        ChunkingConfig {
            max_chars: config.chunk_chars,
            overlap: config.chunk_overlap,
        },
    )
}

fn build_chat(
    config: &Config,
    index: &IndexManager,
    providers: &Providers,
) -> Result<ChatEngine> {
    let llm: Arc<dyn Llm> = Arc::new(OllamaLlm::new(
        &config.ollama_url,
        &config.llm_model,
        config.temperature,
        config.request_timeout,
    )?);

    Ok(ChatEngine::new(
        index.store(),
        Arc::clone(&providers.vectors),
        Arc::clone(&providers.embedder),
        llm,
        ChatOptions {
            similarity_top_k: config.similarity_top_k,
            similarity_cutoff: config.similarity_cutoff,
            system_prompt: config.system_prompt.clone(),
        },
    ))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    let config = Config::from_env();
    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;

    match cli.command {
        Command::Ingest(args) => cmd_ingest(&config, &data_dir, &args),
        Command::Remove(args) => cmd_remove(&config, &data_dir, &args),
        Command::Ask(args) => cmd_ask(&config, &data_dir, &args),
        Command::Voice(args) => cmd_voice(&config, &data_dir, &args),
        Command::Status(args) => cmd_status(&config, &data_dir, &args),
        Command::Completions(_) => Ok(()),
    }
}

fn cmd_ingest(
    config: &Config,
    data_dir: &DataDir,
    args: &cli::IngestArgs,
) -> Result<()> {
    let mut documents = Vec::new();
    for path in &args.paths {
        documents.extend(loader::load_path(path)?);
    }
    if documents.is_empty() {
        println!("No documents found.");
        return Ok(());
    }

    let providers = build_providers(config);
    let index = build_index(config, data_dir, &providers)?;

    if config.show_progress && !args.no_progress {
        let mut bar = tqdm!(total = documents.len(), desc = "indexing");
        for document in documents {
            index.ingest(vec![document])?;
            bar.update(1)?;
        }
        eprintln!();
    } else {
        index.ingest(documents)?;
    }

    println!(
        "Indexed. {} document(s), {} node(s) total.",
        index.get_document_count()?,
        index.get_node_count()?
    );
    Ok(())
}

fn cmd_remove(
    config: &Config,
    data_dir: &DataDir,
    args: &cli::RemoveArgs,
) -> Result<()> {
    let providers = build_providers(config);
    let index = build_index(config, data_dir, &providers)?;

    index.delete(&args.document)?;
    println!(
        "Removed '{}'. {} document(s), {} node(s) remain.",
        args.document,
        index.get_document_count()?,
        index.get_node_count()?
    );
    Ok(())
}

fn cmd_ask(
    config: &Config,
    data_dir: &DataDir,
    args: &cli::AskArgs,
) -> Result<()> {
    let providers = build_providers(config);
    let index = build_index(config, data_dir, &providers)?;
    let chat = build_chat(config, &index, &providers)?;

    if args.sources {
        match chat.retrieve(&args.query) {
            Ok(results) => {
                for (i, result) in results.iter().enumerate() {
                    eprintln!(
                        "{:>3}. [{:.3}] {} chunk {}",
                        i + 1,
                        result.score,
                        result.node.document,
                        result.node.index
                    );
                }
            }
            Err(e) => eprintln!("Could not list sources: {e}"),
        }
    }

    let answer = chat.answer(&args.query);
    if args.json {
        println!(
            "{}",
            serde_json::json!({ "query": args.query, "answer": answer })
        );
    } else {
        println!("{answer}");
    }
    Ok(())
}

fn cmd_voice(
    config: &Config,
    data_dir: &DataDir,
    args: &cli::VoiceArgs,
) -> Result<()> {
    let input_path = args
        .input
        .clone()
        .or_else(|| config.audio_input.clone())
        .ok_or_else(|| {
            Error::Config(
                "no audio input configured; pass --input or set \
                 DOCCHAT_AUDIO_INPUT"
                    .into(),
            )
        })?;

    let providers = build_providers(config);
    let index = build_index(config, data_dir, &providers)?;
    let chat = build_chat(config, &index, &providers)?;

    let voice = VoiceChat::new(
        chat,
        Box::new(FileAudioInput::new(input_path)),
        Box::new(HttpTranscriber::new(&config.audio_url, &config.stt_model)),
        Box::new(HttpSynthesizer::new(
            &config.audio_url,
            &config.tts_model,
            &config.tts_voice,
        )),
        VoiceOptions {
            recording_duration: config.recording_duration,
            output_path: data_dir.voice_output(),
        },
    );

    let (transcript, response) = voice.run_voice_chat();
    if let Some(transcript) = transcript {
        println!("You said: {transcript}");
    }
    println!("{response}");
    Ok(())
}

fn cmd_status(
    config: &Config,
    data_dir: &DataDir,
    args: &cli::StatusArgs,
) -> Result<()> {
    let providers = build_providers(config);
    let index = build_index(config, data_dir, &providers)?;

    let document_count = index.get_document_count()?;
    let node_count = index.get_node_count()?;

    if args.json {
        println!(
            "{}",
            serde_json::json!({
                "data_dir": data_dir.root().display().to_string(),
                "vector_store": config.qdrant_url(),
                "collection": config.collection,
                "embed_model": config.embed_model,
                "llm_model": config.llm_model,
                "state": index.state().to_string(),
                "documents": document_count,
                "nodes": node_count,
            })
        );
    } else {
        println!("Data directory: {}", data_dir.root().display());
        println!(
            "Vector store: {} (collection '{}')",
            config.qdrant_url(),
            config.collection
        );
        println!("Models: {} / {}", config.embed_model, config.llm_model);
        println!("State: {}", index.state());
        println!("Documents: {document_count}");
        for record in index.documents() {
            println!("  {} {}", record.id, record.source);
        }
        println!("Nodes: {node_count}");
    }
    Ok(())
}
