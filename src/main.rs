//! # RAG Bridge CLI (`ragb`)
//!
//! The `ragb` binary drives the FAQ answering service: database
//! initialization, FAQ ingestion, one-shot question answering, and the
//! HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! ragb --config ./config/ragb.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragb init` | Create the SQLite database and run schema migrations |
//! | `ragb ingest` | Ingest the FAQ CSV (chunk, embed, dedup-upsert) |
//! | `ragb ask "<question>"` | Answer one question and print scores |
//! | `ragb serve` | Start the JSON HTTP server |

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use rag_bridge::config::{load_config, Config};
use rag_bridge::llm::{Embedder, OllamaClient};
use rag_bridge::retrieve::{self, ConfidenceGate, Decision};
use rag_bridge::server::{run_server, AppState};
use rag_bridge::store::KnowledgeStore;
use rag_bridge::threads::ConversationStore;
use rag_bridge::{db, ingest, migrate, synth};

/// RAG Bridge CLI — a retrieval-augmented FAQ answering service.
#[derive(Parser)]
#[command(
    name = "ragb",
    about = "RAG Bridge — a retrieval-augmented FAQ answering service with confidence-gated fallback",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ragb.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Ingest the FAQ CSV: parse, chunk, embed, and store with dedup.
    Ingest {
        /// Override the configured FAQ CSV path.
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Replace the store contents instead of upserting.
        #[arg(long)]
        rebuild: bool,
    },

    /// Answer a single question and print the retrieval scores.
    Ask {
        /// The question to answer.
        question: String,
    },

    /// Start the HTTP server.
    Serve,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Init => run_init(&config).await,
        Commands::Ingest { csv, rebuild } => run_ingest_cmd(&config, csv, rebuild).await,
        Commands::Ask { question } => run_ask(&config, &question).await,
        Commands::Serve => run_serve(config).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn open_store(config: &Config) -> Result<KnowledgeStore> {
    let pool = db::connect(&config.db.path).await?;
    migrate::run_migrations(&pool).await?;
    Ok(KnowledgeStore::open(pool))
}

async fn run_init(config: &Config) -> Result<()> {
    open_store(config).await?;
    println!("initialized {}", config.db.path.display());
    Ok(())
}

async fn run_ingest_cmd(config: &Config, csv: Option<PathBuf>, rebuild: bool) -> Result<()> {
    let store = open_store(config).await?;
    let _ = store.load().await;
    let client = OllamaClient::new(&config.llm)?;
    ingest::run_ingest(config, &client, &store, csv.as_deref(), rebuild).await?;
    Ok(())
}

async fn run_ask(config: &Config, question: &str) -> Result<()> {
    let store = open_store(config).await?;
    if store.load().await.is_none() {
        println!("Knowledge store is empty. Run `ragb ingest` first.");
    }
    let client = OllamaClient::new(&config.llm)?;

    let ranked = match client.embed(question).await {
        Ok(vector) => retrieve::retrieve(&store, &vector, config.retrieval.top_k),
        Err(e) => {
            eprintln!("[KB RETRIEVAL ERROR] {e:#}");
            Vec::new()
        }
    };

    for (i, r) in ranked.iter().enumerate() {
        println!(
            "{}. [{:.3}] {} — {}",
            i + 1,
            r.similarity,
            r.chunk.display_title(),
            r.chunk.content.chars().take(80).collect::<String>()
        );
    }

    let gate = ConfidenceGate::new(
        config.retrieval.confidence_threshold,
        config.retrieval.max_sources,
    );
    let answer = match gate.decide(ranked) {
        Decision::Grounded(grounded) => synth::synthesize(&client, question, &grounded).await,
        Decision::Fallback => config.retrieval.fallback_message.clone(),
    };

    println!();
    println!("{answer}");
    Ok(())
}

async fn run_serve(config: Config) -> Result<()> {
    let store = Arc::new(open_store(&config).await?);

    // Warm the index: restore persisted chunks, or rebuild from the
    // configured CSV when nothing usable is on disk. Neither failure
    // stops the server; it comes up with an empty store and every chat
    // lands on the fallback path until a reload succeeds.
    let client = Arc::new(OllamaClient::new(&config.llm)?);
    match store.load().await {
        Some(count) => println!("[STARTUP] knowledge index loaded. chunks={count}"),
        None => {
            if config.ingest.csv_path.is_some() {
                match ingest::run_ingest(&config, client.as_ref(), &store, None, true).await {
                    Ok(count) => println!("[STARTUP] knowledge index rebuilt. chunks={count}"),
                    Err(e) => eprintln!("[STARTUP] knowledge rebuild failed: {e:#}"),
                }
            } else {
                println!("[STARTUP] knowledge store empty; no CSV configured");
            }
        }
    }

    let state = AppState {
        config: Arc::new(config),
        store,
        threads: Arc::new(ConversationStore::new()),
        embedder: client.clone(),
        generator: client,
    };

    run_server(state).await
}
