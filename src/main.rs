//! # minecollect CLI
//!
//! Ingest documents into a hybrid lexical + vector index and ask
//! questions answered by extractive spans.
//!
//! | Command | Description |
//! |---------|-------------|
//! | `minecollect init` | Create the SQLite database and run migrations |
//! | `minecollect ingest <path>` | Ingest a file or a directory |
//! | `minecollect search "<query>"` | Ranked chunks with previews |
//! | `minecollect ask "<question>"` | Extractive answers with sources |
//! | `minecollect similar "<query>"` | Retrieval only |
//! | `minecollect delete <document-id>` | Tombstone a document |
//! | `minecollect rebuild` | Rebuild both indexes from the store |
//! | `minecollect serve` | Start the HTTP server |
//!
//! Results are printed as JSON on stdout; logs go to stderr.

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use minecollect::config::{self, Config, FilesystemConnectorConfig};
use minecollect::connector_fs::{document_from_file, scan_directory};
use minecollect::orchestrator::AskRequest;
use minecollect::pipeline::Pipeline;
use minecollect::{db, migrate, server};

#[derive(Parser)]
#[command(
    name = "minecollect",
    about = "Hybrid lexical + vector retrieval with extractive question answering",
    version
)]
struct Cli {
    /// Path to a TOML configuration file. Built-in defaults are used when
    /// omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and schema. Safe to run repeatedly.
    Init,

    /// Ingest a file, or every supported file under a directory.
    Ingest {
        path: PathBuf,
    },

    /// Search indexed chunks.
    Search {
        query: String,

        #[arg(long)]
        limit: Option<usize>,

        /// 0.0 is lexical only, 1.0 is vector only.
        #[arg(long)]
        semantic_weight: Option<f64>,
    },

    /// Answer a question from indexed documents.
    Ask {
        question: String,

        #[arg(long)]
        top_k: Option<usize>,

        /// Maximum number of answers.
        #[arg(long)]
        answers: Option<usize>,

        #[arg(long)]
        semantic_weight: Option<f64>,
    },

    /// Retrieve the chunks closest to a query.
    Similar {
        query: String,

        #[arg(long)]
        k: Option<usize>,
    },

    /// Delete a document and all of its chunks.
    Delete {
        document_id: uuid::Uuid,
    },

    /// Rebuild both indexes from stored chunks, re-embedding stale vectors.
    Rebuild,

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    match path {
        Some(path) => config::load_config(path),
        None => {
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("minecollect=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = load(cli.config.as_ref())?;

    if let Commands::Init = cli.command {
        let pool = db::connect(&cfg.db).await?;
        migrate::run_migrations(&pool).await?;
        return print_json(&serde_json::json!({
            "status": "initialized",
            "db": cfg.db.path.display().to_string(),
        }));
    }
    if let Commands::Serve = cli.command {
        return server::run_server(&cfg).await;
    }

    let pipeline = Pipeline::open(&cfg).await?;

    match cli.command {
        Commands::Ingest { path } => {
            let docs = if path.is_dir() {
                let mut fs = cfg
                    .connectors
                    .filesystem
                    .clone()
                    .unwrap_or_else(|| FilesystemConnectorConfig::new(&path));
                fs.root = path;
                scan_directory(&fs)?
            } else {
                vec![document_from_file(&path)?]
            };
            let report = pipeline.indexer.ingest_all(docs).await?;
            print_json(&report)?;
        }
        Commands::Search {
            query,
            limit,
            semantic_weight,
        } => {
            let hits = pipeline
                .orchestrator
                .search(&query, limit, semantic_weight)
                .await?;
            print_json(&hits)?;
        }
        Commands::Ask {
            question,
            top_k,
            answers,
            semantic_weight,
        } => {
            let request = AskRequest {
                question,
                top_k,
                max_answers: answers,
                semantic_weight,
            };
            print_json(&pipeline.orchestrator.ask(request).await?)?;
        }
        Commands::Similar { query, k } => {
            let k = k.unwrap_or(pipeline.orchestrator.defaults().search_limit);
            print_json(&pipeline.orchestrator.similar(&query, k).await?)?;
        }
        Commands::Delete { document_id } => {
            let removed = pipeline
                .indexer
                .delete_document(&document_id)
                .await
                .with_context(|| format!("deleting document {}", document_id))?;
            print_json(&serde_json::json!({
                "document_id": document_id,
                "removed_chunks": removed,
            }))?;
        }
        Commands::Rebuild => {
            print_json(&pipeline.indexer.rebuild().await?)?;
        }
        Commands::Init | Commands::Serve => {}
    }

    Ok(())
}
