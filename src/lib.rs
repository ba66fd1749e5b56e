//! # minecollect
//!
//! Hybrid lexical + vector retrieval over ingested documents, with an
//! extractive reader that answers questions using spans of the retrieved
//! text.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌────────────┐   ┌──────────────┐
//! │ Normalizer │──▶│  Embedder  │──▶│ VectorIndex  │──┐
//! │ extract +  │   │  (pooled)  │   ├──────────────┤  │   ┌──────────┐   ┌────────┐
//! │   chunk    │──────────────────▶│ LexicalIndex │──┴──▶│ Retriever│──▶│ Reader │
//! └─────┬──────┘                   └──────────────┘      └──────────┘   └────────┘
//!       │                                 ▲ rebuild
//!       ▼                                 │
//! ┌────────────┐─────────────────────────┘
//! │ ChunkStore │  (SQLite or in-memory; source of truth)
//! └────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Documents, chunks, results, answers |
//! | [`extract`] | Format detection and text extraction |
//! | [`normalize`] | Chunking strategies |
//! | [`embedding`] | Embedder trait, providers, batching pool |
//! | [`vector_index`] | Partitioned (IVF) cosine index |
//! | [`lexical_index`] | BM25 inverted index |
//! | [`retriever`] | Hybrid score fusion |
//! | [`reader`] | Extractive span reader |
//! | [`orchestrator`] | Question answering end to end |
//! | [`indexer`] | Ingest, delete, rebuild |
//! | [`store`] | Relational chunk store |
//! | [`pipeline`] | Component wiring |
//! | [`server`] | HTTP API |

pub mod config;
pub mod connector_fs;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod indexer;
pub mod lexical_index;
pub mod migrate;
pub mod models;
pub mod normalize;
pub mod orchestrator;
pub mod pipeline;
pub mod reader;
pub mod retriever;
pub mod server;
pub mod store;
pub mod tokenize;
pub mod vector_index;

pub use error::{EngineError, Result};
