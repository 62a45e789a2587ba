//! # RAG Bridge
//!
//! A retrieval-augmented FAQ answering service with confidence-gated
//! fallback.
//!
//! RAG Bridge ingests knowledge (FAQ CSV rows, pre-extracted web text)
//! into a deduplicated, embedded chunk store, then answers questions by
//! vector retrieval, confidence gating, grounded synthesis with
//! citation markers, and sanitization — falling back to a fixed contact
//! message when no snippet is confident enough.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌───────────┐
//! │ FAQ CSV  │──▶│ Chunk+Embed  │──▶│  SQLite   │
//! └──────────┘   └──────────────┘   │  + index  │
//!                                   └─────┬─────┘
//!                                         │ query
//!            ┌──────────┐   ┌─────────┐   │
//! question ─▶│ Retrieve │──▶│  Gate   │◀──┘
//!            └──────────┘   └────┬────┘
//!                    grounded    │    fallback
//!                 ┌──────────────┴───────────┐
//!                 ▼                          ▼
//!           ┌───────────┐             ┌────────────┐
//!           │ Synthesize│             │  contact   │
//!           │ +sanitize │             │  message   │
//!           └─────┬─────┘             └─────┬──────┘
//!                 └──────────┬──────────────┘
//!                            ▼
//!                     ┌────────────┐
//!                     │  Threads   │
//!                     └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ragb init                          # create database
//! ragb ingest --csv faq.csv          # chunk, embed, and store the FAQ
//! ragb ask "how long is shipping?"   # one-shot answer with scores
//! ragb serve                         # start the HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`chunk`] | Overlapping sliding-window chunking |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`llm`] | Embedding/generation capabilities (Ollama client) |
//! | [`store`] | Knowledge store with atomic index swap |
//! | [`ingest`] | FAQ CSV ingestion |
//! | [`retrieve`] | Score normalization and confidence gate |
//! | [`sanitize`] | Regex answer sanitization |
//! | [`synth`] | Grounded prompt building and synthesis |
//! | [`threads`] | Conversation thread state |
//! | [`server`] | JSON HTTP server |

pub mod chunk;
pub mod config;
pub mod db;
pub mod ingest;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod retrieve;
pub mod sanitize;
pub mod server;
pub mod store;
pub mod synth;
pub mod threads;
