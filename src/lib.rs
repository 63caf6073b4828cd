//! # convo-topics
//!
//! Batch topic modeling for chat transcripts.
//!
//! Raw message rows are grouped into one document per
//! `(sessionid, group, period)` key, a topic engine assigns every document a
//! topic (or the outlier topic `-1`), and the labeled dataset is written
//! back out together with a reusable model artifact.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────────┐   ┌──────────┐
//! │ CSV / JSONL │──▶│  Aggregator  │──▶│ Topic Engine │──▶│  Merger  │
//! │   records   │   │  (core)      │   │ embed+cluster│   │  (core)  │
//! └─────────────┘   └─────────────┘   └──────────────┘   └────┬─────┘
//!                                                            │
//!                                     ┌──────────────────────┤
//!                                     ▼                      ▼
//!                               ┌───────────┐          ┌──────────┐
//!                               │ labeled   │          │  model   │
//!                               │ CSV       │          │  JSON    │
//!                               └───────────┘          └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ctopics run                      # aggregate, discover topics, write outputs
//! ctopics aggregate                # grouping dry run
//! ctopics inspect out/model.json   # print a saved topic catalog
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`records`] | CSV / JSON-lines record reader |
//! | [`embedding`] | Embedding backends (lexical, OpenAI, Ollama, fastembed) |
//! | [`persist`] | Labeled dataset, document, and model writers |
//! | [`report`] | Topic catalog table and JSON export |
//! | [`progress`] | Run progress on stderr |
//! | [`run`] | Command orchestration |
//!
//! The pure pipeline (aggregation, clustering, keywords, merge) lives in the
//! `convo-topics-core` crate.

pub mod config;
pub mod embedding;
pub mod persist;
pub mod progress;
pub mod records;
pub mod report;
pub mod run;
