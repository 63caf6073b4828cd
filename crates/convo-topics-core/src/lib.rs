//! # convo-topics core
//!
//! Runtime-agnostic logic for convo-topics: record and document models,
//! the aggregator, the topic engine contract and its density-clustering
//! implementation, and the result merger.
//!
//! This crate performs no filesystem or network I/O. Embedding backends
//! and persistence adapters live in the `convo-topics` app crate and plug
//! in through the [`embedding::Embedder`] and [`engine::TopicEngine`] traits.
//!
//! ```text
//! RawRecord ──▶ aggregate ──▶ Document ──▶ TopicEngine::discover ──▶ merge ──▶ LabeledDocument
//! ```

pub mod aggregate;
pub mod cluster;
pub mod ctfidf;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod merge;
pub mod models;
pub mod pipeline;
pub mod text;
