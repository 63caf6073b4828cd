//! Embedder trait, the built-in lexical embedder, and vector utilities.
//!
//! Defines the [`Embedder`] trait that every document representation
//! backend implements. Remote and model-based embedders (OpenAI, Ollama,
//! fastembed) live in the `convo-topics` app crate; this crate ships only
//! the offline [`LexicalEmbedder`].

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;

use crate::text::tokenize;

/// Turns documents into dense vectors for clustering.
///
/// Implementations must return exactly one vector per input text, in input
/// order, all with the same dimensionality.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"all-minilm-l6-v2"`).
    fn model_name(&self) -> &str;

    /// Embed a batch of texts.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// TF-IDF document vectors over a vocabulary built from the batch itself.
///
/// The vocabulary keeps the `max_features` terms with the highest document
/// frequency. IDF is `ln((N + 1) / (df + 1)) + 1`; vectors are
/// L2-normalised. A document with no vocabulary terms maps to the zero
/// vector. Vectors are only comparable within one `embed` call.
#[derive(Debug, Clone)]
pub struct LexicalEmbedder {
    max_features: usize,
    stop_words: bool,
}

impl LexicalEmbedder {
    pub fn new(max_features: usize, stop_words: bool) -> Self {
        Self {
            max_features: max_features.max(1),
            stop_words,
        }
    }

    fn vectorize(&self, texts: &[String]) -> Vec<Vec<f32>> {
        let tokenized: Vec<Vec<String>> = texts
            .iter()
            .map(|t| tokenize(t, self.stop_words))
            .collect();

        let mut doc_freq: HashMap<&str, usize> = HashMap::new();
        for tokens in &tokenized {
            let mut seen: Vec<&str> = tokens.iter().map(String::as_str).collect();
            seen.sort_unstable();
            seen.dedup();
            for token in seen {
                *doc_freq.entry(token).or_insert(0) += 1;
            }
        }

        // DF descending, then term ascending so the vocabulary is deterministic.
        let mut ranked: Vec<(&str, usize)> = doc_freq.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.truncate(self.max_features);

        let n = texts.len() as f32;
        let vocab: HashMap<&str, usize> = ranked
            .iter()
            .enumerate()
            .map(|(idx, (term, _))| (*term, idx))
            .collect();
        let idf: Vec<f32> = ranked
            .iter()
            .map(|(_, df)| ((n + 1.0) / (*df as f32 + 1.0)).ln() + 1.0)
            .collect();

        tokenized
            .iter()
            .map(|tokens| {
                let mut vector = vec![0.0f32; idf.len()];
                if tokens.is_empty() {
                    return vector;
                }
                for token in tokens {
                    if let Some(&idx) = vocab.get(token.as_str()) {
                        vector[idx] += 1.0;
                    }
                }
                let len = tokens.len() as f32;
                for (slot, weight) in vector.iter_mut().zip(idf.iter()) {
                    *slot = *slot / len * weight;
                }
                l2_normalize(&mut vector);
                vector
            })
            .collect()
    }
}

#[async_trait]
impl Embedder for LexicalEmbedder {
    fn model_name(&self) -> &str {
        "lexical-tfidf"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(self.vectorize(texts))
    }
}

/// Scale a vector to unit length in place. Zero vectors are left unchanged.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal (unrelated)
/// - `-1.0` = opposite direction
///
/// Returns `0.0` for empty vectors or vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
