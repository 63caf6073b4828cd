//! Topic engine contract and the density-clustering implementation.
//!
//! A [`TopicEngine`] takes an ordered batch of non-empty document texts and
//! returns one topic id per document (aligned by position), optional
//! per-document probability distributions, and a [`TopicModel`]: the
//! queryable, serializable catalog of what was discovered.
//!
//! [`DensityTopicEngine`] embeds documents with a pluggable [`Embedder`],
//! clusters them with [`crate::cluster`], numbers topics by descending size,
//! and describes each topic with class-based TF-IDF keywords. When no
//! cluster can be formed every document is an outlier; that is a normal
//! result, not an error.

use std::collections::BTreeMap;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cluster::{cluster, DensityParams};
use crate::ctfidf::{topic_keywords, Keyword};
use crate::embedding::{cosine_similarity, l2_normalize, Embedder};
use crate::error::{PipelineError, Result};
use crate::models::{TopicId, OUTLIER_TOPIC};

/// Version written into serialized models; [`TopicModel::load`] rejects others.
pub const MODEL_FORMAT_VERSION: u32 = 1;

/// Number of keywords joined into a topic's label.
const LABEL_WORDS: usize = 4;

/// Representative documents kept per topic.
const REPRESENTATIVE_DOCS: usize = 3;

/// Output of one discovery pass.
#[derive(Debug, Clone)]
pub struct Discovery {
    /// One topic id per input document, in input order.
    pub assignments: Vec<TopicId>,
    /// One distribution over non-outlier topics per input document, when requested.
    pub probabilities: Option<Vec<Vec<f32>>>,
    pub model: TopicModel,
}

/// Pluggable topic discovery capability.
#[async_trait]
pub trait TopicEngine: Send + Sync {
    /// Discover topics in `documents`.
    ///
    /// `language` is a locale hint (e.g. `"english"`). Implementations must
    /// return exactly one assignment per document, each either a topic in
    /// the returned catalog or [`OUTLIER_TOPIC`].
    ///
    /// # Errors
    ///
    /// [`PipelineError::EngineFailure`] when the document set cannot be
    /// processed at all (empty batch, blank document, backend failure).
    async fn discover(
        &self,
        documents: &[String],
        language: &str,
        want_probabilities: bool,
    ) -> Result<Discovery>;
}

/// Tunables of [`DensityTopicEngine`], persisted with the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    pub min_cluster_size: usize,
    pub min_samples: usize,
    pub top_n_words: usize,
    /// Remove English stop words from keywords when the language is English.
    pub stop_words: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            min_cluster_size: 10,
            min_samples: 10,
            top_n_words: 10,
            stop_words: true,
        }
    }
}

/// One discovered topic, or the outlier bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub id: TopicId,
    pub size: usize,
    pub label: String,
    pub keywords: Vec<Keyword>,
    pub representative_docs: Vec<String>,
}

/// Row of the topic overview table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicInfo {
    pub topic: TopicId,
    pub count: usize,
    pub name: String,
}

/// Queryable catalog and persisted state of a discovery pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicModel {
    pub format_version: u32,
    pub created_at: DateTime<Utc>,
    pub language: String,
    pub embedding_model: String,
    pub settings: EngineSettings,
    /// Ordered by id; the outlier topic comes first when present.
    pub topics: Vec<Topic>,
    /// Unit-length centroid per non-outlier topic, indexed by topic id.
    pub centroids: Vec<Vec<f32>>,
}

impl TopicModel {
    /// Topic overview: id, member count, and label for every topic.
    pub fn topic_info(&self) -> Vec<TopicInfo> {
        self.topics
            .iter()
            .map(|t| TopicInfo {
                topic: t.id,
                count: t.size,
                name: t.label.clone(),
            })
            .collect()
    }

    /// Ordered `(keyword, weight)` list of a topic, or `None` for unknown ids.
    pub fn topic_keywords(&self, id: TopicId) -> Option<&[Keyword]> {
        self.topic(id).map(|t| t.keywords.as_slice())
    }

    pub fn topic(&self, id: TopicId) -> Option<&Topic> {
        self.topics.iter().find(|t| t.id == id)
    }

    /// Number of non-outlier topics.
    pub fn topic_count(&self) -> usize {
        self.centroids.len()
    }

    /// Serialize to an opaque byte blob.
    pub fn serialize(&self) -> anyhow::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).context("Failed to serialize topic model")
    }

    /// Restore a model produced by [`TopicModel::serialize`].
    pub fn load(bytes: &[u8]) -> anyhow::Result<Self> {
        let model: TopicModel =
            serde_json::from_slice(bytes).context("Failed to parse topic model")?;
        if model.format_version != MODEL_FORMAT_VERSION {
            anyhow::bail!(
                "Unsupported topic model format version {} (expected {})",
                model.format_version,
                MODEL_FORMAT_VERSION
            );
        }
        Ok(model)
    }
}

/// Whether a language hint selects English stop-word removal.
pub fn is_english(language: &str) -> bool {
    matches!(language.to_ascii_lowercase().as_str(), "english" | "en")
}

/// Embedding + density clustering + c-TF-IDF topic engine.
pub struct DensityTopicEngine {
    embedder: Box<dyn Embedder>,
    settings: EngineSettings,
}

impl DensityTopicEngine {
    pub fn new(embedder: Box<dyn Embedder>, settings: EngineSettings) -> Self {
        Self { embedder, settings }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    async fn embed_checked(&self, documents: &[String]) -> Result<Vec<Vec<f32>>> {
        let vectors = self
            .embedder
            .embed(documents)
            .await
            .with_context(|| format!("embedding with {} failed", self.embedder.model_name()))
            .map_err(PipelineError::EngineFailure)?;

        if vectors.len() != documents.len() {
            return Err(PipelineError::engine(format!(
                "embedder returned {} vectors for {} documents",
                vectors.len(),
                documents.len()
            )));
        }
        if let Some(first) = vectors.first() {
            let dim = first.len();
            if let Some(pos) = vectors.iter().position(|v| v.len() != dim) {
                return Err(PipelineError::engine(format!(
                    "embedding {} has dimension {} but expected {}",
                    pos,
                    vectors[pos].len(),
                    dim
                )));
            }
        }
        Ok(vectors)
    }
}

#[async_trait]
impl TopicEngine for DensityTopicEngine {
    async fn discover(
        &self,
        documents: &[String],
        language: &str,
        want_probabilities: bool,
    ) -> Result<Discovery> {
        if documents.is_empty() {
            return Err(PipelineError::engine("no documents to model"));
        }
        if let Some(pos) = documents.iter().position(|d| d.trim().is_empty()) {
            return Err(PipelineError::engine(format!("document {} is blank", pos)));
        }

        tracing::info!(
            documents = documents.len(),
            embedder = self.embedder.model_name(),
            "discovering topics"
        );
        let vectors = self.embed_checked(documents).await?;

        let params = DensityParams {
            min_cluster_size: self.settings.min_cluster_size,
            min_samples: self.settings.min_samples,
        };
        let raw = cluster(&vectors, params);
        let assignments = number_by_size(&raw);
        let topic_count = assignments.iter().copied().max().map_or(0, |m| (m + 1).max(0)) as usize;

        let centroids: Vec<Vec<f32>> = (0..topic_count as TopicId)
            .map(|id| centroid(&vectors, &assignments, id))
            .collect();

        let stop_words = self.settings.stop_words && is_english(language);
        let mut keywords = topic_keywords(
            documents,
            &assignments,
            self.settings.top_n_words,
            stop_words,
        );

        let outliers = assignments.iter().filter(|a| **a == OUTLIER_TOPIC).count();
        let mut ids: Vec<TopicId> = Vec::with_capacity(topic_count + 1);
        if outliers > 0 {
            ids.push(OUTLIER_TOPIC);
        }
        ids.extend(0..topic_count as TopicId);

        let topics = ids
            .into_iter()
            .map(|id| {
                let kw = keywords.remove(&id).unwrap_or_default();
                let center = if id == OUTLIER_TOPIC {
                    centroid(&vectors, &assignments, id)
                } else {
                    centroids[id as usize].clone()
                };
                Topic {
                    id,
                    size: assignments.iter().filter(|a| **a == id).count(),
                    label: label(id, &kw),
                    representative_docs: representatives(documents, &vectors, &assignments, id, &center),
                    keywords: kw,
                }
            })
            .collect();

        let probabilities = want_probabilities.then(|| {
            vectors
                .iter()
                .map(|v| distribution(v, &centroids))
                .collect::<Vec<_>>()
        });

        tracing::info!(
            documents = documents.len(),
            topics = topic_count,
            outliers,
            "topic discovery finished"
        );

        Ok(Discovery {
            assignments,
            probabilities,
            model: TopicModel {
                format_version: MODEL_FORMAT_VERSION,
                created_at: Utc::now(),
                language: language.to_string(),
                embedding_model: self.embedder.model_name().to_string(),
                settings: self.settings.clone(),
                topics,
                centroids,
            },
        })
    }
}

/// Map raw cluster labels to topic ids `0..k` by descending size, ties by
/// first member position. Noise maps to [`OUTLIER_TOPIC`].
fn number_by_size(raw: &[Option<usize>]) -> Vec<TopicId> {
    let mut stats: BTreeMap<usize, (usize, usize)> = BTreeMap::new();
    for (pos, label) in raw.iter().enumerate() {
        if let Some(l) = label {
            let entry = stats.entry(*l).or_insert((0, pos));
            entry.0 += 1;
        }
    }
    let mut order: Vec<(usize, usize, usize)> =
        stats.into_iter().map(|(l, (size, first))| (l, size, first)).collect();
    order.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.2.cmp(&b.2)));
    let ids: BTreeMap<usize, TopicId> = order
        .iter()
        .enumerate()
        .map(|(id, (l, _, _))| (*l, id as TopicId))
        .collect();

    raw.iter()
        .map(|label| label.map_or(OUTLIER_TOPIC, |l| ids[&l]))
        .collect()
}

fn centroid(vectors: &[Vec<f32>], assignments: &[TopicId], id: TopicId) -> Vec<f32> {
    let dim = vectors.first().map_or(0, Vec::len);
    let mut sum = vec![0.0f32; dim];
    for (v, a) in vectors.iter().zip(assignments) {
        if *a == id {
            for (s, x) in sum.iter_mut().zip(v) {
                *s += x;
            }
        }
    }
    l2_normalize(&mut sum);
    sum
}

fn representatives(
    documents: &[String],
    vectors: &[Vec<f32>],
    assignments: &[TopicId],
    id: TopicId,
    center: &[f32],
) -> Vec<String> {
    let mut members: Vec<(usize, f32)> = assignments
        .iter()
        .enumerate()
        .filter(|(_, a)| **a == id)
        .map(|(i, _)| (i, cosine_similarity(&vectors[i], center)))
        .collect();
    members.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    members
        .into_iter()
        .take(REPRESENTATIVE_DOCS)
        .map(|(i, _)| documents[i].clone())
        .collect()
}

fn label(id: TopicId, keywords: &[Keyword]) -> String {
    let mut parts = vec![id.to_string()];
    parts.extend(keywords.iter().take(LABEL_WORDS).map(|k| k.term.clone()));
    parts.join("_")
}

/// Clamped cosine similarity to each centroid, normalised to sum to 1.
fn distribution(vector: &[f32], centroids: &[Vec<f32>]) -> Vec<f32> {
    let mut sims: Vec<f32> = centroids
        .iter()
        .map(|c| cosine_similarity(vector, c).max(0.0))
        .collect();
    let total: f32 = sims.iter().sum();
    if total > f32::EPSILON {
        for s in &mut sims {
            *s /= total;
        }
    }
    sims
}
