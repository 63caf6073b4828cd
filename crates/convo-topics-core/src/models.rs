//! Core data models for the aggregation and labeling pipeline.
//!
//! These types represent the raw message rows, the aggregated documents,
//! and the labeled output that flow between pipeline stages.

use serde::{Deserialize, Serialize};

/// Integer topic identifier assigned by a topic engine.
pub type TopicId = i32;

/// Reserved topic id for documents the engine could not confidently assign.
pub const OUTLIER_TOPIC: TopicId = -1;

/// One message event as read from the record store.
///
/// Key fields are optional here because the source may omit them; the
/// aggregator rejects rows where any of them is absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    pub session_id: Option<String>,
    pub group: Option<String>,
    pub period: Option<String>,
    /// The `N` column: an ordering or count field, carried as the source text.
    pub sequence: Option<String>,
    pub message: Option<String>,
}

impl RawRecord {
    pub fn new(
        session_id: impl Into<String>,
        group: impl Into<String>,
        period: impl Into<String>,
        sequence: Option<&str>,
        message: Option<&str>,
    ) -> Self {
        Self {
            session_id: Some(session_id.into()),
            group: Some(group.into()),
            period: Some(period.into()),
            sequence: sequence.map(str::to_string),
            message: message.map(str::to_string),
        }
    }
}

/// Composite grouping identity of a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentKey {
    pub session_id: String,
    pub group: String,
    pub period: String,
}

/// All messages for one `(session_id, group, period)` key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub key: DocumentKey,
    /// Carried from the representative row chosen by the sequence policy.
    pub sequence: Option<String>,
    pub text: String,
}

/// A document with its topic attached by the merger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabeledDocument {
    pub document: Document,
    pub topic: TopicId,
    /// Distribution over non-outlier topics, ordered by topic id.
    pub probabilities: Option<Vec<f32>>,
}
