//! End-to-end composition: aggregate, discover, merge.
//!
//! Stages run strictly one after another. The texts handed to the engine
//! are taken from the aggregated documents in order, and the same order is
//! used for the merge.

use crate::aggregate::{aggregate_with, Aggregation, SequencePolicy};
use crate::engine::{TopicEngine, TopicModel};
use crate::error::Result;
use crate::merge::merge;
use crate::models::{LabeledDocument, RawRecord};

/// Per-run options.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub sequence_policy: SequencePolicy,
    pub language: String,
    pub calculate_probabilities: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            sequence_policy: SequencePolicy::First,
            language: "english".to_string(),
            calculate_probabilities: true,
        }
    }
}

/// Counters describing a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub records: usize,
    pub groups: usize,
    pub dropped_blank: usize,
    pub sequence_conflicts: usize,
    pub documents: usize,
    pub topics: usize,
    pub outliers: usize,
}

/// Result of a complete run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub labeled: Vec<LabeledDocument>,
    pub model: TopicModel,
    pub summary: RunSummary,
}

/// Run the aggregation stage alone.
pub fn aggregate_stage(records: &[RawRecord], options: &PipelineOptions) -> Result<Aggregation> {
    let aggregation = aggregate_with(records, options.sequence_policy)?;
    tracing::info!(
        records = records.len(),
        groups = aggregation.groups,
        documents = aggregation.documents.len(),
        dropped_blank = aggregation.dropped_blank,
        "aggregated records"
    );
    if aggregation.sequence_conflicts > 0 {
        tracing::warn!(
            groups = aggregation.sequence_conflicts,
            policy = ?options.sequence_policy,
            "groups carry conflicting N values; kept one per policy"
        );
    }
    Ok(aggregation)
}

/// Discover topics for an aggregation and merge the labels back.
///
/// `records` is the raw row count the aggregation was built from; it is only
/// reported in the summary.
pub async fn discover_stage(
    aggregation: Aggregation,
    records: usize,
    engine: &dyn TopicEngine,
    options: &PipelineOptions,
) -> Result<PipelineOutput> {
    let texts: Vec<String> = aggregation
        .documents
        .iter()
        .map(|d| d.text.clone())
        .collect();

    let discovery = engine
        .discover(&texts, &options.language, options.calculate_probabilities)
        .await?;

    let labeled = merge(
        aggregation.documents,
        &discovery.assignments,
        discovery.probabilities.as_deref(),
    )?;

    let summary = RunSummary {
        records,
        groups: aggregation.groups,
        dropped_blank: aggregation.dropped_blank,
        sequence_conflicts: aggregation.sequence_conflicts,
        documents: labeled.len(),
        topics: discovery.model.topic_count(),
        outliers: labeled
            .iter()
            .filter(|l| l.topic == crate::models::OUTLIER_TOPIC)
            .count(),
    };

    Ok(PipelineOutput {
        labeled,
        model: discovery.model,
        summary,
    })
}

/// Aggregate `records`, discover topics with `engine`, and merge the result.
///
/// Either the complete labeled dataset is returned or an error naming the
/// failed stage; there is no partial output.
pub async fn run_pipeline(
    records: &[RawRecord],
    engine: &dyn TopicEngine,
    options: &PipelineOptions,
) -> Result<PipelineOutput> {
    let aggregation = aggregate_stage(records, options)?;
    discover_stage(aggregation, records.len(), engine, options).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::LexicalEmbedder;
    use crate::engine::{Discovery, DensityTopicEngine, EngineSettings};
    use crate::error::{PipelineError, Stage};
    use crate::models::OUTLIER_TOPIC;
    use async_trait::async_trait;
    use chrono::Utc;

    /// Assigns topic `i % 2` to document `i`, optionally dropping the last one.
    struct ScriptedEngine {
        short: bool,
    }

    #[async_trait]
    impl TopicEngine for ScriptedEngine {
        async fn discover(
            &self,
            documents: &[String],
            language: &str,
            want_probabilities: bool,
        ) -> Result<Discovery> {
            let mut assignments: Vec<i32> = (0..documents.len()).map(|i| (i % 2) as i32).collect();
            if self.short {
                assignments.pop();
            }
            let probabilities = want_probabilities.then(|| {
                assignments
                    .iter()
                    .map(|a| if *a == 0 { vec![1.0, 0.0] } else { vec![0.0, 1.0] })
                    .collect()
            });
            Ok(Discovery {
                assignments,
                probabilities,
                model: TopicModel {
                    format_version: crate::engine::MODEL_FORMAT_VERSION,
                    created_at: Utc::now(),
                    language: language.to_string(),
                    embedding_model: "scripted".into(),
                    settings: EngineSettings::default(),
                    topics: Vec::new(),
                    centroids: vec![vec![1.0], vec![1.0]],
                },
            })
        }
    }

    fn rows() -> Vec<RawRecord> {
        vec![
            RawRecord::new("s1", "g1", "p1", Some("1"), Some("hi")),
            RawRecord::new("s1", "g1", "p1", Some("2"), Some("there")),
            RawRecord::new("s2", "g1", "p1", Some("1"), Some("")),
            RawRecord::new("s3", "g2", "p1", Some("1"), Some("price")),
            RawRecord::new("s4", "g2", "p2", Some("1"), Some("offer")),
        ]
    }

    #[tokio::test]
    async fn labels_follow_aggregated_order() {
        let out = run_pipeline(&rows(), &ScriptedEngine { short: false }, &PipelineOptions::default())
            .await
            .unwrap();

        let sessions: Vec<_> = out
            .labeled
            .iter()
            .map(|l| l.document.key.session_id.as_str())
            .collect();
        assert_eq!(sessions, vec!["s1", "s3", "s4"]);
        let topics: Vec<_> = out.labeled.iter().map(|l| l.topic).collect();
        assert_eq!(topics, vec![0, 1, 0]);
        assert_eq!(out.labeled[0].document.text, "hi there");
        assert_eq!(out.labeled[1].probabilities.as_deref(), Some(&[0.0, 1.0][..]));

        assert_eq!(out.summary.records, 5);
        assert_eq!(out.summary.groups, 4);
        assert_eq!(out.summary.dropped_blank, 1);
        assert_eq!(out.summary.documents, 3);
        assert_eq!(out.summary.topics, 2);
        assert_eq!(out.summary.outliers, 0);
    }

    #[tokio::test]
    async fn stages_compose_like_the_full_pipeline() {
        let options = PipelineOptions::default();
        let aggregation = aggregate_stage(&rows(), &options).unwrap();
        assert_eq!(aggregation.documents.len(), 3);

        let staged = discover_stage(aggregation, 5, &ScriptedEngine { short: false }, &options)
            .await
            .unwrap();
        let whole = run_pipeline(&rows(), &ScriptedEngine { short: false }, &options)
            .await
            .unwrap();
        assert_eq!(staged.summary, whole.summary);
        assert_eq!(staged.labeled, whole.labeled);
    }

    #[tokio::test]
    async fn misaligned_engine_output_fails_in_merge() {
        let err = run_pipeline(&rows(), &ScriptedEngine { short: true }, &PipelineOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Alignment { .. }));
        assert_eq!(err.stage(), Stage::Merge);
    }

    #[tokio::test]
    async fn invalid_rows_fail_before_discovery() {
        let mut bad = rows();
        bad[3].group = None;
        let err = run_pipeline(&bad, &ScriptedEngine { short: false }, &PipelineOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.stage(), Stage::Aggregate);
    }

    #[tokio::test]
    async fn all_blank_input_fails_in_discovery() {
        let blank = vec![RawRecord::new("s1", "g1", "p1", Some("1"), None)];
        let engine = DensityTopicEngine::new(
            Box::new(LexicalEmbedder::new(64, true)),
            EngineSettings::default(),
        );
        let err = run_pipeline(&blank, &engine, &PipelineOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.stage(), Stage::Discover);
    }

    #[tokio::test]
    async fn outlier_only_run_succeeds() {
        let records = vec![
            RawRecord::new("s1", "g1", "p1", Some("1"), Some("see you at noon")),
            RawRecord::new("s2", "g1", "p1", Some("1"), Some("see you at noon!")),
            RawRecord::new("s3", "g1", "p1", Some("1"), Some("see you at noon then")),
        ];
        let engine = DensityTopicEngine::new(
            Box::new(LexicalEmbedder::new(64, true)),
            EngineSettings::default(),
        );
        let out = run_pipeline(&records, &engine, &PipelineOptions::default())
            .await
            .unwrap();
        assert_eq!(out.labeled.len(), 3);
        assert!(out.labeled.iter().all(|l| l.topic == OUTLIER_TOPIC));
        assert_eq!(out.summary.outliers, 3);
        assert_eq!(out.summary.topics, 0);
    }
}
