//! Command orchestration.
//!
//! Coordinates the full flow: record store → aggregator → topic engine →
//! merger → persistence. Nothing is written until every stage has
//! succeeded, so a failed run leaves no partial output.

use anyhow::Result;
use std::path::{Path, PathBuf};

use convo_topics_core::aggregate::Aggregation;
use convo_topics_core::engine::DensityTopicEngine;
use convo_topics_core::error::PipelineError;
use convo_topics_core::pipeline::{aggregate_stage, discover_stage, PipelineOptions, PipelineOutput};

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::persist;
use crate::progress::{ProgressEvent, ProgressReporter, RunPhase};
use crate::records::read_records;
use crate::report;

/// Per-invocation path overrides from the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub model: Option<PathBuf>,
}

impl Overrides {
    pub fn apply(self, config: &mut Config) {
        if let Some(input) = self.input {
            config.input.path = input;
        }
        if let Some(output) = self.output {
            config.output.dataset = output;
        }
        if let Some(model) = self.model {
            config.output.model = Some(model);
        }
    }
}

pub fn pipeline_options(config: &Config) -> PipelineOptions {
    PipelineOptions {
        sequence_policy: config.aggregation.sequence_policy,
        language: config.topics.language.clone(),
        calculate_probabilities: config.topics.calculate_probabilities,
    }
}

/// Attach the failed stage to a core error.
fn stage_error(err: PipelineError) -> anyhow::Error {
    let stage = err.stage();
    anyhow::Error::new(err).context(format!("{} stage failed", stage))
}

/// Run the full pipeline and persist its outputs.
pub async fn run_topics(config: &Config, progress: &dyn ProgressReporter) -> Result<PipelineOutput> {
    progress.report(ProgressEvent::Started {
        phase: RunPhase::Reading,
        items: 0,
    });
    let records = read_records(&config.input.path, config.input.resolved_format())?;
    progress.report(ProgressEvent::Finished {
        phase: RunPhase::Reading,
        items: records.len() as u64,
    });

    let options = pipeline_options(config);
    progress.report(ProgressEvent::Started {
        phase: RunPhase::Aggregating,
        items: records.len() as u64,
    });
    let aggregation = aggregate_stage(&records, &options).map_err(stage_error)?;
    progress.report(ProgressEvent::Finished {
        phase: RunPhase::Aggregating,
        items: aggregation.documents.len() as u64,
    });

    let embedder = create_embedder(&config.embedding, &config.topics)?;
    let embedding_model = embedder.model_name().to_string();
    let engine = DensityTopicEngine::new(embedder, config.topics.engine_settings());

    tracing::info!(
        embedding = %embedding_model,
        language = %config.topics.language,
        min_cluster_size = engine.settings().min_cluster_size,
        "starting topic discovery"
    );
    progress.report(ProgressEvent::Started {
        phase: RunPhase::Discovering,
        items: aggregation.documents.len() as u64,
    });
    let output = discover_stage(aggregation, records.len(), &engine, &options)
        .await
        .map_err(stage_error)?;
    progress.report(ProgressEvent::Finished {
        phase: RunPhase::Discovering,
        items: output.summary.documents as u64,
    });
    tracing::info!(
        documents = output.summary.documents,
        topics = output.summary.topics,
        outliers = output.summary.outliers,
        "pipeline finished"
    );

    progress.report(ProgressEvent::Started {
        phase: RunPhase::Writing,
        items: output.labeled.len() as u64,
    });
    // Both artifacts are staged before either is moved into place.
    let dataset = persist::stage_labeled_csv(
        &config.output.dataset,
        &output.labeled,
        output.model.topic_count(),
        config.output.include_probabilities,
    )?;
    let model = match &config.output.model {
        Some(path) => Some(persist::stage_model(path, &output.model)?),
        None => None,
    };
    if let Some(model) = model {
        model.commit()?;
    }
    dataset.commit()?;
    progress.report(ProgressEvent::Finished {
        phase: RunPhase::Writing,
        items: output.labeled.len() as u64,
    });

    Ok(output)
}

/// Run only the aggregator and write the grouped documents.
pub fn run_aggregate(config: &Config, progress: &dyn ProgressReporter) -> Result<Aggregation> {
    let records = read_records(&config.input.path, config.input.resolved_format())?;

    progress.report(ProgressEvent::Started {
        phase: RunPhase::Aggregating,
        items: records.len() as u64,
    });
    let aggregation = aggregate_stage(&records, &pipeline_options(config)).map_err(stage_error)?;
    progress.report(ProgressEvent::Finished {
        phase: RunPhase::Aggregating,
        items: aggregation.documents.len() as u64,
    });

    persist::write_documents_csv(&config.output.dataset, &aggregation.documents)?;
    Ok(aggregation)
}

/// Print a saved model's catalog to stdout.
pub fn run_inspect(path: &Path, json: bool) -> Result<()> {
    let model = persist::read_model(path)?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if json {
        report::write_json(&mut out, &model)
    } else {
        report::write_table(&mut out, &model)
    }
}
