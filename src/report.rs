//! Topic catalog reporting.
//!
//! Renders a [`TopicModel`] either as a fixed-width overview table with
//! per-topic keywords (`ctopics run`, `ctopics inspect`) or as pretty JSON
//! (`ctopics inspect --json`). Reports go to stdout; logs stay on stderr.

use anyhow::Result;
use serde::Serialize;
use std::io::Write;

use convo_topics_core::ctfidf::Keyword;
use convo_topics_core::engine::TopicModel;
use convo_topics_core::models::TopicId;
use convo_topics_core::pipeline::RunSummary;

/// Keywords shown per topic in the table view.
const TABLE_KEYWORDS: usize = 5;

#[derive(Serialize)]
struct CatalogExport<'a> {
    language: &'a str,
    embedding_model: &'a str,
    created_at: String,
    topics: Vec<CatalogTopic<'a>>,
}

#[derive(Serialize)]
struct CatalogTopic<'a> {
    topic: TopicId,
    count: usize,
    name: &'a str,
    keywords: &'a [Keyword],
    representative_docs: &'a [String],
}

/// Print the overview table and keyword lists.
pub fn write_table<W: Write>(out: &mut W, model: &TopicModel) -> Result<()> {
    writeln!(out, "Topics ({} found, model {})", model.topic_count(), model.embedding_model)?;
    writeln!(out, "{}", "=".repeat(40))?;
    writeln!(out)?;
    writeln!(out, "  {:>6} {:>7}   {}", "TOPIC", "COUNT", "NAME")?;
    writeln!(out, "  {}", "-".repeat(60))?;
    for info in model.topic_info() {
        writeln!(out, "  {:>6} {:>7}   {}", info.topic, info.count, info.name)?;
    }

    for topic in &model.topics {
        writeln!(out)?;
        writeln!(out, "  Topic {}:", topic.id)?;
        if topic.keywords.is_empty() {
            writeln!(out, "    (no keywords)")?;
        }
        for kw in topic.keywords.iter().take(TABLE_KEYWORDS) {
            writeln!(out, "    {:<24} {:.4}", kw.term, kw.weight)?;
        }
    }
    writeln!(out)?;
    Ok(())
}

/// Print the catalog as pretty JSON.
pub fn write_json<W: Write>(out: &mut W, model: &TopicModel) -> Result<()> {
    let export = CatalogExport {
        language: &model.language,
        embedding_model: &model.embedding_model,
        created_at: model.created_at.to_rfc3339(),
        topics: model
            .topics
            .iter()
            .map(|t| CatalogTopic {
                topic: t.id,
                count: t.size,
                name: &t.label,
                keywords: &t.keywords,
                representative_docs: &t.representative_docs,
            })
            .collect(),
    };
    writeln!(out, "{}", serde_json::to_string_pretty(&export)?)?;
    Ok(())
}

/// One-paragraph run summary, written before the catalog.
pub fn write_summary<W: Write>(out: &mut W, summary: &RunSummary) -> Result<()> {
    writeln!(out, "Run summary")?;
    writeln!(out, "  Records:     {}", summary.records)?;
    writeln!(out, "  Groups:      {}", summary.groups)?;
    writeln!(out, "  Blank:       {} (dropped)", summary.dropped_blank)?;
    if summary.sequence_conflicts > 0 {
        writeln!(out, "  N conflicts: {}", summary.sequence_conflicts)?;
    }
    writeln!(out, "  Documents:   {}", summary.documents)?;
    writeln!(out, "  Topics:      {}", summary.topics)?;
    writeln!(out, "  Outliers:    {}", summary.outliers)?;
    writeln!(out)?;
    Ok(())
}
