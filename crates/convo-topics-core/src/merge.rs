//! Reattaches topic engine output to the documents it was computed for.
//!
//! The join is purely positional: `assignments[i]` belongs to
//! `documents[i]`. Nothing is filtered, sorted, or deduplicated here.

use crate::error::{PipelineError, Result};
use crate::models::{Document, LabeledDocument, TopicId};

/// Zip topic assignments (and optional probabilities) onto documents.
///
/// # Errors
///
/// [`PipelineError::Alignment`] if `assignments`, or `probabilities` when
/// present, does not have exactly one entry per document.
pub fn merge(
    documents: Vec<Document>,
    assignments: &[TopicId],
    probabilities: Option<&[Vec<f32>]>,
) -> Result<Vec<LabeledDocument>> {
    if documents.len() != assignments.len() {
        return Err(PipelineError::Alignment {
            documents: documents.len(),
            outputs: assignments.len(),
            what: "assignments",
        });
    }
    if let Some(probs) = probabilities {
        if probs.len() != documents.len() {
            return Err(PipelineError::Alignment {
                documents: documents.len(),
                outputs: probs.len(),
                what: "probability rows",
            });
        }
    }

    Ok(documents
        .into_iter()
        .zip(assignments.iter().copied())
        .enumerate()
        .map(|(i, (document, topic))| LabeledDocument {
            document,
            topic,
            probabilities: probabilities.map(|p| p[i].clone()),
        })
        .collect())
}
