//! Error taxonomy shared by every pipeline stage.

use thiserror::Error;

/// Result alias for core pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Pipeline stage names used in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Aggregate,
    Discover,
    Merge,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Aggregate => "aggregate",
            Stage::Discover => "discover",
            Stage::Merge => "merge",
        };
        f.write_str(name)
    }
}

/// Errors raised by the aggregation, discovery, and merge stages.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A row is missing one of the grouping key fields, or a field is malformed.
    #[error("invalid input at row {row}: {reason}")]
    InvalidInput { row: usize, reason: String },

    /// Engine output does not line up with the documents it was computed for.
    #[error("alignment error: {documents} documents but {outputs} {what}")]
    Alignment {
        documents: usize,
        outputs: usize,
        what: &'static str,
    },

    /// The topic engine could not process the document set.
    #[error("topic engine failure: {0:#}")]
    EngineFailure(anyhow::Error),
}

impl PipelineError {
    /// The stage that produces this kind of error.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::InvalidInput { .. } => Stage::Aggregate,
            PipelineError::EngineFailure(_) => Stage::Discover,
            PipelineError::Alignment { .. } => Stage::Merge,
        }
    }

    pub(crate) fn engine(msg: impl std::fmt::Display) -> Self {
        PipelineError::EngineFailure(anyhow::anyhow!("{}", msg))
    }
}
