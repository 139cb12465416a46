pub mod documents;
pub mod extract;
pub mod image;
pub mod inference;
pub mod orchestrator;
pub mod processor;
pub mod prompt;
pub mod taxonomy;
pub mod validation;

pub use documents::*;
pub use extract::*;
pub use self::image::*;
pub use inference::*;
pub use orchestrator::*;
pub use processor::*;
pub use prompt::*;
pub use taxonomy::*;
pub use validation::*;

use thiserror::Error;

use crate::models::enums::Stage;

/// Fatal failures of one pipeline run. Per-item enrichment problems are
/// not errors; they are collected as [`ItemFailure`]s instead.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error("{stage} call failed: {source}")]
    Inference {
        stage: Stage,
        #[source]
        source: InferenceError,
    },

    #[error("{stage} response unusable: {source}")]
    Extraction {
        stage: Stage,
        #[source]
        source: ExtractionError,
    },

    #[error("No valid risk entries in formatted output ({rejected} rejected)")]
    NoValidRisks { rejected: usize },

    #[error("Enrichment failed for every risk ({failed} items)")]
    NoEnrichedRisks { failed: usize },
}

impl PipelineError {
    pub fn is_input_error(&self) -> bool {
        matches!(self, PipelineError::Input(_))
    }
}
