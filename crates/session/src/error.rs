use extract::{ExtractError, ModelCallError, ParseError};
use ingest::PromptError;
use thiserror::Error;

/// Why a run produced no graph. The session keeps its previous graph in every case.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Prompt(#[from] PromptError),

    #[error(transparent)]
    ModelCall(#[from] ModelCallError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("no entities or relationships could be extracted")]
    EmptyExtraction,
}

impl From<ExtractError> for PipelineError {
    fn from(e: ExtractError) -> Self {
        match e {
            ExtractError::ModelCall(e) => PipelineError::ModelCall(e),
            ExtractError::Parse(e) => PipelineError::Parse(e),
        }
    }
}

impl PipelineError {
    /// Text for the UI's error banner.
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::Prompt(PromptError::Empty) => {
                "Please enter some text to analyze.".to_string()
            }
            PipelineError::Prompt(PromptError::TooLong { actual, limit }) => format!(
                "The text has {} characters, which is over the limit of {}. Please shorten it.",
                actual, limit
            ),
            // Model failures carry the provider's own message
            PipelineError::ModelCall(e) => format!("Error calling the model: {}", e),
            PipelineError::Parse(_) => {
                "The model's answer could not be read as a knowledge graph. Please try again."
                    .to_string()
            }
            PipelineError::EmptyExtraction => {
                "No entities or relationships could be extracted. Try a longer or more detailed text."
                    .to_string()
            }
        }
    }

    /// Whether resubmitting the same text may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::ModelCall(e) => e.is_transient(),
            PipelineError::Parse(_) => true,
            PipelineError::Prompt(_) | PipelineError::EmptyExtraction => false,
        }
    }
}
