pub mod error;
pub mod llm;
pub mod normalizer;
pub mod parser;
pub mod prompt;
pub mod schema;

pub use error::{ModelCallError, ParseError};
pub use llm::{GeminiClient, ModelClient, OllamaClient};
pub use normalizer::{FoldingNormalizer, NameNormalizer};
pub use parser::ResponseParser;
pub use prompt::{PromptBuilder, PromptOptions};
pub use schema::{
    EntityDraft, EntityType, ExtractionResult, RelationshipDraft, ValidationWarning, Validity,
};

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error(transparent)]
    ModelCall(#[from] ModelCallError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Prompt -> model -> parser for one piece of text.
pub struct Extractor<C> {
    llm_client: C,
    prompt_builder: PromptBuilder,
    parser: ResponseParser,
    timeout: Duration,
    repair_attempts: usize,
}

impl<C: ModelClient> Extractor<C> {
    pub fn new(llm_client: C, options: PromptOptions, normalizer: Arc<dyn NameNormalizer>) -> Self {
        Self {
            llm_client,
            prompt_builder: PromptBuilder::new(options),
            parser: ResponseParser::new(normalizer),
            timeout: Duration::from_secs(60),
            repair_attempts: 0,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// How many times to ask the model to fix output that contained no JSON at all.
    pub fn with_repair_attempts(mut self, attempts: usize) -> Self {
        self.repair_attempts = attempts;
        self
    }

    pub fn model_id(&self) -> &str {
        self.llm_client.model_id()
    }

    pub fn client(&self) -> &C {
        &self.llm_client
    }

    pub fn build_prompt(&self, text: &str) -> String {
        self.prompt_builder.build(text)
    }

    /// One model call under the configured timeout.
    pub async fn generate(&self, prompt: &str) -> Result<String, ModelCallError> {
        match tokio::time::timeout(self.timeout, self.llm_client.generate(prompt)).await {
            Ok(result) => result,
            Err(_) => Err(ModelCallError::Timeout {
                secs: self.timeout.as_secs(),
            }),
        }
    }

    pub fn parse(&self, raw: &str) -> Result<ExtractionResult, ParseError> {
        self.parser.parse(raw)
    }

    /// Parse, and when the response has no JSON at all, ask the model to repair it.
    pub async fn parse_with_repair(&self, raw: &str) -> Result<ExtractionResult, ExtractError> {
        let mut current = raw.to_string();

        for attempt in 0..=self.repair_attempts {
            match self.parser.parse(&current) {
                Err(ParseError::NoStructuredData) if attempt < self.repair_attempts => {
                    warn!(attempt = attempt + 1, "No JSON in model output, requesting repair");
                    current = self.generate(&prompt::build_repair_prompt(&current)).await?;
                }
                other => return Ok(other?),
            }
        }

        Err(ParseError::NoStructuredData.into())
    }

    /// Extract entities and relationships from a piece of text
    pub async fn extract_from_text(&self, text: &str) -> Result<ExtractionResult, ExtractError> {
        let prompt = self.build_prompt(text);
        let raw = self.generate(&prompt).await?;
        let result = self.parse_with_repair(&raw).await?;

        info!(
            entities = result.entities.len(),
            relationships = result.relationships.len(),
            dropped = result.dropped_count,
            "Extraction finished"
        );
        Ok(result)
    }
}
