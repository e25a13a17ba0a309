use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use unicode_segmentation::UnicodeSegmentation;

pub const DEFAULT_MAX_CHARS: usize = 100_000;
pub const PREVIEW_GRAPHEMES: usize = 500;

/// Input text that cannot be turned into a prompt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PromptError {
    #[error("input text is empty")]
    Empty,

    #[error("input text is {actual} characters long, the limit is {limit}")]
    TooLong { actual: usize, limit: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputSource {
    Direct,
    Upload { file_name: String },
}

/// Text accepted for extraction. Construction enforces the non-empty and size rules.
#[derive(Debug, Clone, Serialize)]
pub struct InputText {
    source: InputSource,
    text: String,
    digest: String,
}

impl InputText {
    pub fn new(
        text: impl Into<String>,
        source: InputSource,
        max_chars: usize,
    ) -> Result<Self, PromptError> {
        let text = text.into();
        validate_text(&text, max_chars)?;
        let digest = generate_digest(&text);

        Ok(Self {
            source,
            text,
            digest,
        })
    }

    /// Text typed or pasted straight into the UI.
    pub fn direct(text: impl Into<String>, max_chars: usize) -> Result<Self, PromptError> {
        Self::new(text, InputSource::Direct, max_chars)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn source(&self) -> &InputSource {
        &self.source
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }

    pub fn preview(&self) -> String {
        preview(&self.text, PREVIEW_GRAPHEMES)
    }
}

pub fn validate_text(text: &str, max_chars: usize) -> Result<(), PromptError> {
    if text.trim().is_empty() {
        return Err(PromptError::Empty);
    }

    let actual = text.chars().count();
    if actual > max_chars {
        return Err(PromptError::TooLong {
            actual,
            limit: max_chars,
        });
    }

    Ok(())
}

/// Stable identifier for a piece of text
pub fn generate_digest(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..16])
}

/// First `max_graphemes` user-visible characters, with "..." when cut.
pub fn preview(text: &str, max_graphemes: usize) -> String {
    let mut graphemes = text.graphemes(true);
    let head: String = graphemes.by_ref().take(max_graphemes).collect();

    if graphemes.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}
