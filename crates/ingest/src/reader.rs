use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;
use tracing::debug;

use crate::input::{InputSource, InputText};

pub struct FileReader;

impl FileReader {
    /// Read an uploaded document from disk and decode it to plain text.
    pub async fn read_file(path: &Path, max_chars: usize) -> Result<InputText> {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();

        let bytes = fs::read(path)
            .await
            .context(format!("Failed to read file: {:?}", path))?;
        debug!(file = %file_name, bytes = bytes.len(), "Read uploaded document");

        Self::read_bytes(&file_name, &bytes, max_chars)
    }

    /// Decode bytes handed over by an upload widget.
    pub fn read_bytes(file_name: &str, bytes: &[u8], max_chars: usize) -> Result<InputText> {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        match extension.as_str() {
            "txt" | "md" => {
                let text = std::str::from_utf8(bytes)
                    .context(format!("File is not valid UTF-8: {}", file_name))?;
                let source = InputSource::Upload {
                    file_name: file_name.to_string(),
                };
                Ok(InputText::new(text, source, max_chars)?)
            }
            _ => anyhow::bail!("Unsupported file format: {}", extension),
        }
    }
}
