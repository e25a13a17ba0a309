use anyhow::{Context, Result};
use extract::{GeminiClient, OllamaClient, PromptOptions};
use layout::LayoutOptions;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub mode: OperationMode,
    pub model: ModelConfig,
    pub retry: RetryConfig,
    pub cache: CacheConfig,
    pub input: InputConfig,
    pub prompt: PromptOptions,
    pub layout: LayoutOptions,
    /// Build a graph from the salvaged part of a response that lacks a section.
    pub accept_partial: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum OperationMode {
    Fast,      // Cache aggressively, small prompts, short layout
    Accurate,  // Always fresh, strict parsing, long layout
    Balanced,  // Default: cache when available, accept salvaged output
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ModelProvider {
    Ollama,
    Gemini,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub provider: ModelProvider,
    /// Provider default when unset.
    pub base_url: Option<String>,
    pub model: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Extra model calls allowed to turn prose output into JSON.
    pub repair_attempts: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_entries: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    pub max_chars: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mode: OperationMode::Balanced,
            model: ModelConfig {
                provider: ModelProvider::Ollama,
                base_url: None,
                model: "llama3".to_string(),
                request_timeout_secs: 60,
            },
            retry: RetryConfig {
                max_retries: 3,
                initial_backoff_ms: 1000,
                max_backoff_ms: 10000,
                repair_attempts: 1,
            },
            cache: CacheConfig {
                enabled: true,
                max_entries: 10000,
            },
            input: InputConfig {
                max_chars: ingest::DEFAULT_MAX_CHARS,
            },
            prompt: PromptOptions::default(),
            layout: LayoutOptions::default(),
            accept_partial: true,
        }
    }
}

impl AppConfig {
    pub fn fast_mode() -> Self {
        let base = Self::default();
        Self {
            mode: OperationMode::Fast,
            model: ModelConfig {
                request_timeout_secs: 30,
                ..base.model
            },
            retry: RetryConfig {
                max_retries: 2,
                initial_backoff_ms: 500,
                max_backoff_ms: 5000,
                repair_attempts: 0,
            },
            cache: CacheConfig {
                enabled: true,
                max_entries: 50000,
            },
            prompt: PromptOptions {
                max_entities: 15,
                ..base.prompt
            },
            layout: LayoutOptions {
                iterations: 30,
                ..base.layout
            },
            ..base
        }
    }

    pub fn accurate_mode() -> Self {
        let base = Self::default();
        Self {
            mode: OperationMode::Accurate,
            model: ModelConfig {
                request_timeout_secs: 120,
                ..base.model
            },
            retry: RetryConfig {
                max_retries: 5,
                initial_backoff_ms: 2000,
                max_backoff_ms: 20000,
                repair_attempts: 2,
            },
            cache: CacheConfig {
                enabled: false,
                max_entries: 0,
            },
            prompt: PromptOptions {
                max_entities: 40,
                ..base.prompt
            },
            layout: LayoutOptions {
                iterations: 200,
                ..base.layout
            },
            accept_partial: false,
            ..base
        }
    }

    pub fn for_mode(mode: OperationMode) -> Self {
        match mode {
            OperationMode::Fast => Self::fast_mode(),
            OperationMode::Accurate => Self::accurate_mode(),
            OperationMode::Balanced => Self::default(),
        }
    }

    /// Config file contents kept by the embedding UI. Missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse configuration JSON")
    }

    /// Mode preset from `KG_MODE`, then individual `KG_*` overrides.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mode = match var("KG_MODE") {
            Some(raw) => parse_var::<OperationModeName>("KG_MODE", &raw)?.0,
            None => OperationMode::Balanced,
        };
        let mut config = Self::for_mode(mode);

        if let Some(raw) = var("KG_PROVIDER") {
            config.model.provider = parse_var::<ProviderName>("KG_PROVIDER", &raw)?.0;
            if config.model.provider == ModelProvider::Gemini && var("KG_MODEL").is_none() {
                config.model.model = GeminiClient::DEFAULT_MODEL.to_string();
            }
        }
        if let Some(model) = var("KG_MODEL") {
            config.model.model = model;
        }
        if let Some(base_url) = var("KG_BASE_URL") {
            config.model.base_url = Some(base_url);
        }
        if let Some(raw) = var("KG_TIMEOUT_SECS") {
            config.model.request_timeout_secs = parse_var("KG_TIMEOUT_SECS", &raw)?;
        }
        if let Some(raw) = var("KG_MAX_INPUT_CHARS") {
            config.input.max_chars = parse_var("KG_MAX_INPUT_CHARS", &raw)?;
        }
        if let Some(raw) = var("KG_CACHE") {
            config.cache.enabled = parse_var("KG_CACHE", &raw)?;
        }
        if let Some(raw) = var("KG_ACCEPT_PARTIAL") {
            config.accept_partial = parse_var("KG_ACCEPT_PARTIAL", &raw)?;
        }

        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.model.request_timeout_secs)
    }

    pub fn ollama_client(&self) -> OllamaClient {
        let base_url = self
            .model
            .base_url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());
        OllamaClient::new(base_url, self.model.model.clone())
    }

    /// The key is handed straight to the client and never stored in the config.
    pub fn gemini_client(&self, api_key: String) -> GeminiClient {
        let base_url = self
            .model
            .base_url
            .clone()
            .unwrap_or_else(|| GeminiClient::DEFAULT_BASE_URL.to_string());
        GeminiClient::new(base_url, self.model.model.clone(), api_key)
    }
}

struct OperationModeName(OperationMode);

impl FromStr for OperationModeName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fast" => Ok(Self(OperationMode::Fast)),
            "accurate" => Ok(Self(OperationMode::Accurate)),
            "balanced" => Ok(Self(OperationMode::Balanced)),
            other => Err(format!("unknown mode '{}'", other)),
        }
    }
}

struct ProviderName(ModelProvider);

impl FromStr for ProviderName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(Self(ModelProvider::Ollama)),
            "gemini" => Ok(Self(ModelProvider::Gemini)),
            other => Err(format!("unknown provider '{}'", other)),
        }
    }
}

fn parse_var<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| anyhow::anyhow!("{}", e))
        .with_context(|| format!("Invalid value for {}: '{}'", key, raw))
}
