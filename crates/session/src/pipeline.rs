use extract::prompt::build_repair_prompt;
use extract::{
    ExtractionResult, Extractor, FoldingNormalizer, ModelCallError, ModelClient, NameNormalizer,
    ParseError,
};
use graph::GraphAssembler;
use ingest::input::validate_text;
use ingest::{FileReader, InputText};
use layout::LayoutEngine;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::{CacheStats, ResponseCache};
use crate::config::AppConfig;
use crate::error::PipelineError;
use crate::metrics::{Metrics, TimedOperation};
use crate::retry::RetryPolicy;
use crate::view::GraphView;

/// State owned by one UI session. Passed into each run and left untouched when a run fails.
#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    current: Option<GraphView>,
    runs: usize,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            current: None,
            runs: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The graph from the last successful run.
    pub fn current(&self) -> Option<&GraphView> {
        self.current.as_ref()
    }

    /// Number of successful runs.
    pub fn runs(&self) -> usize {
        self.runs
    }

    pub fn clear(&mut self) {
        self.current = None;
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Text -> prompt -> model -> parse -> assemble -> layout.
pub struct Pipeline<C> {
    extractor: Extractor<C>,
    assembler: GraphAssembler,
    layout_engine: LayoutEngine,
    retry_policy: RetryPolicy,
    cache: Option<ResponseCache>,
    metrics: Arc<Metrics>,
    config: AppConfig,
}

impl<C: ModelClient> Pipeline<C> {
    pub fn new(client: C, config: AppConfig) -> Self {
        Self::with_normalizer(client, config, Arc::new(FoldingNormalizer))
    }

    /// The parser and the assembler share `normalizer`, so both agree on entity identity.
    pub fn with_normalizer(
        client: C,
        config: AppConfig,
        normalizer: Arc<dyn NameNormalizer>,
    ) -> Self {
        let extractor = Extractor::new(client, config.prompt.clone(), normalizer.clone())
            .with_timeout(config.request_timeout());
        let cache = config
            .cache
            .enabled
            .then(|| ResponseCache::new(config.cache.max_entries));

        info!(
            mode = ?config.mode,
            model = extractor.model_id(),
            cache = config.cache.enabled,
            "Pipeline ready"
        );

        Self {
            extractor,
            assembler: GraphAssembler::new(normalizer),
            layout_engine: LayoutEngine::new(config.layout.clone()),
            retry_policy: RetryPolicy::from_config(&config.retry),
            cache,
            metrics: Metrics::new(),
            config,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(ResponseCache::stats)
    }

    /// Text typed into the UI, checked against the configured ceiling.
    pub fn direct_input(&self, text: impl Into<String>) -> Result<InputText, PipelineError> {
        Ok(InputText::direct(text, self.config.input.max_chars)?)
    }

    /// An uploaded `.txt` or `.md` document.
    pub fn upload_input(&self, file_name: &str, bytes: &[u8]) -> anyhow::Result<InputText> {
        FileReader::read_bytes(file_name, bytes, self.config.input.max_chars)
    }

    /// Convenience for direct text entry.
    pub async fn run_text<'s>(
        &self,
        session: &'s mut Session,
        text: &str,
    ) -> Result<&'s GraphView, PipelineError> {
        let input = self.direct_input(text)?;
        self.run(session, &input).await
    }

    /// Build a graph for `input` and make it the session's current graph.
    pub async fn run<'s>(
        &self,
        session: &'s mut Session,
        input: &InputText,
    ) -> Result<&'s GraphView, PipelineError> {
        let timer = TimedOperation::start();
        let outcome = self.execute(input).await;
        self.metrics.record_run(outcome.is_ok());

        match outcome {
            Ok(view) => {
                session.runs += 1;
                info!(
                    session_id = %session.id,
                    digest = input.digest(),
                    entities = view.stats.node_count,
                    relationships = view.stats.edge_count,
                    dropped = view.dropped_count,
                    partial = view.partial,
                    elapsed_ms = timer.elapsed().as_millis() as u64,
                    "Graph built"
                );
                let view: &GraphView = session.current.insert(view);
                Ok(view)
            }
            Err(e) => {
                warn!(
                    session_id = %session.id,
                    error = %e,
                    retryable = e.is_retryable(),
                    "Run failed, previous graph kept"
                );
                Err(e)
            }
        }
    }

    async fn execute(&self, input: &InputText) -> Result<GraphView, PipelineError> {
        validate_text(input.text(), self.config.input.max_chars)?;

        let prompt = self.extractor.build_prompt(input.text());
        let (raw, cached) = self.fetch_response(&prompt).await?;

        let (extraction, source, partial) = self.parse_response(&raw).await?;
        self.metrics.record_extraction(
            extraction.entities.len(),
            extraction.relationships.len(),
            extraction.dropped_count,
        );

        if extraction.is_empty() {
            return Err(PipelineError::EmptyExtraction);
        }

        if let (Some(cache), Some(source), false) = (&self.cache, source, cached) {
            cache.insert(self.extractor.model_id(), &prompt, source);
        }

        let timer = TimedOperation::start();
        let graph = self.assembler.assemble(None, &extraction);
        self.metrics.record_assemble(timer.elapsed());

        let timer = TimedOperation::start();
        let layout = self.layout_engine.layout(&graph);
        self.metrics.record_layout(timer.elapsed());

        Ok(GraphView::build(graph, layout, &extraction, partial))
    }

    /// Cached response if there is one, otherwise a model call retried on transient failures.
    async fn fetch_response(&self, prompt: &str) -> Result<(String, bool), PipelineError> {
        if let Some(raw) = self
            .cache
            .as_ref()
            .and_then(|cache| cache.get(self.extractor.model_id(), prompt))
        {
            debug!("Model response served from cache");
            self.metrics.record_cache_hit();
            return Ok((raw, true));
        }

        let raw = self.call_model(prompt).await?;
        Ok((raw, false))
    }

    /// One logical model call: retried on transient failures, timed either way.
    async fn call_model(&self, prompt: &str) -> Result<String, ModelCallError> {
        let timer = TimedOperation::start();
        let result = self
            .retry_policy
            .retry("model_call", ModelCallError::is_transient, || {
                self.extractor.generate(prompt)
            })
            .await;
        self.metrics.record_model_call(timer.elapsed());
        result
    }

    /// The extraction, the text worth caching (complete responses only), and whether it is partial.
    ///
    /// Output without any JSON is sent back to the model for repair, up to the configured
    /// number of attempts.
    async fn parse_response(
        &self,
        raw: &str,
    ) -> Result<(ExtractionResult, Option<String>, bool), PipelineError> {
        let mut current = raw.to_string();
        let mut repairs = 0;

        let parsed = loop {
            match self.extractor.parse(&current) {
                Err(ParseError::NoStructuredData) if repairs < self.config.retry.repair_attempts => {
                    repairs += 1;
                    warn!(attempt = repairs, "No JSON in model output, requesting repair");
                    current = self.call_model(&build_repair_prompt(&current)).await?;
                }
                other => break other,
            }
        };

        match parsed {
            Ok(extraction) => Ok((extraction, Some(current), false)),
            Err(ParseError::SchemaMismatch { missing, partial }) if self.config.accept_partial => {
                warn!(
                    missing = ?missing,
                    salvaged_entities = partial.entities.len(),
                    "Model response incomplete, using the salvaged part"
                );
                Ok((*partial, None, true))
            }
            Err(e) => Err(e.into()),
        }
    }
}
