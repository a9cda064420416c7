//! Processing service coordinating payload normalization, extraction, and analysis.

use crate::{
    config::get_config,
    metrics::{MetricsSnapshot, ProcessingMetrics},
    processing::{
        analysis::{LinguisticAnalyzer, UnicodeAnalyzer},
        payload::PayloadNormalizer,
        pipeline::{assemble, run_pipeline},
        types::{PipelineError, PipelineSettings, ProcessRequest, ProcessingOutcome},
    },
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

/// Runs a document through retrieval, extraction, analysis, and assembly.
///
/// The service owns the HTTP client, the analyzer, and the metrics registry so every surface
/// (HTTP routes, CLI) shares the same components. Construct it once near process start and
/// share it through an `Arc`. Nothing in it is mutated per request apart from the atomic
/// counters.
pub struct ProcessingService {
    normalizer: PayloadNormalizer,
    analyzer: Arc<dyn LinguisticAnalyzer>,
    settings: PipelineSettings,
    metrics: Arc<ProcessingMetrics>,
}

/// Abstraction over the processing pipeline used by external surfaces.
#[async_trait]
pub trait ProcessingApi: Send + Sync {
    /// Process one document and return the response aggregate.
    async fn process(&self, request: ProcessRequest) -> Result<ProcessingOutcome, PipelineError>;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

impl ProcessingService {
    /// Build a service from the global configuration.
    pub fn new() -> Result<Self, PipelineError> {
        let settings = PipelineSettings::from(get_config());
        Self::with_settings(settings)
    }

    /// Build a service from explicit settings with the default Unicode analyzer.
    pub fn with_settings(settings: PipelineSettings) -> Result<Self, PipelineError> {
        Self::with_analyzer(settings, Arc::new(UnicodeAnalyzer))
    }

    /// Build a service with a custom linguistic backend.
    pub fn with_analyzer(
        settings: PipelineSettings,
        analyzer: Arc<dyn LinguisticAnalyzer>,
    ) -> Result<Self, PipelineError> {
        let normalizer = PayloadNormalizer::new(&settings)?;
        tracing::debug!(
            max_payload_bytes = settings.max_payload_bytes,
            max_expanded_bytes = settings.max_expanded_bytes,
            fetch_timeout_secs = settings.fetch_timeout.as_secs(),
            reduction_min_chars = settings.reduction_min_chars,
            scratch_dir = %settings.scratch_dir.display(),
            "Processing service ready"
        );
        Ok(Self {
            normalizer,
            analyzer,
            settings,
            metrics: Arc::new(ProcessingMetrics::new()),
        })
    }

    /// Process one document end to end.
    ///
    /// Retrieval runs on the async runtime; extraction and analysis run on the blocking pool.
    pub async fn process(
        &self,
        request: ProcessRequest,
    ) -> Result<ProcessingOutcome, PipelineError> {
        let started = Instant::now();
        let result = self.process_inner(request, started).await;
        match &result {
            Ok(outcome) => {
                self.metrics.record_document(
                    outcome.file_size_bytes as u64,
                    outcome.image_count.unwrap_or(0) as u64,
                );
            }
            Err(err) => {
                self.metrics.record_failure();
                match err {
                    PipelineError::Internal(detail) => {
                        tracing::error!(error = %detail, "Document processing failed");
                    }
                    other => {
                        tracing::info!(kind = other.kind(), error = %other, "Document rejected");
                    }
                }
            }
        }
        result
    }

    async fn process_inner(
        &self,
        request: ProcessRequest,
        started: Instant,
    ) -> Result<ProcessingOutcome, PipelineError> {
        let ProcessRequest {
            source,
            format_hint,
            options,
        } = request;

        let payload = self
            .normalizer
            .normalize(source, format_hint.as_deref())
            .await?;
        let format = payload.declared_format;
        let origin = payload.origin;
        let file_size_bytes = payload.len();
        tracing::debug!(%format, %origin, bytes = file_size_bytes, "Payload ready");

        let analyzer = Arc::clone(&self.analyzer);
        let settings = self.settings.clone();
        let run = tokio::task::spawn_blocking(move || {
            run_pipeline(&payload, options, analyzer.as_ref(), &settings)
        })
        .await
        .map_err(|err| PipelineError::Internal(format!("extraction task failed: {err}")))??;

        let segments = run.extracted.segments.len();
        let outcome = assemble(run, options, file_size_bytes, started.elapsed());
        tracing::info!(
            %format,
            %origin,
            bytes = file_size_bytes,
            segments,
            images = outcome.image_count.unwrap_or(0),
            tokens = outcome.token_count,
            sentences = outcome.sentence_count,
            elapsed = outcome.process_time_seconds,
            "Document processed"
        );
        Ok(outcome)
    }

    /// Retrieve the current metrics snapshot.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[async_trait]
impl ProcessingApi for ProcessingService {
    async fn process(&self, request: ProcessRequest) -> Result<ProcessingOutcome, PipelineError> {
        ProcessingService::process(self, request).await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        ProcessingService::metrics_snapshot(self)
    }
}
