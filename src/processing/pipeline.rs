//! Synchronous extraction and analysis stages, plus the final response assembly.
//!
//! Everything here is CPU-bound and free of I/O so the service can run it on the blocking pool.

use super::analysis::{LinguisticAnalyzer, analyze};
use super::extract::extractor_for;
use super::types::{
    AnalysisResult, ExtractedDocument, PipelineError, PipelineSettings, ProcessOptions,
    ProcessingOutcome, SourcePayload,
};
use std::time::Duration;

/// Intermediate output of the CPU-bound stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineRun {
    /// Text and images from the extractor.
    pub extracted: ExtractedDocument,
    /// Counts and optional reduced text.
    pub analysis: AnalysisResult,
}

/// Extract text (and images when requested), then analyze it.
///
/// Only the reduction threshold and the decompression cap are read from `settings`.
/// Fails with [`PipelineError::NoExtractableText`] when extraction yields only whitespace.
pub fn run_pipeline(
    payload: &SourcePayload,
    options: ProcessOptions,
    analyzer: &dyn LinguisticAnalyzer,
    settings: &PipelineSettings,
) -> Result<PipelineRun, PipelineError> {
    let extracted = extractor_for(payload.declared_format, settings.max_expanded_bytes)
        .extract(&payload.bytes, options.include_images)?;
    if extracted.full_text.trim().is_empty() {
        return Err(PipelineError::NoExtractableText);
    }

    let analysis = analyze(
        analyzer,
        &extracted.full_text,
        options.reduce_tokens,
        settings.reduction_min_chars,
    );
    Ok(PipelineRun {
        extracted,
        analysis,
    })
}

/// Build the response aggregate, dropping the fields the request disabled.
pub fn assemble(
    run: PipelineRun,
    options: ProcessOptions,
    file_size_bytes: usize,
    elapsed: Duration,
) -> ProcessingOutcome {
    let PipelineRun {
        extracted,
        analysis,
    } = run;
    let images = options.include_images.then_some(extracted.images);

    ProcessingOutcome {
        full_text: extracted.full_text,
        reduced_text: if options.reduce_tokens {
            analysis.reduced_text
        } else {
            None
        },
        token_count: analysis.token_count,
        sentence_count: analysis.sentence_count,
        image_count: images.as_ref().map(Vec::len),
        images,
        process_time_seconds: elapsed.as_secs_f64(),
        file_size_bytes,
    }
}
