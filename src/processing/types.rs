//! Core data types and error definitions for the processing pipeline.

use crate::config::{
    Config, DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_MAX_PAYLOAD_BYTES, DEFAULT_REDUCTION_MIN_CHARS,
    default_expansion_limit,
};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Errors emitted by the document processing pipeline.
///
/// Every variant except [`PipelineError::Internal`] carries a message that is safe to show to
/// API clients.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A required field (file, filename, URL, base64 data) was absent or empty.
    #[error("{0}")]
    MissingInput(String),
    /// The base64 payload could not be decoded.
    #[error("Invalid base64 encoding: {0}")]
    InvalidEncoding(String),
    /// The payload is larger than the configured ceiling.
    #[error("File size exceeds the {limit} byte limit")]
    SizeExceeded {
        /// Configured ceiling in bytes.
        limit: usize,
    },
    /// The declared file type is not PDF or DOCX.
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),
    /// The remote document could not be downloaded.
    #[error("Failed to download file: {0}")]
    RetrievalFailed(String),
    /// The document container could not be parsed.
    #[error("Document could not be parsed: {0}")]
    CorruptDocument(String),
    /// Extraction succeeded but produced only whitespace.
    #[error("No extractable text found")]
    NoExtractableText,
    /// Anything else; the detail is logged but never returned to clients.
    #[error("Internal processing error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Short machine-friendly label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingInput(_) => "missing_input",
            Self::InvalidEncoding(_) => "invalid_encoding",
            Self::SizeExceeded { .. } => "size_exceeded",
            Self::UnsupportedFormat(_) => "unsupported_format",
            Self::RetrievalFailed(_) => "retrieval_failed",
            Self::CorruptDocument(_) => "corrupt_document",
            Self::NoExtractableText => "no_extractable_text",
            Self::Internal(_) => "internal",
        }
    }
}

/// Document formats understood by the extractors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentFormat {
    /// Portable Document Format.
    Pdf,
    /// Office Open XML word-processing document.
    Docx,
}

impl DocumentFormat {
    /// Resolve the declared format from an explicit hint or, failing that, a file name or URL.
    ///
    /// The hint wins when present. Names are matched on their lower-cased extension; query
    /// strings and fragments of URLs are ignored.
    pub fn resolve(hint: Option<&str>, name: Option<&str>) -> Result<Self, PipelineError> {
        if let Some(hint) = hint.map(str::trim).filter(|value| !value.is_empty()) {
            return hint.parse();
        }

        let Some(name) = name.map(str::trim).filter(|value| !value.is_empty()) else {
            return Err(PipelineError::MissingInput(
                "A filename, URL, or format is required".to_string(),
            ));
        };

        Self::from_name(name)
    }

    /// Infer the format from the suffix of a file name or URL.
    pub fn from_name(name: &str) -> Result<Self, PipelineError> {
        let path = match reqwest::Url::parse(name) {
            Ok(url) if url.has_host() => url.path().to_string(),
            _ => name.to_string(),
        };
        let extension = Path::new(&path)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("pdf") => Ok(Self::Pdf),
            Some("docx") => Ok(Self::Docx),
            Some(other) => Err(PipelineError::UnsupportedFormat(format!(".{other}"))),
            None => Err(PipelineError::UnsupportedFormat(format!(
                "'{name}' has no file extension"
            ))),
        }
    }

    /// Canonical file extension, without the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
        }
    }
}

impl std::str::FromStr for DocumentFormat {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().trim_start_matches('.').to_ascii_lowercase();
        match normalized.as_str() {
            "pdf" | "application/pdf" => Ok(Self::Pdf),
            "docx" | DOCX_MIME => Ok(Self::Docx),
            _ => Err(PipelineError::UnsupportedFormat(s.trim().to_string())),
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// How a payload reached the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadOrigin {
    /// Raw multipart (or local file) upload.
    Upload,
    /// Base64 text inside a JSON body.
    Base64,
    /// Downloaded from a remote URL.
    Url,
}

impl fmt::Display for PayloadOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Upload => "upload",
            Self::Base64 => "base64",
            Self::Url => "url",
        })
    }
}

/// Input accepted by the payload normalizer.
#[derive(Debug, Clone)]
pub enum DocumentSource {
    /// Bytes received directly, with the client-supplied file name.
    Upload {
        /// Original file name, used for format detection.
        filename: Option<String>,
        /// Raw document bytes.
        bytes: Vec<u8>,
    },
    /// Base64 text with a claimed file name.
    Base64 {
        /// Claimed file name, used for format detection.
        filename: Option<String>,
        /// Encoded document.
        data: String,
    },
    /// Remote document to download.
    Url {
        /// Absolute `http`/`https` URL.
        url: String,
    },
}

/// Per-request switches that shape the pipeline and the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessOptions {
    /// Produce `reduced_text` from sentences above the length threshold.
    pub reduce_tokens: bool,
    /// Extract embedded raster images.
    pub include_images: bool,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            reduce_tokens: false,
            include_images: true,
        }
    }
}

/// Full request handed to [`crate::processing::ProcessingApi::process`].
#[derive(Debug, Clone)]
pub struct ProcessRequest {
    /// Where the document comes from.
    pub source: DocumentSource,
    /// Explicit format override (`pdf`, `docx`, or a MIME type).
    pub format_hint: Option<String>,
    /// Output switches.
    pub options: ProcessOptions,
}

/// Normalized, size-checked document bytes plus the declared format.
#[derive(Debug, Clone)]
pub struct SourcePayload {
    /// Document bytes; never longer than the configured ceiling.
    pub bytes: Vec<u8>,
    /// Format selected by the dispatcher.
    pub declared_format: DocumentFormat,
    /// How the bytes were obtained.
    pub origin: PayloadOrigin,
}

impl SourcePayload {
    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Embedded raster image extracted from a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageAsset {
    /// 1-based position within the document.
    #[serde(rename = "image_index")]
    pub index: usize,
    /// Standard base64 encoding of the image file.
    #[serde(rename = "base64")]
    pub encoded: String,
}

/// Text and assets produced by a format extractor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedDocument {
    /// Non-empty segments joined by [`ExtractedDocument::SEPARATOR`].
    pub full_text: String,
    /// Trimmed, non-empty pages (PDF) or paragraphs (DOCX) in document order.
    pub segments: Vec<String>,
    /// Extracted images; empty when image extraction was not requested.
    pub images: Vec<ImageAsset>,
    /// Pages or paragraphs walked, including empty ones.
    pub unit_count: usize,
}

impl ExtractedDocument {
    /// Separator placed between segments in `full_text`.
    pub const SEPARATOR: &'static str = "\n";

    /// Build a document from raw per-unit text, trimming units and skipping empty ones.
    pub fn from_units<I, S>(units: I, images: Vec<ImageAsset>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut unit_count = 0;
        let segments: Vec<String> = units
            .into_iter()
            .inspect(|_| unit_count += 1)
            .filter_map(|unit| {
                let trimmed = unit.as_ref().trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            })
            .collect();

        Self {
            full_text: segments.join(Self::SEPARATOR),
            segments,
            images,
            unit_count,
        }
    }
}

/// Sentence/token analytics over the extracted text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisResult {
    /// Non-empty sentence spans in `full_text`.
    pub sentence_count: usize,
    /// Tokens that are neither punctuation nor whitespace.
    pub token_count: usize,
    /// Sentences above the threshold, present only in reduction mode.
    pub reduced_text: Option<String>,
}

/// Response aggregate returned for a processed document.
///
/// Optional fields are omitted from the JSON (rather than emitted as `null`) when the
/// corresponding request flag disabled them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingOutcome {
    /// Extracted text.
    pub full_text: String,
    /// Condensed text, only when `reduce_tokens` was requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reduced_text: Option<String>,
    /// Word tokens in `full_text`.
    pub token_count: usize,
    /// Sentences in `full_text`.
    pub sentence_count: usize,
    /// Number of images, only when `include_images` was requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_count: Option<usize>,
    /// Extracted images, only when `include_images` was requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<ImageAsset>>,
    /// Wall-clock time spent on the request.
    pub process_time_seconds: f64,
    /// Byte length of the decoded, fetched, or uploaded payload.
    pub file_size_bytes: usize,
}

/// Limits and tuning injected into the processing service.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Ceiling on payload size in bytes (inclusive).
    pub max_payload_bytes: usize,
    /// Cap on decompressed content read while extracting one document.
    pub max_expanded_bytes: usize,
    /// Timeout applied to URL retrieval.
    pub fetch_timeout: Duration,
    /// Reduction keeps sentences strictly longer than this many characters.
    pub reduction_min_chars: usize,
    /// Directory for request-scoped scratch files.
    pub scratch_dir: PathBuf,
}

impl PipelineSettings {
    /// Process-private scratch directory under the system temp dir.
    pub fn default_scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("docsift-{}", std::process::id()))
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            max_expanded_bytes: default_expansion_limit(DEFAULT_MAX_PAYLOAD_BYTES),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            reduction_min_chars: DEFAULT_REDUCTION_MIN_CHARS,
            scratch_dir: Self::default_scratch_dir(),
        }
    }
}

impl From<&Config> for PipelineSettings {
    fn from(config: &Config) -> Self {
        Self {
            max_payload_bytes: config.max_payload_bytes,
            max_expanded_bytes: config.max_expanded_bytes,
            fetch_timeout: Duration::from_secs(config.fetch_timeout_secs),
            reduction_min_chars: config.reduction_min_chars,
            scratch_dir: config
                .scratch_dir
                .clone()
                .unwrap_or_else(Self::default_scratch_dir),
        }
    }
}
