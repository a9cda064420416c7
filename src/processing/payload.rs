//! Payload normalization: turn uploads, base64 text, and URLs into size-checked bytes.

use super::scratch::ScratchFile;
use super::types::{
    DocumentFormat, DocumentSource, PayloadOrigin, PipelineError, PipelineSettings, SourcePayload,
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Client, Url};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

/// Converts a [`DocumentSource`] into a [`SourcePayload`] while enforcing the size ceiling.
pub struct PayloadNormalizer {
    client: Client,
    max_bytes: usize,
    scratch_dir: PathBuf,
}

impl PayloadNormalizer {
    /// Build a normalizer with an HTTP client bounded by the configured fetch timeout.
    pub fn new(settings: &PipelineSettings) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .user_agent(concat!("docsift/", env!("CARGO_PKG_VERSION")))
            .timeout(settings.fetch_timeout)
            .build()
            .map_err(|err| PipelineError::Internal(format!("HTTP client: {err}")))?;

        Ok(Self {
            client,
            max_bytes: settings.max_payload_bytes,
            scratch_dir: settings.scratch_dir.clone(),
        })
    }

    /// Resolve the format and produce the payload bytes.
    ///
    /// Format resolution happens first so an unsupported URL is never downloaded.
    pub async fn normalize(
        &self,
        source: DocumentSource,
        format_hint: Option<&str>,
    ) -> Result<SourcePayload, PipelineError> {
        match source {
            DocumentSource::Upload { filename, bytes } => {
                let declared_format = DocumentFormat::resolve(format_hint, filename.as_deref())?;
                if bytes.is_empty() {
                    return Err(PipelineError::MissingInput(
                        "Uploaded file is empty".to_string(),
                    ));
                }
                self.check_size(bytes.len())?;
                Ok(SourcePayload {
                    bytes,
                    declared_format,
                    origin: PayloadOrigin::Upload,
                })
            }
            DocumentSource::Base64 { filename, data } => {
                if data.trim().is_empty() {
                    return Err(PipelineError::MissingInput(
                        "file_base64 is required".to_string(),
                    ));
                }
                let declared_format = DocumentFormat::resolve(format_hint, filename.as_deref())?;
                let bytes = self.decode_base64(&data)?;
                Ok(SourcePayload {
                    bytes,
                    declared_format,
                    origin: PayloadOrigin::Base64,
                })
            }
            DocumentSource::Url { url } => {
                let url = url.trim();
                if url.is_empty() {
                    return Err(PipelineError::MissingInput("file_url is required".to_string()));
                }
                let declared_format = DocumentFormat::resolve(format_hint, Some(url))?;
                let bytes = self.fetch(url, declared_format).await?;
                Ok(SourcePayload {
                    bytes,
                    declared_format,
                    origin: PayloadOrigin::Url,
                })
            }
        }
    }

    fn check_size(&self, len: usize) -> Result<(), PipelineError> {
        if len > self.max_bytes {
            return Err(PipelineError::SizeExceeded {
                limit: self.max_bytes,
            });
        }
        Ok(())
    }

    /// Decode standard base64, ignoring whitespace and an optional `data:` URI prefix.
    fn decode_base64(&self, data: &str) -> Result<Vec<u8>, PipelineError> {
        let body = match data.trim_start().strip_prefix("data:") {
            Some(rest) => rest
                .split_once(',')
                .map(|(_, encoded)| encoded)
                .ok_or_else(|| {
                    PipelineError::InvalidEncoding("data URI has no payload".to_string())
                })?,
            None => data,
        };
        let compact: String = body
            .chars()
            .filter(|ch| !ch.is_ascii_whitespace())
            .collect();

        // Every 4 encoded characters yield at most 3 bytes.
        if compact.len() / 4 * 3 > self.max_bytes.saturating_add(2) {
            return Err(PipelineError::SizeExceeded {
                limit: self.max_bytes,
            });
        }

        let bytes = STANDARD
            .decode(compact.as_bytes())
            .map_err(|err| PipelineError::InvalidEncoding(err.to_string()))?;
        self.check_size(bytes.len())?;
        Ok(bytes)
    }

    /// Download `url` into a scratch file, enforcing the size ceiling while streaming.
    async fn fetch(&self, url: &str, format: DocumentFormat) -> Result<Vec<u8>, PipelineError> {
        let parsed = Url::parse(url)
            .map_err(|err| PipelineError::RetrievalFailed(format!("invalid URL: {err}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(PipelineError::RetrievalFailed(format!(
                "unsupported URL scheme '{}'",
                parsed.scheme()
            )));
        }

        tracing::debug!(url = %parsed, "Fetching remote document");
        let mut response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(retrieval_error)?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(url, status = %status, "Remote document returned an error status");
            return Err(PipelineError::RetrievalFailed(format!(
                "remote server responded with {status}"
            )));
        }
        if let Some(length) = response.content_length() {
            self.check_size(usize::try_from(length).unwrap_or(usize::MAX))?;
        }

        let (scratch, mut file) = ScratchFile::create(&self.scratch_dir, format.extension())
            .await
            .map_err(|err| PipelineError::Internal(format!("scratch file: {err}")))?;

        let mut received = 0usize;
        while let Some(chunk) = response.chunk().await.map_err(retrieval_error)? {
            received = received.saturating_add(chunk.len());
            self.check_size(received)?;
            file.write_all(&chunk).await.map_err(|err| {
                PipelineError::RetrievalFailed(format!("could not store response: {err}"))
            })?;
        }
        file.flush().await.map_err(|err| {
            PipelineError::RetrievalFailed(format!("could not store response: {err}"))
        })?;
        drop(file);

        let bytes = scratch.read().await.map_err(|err| {
            PipelineError::RetrievalFailed(format!("could not read stored response: {err}"))
        })?;
        tracing::debug!(
            bytes = bytes.len(),
            scratch = %scratch.path().display(),
            "Remote document materialized"
        );
        if bytes.is_empty() {
            return Err(PipelineError::RetrievalFailed(
                "remote server returned an empty body".to_string(),
            ));
        }
        Ok(bytes)
    }
}

fn retrieval_error(err: reqwest::Error) -> PipelineError {
    if err.is_timeout() {
        PipelineError::RetrievalFailed("request timed out".to_string())
    } else {
        PipelineError::RetrievalFailed(err.to_string())
    }
}
