//! Format-specific text and image extraction.
//!
//! Each extractor parses the container once and walks the same structure for text and,
//! when requested, images. Only a container that cannot be opened fails the document;
//! individual pages, paragraphs, or images that cannot be read are skipped with a warning.
//! Decompressed content is capped per document; crossing the cap fails the document.

mod budget;
mod docx;
mod pdf;

#[cfg(test)]
pub(crate) mod fixtures;

pub use docx::DocxExtractor;
pub use pdf::PdfExtractor;

use super::types::{DocumentFormat, ExtractedDocument, ImageAsset, PipelineError};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

/// Produces text segments and embedded images from raw document bytes.
pub trait DocumentExtractor: Send + Sync {
    /// Parse `bytes` and extract text, plus images when `include_images` is set.
    ///
    /// Returns [`PipelineError::CorruptDocument`] when the container cannot be parsed.
    fn extract(
        &self,
        bytes: &[u8],
        include_images: bool,
    ) -> Result<ExtractedDocument, PipelineError>;
}

/// Select the extractor for a resolved format, capping decompressed content at
/// `max_expanded_bytes` per document.
pub fn extractor_for(
    format: DocumentFormat,
    max_expanded_bytes: usize,
) -> Box<dyn DocumentExtractor> {
    match format {
        DocumentFormat::Pdf => Box::new(PdfExtractor::new(max_expanded_bytes)),
        DocumentFormat::Docx => Box::new(DocxExtractor::new(max_expanded_bytes)),
    }
}

/// Assigns sequential 1-based indexes and base64-encodes images in discovery order.
#[derive(Default)]
pub(crate) struct ImageCollector {
    images: Vec<ImageAsset>,
}

impl ImageCollector {
    pub(crate) fn push(&mut self, bytes: &[u8]) {
        let index = self.images.len() + 1;
        self.images.push(ImageAsset {
            index,
            encoded: STANDARD.encode(bytes),
        });
    }

    pub(crate) fn finish(self) -> Vec<ImageAsset> {
        self.images
    }
}
