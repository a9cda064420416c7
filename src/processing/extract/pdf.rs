//! PDF extraction backed by `lopdf`.

use super::budget::{BudgetError, ExpansionBudget};
use super::{DocumentExtractor, ImageCollector};
use crate::config::{DEFAULT_MAX_PAYLOAD_BYTES, default_expansion_limit};
use crate::processing::types::{ExtractedDocument, PipelineError};
use flate2::read::ZlibDecoder;
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::borrow::Cow;
use std::collections::HashSet;
use std::io::Cursor;

/// Guards against malformed `Parent` chains and self-referencing form XObjects.
const MAX_NESTING: usize = 32;

/// Extracts page text and page-referenced raster images from PDF documents.
#[derive(Debug, Clone, Copy)]
pub struct PdfExtractor {
    max_expanded_bytes: usize,
}

impl PdfExtractor {
    /// Extractor that inflates at most `max_expanded_bytes` of streams per document.
    pub fn new(max_expanded_bytes: usize) -> Self {
        Self { max_expanded_bytes }
    }
}

impl Default for PdfExtractor {
    fn default() -> Self {
        Self::new(default_expansion_limit(DEFAULT_MAX_PAYLOAD_BYTES))
    }
}

impl DocumentExtractor for PdfExtractor {
    fn extract(
        &self,
        bytes: &[u8],
        include_images: bool,
    ) -> Result<ExtractedDocument, PipelineError> {
        // TODO: object streams are inflated inside `load_mem` and are not charged to the budget.
        let document = Document::load_mem(bytes)
            .map_err(|err| PipelineError::CorruptDocument(format!("invalid PDF: {err}")))?;

        let pages = document.get_pages();
        let mut units = Vec::with_capacity(pages.len());
        let mut images = ImageCollector::default();
        let mut budget = ExpansionBudget::new(self.max_expanded_bytes);

        for (&page_number, &page_id) in &pages {
            charge_page_text_streams(&document, page_id, &mut budget)?;
            units.push(page_text(&document, page_number));
            if include_images {
                collect_page_images(&document, page_id, page_number, &mut budget, &mut images)?;
            }
        }

        let extracted = ExtractedDocument::from_units(units, images.finish());
        tracing::debug!(
            pages = extracted.unit_count,
            segments = extracted.segments.len(),
            images = extracted.images.len(),
            "Extracted PDF"
        );
        Ok(extracted)
    }
}

fn page_text(document: &Document, page_number: u32) -> String {
    match document.extract_text(&[page_number]) {
        Ok(text) => text,
        Err(err) => {
            tracing::warn!(page = page_number, error = %err, "Skipping unreadable PDF page text");
            String::new()
        }
    }
}

/// Charge the decoded size of the streams text extraction inflates for a page: its content
/// streams and the `ToUnicode` maps of its fonts.
///
/// Streams that cannot be decoded here are charged at their stored size.
fn charge_page_text_streams(
    document: &Document,
    page_id: ObjectId,
    budget: &mut ExpansionBudget,
) -> Result<(), BudgetError> {
    let to_unicode = document
        .get_page_fonts(page_id)
        .map(|fonts| {
            fonts
                .values()
                .filter_map(|font| font.get(b"ToUnicode").ok()?.as_reference().ok())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    for stream_id in document.get_page_contents(page_id).into_iter().chain(to_unicode) {
        let Ok(Object::Stream(stream)) = document.get_object(stream_id) else {
            continue;
        };
        let filters = stream_filters(document, stream);
        if decoded_content(stream, &filters, budget)?.is_none() {
            budget.charge(stream.content.len())?;
        }
    }
    Ok(())
}

/// Stream content with its filters undone, drawing the decoded size from `budget`.
///
/// Returns `None` for filter chains other than a single `FlateDecode` and for flate data that
/// does not inflate cleanly; whatever inflated before the error has still been charged.
fn decoded_content<'a>(
    stream: &'a Stream,
    filters: &[&[u8]],
    budget: &mut ExpansionBudget,
) -> Result<Option<Cow<'a, [u8]>>, BudgetError> {
    match filters {
        [] => {
            budget.charge(stream.content.len())?;
            Ok(Some(Cow::Borrowed(stream.content.as_slice())))
        }
        [filter] if *filter == b"FlateDecode" => {
            match budget.read_to_end(ZlibDecoder::new(stream.content.as_slice()), 0) {
                Ok(inflated) => Ok(Some(Cow::Owned(inflated))),
                Err(BudgetError::Io(err)) => {
                    tracing::debug!(error = %err, "PDF stream does not inflate");
                    Ok(None)
                }
                Err(err) => Err(err),
            }
        }
        _ => Ok(None),
    }
}

fn collect_page_images(
    document: &Document,
    page_id: ObjectId,
    page_number: u32,
    budget: &mut ExpansionBudget,
    images: &mut ImageCollector,
) -> Result<(), BudgetError> {
    let Some(resources) = page_resources(document, page_id) else {
        return Ok(());
    };
    let mut walk = XObjectWalk {
        document,
        page_number,
        visited: HashSet::new(),
        budget,
        images,
    };
    walk.collect(resources, 0)
}

/// Resources of a page, following `Parent` links for inherited dictionaries.
fn page_resources(document: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    let mut node = document.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_NESTING {
        if let Ok(resources) = node.get(b"Resources") {
            return resolve(document, resources)?.as_dict().ok();
        }
        let parent = node.get(b"Parent").ok()?.as_reference().ok()?;
        node = document.get_dictionary(parent).ok()?;
    }
    None
}

/// Image search through one page's XObjects, descending into form XObjects.
struct XObjectWalk<'a> {
    document: &'a Document,
    page_number: u32,
    visited: HashSet<ObjectId>,
    budget: &'a mut ExpansionBudget,
    images: &'a mut ImageCollector,
}

impl XObjectWalk<'_> {
    fn collect(&mut self, resources: &Dictionary, depth: usize) -> Result<(), BudgetError> {
        if depth >= MAX_NESTING {
            return Ok(());
        }
        let document = self.document;
        let Some(xobjects) = resources
            .get(b"XObject")
            .ok()
            .and_then(|object| resolve(document, object))
            .and_then(|object| object.as_dict().ok())
        else {
            return Ok(());
        };

        for (name, entry) in xobjects.iter() {
            if let Ok(id) = entry.as_reference() {
                if !self.visited.insert(id) {
                    continue;
                }
            }
            let Some(Object::Stream(stream)) = resolve(document, entry) else {
                continue;
            };

            let subtype = stream.dict.get(b"Subtype").and_then(Object::as_name).ok();
            match subtype {
                Some(kind) if kind == b"Image" => {
                    match image_bytes(document, stream, self.budget)? {
                        Some(bytes) => self.images.push(&bytes),
                        None => tracing::warn!(
                            page = self.page_number,
                            xobject = %String::from_utf8_lossy(name),
                            "Skipping unreadable PDF image"
                        ),
                    }
                }
                Some(kind) if kind == b"Form" => {
                    let nested = stream
                        .dict
                        .get(b"Resources")
                        .ok()
                        .and_then(|object| resolve(document, object))
                        .and_then(|object| object.as_dict().ok());
                    if let Some(nested) = nested {
                        self.collect(nested, depth + 1)?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

fn resolve<'a>(document: &'a Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => document.get_object(*id).ok(),
        other => Some(other),
    }
}

/// Filter names applied to a stream, in order.
fn stream_filters<'a>(document: &'a Document, stream: &'a Stream) -> Vec<&'a [u8]> {
    let Some(filter) = stream
        .dict
        .get(b"Filter")
        .ok()
        .and_then(|object| resolve(document, object))
    else {
        return Vec::new();
    };
    match filter {
        Object::Name(name) => vec![name.as_slice()],
        Object::Array(items) => items
            .iter()
            .filter_map(|item| item.as_name().ok())
            .collect(),
        _ => Vec::new(),
    }
}

/// Encoded image file for an image XObject.
///
/// JPEG and JPEG 2000 streams are already complete files. 8-bit RGB or grayscale pixel data
/// is wrapped as PNG; anything else is returned as stored in the PDF.
fn image_bytes(
    document: &Document,
    stream: &Stream,
    budget: &mut ExpansionBudget,
) -> Result<Option<Vec<u8>>, BudgetError> {
    let filters = stream_filters(document, stream);
    if filters
        .iter()
        .any(|filter| *filter == b"DCTDecode" || *filter == b"JPXDecode")
    {
        return Ok(Some(stream.content.clone()));
    }
    if stream.content.is_empty() {
        return Ok(None);
    }
    let png = pixels_to_png(document, stream, &filters, budget)?;
    Ok(Some(png.unwrap_or_else(|| stream.content.clone())))
}

fn pixels_to_png(
    document: &Document,
    stream: &Stream,
    filters: &[&[u8]],
    budget: &mut ExpansionBudget,
) -> Result<Option<Vec<u8>>, BudgetError> {
    let Some((width, height, color_space)) = pixel_layout(document, &stream.dict) else {
        return Ok(None);
    };
    let Some(pixels) = decoded_content(stream, filters, budget)? else {
        return Ok(None);
    };
    let pixels = pixels.into_owned();

    let image = if color_space == b"DeviceRGB" {
        RgbImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgb8)
    } else {
        GrayImage::from_raw(width, height, pixels).map(DynamicImage::ImageLuma8)
    };
    let Some(image) = image else {
        return Ok(None);
    };

    let mut buffer = Cursor::new(Vec::new());
    if image.write_to(&mut buffer, ImageFormat::Png).is_err() {
        return Ok(None);
    }
    Ok(Some(buffer.into_inner()))
}

/// Width, height, and color space of 8-bit RGB or grayscale image data.
fn pixel_layout<'a>(document: &'a Document, dict: &'a Dictionary) -> Option<(u32, u32, &'a [u8])> {
    let width = u32::try_from(dict.get(b"Width").ok()?.as_i64().ok()?).ok()?;
    let height = u32::try_from(dict.get(b"Height").ok()?.as_i64().ok()?).ok()?;
    let bits = dict
        .get(b"BitsPerComponent")
        .ok()
        .and_then(|object| object.as_i64().ok())
        .unwrap_or(8);
    if bits != 8 {
        return None;
    }
    let color_space = dict
        .get(b"ColorSpace")
        .ok()
        .and_then(|object| resolve(document, object))
        .and_then(|object| object.as_name().ok())?;
    (color_space == b"DeviceRGB" || color_space == b"DeviceGray")
        .then_some((width, height, color_space))
}
