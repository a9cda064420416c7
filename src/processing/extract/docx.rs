//! DOCX extraction: the OOXML package is read with `zip` and its parts parsed with `roxmltree`.

use super::budget::{BudgetError, ExpansionBudget};
use super::{DocumentExtractor, ImageCollector};
use crate::config::{DEFAULT_MAX_PAYLOAD_BYTES, default_expansion_limit};
use crate::processing::types::{ExtractedDocument, ImageAsset, PipelineError};
use roxmltree::Node;
use std::io::Cursor;
use zip::ZipArchive;
use zip::result::ZipError;

const DOCUMENT_PART: &str = "word/document.xml";
const RELATIONSHIPS_PART: &str = "word/_rels/document.xml.rels";
const WORDML_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
const PACKAGE_RELS_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const MARKUP_COMPAT_NS: &str = "http://schemas.openxmlformats.org/markup-compatibility/2006";
const IMAGE_REL_SUFFIX: &str = "/relationships/image";

type Archive<'a> = ZipArchive<Cursor<&'a [u8]>>;

/// Extracts paragraph text and related media from Word documents.
#[derive(Debug, Clone, Copy)]
pub struct DocxExtractor {
    max_expanded_bytes: usize,
}

impl DocxExtractor {
    /// Extractor that reads at most `max_expanded_bytes` of decompressed parts per document.
    pub fn new(max_expanded_bytes: usize) -> Self {
        Self { max_expanded_bytes }
    }
}

impl Default for DocxExtractor {
    fn default() -> Self {
        Self::new(default_expansion_limit(DEFAULT_MAX_PAYLOAD_BYTES))
    }
}

impl DocumentExtractor for DocxExtractor {
    fn extract(
        &self,
        bytes: &[u8],
        include_images: bool,
    ) -> Result<ExtractedDocument, PipelineError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(|err| {
            PipelineError::CorruptDocument(format!("invalid DOCX archive: {err}"))
        })?;
        let mut budget = ExpansionBudget::new(self.max_expanded_bytes);

        let body = match read_part(&mut archive, DOCUMENT_PART, &mut budget) {
            Ok(Some(body)) => body,
            Ok(None) => {
                return Err(PipelineError::CorruptDocument(format!(
                    "missing {DOCUMENT_PART}"
                )));
            }
            Err(err @ PartError::Budget(BudgetError::Exceeded { .. })) => {
                return Err(PipelineError::CorruptDocument(err.to_string()));
            }
            Err(err) => {
                return Err(PipelineError::CorruptDocument(format!(
                    "unreadable {DOCUMENT_PART}: {err}"
                )));
            }
        };
        let body = String::from_utf8(body).map_err(|_| {
            PipelineError::CorruptDocument(format!("{DOCUMENT_PART} is not UTF-8"))
        })?;
        let tree = roxmltree::Document::parse(&body).map_err(|err| {
            PipelineError::CorruptDocument(format!("malformed {DOCUMENT_PART}: {err}"))
        })?;

        let mut units = Vec::new();
        collect_paragraphs(tree.root_element(), &mut units);

        let images = if include_images {
            collect_images(&mut archive, &mut budget)?
        } else {
            Vec::new()
        };

        let extracted = ExtractedDocument::from_units(units, images);
        tracing::debug!(
            paragraphs = extracted.unit_count,
            segments = extracted.segments.len(),
            images = extracted.images.len(),
            "Extracted DOCX"
        );
        Ok(extracted)
    }
}

fn is_wordml(node: &Node<'_, '_>, local: &str) -> bool {
    node.is_element()
        && node.tag_name().namespace() == Some(WORDML_NS)
        && node.tag_name().name() == local
}

fn is_markup_compat(node: &Node<'_, '_>, local: &str) -> bool {
    node.is_element()
        && node.tag_name().namespace() == Some(MARKUP_COMPAT_NS)
        && node.tag_name().name() == local
}

/// Branch of an `mc:AlternateContent` block to read: the first `mc:Choice`, else the
/// `mc:Fallback`. Word stores text boxes in both, so reading both repeats their text.
fn alternate_branch<'a, 'input>(node: Node<'a, 'input>) -> Option<Node<'a, 'input>> {
    let mut branches = node.children().filter(Node::is_element);
    let choice = branches
        .clone()
        .find(|child| is_markup_compat(child, "Choice"));
    choice.or_else(|| branches.find(|child| is_markup_compat(child, "Fallback")))
}

/// Child elements to walk, with each alternate-content block replaced by its chosen branch.
fn content_children<'a, 'input>(node: Node<'a, 'input>) -> Vec<Node<'a, 'input>> {
    node.children()
        .filter(Node::is_element)
        .filter_map(|child| {
            if is_markup_compat(&child, "AlternateContent") {
                alternate_branch(child)
            } else {
                Some(child)
            }
        })
        .collect()
}

/// Every `w:p` in document order; a text-box paragraph follows the paragraph anchoring it.
fn collect_paragraphs(node: Node<'_, '_>, units: &mut Vec<String>) {
    for child in content_children(node) {
        if is_wordml(&child, "p") {
            let mut text = String::new();
            paragraph_text(child, &mut text);
            units.push(text);
        }
        collect_paragraphs(child, units);
    }
}

/// Text of one paragraph. Nested paragraphs (text boxes) are their own units and are skipped.
fn paragraph_text(node: Node<'_, '_>, out: &mut String) {
    for child in content_children(node) {
        // Property blocks carry tab stops (`w:tabs/w:tab`) that are not content.
        if is_wordml(&child, "p") || is_wordml(&child, "pPr") || is_wordml(&child, "rPr") {
            continue;
        }
        if is_wordml(&child, "t") {
            out.push_str(child.text().unwrap_or_default());
        } else if is_wordml(&child, "tab") {
            out.push('\t');
        } else if is_wordml(&child, "br") || is_wordml(&child, "cr") {
            out.push('\n');
        } else {
            paragraph_text(child, out);
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum PartError {
    #[error(transparent)]
    Zip(#[from] ZipError),
    #[error(transparent)]
    Budget(#[from] BudgetError),
}

fn read_part(
    archive: &mut Archive<'_>,
    name: &str,
    budget: &mut ExpansionBudget,
) -> Result<Option<Vec<u8>>, PartError> {
    let file = match archive.by_name(name) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let declared = usize::try_from(file.size()).unwrap_or(usize::MAX);
    Ok(Some(budget.read_to_end(file, declared)?))
}

/// Images referenced by the main document's relationship part, in declaration order.
///
/// Unreadable parts are skipped; only exhausting the expansion budget fails the document.
fn collect_images(
    archive: &mut Archive<'_>,
    budget: &mut ExpansionBudget,
) -> Result<Vec<ImageAsset>, PipelineError> {
    let relationships = match read_part(archive, RELATIONSHIPS_PART, budget) {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return Ok(Vec::new()),
        Err(PartError::Budget(err @ BudgetError::Exceeded { .. })) => return Err(err.into()),
        Err(err) => {
            tracing::warn!(error = %err, "Skipping unreadable DOCX relationships");
            return Ok(Vec::new());
        }
    };
    let Ok(relationships) = std::str::from_utf8(&relationships) else {
        tracing::warn!("Skipping DOCX relationships that are not UTF-8");
        return Ok(Vec::new());
    };
    let tree = match roxmltree::Document::parse(relationships) {
        Ok(tree) => tree,
        Err(err) => {
            tracing::warn!(error = %err, "Skipping malformed DOCX relationships");
            return Ok(Vec::new());
        }
    };

    let mut images = ImageCollector::default();
    for relationship in tree.descendants().filter(|node| {
        node.is_element()
            && node.tag_name().namespace() == Some(PACKAGE_RELS_NS)
            && node.tag_name().name() == "Relationship"
    }) {
        let Some(target) = relationship.attribute("Target") else {
            continue;
        };
        let is_image = relationship
            .attribute("Type")
            .is_some_and(|kind| kind.ends_with(IMAGE_REL_SUFFIX));
        if !is_image || relationship.attribute("TargetMode") == Some("External") {
            continue;
        }
        let part = resolve_target(target);
        match read_part(archive, &part, budget) {
            Ok(Some(bytes)) => images.push(&bytes),
            Ok(None) => tracing::warn!(part = %part, "Skipping missing DOCX image part"),
            Err(PartError::Budget(err @ BudgetError::Exceeded { .. })) => return Err(err.into()),
            Err(err) => {
                tracing::warn!(part = %part, error = %err, "Skipping unreadable DOCX image");
            }
        }
    }
    Ok(images.finish())
}

/// Archive path for a relationship target. Relative targets resolve against `word/`.
fn resolve_target(target: &str) -> String {
    let (mut parts, rest) = match target.strip_prefix('/') {
        Some(absolute) => (Vec::new(), absolute),
        None => (vec!["word"], target),
    };
    for segment in rest.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            segment => parts.push(segment),
        }
    }
    parts.join("/")
}
