//! Document builders shared by the integration tests.
//!
//! The builders live with the unit tests and are compiled into this crate from there.

#[allow(dead_code)]
#[path = "../../src/processing/extract/fixtures.rs"]
mod fixtures;

pub(crate) use fixtures::{docx_with_paragraphs, pdf_with_pages};
