//! Document processing pipeline: payload normalization, extraction, analysis, and assembly.

pub mod analysis;
pub mod extract;
pub mod payload;
pub mod pipeline;
pub mod scratch;
mod service;
pub mod types;

pub use analysis::{LinguisticAnalyzer, Token, TokenKind, UnicodeAnalyzer};
pub use service::{ProcessingApi, ProcessingService};
pub use types::{
    DocumentFormat, DocumentSource, ImageAsset, PipelineError, PipelineSettings, ProcessOptions,
    ProcessRequest, ProcessingOutcome,
};
