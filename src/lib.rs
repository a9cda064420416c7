#![deny(missing_docs)]

//! Core library for the docsift document extraction service.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Structured logging and tracing setup.
pub mod logging;
/// Processing metrics helpers.
pub mod metrics;
/// Document processing pipeline.
pub mod processing;
