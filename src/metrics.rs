use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing processing activity.
#[derive(Default)]
pub struct ProcessingMetrics {
    documents_processed: AtomicU64,
    documents_failed: AtomicU64,
    bytes_processed: AtomicU64,
    images_extracted: AtomicU64,
}

impl ProcessingMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successfully processed document, its payload size, and extracted image count.
    pub fn record_document(&self, bytes: u64, images: u64) {
        self.documents_processed.fetch_add(1, Ordering::Relaxed);
        self.bytes_processed.fetch_add(bytes, Ordering::Relaxed);
        self.images_extracted.fetch_add(images, Ordering::Relaxed);
    }

    /// Record a request that terminated with an error.
    pub fn record_failure(&self) {
        self.documents_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_processed: self.documents_processed.load(Ordering::Relaxed),
            documents_failed: self.documents_failed.load(Ordering::Relaxed),
            bytes_processed: self.bytes_processed.load(Ordering::Relaxed),
            images_extracted: self.images_extracted.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of processing counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Number of documents processed successfully since startup.
    pub documents_processed: u64,
    /// Number of requests that ended in an error.
    pub documents_failed: u64,
    /// Total payload bytes of successfully processed documents.
    pub bytes_processed: u64,
    /// Total images returned across all successful requests.
    pub images_extracted: u64,
}
