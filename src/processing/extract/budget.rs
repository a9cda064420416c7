//! Decompression accounting shared by the extractors.
//!
//! A DOCX part or a flate stream can expand far beyond the payload that carried it, so every
//! decompressed read of one document draws from a single allowance.

use crate::processing::types::PipelineError;
use std::io::Read;
use thiserror::Error;

/// Upper bound on the buffer reserved before any byte has been read.
const MAX_PREALLOCATION: usize = 1024 * 1024;

/// Failure while reading decompressed content.
#[derive(Debug, Error)]
pub(crate) enum BudgetError {
    /// The document expands past the allowance.
    #[error("decompressed content exceeds the {limit} byte limit")]
    Exceeded {
        /// Allowance for the whole document.
        limit: usize,
    },
    /// The underlying stream could not be read or inflated.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<BudgetError> for PipelineError {
    fn from(err: BudgetError) -> Self {
        PipelineError::CorruptDocument(err.to_string())
    }
}

/// Remaining allowance of decompressed bytes for one document.
#[derive(Debug)]
pub(crate) struct ExpansionBudget {
    limit: usize,
    used: usize,
}

impl ExpansionBudget {
    pub(crate) fn new(limit: usize) -> Self {
        Self { limit, used: 0 }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.limit - self.used
    }

    /// Charge `len` bytes that are already in memory.
    pub(crate) fn charge(&mut self, len: usize) -> Result<(), BudgetError> {
        if len > self.remaining() {
            return Err(BudgetError::Exceeded { limit: self.limit });
        }
        self.used += len;
        Ok(())
    }

    /// Read `reader` to its end, never buffering more than the remaining allowance plus one byte.
    ///
    /// `size_hint` (such as a size declared in a ZIP header) only sizes the initial buffer.
    pub(crate) fn read_to_end<R: Read>(
        &mut self,
        reader: R,
        size_hint: usize,
    ) -> Result<Vec<u8>, BudgetError> {
        let remaining = self.remaining();
        let mut buffer = Vec::with_capacity(size_hint.min(remaining).min(MAX_PREALLOCATION));
        let read = reader
            .take((remaining as u64).saturating_add(1))
            .read_to_end(&mut buffer);
        // Bytes decoded before a stream error still count.
        self.charge(buffer.len())?;
        read?;
        Ok(buffer)
    }
}
