//! Per-file ingestion errors.
//!
//! Every failure inside the per-file loop is one of these variants. The
//! orchestrator renders them as `"<filename>: <cause>"` strings; nothing in
//! this taxonomy ever escapes a batch.

use std::fmt;

use thiserror::Error;

use crate::extract::ExtractError;

/// Pipeline stage at which a file failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStage {
    Setup,
    Validate,
    Hash,
    Lookup,
    Extract,
    Fields,
    Embed,
    DocumentWrite,
    SectionWrite,
    Verify,
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IngestStage::Setup => "setup",
            IngestStage::Validate => "validate",
            IngestStage::Hash => "hash",
            IngestStage::Lookup => "lookup",
            IngestStage::Extract => "extract",
            IngestStage::Fields => "fields",
            IngestStage::Embed => "embed",
            IngestStage::DocumentWrite => "document write",
            IngestStage::SectionWrite => "section write",
            IngestStage::Verify => "verify",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("file not found")]
    NotFound,

    #[error("not a regular file")]
    NotAFile,

    #[error("file is {size} bytes, over the {limit} byte limit")]
    Oversize { size: u64, limit: u64 },

    #[error("{stage} failed: {source}")]
    Io {
        stage: IngestStage,
        #[source]
        source: std::io::Error,
    },

    #[error("text extraction failed: {0}")]
    Extraction(#[from] ExtractError),

    #[error("field extraction failed: {0}")]
    FieldExtraction(String),

    #[error("field extraction suspended after an earlier failure in this batch")]
    FieldExtractionSuspended,

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("store {stage} failed: {message}")]
    Store { stage: IngestStage, message: String },

    #[error("read-back verification failed: {0}")]
    Verification(String),
}

impl IngestError {
    pub fn stage(&self) -> IngestStage {
        match self {
            IngestError::NotFound | IngestError::NotAFile | IngestError::Oversize { .. } => {
                IngestStage::Validate
            }
            IngestError::Io { stage, .. } => *stage,
            IngestError::Extraction(_) => IngestStage::Extract,
            IngestError::FieldExtraction(_) | IngestError::FieldExtractionSuspended => {
                IngestStage::Fields
            }
            IngestError::Embedding(_) => IngestStage::Embed,
            IngestError::Store { stage, .. } => *stage,
            IngestError::Verification(_) => IngestStage::Verify,
        }
    }

    pub(crate) fn store(stage: IngestStage, err: anyhow::Error) -> Self {
        IngestError::Store {
            stage,
            message: format!("{:#}", err),
        }
    }

    /// Render as the batch error string for `filename`.
    pub fn describe(&self, filename: &str) -> String {
        format!("{}: {}", filename, self)
    }
}
