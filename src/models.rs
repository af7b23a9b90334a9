//! Core data models used throughout the pipeline.
//!
//! These types represent the documents, sections, and store receipts that
//! flow from ingestion into the document store.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which pipeline a document belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    /// Applicant résumé / CV.
    Cv,
    /// Job-role description.
    Role,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 2] = [DocumentKind::Cv, DocumentKind::Role];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Cv => "cv",
            DocumentKind::Role => "role",
        }
    }

    /// Key under which batch progress for this kind is reported.
    pub fn progress_key(&self) -> &'static str {
        match self {
            DocumentKind::Cv => "documents",
            DocumentKind::Role => "roles",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cv" | "cvs" | "documents" | "resume" => Ok(DocumentKind::Cv),
            "role" | "roles" => Ok(DocumentKind::Role),
            other => anyhow::bail!("Unknown document kind: '{}'. Must be cv or role.", other),
        }
    }
}

/// A single typed attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Boolean(bool),
    Integer(i64),
    Text(String),
    List(Vec<String>),
}

/// Canonical attribute name → value. Absent fields are simply missing.
pub type FieldMap = BTreeMap<String, FieldValue>;

/// A stored document, identified by `(kind, sha)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub kind: DocumentKind,
    /// SHA-256 of the source bytes, 64 lowercase hex characters.
    pub sha: String,
    pub filename: String,
    pub full_text: String,
    pub attributes: FieldMap,
    /// RFC 3339 processing timestamp.
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
}

/// A titled excerpt of a document, identified by `(kind, parent_sha, title)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Section {
    pub kind: DocumentKind,
    pub parent_sha: String,
    pub title: String,
    /// Zero-based position in document order.
    pub position: i64,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
}

/// Lightweight document metadata, returned by hash lookups and listings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentSummary {
    pub id: String,
    pub kind: DocumentKind,
    pub sha: String,
    pub filename: String,
    pub timestamp: String,
}

/// Identifier assigned by the store to a written record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpsertReceipt {
    pub id: String,
}
