//! Storage abstraction for ingested documents and their sections.
//!
//! The [`DocumentStore`] trait is everything the pipeline needs from a
//! persistence backend. Documents are keyed by `(kind, sha)`; sections by
//! `(kind, parent_sha, title)`. Both upserts are idempotent.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Document, DocumentKind, DocumentSummary, Section, UpsertReceipt};

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Abstract storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`ensure_schema`](DocumentStore::ensure_schema) | Create tables/indexes; run once per batch |
/// | [`find_by_hash`](DocumentStore::find_by_hash) | Dedup lookup |
/// | [`upsert_document`](DocumentStore::upsert_document) | Insert or update a document |
/// | [`upsert_section`](DocumentStore::upsert_section) | Insert or update one section |
/// | [`read_document`](DocumentStore::read_document) | Full document by hash |
/// | [`read_sections`](DocumentStore::read_sections) | Sections of a document, in position order |
/// | [`list_documents`](DocumentStore::list_documents) | Summaries of every document of a kind |
/// | [`delete_document`](DocumentStore::delete_document) | Remove a document and its sections |
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn ensure_schema(&self) -> Result<()>;

    async fn find_by_hash(&self, kind: DocumentKind, sha: &str)
        -> Result<Option<DocumentSummary>>;

    /// Insert or update a document. Returns its id (existing or newly generated).
    async fn upsert_document(&self, doc: &Document) -> Result<UpsertReceipt>;

    /// Insert or update a section. Returns its id (existing or newly generated).
    async fn upsert_section(&self, section: &Section) -> Result<UpsertReceipt>;

    async fn read_document(&self, kind: DocumentKind, sha: &str) -> Result<Option<Document>>;

    async fn read_sections(&self, kind: DocumentKind, sha: &str) -> Result<Vec<Section>>;

    /// Newest first.
    async fn list_documents(&self, kind: DocumentKind) -> Result<Vec<DocumentSummary>>;

    /// Returns `false` when nothing matched.
    async fn delete_document(&self, kind: DocumentKind, sha: &str) -> Result<bool>;
}
