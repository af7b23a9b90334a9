//! In-memory [`DocumentStore`] implementation for tests and dry runs.
//!
//! Uses `HashMap` behind `std::sync::RwLock` for thread safety. Nothing is
//! persisted.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Document, DocumentKind, DocumentSummary, Section, UpsertReceipt};

use super::DocumentStore;

type DocKey = (DocumentKind, String);
type SectionKey = (DocumentKind, String, String);

struct StoredDoc {
    id: String,
    doc: Document,
}

struct StoredSection {
    id: String,
    section: Section,
}

/// In-memory store keyed exactly like the SQLite schema.
pub struct InMemoryStore {
    docs: RwLock<HashMap<DocKey, StoredDoc>>,
    sections: RwLock<HashMap<SectionKey, StoredSection>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
            sections: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored documents across all kinds.
    pub fn document_count(&self) -> usize {
        read(&self.docs).len()
    }

    /// Number of stored sections across all kinds.
    pub fn section_count(&self) -> usize {
        read(&self.sections).len()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

// Writers replace whole entries, so a poisoned map is still consistent.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|p| p.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|p| p.into_inner())
}

fn summary(stored: &StoredDoc) -> DocumentSummary {
    DocumentSummary {
        id: stored.id.clone(),
        kind: stored.doc.kind,
        sha: stored.doc.sha.clone(),
        filename: stored.doc.filename.clone(),
        timestamp: stored.doc.timestamp.clone(),
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn ensure_schema(&self) -> Result<()> {
        Ok(())
    }

    async fn find_by_hash(
        &self,
        kind: DocumentKind,
        sha: &str,
    ) -> Result<Option<DocumentSummary>> {
        Ok(read(&self.docs).get(&(kind, sha.to_string())).map(summary))
    }

    async fn upsert_document(&self, doc: &Document) -> Result<UpsertReceipt> {
        let mut docs = write(&self.docs);
        let key = (doc.kind, doc.sha.clone());
        let id = docs
            .get(&key)
            .map(|s| s.id.clone())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        docs.insert(
            key,
            StoredDoc {
                id: id.clone(),
                doc: doc.clone(),
            },
        );
        Ok(UpsertReceipt { id })
    }

    async fn upsert_section(&self, section: &Section) -> Result<UpsertReceipt> {
        let mut sections = write(&self.sections);
        let key = (
            section.kind,
            section.parent_sha.clone(),
            section.title.clone(),
        );
        let id = sections
            .get(&key)
            .map(|s| s.id.clone())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        sections.insert(
            key,
            StoredSection {
                id: id.clone(),
                section: section.clone(),
            },
        );
        Ok(UpsertReceipt { id })
    }

    async fn read_document(&self, kind: DocumentKind, sha: &str) -> Result<Option<Document>> {
        Ok(read(&self.docs)
            .get(&(kind, sha.to_string()))
            .map(|s| s.doc.clone()))
    }

    async fn read_sections(&self, kind: DocumentKind, sha: &str) -> Result<Vec<Section>> {
        let mut out: Vec<Section> = read(&self.sections)
            .values()
            .filter(|s| s.section.kind == kind && s.section.parent_sha == sha)
            .map(|s| s.section.clone())
            .collect();
        out.sort_by(|a, b| a.position.cmp(&b.position).then(a.title.cmp(&b.title)));
        Ok(out)
    }

    async fn list_documents(&self, kind: DocumentKind) -> Result<Vec<DocumentSummary>> {
        let mut out: Vec<DocumentSummary> = read(&self.docs)
            .values()
            .filter(|s| s.doc.kind == kind)
            .map(summary)
            .collect();
        out.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(a.sha.cmp(&b.sha)));
        Ok(out)
    }

    async fn delete_document(&self, kind: DocumentKind, sha: &str) -> Result<bool> {
        let removed = write(&self.docs).remove(&(kind, sha.to_string())).is_some();
        write(&self.sections).retain(|(k, parent, _), _| !(*k == kind && parent == sha));
        Ok(removed)
    }
}
