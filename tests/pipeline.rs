//! Orchestrator behavior against counting in-process collaborators.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::json;
use tempfile::TempDir;

use hiremind::embedding::{DisabledProvider, EmbeddingProvider};
use hiremind::extract::{ExtractError, FileTextExtractor, TextExtractor};
use hiremind::fields::{DisabledFieldExtractor, FieldExtractor, RawFields};
use hiremind::models::{
    Document, DocumentKind, DocumentSummary, FieldValue, Section, UpsertReceipt,
};
use hiremind::pipeline::{
    Collaborators, FieldExtractionPolicy, OutcomeStatus, Pipeline, PipelineSettings,
};
use hiremind::store::{DocumentStore, InMemoryStore, SqliteStore};

// ============ Mocks ============

#[derive(Default)]
struct CountingText {
    calls: AtomicUsize,
}

impl TextExtractor for CountingText {
    fn extract(&self, path: &Path) -> Result<String, ExtractError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        FileTextExtractor.extract(path)
    }
}

#[derive(Default)]
struct CountingFields {
    calls: AtomicUsize,
    fail_for: HashSet<String>,
}

impl CountingFields {
    fn failing(names: &[&str]) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_for: names.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[async_trait]
impl FieldExtractor for CountingFields {
    async fn extract(&self, path: &Path, _text: &str) -> Result<RawFields> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        if self.fail_for.contains(&name) {
            bail!("model refused {}", name);
        }
        match json!({ "full_name": "Jane Doe", "total_years_experience": "7" }) {
            serde_json::Value::Object(map) => Ok(map),
            _ => unreachable!(),
        }
    }
}

/// How a [`CountingEmbedder`] misbehaves.
#[derive(Clone, Copy)]
enum EmbedFault {
    Error,
    MissingVector,
    WrongDims,
}

struct CountingEmbedder {
    calls: AtomicUsize,
    enabled: bool,
    fault: Option<EmbedFault>,
}

impl CountingEmbedder {
    fn new(enabled: bool) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            enabled,
            fault: None,
        }
    }

    fn faulty(fault: EmbedFault) -> Self {
        Self {
            fault: Some(fault),
            ..Self::new(true)
        }
    }
}

#[async_trait]
impl EmbeddingProvider for CountingEmbedder {
    fn model_name(&self) -> &str {
        "counting"
    }
    fn dims(&self) -> usize {
        2
    }
    fn is_enabled(&self) -> bool {
        self.enabled
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let mut vectors: Vec<Vec<f32>> = texts
            .iter()
            .map(|t| vec![t.chars().count() as f32, 1.0])
            .collect();
        // the first call is the whole document
        match self.fault {
            Some(EmbedFault::Error) if call > 0 => bail!("rate limited"),
            Some(EmbedFault::MissingVector) if call > 0 => {
                vectors.pop();
            }
            Some(EmbedFault::WrongDims) => vectors.iter_mut().for_each(|v| v.push(0.0)),
            _ => {}
        }
        Ok(vectors)
    }
}

/// In-memory store that counts writes and can be told to fail.
#[derive(Default)]
struct ScriptedStore {
    inner: InMemoryStore,
    writes: AtomicUsize,
    fail_setup: AtomicBool,
    fail_section: Option<String>,
    /// Accept writes but report documents as absent on read-back.
    lose_documents: bool,
}

#[async_trait]
impl DocumentStore for ScriptedStore {
    async fn ensure_schema(&self) -> Result<()> {
        if self.fail_setup.load(Ordering::SeqCst) {
            bail!("database is locked");
        }
        self.inner.ensure_schema().await
    }
    async fn find_by_hash(
        &self,
        kind: DocumentKind,
        sha: &str,
    ) -> Result<Option<DocumentSummary>> {
        self.inner.find_by_hash(kind, sha).await
    }
    async fn upsert_document(&self, doc: &Document) -> Result<UpsertReceipt> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.upsert_document(doc).await
    }
    async fn upsert_section(&self, section: &Section) -> Result<UpsertReceipt> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_section.as_deref() == Some(section.title.as_str()) {
            bail!("constraint violation");
        }
        self.inner.upsert_section(section).await
    }
    async fn read_document(&self, kind: DocumentKind, sha: &str) -> Result<Option<Document>> {
        if self.lose_documents {
            return Ok(None);
        }
        self.inner.read_document(kind, sha).await
    }
    async fn read_sections(&self, kind: DocumentKind, sha: &str) -> Result<Vec<Section>> {
        self.inner.read_sections(kind, sha).await
    }
    async fn list_documents(&self, kind: DocumentKind) -> Result<Vec<DocumentSummary>> {
        self.inner.list_documents(kind).await
    }
    async fn delete_document(&self, kind: DocumentKind, sha: &str) -> Result<bool> {
        self.inner.delete_document(kind, sha).await
    }
}

// ============ Harness ============

struct Harness {
    dir: TempDir,
    text: Arc<CountingText>,
    fields: Arc<CountingFields>,
    embedder: Arc<CountingEmbedder>,
    store: Arc<ScriptedStore>,
    pipeline: Pipeline,
}

impl Harness {
    fn build(
        kind: DocumentKind,
        fields: CountingFields,
        store: ScriptedStore,
        settings: PipelineSettings,
        embeddings: bool,
    ) -> Self {
        Self::build_with(
            kind,
            fields,
            store,
            settings,
            CountingEmbedder::new(embeddings),
        )
    }

    fn build_with(
        kind: DocumentKind,
        fields: CountingFields,
        store: ScriptedStore,
        settings: PipelineSettings,
        embedder: CountingEmbedder,
    ) -> Self {
        let text = Arc::new(CountingText::default());
        let fields = Arc::new(fields);
        let embedder = Arc::new(embedder);
        let store = Arc::new(store);
        let pipeline = Pipeline::new(
            kind,
            Collaborators {
                text: text.clone(),
                fields: fields.clone(),
                embedder: embedder.clone(),
                store: store.clone(),
            },
            settings,
        );
        Self {
            dir: TempDir::new().unwrap(),
            text,
            fields,
            embedder,
            store,
            pipeline,
        }
    }

    fn new() -> Self {
        Self::build(
            DocumentKind::Cv,
            CountingFields::default(),
            ScriptedStore::default(),
            PipelineSettings::default(),
            true,
        )
    }

    fn with_policy(policy: FieldExtractionPolicy, failing: &[&str]) -> Self {
        Self::build(
            DocumentKind::Cv,
            CountingFields::failing(failing),
            ScriptedStore::default(),
            PipelineSettings {
                field_policy: policy,
                ..PipelineSettings::default()
            },
            true,
        )
    }

    fn with_embedder(embedder: CountingEmbedder) -> Self {
        Self::build_with(
            DocumentKind::Cv,
            CountingFields::default(),
            ScriptedStore::default(),
            PipelineSettings::default(),
            embedder,
        )
    }

    fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    /// `n` files `cv1.txt..cvN.txt` with distinct content.
    fn write_batch(&self, n: usize) -> Vec<PathBuf> {
        (1..=n)
            .map(|i| {
                self.write(
                    &format!("cv{}.txt", i),
                    &format!("SUMMARY:\nCandidate number {} writes Rust services.", i),
                )
            })
            .collect()
    }

    fn calls(&self) -> (usize, usize, usize, usize) {
        (
            self.text.calls.load(Ordering::SeqCst),
            self.fields.calls.load(Ordering::SeqCst),
            self.embedder.calls.load(Ordering::SeqCst),
            self.store.writes.load(Ordering::SeqCst),
        )
    }
}

// ============ Tests ============

#[tokio::test]
async fn new_file_runs_every_stage_once() {
    let h = Harness::new();
    let path = h.write(
        "jane.txt",
        "EXPERIENCE:\nBuilt ingestion pipelines at Acme\n\nEDUCATION:\nstudied computer science at the state university",
    );

    let outcome = h.pipeline.process_one(&path).await;
    assert_eq!(outcome.status, OutcomeStatus::Stored, "{:?}", outcome.errors);
    assert!(outcome.stored);
    assert!(outcome.errors.is_empty());
    assert_eq!(outcome.sha.as_deref().map(str::len), Some(64));
    assert_eq!(
        outcome.fields.get("personal_full_name"),
        Some(&FieldValue::Text("Jane Doe".into()))
    );
    assert_eq!(
        outcome.fields.get("experience_total_years"),
        Some(&FieldValue::Integer(7))
    );
    let titles: Vec<&str> = outcome.sections.titles().collect();
    assert_eq!(titles, vec!["EXPERIENCE", "EDUCATION"]);

    // one extract, one field call, one doc embed + one batched section embed,
    // one document write + two section writes
    assert_eq!(h.calls(), (1, 1, 2, 3));

    let sha = outcome.sha.unwrap();
    let doc = h
        .store
        .read_document(DocumentKind::Cv, &sha)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(doc.filename, "jane.txt");
    assert!(doc.vector.is_some());
    let sections = h.store.read_sections(DocumentKind::Cv, &sha).await.unwrap();
    assert_eq!(sections.len(), 2);
    assert_eq!(sections[1].text, "EDUCATION:\nstudied computer science at the state university");
    assert!(sections.iter().all(|s| s.vector.is_some()));
}

#[tokio::test]
async fn dedup_hit_makes_no_collaborator_calls() {
    let h = Harness::new();
    let path = h.write("jane.txt", "SUMMARY:\nRust engineer");
    let first = h.pipeline.process_one(&path).await;
    assert_eq!(first.status, OutcomeStatus::Stored);
    let before = h.calls();

    // same bytes under another name
    let copy = h.write("jane-copy.txt", "SUMMARY:\nRust engineer");
    let second = h.pipeline.process_one(&copy).await;
    assert!(second.already_present());
    assert!(!second.stored);
    assert!(second.errors.is_empty());
    assert_eq!(second.sha, first.sha);
    assert_eq!(h.calls(), before);
}

#[tokio::test]
async fn batch_isolates_a_failing_file() {
    let h = Harness::with_policy(FieldExtractionPolicy::Continue, &["cv3.txt"]);
    let files = h.write_batch(5);

    let result = h.pipeline.process_batch(&files).await.unwrap();
    assert_eq!(result.processed, 4);
    assert_eq!(result.failed, 1);
    assert_eq!(result.errors.len(), 1);
    assert!(
        result.errors[0].starts_with("cv3.txt: field extraction failed"),
        "{}",
        result.errors[0]
    );

    let progress = h.pipeline.progress();
    assert!(!progress.active);
    assert_eq!((progress.done, progress.total), (5, 5));
    assert!(progress.start.is_some());
}

#[tokio::test]
async fn stop_after_first_failure_skips_the_extractor() {
    let h = Harness::with_policy(FieldExtractionPolicy::StopAfterFirstFailure, &["cv2.txt"]);
    let mut files = h.write_batch(4);
    // duplicate of cv1, still reported as already present
    files.push(h.write(
        "cv1-again.txt",
        "SUMMARY:\nCandidate number 1 writes Rust services.",
    ));

    let result = h.pipeline.process_batch(&files).await.unwrap();
    assert_eq!(result.processed, 1);
    assert_eq!(result.already_present, 1);
    assert_eq!(result.failed, 3);
    assert_eq!(h.fields.calls.load(Ordering::SeqCst), 2);
    assert!(result.errors[0].starts_with("cv2.txt: field extraction failed"));
    assert!(result.errors[1].starts_with("cv3.txt: field extraction suspended"));
    assert!(result.errors[2].starts_with("cv4.txt: field extraction suspended"));

    // a new batch starts with the extractor enabled again
    let retry = h.pipeline.process_batch(&files[2..3]).await.unwrap();
    assert_eq!(retry.processed, 1);
    assert_eq!(h.fields.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn continue_policy_keeps_calling_the_extractor() {
    let h = Harness::with_policy(FieldExtractionPolicy::Continue, &["cv1.txt", "cv2.txt"]);
    let files = h.write_batch(4);
    let result = h.pipeline.process_batch(&files).await.unwrap();
    assert_eq!(result.processed, 2);
    assert_eq!(result.failed, 2);
    assert_eq!(h.fields.calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn pre_checks_reject_before_hashing() {
    let h = Harness::build(
        DocumentKind::Role,
        CountingFields::default(),
        ScriptedStore::default(),
        PipelineSettings {
            max_file_bytes: 16,
            ..PipelineSettings::default()
        },
        true,
    );
    let big = h.write("big.txt", "RESPONSIBILITIES:\nfar more than sixteen bytes");
    let missing = h.dir.path().join("missing.pdf");
    let folder = h.dir.path().join("folder.txt");
    std::fs::create_dir(&folder).unwrap();

    let oversize = h.pipeline.process_one(&big).await;
    assert_eq!(oversize.status, OutcomeStatus::Failed);
    assert!(oversize.sha.is_none());
    assert!(oversize.errors[0].starts_with("big.txt: file is"));
    assert!(oversize.errors[0].contains("over the 16 byte limit"));

    let not_found = h.pipeline.process_one(&missing).await;
    assert_eq!(not_found.errors, vec!["missing.pdf: file not found"]);

    let not_a_file = h.pipeline.process_one(&folder).await;
    assert_eq!(not_a_file.errors, vec!["folder.txt: not a regular file"]);

    assert_eq!(h.calls(), (0, 0, 0, 0));
}

#[tokio::test]
async fn setup_failure_aborts_the_batch() {
    let store = ScriptedStore::default();
    store.fail_setup.store(true, Ordering::SeqCst);
    let h = Harness::build(
        DocumentKind::Cv,
        CountingFields::default(),
        store,
        PipelineSettings::default(),
        true,
    );
    let files = h.write_batch(3);

    let err = h.pipeline.process_batch(&files).await.unwrap_err();
    assert!(format!("{:#}", err).contains("database is locked"));
    assert_eq!(h.calls(), (0, 0, 0, 0));

    let progress = h.pipeline.progress();
    assert!(!progress.active);
    assert_eq!((progress.done, progress.total), (0, 3));
}

#[tokio::test]
async fn section_write_failure_keeps_the_document() {
    let h = Harness::build(
        DocumentKind::Cv,
        CountingFields::default(),
        ScriptedStore {
            fail_section: Some("SKILLS".to_string()),
            ..ScriptedStore::default()
        },
        PipelineSettings::default(),
        true,
    );
    let path = h.write(
        "cv.txt",
        "SUMMARY:\nbackend engineer\n\nSKILLS:\nrust and sql and kubernetes in production",
    );

    let outcome = h.pipeline.process_one(&path).await;
    assert!(outcome.stored);
    assert_eq!(outcome.status, OutcomeStatus::Stored);
    assert_eq!(outcome.errors.len(), 1);
    assert!(outcome.errors[0].starts_with("cv.txt: store section write failed"));

    let sha = outcome.sha.unwrap();
    let stored = h.store.read_sections(DocumentKind::Cv, &sha).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].title, "SUMMARY");
}

#[tokio::test]
async fn overwrite_bypasses_dedup() {
    let h = Harness::new();
    let path = h.write("jane.txt", "SUMMARY:\nRust engineer");
    h.pipeline.process_one(&path).await;

    let again = h.pipeline.process_one_with(&path, true).await;
    assert_eq!(again.status, OutcomeStatus::Stored);
    assert_eq!(h.fields.calls.load(Ordering::SeqCst), 2);
    assert_eq!(h.store.inner.document_count(), 1);
}

#[tokio::test]
async fn disabled_embeddings_store_without_vectors() {
    let h = Harness::build(
        DocumentKind::Role,
        CountingFields::default(),
        ScriptedStore::default(),
        PipelineSettings::default(),
        false,
    );
    let path = h.write("role.txt", "RESPONSIBILITIES:\nOwn the ingestion service");

    let outcome = h.pipeline.process_one(&path).await;
    assert_eq!(outcome.status, OutcomeStatus::Stored);
    assert_eq!(h.embedder.calls.load(Ordering::SeqCst), 0);
    let doc = h
        .store
        .read_document(DocumentKind::Role, outcome.sha.as_deref().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert!(doc.vector.is_none());
    // role schema has no personal_* attributes
    assert!(doc.attributes.is_empty());
}

#[tokio::test]
async fn unsupported_files_fail_at_extraction() {
    let h = Harness::new();
    let path = h.write("photo.png", "not really a png");
    let outcome = h.pipeline.process_one(&path).await;
    assert_eq!(outcome.status, OutcomeStatus::Failed);
    assert!(outcome.sha.is_some());
    assert_eq!(
        outcome.errors,
        vec!["photo.png: text extraction failed: unsupported file type: .png"]
    );
    assert_eq!(h.fields.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn folder_batch_filters_by_extension() {
    let h = Harness::new();
    h.write_batch(2);
    h.write("notes.png", "ignored");
    let exts = vec!["txt".to_string(), "md".to_string()];

    let result = h
        .pipeline
        .process_folder(h.dir.path(), &exts, false)
        .await
        .unwrap();
    assert_eq!(result.processed, 2);
    assert!(result.errors.is_empty());
    assert_eq!(h.pipeline.progress().total, 2);

    let missing = h
        .pipeline
        .process_folder(&h.dir.path().join("absent"), &exts, false)
        .await
        .unwrap();
    assert_eq!(missing, Default::default());
}

async fn assert_embedding_failure(fault: EmbedFault, cause: &str) {
    let h = Harness::with_embedder(CountingEmbedder::faulty(fault));
    let path = h.write(
        "cv.txt",
        "SUMMARY:\nbackend engineer\n\nSKILLS:\nrust and sql and kubernetes in production",
    );

    let outcome = h.pipeline.process_one(&path).await;
    assert_eq!(outcome.status, OutcomeStatus::Failed);
    assert!(!outcome.stored);
    assert_eq!(outcome.errors.len(), 1);
    assert!(
        outcome.errors[0].starts_with("cv.txt: embedding failed: "),
        "{}",
        outcome.errors[0]
    );
    assert!(outcome.errors[0].contains(cause), "{}", outcome.errors[0]);
    assert_eq!(h.store.writes.load(Ordering::SeqCst), 0);
    assert_eq!(h.store.inner.document_count(), 0);
}

#[tokio::test]
async fn embedding_error_fails_before_any_write() {
    assert_embedding_failure(EmbedFault::Error, "rate limited").await;
}

#[tokio::test]
async fn missing_section_vector_fails_before_any_write() {
    assert_embedding_failure(EmbedFault::MissingVector, "expected 2 section vectors, got 1").await;
}

#[tokio::test]
async fn wrong_vector_dimension_fails_before_any_write() {
    assert_embedding_failure(
        EmbedFault::WrongDims,
        "expected 2-dimensional vectors from counting, got 3",
    )
    .await;
}

#[tokio::test]
async fn missing_read_back_fails_a_written_document() {
    let h = Harness::build(
        DocumentKind::Cv,
        CountingFields::default(),
        ScriptedStore {
            lose_documents: true,
            ..ScriptedStore::default()
        },
        PipelineSettings::default(),
        true,
    );
    let path = h.write("cv.txt", "SUMMARY:\nRust engineer");

    let outcome = h.pipeline.process_one(&path).await;
    assert_eq!(outcome.status, OutcomeStatus::Failed);
    assert!(outcome.stored);
    assert_eq!(
        outcome.errors,
        vec!["cv.txt: read-back verification failed: document missing after write"]
    );
    // one document write and one section write happened before the check
    assert_eq!(h.store.writes.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn single_file_reports_setup_failure() {
    let store = ScriptedStore::default();
    store.fail_setup.store(true, Ordering::SeqCst);
    let h = Harness::build(
        DocumentKind::Cv,
        CountingFields::default(),
        store,
        PipelineSettings::default(),
        true,
    );
    let path = h.write("cv.txt", "SUMMARY:\nRust engineer");

    let outcome = h.pipeline.process_one(&path).await;
    assert_eq!(outcome.status, OutcomeStatus::Failed);
    assert_eq!(
        outcome.errors,
        vec!["cv.txt: store setup failed: database is locked"]
    );
    assert_eq!(h.calls(), (0, 0, 0, 0));
}

#[tokio::test]
async fn single_file_prepares_a_fresh_sqlite_store() {
    let dir = TempDir::new().unwrap();
    let store = SqliteStore::connect(&dir.path().join("fresh.sqlite")).await.unwrap();
    let store: Arc<dyn DocumentStore> = Arc::new(store);
    let pipeline = Pipeline::new(
        DocumentKind::Role,
        Collaborators {
            text: Arc::new(FileTextExtractor),
            fields: Arc::new(DisabledFieldExtractor),
            embedder: Arc::new(DisabledProvider),
            store: store.clone(),
        },
        PipelineSettings::default(),
    );
    let path = dir.path().join("role.md");
    std::fs::write(&path, "RESPONSIBILITIES:\nOwn the ingestion service").unwrap();

    let outcome = pipeline.process_one(&path).await;
    assert_eq!(outcome.status, OutcomeStatus::Stored, "{:?}", outcome.errors);
    let listed = store.list_documents(DocumentKind::Role).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].filename, "role.md");
}
