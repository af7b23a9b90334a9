//! Ingestion pipeline orchestration.
//!
//! Drives one file at a time through
//! validate → hash → dedup lookup → text extraction → field extraction →
//! slicing → embedding → document upsert → section upserts → read-back.
//!
//! A file whose hash is already stored short-circuits after the lookup:
//! no extraction, embedding, or write calls are made for it. Failures are
//! isolated per file and reported as `"<filename>: <cause>"` strings; only a
//! failure to prepare the store aborts a batch.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{Config, IngestConfig};
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::error::{IngestError, IngestStage};
use crate::extract::{ExtractError, FileTextExtractor, TextExtractor};
use crate::fields::{create_field_extractor, FieldExtractor, FieldSchema};
use crate::hasher;
use crate::models::{Document, DocumentKind, FieldMap, Section};
use crate::progress::{ProgressSnapshot, ProgressTracker};
use crate::slice::{slice_with, SectionMap, SliceOptions};
use crate::store::DocumentStore;

/// What to do with the field extractor after it fails once in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldExtractionPolicy {
    /// Keep calling the extractor for every new file.
    Continue,
    /// Skip the extractor for the rest of the batch; later new files fail
    /// with a field-extraction error without a call.
    StopAfterFirstFailure,
}

/// Per-pipeline tunables.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    /// Files strictly larger than this are rejected before hashing.
    pub max_file_bytes: u64,
    pub slice: SliceOptions,
    pub field_policy: FieldExtractionPolicy,
}

impl PipelineSettings {
    pub fn from_config(config: &IngestConfig, kind: DocumentKind) -> Self {
        Self {
            max_file_bytes: config.max_file_bytes(),
            slice: config.slice_options(),
            field_policy: config.field_policy.for_kind(kind),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&IngestConfig::default(), DocumentKind::Role)
    }
}

/// The pipeline's external dependencies.
#[derive(Clone)]
pub struct Collaborators {
    pub text: Arc<dyn TextExtractor>,
    pub fields: Arc<dyn FieldExtractor>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub store: Arc<dyn DocumentStore>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Newly written (or rewritten under overwrite) and verified.
    Stored,
    /// Hash already known; nothing was called or written.
    AlreadyPresent,
    Failed,
}

/// Result of processing one file.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessOutcome {
    pub filename: String,
    pub sha: Option<String>,
    pub status: OutcomeStatus,
    /// The document record was written, even if later steps failed.
    pub stored: bool,
    pub fields: FieldMap,
    pub sections: SectionMap,
    pub errors: Vec<String>,
}

impl ProcessOutcome {
    fn new(filename: String) -> Self {
        Self {
            filename,
            sha: None,
            status: OutcomeStatus::Failed,
            stored: false,
            fields: FieldMap::new(),
            sections: SectionMap::new(),
            errors: Vec::new(),
        }
    }

    pub fn already_present(&self) -> bool {
        self.status == OutcomeStatus::AlreadyPresent
    }
}

/// Aggregate result of [`Pipeline::process_batch`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchResult {
    /// Files newly stored or updated.
    pub processed: usize,
    pub already_present: usize,
    pub failed: usize,
    /// Every per-file error, in input order.
    pub errors: Vec<String>,
}

#[derive(Default)]
struct BatchState {
    fields_suspended: bool,
}

/// Orchestrates ingestion for one [`DocumentKind`].
pub struct Pipeline {
    kind: DocumentKind,
    settings: PipelineSettings,
    schema: FieldSchema,
    collab: Collaborators,
    progress: Arc<ProgressTracker>,
}

impl Pipeline {
    pub fn new(kind: DocumentKind, collab: Collaborators, settings: PipelineSettings) -> Self {
        Self {
            kind,
            settings,
            schema: FieldSchema::for_kind(kind),
            collab,
            progress: Arc::new(ProgressTracker::new(kind.progress_key())),
        }
    }

    /// Build a pipeline wired to the configured providers.
    pub fn from_config(
        config: &Config,
        kind: DocumentKind,
        store: Arc<dyn DocumentStore>,
        progress: Arc<ProgressTracker>,
    ) -> Result<Self> {
        let collab = Collaborators {
            text: Arc::new(FileTextExtractor),
            fields: create_field_extractor(&config.extraction, kind)?,
            embedder: create_provider(&config.embedding)?,
            store,
        };
        let settings = PipelineSettings::from_config(&config.ingest, kind);
        Ok(Self::new(kind, collab, settings).with_progress(progress))
    }

    /// Report into a shared tracker instead of a private one.
    pub fn with_progress(mut self, progress: Arc<ProgressTracker>) -> Self {
        self.progress = progress;
        self
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn progress(&self) -> ProgressSnapshot {
        self.progress.snapshot()
    }

    /// Process a single file, skipping it if its content is already stored.
    pub async fn process_one(&self, path: &Path) -> ProcessOutcome {
        self.process_one_with(path, false).await
    }

    /// Process a single file; with `overwrite` the dedup short-circuit is
    /// bypassed and the document is re-extracted and re-upserted.
    ///
    /// The store schema is prepared first, so this works against a fresh
    /// store; a setup failure is reported as this file's error.
    pub async fn process_one_with(&self, path: &Path, overwrite: bool) -> ProcessOutcome {
        if let Err(e) = self.collab.store.ensure_schema().await {
            let filename = display_name(path);
            let err = IngestError::store(IngestStage::Setup, e);
            warn!(kind = %self.kind, file = %filename, error = %err, "store setup failed");
            let mut outcome = ProcessOutcome::new(filename);
            outcome.errors.push(err.describe(&outcome.filename));
            return outcome;
        }
        let mut state = BatchState::default();
        self.run_file(path, overwrite, &mut state).await
    }

    /// Process `paths` sequentially.
    ///
    /// Returns `Err` only when the store cannot be prepared; in that case no
    /// file is touched. Per-file failures land in [`BatchResult::errors`].
    pub async fn process_batch(&self, paths: &[PathBuf]) -> Result<BatchResult> {
        self.process_batch_with(paths, false).await
    }

    pub async fn process_batch_with(
        &self,
        paths: &[PathBuf],
        overwrite: bool,
    ) -> Result<BatchResult> {
        let run = self.progress.begin(paths.len());
        info!(kind = %self.kind, files = paths.len(), "batch started");

        self.collab
            .store
            .ensure_schema()
            .await
            .context("document store setup failed")?;

        let mut state = BatchState::default();
        let mut result = BatchResult::default();

        for path in paths {
            let _item = run.item();
            let outcome = self.run_file(path, overwrite, &mut state).await;
            match outcome.status {
                OutcomeStatus::Stored => result.processed += 1,
                OutcomeStatus::AlreadyPresent => result.already_present += 1,
                OutcomeStatus::Failed => result.failed += 1,
            }
            result.errors.extend(outcome.errors);
        }

        run.finish();
        info!(
            kind = %self.kind,
            processed = result.processed,
            already_present = result.already_present,
            failed = result.failed,
            "batch finished"
        );
        Ok(result)
    }

    /// List the candidate files of `folder` and process them as one batch.
    pub async fn process_folder(
        &self,
        folder: &Path,
        extensions: &[String],
        overwrite: bool,
    ) -> Result<BatchResult> {
        let files = list_candidate_files(folder, extensions)?;
        self.process_batch_with(&files, overwrite).await
    }

    async fn run_file(
        &self,
        path: &Path,
        overwrite: bool,
        state: &mut BatchState,
    ) -> ProcessOutcome {
        let filename = display_name(path);
        let mut outcome = ProcessOutcome::new(filename.clone());
        if let Err(err) = self.ingest(path, overwrite, state, &mut outcome).await {
            warn!(
                kind = %self.kind,
                file = %filename,
                stage = %err.stage(),
                error = %err,
                "file failed"
            );
            outcome.status = OutcomeStatus::Failed;
            outcome.errors.push(err.describe(&filename));
        }
        outcome
    }

    async fn ingest(
        &self,
        path: &Path,
        overwrite: bool,
        state: &mut BatchState,
        outcome: &mut ProcessOutcome,
    ) -> Result<(), IngestError> {
        self.check_file(path)?;

        let sha = self.hash(path).await?;
        outcome.sha = Some(sha.clone());

        if !overwrite {
            let existing = self
                .collab
                .store
                .find_by_hash(self.kind, &sha)
                .await
                .map_err(|e| IngestError::store(IngestStage::Lookup, e))?;
            if existing.is_some() {
                info!(kind = %self.kind, file = %outcome.filename, sha = %sha, "already present");
                outcome.status = OutcomeStatus::AlreadyPresent;
                return Ok(());
            }
        }

        let text = self.extract_text(path).await?;
        debug!(file = %outcome.filename, chars = text.chars().count(), "text extracted");

        outcome.fields = self.extract_fields(path, &text, state).await?;
        outcome.sections = slice_with(&text, &self.settings.slice);

        let bodies: Vec<String> = outcome.sections.bodies().map(str::to_string).collect();
        let (doc_vector, section_vectors) = self.embed(&text, &bodies).await?;

        let doc = Document {
            kind: self.kind,
            sha: sha.clone(),
            filename: outcome.filename.clone(),
            full_text: text,
            attributes: outcome.fields.clone(),
            timestamp: chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            vector: doc_vector,
        };
        self.collab
            .store
            .upsert_document(&doc)
            .await
            .map_err(|e| IngestError::store(IngestStage::DocumentWrite, e))?;
        outcome.stored = true;

        let mut written = 0usize;
        let mut section_errors = Vec::new();
        for (position, (title, body)) in outcome.sections.iter().enumerate() {
            let section = Section {
                kind: self.kind,
                parent_sha: sha.clone(),
                title: title.to_string(),
                position: position as i64,
                text: body.to_string(),
                vector: section_vectors
                    .as_ref()
                    .and_then(|v| v.get(position).cloned()),
            };
            match self.collab.store.upsert_section(&section).await {
                Ok(_) => written += 1,
                Err(e) => {
                    let err = IngestError::store(IngestStage::SectionWrite, e);
                    warn!(
                        file = %outcome.filename,
                        section = %title,
                        error = %err,
                        "section write failed"
                    );
                    section_errors.push(err.describe(&outcome.filename));
                }
            }
        }
        outcome.errors.extend(section_errors);

        self.verify(&doc, written).await?;

        info!(
            kind = %self.kind,
            file = %outcome.filename,
            sha = %sha,
            sections = written,
            "document stored"
        );
        outcome.status = OutcomeStatus::Stored;
        Ok(())
    }

    fn check_file(&self, path: &Path) -> Result<(), IngestError> {
        let meta = std::fs::metadata(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                IngestError::NotFound
            } else {
                IngestError::Io {
                    stage: IngestStage::Validate,
                    source,
                }
            }
        })?;
        if !meta.is_file() {
            return Err(IngestError::NotAFile);
        }
        if meta.len() > self.settings.max_file_bytes {
            return Err(IngestError::Oversize {
                size: meta.len(),
                limit: self.settings.max_file_bytes,
            });
        }
        Ok(())
    }

    /// Hashing reads the whole file, so it runs on the blocking pool.
    async fn hash(&self, path: &Path) -> Result<String, IngestError> {
        let owned = path.to_path_buf();
        tokio::task::spawn_blocking(move || hasher::hash_file(&owned))
            .await
            .map_err(std::io::Error::other)
            .and_then(|r| r)
            .map_err(|source| IngestError::Io {
                stage: IngestStage::Hash,
                source,
            })
    }

    /// PDF and DOCX decoding is CPU-bound; keep it off the async workers.
    async fn extract_text(&self, path: &Path) -> Result<String, IngestError> {
        let extractor = Arc::clone(&self.collab.text);
        let owned = path.to_path_buf();
        let text = tokio::task::spawn_blocking(move || extractor.extract(&owned))
            .await
            .map_err(|e| ExtractError::Io(std::io::Error::other(e)))??;
        Ok(text)
    }

    async fn extract_fields(
        &self,
        path: &Path,
        text: &str,
        state: &mut BatchState,
    ) -> Result<FieldMap, IngestError> {
        if state.fields_suspended {
            return Err(IngestError::FieldExtractionSuspended);
        }
        match self.collab.fields.extract(path, text).await {
            Ok(raw) => Ok(self.schema.map(&raw)),
            Err(e) => {
                if self.settings.field_policy == FieldExtractionPolicy::StopAfterFirstFailure {
                    warn!(
                        kind = %self.kind,
                        "field extraction suspended for the rest of the batch"
                    );
                    state.fields_suspended = true;
                }
                Err(IngestError::FieldExtraction(format!("{:#}", e)))
            }
        }
    }

    /// One call for the whole document and one batched call for all
    /// section bodies. Skipped entirely when the provider is disabled.
    ///
    /// Every vector must have the provider's advertised dimension (when it
    /// advertises one), or the file fails before anything is written.
    async fn embed(
        &self,
        text: &str,
        bodies: &[String],
    ) -> Result<(Option<Vec<f32>>, Option<Vec<Vec<f32>>>), IngestError> {
        let embedder = &self.collab.embedder;
        if !embedder.is_enabled() {
            return Ok((None, None));
        }

        let doc_vector = embedder
            .embed(&[text.to_string()])
            .await
            .map_err(|e| IngestError::Embedding(format!("{:#}", e)))?
            .into_iter()
            .next()
            .ok_or_else(|| IngestError::Embedding("no vector returned for document".into()))?;

        let section_vectors = if bodies.is_empty() {
            Vec::new()
        } else {
            embedder
                .embed(bodies)
                .await
                .map_err(|e| IngestError::Embedding(format!("{:#}", e)))?
        };
        if section_vectors.len() != bodies.len() {
            return Err(IngestError::Embedding(format!(
                "expected {} section vectors, got {}",
                bodies.len(),
                section_vectors.len()
            )));
        }

        let dims = embedder.dims();
        if dims > 0 {
            let wrong = std::iter::once(&doc_vector)
                .chain(section_vectors.iter())
                .find(|v| v.len() != dims);
            if let Some(v) = wrong {
                return Err(IngestError::Embedding(format!(
                    "expected {}-dimensional vectors from {}, got {}",
                    dims,
                    embedder.model_name(),
                    v.len()
                )));
            }
        }
        debug!(
            model = embedder.model_name(),
            sections = section_vectors.len(),
            "embedded document"
        );

        Ok((Some(doc_vector), Some(section_vectors)))
    }

    async fn verify(&self, doc: &Document, sections_written: usize) -> Result<(), IngestError> {
        let store = &self.collab.store;
        let back = store
            .read_document(self.kind, &doc.sha)
            .await
            .map_err(|e| IngestError::store(IngestStage::Verify, e))?
            .ok_or_else(|| IngestError::Verification("document missing after write".into()))?;
        if back.sha != doc.sha || back.filename != doc.filename {
            return Err(IngestError::Verification(format!(
                "stored record does not match ({} / {})",
                back.sha, back.filename
            )));
        }

        let sections = store
            .read_sections(self.kind, &doc.sha)
            .await
            .map_err(|e| IngestError::store(IngestStage::Verify, e))?;
        if sections.len() < sections_written {
            return Err(IngestError::Verification(format!(
                "expected {} sections, found {}",
                sections_written,
                sections.len()
            )));
        }
        Ok(())
    }
}

/// Regular files directly inside `folder` whose extension (case-insensitive)
/// is in `extensions`, sorted by path. A missing folder yields no files.
pub fn list_candidate_files(folder: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    if !folder.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(folder).min_depth(1).max_depth(1) {
        let entry = entry.with_context(|| format!("Failed to list {}", folder.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let matches = entry
            .path()
            .extension()
            .map(|ext| {
                let ext = ext.to_string_lossy();
                extensions
                    .iter()
                    .any(|want| want.trim_start_matches('.').eq_ignore_ascii_case(&ext))
            })
            .unwrap_or(false);
        if matches {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
