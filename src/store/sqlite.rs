//! SQLite-backed [`DocumentStore`] implementation.
//!
//! Schema:
//!
//! - `documents`: one row per `(kind, sha)`; attributes as JSON text, the
//!   whole-document vector as a little-endian `f32` BLOB.
//! - `sections`: one row per `(kind, parent_sha, title)`, with its position
//!   and optional vector.

use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;

use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::models::{Document, DocumentKind, DocumentSummary, FieldMap, Section, UpsertReceipt};

use super::DocumentStore;

/// SQLite implementation of the [`DocumentStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if missing) the database at `db_path`.
    pub async fn connect(db_path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database directory: {}", parent.display())
                })?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database: {}", db_path.display()))?;

        Ok(Self::new(pool))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn summary_from_row(row: &SqliteRow) -> Result<DocumentSummary> {
    let kind: String = row.get("kind");
    Ok(DocumentSummary {
        id: row.get("id"),
        kind: kind.parse()?,
        sha: row.get("sha"),
        filename: row.get("filename"),
        timestamp: row.get("timestamp"),
    })
}

fn section_from_row(row: &SqliteRow) -> Result<Section> {
    let kind: String = row.get("kind");
    let vector: Option<Vec<u8>> = row.get("vector");
    Ok(Section {
        kind: kind.parse()?,
        parent_sha: row.get("parent_sha"),
        title: row.get("title"),
        position: row.get("position"),
        text: row.get("text"),
        vector: vector.map(|b| blob_to_vec(&b)),
    })
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                sha TEXT NOT NULL,
                filename TEXT NOT NULL,
                full_text TEXT NOT NULL,
                attributes_json TEXT NOT NULL DEFAULT '{}',
                timestamp TEXT NOT NULL,
                vector BLOB,
                updated_at INTEGER NOT NULL,
                UNIQUE(kind, sha)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("create documents table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sections (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                parent_sha TEXT NOT NULL,
                title TEXT NOT NULL,
                position INTEGER NOT NULL,
                text TEXT NOT NULL,
                vector BLOB,
                updated_at INTEGER NOT NULL,
                UNIQUE(kind, parent_sha, title)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("create sections table")?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_sections_parent ON sections(kind, parent_sha, position)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_documents_timestamp ON documents(kind, timestamp DESC)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_hash(
        &self,
        kind: DocumentKind,
        sha: &str,
    ) -> Result<Option<DocumentSummary>> {
        let row = sqlx::query(
            "SELECT id, kind, sha, filename, timestamp FROM documents WHERE kind = ? AND sha = ?",
        )
        .bind(kind.as_str())
        .bind(sha)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(summary_from_row).transpose()
    }

    async fn upsert_document(&self, doc: &Document) -> Result<UpsertReceipt> {
        let attributes_json = serde_json::to_string(&doc.attributes)?;
        let vector = doc.vector.as_deref().map(vec_to_blob);
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO documents (id, kind, sha, filename, full_text, attributes_json,
                                   timestamp, vector, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(kind, sha) DO UPDATE SET
                filename = excluded.filename,
                full_text = excluded.full_text,
                attributes_json = excluded.attributes_json,
                timestamp = excluded.timestamp,
                vector = excluded.vector,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(doc.kind.as_str())
        .bind(&doc.sha)
        .bind(&doc.filename)
        .bind(&doc.full_text)
        .bind(&attributes_json)
        .bind(&doc.timestamp)
        .bind(&vector)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let id: String = sqlx::query_scalar("SELECT id FROM documents WHERE kind = ? AND sha = ?")
            .bind(doc.kind.as_str())
            .bind(&doc.sha)
            .fetch_one(&self.pool)
            .await?;

        Ok(UpsertReceipt { id })
    }

    async fn upsert_section(&self, section: &Section) -> Result<UpsertReceipt> {
        let vector = section.vector.as_deref().map(vec_to_blob);
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO sections (id, kind, parent_sha, title, position, text, vector, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(kind, parent_sha, title) DO UPDATE SET
                position = excluded.position,
                text = excluded.text,
                vector = excluded.vector,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(section.kind.as_str())
        .bind(&section.parent_sha)
        .bind(&section.title)
        .bind(section.position)
        .bind(&section.text)
        .bind(&vector)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let id: String = sqlx::query_scalar(
            "SELECT id FROM sections WHERE kind = ? AND parent_sha = ? AND title = ?",
        )
        .bind(section.kind.as_str())
        .bind(&section.parent_sha)
        .bind(&section.title)
        .fetch_one(&self.pool)
        .await?;

        Ok(UpsertReceipt { id })
    }

    async fn read_document(&self, kind: DocumentKind, sha: &str) -> Result<Option<Document>> {
        let row = sqlx::query(
            r#"
            SELECT sha, filename, full_text, attributes_json, timestamp, vector
            FROM documents WHERE kind = ? AND sha = ?
            "#,
        )
        .bind(kind.as_str())
        .bind(sha)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let attributes_json: String = row.get("attributes_json");
        let attributes: FieldMap = serde_json::from_str(&attributes_json)
            .with_context(|| format!("corrupt attributes for document {}", sha))?;
        let vector: Option<Vec<u8>> = row.get("vector");

        Ok(Some(Document {
            kind,
            sha: row.get("sha"),
            filename: row.get("filename"),
            full_text: row.get("full_text"),
            attributes,
            timestamp: row.get("timestamp"),
            vector: vector.map(|b| blob_to_vec(&b)),
        }))
    }

    async fn read_sections(&self, kind: DocumentKind, sha: &str) -> Result<Vec<Section>> {
        let rows = sqlx::query(
            r#"
            SELECT kind, parent_sha, title, position, text, vector
            FROM sections WHERE kind = ? AND parent_sha = ?
            ORDER BY position ASC, title ASC
            "#,
        )
        .bind(kind.as_str())
        .bind(sha)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(section_from_row).collect()
    }

    async fn list_documents(&self, kind: DocumentKind) -> Result<Vec<DocumentSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT id, kind, sha, filename, timestamp FROM documents
            WHERE kind = ? ORDER BY timestamp DESC, sha ASC
            "#,
        )
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(summary_from_row).collect()
    }

    async fn delete_document(&self, kind: DocumentKind, sha: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM sections WHERE kind = ? AND parent_sha = ?")
            .bind(kind.as_str())
            .bind(sha)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM documents WHERE kind = ? AND sha = ?")
            .bind(kind.as_str())
            .bind(sha)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }
}
