//! Document retrieval, listing and deletion for the CLI.
//!
//! `hiremind get`, `hiremind list` and `hiremind delete` read straight from
//! the document store; nothing here goes through the pipeline.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::models::{DocumentKind, FieldValue};
use crate::store::{DocumentStore, SqliteStore};

/// CLI entry point for `get`: prints one document with its sections.
pub async fn run_get(config: &Config, kind: DocumentKind, sha: &str) -> Result<()> {
    let store = SqliteStore::connect(&config.db.path).await?;
    store.ensure_schema().await?;

    let Some(doc) = store.read_document(kind, sha).await? else {
        store.close().await;
        bail!("document not found: {} {}", kind, sha);
    };
    let sections = store.read_sections(kind, sha).await?;
    store.close().await;

    println!("--- Document ---");
    println!("kind:      {}", doc.kind);
    println!("sha:       {}", doc.sha);
    println!("filename:  {}", doc.filename);
    println!("timestamp: {}", doc.timestamp);
    println!(
        "vector:    {}",
        doc.vector
            .as_ref()
            .map(|v| format!("{} dims", v.len()))
            .unwrap_or_else(|| "(none)".to_string())
    );
    println!();

    println!("--- Attributes ({}) ---", doc.attributes.len());
    for (name, value) in &doc.attributes {
        println!("{}: {}", name, render_value(value));
    }
    println!();

    println!("--- Sections ({}) ---", sections.len());
    for section in &sections {
        println!("[{}] {}", section.position, section.title);
        println!("{}", section.text);
        println!();
    }

    Ok(())
}

/// CLI entry point for `list`: one line per stored document, newest first.
pub async fn run_list(config: &Config, kind: DocumentKind) -> Result<()> {
    let store = SqliteStore::connect(&config.db.path).await?;
    store.ensure_schema().await?;
    let docs = store.list_documents(kind).await?;
    store.close().await;

    if docs.is_empty() {
        println!("No {} documents stored.", kind);
        return Ok(());
    }
    for doc in &docs {
        println!("{}  {}  {}", doc.sha, doc.timestamp, doc.filename);
    }
    println!("{} document(s)", docs.len());
    Ok(())
}

/// CLI entry point for `delete`.
pub async fn run_delete(config: &Config, kind: DocumentKind, sha: &str) -> Result<()> {
    let store = SqliteStore::connect(&config.db.path).await?;
    store.ensure_schema().await?;
    let removed = store.delete_document(kind, sha).await?;
    store.close().await;

    if !removed {
        bail!("document not found: {} {}", kind, sha);
    }
    println!("deleted {} {}", kind, sha);
    Ok(())
}

fn render_value(value: &FieldValue) -> String {
    match value {
        FieldValue::Text(s) => s.clone(),
        FieldValue::Integer(n) => n.to_string(),
        FieldValue::Boolean(b) => b.to_string(),
        FieldValue::List(items) => items.join(", "),
    }
}
