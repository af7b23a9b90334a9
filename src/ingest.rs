//! CLI ingestion commands.
//!
//! `hiremind ingest` resolves its inputs (explicit paths, `--folder`, or the
//! configured folder for the kind), runs one batch through the
//! [`Pipeline`](crate::pipeline::Pipeline), and prints a summary.
//! `hiremind slice` previews how a file would be sectioned.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use crate::config::Config;
use crate::extract::{FileTextExtractor, TextExtractor};
use crate::models::DocumentKind;
use crate::pipeline::{list_candidate_files, Pipeline};
use crate::progress::{ProgressMode, ProgressRegistry};
use crate::slice::slice_with;
use crate::store::SqliteStore;

/// Resolve the files an `ingest` invocation should process.
pub fn resolve_inputs(
    config: &Config,
    kind: DocumentKind,
    paths: Vec<PathBuf>,
    folder: Option<PathBuf>,
) -> Result<Vec<PathBuf>> {
    if !paths.is_empty() {
        return Ok(paths);
    }
    let folder = match folder {
        Some(f) => f,
        None => match config.folders.for_kind(kind) {
            Some(f) => f.to_path_buf(),
            None => bail!(
                "nothing to ingest: pass file paths, --folder, or set [folders].{}",
                kind.progress_key()
            ),
        },
    };
    list_candidate_files(&folder, &config.ingest.extensions)
}

pub async fn run_ingest(
    config: &Config,
    kind: DocumentKind,
    paths: Vec<PathBuf>,
    folder: Option<PathBuf>,
    overwrite: bool,
    progress: ProgressMode,
) -> Result<()> {
    let files = resolve_inputs(config, kind, paths, folder)?;

    let store = Arc::new(SqliteStore::connect(&config.db.path).await?);
    let registry = ProgressRegistry::with_reporter(progress.reporter());
    let pipeline = Pipeline::from_config(config, kind, store.clone(), registry.tracker(kind))?;

    let result = pipeline.process_batch_with(&files, overwrite).await?;

    println!("ingest {}", kind);
    println!("  files: {}", files.len());
    println!("  stored: {}", result.processed);
    println!("  already present: {}", result.already_present);
    println!("  failed: {}", result.failed);
    if !result.errors.is_empty() {
        println!("  errors:");
        for e in &result.errors {
            println!("    - {}", e);
        }
    }
    println!("ok");

    store.close().await;
    Ok(())
}

/// Print the section map of `path` as a JSON object (title → body).
pub fn run_slice(config: &Config, path: &Path) -> Result<()> {
    let text = FileTextExtractor
        .extract(path)
        .with_context(|| format!("Failed to extract text from {}", path.display()))?;
    let sections = slice_with(&text, &config.ingest.slice_options());
    println!("{}", serde_json::to_string_pretty(&sections)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_folder(folder: Option<&Path>) -> Config {
        let mut src = String::from("[db]\npath = \"x.sqlite\"\n");
        if let Some(f) = folder {
            src.push_str(&format!("[folders]\ndocuments = \"{}\"\n", f.display()));
        }
        toml::from_str(&src).unwrap()
    }

    #[test]
    fn explicit_paths_win() {
        let config = config_with_folder(None);
        let files = resolve_inputs(
            &config,
            DocumentKind::Cv,
            vec![PathBuf::from("a.pdf")],
            Some(PathBuf::from("/ignored")),
        )
        .unwrap();
        assert_eq!(files, vec![PathBuf::from("a.pdf")]);
    }

    #[test]
    fn configured_folder_is_listed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "x").unwrap();
        std::fs::write(dir.path().join("a.md"), "x").unwrap();
        std::fs::write(dir.path().join("skip.png"), "x").unwrap();
        let config = config_with_folder(Some(dir.path()));
        let files = resolve_inputs(&config, DocumentKind::Cv, vec![], None).unwrap();
        assert_eq!(files, vec![dir.path().join("a.md"), dir.path().join("b.txt")]);
    }

    #[test]
    fn no_input_is_an_error() {
        let config = config_with_folder(None);
        let err = resolve_inputs(&config, DocumentKind::Role, vec![], None).unwrap_err();
        assert!(err.to_string().contains("[folders].roles"));
    }
}
