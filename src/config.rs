use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::models::DocumentKind;
use crate::pipeline::FieldExtractionPolicy;
use crate::slice::SliceOptions;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub folders: FoldersConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_max_file_mb")]
    pub max_file_mb: u64,
    #[serde(default = "default_max_section_chars")]
    pub max_section_chars: usize,
    #[serde(default = "default_min_section_chars")]
    pub min_section_chars: usize,
    #[serde(default)]
    pub field_policy: FieldPolicyConfig,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_file_mb: default_max_file_mb(),
            max_section_chars: default_max_section_chars(),
            min_section_chars: default_min_section_chars(),
            field_policy: FieldPolicyConfig::default(),
            extensions: default_extensions(),
        }
    }
}

impl IngestConfig {
    pub fn max_file_bytes(&self) -> u64 {
        self.max_file_mb * 1024 * 1024
    }

    pub fn slice_options(&self) -> SliceOptions {
        SliceOptions {
            max_section_chars: self.max_section_chars,
            min_section_chars: self.min_section_chars,
        }
    }
}

fn default_max_file_mb() -> u64 {
    10
}
fn default_max_section_chars() -> usize {
    2000
}
fn default_min_section_chars() -> usize {
    60
}
fn default_extensions() -> Vec<String> {
    ["pdf", "docx", "txt", "md"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct FieldPolicyConfig {
    #[serde(default = "default_cv_policy")]
    pub cv: FieldExtractionPolicy,
    #[serde(default = "default_role_policy")]
    pub role: FieldExtractionPolicy,
}

impl Default for FieldPolicyConfig {
    fn default() -> Self {
        Self {
            cv: default_cv_policy(),
            role: default_role_policy(),
        }
    }
}

impl FieldPolicyConfig {
    pub fn for_kind(&self, kind: DocumentKind) -> FieldExtractionPolicy {
        match kind {
            DocumentKind::Cv => self.cv,
            DocumentKind::Role => self.role,
        }
    }
}

fn default_cv_policy() -> FieldExtractionPolicy {
    FieldExtractionPolicy::StopAfterFirstFailure
}
fn default_role_policy() -> FieldExtractionPolicy {
    FieldExtractionPolicy::Continue
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_extraction_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_extraction_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_extraction_max_retries")]
    pub max_retries: u32,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_extraction_model(),
            base_url: default_base_url(),
            timeout_secs: default_extraction_timeout_secs(),
            max_retries: default_extraction_max_retries(),
        }
    }
}

impl ExtractionConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_extraction_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_extraction_timeout_secs() -> u64 {
    60
}
fn default_extraction_max_retries() -> u32 {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            base_url: default_base_url(),
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:5000".to_string()
}

/// Default source folders for `ingest --folder`-less runs.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct FoldersConfig {
    pub documents: Option<PathBuf>,
    pub roles: Option<PathBuf>,
}

impl FoldersConfig {
    pub fn for_kind(&self, kind: DocumentKind) -> Option<&Path> {
        match kind {
            DocumentKind::Cv => self.documents.as_deref(),
            DocumentKind::Role => self.roles.as_deref(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate ingest
    if config.ingest.max_file_mb == 0 {
        anyhow::bail!("ingest.max_file_mb must be > 0");
    }
    if config.ingest.max_section_chars == 0 {
        anyhow::bail!("ingest.max_section_chars must be > 0");
    }
    if config.ingest.min_section_chars >= config.ingest.max_section_chars {
        anyhow::bail!("ingest.min_section_chars must be < ingest.max_section_chars");
    }

    // Validate extraction
    match config.extraction.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown extraction provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    // Validate embedding
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.batch_size == 0 {
            anyhow::bail!("embedding.batch_size must be > 0");
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    Ok(())
}
