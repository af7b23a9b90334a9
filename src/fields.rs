//! Structured field extraction.
//!
//! A [`FieldExtractor`] turns a document into a raw JSON object of facts
//! (name, skills, years of experience, ...). The raw keys are whatever the
//! extraction model emits; [`FieldSchema`] maps them onto the canonical
//! attribute names stored with each document and coerces every value to its
//! declared [`FieldKind`].
//!
//! # Providers
//!
//! | Config Value | Extractor |
//! |--------------|-----------|
//! | `"disabled"` | [`DisabledFieldExtractor`] (always yields no fields) |
//! | `"openai"` | [`OpenAIFieldExtractor`] (chat completions, JSON mode) |

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::config::ExtractionConfig;
use crate::models::{DocumentKind, FieldMap, FieldValue};
use crate::openai::OpenAIClient;

/// Raw key/value output of an extraction call.
pub type RawFields = Map<String, Value>;

/// Produces raw structured fields for one document.
///
/// Called at most once per newly processed file. Implementations own any
/// retry behavior; the pipeline treats an `Err` as a per-file failure.
#[async_trait]
pub trait FieldExtractor: Send + Sync {
    /// `text` is the document's already-extracted plain text.
    async fn extract(&self, path: &Path, text: &str) -> Result<RawFields>;
}

/// Declared type of a canonical attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Boolean,
    List,
}

/// One row of a mapping table: raw key → canonical attribute.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub source: &'static str,
    pub attribute: &'static str,
    pub kind: FieldKind,
}

const fn spec(source: &'static str, attribute: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec {
        source,
        attribute,
        kind,
    }
}

use FieldKind::{Boolean, Integer, List, Text};

const CV_FIELDS: &[FieldSpec] = &[
    spec("first_name", "personal_first_name", Text),
    spec("last_name", "personal_last_name", Text),
    spec("full_name", "personal_full_name", Text),
    spec("email", "personal_email", Text),
    spec("phone", "personal_phone", Text),
    spec("misspelling_count", "professional_misspelling_count", Integer),
    spec("misspelled_words", "professional_misspelled_words", Text),
    spec("visual_cleanliness", "professional_visual_cleanliness", Text),
    spec("professional_look", "professional_look", Text),
    spec("formatting_consistency", "professional_formatting_consistency", Text),
    spec("years_since_graduation", "experience_years_since_graduation", Integer),
    spec("total_years_experience", "experience_total_years", Integer),
    spec("employer_names", "experience_employer_names", Text),
    spec("employers_count", "stability_employers_count", Integer),
    spec("avg_years_per_employer", "stability_avg_years_per_employer", Text),
    spec("years_at_current_employer", "stability_years_at_current_employer", Text),
    spec("address", "socio_address", Text),
    spec("alma_mater", "socio_alma_mater", Text),
    spec("high_school", "socio_high_school", Text),
    spec("education_system", "socio_education_system", Text),
    spec("second_foreign_language", "socio_second_foreign_language", Text),
    spec("flag_stem_degree", "flag_stem_degree", Text),
    spec("military_service_status", "flag_military_service_status", Text),
    spec("worked_at_financial_institution", "flag_worked_at_financial_institution", Text),
    spec("worked_for_egyptian_government", "flag_worked_for_egyptian_government", Text),
];

const ROLE_FIELDS: &[FieldSpec] = &[
    spec("role_title", "role_title", Text),
    spec("job_title", "job_title", Text),
    spec("employer", "employer", Text),
    spec("job_location", "job_location", Text),
    spec("language_requirement", "language_requirement", List),
    spec("onsite_requirement_percentage", "onsite_requirement_percentage", Integer),
    spec("onsite_requirement_mandatory", "onsite_requirement_mandatory", Boolean),
    spec("serves_government", "serves_government", Boolean),
    spec("serves_financial_institution", "serves_financial_institution", Boolean),
    spec("min_years_experience", "min_years_experience", Integer),
    spec("must_have_skills", "must_have_skills", List),
    spec("should_have_skills", "should_have_skills", List),
    spec("nice_to_have_skills", "nice_to_have_skills", List),
    spec("min_must_have_degree", "min_must_have_degree", Text),
    spec("preferred_universities", "preferred_universities", List),
    spec("responsibilities", "responsibilities", List),
    spec("technical_qualifications", "technical_qualifications", List),
    spec("non_technical_qualifications", "non_technical_qualifications", List),
];

/// The mapping table for one [`DocumentKind`].
#[derive(Debug, Clone, Copy)]
pub struct FieldSchema {
    kind: DocumentKind,
    fields: &'static [FieldSpec],
}

impl FieldSchema {
    pub fn for_kind(kind: DocumentKind) -> Self {
        let fields = match kind {
            DocumentKind::Cv => CV_FIELDS,
            DocumentKind::Role => ROLE_FIELDS,
        };
        Self { kind, fields }
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    pub fn fields(&self) -> &'static [FieldSpec] {
        self.fields
    }

    /// Map raw extractor output to canonical attributes.
    ///
    /// Unknown keys are dropped. Values that cannot be coerced, nulls and
    /// empty strings leave the attribute absent.
    pub fn map(&self, raw: &RawFields) -> FieldMap {
        let mut out = FieldMap::new();
        for field in self.fields {
            let Some(value) = raw.get(field.source) else {
                continue;
            };
            if let Some(coerced) = coerce(value, field.kind) {
                out.insert(field.attribute.to_string(), coerced);
            }
        }
        out
    }
}

fn coerce(value: &Value, kind: FieldKind) -> Option<FieldValue> {
    match kind {
        FieldKind::Text => as_text(value).map(FieldValue::Text),
        FieldKind::Integer => as_integer(value).map(FieldValue::Integer),
        FieldKind::Boolean => as_bool(value).map(FieldValue::Boolean),
        FieldKind::List => as_list(value).map(FieldValue::List),
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(scalar_string).collect();
            (!parts.is_empty()).then(|| parts.join(", "))
        }
        Value::Object(_) => Some(value.to_string()),
        other => scalar_string(other).filter(|s| !s.trim().is_empty()),
    }
}

fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            s.parse::<i64>()
                .ok()
                .or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite())
                        .map(|f| f.trunc() as i64)
                })
        }
        _ => None,
    }
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" | "1" => Some(true),
            "false" | "no" | "n" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn as_list(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::Null => None,
        Value::Array(items) => Some(items.iter().filter_map(scalar_string).collect()),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(s) {
                return Some(items.iter().filter_map(scalar_string).collect());
            }
            Some(vec![s.to_string()])
        }
        other => scalar_string(other).map(|s| vec![s]),
    }
}

// ============ Disabled Extractor ============

/// Extractor used when `extraction.provider = "disabled"`; yields no fields.
pub struct DisabledFieldExtractor;

#[async_trait]
impl FieldExtractor for DisabledFieldExtractor {
    async fn extract(&self, _path: &Path, _text: &str) -> Result<RawFields> {
        Ok(RawFields::new())
    }
}

// ============ OpenAI Extractor ============

/// Extracts fields with an OpenAI-compatible chat completions endpoint in
/// JSON mode. Requires `OPENAI_API_KEY`.
pub struct OpenAIFieldExtractor {
    client: OpenAIClient,
    model: String,
    schema: FieldSchema,
}

impl OpenAIFieldExtractor {
    pub fn new(config: &ExtractionConfig, kind: DocumentKind) -> Result<Self> {
        Ok(Self {
            client: OpenAIClient::from_env(
                &config.base_url,
                config.timeout_secs,
                config.max_retries,
            )?,
            model: config.model.clone(),
            schema: FieldSchema::for_kind(kind),
        })
    }
}

/// System prompt asking for exactly the raw keys of `schema`.
pub fn system_prompt(schema: &FieldSchema) -> String {
    let subject = match schema.kind() {
        DocumentKind::Cv => "a candidate's CV",
        DocumentKind::Role => "a job role description",
    };
    let mut prompt = format!(
        "You extract structured facts from {subject}. Reply with one JSON object \
         using only these keys; use null when a value is unknown.\n"
    );
    for field in schema.fields() {
        let hint = match field.kind {
            FieldKind::Text => "string",
            FieldKind::Integer => "integer",
            FieldKind::Boolean => "boolean",
            FieldKind::List => "array of strings",
        };
        prompt.push_str(&format!("- {}: {}\n", field.source, hint));
    }
    prompt
}

#[async_trait]
impl FieldExtractor for OpenAIFieldExtractor {
    async fn extract(&self, path: &Path, text: &str) -> Result<RawFields> {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let body = serde_json::json!({
            "model": self.model,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": system_prompt(&self.schema) },
                { "role": "user", "content": format!("File: {}\n\n{}", filename, text) },
            ],
        });

        let json = self
            .client
            .post_json("chat/completions", &body)
            .await
            .context("field extraction request failed")?;
        parse_chat_response(&json)
    }
}

/// Pull the JSON object out of `choices[0].message.content`.
fn parse_chat_response(json: &Value) -> Result<RawFields> {
    let content = json
        .pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .ok_or_else(|| anyhow::anyhow!("invalid OpenAI response: missing message content"))?;
    match serde_json::from_str::<Value>(content)
        .context("model reply is not valid JSON")?
    {
        Value::Object(map) => Ok(map),
        _ => bail!("model reply is not a JSON object"),
    }
}

/// Create the field extractor configured for `kind`.
pub fn create_field_extractor(
    config: &ExtractionConfig,
    kind: DocumentKind,
) -> Result<Arc<dyn FieldExtractor>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledFieldExtractor)),
        "openai" => Ok(Arc::new(OpenAIFieldExtractor::new(config, kind)?)),
        other => bail!("Unknown extraction provider: {}", other),
    }
}
