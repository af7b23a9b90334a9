//! # hiremind
//!
//! Ingestion pipeline for applicant résumés and job-role descriptions.
//!
//! Each file is validated, identified by the SHA-256 of its bytes, and
//! skipped if that hash is already stored. New files have their text
//! extracted, structured fields pulled out, the text sliced into titled
//! sections, everything embedded, and the result upserted into a document
//! store and read back.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────────────────────┐   ┌──────────┐
//! │  Files   │──▶│ Pipeline                      │──▶│  SQLite   │
//! │ PDF/DOCX │   │ hash → dedup → extract →      │   │ documents │
//! │ TXT/MD   │   │ fields → slice → embed → save │   │ sections  │
//! └──────────┘   └──────────────┬────────────────┘   └──────────┘
//!                               │ progress
//!                     ┌─────────┴─────────┐
//!                     ▼                   ▼
//!                ┌──────────┐       ┌──────────┐
//!                │   CLI    │       │   HTTP   │
//!                └──────────┘       └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Core data types |
//! | [`error`] | Per-file ingestion errors |
//! | [`hasher`] | Streaming SHA-256 content hashing |
//! | [`extract`] | Plain-text extraction (PDF, DOCX, text) |
//! | [`fields`] | Structured field extraction and mapping tables |
//! | [`slice`] | Heuristic section slicing |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`openai`] | Shared OpenAI HTTP client with retry |
//! | [`store`] | Document store trait, SQLite and in-memory backends |
//! | [`progress`] | Batch progress tracking and reporters |
//! | [`pipeline`] | Per-file orchestration and batches |
//! | [`ingest`] | `ingest` / `slice` CLI commands |
//! | [`get`] | `get` / `list` / `delete` CLI commands |
//! | [`server`] | HTTP server |

pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod fields;
pub mod get;
pub mod hasher;
pub mod ingest;
pub mod models;
pub mod openai;
pub mod pipeline;
pub mod progress;
pub mod server;
pub mod slice;
pub mod store;
