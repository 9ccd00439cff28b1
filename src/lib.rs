//! # Policy Check
//!
//! Checks draft workplace text against a company's policy documents.
//! Policy files are extracted, chunked, embedded, and stored in SQLite; a
//! check retrieves the most similar policy chunks and asks a generative
//! model for a structured verdict, which is validated and written to an
//! audit log.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌───────────┐
//! │ Upload       │──▶│ Extract      │──▶│  SQLite   │
//! │ PDF/DOCX/TXT │   │ Chunk+Embed  │   │ docs+vecs │
//! └──────────────┘   └──────────────┘   └─────┬─────┘
//!                                             │ retrieve
//!                    ┌──────────┐       ┌─────▼─────┐
//!                    │ Verdict  │◀──────│ Analyzer  │
//!                    │ + audit  │       │ (LLM)     │
//!                    └──────────┘       └───────────┘
//! ```
//!
//! The pipeline itself lives in `policy_check_core`; this crate supplies
//! the SQLite store, HTTP gateways, ingestion, the CLI, and the HTTP API.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | Policy store, vector index, and compliance log on SQLite |
//! | [`embedding`] | OpenAI / Ollama embedding gateways |
//! | [`generation`] | OpenAI chat completions gateway |
//! | [`retry`] | Shared HTTP retry with backoff |
//! | [`extract`] | PDF / DOCX / text extraction |
//! | [`ingest`] | Upload, ingestion, and deletion of policy documents |
//! | [`app`] | Service wiring |
//! | [`commands`] | CLI command bodies |
//! | [`server`] | HTTP API |

pub mod app;
pub mod commands;
pub mod config;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod generation;
pub mod ingest;
pub mod migrate;
pub mod retry;
pub mod server;
pub mod sqlite_store;
