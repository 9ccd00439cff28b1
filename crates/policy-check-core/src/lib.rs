//! # Policy Check Core
//!
//! Runtime-agnostic logic for Policy Check: data models, chunking, verdict
//! validation, gateway and store traits, the vector-index gateway, the
//! context classifier, and the retrieval-augmented analyzer.
//!
//! This crate contains no sqlx, HTTP client, or filesystem I/O. Concrete
//! gateways and the SQLite store live in the `policy-check` app crate.

pub mod analyzer;
pub mod chunk;
pub mod classify;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod index;
pub mod models;
pub mod store;
pub mod verdict;

pub use error::ComplianceError;
