//! Storage abstractions for Policy Check.
//!
//! Three traits cover the stores the pipeline touches:
//!
//! | Trait | Holds |
//! |-------|-------|
//! | [`PolicyStore`] | policy documents and their chunks (relational) |
//! | [`VectorIndex`] | chunk vectors with denormalized metadata |
//! | [`ComplianceLog`] | the append-only audit log of analyses |
//!
//! A backend may implement all three (the SQLite store does) or only some.
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use async_trait::async_trait;

use crate::error::ComplianceError;
use crate::models::{
    ChunkMatch, ChunkMetadata, ChunkVectorRecord, ComplianceCheckRecord, LogQuery,
    NewComplianceCheck, NewPolicyDocument, PolicyCategory, PolicyChunk, PolicyDocument,
};

/// Metadata restriction for a vector search. Every present field must match
/// exactly; an empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetrievalFilter {
    pub department: Option<String>,
    pub category: Option<PolicyCategory>,
}

impl RetrievalFilter {
    pub fn is_empty(&self) -> bool {
        self.department.is_none() && self.category.is_none()
    }

    /// The filter as metadata key/value pairs.
    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(dept) = &self.department {
            pairs.push(("department", dept.clone()));
        }
        if let Some(cat) = self.category {
            pairs.push(("category", cat.as_str().to_string()));
        }
        pairs
    }

    pub fn matches(&self, meta: &ChunkMetadata) -> bool {
        let dept_ok = match &self.department {
            Some(d) => meta.department.as_deref() == Some(d.as_str()),
            None => true,
        };
        let cat_ok = match self.category {
            Some(c) => meta.category == c,
            None => true,
        };
        dept_ok && cat_ok
    }
}

/// Relational store for policy documents and chunks.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Record a document under a caller-chosen id, so the stored file name
    /// can carry the id before the row exists.
    async fn insert_document(
        &self,
        id: &str,
        doc: &NewPolicyDocument,
        file_path: &str,
    ) -> Result<PolicyDocument, ComplianceError>;

    async fn get_document(&self, id: &str) -> Result<Option<PolicyDocument>, ComplianceError>;

    /// All documents, newest first.
    async fn list_documents(&self) -> Result<Vec<PolicyDocument>, ComplianceError>;

    /// Delete a document and, by cascade, its chunks. Returns `false` if no
    /// such document existed.
    async fn delete_document(&self, id: &str) -> Result<bool, ComplianceError>;

    async fn count_documents(&self) -> Result<u64, ComplianceError>;

    /// Replace every chunk of a document with new ones built from `texts`,
    /// in order. Returns the created chunks.
    async fn replace_chunks(
        &self,
        document_id: &str,
        texts: &[String],
    ) -> Result<Vec<PolicyChunk>, ComplianceError>;

    async fn chunks_for_document(
        &self,
        document_id: &str,
    ) -> Result<Vec<PolicyChunk>, ComplianceError>;
}

/// Vector index backend. Query-time embedding lives in
/// [`VectorIndexGateway`](crate::index::VectorIndexGateway), not here.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or overwrite records keyed by chunk id.
    async fn upsert(&self, records: &[ChunkVectorRecord]) -> Result<(), ComplianceError>;

    /// Nearest neighbours of `vector` among records matching `filter`,
    /// by descending cosine similarity, at most `top_k`.
    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &RetrievalFilter,
    ) -> Result<Vec<ChunkMatch>, ComplianceError>;

    /// Drop every record whose metadata names `document_id`.
    async fn delete_by_document(&self, document_id: &str) -> Result<(), ComplianceError>;
}

/// Append-only audit log of compliance checks.
#[async_trait]
pub trait ComplianceLog: Send + Sync {
    /// Persist one record and return its id.
    async fn append(&self, check: &NewComplianceCheck) -> Result<String, ComplianceError>;

    /// Records matching `query`, newest first, at most `query.limit`.
    async fn list(&self, query: &LogQuery) -> Result<Vec<ComplianceCheckRecord>, ComplianceError>;

    async fn get(&self, id: &str) -> Result<Option<ComplianceCheckRecord>, ComplianceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(department: Option<&str>, category: PolicyCategory) -> ChunkMetadata {
        ChunkMetadata {
            document_id: "d1".to_string(),
            chunk_id: "c1".to_string(),
            category,
            department: department.map(str::to_string),
            text: "text".to_string(),
        }
    }

    #[test]
    fn test_empty_filter_matches_all() {
        let f = RetrievalFilter::default();
        assert!(f.is_empty());
        assert!(f.pairs().is_empty());
        assert!(f.matches(&meta(None, PolicyCategory::Hr)));
        assert!(f.matches(&meta(Some("Sales"), PolicyCategory::Security)));
    }

    #[test]
    fn test_every_pair_must_match() {
        let f = RetrievalFilter {
            department: Some("Sales".to_string()),
            category: Some(PolicyCategory::Security),
        };
        assert_eq!(f.pairs().len(), 2);
        assert!(f.matches(&meta(Some("Sales"), PolicyCategory::Security)));
        assert!(!f.matches(&meta(Some("sales"), PolicyCategory::Security)));
        assert!(!f.matches(&meta(Some("Sales"), PolicyCategory::Hr)));
        assert!(!f.matches(&meta(None, PolicyCategory::Security)));
    }
}
