//! In-memory store for tests and embedded use.
//!
//! Implements [`PolicyStore`], [`VectorIndex`], and [`ComplianceLog`] over
//! `Vec`s behind `std::sync::RwLock`. Vector search is brute-force cosine
//! similarity over every stored record. Deleting a document cascades to its
//! chunks and vector records.

use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::embedding::cosine_similarity;
use crate::error::ComplianceError;
use crate::models::{
    ChunkMatch, ChunkVectorRecord, ComplianceCheckRecord, LogQuery, NewComplianceCheck,
    NewPolicyDocument, PolicyChunk, PolicyDocument,
};

use super::{ComplianceLog, PolicyStore, RetrievalFilter, VectorIndex};

/// In-memory backend. Insertion order doubles as creation order.
pub struct InMemoryStore {
    documents: RwLock<Vec<PolicyDocument>>,
    chunks: RwLock<Vec<PolicyChunk>>,
    vectors: RwLock<Vec<ChunkVectorRecord>>,
    checks: RwLock<Vec<ComplianceCheckRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(Vec::new()),
            chunks: RwLock::new(Vec::new()),
            vectors: RwLock::new(Vec::new()),
            checks: RwLock::new(Vec::new()),
        }
    }

    /// Number of vector records currently held.
    pub fn vector_count(&self) -> usize {
        self.vectors.read().unwrap().len()
    }

    /// Number of audit records currently held.
    pub fn check_count(&self) -> usize {
        self.checks.read().unwrap().len()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PolicyStore for InMemoryStore {
    async fn insert_document(
        &self,
        id: &str,
        doc: &NewPolicyDocument,
        file_path: &str,
    ) -> Result<PolicyDocument, ComplianceError> {
        let stored = PolicyDocument {
            id: id.to_string(),
            title: doc.title.clone(),
            file_path: file_path.to_string(),
            category: doc.category,
            department: doc.department.clone(),
            version: doc.version.clone(),
            created_at: Utc::now(),
        };
        self.documents.write().unwrap().push(stored.clone());
        Ok(stored)
    }

    async fn get_document(&self, id: &str) -> Result<Option<PolicyDocument>, ComplianceError> {
        let docs = self.documents.read().unwrap();
        Ok(docs.iter().find(|d| d.id == id).cloned())
    }

    async fn list_documents(&self) -> Result<Vec<PolicyDocument>, ComplianceError> {
        let docs = self.documents.read().unwrap();
        Ok(docs.iter().rev().cloned().collect())
    }

    async fn delete_document(&self, id: &str) -> Result<bool, ComplianceError> {
        let removed = {
            let mut docs = self.documents.write().unwrap();
            let before = docs.len();
            docs.retain(|d| d.id != id);
            docs.len() != before
        };
        if removed {
            self.chunks.write().unwrap().retain(|c| c.document_id != id);
            self.vectors
                .write()
                .unwrap()
                .retain(|v| v.metadata.document_id != id);
        }
        Ok(removed)
    }

    async fn count_documents(&self) -> Result<u64, ComplianceError> {
        Ok(self.documents.read().unwrap().len() as u64)
    }

    async fn replace_chunks(
        &self,
        document_id: &str,
        texts: &[String],
    ) -> Result<Vec<PolicyChunk>, ComplianceError> {
        if self.get_document(document_id).await?.is_none() {
            return Err(ComplianceError::NotFound(format!(
                "policy document {}",
                document_id
            )));
        }

        let now = Utc::now();
        let created: Vec<PolicyChunk> = texts
            .iter()
            .enumerate()
            .map(|(i, text)| PolicyChunk {
                id: Uuid::new_v4().to_string(),
                document_id: document_id.to_string(),
                chunk_index: i as i64,
                text: text.clone(),
                section_title: None,
                created_at: now,
            })
            .collect();

        let mut chunks = self.chunks.write().unwrap();
        chunks.retain(|c| c.document_id != document_id);
        chunks.extend(created.iter().cloned());
        Ok(created)
    }

    async fn chunks_for_document(
        &self,
        document_id: &str,
    ) -> Result<Vec<PolicyChunk>, ComplianceError> {
        let chunks = self.chunks.read().unwrap();
        let mut found: Vec<PolicyChunk> = chunks
            .iter()
            .filter(|c| c.document_id == document_id)
            .cloned()
            .collect();
        found.sort_by_key(|c| c.chunk_index);
        Ok(found)
    }
}

#[async_trait]
impl VectorIndex for InMemoryStore {
    async fn upsert(&self, records: &[ChunkVectorRecord]) -> Result<(), ComplianceError> {
        let mut vectors = self.vectors.write().unwrap();
        for record in records {
            vectors.retain(|v| v.chunk_id != record.chunk_id);
            vectors.push(record.clone());
        }
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &RetrievalFilter,
    ) -> Result<Vec<ChunkMatch>, ComplianceError> {
        let vectors = self.vectors.read().unwrap();
        let mut matches: Vec<ChunkMatch> = vectors
            .iter()
            .filter(|v| filter.matches(&v.metadata))
            .map(|v| ChunkMatch {
                score: cosine_similarity(vector, &v.embedding),
                metadata: v.metadata.clone(),
            })
            .collect();
        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn delete_by_document(&self, document_id: &str) -> Result<(), ComplianceError> {
        self.vectors
            .write()
            .unwrap()
            .retain(|v| v.metadata.document_id != document_id);
        Ok(())
    }
}

#[async_trait]
impl ComplianceLog for InMemoryStore {
    async fn append(&self, check: &NewComplianceCheck) -> Result<String, ComplianceError> {
        let record = ComplianceCheckRecord {
            id: Uuid::new_v4().to_string(),
            input_text: check.input_text.clone(),
            department: check.department.clone(),
            category: check.category,
            overall_risk: check.verdict.overall_risk,
            issues: check.verdict.issues.clone(),
            suggested_text: check.verdict.suggested_text.clone(),
            created_at: Utc::now(),
        };
        let id = record.id.clone();
        self.checks.write().unwrap().push(record);
        Ok(id)
    }

    async fn list(&self, query: &LogQuery) -> Result<Vec<ComplianceCheckRecord>, ComplianceError> {
        let checks = self.checks.read().unwrap();
        Ok(checks
            .iter()
            .rev()
            .filter(|c| match &query.department {
                Some(d) => c.department.as_deref() == Some(d.as_str()),
                None => true,
            })
            .filter(|c| query.risk.map_or(true, |r| c.overall_risk == r))
            .take(query.limit)
            .cloned()
            .collect())
    }

    async fn get(&self, id: &str) -> Result<Option<ComplianceCheckRecord>, ComplianceError> {
        let checks = self.checks.read().unwrap();
        Ok(checks.iter().find(|c| c.id == id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChunkMetadata, PolicyCategory, RiskLevel, Verdict};

    fn new_doc(title: &str, department: Option<&str>) -> NewPolicyDocument {
        NewPolicyDocument {
            title: title.to_string(),
            category: PolicyCategory::Security,
            department: department.map(str::to_string),
            version: None,
        }
    }

    fn record(chunk: &str, doc: &str, department: Option<&str>, v: Vec<f32>) -> ChunkVectorRecord {
        ChunkVectorRecord {
            chunk_id: chunk.to_string(),
            embedding: v,
            metadata: ChunkMetadata {
                document_id: doc.to_string(),
                chunk_id: chunk.to_string(),
                category: PolicyCategory::Security,
                department: department.map(str::to_string),
                text: format!("text of {}", chunk),
            },
        }
    }

    #[tokio::test]
    async fn test_delete_cascades_to_chunks_and_vectors() {
        let store = InMemoryStore::new();
        let doc = store
            .insert_document("doc-s", &new_doc("Security", None), "/tmp/s.pdf")
            .await
            .unwrap();
        let chunks = store
            .replace_chunks(&doc.id, &["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        store
            .upsert(&[record(&chunks[0].id, &doc.id, None, vec![1.0, 0.0])])
            .await
            .unwrap();

        assert!(store.delete_document(&doc.id).await.unwrap());
        assert!(store.chunks_for_document(&doc.id).await.unwrap().is_empty());
        assert_eq!(store.vector_count(), 0);
        assert!(!store.delete_document(&doc.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_replace_chunks_recreates() {
        let store = InMemoryStore::new();
        let doc = store
            .insert_document("doc-hr", &new_doc("HR", None), "/tmp/hr.pdf")
            .await
            .unwrap();
        let first = store
            .replace_chunks(&doc.id, &["one".to_string()])
            .await
            .unwrap();
        let second = store
            .replace_chunks(&doc.id, &["two".to_string(), "three".to_string()])
            .await
            .unwrap();
        let stored = store.chunks_for_document(&doc.id).await.unwrap();
        assert_eq!(stored, second);
        assert_ne!(first[0].id, second[0].id);
        assert_eq!(stored[1].chunk_index, 1);
    }

    #[tokio::test]
    async fn test_search_filters_and_orders() {
        let store = InMemoryStore::new();
        store
            .upsert(&[
                record("c1", "d1", Some("Sales"), vec![1.0, 0.0]),
                record("c2", "d1", Some("Sales"), vec![0.7, 0.7]),
                record("c3", "d2", Some("HR"), vec![1.0, 0.0]),
            ])
            .await
            .unwrap();

        let filter = RetrievalFilter {
            department: Some("Sales".to_string()),
            category: None,
        };
        let hits = store.search(&[1.0, 0.0], 5, &filter).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.metadata.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2"]);

        let hits = store
            .search(&[1.0, 0.0], 1, &RetrievalFilter::default())
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_log_filters_newest_first() {
        let store = InMemoryStore::new();
        for (dept, risk) in [
            ("HR", RiskLevel::High),
            ("Sales", RiskLevel::Low),
            ("HR", RiskLevel::Low),
        ] {
            store
                .append(&NewComplianceCheck {
                    input_text: format!("{} {}", dept, risk),
                    department: Some(dept.to_string()),
                    category: None,
                    verdict: Verdict {
                        overall_risk: risk,
                        issues: vec![],
                        suggested_text: None,
                    },
                })
                .await
                .unwrap();
        }

        let hr = store
            .list(&LogQuery {
                department: Some("HR".to_string()),
                risk: None,
                limit: 10,
            })
            .await
            .unwrap();
        assert_eq!(hr.len(), 2);
        assert_eq!(hr[0].input_text, "HR LOW");

        let high = store
            .list(&LogQuery {
                department: None,
                risk: Some(RiskLevel::High),
                limit: 10,
            })
            .await
            .unwrap();
        assert_eq!(high.len(), 1);
        assert_eq!(high[0].overall_risk, RiskLevel::High);

        let limited = store
            .list(&LogQuery {
                limit: 1,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
    }
}
