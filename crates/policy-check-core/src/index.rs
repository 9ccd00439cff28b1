//! Vector index gateway.
//!
//! Couples an [`Embedder`] with a [`VectorIndex`] backend. Indexing resolves
//! each chunk's owning document so the category and department can be
//! denormalized into the vector record; querying embeds the query text and
//! runs a filtered nearest-neighbour search.
//!
//! Vector upserts are not transactional with the relational store. A crash
//! after the chunks are committed but before [`VectorIndexGateway::upsert`]
//! finishes leaves those chunks unsearchable until the document is
//! re-ingested.

use std::collections::HashMap;
use std::sync::Arc;

use crate::embedding::{ensure_batch_shape, Embedder};
use crate::error::ComplianceError;
use crate::models::{ChunkMatch, ChunkMetadata, ChunkVectorRecord, PolicyChunk, PolicyDocument};
use crate::store::{PolicyStore, RetrievalFilter, VectorIndex};

pub struct VectorIndexGateway {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    documents: Arc<dyn PolicyStore>,
    min_score: Option<f32>,
}

impl VectorIndexGateway {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        documents: Arc<dyn PolicyStore>,
    ) -> Self {
        Self {
            embedder,
            index,
            documents,
            min_score: None,
        }
    }

    /// Drop matches scoring below `min_score`.
    pub fn with_min_score(mut self, min_score: Option<f32>) -> Self {
        self.min_score = min_score;
        self
    }

    /// Embed and index a batch of chunks, possibly from several documents.
    ///
    /// Returns the number of vector records written. Empty input is a no-op
    /// and makes no embedding call. Vectors whose length differs from
    /// [`Embedder::dims`] fail the call with
    /// [`ComplianceError::EmbeddingService`] before anything is written.
    pub async fn upsert(&self, chunks: &[PolicyChunk]) -> Result<usize, ComplianceError> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let mut owners: HashMap<&str, PolicyDocument> = HashMap::new();
        for chunk in chunks {
            if owners.contains_key(chunk.document_id.as_str()) {
                continue;
            }
            let doc = self
                .documents
                .get_document(&chunk.document_id)
                .await?
                .ok_or_else(|| {
                    ComplianceError::NotFound(format!("policy document {}", chunk.document_id))
                })?;
            owners.insert(chunk.document_id.as_str(), doc);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = ensure_batch_shape(
            texts.len(),
            self.embedder.dims(),
            self.embedder.embed(&texts).await?,
        )?;

        let records: Vec<ChunkVectorRecord> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, embedding)| {
                let doc = &owners[chunk.document_id.as_str()];
                ChunkVectorRecord {
                    chunk_id: chunk.id.clone(),
                    embedding,
                    metadata: ChunkMetadata {
                        document_id: doc.id.clone(),
                        chunk_id: chunk.id.clone(),
                        category: doc.category,
                        department: doc.department.clone(),
                        text: chunk.text.clone(),
                    },
                }
            })
            .collect();

        self.index.upsert(&records).await?;
        tracing::debug!(
            records = records.len(),
            documents = owners.len(),
            model = self.embedder.model_name(),
            "indexed policy chunks"
        );
        Ok(records.len())
    }

    /// Retrieve up to `top_k` chunks similar to `query`, restricted by
    /// `filter`, best match first.
    ///
    /// An empty result is `Ok`. Failing to embed the query or to reach the
    /// index is a [`ComplianceError::RetrievalService`].
    pub async fn query(
        &self,
        query: &str,
        top_k: usize,
        filter: &RetrievalFilter,
    ) -> Result<Vec<ChunkMatch>, ComplianceError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let vectors = self
            .embedder
            .embed(&[query.to_string()])
            .await
            .and_then(|v| ensure_batch_shape(1, self.embedder.dims(), v))
            .map_err(ComplianceError::into_retrieval)?;
        let query_vec = &vectors[0];

        let mut matches = self
            .index
            .search(query_vec, top_k, filter)
            .await
            .map_err(as_retrieval_error)?;

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        if let Some(min) = self.min_score {
            matches.retain(|m| m.score >= min);
        }
        matches.truncate(top_k);

        tracing::debug!(
            top_k,
            filters = ?filter.pairs(),
            hits = matches.len(),
            "vector query"
        );
        Ok(matches)
    }

    /// Remove every vector record belonging to a document.
    pub async fn remove_document(&self, document_id: &str) -> Result<(), ComplianceError> {
        self.index.delete_by_document(document_id).await
    }
}

fn as_retrieval_error(err: ComplianceError) -> ComplianceError {
    match err {
        ComplianceError::RetrievalService(_) => err,
        other => ComplianceError::RetrievalService(other.to_string()),
    }
}
