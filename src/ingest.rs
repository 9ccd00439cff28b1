//! Policy document lifecycle: upload, (re-)ingestion, and deletion.
//!
//! Ingestion reads the stored file, extracts its text, splits it into
//! overlapping character windows, replaces the document's chunks, and
//! indexes the new chunks.
//!
//! The chunk rows and the vector records are written in two steps. If the
//! process dies between them the document has chunks but no vectors; running
//! `pchk ingest <id>` again repairs it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use policy_check_core::chunk;
use policy_check_core::index::VectorIndexGateway;
use policy_check_core::models::{NewPolicyDocument, PolicyDocument};
use policy_check_core::store::PolicyStore;
use policy_check_core::ComplianceError;

use crate::extract::{content_type_for_path, extract_text};

/// Summary of one ingestion run.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub document_id: String,
    pub chunks: usize,
    pub vectors: usize,
}

pub struct Ingestor {
    store: Arc<dyn PolicyStore>,
    index: Arc<VectorIndexGateway>,
    storage_dir: PathBuf,
    chunk_size: usize,
    overlap: usize,
}

impl Ingestor {
    pub fn new(
        store: Arc<dyn PolicyStore>,
        index: Arc<VectorIndexGateway>,
        storage_dir: PathBuf,
        chunk_size: usize,
        overlap: usize,
    ) -> Self {
        Self {
            store,
            index,
            storage_dir,
            chunk_size,
            overlap,
        }
    }

    /// Save an uploaded file under the storage directory and record it.
    ///
    /// The document id is chosen first so the stored file name
    /// (`<title>_<policy_type>_<id><ext>`) is unique per document.
    pub async fn register_document(
        &self,
        doc: &NewPolicyDocument,
        filename: &str,
        bytes: &[u8],
    ) -> Result<PolicyDocument, ComplianceError> {
        if doc.title.trim().is_empty() {
            return Err(ComplianceError::InvalidInput(
                "title must not be empty".to_string(),
            ));
        }
        if filename.trim().is_empty() {
            return Err(ComplianceError::InvalidInput(
                "filename must not be empty".to_string(),
            ));
        }
        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        let id = Uuid::new_v4().to_string();
        let dest = self
            .storage_dir
            .join(stored_file_name(&doc.title, doc.category.as_str(), &id, &ext));
        if content_type_for_path(&dest).is_none() {
            return Err(ComplianceError::InvalidInput(format!(
                "unsupported file type '{}'; expected .pdf, .docx, .txt, or .md",
                filename
            )));
        }

        tokio::fs::create_dir_all(&self.storage_dir)
            .await
            .map_err(|e| io_err(&self.storage_dir, e))?;
        tokio::fs::write(&dest, bytes)
            .await
            .map_err(|e| io_err(&dest, e))?;

        let stored = self
            .store
            .insert_document(&id, doc, &dest.to_string_lossy())
            .await;
        let stored = match stored {
            Ok(stored) => stored,
            Err(e) => {
                let _ = tokio::fs::remove_file(&dest).await;
                return Err(e);
            }
        };
        tracing::info!(
            document_id = %stored.id,
            title = %stored.title,
            policy_type = %stored.category,
            bytes = bytes.len(),
            "registered policy document"
        );
        Ok(stored)
    }

    /// Extract, chunk, and index a registered document, replacing any
    /// previous chunks and vectors.
    pub async fn ingest(&self, document_id: &str) -> Result<IngestReport, ComplianceError> {
        let doc = self
            .store
            .get_document(document_id)
            .await?
            .ok_or_else(|| ComplianceError::NotFound(format!("policy document {}", document_id)))?;

        let path = PathBuf::from(&doc.file_path);
        let content_type = content_type_for_path(&path).ok_or_else(|| {
            ComplianceError::InvalidInput(format!("unsupported file type: {}", doc.file_path))
        })?;
        let bytes = tokio::fs::read(&path).await.map_err(|e| io_err(&path, e))?;

        let text = tokio::task::spawn_blocking(move || extract_text(&bytes, content_type))
            .await
            .map_err(|e| ComplianceError::Persistence(format!("extraction task failed: {}", e)))?
            .map_err(|e| ComplianceError::InvalidInput(e.to_string()))?;

        let pieces = chunk::split(&text, self.chunk_size, self.overlap);
        if pieces.is_empty() {
            return Err(ComplianceError::InvalidInput(format!(
                "no extractable text in {}",
                doc.file_path
            )));
        }

        self.index.remove_document(&doc.id).await?;
        let chunks = self.store.replace_chunks(&doc.id, &pieces).await?;
        let vectors = self.index.upsert(&chunks).await?;

        tracing::info!(
            document_id = %doc.id,
            chunks = chunks.len(),
            vectors,
            "ingested policy document"
        );
        Ok(IngestReport {
            document_id: doc.id,
            chunks: chunks.len(),
            vectors,
        })
    }

    /// Delete a document with its chunks, vectors, and stored file.
    ///
    /// The file is removed last and on a best-effort basis.
    pub async fn delete_document(&self, document_id: &str) -> Result<(), ComplianceError> {
        let doc = self
            .store
            .get_document(document_id)
            .await?
            .ok_or_else(|| ComplianceError::NotFound(format!("policy document {}", document_id)))?;

        self.index.remove_document(&doc.id).await?;
        self.store.delete_document(&doc.id).await?;

        if let Err(e) = tokio::fs::remove_file(&doc.file_path).await {
            tracing::warn!(path = %doc.file_path, error = %e, "could not remove stored policy file");
        }
        tracing::info!(document_id = %doc.id, "deleted policy document");
        Ok(())
    }
}

/// `<title>_<policy_type>_<id><.ext>`, safe to use as a single path component.
pub fn stored_file_name(title: &str, policy_type: &str, id: &str, ext: &str) -> String {
    let stem: String = title
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    if ext.is_empty() {
        format!("{}_{}_{}", stem, policy_type, id)
    } else {
        format!("{}_{}_{}.{}", stem, policy_type, id, ext)
    }
}

fn io_err(path: &Path, e: std::io::Error) -> ComplianceError {
    ComplianceError::Persistence(format!("{}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stored_file_name() {
        assert_eq!(
            stored_file_name("Security Policy", "security", "d1", "pdf"),
            "security_policy_security_d1.pdf"
        );
        assert_eq!(
            stored_file_name("../etc/passwd", "hr", "d2", "txt"),
            "___etc_passwd_hr_d2.txt"
        );
        assert_eq!(stored_file_name("Notes", "hr", "d3", ""), "notes_hr_d3");
    }
}
