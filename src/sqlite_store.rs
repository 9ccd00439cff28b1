//! SQLite backend for the policy store, the vector index, and the
//! compliance log.
//!
//! One [`SqliteStore`] over a shared pool implements all three core traits.
//! Vectors are little-endian `f32` BLOBs; similarity search loads the rows
//! that pass the metadata filter and ranks them by cosine similarity in Rust.
//!
//! Relational failures surface as [`ComplianceError::Persistence`], vector
//! failures as [`ComplianceError::RetrievalService`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use policy_check_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use policy_check_core::models::{
    ChunkMatch, ChunkMetadata, ChunkVectorRecord, ComplianceCheckRecord, Issue, LogQuery,
    NewComplianceCheck, NewPolicyDocument, PolicyCategory, PolicyChunk, PolicyDocument, RiskLevel,
};
use policy_check_core::store::{ComplianceLog, PolicyStore, RetrievalFilter, VectorIndex};
use policy_check_core::ComplianceError;

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    max_log_limit: usize,
}

impl SqliteStore {
    /// `max_log_limit` caps [`ComplianceLog::list`] regardless of the
    /// requested limit.
    pub fn new(pool: SqlitePool, max_log_limit: usize) -> Self {
        Self {
            pool,
            max_log_limit: max_log_limit.max(1),
        }
    }

    /// Whether the relational tables answer a trivial query.
    pub async fn probe_db(&self) -> bool {
        sqlx::query("SELECT COUNT(*) FROM policy_documents")
            .fetch_one(&self.pool)
            .await
            .is_ok()
    }

    /// Whether the vector table answers a trivial query.
    pub async fn probe_index(&self) -> bool {
        sqlx::query("SELECT COUNT(*) FROM chunk_vectors")
            .fetch_one(&self.pool)
            .await
            .is_ok()
    }

    pub async fn vector_count(&self) -> Result<i64, ComplianceError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM chunk_vectors")
            .fetch_one(&self.pool)
            .await
            .map_err(index_err)
    }
}

fn db_err(e: sqlx::Error) -> ComplianceError {
    ComplianceError::Persistence(e.to_string())
}

fn index_err(e: sqlx::Error) -> ComplianceError {
    ComplianceError::RetrievalService(e.to_string())
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn parse_category(raw: &str) -> Result<PolicyCategory, ComplianceError> {
    raw.parse()
        .map_err(|_| ComplianceError::Persistence(format!("stored policy_type '{}' is invalid", raw)))
}

fn document_from_row(row: &SqliteRow) -> Result<PolicyDocument, ComplianceError> {
    let policy_type: String = row.get("policy_type");
    Ok(PolicyDocument {
        id: row.get("id"),
        title: row.get("title"),
        file_path: row.get("file_path"),
        category: parse_category(&policy_type)?,
        department: row.get("department"),
        version: row.get("version"),
        created_at: from_millis(row.get("created_at")),
    })
}

fn chunk_from_row(row: &SqliteRow) -> PolicyChunk {
    PolicyChunk {
        id: row.get("id"),
        document_id: row.get("document_id"),
        chunk_index: row.get("chunk_index"),
        text: row.get("text"),
        section_title: row.get("section_title"),
        created_at: from_millis(row.get("created_at")),
    }
}

fn check_from_row(row: &SqliteRow) -> Result<ComplianceCheckRecord, ComplianceError> {
    let risk: String = row.get("overall_risk");
    let overall_risk: RiskLevel = risk
        .parse()
        .map_err(|_| ComplianceError::Persistence(format!("stored risk '{}' is invalid", risk)))?;
    let category = row
        .get::<Option<String>, _>("policy_type")
        .map(|c| parse_category(&c))
        .transpose()?;
    let issues_json: String = row.get("issues_json");
    let issues: Vec<Issue> = serde_json::from_str(&issues_json)
        .map_err(|e| ComplianceError::Persistence(format!("stored issues are invalid: {}", e)))?;

    Ok(ComplianceCheckRecord {
        id: row.get("id"),
        input_text: row.get("input_text"),
        department: row.get("department"),
        category,
        overall_risk,
        issues,
        suggested_text: row.get("suggested_text"),
        created_at: from_millis(row.get("created_at")),
    })
}

#[async_trait]
impl PolicyStore for SqliteStore {
    async fn insert_document(
        &self,
        id: &str,
        doc: &NewPolicyDocument,
        file_path: &str,
    ) -> Result<PolicyDocument, ComplianceError> {
        let now = now_millis();

        sqlx::query(
            r#"
            INSERT INTO policy_documents (id, title, file_path, policy_type, department, version, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(&doc.title)
        .bind(file_path)
        .bind(doc.category.as_str())
        .bind(&doc.department)
        .bind(&doc.version)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(PolicyDocument {
            id: id.to_string(),
            title: doc.title.clone(),
            file_path: file_path.to_string(),
            category: doc.category,
            department: doc.department.clone(),
            version: doc.version.clone(),
            created_at: from_millis(now),
        })
    }

    async fn get_document(&self, id: &str) -> Result<Option<PolicyDocument>, ComplianceError> {
        let row = sqlx::query("SELECT * FROM policy_documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(document_from_row).transpose()
    }

    async fn list_documents(&self) -> Result<Vec<PolicyDocument>, ComplianceError> {
        let rows = sqlx::query("SELECT * FROM policy_documents ORDER BY created_at DESC, rowid DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(document_from_row).collect()
    }

    async fn delete_document(&self, id: &str) -> Result<bool, ComplianceError> {
        let result = sqlx::query("DELETE FROM policy_documents WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_documents(&self) -> Result<u64, ComplianceError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM policy_documents")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(count as u64)
    }

    async fn replace_chunks(
        &self,
        document_id: &str,
        texts: &[String],
    ) -> Result<Vec<PolicyChunk>, ComplianceError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let exists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM policy_documents WHERE id = ?")
            .bind(document_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(db_err)?;
        if exists == 0 {
            return Err(ComplianceError::NotFound(format!(
                "policy document {}",
                document_id
            )));
        }

        sqlx::query("DELETE FROM policy_chunks WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        let now = now_millis();
        let mut created = Vec::with_capacity(texts.len());
        for (i, text) in texts.iter().enumerate() {
            let chunk = PolicyChunk {
                id: Uuid::new_v4().to_string(),
                document_id: document_id.to_string(),
                chunk_index: i as i64,
                text: text.clone(),
                section_title: None,
                created_at: from_millis(now),
            };
            sqlx::query(
                r#"
                INSERT INTO policy_chunks (id, document_id, chunk_index, text, section_title, created_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.text)
            .bind(&chunk.section_title)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
            created.push(chunk);
        }

        tx.commit().await.map_err(db_err)?;
        Ok(created)
    }

    async fn chunks_for_document(
        &self,
        document_id: &str,
    ) -> Result<Vec<PolicyChunk>, ComplianceError> {
        let rows = sqlx::query(
            "SELECT * FROM policy_chunks WHERE document_id = ? ORDER BY chunk_index ASC",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.iter().map(chunk_from_row).collect())
    }
}

#[async_trait]
impl VectorIndex for SqliteStore {
    async fn upsert(&self, records: &[ChunkVectorRecord]) -> Result<(), ComplianceError> {
        let mut tx = self.pool.begin().await.map_err(index_err)?;
        for record in records {
            sqlx::query(
                r#"
                INSERT INTO chunk_vectors (chunk_id, document_id, policy_type, department, text, dims, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(chunk_id) DO UPDATE SET
                    document_id = excluded.document_id,
                    policy_type = excluded.policy_type,
                    department = excluded.department,
                    text = excluded.text,
                    dims = excluded.dims,
                    embedding = excluded.embedding
                "#,
            )
            .bind(&record.chunk_id)
            .bind(&record.metadata.document_id)
            .bind(record.metadata.category.as_str())
            .bind(&record.metadata.department)
            .bind(&record.metadata.text)
            .bind(record.embedding.len() as i64)
            .bind(vec_to_blob(&record.embedding))
            .execute(&mut *tx)
            .await
            .map_err(index_err)?;
        }
        tx.commit().await.map_err(index_err)
    }

    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &RetrievalFilter,
    ) -> Result<Vec<ChunkMatch>, ComplianceError> {
        let department = filter.department.as_deref();
        let category = filter.category.map(|c| c.as_str());

        // Fetch filtered vectors and compute cosine similarity in Rust
        let rows = sqlx::query(
            r#"
            SELECT chunk_id, document_id, policy_type, department, text, embedding
            FROM chunk_vectors
            WHERE (? IS NULL OR department = ?)
              AND (? IS NULL OR policy_type = ?)
            "#,
        )
        .bind(department)
        .bind(department)
        .bind(category)
        .bind(category)
        .fetch_all(&self.pool)
        .await
        .map_err(index_err)?;

        let mut matches = Vec::with_capacity(rows.len());
        for row in &rows {
            let blob: Vec<u8> = row.get("embedding");
            let policy_type: String = row.get("policy_type");
            matches.push(ChunkMatch {
                score: cosine_similarity(vector, &blob_to_vec(&blob)),
                metadata: ChunkMetadata {
                    document_id: row.get("document_id"),
                    chunk_id: row.get("chunk_id"),
                    category: parse_category(&policy_type)
                        .map_err(|e| ComplianceError::RetrievalService(e.to_string()))?,
                    department: row.get("department"),
                    text: row.get("text"),
                },
            });
        }

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn delete_by_document(&self, document_id: &str) -> Result<(), ComplianceError> {
        sqlx::query("DELETE FROM chunk_vectors WHERE document_id = ?")
            .bind(document_id)
            .execute(&self.pool)
            .await
            .map_err(index_err)?;
        Ok(())
    }
}

#[async_trait]
impl ComplianceLog for SqliteStore {
    async fn append(&self, check: &NewComplianceCheck) -> Result<String, ComplianceError> {
        let id = Uuid::new_v4().to_string();
        let issues_json = serde_json::to_string(&check.verdict.issues)
            .map_err(|e| ComplianceError::Persistence(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO compliance_checks
                (id, input_text, department, policy_type, overall_risk, issues_json, suggested_text, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&check.input_text)
        .bind(&check.department)
        .bind(check.category.map(|c| c.as_str()))
        .bind(check.verdict.overall_risk.as_str())
        .bind(issues_json)
        .bind(&check.verdict.suggested_text)
        .bind(now_millis())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(id)
    }

    async fn list(&self, query: &LogQuery) -> Result<Vec<ComplianceCheckRecord>, ComplianceError> {
        let limit = query.limit.clamp(1, self.max_log_limit) as i64;
        let department = query.department.as_deref();
        let risk = query.risk.map(|r| r.as_str());

        let rows = sqlx::query(
            r#"
            SELECT * FROM compliance_checks
            WHERE (? IS NULL OR department = ?)
              AND (? IS NULL OR overall_risk = ?)
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(department)
        .bind(department)
        .bind(risk)
        .bind(risk)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(check_from_row).collect()
    }

    async fn get(&self, id: &str) -> Result<Option<ComplianceCheckRecord>, ComplianceError> {
        let row = sqlx::query("SELECT * FROM compliance_checks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(check_from_row).transpose()
    }
}
