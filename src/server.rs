//! HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/health` | Database and vector index probe |
//! | `GET`    | `/policies` | List policy documents, newest first |
//! | `POST`   | `/policies/upload` | Store a base64-encoded file, then ingest it |
//! | `POST`   | `/policies/{id}/ingest` | Re-extract, re-chunk, and re-index a document |
//! | `DELETE` | `/policies/{id}` | Delete a document with its chunks and vectors |
//! | `POST`   | `/compliance/check` | Analyze text against the policies |
//! | `GET`    | `/compliance/logs` | List audit records (`department`, `risk`, `limit`) |
//! | `GET`    | `/compliance/logs/{id}` | One audit record |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "no_policy_corpus", "message": "no policy documents have been ingested" } }
//! ```
//!
//! | Code | Status |
//! |------|--------|
//! | `bad_request` | 400 |
//! | `not_found` | 404 |
//! | `no_policy_corpus` | 409 |
//! | `model_output_invalid`, `persistence_failed` | 500 |
//! | `generation_failed` | 502 |
//! | `service_unavailable` | 503 |
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use policy_check_core::analyzer::AnalysisRequest;
use policy_check_core::models::{
    ComplianceCheckRecord, Issue, LogQuery, NewPolicyDocument, PolicyCategory, PolicyDocument,
    RiskLevel,
};
use policy_check_core::store::{ComplianceLog, PolicyStore};
use policy_check_core::ComplianceError;

use crate::app::App;
use crate::config::Config;
use crate::ingest::IngestReport;

/// Build the configured services and serve on `[server].bind` until the
/// process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let app = App::from_config(config).await?;
    let listener = TcpListener::bind(&config.server.bind).await?;
    tracing::info!(addr = %listener.local_addr()?, "policy check API listening");
    serve(app, listener).await
}

/// Serve on an already-bound listener.
pub async fn serve(app: App, listener: TcpListener) -> anyhow::Result<()> {
    axum::serve(listener, router(app)).await?;
    Ok(())
}

pub fn router(app: App) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/policies", get(handle_list_policies))
        .route("/policies/upload", post(handle_upload))
        .route("/policies/{id}/ingest", post(handle_ingest))
        .route("/policies/{id}", delete(handle_delete))
        .route("/compliance/check", post(handle_check))
        .route("/compliance/logs", get(handle_list_logs))
        .route("/compliance/logs/{id}", get(handle_get_log))
        .layer(cors)
        .with_state(app)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

impl From<ComplianceError> for AppError {
    fn from(err: ComplianceError) -> Self {
        let status = match &err {
            ComplianceError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ComplianceError::NotFound(_) => StatusCode::NOT_FOUND,
            ComplianceError::NoPolicyCorpus => StatusCode::CONFLICT,
            ComplianceError::EmbeddingService(_) | ComplianceError::RetrievalService(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ComplianceError::GenerationService(_) => StatusCode::BAD_GATEWAY,
            ComplianceError::ModelOutputContract(_) | ComplianceError::Persistence(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    db_ok: bool,
    index_ok: bool,
}

async fn handle_health(State(app): State<App>) -> (StatusCode, Json<HealthResponse>) {
    let db_ok = app.store.probe_db().await;
    let index_ok = app.store.probe_index().await;
    let healthy = db_ok && index_ok;
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(HealthResponse {
            status: if healthy { "ok" } else { "degraded" },
            version: env!("CARGO_PKG_VERSION"),
            db_ok,
            index_ok,
        }),
    )
}

// ============ Policies ============

async fn handle_list_policies(
    State(app): State<App>,
) -> Result<Json<Vec<PolicyDocument>>, AppError> {
    Ok(Json(app.store.list_documents().await?))
}

#[derive(Debug, Deserialize)]
struct UploadRequest {
    title: String,
    policy_type: String,
    #[serde(default)]
    department: Option<String>,
    #[serde(default)]
    version: Option<String>,
    filename: String,
    content_base64: String,
}

#[derive(Serialize)]
struct UploadResponse {
    document: PolicyDocument,
    ingest: IngestReport,
}

/// Registers then ingests. If ingestion fails the document stays registered
/// and can be retried with `POST /policies/{id}/ingest`.
async fn handle_upload(
    State(app): State<App>,
    body: Result<Json<UploadRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    let Json(req) = body?;
    let category: PolicyCategory = req.policy_type.parse()?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(req.content_base64.as_bytes())
        .map_err(|e| bad_request(format!("content_base64 is not valid base64: {}", e)))?;

    let new_doc = NewPolicyDocument {
        title: req.title,
        category,
        department: non_blank(req.department),
        version: non_blank(req.version),
    };
    let document = app
        .ingestor
        .register_document(&new_doc, &req.filename, &bytes)
        .await?;
    let ingest = app.ingestor.ingest(&document.id).await?;

    Ok((StatusCode::CREATED, Json(UploadResponse { document, ingest })))
}

async fn handle_ingest(
    State(app): State<App>,
    Path(id): Path<String>,
) -> Result<Json<IngestReport>, AppError> {
    Ok(Json(app.ingestor.ingest(&id).await?))
}

async fn handle_delete(
    State(app): State<App>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    app.ingestor.delete_document(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============ POST /compliance/check ============

#[derive(Debug, Deserialize)]
struct CheckRequest {
    text: String,
    #[serde(default)]
    department: Option<String>,
    #[serde(default)]
    policy_type: Option<String>,
    #[serde(default)]
    top_k: Option<usize>,
}

#[derive(Serialize)]
struct CheckResponse {
    id: String,
    overall_risk: RiskLevel,
    issues: Vec<Issue>,
    suggested_text: Option<String>,
    department: Option<String>,
    policy_type: Option<PolicyCategory>,
    matched_chunks: usize,
}

async fn handle_check(
    State(app): State<App>,
    body: Result<Json<CheckRequest>, JsonRejection>,
) -> Result<Json<CheckResponse>, AppError> {
    let Json(req) = body?;

    let mut request = AnalysisRequest::new(req.text)
        .top_k(req.top_k.unwrap_or(app.config.retrieval.default_top_k));
    if let Some(department) = non_blank(req.department) {
        request = request.department(department);
    }
    if let Some(policy_type) = non_blank(req.policy_type) {
        request = request.category(policy_type.parse()?);
    }

    let outcome = app.analyzer.analyze(request).await?;
    Ok(Json(CheckResponse {
        id: outcome.record_id,
        overall_risk: outcome.verdict.overall_risk,
        issues: outcome.verdict.issues,
        suggested_text: outcome.verdict.suggested_text,
        department: outcome.filter.department,
        policy_type: outcome.filter.category,
        matched_chunks: outcome.matched_chunks,
    }))
}

// ============ Compliance logs ============

#[derive(Debug, Deserialize)]
struct LogsParams {
    department: Option<String>,
    risk: Option<String>,
    limit: Option<usize>,
}

async fn handle_list_logs(
    State(app): State<App>,
    params: Result<Query<LogsParams>, QueryRejection>,
) -> Result<Json<Vec<ComplianceCheckRecord>>, AppError> {
    let Query(params) = params?;
    let risk = non_blank(params.risk)
        .map(|r| r.parse::<RiskLevel>())
        .transpose()?;
    let max = app.config.logs.max_limit;
    let limit = params.limit.unwrap_or(max);
    if limit == 0 {
        return Err(bad_request("limit must be >= 1"));
    }

    let query = LogQuery {
        department: non_blank(params.department),
        risk,
        limit: limit.min(max),
    };
    Ok(Json(app.store.list(&query).await?))
}

async fn handle_get_log(
    State(app): State<App>,
    Path(id): Path<String>,
) -> Result<Json<ComplianceCheckRecord>, AppError> {
    app.store
        .get(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ComplianceError::NotFound(format!("compliance check {}", id)).into())
}

/// Treat empty or whitespace-only strings as absent.
fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (ComplianceError::InvalidInput("x".into()), 400, "bad_request"),
            (ComplianceError::NotFound("x".into()), 404, "not_found"),
            (ComplianceError::NoPolicyCorpus, 409, "no_policy_corpus"),
            (ComplianceError::RetrievalService("x".into()), 503, "service_unavailable"),
            (ComplianceError::EmbeddingService("x".into()), 503, "service_unavailable"),
            (ComplianceError::GenerationService("x".into()), 502, "generation_failed"),
            (ComplianceError::ModelOutputContract("x".into()), 500, "model_output_invalid"),
            (ComplianceError::Persistence("x".into()), 500, "persistence_failed"),
        ];
        for (err, status, code) in cases {
            let app_err = AppError::from(err);
            assert_eq!(app_err.status.as_u16(), status);
            assert_eq!(app_err.code, code);
        }
    }

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank(Some("  ".into())), None);
        assert_eq!(non_blank(Some("HR".into())), Some("HR".to_string()));
        assert_eq!(non_blank(None), None);
    }
}
