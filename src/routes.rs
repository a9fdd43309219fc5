//! REST endpoints: health, JSON classification and form/upload processing.

use std::sync::Arc;

use axum::{
    Form, Json, Router,
    extract::{DefaultBodyLimit, FromRequest, Multipart, Path, Request, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use crate::error::ExtractionError;
use crate::extract::{DocumentExtractor, secure_filename};
use crate::pipeline::{Analysis, MessageProcessor};

/// Characters of content returned by a preview.
pub const PREVIEW_CHARS: usize = 500;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<MessageProcessor>,
    pub extractor: Arc<dyn DocumentExtractor>,
}

/// Build the Axum router. `max_upload_bytes` caps every request body.
pub fn api_routes(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/classify", post(classify))
        .route("/processar", post(process_default))
        .route("/processar/{preview}", post(process_with_preview))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Errors ──────────────────────────────────────────────────────────────

/// Request-level failures, rendered as `{"status":"error","message":...}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Por favor, insira um texto ou envie um arquivo.")]
    EmptyInput,

    #[error("Nenhum arquivo selecionado")]
    NoFileSelected,

    #[error("Formato de arquivo não suportado: {0}")]
    UnsupportedFormat(String),

    #[error("Não foi possível ler o arquivo: {0}")]
    Extraction(String),

    #[error("{message}")]
    BadRequest { status: StatusCode, message: String },
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::EmptyInput | Self::NoFileSelected => StatusCode::BAD_REQUEST,
            Self::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::Extraction(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::BadRequest { status, .. } => *status,
        }
    }
}

impl From<ExtractionError> for ApiError {
    fn from(e: ExtractionError) -> Self {
        match e {
            ExtractionError::UnsupportedFormat(name) => Self::UnsupportedFormat(name),
            other => Self::Extraction(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(status = %status, error = %self, "Request failed");
        } else {
            debug!(status = %status, error = %self, "Request rejected");
        }
        (
            status,
            Json(json!({"status": "error", "message": self.to_string()})),
        )
            .into_response()
    }
}

// ── Response bodies ─────────────────────────────────────────────────────

/// Result of a full analysis, as consumed by the web front-end.
#[derive(Debug, Serialize)]
struct AnalysisResponse {
    status: &'static str,
    id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    classification: String,
    /// Probability in `[0, 1]`.
    confidence: f64,
    /// Percentage in `[0, 100]`, two decimals.
    confidence_percent: f64,
    normalized_text: String,
    suggested_response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl AnalysisResponse {
    fn new(analysis: Analysis, include_content: bool) -> Self {
        let confidence = analysis.probability();
        let Analysis {
            id,
            original,
            normalized,
            classification,
            suggested_response,
            ..
        } = analysis;
        Self {
            status: if classification.is_error() { "error" } else { "success" },
            id: id.to_string(),
            content: include_content.then_some(original),
            classification: classification.category().to_string(),
            confidence,
            confidence_percent: classification.confidence(),
            normalized_text: normalized,
            suggested_response,
            message: classification.error().map(str::to_string),
        }
    }

    /// Failed classifications are reported as 503 with the same body shape.
    fn into_status_response(self) -> Response {
        let status = if self.message.is_some() {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::OK
        };
        (status, Json(self)).into_response()
    }
}

/// Truncate `text` to `PREVIEW_CHARS` characters, marking the cut with `...`.
pub fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let classifier = state.processor.classifier();
    Json(json!({
        "status": "ok",
        "model": classifier.model_name(),
        "model_ready": classifier.is_ready(),
    }))
}

// ── /classify ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ClassifyRequest {
    #[serde(default)]
    email_text: String,
}

async fn classify(
    State(state): State<AppState>,
    Json(body): Json<ClassifyRequest>,
) -> Result<Response, ApiError> {
    let text = body.email_text.trim();
    if text.is_empty() {
        return Err(ApiError::EmptyInput);
    }
    info!(chars = text.chars().count(), "Classify request");
    let analysis = state.processor.process(text.to_string()).await;
    Ok(AnalysisResponse::new(analysis, false).into_status_response())
}

// ── /processar ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ProcessForm {
    #[serde(default)]
    texto_email: String,
}

async fn process_default(State(state): State<AppState>, req: Request) -> Result<Response, ApiError> {
    process(state, 0, req).await
}

async fn process_with_preview(
    State(state): State<AppState>,
    Path(preview): Path<i64>,
    req: Request,
) -> Result<Response, ApiError> {
    process(state, preview, req).await
}

async fn process(state: AppState, preview_flag: i64, req: Request) -> Result<Response, ApiError> {
    let content = read_submission(&state, req).await?;
    let content = content.trim();
    if content.is_empty() {
        return Err(ApiError::EmptyInput);
    }

    if preview_flag != 0 {
        debug!(chars = content.chars().count(), "Preview request");
        let normalized = state.processor.normalize(content).await;
        return Ok(Json(json!({
            "status": "success",
            "content": preview(content),
            "normalized_text": preview(&normalized),
        }))
        .into_response());
    }

    info!(chars = content.chars().count(), "Process request");
    let analysis = state.processor.process(content.to_string()).await;
    Ok(AnalysisResponse::new(analysis, true).into_status_response())
}

/// Pull the submitted text out of a multipart, urlencoded or JSON body.
async fn read_submission(state: &AppState, req: Request) -> Result<String, ApiError> {
    let content_type = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if content_type.starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(req, state)
            .await
            .map_err(|e| bad_request(e.status(), e.body_text()))?;
        read_multipart(state, multipart).await
    } else if content_type.starts_with("application/x-www-form-urlencoded") {
        let Form(form) = Form::<ProcessForm>::from_request(req, state)
            .await
            .map_err(|e| bad_request(e.status(), e.body_text()))?;
        Ok(form.texto_email)
    } else {
        let Json(form) = Json::<ProcessForm>::from_request(req, state)
            .await
            .map_err(|e| bad_request(e.status(), e.body_text()))?;
        Ok(form.texto_email)
    }
}

/// A file part named `arquivo` wins over a text part named `texto_email`.
async fn read_multipart(state: &AppState, mut multipart: Multipart) -> Result<String, ApiError> {
    let mut text = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(e.status(), e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "arquivo" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                if filename.is_empty() {
                    return Err(ApiError::NoFileSelected);
                }
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(e.status(), e.body_text()))?;
                info!(
                    filename = %secure_filename(&filename),
                    size = bytes.len(),
                    "File uploaded"
                );
                return Ok(state.extractor.extract_bytes(&filename, bytes.to_vec()).await?);
            }
            "texto_email" => {
                text = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| bad_request(e.status(), e.body_text()))?,
                );
            }
            _ => {}
        }
    }
    Ok(text.unwrap_or_default())
}

fn bad_request(status: StatusCode, message: String) -> ApiError {
    ApiError::BadRequest { status, message }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_keeps_short_text() {
        assert_eq!(preview("Bom dia"), "Bom dia");
        let exact = "a".repeat(PREVIEW_CHARS);
        assert_eq!(preview(&exact), exact);
    }

    #[test]
    fn preview_truncates_on_char_boundary() {
        let long = "ç".repeat(PREVIEW_CHARS + 10);
        let out = preview(&long);
        assert!(out.ends_with("..."));
        assert_eq!(out.chars().count(), PREVIEW_CHARS + 3);
        assert!(out.starts_with("çç"));
    }

    #[test]
    fn extraction_errors_map_to_statuses() {
        let unsupported: ApiError = ExtractionError::UnsupportedFormat("a.docx".into()).into();
        assert_eq!(unsupported.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        let pdf: ApiError = ExtractionError::Pdf("broken xref".into()).into();
        assert_eq!(pdf.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(ApiError::EmptyInput.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::NoFileSelected.status(), StatusCode::BAD_REQUEST);
    }
}
