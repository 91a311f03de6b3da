use crate::error::AnalyzeError;
use crate::flag::EvidenceFlag;
use crate::pipeline::{normalize_url, Analyzer, Assessment};
use crate::scoring::RiskLabel;
use crate::upload::Upload;
use axum::extract::multipart::MultipartError;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;

#[derive(Clone)]
pub struct AppState {
    pub analyzer: Arc<Analyzer>,
}

pub fn app(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/upload", post(upload))
        .route("/check-url", post(check_url))
        .route("/analyze-email", post(analyze_email))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub enum ApiError {
    Analyze(AnalyzeError),
    Rejected(StatusCode, String),
}

impl From<AnalyzeError> for ApiError {
    fn from(err: AnalyzeError) -> Self {
        Self::Analyze(err)
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        Self::Rejected(err.status(), err.body_text())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Analyze(AnalyzeError::InvalidInput(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Analyze(err) if err.is_client_error() => {
                (StatusCode::BAD_REQUEST, err.to_string())
            }
            ApiError::Analyze(err) => {
                log::warn!("Assessment failed: {err}");
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
            ApiError::Rejected(status, message) => (status, message),
        };

        let body = serde_json::json!({ "error": message });
        (status, Json(body)).into_response()
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Accepts the field named `file`, or failing that the first field that
/// carries a file name.
async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Assessment>, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        let is_file = field.name() == Some("file") || field.file_name().is_some();
        if !is_file {
            continue;
        }

        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await?;

        log::debug!(
            "Received upload {:?} ({} bytes, declared {:?})",
            file_name,
            data.len(),
            content_type
        );

        let upload = Upload::from_bytes(file_name.as_deref(), content_type.as_deref(), &data)?;
        let assessment = state.analyzer.analyze_upload(&upload).await?;
        return Ok(Json(assessment));
    }

    Err(AnalyzeError::MissingArtifact.into())
}

#[derive(Debug, Deserialize)]
pub struct CheckUrlRequest {
    pub url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UrlResponse {
    pub url: String,
    pub flags: Vec<EvidenceFlag>,
    pub score: u32,
    pub label: RiskLabel,
    pub hint_en: &'static str,
    pub hint_hi: &'static str,
}

async fn check_url(
    State(state): State<AppState>,
    payload: Result<Json<CheckUrlRequest>, JsonRejection>,
) -> Result<Json<UrlResponse>, ApiError> {
    let Json(request) = payload?;
    let input = request
        .url
        .ok_or_else(|| AnalyzeError::InvalidInput("missing field 'url'".to_string()))?;
    let url = normalize_url(&input)?;

    let assessment = state.analyzer.analyze_url(&url).await;
    Ok(Json(UrlResponse {
        url: url.to_string(),
        flags: assessment.flags,
        score: assessment.score,
        label: assessment.label,
        hint_en: assessment.hint_en,
        hint_hi: assessment.hint_hi,
    }))
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeEmailRequest {
    pub raw: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EmailResponse {
    pub score: u32,
    pub label: RiskLabel,
    pub flags: Vec<EvidenceFlag>,
    pub hint_en: &'static str,
    pub hint_hi: &'static str,
}

async fn analyze_email(
    State(state): State<AppState>,
    payload: Result<Json<AnalyzeEmailRequest>, JsonRejection>,
) -> Result<Json<EmailResponse>, ApiError> {
    let Json(request) = payload?;
    let raw = request
        .raw
        .ok_or_else(|| AnalyzeError::InvalidInput("missing field 'raw'".to_string()))?;

    let assessment = state.analyzer.analyze_email(&raw).await;
    Ok(Json(EmailResponse {
        score: assessment.score,
        label: assessment.label,
        flags: assessment.flags,
        hint_en: assessment.hint_en,
        hint_hi: assessment.hint_hi,
    }))
}
