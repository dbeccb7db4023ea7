use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::response::{ApiError, AppJson, JSend};
use crate::share::ExportLinks;
use crate::storage::models::{AccessEvent, SubjectType};
use crate::tokens::IssueError;
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CreateLinkRequest {
    #[serde(default)]
    pub issued_by: Option<String>,
    /// Render a QR image of this size alongside the link
    #[serde(default)]
    pub qr_size_px: Option<i64>,
    pub subject_id: u64,
    pub subject_type: String,
    #[serde(default)]
    pub ttl_days: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateLinkResponse {
    pub expires_at: String,
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_svg: Option<String>,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct RevokeLinkResponse {
    pub id: u64,
    pub revoked: bool,
}

#[derive(Debug, Serialize)]
pub struct AccessEventResponse {
    pub created_at: String,
    pub device_kind: String,
    pub id: u64,
    pub ip: Option<String>,
    pub subject_id: u64,
    pub subject_type: String,
    pub token_id: u64,
    pub user_agent: Option<String>,
}

impl From<AccessEvent> for AccessEventResponse {
    fn from(event: AccessEvent) -> Self {
        Self {
            created_at: event.created_at.to_rfc3339(),
            device_kind: format!("{:?}", event.device_kind),
            id: event.id,
            ip: event.ip.map(|ip| ip.to_string()),
            subject_id: event.subject_id,
            subject_type: event.subject_type.to_string(),
            token_id: event.token_id,
            user_agent: event.user_agent,
        }
    }
}

fn parse_subject_type(raw: &str) -> Result<SubjectType, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::bad_request("subject_type must be 'task' or 'room'"))
}

fn issue_error(e: IssueError) -> ApiError {
    tracing::error!(error = %e, "Failed to issue link");
    ApiError::internal(format!("Failed to issue link: {e}"))
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn health() -> Json<JSend<HealthResponse>> {
    JSend::success(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub async fn create_link(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<CreateLinkRequest>,
) -> Result<Json<JSend<CreateLinkResponse>>, ApiError> {
    let subject_type = parse_subject_type(&req.subject_type)?;

    let mut export = ExportLinks::new(&state.db, &state.encoder, &state.config.links);
    if let Some(user) = req.issued_by.as_deref().filter(|u| !u.trim().is_empty()) {
        export = export.issued_by(user);
    }

    let link = match req.qr_size_px {
        Some(_) => export.link_with_qr(subject_type, req.subject_id, req.ttl_days, req.qr_size_px),
        None => export.link(subject_type, req.subject_id, req.ttl_days),
    }
    .map_err(issue_error)?;

    tracing::info!(
        token_id = link.token.id,
        %subject_type,
        subject_id = req.subject_id,
        expires_at = %link.token.expires_at,
        "Issued public link"
    );

    Ok(JSend::success(CreateLinkResponse {
        expires_at: link.token.expires_at.to_rfc3339(),
        id: link.token.id,
        qr_svg: link
            .qr
            .map(|image| String::from_utf8_lossy(&image.bytes).into_owned()),
        url: link.url,
    }))
}

pub async fn revoke_link(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<JSend<RevokeLinkResponse>>, ApiError> {
    match state.db.revoke_token(id) {
        Ok(true) => {
            tracing::info!(token_id = id, "Revoked public link");
            Ok(JSend::success(RevokeLinkResponse { id, revoked: true }))
        }
        Ok(false) => Err(ApiError::not_found("Link not found")),
        Err(e) => Err(ApiError::internal(format!("Failed to revoke link: {e}"))),
    }
}

pub async fn link_events(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<JSend<Vec<AccessEventResponse>>>, ApiError> {
    let token = state
        .db
        .get_token(id)
        .map_err(|e| ApiError::internal(format!("Failed to load link: {e}")))?;
    if token.is_none() {
        return Err(ApiError::not_found("Link not found"));
    }

    let events = state
        .db
        .events_for_token(id)
        .map_err(|e| ApiError::internal(format!("Failed to load access events: {e}")))?;
    Ok(JSend::success(events.into_iter().map(Into::into).collect()))
}

pub async fn subject_events(
    State(state): State<Arc<AppState>>,
    Path((subject_type, subject_id)): Path<(String, u64)>,
) -> Result<Json<JSend<Vec<AccessEventResponse>>>, ApiError> {
    let subject_type = parse_subject_type(&subject_type)?;
    let events = state
        .db
        .events_for_subject(subject_type, subject_id)
        .map_err(|e| ApiError::internal(format!("Failed to load access events: {e}")))?;
    Ok(JSend::success(events.into_iter().map(Into::into).collect()))
}
