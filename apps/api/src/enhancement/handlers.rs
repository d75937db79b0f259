//! Axum route handlers binding a UI field to its enhancement controller.

use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::enhancement::context_builders::SectionEntry;
use crate::enhancement::controller::{EnhancementState, RetrySource};
use crate::enhancement::registry::FieldKey;
use crate::errors::AppError;
use crate::models::resume::ResumeDocument;
use crate::state::AppState;

const MAX_LONG_POLL_MS: u64 = 30_000;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct EnhanceRequest {
    /// Defaults to the field's stored text.
    pub content: Option<String>,
    pub entry: SectionEntry,
}

#[derive(Debug, Default, Deserialize)]
pub struct RetryRequest {
    #[serde(default)]
    pub source: RetrySource,
}

#[derive(Debug, Default, Deserialize)]
pub struct WatchQuery {
    /// Long-poll: hold the response until the job settles or this many
    /// milliseconds pass.
    pub wait_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct AcceptResponse {
    pub text: String,
    pub document: ResumeDocument,
    pub enhancement: EnhancementState,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/resumes/:id/fields/:field/enhance
///
/// Starts a job and returns immediately with the loading (or empty-content
/// error) snapshot. Progress is read back via GET .../enhancement.
pub async fn handle_enhance(
    State(state): State<AppState>,
    Path((resume_id, field)): Path<(Uuid, String)>,
    Json(request): Json<EnhanceRequest>,
) -> Result<(StatusCode, Json<EnhancementState>), AppError> {
    let stored = state.documents.read_field(resume_id, &field)?;
    let content = request
        .content
        .unwrap_or_else(|| stored.unwrap_or_default());

    let controller = state.fields.get_or_create(FieldKey::new(resume_id, field));
    let snapshot = controller.enhance(&content, request.entry);

    Ok((StatusCode::ACCEPTED, Json(snapshot)))
}

/// POST /api/v1/resumes/:id/fields/:field/retry
pub async fn handle_retry(
    State(state): State<AppState>,
    Path((resume_id, field)): Path<(Uuid, String)>,
    body: Option<Json<RetryRequest>>,
) -> Result<(StatusCode, Json<EnhancementState>), AppError> {
    let source = body.map(|Json(r)| r.source).unwrap_or_default();
    let nothing_to_retry =
        || AppError::Conflict("Nothing has been submitted for this field yet".to_string());

    let controller = state
        .fields
        .get(&FieldKey::new(resume_id, field))
        .ok_or_else(nothing_to_retry)?;
    let snapshot = controller.retry(source).ok_or_else(nothing_to_retry)?;

    Ok((StatusCode::ACCEPTED, Json(snapshot)))
}

/// POST /api/v1/resumes/:id/fields/:field/accept
///
/// Writes the pending enhanced text into the resume field. The text stays
/// pending if the write fails.
pub async fn handle_accept(
    State(state): State<AppState>,
    Path((resume_id, field)): Path<(Uuid, String)>,
) -> Result<Json<AcceptResponse>, AppError> {
    if state.documents.get(resume_id).is_none() {
        return Err(AppError::NotFound(format!("Resume {resume_id} not found")));
    }

    let nothing_pending =
        || AppError::Conflict("No enhanced text is waiting to be accepted".to_string());
    let controller = state
        .fields
        .get(&FieldKey::new(resume_id, field.clone()))
        .ok_or_else(nothing_pending)?;
    let (text, document) = controller
        .accept_into(|text| state.documents.write_field(resume_id, &field, text))
        .ok_or_else(nothing_pending)??;
    tracing::info!("Accepted enhancement into {resume_id}/{field}");

    Ok(Json(AcceptResponse {
        text,
        document,
        enhancement: controller.state(),
    }))
}

/// GET /api/v1/resumes/:id/fields/:field/enhancement[?wait_ms=N]
///
/// Fields that never enhanced anything report the idle state.
pub async fn handle_get_enhancement(
    State(state): State<AppState>,
    Path((resume_id, field)): Path<(Uuid, String)>,
    Query(query): Query<WatchQuery>,
) -> Json<EnhancementState> {
    let Some(controller) = state.fields.get(&FieldKey::new(resume_id, field)) else {
        return Json(EnhancementState::default());
    };

    if let Some(wait_ms) = query.wait_ms {
        let mut updates = controller.subscribe();
        if updates.borrow().is_loading {
            let wait = Duration::from_millis(wait_ms.min(MAX_LONG_POLL_MS));
            let _ = tokio::time::timeout(wait, updates.wait_for(|s| !s.is_loading)).await;
        }
    }

    Json(controller.state())
}

/// DELETE /api/v1/resumes/:id/fields/:field/enhancement
pub async fn handle_teardown(
    State(state): State<AppState>,
    Path((resume_id, field)): Path<(Uuid, String)>,
) -> StatusCode {
    state.fields.teardown(&FieldKey::new(resume_id, field));
    StatusCode::NO_CONTENT
}
