//! Resume document routes: the read/write side the enhancement flow
//! consumes.

use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::enhancement::registry::FieldKey;
use crate::errors::AppError;
use crate::models::resume::ResumeDocument;
use crate::state::AppState;

const UNTITLED: &str = "Untitled resume";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateResumeRequest {
    pub title: String,
    pub fields: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct WriteFieldRequest {
    pub text: String,
}

/// POST /api/v1/resumes
pub async fn handle_create_resume(
    State(state): State<AppState>,
    Json(request): Json<CreateResumeRequest>,
) -> (StatusCode, Json<ResumeDocument>) {
    let title = match request.title.trim() {
        "" => UNTITLED,
        title => title,
    };
    let document = state.documents.create(title, request.fields);
    (StatusCode::CREATED, Json(document))
}

/// GET /api/v1/resumes/:id
pub async fn handle_get_resume(
    State(state): State<AppState>,
    Path(resume_id): Path<Uuid>,
) -> Result<Json<ResumeDocument>, AppError> {
    state
        .documents
        .get(resume_id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Resume {resume_id} not found")))
}

/// DELETE /api/v1/resumes/:id
///
/// Also tears down every enhancement controller bound to the resume.
pub async fn handle_delete_resume(
    State(state): State<AppState>,
    Path(resume_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state
        .documents
        .remove(resume_id)
        .ok_or_else(|| AppError::NotFound(format!("Resume {resume_id} not found")))?;

    let stopped = state.fields.teardown_resume(resume_id);
    tracing::info!("Deleted resume {resume_id} ({stopped} enhancement controller(s) stopped)");
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/v1/resumes/:id/fields/:field
///
/// A user edit. Clears the field's enhancement error banner, if any.
pub async fn handle_write_field(
    State(state): State<AppState>,
    Path((resume_id, field)): Path<(Uuid, String)>,
    Json(request): Json<WriteFieldRequest>,
) -> Result<Json<ResumeDocument>, AppError> {
    let document = state
        .documents
        .write_field(resume_id, &field, &request.text)?;

    if let Some(controller) = state.fields.get(&FieldKey::new(resume_id, field)) {
        controller.clear_error();
    }

    Ok(Json(document))
}
