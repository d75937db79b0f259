pub mod health;
pub mod resumes;

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::enhancement::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Resume documents
        .route("/api/v1/resumes", post(resumes::handle_create_resume))
        .route(
            "/api/v1/resumes/:id",
            get(resumes::handle_get_resume).delete(resumes::handle_delete_resume),
        )
        .route(
            "/api/v1/resumes/:id/fields/:field",
            put(resumes::handle_write_field),
        )
        // Field enhancement
        .route(
            "/api/v1/resumes/:id/fields/:field/enhance",
            post(handlers::handle_enhance),
        )
        .route(
            "/api/v1/resumes/:id/fields/:field/retry",
            post(handlers::handle_retry),
        )
        .route(
            "/api/v1/resumes/:id/fields/:field/accept",
            post(handlers::handle_accept),
        )
        .route(
            "/api/v1/resumes/:id/fields/:field/enhancement",
            get(handlers::handle_get_enhancement).delete(handlers::handle_teardown),
        )
        .with_state(state)
}
