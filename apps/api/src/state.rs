use std::sync::Arc;

use crate::config::Config;
use crate::enhancement::registry::FieldRegistry;
use crate::store::DocumentStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Resume documents enhancements read from and write back to.
    pub documents: Arc<DocumentStore>,
    /// One enhancement controller per resume field.
    pub fields: Arc<FieldRegistry>,
}
