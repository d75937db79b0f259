use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A resume as the enhancement binding sees it: flat field paths to text.
///
/// Paths are free-form, e.g. `summary`, `work.0.description`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeDocument {
    pub id: Uuid,
    pub title: String,
    pub fields: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ResumeDocument {
    pub fn new(title: impl Into<String>, fields: BTreeMap<String, String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            fields,
            created_at: now,
            updated_at: now,
        }
    }
}
