//! Errors surfaced by the enhancement controller.
//!
//! | Variant | Raised by | Field errors |
//! |---------|-----------|--------------|
//! | `EmptyContent` | pre-flight check, no I/O | no |
//! | `Validation` | backend rejected the submission | yes |
//! | `Submission` | submit call failed | no |
//! | `StatusCheck` | status call failed | no |
//! | `JobFailed` | backend marked the job `failed` | no |
//! | `Timeout` | no terminal status within the wait budget | no |
//!
//! None of these escape the controller. They are folded into its observable
//! state as an [`ErrorView`] plus an optional field map.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::enhancement_client::ClientError;

pub const EMPTY_CONTENT_MESSAGE: &str = "Please enter some content before generating";
pub const VALIDATION_MESSAGE: &str = "Please check the highlighted fields and try again.";
pub const GENERIC_FAILURE_MESSAGE: &str = "Failed to enhance content. Please try again.";

#[derive(Debug, Error)]
pub enum EnhancementError {
    #[error("content is empty")]
    EmptyContent,

    #[error("backend rejected {} field(s)", .fields.len())]
    Validation {
        fields: BTreeMap<String, String>,
        source: ClientError,
    },

    #[error("submission failed: {0}")]
    Submission(ClientError),

    #[error("status check failed: {0}")]
    StatusCheck(ClientError),

    #[error("job failed: {0}")]
    JobFailed(String),

    #[error("no terminal status after {}s", .waited.as_secs())]
    Timeout { waited: Duration },
}

/// Stable identifiers the UI can switch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    EmptyContent,
    Validation,
    Submission,
    StatusCheck,
    JobFailed,
    Timeout,
}

/// What the UI shows in its error banner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorView {
    pub kind: ErrorKind,
    pub message: String,
}

impl EnhancementError {
    /// Classifies a failed submit call. Rejections that name at least one
    /// field become `Validation`, everything else `Submission`, so a bare
    /// `VALIDATION_ERROR` still surfaces the backend's message.
    pub fn from_submission(error: ClientError) -> Self {
        let fields: Option<BTreeMap<String, String>> = match &error {
            ClientError::Api {
                validation_errors, ..
            } if !validation_errors.is_empty() => Some(
                validation_errors
                    .iter()
                    .map(|v| (v.field.clone(), v.message.clone()))
                    .collect(),
            ),
            _ => None,
        };

        match fields {
            Some(fields) => EnhancementError::Validation {
                fields,
                source: error,
            },
            None => EnhancementError::Submission(error),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EnhancementError::EmptyContent => ErrorKind::EmptyContent,
            EnhancementError::Validation { .. } => ErrorKind::Validation,
            EnhancementError::Submission(_) => ErrorKind::Submission,
            EnhancementError::StatusCheck(_) => ErrorKind::StatusCheck,
            EnhancementError::JobFailed(_) => ErrorKind::JobFailed,
            EnhancementError::Timeout { .. } => ErrorKind::Timeout,
        }
    }

    /// Network-layer detail stays in the logs; the user sees the backend's
    /// own message when it sent one, otherwise a generic retry prompt.
    pub fn user_message(&self) -> String {
        match self {
            EnhancementError::EmptyContent => EMPTY_CONTENT_MESSAGE.to_string(),
            EnhancementError::Validation { .. } => VALIDATION_MESSAGE.to_string(),
            EnhancementError::Submission(e) | EnhancementError::StatusCheck(e) => e
                .backend_message()
                .unwrap_or(GENERIC_FAILURE_MESSAGE)
                .to_string(),
            EnhancementError::JobFailed(message) => message.clone(),
            EnhancementError::Timeout { waited } => format!(
                "Enhancement timed out after {} seconds. Please try again.",
                waited.as_secs()
            ),
        }
    }

    pub fn field_errors(&self) -> BTreeMap<String, String> {
        match self {
            EnhancementError::Validation { fields, .. } => fields.clone(),
            _ => BTreeMap::new(),
        }
    }

    pub fn view(&self) -> ErrorView {
        ErrorView {
            kind: self.kind(),
            message: self.user_message(),
        }
    }
}
