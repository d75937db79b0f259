/// Enhancement Backend Client: the single point of entry for the external
/// text-generation service.
///
/// Two calls only: submit a job, check a job. One outbound HTTP request per
/// invocation, no retries and no state kept between calls. Retrying is a user
/// decision made at the controller level.
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

use crate::enhancement::job::{EnhancementRequest, JobId, JobStatusReport, JobSubmission};

const API_KEY_HEADER: &str = "X-API-Key";
const SUCCESS: &str = "success";

/// Label some generations are prefixed with. Stripped before results surface.
static ENHANCED_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*enhanced content:\s*").expect("valid regex"));

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {}", .message.as_deref().unwrap_or("no message"))]
    Api {
        status: u16,
        code: Option<String>,
        message: Option<String>,
        validation_errors: Vec<FieldViolation>,
    },

    #[error("Backend reported failure: {0}")]
    Envelope(String),

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("No API key configured for the enhancement backend")]
    MissingApiKey,
}

impl ClientError {
    /// The backend's own human-readable message, when it sent one.
    pub fn backend_message(&self) -> Option<&str> {
        match self {
            ClientError::Api { message, .. } => message.as_deref(),
            ClientError::Envelope(message) => Some(message),
            _ => None,
        }
    }
}

/// One field-level rejection reported by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: String,
    data: Option<T>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorEnvelope {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    validation_errors: Vec<FieldViolation>,
}

/// The two backend calls the controller depends on.
///
/// `EnhancementClient` talks HTTP; tests swap in a scripted fake.
#[async_trait]
pub trait EnhancementBackend: Send + Sync {
    async fn submit_job(&self, request: &EnhancementRequest) -> Result<JobSubmission, ClientError>;

    async fn check_job_status(&self, job_id: &JobId) -> Result<JobStatusReport, ClientError>;
}

#[derive(Clone)]
pub struct EnhancementClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl EnhancementClient {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout: std::time::Duration,
    ) -> Result<Self, ClientError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn api_key(&self) -> Result<&str, ClientError> {
        self.api_key.as_deref().ok_or(ClientError::MissingApiKey)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

#[async_trait]
impl EnhancementBackend for EnhancementClient {
    async fn submit_job(&self, request: &EnhancementRequest) -> Result<JobSubmission, ClientError> {
        let api_key = self.api_key()?;

        debug!(
            "Submitting {} enhancement ({} chars)",
            request.section,
            request.content.len()
        );

        let response = self
            .client
            .post(self.url("llm/generate"))
            .header(API_KEY_HEADER, api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                error!("Enhancement submit failed: {e}");
                ClientError::Http(e)
            })?;

        let status = response.status();
        let body = response.text().await?;
        decode_envelope(status, &body)
    }

    async fn check_job_status(&self, job_id: &JobId) -> Result<JobStatusReport, ClientError> {
        let api_key = self.api_key()?;

        let response = self
            .client
            .get(self.url(&format!("llm/status/{job_id}")))
            .header(API_KEY_HEADER, api_key)
            .send()
            .await
            .map_err(|e| {
                error!("Status check for job {job_id} failed: {e}");
                ClientError::Http(e)
            })?;

        let status = response.status();
        let body = response.text().await?;
        let mut report: JobStatusReport = decode_envelope(status, &body)?;
        report.result = report.result.map(|text| strip_enhanced_label(&text));

        debug!("Job {} is {}", report.job_id, report.status);
        Ok(report)
    }
}

/// Unwraps a `{status: "success", data}` envelope, or classifies the failure.
fn decode_envelope<T: DeserializeOwned>(status: StatusCode, body: &str) -> Result<T, ClientError> {
    if !status.is_success() {
        let details: ErrorEnvelope = serde_json::from_str(body).unwrap_or_default();
        error!("Enhancement backend returned {status}: {body}");
        return Err(ClientError::Api {
            status: status.as_u16(),
            code: details.code,
            message: details.message,
            validation_errors: details.validation_errors,
        });
    }

    let envelope: Envelope<T> = serde_json::from_str(body)?;
    if envelope.status != SUCCESS {
        return Err(ClientError::Envelope(envelope.message.unwrap_or_else(|| {
            format!("unexpected envelope status '{}'", envelope.status)
        })));
    }

    envelope
        .data
        .ok_or_else(|| ClientError::Envelope("success envelope without data".to_string()))
}

/// Strips a leading "Enhanced Content:" label (any case) and the whitespace
/// around the remaining text. Text without the label passes through unchanged.
pub fn strip_enhanced_label(text: &str) -> String {
    match ENHANCED_LABEL.find(text) {
        Some(label) => text[label.end()..].trim().to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enhancement::job::{
        EnhancementContext, GenerationParameters, JobStatus, Section, WorkContext,
    };
    use crate::enhancement::context_builders::ExperienceLevel;
    use axum::{
        extract::Path,
        http::{HeaderMap, StatusCode as AxumStatus},
        routing::{get, post},
        Json, Router,
    };
    use serde_json::{json, Value};

    async fn spawn_backend(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/api/v1/")
    }

    fn client(base_url: &str, api_key: Option<&str>) -> EnhancementClient {
        EnhancementClient::new(
            base_url,
            api_key.map(str::to_string),
            std::time::Duration::from_secs(5),
        )
        .unwrap()
    }

    fn sample_request() -> EnhancementRequest {
        EnhancementRequest {
            section: Section::Work,
            content: "Led a team of five".to_string(),
            context: EnhancementContext::Work(WorkContext {
                role: "Engineer".to_string(),
                industry: "Acme".to_string(),
                experience_level: ExperienceLevel::Mid,
            }),
            parameters: GenerationParameters {
                temperature: 0.7,
                style: "professional".to_string(),
                focus_areas: vec!["metrics".to_string()],
                preserve_keywords: true,
            },
        }
    }

    #[test]
    fn test_strip_label_removes_prefix() {
        assert_eq!(
            strip_enhanced_label("Enhanced Content: Led cross-functional team..."),
            "Led cross-functional team..."
        );
    }

    #[test]
    fn test_strip_label_is_case_insensitive() {
        assert_eq!(
            strip_enhanced_label("  ENHANCED CONTENT:   Improved X by 20%. "),
            "Improved X by 20%."
        );
    }

    #[test]
    fn test_strip_label_passes_plain_text_through() {
        let text = "Improved X by 20%. ";
        assert_eq!(strip_enhanced_label(text), text);
    }

    #[test]
    fn test_strip_label_only_at_start() {
        let text = "Summary. Enhanced Content: trailing";
        assert_eq!(strip_enhanced_label(text), text);
    }

    #[test]
    fn test_decode_envelope_success() {
        let body = r#"{"status":"success","data":{"jobId":"j1","status":"pending","checkStatusUrl":"/llm/status/j1"}}"#;
        let submission: JobSubmission = decode_envelope(StatusCode::OK, body).unwrap();
        assert_eq!(submission.job_id, JobId::from("j1"));
        assert_eq!(submission.status, JobStatus::Pending);
        assert_eq!(submission.check_status_url.as_deref(), Some("/llm/status/j1"));
    }

    #[test]
    fn test_decode_envelope_non_success_status() {
        let body = r#"{"status":"error","message":"queue full"}"#;
        let err = decode_envelope::<JobSubmission>(StatusCode::OK, body).unwrap_err();
        assert!(matches!(err, ClientError::Envelope(ref m) if m == "queue full"));
    }

    #[test]
    fn test_decode_envelope_validation_errors() {
        let body = r#"{"status":"error","code":"VALIDATION_ERROR","message":"bad input","validationErrors":[{"field":"content","message":"too long"}]}"#;
        let err = decode_envelope::<JobSubmission>(StatusCode::UNPROCESSABLE_ENTITY, body)
            .unwrap_err();
        match err {
            ClientError::Api {
                status,
                code,
                validation_errors,
                ..
            } => {
                assert_eq!(status, 422);
                assert_eq!(code.as_deref(), Some("VALIDATION_ERROR"));
                assert_eq!(validation_errors.len(), 1);
                assert_eq!(validation_errors[0].field, "content");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_envelope_unparseable_error_body() {
        let err = decode_envelope::<JobSubmission>(StatusCode::BAD_GATEWAY, "<html>").unwrap_err();
        assert!(matches!(err, ClientError::Api { status: 502, message: None, .. }));
        assert!(err.backend_message().is_none());
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_without_request() {
        // Nothing listens on this port; a real request would fail with Http.
        let client = client("http://127.0.0.1:9/api/v1/", None);
        let err = client.submit_job(&sample_request()).await.unwrap_err();
        assert!(matches!(err, ClientError::MissingApiKey));
        let err = client.check_job_status(&JobId::from("j1")).await.unwrap_err();
        assert!(matches!(err, ClientError::MissingApiKey));
    }

    #[tokio::test]
    async fn test_submit_job_posts_request_with_api_key() {
        let router = Router::new().route(
            "/api/v1/llm/generate",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                if headers.get("x-api-key").and_then(|v| v.to_str().ok()) != Some("secret") {
                    return (
                        AxumStatus::UNAUTHORIZED,
                        Json(json!({"status": "error", "message": "Invalid API key"})),
                    );
                }
                assert_eq!(body["section"], "work");
                assert_eq!(body["content"], "Led a team of five");
                assert_eq!(body["context"]["experienceLevel"], "mid");
                (
                    AxumStatus::ACCEPTED,
                    Json(json!({
                        "status": "success",
                        "data": {"jobId": "job-1", "status": "pending", "checkStatusUrl": "/llm/status/job-1"}
                    })),
                )
            }),
        );
        let base = spawn_backend(router).await;

        let submission = client(&base, Some("secret"))
            .submit_job(&sample_request())
            .await
            .unwrap();
        assert_eq!(submission.job_id, JobId::from("job-1"));

        let err = client(&base, Some("wrong"))
            .submit_job(&sample_request())
            .await
            .unwrap_err();
        assert_eq!(err.backend_message(), Some("Invalid API key"));
    }

    #[tokio::test]
    async fn test_check_job_status_strips_label() {
        let router = Router::new().route(
            "/api/v1/llm/status/:job_id",
            get(|Path(job_id): Path<String>| async move {
                Json(json!({
                    "status": "success",
                    "data": {
                        "jobId": job_id,
                        "status": "completed",
                        "result": "Enhanced Content: Improved X by 20%."
                    }
                }))
            }),
        );
        let base = spawn_backend(router).await;

        let report = client(&base, Some("secret"))
            .check_job_status(&JobId::from("job-9"))
            .await
            .unwrap();
        assert_eq!(report.job_id, JobId::from("job-9"));
        assert_eq!(report.status, JobStatus::Completed);
        assert_eq!(report.result.as_deref(), Some("Improved X by 20%."));
    }
}
