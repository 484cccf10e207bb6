//! HTTP implementation of job submission and status polling.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{multipart, Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use tracing::debug;

use crate::auth::CredentialProvider;
use crate::config::ApiConfig;
use crate::task::Snapshot;

use super::{
    ClientError, GenerationRequest, JobSubmitter, StatusError, StatusSource, SubmitError,
    SubmittedTask,
};

/// Error body returned by the backend (`{"detail": "..."}`).
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

/// Generation API client.
pub struct HttpGenerationApi {
    client: Client,
    base_url: String,
    credentials: Arc<dyn CredentialProvider>,
}

impl HttpGenerationApi {
    /// Create a new client for the configured backend.
    pub fn new(
        config: &ApiConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .map_err(|e| ClientError::Build(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Attach the bearer token, if the provider holds one.
    async fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.credentials.current().await {
            Some(credential) if !credential.is_anonymous() => {
                builder.bearer_auth(credential.access_token)
            }
            _ => builder,
        }
    }

    fn build_form(request: &GenerationRequest) -> Result<multipart::Form, SubmitError> {
        let mut form = multipart::Form::new()
            .text("generate_muscles", request.generate_muscles.to_string());

        if let Some(image) = &request.schema_image {
            let part = multipart::Part::bytes(image.bytes.clone())
                .file_name(image.file_name.clone())
                .mime_str(&image.content_type)
                .map_err(|e| SubmitError::Validation(format!("invalid content type: {}", e)))?;
            form = form.part("schema_file", part);
        }
        if let Some(prompt) = &request.additional_prompt {
            form = form.text("additional_prompt", prompt.clone());
        }
        if let Some(pose_id) = request.pose_id {
            form = form.text("pose_id", pose_id.to_string());
        }

        Ok(form)
    }
}

#[async_trait]
impl JobSubmitter for HttpGenerationApi {
    async fn submit(&self, request: &GenerationRequest) -> Result<SubmittedTask, SubmitError> {
        let form = Self::build_form(request)?;
        let builder = self.client.post(self.url("/api/v1/generate")).multipart(form);

        let response = self.authorize(builder).await.send().await.map_err(|e| {
            if e.is_timeout() {
                SubmitError::Timeout
            } else if e.is_connect() {
                SubmitError::ConnectionFailed(e.to_string())
            } else {
                SubmitError::Api(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            let detail = error_detail(&body);
            return Err(match status {
                StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                    if detail.to_lowercase().contains("mismatch") {
                        SubmitError::PoseMismatch(detail)
                    } else {
                        SubmitError::Validation(detail)
                    }
                }
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    SubmitError::Unauthorized(detail)
                }
                StatusCode::TOO_MANY_REQUESTS => SubmitError::RateLimited {
                    retry_after_secs: retry_after.map(|d| d.as_secs()),
                },
                _ => SubmitError::Api(format!("HTTP {}: {}", status, detail)),
            });
        }

        let submitted: SubmittedTask = response
            .json()
            .await
            .map_err(|e| SubmitError::Api(format!("Failed to parse response: {}", e)))?;

        debug!(task_id = %submitted.task_id, "Generation job submitted");
        Ok(submitted)
    }
}

#[async_trait]
impl StatusSource for HttpGenerationApi {
    async fn fetch_status(&self, task_id: &str) -> Result<Snapshot, StatusError> {
        let url = self.url(&format!(
            "/api/v1/generate/status/{}",
            urlencoding::encode(task_id)
        ));
        let builder = self.client.get(&url);

        let response = self
            .authorize(builder)
            .await
            .send()
            .await
            .map_err(|e| StatusError::Transient(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            let detail = error_detail(&body);
            return Err(match status {
                StatusCode::NOT_FOUND => StatusError::NotFound(detail),
                StatusCode::UNAUTHORIZED => StatusError::Unauthorized(detail),
                StatusCode::FORBIDDEN => StatusError::Forbidden(detail),
                StatusCode::TOO_MANY_REQUESTS => StatusError::RateLimited { retry_after },
                _ => StatusError::Transient(format!("HTTP {}: {}", status, detail)),
            });
        }

        let mut snapshot: Snapshot = response
            .json()
            .await
            .map_err(|e| StatusError::Transient(format!("Failed to parse response: {}", e)))?;
        if snapshot.task_id.is_empty() {
            snapshot.task_id = task_id.to_string();
        }

        Ok(snapshot)
    }
}

/// Parse a `Retry-After` header given in seconds.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Extract a readable message from an error response body.
fn error_detail(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            detail: serde_json::Value::String(detail),
        }) => detail,
        Ok(ErrorBody { detail }) => detail.to_string(),
        Err(_) => body.chars().take(200).collect(),
    }
}
