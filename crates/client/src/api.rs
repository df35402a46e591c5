//! REST client for the generation provider's HTTP endpoints.
//!
//! Wraps batch submission, batch status checks, reference-image upload,
//! and artifact fetches using [`reqwest`]. Implements
//! [`GenerationProvider`] so the engine only sees the trait.

use async_trait::async_trait;
use base64::Engine as _;
use serde::Serialize;

use crate::error::ApiError;
use crate::provider::{BatchCheckOutcome, GenerationProvider, SubmitAck, SubmitBatch};
use crate::status::{extract_operation_name, parse_batch_check};

/// Browser-equivalent headers the provider expects on every call.
const ORIGIN: &str = "https://labs.google";
const USER_AGENT: &str = "Mozilla/5.0";

/// Endpoint URLs for one provider deployment.
#[derive(Debug, Clone)]
pub struct FlowEndpoints {
    pub upload_image: String,
    /// Image-to-video submission (used when a start image is attached).
    pub submit_i2v: String,
    /// Text-to-video submission.
    pub submit_t2v: String,
    pub batch_check: String,
}

/// HTTP client for the generation provider.
///
/// Holds no credential state; the bearer token is supplied per call by
/// the credential rotator.
pub struct FlowClient {
    http: reqwest::Client,
    endpoints: FlowEndpoints,
}

impl FlowClient {
    pub fn new(endpoints: FlowEndpoints) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoints,
        }
    }

    /// Reuse an existing [`reqwest::Client`] for connection pooling.
    pub fn with_client(http: reqwest::Client, endpoints: FlowEndpoints) -> Self {
        Self { http, endpoints }
    }

    async fn post_json(
        &self,
        url: &str,
        credential: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, ApiError> {
        let response = self
            .http
            .post(url)
            .bearer_auth(credential)
            .header(reqwest::header::ORIGIN, ORIGIN)
            .header(reqwest::header::REFERER, format!("{ORIGIN}/"))
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            let message = extract_error_message(&text);
            tracing::warn!(url, status = status.as_u16(), %message, "provider call failed");
            return Err(ApiError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        tracing::debug!(url, "provider call succeeded");
        Ok(response.json::<serde_json::Value>().await?)
    }
}

/// Pull the provider's error message out of a failure body, bounded so
/// log lines stay readable.
fn extract_error_message(body: &str) -> String {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")?
                .get("message")?
                .as_str()
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string());
    message.chars().take(300).collect()
}

/// Wire shape of one seeded request inside a submission batch.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationRequest<'a> {
    aspect_ratio: &'a str,
    seed: u64,
    video_model_key: &'a str,
    text_input: TextInput<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_image: Option<StartImage<'a>>,
}

#[derive(Debug, Serialize)]
struct TextInput<'a> {
    prompt: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StartImage<'a> {
    media_id: &'a str,
}

/// Build the submission body for a [`SubmitBatch`].
fn submit_body(batch: &SubmitBatch) -> serde_json::Value {
    let requests: Vec<GenerationRequest<'_>> = (0..batch.copies)
        .map(|k| GenerationRequest {
            aspect_ratio: &batch.aspect_ratio,
            seed: batch.base_seed + u64::from(k),
            video_model_key: &batch.model_key,
            text_input: TextInput {
                prompt: &batch.prompt,
            },
            start_image: batch.media_id.as_deref().map(|media_id| StartImage { media_id }),
        })
        .collect();

    let mut body = serde_json::json!({ "requests": requests });
    if let Some(project_id) = &batch.project_id {
        body["clientContext"] = serde_json::json!({ "projectId": project_id });
    }
    body
}

/// Build the batch-check body, deduplicating operation names.
fn batch_check_body(operation_names: &[String]) -> serde_json::Value {
    let mut seen = std::collections::HashSet::new();
    let operations: Vec<serde_json::Value> = operation_names
        .iter()
        .filter(|n| !n.is_empty() && seen.insert(n.as_str()))
        .map(|n| serde_json::json!({ "operation": { "name": n } }))
        .collect();
    serde_json::json!({ "operations": operations })
}

#[async_trait]
impl GenerationProvider for FlowClient {
    async fn submit_batch(
        &self,
        credential: &str,
        batch: &SubmitBatch,
    ) -> Result<SubmitAck, ApiError> {
        let url = if batch.media_id.is_some() {
            &self.endpoints.submit_i2v
        } else {
            &self.endpoints.submit_t2v
        };

        let data = self.post_json(url, credential, &submit_body(batch)).await?;

        let operations = data
            .get("operations")
            .and_then(|ops| ops.as_array())
            .ok_or_else(|| {
                ApiError::MalformedResponse("submission response has no operations".to_string())
            })?;

        let operation_names = operations.iter().map(extract_operation_name).collect();
        Ok(SubmitAck { operation_names })
    }

    async fn batch_check(
        &self,
        credential: &str,
        operation_names: &[String],
    ) -> Result<BatchCheckOutcome, ApiError> {
        let body = batch_check_body(operation_names);
        let data = self
            .post_json(&self.endpoints.batch_check, credential, &body)
            .await?;
        Ok(BatchCheckOutcome {
            reports: parse_batch_check(&data),
        })
    }

    async fn upload_image(
        &self,
        credential: &str,
        bytes: &[u8],
        mime: &str,
        aspect_hint: &str,
    ) -> Result<String, ApiError> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        let body = serde_json::json!({
            "imageInput": {
                "rawImageBytes": encoded,
                "mimeType": mime,
                "isUserUploaded": true,
                "aspectRatio": aspect_hint,
            },
            "clientContext": { "sessionId": uuid::Uuid::new_v4().to_string() },
        });

        let data = self
            .post_json(&self.endpoints.upload_image, credential, &body)
            .await?;

        data.get("mediaGenerationId")
            .and_then(|m| m.get("mediaGenerationId"))
            .and_then(|id| id.as_str())
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                ApiError::MalformedResponse(
                    "upload response is missing mediaGenerationId".to_string(),
                )
            })
    }

    async fn fetch_artifact(&self, url: &str) -> Result<Vec<u8>, ApiError> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            tracing::warn!(url, status = status.as_u16(), "artifact fetch failed");
            return Err(ApiError::Provider {
                status: status.as_u16(),
                message: format!("artifact fetch failed for {url}"),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}
