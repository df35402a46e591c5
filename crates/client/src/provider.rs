//! The abstract provider contract the engine drives.
//!
//! [`GenerationProvider`] is the seam between the orchestration engine
//! and the real HTTP client. Tests substitute a scripted implementation;
//! production uses [`crate::FlowClient`]. Credentials are passed per
//! call so the rotator stays in charge of which secret each request uses.

use async_trait::async_trait;

use crate::error::ApiError;
use crate::status::OperationReport;

/// One batch generation request: `copies` seeded variants of one prompt.
#[derive(Debug, Clone)]
pub struct SubmitBatch {
    /// Provider wire value, e.g. `VIDEO_ASPECT_RATIO_LANDSCAPE`.
    pub aspect_ratio: String,
    pub model_key: String,
    /// Already trimmed to the provider's size bound.
    pub prompt: String,
    /// Copy `k` is seeded with `base_seed + k`.
    pub base_seed: u64,
    pub copies: u32,
    /// Uploaded reference image id; selects the image-to-video endpoint.
    pub media_id: Option<String>,
    pub project_id: Option<String>,
}

/// Result of a submission: operation names in copy order.
///
/// `None` entries are operations the provider acknowledged without a
/// name; the submitter drops those copies with a warning.
#[derive(Debug, Clone)]
pub struct SubmitAck {
    pub operation_names: Vec<Option<String>>,
}

/// Result of one batch status check.
#[derive(Debug, Clone)]
pub struct BatchCheckOutcome {
    pub reports: Vec<OperationReport>,
}

/// Remote generation provider, abstracted for testability.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Submit a batch of seeded generation requests.
    async fn submit_batch(
        &self,
        credential: &str,
        batch: &SubmitBatch,
    ) -> Result<SubmitAck, ApiError>;

    /// Check the status of many operations in one round-trip.
    async fn batch_check(
        &self,
        credential: &str,
        operation_names: &[String],
    ) -> Result<BatchCheckOutcome, ApiError>;

    /// Upload a reference image; returns the provider's media id.
    async fn upload_image(
        &self,
        credential: &str,
        bytes: &[u8],
        mime: &str,
        aspect_hint: &str,
    ) -> Result<String, ApiError>;

    /// Fetch a completed artifact. Not credentialed; artifact URLs are
    /// pre-signed.
    async fn fetch_artifact(&self, url: &str) -> Result<Vec<u8>, ApiError>;
}
