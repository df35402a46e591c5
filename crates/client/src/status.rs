//! Normalization of the provider's status vocabulary.
//!
//! Batch-check responses mix several generations of status strings plus
//! a `done`/`error` pair. Everything is folded into
//! [`OperationStatus`], with "done but no playable URL" kept distinct
//! from success.

use serde::Serialize;

use crate::urls::{collect_candidate_urls, split_media_urls};

/// Normalized status of one remote operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OperationStatus {
    Processing,
    /// Succeeded and at least one video URL is available.
    Done,
    /// Succeeded according to the provider, but no playable URL was
    /// returned. Never conflated with [`OperationStatus::Done`].
    DoneNoUrl,
    Failed,
}

/// One operation's normalized report from a batch check.
#[derive(Debug, Clone, Serialize)]
pub struct OperationReport {
    pub name: String,
    pub status: OperationStatus,
    pub video_urls: Vec<String>,
    pub image_urls: Vec<String>,
}

impl OperationReport {
    /// The URL a download should use, when one exists.
    pub fn primary_video_url(&self) -> Option<&str> {
        self.video_urls.first().map(String::as_str)
    }
}

/// Fold the provider's raw status vocabulary into done/failed/processing.
fn raw_status(item: &serde_json::Value) -> RawStatus {
    if item.get("done").and_then(|d| d.as_bool()) == Some(true) {
        if item.get("error").is_some_and(|e| !e.is_null()) {
            return RawStatus::Failed;
        }
        return RawStatus::Done;
    }
    match item.get("status").and_then(|s| s.as_str()).unwrap_or("") {
        "MEDIA_GENERATION_STATUS_SUCCEEDED"
        | "MEDIA_GENERATION_STATUS_SUCCESSFUL"
        | "SUCCEEDED"
        | "SUCCESS" => RawStatus::Done,
        "MEDIA_GENERATION_STATUS_FAILED" | "FAILED" | "ERROR" => RawStatus::Failed,
        _ => RawStatus::Processing,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RawStatus {
    Processing,
    Done,
    Failed,
}

/// Extract the operation name from either the nested or the flat shape.
pub fn extract_operation_name(op: &serde_json::Value) -> Option<String> {
    op.get("operation")
        .and_then(|o| o.get("name"))
        .or_else(|| op.get("name"))
        .and_then(|n| n.as_str())
        .filter(|n| !n.is_empty())
        .map(str::to_string)
}

/// Parse one batch-check entry into a normalized report.
///
/// Entries without an operation name are unusable and yield `None`.
pub fn parse_operation(item: &serde_json::Value) -> Option<OperationReport> {
    let name = extract_operation_name(item)?;

    // URLs can appear under `response` or at the top level.
    let mut candidates = item
        .get("response")
        .map(collect_candidate_urls)
        .unwrap_or_default();
    if candidates.is_empty() {
        candidates = collect_candidate_urls(item);
    }
    let (video_urls, image_urls) = split_media_urls(&candidates);

    let status = match raw_status(item) {
        RawStatus::Processing => OperationStatus::Processing,
        RawStatus::Failed => OperationStatus::Failed,
        RawStatus::Done if video_urls.is_empty() => OperationStatus::DoneNoUrl,
        RawStatus::Done => OperationStatus::Done,
    };

    Some(OperationReport {
        name,
        status,
        video_urls,
        image_urls,
    })
}

/// Parse a whole batch-check response body into reports.
pub fn parse_batch_check(body: &serde_json::Value) -> Vec<OperationReport> {
    body.get("operations")
        .and_then(|ops| ops.as_array())
        .map(|ops| ops.iter().filter_map(parse_operation).collect())
        .unwrap_or_default()
}
