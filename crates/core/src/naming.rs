//! Deterministic artifact naming and log-safe credential hints.

use crate::types::{CopyIndex, SceneId};

/// File name for a downloaded video: `{project}_{scene}_{copy}.mp4`.
///
/// The project component is sanitized so the name is always a valid
/// single path segment. Copy indices are 1-based in file names.
pub fn artifact_filename(project: &str, scene: SceneId, copy: CopyIndex) -> String {
    format!("{}_{scene}_{}.mp4", sanitize_component(project), copy + 1)
}

/// File name for a derived thumbnail: `thumb_c{scene}_v{copy}.jpg`.
pub fn thumbnail_filename(scene: SceneId, copy: CopyIndex) -> String {
    format!("thumb_c{scene}_v{}.jpg", copy + 1)
}

/// Replace anything that is not alphanumeric, `-`, or `_` with `_`.
fn sanitize_component(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "project".to_string()
    } else {
        cleaned
    }
}

/// Redacted credential hint showing only the last 6 characters.
///
/// Secrets never appear in logs or events; this is the only
/// representation that leaves the rotator.
pub fn credential_hint(secret: &str) -> String {
    // Counted in chars, not bytes; secrets are opaque and may hold
    // multi-byte text.
    let total = secret.chars().count();
    if total > 6 {
        let tail: String = secret.chars().skip(total - 6).collect();
        format!("...{tail}")
    } else {
        "***".to_string()
    }
}

/// Guess an image mime type from a file extension.
///
/// Upload payloads require a mime type; unknown extensions default to
/// JPEG, matching what the provider accepts most leniently.
pub fn image_mime_for_path(path: &std::path::Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "image/jpeg",
    }
}
