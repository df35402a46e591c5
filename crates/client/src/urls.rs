//! Candidate-URL extraction from provider responses.
//!
//! The provider nests artifact URLs at varying depths and under varying
//! key names depending on model family and response age, so collection
//! walks the whole JSON value instead of trusting one path.

use std::collections::HashSet;

/// Keys whose string values are treated as candidate URLs.
const URL_KEYS: &[&str] = &[
    "gcsUrl",
    "gcsUri",
    "signedUrl",
    "signedUri",
    "downloadUrl",
    "downloadUri",
    "videoUrl",
    "fifeUrl",
    "url",
    "uri",
    "fileUri",
];

/// Recursively collect every candidate URL in a JSON value.
///
/// Deduplicated, sorted with video URLs first and shorter URLs before
/// longer ones (signed variants of the same object sort after the bare
/// one).
pub fn collect_candidate_urls(value: &serde_json::Value) -> Vec<String> {
    let mut seen = HashSet::new();
    visit(value, &mut seen);

    let mut urls: Vec<String> = seen.into_iter().collect();
    urls.sort_by_key(|u| (if u.contains("/video/") { 0 } else { 1 }, u.len()));
    urls
}

/// Split candidates into (video, image) URL lists, preserving order.
pub fn split_media_urls(urls: &[String]) -> (Vec<String>, Vec<String>) {
    let videos = urls
        .iter()
        .filter(|u| u.contains("/video/"))
        .cloned()
        .collect();
    let images = urls
        .iter()
        .filter(|u| u.contains("/image/"))
        .cloned()
        .collect();
    (videos, images)
}

fn visit(value: &serde_json::Value, out: &mut HashSet<String>) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, v) in map {
                if URL_KEYS.contains(&key.as_str()) {
                    if let Some(s) = v.as_str() {
                        if is_url(s) {
                            out.insert(s.to_string());
                            continue;
                        }
                    }
                }
                visit(v, out);
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                visit(item, out);
            }
        }
        serde_json::Value::String(s) => {
            if is_url(s) {
                out.insert(s.clone());
            }
        }
        _ => {}
    }
}

fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://") || s.starts_with("gs://")
}
