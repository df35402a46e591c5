//! Prompt trimming for oversized structured prompts.
//!
//! Large JSON prompts trip the provider's request-size validation
//! (400 "invalid argument"), so they are reduced to their essential
//! fields before submission. Plain text is simply truncated.

/// Hard cap on the prompt text sent in a generation request.
pub const PROMPT_MAX_CHARS: usize = 1800;

/// How many task-instruction entries survive trimming.
const MAX_INSTRUCTIONS: usize = 6;
/// How many constraint entries survive trimming.
const MAX_CONSTRAINTS: usize = 4;

/// Bound the prompt to [`PROMPT_MAX_CHARS`].
///
/// Short prompts pass through untouched. Oversized prompts that parse as
/// a JSON object are reduced to objective, persona role/tone, the first
/// few task instructions and constraints, joined with `" | "`. Anything
/// else is truncated on a character boundary.
pub fn trim_prompt(raw: &str) -> String {
    trim_prompt_to(raw, PROMPT_MAX_CHARS)
}

/// [`trim_prompt`] with an explicit cap, for tests.
pub fn trim_prompt_to(raw: &str, max_chars: usize) -> String {
    let trimmed = raw.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }

    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(serde_json::Value::Object(obj)) => {
            let summary = summarize_object(&obj);
            if summary.is_empty() {
                truncate_chars(trimmed, max_chars)
            } else {
                truncate_chars(&summary, max_chars)
            }
        }
        _ => truncate_chars(trimmed, max_chars),
    }
}

/// Pull the essential fields out of a structured prompt object.
fn summarize_object(obj: &serde_json::Map<String, serde_json::Value>) -> String {
    let mut parts: Vec<String> = Vec::new();

    if let Some(objective) = obj.get("Objective").and_then(text_of) {
        parts.push(objective);
    }

    if let Some(persona) = obj.get("Persona").and_then(|v| v.as_object()) {
        let role = persona.get("Role").and_then(text_of).unwrap_or_default();
        let tone = persona.get("Tone").and_then(text_of).unwrap_or_default();
        if !role.is_empty() || !tone.is_empty() {
            parts.push(format!("Role: {role}; Tone: {tone}"));
        }
    }

    if let Some(instructions) = obj.get("Task_Instructions").and_then(|v| v.as_array()) {
        parts.extend(
            instructions
                .iter()
                .filter_map(text_of)
                .take(MAX_INSTRUCTIONS),
        );
    }

    if let Some(constraints) = obj.get("Constraints").and_then(|v| v.as_array()) {
        parts.extend(constraints.iter().filter_map(text_of).take(MAX_CONSTRAINTS));
    }

    parts.retain(|p| !p.is_empty());
    parts.join(" | ")
}

fn text_of(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Truncate on a character boundary, never mid-codepoint.
fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
