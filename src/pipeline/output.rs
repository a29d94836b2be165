//! Scrubbing helpers for raw model output.
//!
//! Models wrap JSON and SQL in markdown fences or prefix labels despite
//! instructions not to; every stage cleans its response through these
//! helpers before interpreting it.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref FENCE_OPEN: Regex = Regex::new(r"^```[a-zA-Z]*\s*").expect("static regex");
    static ref FENCE_CLOSE: Regex = Regex::new(r"\s*```$").expect("static regex");
}

/// Strip a surrounding markdown code fence, if any.
pub fn strip_code_fences(response: &str) -> String {
    let trimmed = response.trim();
    let without_open = FENCE_OPEN.replace(trimmed, "");
    FENCE_CLOSE.replace(&without_open, "").trim().to_string()
}

/// Extract the JSON object or array embedded in a response.
///
/// Finds the outermost `{...}` or `[...]` span; falls back to fence
/// stripping when no bracket pair exists.
pub fn extract_json(response: &str) -> String {
    let json_start = response.find('{').or_else(|| response.find('['));
    let json_end = response.rfind('}').or_else(|| response.rfind(']'));

    if let (Some(start), Some(end)) = (json_start, json_end) {
        if start < end {
            return response[start..=end].to_string();
        }
    }
    strip_code_fences(response)
}

/// Normalize a generated SQL statement: drop fences, a leading label the
/// model sometimes echoes, and surrounding whitespace.
pub fn clean_sql(response: &str) -> String {
    let cleaned = strip_code_fences(response);
    cleaned
        .trim()
        .trim_start_matches("SQL:")
        .trim_start_matches("sql:")
        .trim()
        .to_string()
}
