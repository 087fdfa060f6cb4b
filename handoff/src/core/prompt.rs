//! Deterministic prompt assembly for engine invocations.

use serde_json::{Map, Value};

/// Assemble the instruction document sent to the engine.
///
/// Sections, in order: `# Task` (always), `# Context` (only when `context` is
/// non-empty, one `##` subsection per key in insertion order), and
/// `# Output Format` (only when `output_format` is given). String context
/// values are inlined; anything else is rendered as a pretty JSON block.
pub fn build_prompt(
    task: &str,
    context: &Map<String, Value>,
    output_format: Option<&str>,
) -> String {
    let mut prompt = format!("# Task\n{task}\n\n");

    if !context.is_empty() {
        prompt.push_str("# Context\n");
        for (key, value) in context {
            match value {
                Value::String(text) => {
                    prompt.push_str(&format!("## {key}\n{text}\n\n"));
                }
                other => {
                    let rendered = serde_json::to_string_pretty(other)
                        .unwrap_or_else(|_| other.to_string());
                    prompt.push_str(&format!("## {key}\n```json\n{rendered}\n```\n\n"));
                }
            }
        }
    }

    if let Some(format) = output_format {
        prompt.push_str(&format!("# Output Format\n{format}\n"));
    }

    prompt
}

/// Last `max_chars` characters of `text`, on a char boundary.
pub fn tail_chars(text: &str, max_chars: usize) -> &str {
    let total = text.chars().count();
    if total <= max_chars {
        return text;
    }
    let skip = total - max_chars;
    match text.char_indices().nth(skip) {
        Some((idx, _)) => &text[idx..],
        None => "",
    }
}
