// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cleanup of language-model output before JSON parsing.
//!
//! Many providers interleave reasoning noise with the answer:
//! `<think>...</think>` spans, ```thinking``` fences, or
//! `<|begin_of_thought|>` sentinels. Callers in JSON mode strip all of it
//! and fall back to the literal `{}` instead of failing, so a chatty
//! model never crashes an ingest or reflection pass.

use tracing::debug;

/// Paired delimiters whose inner content is reasoning, not answer.
const REASONING_SPANS: &[(&str, &str)] = &[
    ("<think>", "</think>"),
    ("<|begin_of_thought|>", "<|end_of_thought|>"),
    ("```thinking", "```"),
];

/// Removes reasoning spans from model output.
///
/// Unterminated spans are cut to the end of the string; whatever text
/// surrounds the spans is kept.
pub fn strip_reasoning(text: &str) -> String {
    let mut out = text.to_string();
    for (open, close) in REASONING_SPANS {
        loop {
            let Some(start) = out.find(open) else { break };
            match out[start + open.len()..].find(close) {
                Some(rel_end) => {
                    let end = start + open.len() + rel_end + close.len();
                    out.replace_range(start..end, "");
                }
                None => {
                    out.truncate(start);
                    break;
                }
            }
        }
    }
    out.trim().to_string()
}

/// Extracts a parsable JSON value from model output.
///
/// Strips reasoning spans and markdown code fences, then takes the
/// outermost `{...}` or `[...]` slice and validates it. Returns the
/// literal `{}` when nothing parses, per the JSON-mode contract.
pub fn extract_json_value(text: &str) -> String {
    let stripped = strip_reasoning(text);
    let candidate = strip_code_fence(&stripped);

    for (open, close) in [('{', '}'), ('[', ']')] {
        if let (Some(start), Some(end)) = (candidate.find(open), candidate.rfind(close)) {
            if end > start {
                let slice = &candidate[start..=end];
                if serde_json::from_str::<serde_json::Value>(slice).is_ok() {
                    return slice.to_string();
                }
            }
        }
    }

    debug!("no parsable JSON in model output, substituting empty object");
    "{}".to_string()
}

/// Removes a single wrapping markdown code fence, if present.
fn strip_code_fence(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    // Drop the fence line (``` or ```json) and the closing fence.
    let after_open = match trimmed.find('\n') {
        Some(idx) => &trimmed[idx + 1..],
        None => return trimmed.to_string(),
    };
    let inner = match after_open.rfind("```") {
        Some(idx) => &after_open[..idx],
        None => after_open,
    };
    inner.trim().to_string()
}
