// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Token-budgeted serialization of recalled memories for prompt injection.
//!
//! The budget derives from the target model's context window via a
//! longest-prefix table, scaled by the configured ratio and clamped.
//! Selection is greedy over memories sorted by relevance then recency.

use mnemo_config::ContextConfig;
use mnemo_core::Memory;

/// Tokens reserved for the wrapper markers around injected memories.
const WRAPPER_OVERHEAD_TOKENS: usize = 50;
/// Per-memory overhead (numbering, newline, safety margin).
const PER_MEMORY_OVERHEAD_TOKENS: usize = 10;

/// Known context window sizes by model-id prefix. Longest prefix wins.
const MODEL_CONTEXT_TABLE: &[(&str, usize)] = &[
    ("gpt-4-32k", 32_768),
    ("gpt-4-turbo", 128_000),
    ("gpt-4o", 128_000),
    ("gpt-4", 8_192),
    ("claude-3", 200_000),
    ("deepseek-chat", 64_000),
    ("deepseek-coder", 16_000),
    ("moonshot-v1", 32_000),
    ("qwen-max", 32_000),
    ("qwen-plus", 32_000),
    ("abab6.5s-chat", 32_000),
];

/// Context window assumed when the model id matches nothing.
const DEFAULT_CONTEXT_WINDOW: usize = 8_192;

/// Result of one context build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextBuildResult {
    /// The wrapped injection text; empty when nothing was selected.
    pub text: String,
    /// Memories included in the text.
    pub injected_count: usize,
    /// Memories offered.
    pub total: usize,
    /// Token estimate for the emitted text (wrapper included).
    pub estimated_tokens: usize,
    /// True when at least one offered memory was left out.
    pub truncated: bool,
}

impl ContextBuildResult {
    fn empty(total: usize) -> Self {
        Self {
            text: String::new(),
            injected_count: 0,
            total,
            estimated_tokens: 0,
            truncated: false,
        }
    }
}

/// Options for one build.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Target model id, used for the context-window lookup.
    pub model_id: String,
    /// Optional hard cap on injected memories.
    pub max_memories: Option<usize>,
}

/// Token-budgeted context assembler.
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    ratio: f64,
    min_budget: usize,
    max_budget: usize,
}

impl ContextBuilder {
    pub fn new(config: &ContextConfig) -> Self {
        Self {
            ratio: config.token_budget_ratio,
            min_budget: config.token_budget_min,
            max_budget: config.token_budget_max,
        }
    }

    /// Token budget for a model id: `clamp(floor(ctx * ratio), min, max)`.
    pub fn budget_for(&self, model_id: &str) -> usize {
        let ctx = model_context_window(model_id);
        let raw = (ctx as f64 * self.ratio).floor() as usize;
        raw.clamp(self.min_budget, self.max_budget)
    }

    /// Selects and serializes memories within the model's budget.
    pub fn build(&self, memories: &[Memory], opts: &BuildOptions) -> ContextBuildResult {
        let total = memories.len();
        if total == 0 {
            return ContextBuildResult::empty(0);
        }

        let budget = self.budget_for(&opts.model_id);
        let cap = opts.max_memories.unwrap_or(usize::MAX);

        let mut sorted: Vec<&Memory> = memories.iter().collect();
        sorted.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });

        let mut used = WRAPPER_OVERHEAD_TOKENS;
        let mut selected: Vec<String> = Vec::new();
        for memory in &sorted {
            if selected.len() >= cap {
                break;
            }
            let cost = estimate_tokens(&memory.text) + PER_MEMORY_OVERHEAD_TOKENS;
            if used + cost > budget {
                break;
            }
            used += cost;
            selected.push(memory.text.clone());
        }

        // A single memory larger than the whole budget still gets injected,
        // cut down to fit.
        if selected.is_empty() {
            let first = sorted[0];
            let keep_chars = 2 * budget.saturating_sub(70);
            let mut clipped: String = first.text.chars().take(keep_chars).collect();
            clipped.push('…');
            return ContextBuildResult {
                text: wrap(&[clipped]),
                injected_count: 1,
                total,
                estimated_tokens: budget,
                truncated: total > 1,
            };
        }

        let injected_count = selected.len();
        ContextBuildResult {
            text: wrap(&selected),
            injected_count,
            total,
            estimated_tokens: used,
            truncated: injected_count < total,
        }
    }
}

fn wrap(items: &[String]) -> String {
    let mut out = String::from("<relevant-memories>\n");
    for (i, item) in items.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, item));
    }
    out.push_str("</relevant-memories>");
    out
}

/// Rough token estimate: CJK code points weigh 1/1.5, everything else 1/4.
pub fn estimate_tokens(s: &str) -> usize {
    let chinese = s
        .chars()
        .filter(|c| ('\u{4e00}'..='\u{9fff}').contains(c))
        .count();
    let other = s.chars().count() - chinese;
    (chinese as f64 / 1.5 + other as f64 / 4.0).ceil() as usize
}

/// Longest-prefix lookup into the known model table.
pub fn model_context_window(model_id: &str) -> usize {
    MODEL_CONTEXT_TABLE
        .iter()
        .filter(|(prefix, _)| model_id.starts_with(prefix))
        .max_by_key(|(prefix, _)| prefix.len())
        .map(|(_, ctx)| *ctx)
        .unwrap_or(DEFAULT_CONTEXT_WINDOW)
}
