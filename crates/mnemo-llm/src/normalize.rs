// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Normalization of raw provider settings into ready-to-call endpoints.
//!
//! Users paste base URLs in every imaginable shape; this pass fills
//! vendor defaults, strips trailing `/chat/completions`, and ensures the
//! `/v1` suffix where the vendor requires it, so the client never has to
//! second-guess a URL at request time.

use std::collections::BTreeMap;

use mnemo_config::LanguageModelConfig;

/// Default Anthropic API endpoint base.
const ANTHROPIC_BASE: &str = "https://api.anthropic.com";
/// Anthropic API version header value.
pub const ANTHROPIC_VERSION: &str = "2023-06-01";
/// Default Gemini API endpoint base.
const GEMINI_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
/// Default MiniMax chat completion endpoint.
const MINIMAX_URL: &str = "https://api.minimax.chat/v1/text/chatcompletion_v2";

/// A provider with its request URL fully resolved.
#[derive(Debug, Clone)]
pub enum Provider {
    /// OpenAI-compatible chat-completions endpoint (also used for Ollama).
    OpenAiCompatible {
        /// Full `/chat/completions` URL.
        url: String,
        api_key: Option<String>,
        model: String,
        headers: BTreeMap<String, String>,
        /// Whether `response_format: json_object` is honored natively.
        json_mode_support: bool,
    },
    /// Anthropic Messages API.
    Anthropic {
        /// Full `/v1/messages` URL.
        url: String,
        api_key: String,
        model: String,
    },
    /// Google Gemini `generateContent` endpoint.
    Gemini {
        /// Full `models/{model}:generateContent` URL, without the key.
        url: String,
        api_key: String,
        model: String,
    },
    /// MiniMax chat completion endpoint.
    Minimax {
        url: String,
        api_key: String,
        model: String,
        group_id: Option<String>,
    },
}

impl Provider {
    /// Model identifier the provider was configured with.
    pub fn model(&self) -> &str {
        match self {
            Provider::OpenAiCompatible { model, .. } => model,
            Provider::Anthropic { model, .. } => model,
            Provider::Gemini { model, .. } => model,
            Provider::Minimax { model, .. } => model,
        }
    }

    /// Whether the backend natively enforces JSON output.
    pub fn native_json_mode(&self) -> bool {
        matches!(
            self,
            Provider::OpenAiCompatible {
                json_mode_support: true,
                ..
            }
        )
    }
}

/// Resolves raw config into a provider with a ready request URL.
pub fn normalize(config: &LanguageModelConfig) -> Provider {
    match config {
        LanguageModelConfig::OpenaiCompatible {
            base_url,
            api_key,
            model,
            headers,
            json_mode_support,
        } => Provider::OpenAiCompatible {
            url: format!("{}/chat/completions", normalize_openai_base(base_url)),
            api_key: api_key.clone(),
            model: model.clone(),
            headers: headers.clone(),
            json_mode_support: *json_mode_support,
        },
        LanguageModelConfig::Ollama { url, model } => Provider::OpenAiCompatible {
            // Ollama exposes an OpenAI-compatible surface under /v1 but
            // does not honor response_format.
            url: format!("{}/chat/completions", normalize_openai_base(url)),
            api_key: None,
            model: model.clone(),
            headers: BTreeMap::new(),
            json_mode_support: false,
        },
        LanguageModelConfig::Anthropic {
            api_key,
            model,
            base_url,
        } => {
            let base = base_url
                .as_deref()
                .unwrap_or(ANTHROPIC_BASE)
                .trim_end_matches('/')
                .to_string();
            let base = base
                .strip_suffix("/v1/messages")
                .or_else(|| base.strip_suffix("/v1"))
                .unwrap_or(&base)
                .to_string();
            Provider::Anthropic {
                url: format!("{base}/v1/messages"),
                api_key: api_key.clone(),
                model: model.clone(),
            }
        }
        LanguageModelConfig::Gemini { api_key, model } => Provider::Gemini {
            url: format!("{GEMINI_BASE}/models/{model}:generateContent"),
            api_key: api_key.clone(),
            model: model.clone(),
        },
        LanguageModelConfig::Minimax {
            api_key,
            model,
            group_id,
        } => Provider::Minimax {
            url: MINIMAX_URL.to_string(),
            api_key: api_key.clone(),
            model: model.clone(),
            group_id: group_id.clone(),
        },
    }
}

/// Reduces any pasted OpenAI-style URL to a clean `.../v1` base.
fn normalize_openai_base(raw: &str) -> String {
    let mut base = raw.trim().trim_end_matches('/').to_string();
    if let Some(stripped) = base.strip_suffix("/chat/completions") {
        base = stripped.to_string();
    }
    if !base.ends_with("/v1") {
        base.push_str("/v1");
    }
    base
}
