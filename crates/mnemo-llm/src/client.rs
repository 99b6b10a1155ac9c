// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client implementing the `LanguageModel` contract over every
//! supported provider variant.
//!
//! Handles request shaping per vendor, authentication headers, a single
//! retry on transient errors (429, 500, 503), and the JSON-mode fallback
//! for backends without native structured output.

use std::time::Duration;

use async_trait::async_trait;
use mnemo_config::LanguageModelConfig;
use mnemo_core::{ChatMessage, GenerateOptions, LanguageModel, MnemoError};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::clean::extract_json_value;
use crate::normalize::{normalize, Provider, ANTHROPIC_VERSION};

/// Request timeout for a single completion call.
const GENERATE_TIMEOUT: Duration = Duration::from_secs(60);

/// Instruction appended to the last user message when the backend has no
/// native JSON mode.
const JSON_ONLY_INSTRUCTION: &str =
    "Respond with a single valid JSON value only. No prose, no markdown fences, no explanation.";

/// HTTP-backed language model over one normalized provider.
pub struct HttpLanguageModel {
    client: reqwest::Client,
    provider: Provider,
    max_retries: u32,
}

impl HttpLanguageModel {
    /// Builds a client for the configured provider.
    pub fn new(config: &LanguageModelConfig) -> Result<Self, MnemoError> {
        let client = reqwest::Client::builder()
            .timeout(GENERATE_TIMEOUT)
            .build()
            .map_err(|e| MnemoError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            provider: normalize(config),
            max_retries: 1,
        })
    }

    /// Model identifier this client calls.
    pub fn model(&self) -> &str {
        self.provider.model()
    }

    fn build_request(
        &self,
        messages: &[ChatMessage],
        opts: &GenerateOptions,
    ) -> reqwest::RequestBuilder {
        match &self.provider {
            Provider::OpenAiCompatible {
                url,
                api_key,
                model,
                headers,
                json_mode_support,
            } => {
                let mut body = json!({
                    "model": model,
                    "messages": messages,
                    "stream": false,
                });
                if let Some(t) = opts.temperature {
                    body["temperature"] = json!(t);
                }
                if let Some(m) = opts.max_tokens {
                    body["max_tokens"] = json!(m);
                }
                if opts.json_mode && *json_mode_support {
                    body["response_format"] = json!({"type": "json_object"});
                }

                let mut req = self.client.post(url).json(&body);
                if let Some(key) = api_key {
                    req = req.bearer_auth(key);
                }
                for (name, value) in headers {
                    req = req.header(name, value);
                }
                req
            }
            Provider::Anthropic {
                url,
                api_key,
                model,
            } => {
                let system: Vec<&str> = messages
                    .iter()
                    .filter(|m| m.role == "system")
                    .map(|m| m.content.as_str())
                    .collect();
                let turns: Vec<&ChatMessage> =
                    messages.iter().filter(|m| m.role != "system").collect();

                let mut body = json!({
                    "model": model,
                    "max_tokens": opts.max_tokens.unwrap_or(1024),
                    "messages": turns,
                });
                if !system.is_empty() {
                    body["system"] = json!(system.join("\n\n"));
                }
                if let Some(t) = opts.temperature {
                    body["temperature"] = json!(t);
                }

                self.client
                    .post(url)
                    .header("x-api-key", api_key)
                    .header("anthropic-version", ANTHROPIC_VERSION)
                    .json(&body)
            }
            Provider::Gemini { url, api_key, .. } => {
                let system: Vec<&str> = messages
                    .iter()
                    .filter(|m| m.role == "system")
                    .map(|m| m.content.as_str())
                    .collect();
                let contents: Vec<serde_json::Value> = messages
                    .iter()
                    .filter(|m| m.role != "system")
                    .map(|m| {
                        json!({
                            "role": if m.role == "assistant" { "model" } else { "user" },
                            "parts": [{"text": m.content}],
                        })
                    })
                    .collect();

                let mut body = json!({ "contents": contents });
                if !system.is_empty() {
                    body["systemInstruction"] = json!({"parts": [{"text": system.join("\n\n")}]});
                }
                let mut generation = serde_json::Map::new();
                if let Some(t) = opts.temperature {
                    generation.insert("temperature".to_string(), json!(t));
                }
                if let Some(m) = opts.max_tokens {
                    generation.insert("maxOutputTokens".to_string(), json!(m));
                }
                if !generation.is_empty() {
                    body["generationConfig"] = serde_json::Value::Object(generation);
                }

                self.client.post(url).query(&[("key", api_key)]).json(&body)
            }
            Provider::Minimax {
                url,
                api_key,
                model,
                group_id,
            } => {
                let mut body = json!({
                    "model": model,
                    "messages": messages,
                    "stream": false,
                });
                if let Some(t) = opts.temperature {
                    body["temperature"] = json!(t);
                }
                if let Some(m) = opts.max_tokens {
                    body["max_tokens"] = json!(m);
                }

                let mut req = self.client.post(url).bearer_auth(api_key).json(&body);
                if let Some(group) = group_id {
                    req = req.query(&[("GroupId", group)]);
                }
                req
            }
        }
    }

    fn parse_response(&self, body: &str) -> Result<String, MnemoError> {
        let text = match &self.provider {
            Provider::OpenAiCompatible { .. } | Provider::Minimax { .. } => {
                let parsed: OpenAiResponse = serde_json::from_str(body)
                    .map_err(|e| MnemoError::language_model(0, &format!("bad response: {e}")))?;
                parsed
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.message.content)
                    .unwrap_or_default()
            }
            Provider::Anthropic { .. } => {
                let parsed: AnthropicResponse = serde_json::from_str(body)
                    .map_err(|e| MnemoError::language_model(0, &format!("bad response: {e}")))?;
                parsed
                    .content
                    .into_iter()
                    .filter_map(|block| block.text)
                    .collect::<Vec<_>>()
                    .join("")
            }
            Provider::Gemini { .. } => {
                let parsed: GeminiResponse = serde_json::from_str(body)
                    .map_err(|e| MnemoError::language_model(0, &format!("bad response: {e}")))?;
                parsed
                    .candidates
                    .into_iter()
                    .next()
                    .map(|c| {
                        c.content
                            .parts
                            .into_iter()
                            .filter_map(|p| p.text)
                            .collect::<Vec<_>>()
                            .join("")
                    })
                    .unwrap_or_default()
            }
        };
        Ok(text)
    }
}

#[async_trait]
impl LanguageModel for HttpLanguageModel {
    async fn generate(
        &self,
        messages: &[ChatMessage],
        opts: GenerateOptions,
    ) -> Result<String, MnemoError> {
        let mut messages = messages.to_vec();
        if opts.json_mode && !self.provider.native_json_mode() {
            match messages.iter_mut().rev().find(|m| m.role == "user") {
                Some(last_user) => {
                    last_user.content.push_str("\n\n");
                    last_user.content.push_str(JSON_ONLY_INSTRUCTION);
                }
                None => messages.push(ChatMessage::user(JSON_ONLY_INSTRUCTION)),
            }
        }

        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                warn!(attempt, "retrying completion request after transient error");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }

            let response = match self.build_request(&messages, &opts).send().await {
                Ok(r) => r,
                Err(e) if e.is_timeout() => {
                    return Err(MnemoError::Timeout {
                        duration: GENERATE_TIMEOUT,
                    })
                }
                Err(e) => return Err(MnemoError::language_model(0, &e.to_string())),
            };

            let status = response.status();
            debug!(status = %status, attempt, "completion response received");

            if status.is_success() {
                let body = response
                    .text()
                    .await
                    .map_err(|e| MnemoError::language_model(0, &e.to_string()))?;
                let raw = self.parse_response(&body)?;
                if opts.json_mode {
                    return Ok(extract_json_value(&raw));
                }
                return Ok(raw);
            }

            let body = response.text().await.unwrap_or_default();
            if is_transient(status.as_u16()) && attempt < self.max_retries {
                warn!(status = %status, "transient error, will retry");
                last_error = Some(MnemoError::language_model(status.as_u16(), &body));
                continue;
            }
            return Err(MnemoError::language_model(status.as_u16(), &body));
        }

        Err(last_error
            .unwrap_or_else(|| MnemoError::language_model(0, "request failed after retries")))
    }
}

fn is_transient(status: u16) -> bool {
    matches!(status, 429 | 500 | 503)
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<AnthropicBlock>,
}

#[derive(Debug, Deserialize)]
struct AnthropicBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
}
