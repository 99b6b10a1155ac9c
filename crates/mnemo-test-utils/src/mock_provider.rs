// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock language model with pre-configured responses.
//!
//! Responses pop from a FIFO queue; an empty queue yields `{}` so
//! JSON-mode callers never see unparsable output by accident. Every
//! request is recorded for assertion.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use mnemo_core::{ChatMessage, GenerateOptions, LanguageModel, MnemoError};

/// A mock language model that returns canned responses in order.
pub struct MockLanguageModel {
    responses: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<(Vec<ChatMessage>, GenerateOptions)>>,
    fail: AtomicBool,
}

impl MockLanguageModel {
    /// Creates a mock with an empty response queue.
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }

    /// Creates a mock pre-loaded with the given responses.
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::from(responses)),
            requests: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }

    /// Appends a response to the queue.
    pub fn add_response(&self, text: impl Into<String>) {
        self.responses.lock().unwrap().push_back(text.into());
    }

    /// Makes every subsequent call fail with a 503.
    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    /// Requests observed so far.
    pub fn requests(&self) -> Vec<(Vec<ChatMessage>, GenerateOptions)> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of calls observed.
    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Default for MockLanguageModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LanguageModel for MockLanguageModel {
    async fn generate(
        &self,
        messages: &[ChatMessage],
        opts: GenerateOptions,
    ) -> Result<String, MnemoError> {
        self.requests
            .lock()
            .unwrap()
            .push((messages.to_vec(), opts));

        if self.fail.load(Ordering::SeqCst) {
            return Err(MnemoError::language_model(503, "mock provider failure"));
        }

        Ok(self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| "{}".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn responses_return_in_order_then_default() {
        let model = MockLanguageModel::with_responses(vec![
            "first".to_string(),
            "second".to_string(),
        ]);
        let req = [ChatMessage::user("hi")];
        assert_eq!(
            model.generate(&req, GenerateOptions::default()).await.unwrap(),
            "first"
        );
        assert_eq!(
            model.generate(&req, GenerateOptions::default()).await.unwrap(),
            "second"
        );
        assert_eq!(
            model.generate(&req, GenerateOptions::default()).await.unwrap(),
            "{}"
        );
    }

    #[tokio::test]
    async fn requests_are_recorded() {
        let model = MockLanguageModel::new();
        model
            .generate(
                &[ChatMessage::user("observe me")],
                GenerateOptions {
                    json_mode: true,
                    temperature: Some(0.3),
                    max_tokens: Some(200),
                },
            )
            .await
            .unwrap();

        let requests = model.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].0[0].content.contains("observe me"));
        assert!(requests[0].1.json_mode);
        assert_eq!(requests[0].1.max_tokens, Some(200));
    }

    #[tokio::test]
    async fn failing_mode_returns_language_model_error() {
        let model = MockLanguageModel::new();
        model.set_failing(true);
        let err = model
            .generate(&[ChatMessage::user("hi")], GenerateOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MnemoError::LanguageModel { status: 503, .. }
        ));
    }
}
