// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable scheduler of time-delayed proactive actions.
//!
//! Recent exchanges are inspected for latent intent (reminders,
//! follow-ups); a positive verdict becomes a [`PendingAction`] persisted
//! write-through to a single JSON file. `poll` hands out due actions at
//! most once; failed deliveries re-arm via `mark_failed`. The state
//! mutex makes observe/poll/mark_failed linearizable with each other.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use mnemo_config::ReflectionConfig;
use mnemo_core::{ChatMessage, GenerateOptions, LanguageModel, Memory, MnemoError, PendingAction, TurnMessage};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Fixed instruction template for the reflection verdict.
const REFLECTION_PROMPT: &str = r#"You review a recent conversation for latent intent worth a proactive follow-up: reminders the user asked for, deadlines they mentioned, things they said they would do.

Respond with a JSON object: {"should_act": boolean, "message": string, "delay_minutes": number}
- "should_act": true only when a concrete, useful follow-up exists
- "message": the proactive message to deliver, written in the user's language
- "delay_minutes": minutes from now to deliver it (0 means the next turn)

Conversation:
{conversation}

Known facts about the user:
{memories}"#;

/// Verdict shape requested from the language model.
#[derive(Debug, Default, Deserialize)]
struct ReflectionVerdict {
    #[serde(default)]
    should_act: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    delay_minutes: Option<f64>,
}

/// Durable delayed-action queue.
pub struct Reflection {
    path: PathBuf,
    llm: Option<Arc<dyn LanguageModel>>,
    actions: Mutex<Vec<PendingAction>>,
    ttl: Duration,
    max_pending: usize,
}

impl Reflection {
    /// Loads state from `path`; a corrupt or missing file yields an
    /// empty queue.
    pub fn new(
        path: PathBuf,
        llm: Option<Arc<dyn LanguageModel>>,
        config: &ReflectionConfig,
    ) -> Self {
        let actions = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<Vec<PendingAction>>(&raw) {
                Ok(actions) => actions,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "corrupt action file, starting empty");
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };

        Self {
            path,
            llm,
            actions: Mutex::new(actions),
            ttl: Duration::milliseconds(config.action_ttl_ms as i64),
            max_pending: config.max_pending_actions,
        }
    }

    /// Inspects a conversation batch for latent intent.
    ///
    /// Called by the coordinator after a successful non-empty ingest.
    /// Silent without a configured language model; model failures are
    /// non-fatal and yield no action.
    pub async fn observe(
        &self,
        messages: &[TurnMessage],
        recent_memories: &[Memory],
    ) -> Result<Option<PendingAction>, MnemoError> {
        let Some(llm) = &self.llm else {
            return Ok(None);
        };

        if self.unfired_count().await >= self.max_pending {
            warn!(max = self.max_pending, "pending action cap reached, skipping reflection");
            return Ok(None);
        }

        let conversation = messages
            .iter()
            .map(|m| format!("{}: {}", m.role, m.text))
            .collect::<Vec<_>>()
            .join("\n");
        let memories = if recent_memories.is_empty() {
            "(none)".to_string()
        } else {
            recent_memories
                .iter()
                .map(|m| format!("- {}", m.text))
                .collect::<Vec<_>>()
                .join("\n")
        };
        let prompt = REFLECTION_PROMPT
            .replace("{conversation}", &conversation)
            .replace("{memories}", &memories);

        let raw = match llm
            .generate(
                &[ChatMessage::user(prompt)],
                GenerateOptions {
                    json_mode: true,
                    temperature: Some(0.3),
                    max_tokens: Some(200),
                },
            )
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "reflection model call failed");
                return Ok(None);
            }
        };

        let verdict: ReflectionVerdict = serde_json::from_str(&raw).unwrap_or_default();
        let message = match (&verdict.should_act, verdict.message.as_deref()) {
            (true, Some(message)) if !message.trim().is_empty() => message.trim().to_string(),
            _ => {
                debug!("reflection verdict: nothing to schedule");
                return Ok(None);
            }
        };

        let now = Utc::now();
        let delay_minutes = verdict.delay_minutes.unwrap_or(0.0).max(0.0);
        let action = PendingAction {
            id: action_id(now),
            message,
            created_at: now,
            trigger_at: now + Duration::milliseconds((delay_minutes * 60_000.0) as i64),
            fired: false,
            delivery_attempts: 0,
        };

        let mut actions = self.actions.lock().await;
        if actions.iter().filter(|a| !a.fired).count() >= self.max_pending {
            warn!(max = self.max_pending, "pending action cap reached, dropping new action");
            return Ok(None);
        }
        actions.push(action.clone());
        self.persist(&actions).await?;
        info!(id = %action.id, trigger_at = %action.trigger_at, "scheduled proactive action");
        Ok(Some(action))
    }

    /// `poll` at the current instant.
    pub async fn poll(&self) -> Result<Option<PendingAction>, MnemoError> {
        self.poll_at(Utc::now()).await
    }

    /// Prunes expired entries, then hands out the first due unfired action.
    ///
    /// The returned action has its `fired` bit set before this returns,
    /// which is what makes delivery at-most-once. A fired entry stays in
    /// the queue (inert) until `complete` removes it or `mark_failed`
    /// re-arms it, so a delivery failure discovered later can still
    /// resurrect it.
    pub async fn poll_at(&self, now: DateTime<Utc>) -> Result<Option<PendingAction>, MnemoError> {
        let mut actions = self.actions.lock().await;

        let before = actions.len();
        let ttl = self.ttl;
        actions.retain(|a| now - a.created_at < ttl);
        if actions.len() != before {
            debug!(pruned = before - actions.len(), "pruned expired actions");
            self.persist(&actions).await?;
        }

        let due = actions
            .iter_mut()
            .find(|a| !a.fired && a.trigger_at <= now);
        match due {
            Some(action) => {
                action.fired = true;
                let fired = action.clone();
                self.persist(&actions).await?;
                Ok(Some(fired))
            }
            None => Ok(None),
        }
    }

    /// Removes an action after a confirmed delivery. Terminal state.
    pub async fn complete(&self, id: &str) -> Result<bool, MnemoError> {
        let mut actions = self.actions.lock().await;
        let before = actions.len();
        actions.retain(|a| a.id != id);
        if actions.len() == before {
            return Ok(false);
        }
        self.persist(&actions).await?;
        Ok(true)
    }

    /// Re-arms a fired action after a failed delivery attempt.
    pub async fn mark_failed(&self, id: &str) -> Result<bool, MnemoError> {
        let mut actions = self.actions.lock().await;
        let Some(action) = actions.iter_mut().find(|a| a.id == id) else {
            return Ok(false);
        };
        action.fired = false;
        action.delivery_attempts += 1;
        self.persist(&actions).await?;
        Ok(true)
    }

    /// Actions currently queued (fired or not).
    pub async fn pending_count(&self) -> usize {
        self.actions.lock().await.len()
    }

    /// Actions awaiting their trigger.
    pub async fn unfired_count(&self) -> usize {
        self.actions
            .lock()
            .await
            .iter()
            .filter(|a| !a.fired)
            .count()
    }

    async fn persist(&self, actions: &[PendingAction]) -> Result<(), MnemoError> {
        let json = serde_json::to_string_pretty(actions)
            .map_err(|e| MnemoError::Internal(format!("serialize actions: {e}")))?;
        tokio::fs::write(&self.path, json).await.map_err(|e| {
            MnemoError::Internal(format!("write {}: {e}", self.path.display()))
        })
    }
}

/// `action_{unix_ms}_{random6}`.
fn action_id(now: DateTime<Utc>) -> String {
    let suffix: String = Uuid::new_v4().simple().to_string().chars().take(6).collect();
    format!("action_{}_{}", now.timestamp_millis(), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemo_test_utils::MockLanguageModel;

    fn config() -> ReflectionConfig {
        ReflectionConfig::default()
    }

    fn reflection_with(
        dir: &tempfile::TempDir,
        llm: Option<Arc<MockLanguageModel>>,
    ) -> Reflection {
        Reflection::new(
            dir.path().join("mem0-actions.json"),
            llm.map(|l| l as Arc<dyn LanguageModel>),
            &config(),
        )
    }

    fn turns() -> Vec<TurnMessage> {
        vec![
            TurnMessage::new("user", "Remind me tomorrow about the deploy."),
            TurnMessage::new("assistant", "Will do."),
        ]
    }

    #[test]
    fn action_id_shape() {
        let id = action_id(Utc::now());
        assert!(id.starts_with("action_"));
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[2].len(), 6);
    }

    #[tokio::test]
    async fn observe_without_model_is_silent() {
        let dir = tempfile::tempdir().unwrap();
        let reflection = reflection_with(&dir, None);
        let out = reflection.observe(&turns(), &[]).await.unwrap();
        assert!(out.is_none());
        assert_eq!(reflection.pending_count().await, 0);
    }

    #[tokio::test]
    async fn observe_schedules_action_with_delay() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(MockLanguageModel::with_responses(vec![
            r#"{"should_act": true, "message": "Ping me tomorrow about the deploy.", "delay_minutes": 1440}"#.to_string(),
        ]));
        let reflection = reflection_with(&dir, Some(llm.clone()));

        let action = reflection.observe(&turns(), &[]).await.unwrap().unwrap();
        assert_eq!(action.message, "Ping me tomorrow about the deploy.");
        assert!(!action.fired);
        assert_eq!(
            (action.trigger_at - action.created_at).num_minutes(),
            1440
        );

        // The reflection call used JSON mode with the documented knobs.
        let requests = llm.requests();
        assert!(requests[0].1.json_mode);
        assert_eq!(requests[0].1.temperature, Some(0.3));
        assert_eq!(requests[0].1.max_tokens, Some(200));
    }

    #[tokio::test]
    async fn zero_delay_triggers_at_creation() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(MockLanguageModel::with_responses(vec![
            r#"{"should_act": true, "message": "now", "delay_minutes": 0}"#.to_string(),
        ]));
        let reflection = reflection_with(&dir, Some(llm));
        let action = reflection.observe(&turns(), &[]).await.unwrap().unwrap();
        assert_eq!(action.trigger_at, action.created_at);
    }

    #[tokio::test]
    async fn negative_delay_clamps_to_zero() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(MockLanguageModel::with_responses(vec![
            r#"{"should_act": true, "message": "now", "delay_minutes": -30}"#.to_string(),
        ]));
        let reflection = reflection_with(&dir, Some(llm));
        let action = reflection.observe(&turns(), &[]).await.unwrap().unwrap();
        assert_eq!(action.trigger_at, action.created_at);
    }

    #[tokio::test]
    async fn declined_or_empty_verdicts_schedule_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(MockLanguageModel::with_responses(vec![
            r#"{"should_act": false}"#.to_string(),
            r#"{"should_act": true, "message": "   "}"#.to_string(),
            "{}".to_string(),
        ]));
        let reflection = reflection_with(&dir, Some(llm));
        for _ in 0..3 {
            assert!(reflection.observe(&turns(), &[]).await.unwrap().is_none());
        }
        assert_eq!(reflection.pending_count().await, 0);
    }

    #[tokio::test]
    async fn model_failure_is_non_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(MockLanguageModel::new());
        llm.set_failing(true);
        let reflection = reflection_with(&dir, Some(llm));
        assert!(reflection.observe(&turns(), &[]).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn poll_fires_at_most_once_until_marked_failed() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(MockLanguageModel::with_responses(vec![
            r#"{"should_act": true, "message": "Ping me tomorrow about the deploy.", "delay_minutes": 1440}"#.to_string(),
        ]));
        let reflection = reflection_with(&dir, Some(llm));
        let action = reflection.observe(&turns(), &[]).await.unwrap().unwrap();
        let t0 = action.created_at;

        // One second before the trigger: nothing.
        let early = t0 + Duration::hours(24) - Duration::seconds(1);
        assert!(reflection.poll_at(early).await.unwrap().is_none());

        // One second after: fired exactly once.
        let due = t0 + Duration::hours(24) + Duration::seconds(1);
        let fired = reflection.poll_at(due).await.unwrap().unwrap();
        assert_eq!(fired.id, action.id);
        assert!(fired.fired);
        assert!(reflection.poll_at(due).await.unwrap().is_none());

        // Failed delivery re-arms it.
        assert!(reflection.mark_failed(&action.id).await.unwrap());
        let again = reflection.poll_at(due).await.unwrap().unwrap();
        assert_eq!(again.id, action.id);
        assert_eq!(again.delivery_attempts, 1);
    }

    #[tokio::test]
    async fn poll_prunes_expired_actions() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(MockLanguageModel::with_responses(vec![
            r#"{"should_act": true, "message": "old", "delay_minutes": 0}"#.to_string(),
        ]));
        let reflection = reflection_with(&dir, Some(llm));
        let action = reflection.observe(&turns(), &[]).await.unwrap().unwrap();

        // Past the TTL the action is gone without ever firing.
        let late = action.created_at + Duration::days(8);
        assert!(reflection.poll_at(late).await.unwrap().is_none());
        assert_eq!(reflection.pending_count().await, 0);
    }

    #[tokio::test]
    async fn state_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(MockLanguageModel::with_responses(vec![
            r#"{"should_act": true, "message": "durable", "delay_minutes": 60}"#.to_string(),
        ]));
        {
            let reflection = reflection_with(&dir, Some(llm));
            reflection.observe(&turns(), &[]).await.unwrap().unwrap();
        }
        let reloaded = reflection_with(&dir, None);
        assert_eq!(reloaded.pending_count().await, 1);
    }

    #[tokio::test]
    async fn corrupt_state_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("mem0-actions.json"), "{broken").unwrap();
        let reflection = reflection_with(&dir, None);
        assert_eq!(reflection.pending_count().await, 0);
    }

    #[tokio::test]
    async fn pending_cap_refuses_new_actions() {
        let dir = tempfile::tempdir().unwrap();
        let responses: Vec<String> = (0..25)
            .map(|i| {
                format!(r#"{{"should_act": true, "message": "m{i}", "delay_minutes": 60}}"#)
            })
            .collect();
        let llm = Arc::new(MockLanguageModel::with_responses(responses));
        let reflection = reflection_with(&dir, Some(llm));

        for _ in 0..25 {
            let _ = reflection.observe(&turns(), &[]).await.unwrap();
        }
        assert_eq!(reflection.unfired_count().await, 20);
    }

    #[tokio::test]
    async fn complete_removes_delivered_action() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(MockLanguageModel::with_responses(vec![
            r#"{"should_act": true, "message": "done soon", "delay_minutes": 0}"#.to_string(),
        ]));
        let reflection = reflection_with(&dir, Some(llm));
        let action = reflection.observe(&turns(), &[]).await.unwrap().unwrap();

        let fired = reflection.poll().await.unwrap().unwrap();
        assert_eq!(fired.id, action.id);
        assert!(reflection.complete(&action.id).await.unwrap());
        assert_eq!(reflection.pending_count().await, 0);
        // Completed means gone for good.
        assert!(!reflection.mark_failed(&action.id).await.unwrap());
    }

    #[tokio::test]
    async fn mark_failed_unknown_id_is_false() {
        let dir = tempfile::tempdir().unwrap();
        let reflection = reflection_with(&dir, None);
        assert!(!reflection.mark_failed("action_0_zzzzzz").await.unwrap());
    }
}
