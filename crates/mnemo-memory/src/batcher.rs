// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Debounced batching of observed conversation turns.
//!
//! Turns accumulate per session key; a debounce timer re-arms on every
//! schedule and hands the compacted batch to the ingest sink when it
//! fires. Within one buffer delivery order equals observation order;
//! across buffers nothing is guaranteed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mnemo_core::{MnemoError, TurnMessage};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Buffer key used when no session id is present.
const GLOBAL_KEY: &str = "__global__";

/// Receiver of flushed capture batches.
///
/// The lifecycle coordinator implements this to chain ingestion and the
/// reflection pass without the batcher knowing about either.
#[async_trait]
pub trait IngestSink: Send + Sync {
    async fn deliver(
        &self,
        session_id: Option<String>,
        messages: Vec<TurnMessage>,
    ) -> Result<(), MnemoError>;
}

struct Buffer {
    session_id: Option<String>,
    messages: Vec<TurnMessage>,
    timer: Option<JoinHandle<()>>,
}

struct BatcherInner {
    buffers: Mutex<HashMap<String, Buffer>>,
    /// Serializes deliveries so `flush_all` can wait out in-flight flushes.
    delivery_gate: Mutex<()>,
    window: Duration,
    max_messages: usize,
    sink: Arc<dyn IngestSink>,
}

/// Per-session debounce buffers feeding the ingest sink.
#[derive(Clone)]
pub struct CaptureBatcher {
    inner: Arc<BatcherInner>,
}

impl CaptureBatcher {
    pub fn new(window: Duration, max_messages: usize, sink: Arc<dyn IngestSink>) -> Self {
        Self {
            inner: Arc::new(BatcherInner {
                buffers: Mutex::new(HashMap::new()),
                delivery_gate: Mutex::new(()),
                window,
                max_messages,
                sink,
            }),
        }
    }

    /// Appends messages to the session's buffer and re-arms its timer.
    ///
    /// Overflow beyond the configured cap drops the oldest entries.
    pub async fn schedule(&self, session_id: Option<String>, messages: Vec<TurnMessage>) {
        if messages.is_empty() {
            return;
        }
        let key = buffer_key(session_id.as_deref());

        let mut buffers = self.inner.buffers.lock().await;
        let buffer = buffers.entry(key.clone()).or_insert_with(|| Buffer {
            session_id: session_id.clone(),
            messages: Vec::new(),
            timer: None,
        });
        buffer.messages.extend(messages);
        let max = self.inner.max_messages;
        if buffer.messages.len() > max {
            let drop = buffer.messages.len() - max;
            buffer.messages.drain(..drop);
        }

        if let Some(timer) = buffer.timer.take() {
            timer.abort();
        }
        let batcher = self.clone();
        let window = self.inner.window;
        let timer_key = key.clone();
        buffer.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(window).await;
            batcher.flush(&timer_key).await;
        }));
    }

    /// Flushes one buffer: detach, compact, deliver.
    ///
    /// Delivery failures are logged and the batch discarded; the raw
    /// turns are not re-queued.
    pub async fn flush(&self, key: &str) {
        let detached = {
            let mut buffers = self.inner.buffers.lock().await;
            buffers.remove(key)
        };
        let Some(mut buffer) = detached else { return };
        if let Some(timer) = buffer.timer.take() {
            timer.abort();
        }

        let batch = compact(buffer.messages, self.inner.max_messages);
        if batch.is_empty() {
            return;
        }

        let _gate = self.inner.delivery_gate.lock().await;
        debug!(key, count = batch.len(), "flushing capture batch");
        if let Err(e) = self.inner.sink.deliver(buffer.session_id, batch).await {
            warn!(key, error = %e, "capture batch ingestion failed, batch discarded");
        }
    }

    /// Drains every buffer and waits for in-flight flushes. Shutdown path.
    pub async fn flush_all(&self) {
        let keys: Vec<String> = {
            let buffers = self.inner.buffers.lock().await;
            buffers.keys().cloned().collect()
        };
        for key in keys {
            self.flush(&key).await;
        }
        // A timer-initiated flush may already hold the gate; taking it
        // once more means it has completed before we return.
        let _gate = self.inner.delivery_gate.lock().await;
    }

    /// Number of currently buffered sessions (testing and stats).
    pub async fn buffered_sessions(&self) -> usize {
        self.inner.buffers.lock().await.len()
    }
}

fn buffer_key(session_id: Option<&str>) -> String {
    session_id.unwrap_or(GLOBAL_KEY).to_string()
}

/// Compacts a raw buffer: drop empty texts, merge adjacent duplicates
/// (same role and identical text), keep only the newest `max` entries.
fn compact(messages: Vec<TurnMessage>, max: usize) -> Vec<TurnMessage> {
    let mut out: Vec<TurnMessage> = Vec::with_capacity(messages.len());
    for message in messages {
        if message.text.trim().is_empty() {
            continue;
        }
        if out.last() == Some(&message) {
            continue;
        }
        out.push(message);
    }
    if out.len() > max {
        let drop = out.len() - max;
        out.drain(..drop);
    }
    out
}
