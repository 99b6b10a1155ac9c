// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Model download manager for first-run ONNX embedding model setup.
//!
//! Downloads the all-MiniLM-L6-v2 INT8 quantized model from HuggingFace
//! on first run and caches it in the data directory. Downloads are
//! streamed with progress logged at every 10%, bounded by a 30-minute
//! timeout, and attempted up to three times before giving up.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use mnemo_core::MnemoError;
use tokio::io::AsyncWriteExt;
use tokio::sync::OnceCell;
use tracing::{info, warn};

/// URLs for model files on HuggingFace.
const MODEL_URL: &str =
    "https://huggingface.co/onnx-community/all-MiniLM-L6-v2-ONNX/resolve/main/onnx/model_quantized.onnx";
const TOKENIZER_URL: &str =
    "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/tokenizer.json";

/// Hard ceiling on a single model download.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30 * 60);
/// Attempts per file before the download is declared failed.
const DOWNLOAD_ATTEMPTS: u32 = 3;

/// Manages ONNX model download and path resolution.
pub struct ModelManager {
    data_dir: PathBuf,
    /// Ensures the model is downloaded only once even with concurrent callers.
    init_guard: OnceCell<()>,
}

impl ModelManager {
    /// Creates a new ModelManager rooted at the given data directory.
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            init_guard: OnceCell::new(),
        }
    }

    /// Directory where model files are stored.
    pub fn model_dir(&self) -> PathBuf {
        self.data_dir.join("models").join("all-MiniLM-L6-v2")
    }

    /// Path to the ONNX model file.
    pub fn model_path(&self) -> PathBuf {
        self.model_dir().join("model.onnx")
    }

    /// Path to the tokenizer.json file.
    pub fn tokenizer_path(&self) -> PathBuf {
        self.model_dir().join("tokenizer.json")
    }

    /// True if both model and tokenizer files exist.
    pub fn is_model_available(&self) -> bool {
        self.model_path().exists() && self.tokenizer_path().exists()
    }

    /// Ensures the model is downloaded and available.
    ///
    /// Downloads from HuggingFace on first run; subsequent calls are
    /// no-ops. Concurrent callers coalesce on the `OnceCell`.
    pub async fn ensure_model(&self) -> Result<PathBuf, MnemoError> {
        self.init_guard
            .get_or_try_init(|| async {
                if self.is_model_available() {
                    return Ok(());
                }
                self.download_all().await
            })
            .await?;
        Ok(self.model_path())
    }

    async fn download_all(&self) -> Result<(), MnemoError> {
        info!("embedding model not found, downloading from HuggingFace");

        let model_dir = self.model_dir();
        tokio::fs::create_dir_all(&model_dir).await.map_err(|e| {
            MnemoError::EmbedderUnavailable(format!("failed to create model directory: {e}"))
        })?;

        let files = [
            ("model.onnx", MODEL_URL),
            ("tokenizer.json", TOKENIZER_URL),
        ];

        for (filename, url) in &files {
            let dest = model_dir.join(filename);
            if dest.exists() {
                continue;
            }
            download_with_retry(url, &dest).await?;
        }

        info!(dir = %model_dir.display(), "embedding model ready");
        Ok(())
    }
}

/// Downloads a file, retrying transient failures up to three attempts.
async fn download_with_retry(url: &str, dest: &Path) -> Result<(), MnemoError> {
    let mut last_error = None;
    for attempt in 1..=DOWNLOAD_ATTEMPTS {
        if attempt > 1 {
            warn!(attempt, url, "retrying model download");
            tokio::time::sleep(Duration::from_secs(2)).await;
        }
        match download_file(url, dest).await {
            Ok(size) => {
                info!(url, size, "downloaded model file");
                return Ok(());
            }
            Err(e) => {
                // Remove the partial file so the next attempt starts clean.
                let _ = tokio::fs::remove_file(dest).await;
                warn!(attempt, url, error = %e, "model download failed");
                last_error = Some(e);
            }
        }
    }
    Err(last_error
        .unwrap_or_else(|| MnemoError::EmbedderUnavailable("download never attempted".into())))
}

/// Streams a URL to a local path, logging progress at every 10%.
async fn download_file(url: &str, dest: &Path) -> Result<u64, MnemoError> {
    let client = reqwest::Client::builder()
        .timeout(DOWNLOAD_TIMEOUT)
        .build()
        .map_err(|e| MnemoError::EmbedderUnavailable(format!("http client: {e}")))?;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| MnemoError::EmbedderUnavailable(format!("failed to fetch {url}: {e}")))?;

    if !response.status().is_success() {
        return Err(MnemoError::EmbedderUnavailable(format!(
            "download failed with status {}: {url}",
            response.status()
        )));
    }

    let total = response.content_length();
    let mut file = tokio::fs::File::create(dest)
        .await
        .map_err(|e| MnemoError::EmbedderUnavailable(format!("create {}: {e}", dest.display())))?;

    let mut stream = response.bytes_stream();
    let mut written: u64 = 0;
    let mut next_progress_pct: u64 = 10;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk
            .map_err(|e| MnemoError::EmbedderUnavailable(format!("read body from {url}: {e}")))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| MnemoError::EmbedderUnavailable(format!("write {}: {e}", dest.display())))?;
        written += chunk.len() as u64;

        if let Some(total) = total {
            let pct = written * 100 / total.max(1);
            while pct >= next_progress_pct && next_progress_pct <= 100 {
                info!(url, pct = next_progress_pct, "download progress");
                next_progress_pct += 10;
            }
        }
    }

    file.flush()
        .await
        .map_err(|e| MnemoError::EmbedderUnavailable(format!("flush {}: {e}", dest.display())))?;
    Ok(written)
}
