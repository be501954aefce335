//! Weight download and engine start-up.
//!
//! A load runs under a [`LoadContext`] carrying the cancellation token and
//! the progress sink. Loaders call [`LoadContext::checkpoint`] before and
//! after each phase and on every download tick; a cancelled checkpoint
//! returns [`Error::Cancelled`] and the loader unwinds, cleaning up whatever
//! it acquired.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use ht_domain::config::LocalModelConfig;
use ht_domain::error::{Error, Result};
use ht_domain::model::{ModelProgress, ModelStatus};
use ht_domain::trace::TraceEvent;

use crate::engine::{ChatEngine, LocalEngine};

/// Receives progress reports from a running load.
pub type ProgressSink = Arc<dyn Fn(ModelProgress) + Send + Sync>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LoadContext
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct LoadContext {
    cancel: CancellationToken,
    sink: ProgressSink,
}

impl LoadContext {
    pub fn new(cancel: CancellationToken, sink: ProgressSink) -> Self {
        Self { cancel, sink }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Fail with [`Error::Cancelled`] once cancellation has been requested.
    pub fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Forward a progress report. Dropped after cancellation so a dying
    /// load cannot overwrite the state it is unwinding to.
    pub fn report(&self, status: ModelStatus, progress: f64, text: impl Into<String>) {
        if !self.cancel.is_cancelled() {
            (self.sink)(ModelProgress::new(status, progress, text));
        }
    }
}

/// Produces a ready engine: fetches weights if needed and brings the
/// runtime up.
#[async_trait::async_trait]
pub trait EngineLoader: Send + Sync {
    async fn load(&self, ctx: &LoadContext) -> Result<Arc<dyn LocalEngine>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// HttpEngineLoader
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Downloads weights into the cache directory, then waits for the local
/// runtime to come up healthy.
pub struct HttpEngineLoader {
    config: LocalModelConfig,
    client: reqwest::Client,
    health_interval: Duration,
}

impl HttpEngineLoader {
    pub fn new(config: LocalModelConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Config(format!("HTTP client build failed: {e}")))?;

        Ok(Self {
            config,
            client,
            health_interval: Duration::from_millis(500),
        })
    }

    /// Return the cached weights path, downloading first if absent.
    async fn ensure_weights(&self, ctx: &LoadContext) -> Result<PathBuf> {
        let dest = self.config.weights_path();
        let start = Instant::now();

        if tokio::fs::try_exists(&dest).await? {
            ctx.report(ModelStatus::Downloading, 1.0, "Loading model from cache...");
            let bytes = tokio::fs::metadata(&dest).await?.len();
            TraceEvent::WeightsDownloaded {
                model_id: self.config.model_id.clone(),
                bytes,
                cache_hit: true,
                duration_ms: start.elapsed().as_millis() as u64,
            }
            .emit();
            return Ok(dest);
        }

        let url = self.config.weights_url.as_deref().ok_or_else(|| {
            Error::ModelLoadFailed(format!(
                "weights not cached at {} and no weights_url configured",
                dest.display()
            ))
        })?;

        tokio::fs::create_dir_all(&self.config.cache_dir).await?;
        let partial = dest.with_extension("part");

        match self.download(url, &partial, ctx).await {
            Ok(bytes) => {
                tokio::fs::rename(&partial, &dest).await?;
                TraceEvent::WeightsDownloaded {
                    model_id: self.config.model_id.clone(),
                    bytes,
                    cache_hit: false,
                    duration_ms: start.elapsed().as_millis() as u64,
                }
                .emit();
                Ok(dest)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial).await;
                Err(e)
            }
        }
    }

    async fn download(&self, url: &str, partial: &Path, ctx: &LoadContext) -> Result<u64> {
        tracing::info!(model = %self.config.model_id, url = %url, "downloading model weights");

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::ModelLoadFailed(format!("download failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(Error::ModelLoadFailed(format!(
                "download failed: HTTP {} from {url}",
                resp.status()
            )));
        }

        let total = resp.content_length();
        let mut file = tokio::fs::File::create(partial).await?;
        let mut hasher = Sha256::new();
        let mut stream = resp.bytes_stream();
        let mut downloaded: u64 = 0;

        while let Some(chunk) = stream.next().await {
            ctx.checkpoint()?;
            let chunk =
                chunk.map_err(|e| Error::ModelLoadFailed(format!("download interrupted: {e}")))?;
            file.write_all(&chunk).await?;
            hasher.update(&chunk);
            downloaded += chunk.len() as u64;

            let fraction = total
                .filter(|t| *t > 0)
                .map(|t| downloaded as f64 / t as f64)
                .unwrap_or(0.0);
            ctx.report(
                ModelStatus::Downloading,
                fraction,
                format!("Downloading model... {}", human_bytes(downloaded)),
            );
        }
        file.flush().await?;

        if let Some(expected) = &self.config.sha256 {
            let actual = hex::encode(hasher.finalize());
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(Error::ModelLoadFailed(format!(
                    "checksum mismatch: expected {expected}, got {actual}"
                )));
            }
            tracing::debug!(sha256 = %actual, "weights checksum verified");
        }

        Ok(downloaded)
    }

    /// Poll the runtime's health endpoint until it answers or the load
    /// timeout passes.
    async fn wait_ready(&self, engine: &ChatEngine, ctx: &LoadContext) -> Result<()> {
        let timeout = Duration::from_secs(self.config.load_timeout_secs);
        let start = Instant::now();

        while start.elapsed() < timeout {
            ctx.checkpoint()?;
            match engine.check_health().await {
                Ok(()) => return Ok(()),
                Err(e) => tracing::debug!(error = %e, "local runtime not ready yet"),
            }
            tokio::select! {
                _ = ctx.cancel_token().cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(self.health_interval) => {}
            }
        }

        Err(Error::ModelLoadFailed(format!(
            "local runtime at {} did not become ready within {}s",
            engine.base_url(),
            self.config.load_timeout_secs
        )))
    }
}

#[async_trait::async_trait]
impl EngineLoader for HttpEngineLoader {
    async fn load(&self, ctx: &LoadContext) -> Result<Arc<dyn LocalEngine>> {
        ctx.checkpoint()?;
        let weights = self.ensure_weights(ctx).await?;
        ctx.checkpoint()?;

        ctx.report(ModelStatus::Loading, 0.0, "Loading model into runtime...");
        tracing::info!(weights = %weights.display(), runtime = %self.config.runtime_url, "starting local engine");

        let engine = ChatEngine::new(
            &self.config.runtime_url,
            self.config.temperature,
            self.config.max_tokens,
        )?;
        self.wait_ready(&engine, ctx).await?;

        Ok(Arc::new(engine))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PrebuiltLoader
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Hands out an engine that was constructed in-process.
pub struct PrebuiltLoader {
    engine: Arc<dyn LocalEngine>,
}

impl PrebuiltLoader {
    pub fn new(engine: Arc<dyn LocalEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait::async_trait]
impl EngineLoader for PrebuiltLoader {
    async fn load(&self, ctx: &LoadContext) -> Result<Arc<dyn LocalEngine>> {
        ctx.checkpoint()?;
        ctx.report(ModelStatus::Loading, 1.0, "Loading model...");
        Ok(self.engine.clone())
    }
}

fn human_bytes(n: u64) -> String {
    const MB: f64 = 1024.0 * 1024.0;
    format!("{:.1} MB", n as f64 / MB)
}
