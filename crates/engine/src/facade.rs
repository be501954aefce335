//! The engine façade.
//!
//! [`TriageEngine`] ties the model manager, router, and offline store
//! together behind three user-facing operations (`enable_offline_mode`,
//! `switch_to_cloud`, `run_triage`) and publishes an [`EngineState`]
//! snapshot after every change.
//!
//! Concurrent `run_triage` calls are allowed. Each call returns its own
//! result; the shared `last_result`/`last_error` fields only ever reflect the
//! most recently *started* request, and `busy` stays set until every request
//! has finished.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use base64::Engine as _;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use ht_domain::error::{Error, Result};
use ht_domain::model::{ModelProgress, ModelStatus};
use ht_domain::session::OfflineSession;
use ht_domain::trace::TraceEvent;
use ht_domain::triage::{ImageBlob, TriageInput, TriageResultData};
use ht_local_model::{ModelManager, ProgressCallback};
use ht_providers::InferenceRouter;
use ht_sessions::{image_data_url, OfflineStore};

use crate::connectivity::ConnectivitySource;
use crate::state::{EngineMode, EngineState};

struct Inner {
    router: InferenceRouter,
    store: Arc<OfflineStore>,
    history_limit: usize,
    state_tx: watch::Sender<EngineState>,
    in_flight: AtomicUsize,
    request_seq: AtomicU64,
    shutdown: CancellationToken,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[derive(Clone)]
pub struct TriageEngine {
    inner: Arc<Inner>,
}

impl TriageEngine {
    /// Build the façade. Starts a background task mirroring `connectivity`
    /// into the state, so this must be called from within a Tokio runtime.
    pub fn new(
        router: InferenceRouter,
        store: Arc<OfflineStore>,
        connectivity: Arc<dyn ConnectivitySource>,
        history_limit: usize,
    ) -> Self {
        let model = router.model();
        let initial = EngineState {
            model_status: model.status(),
            model_progress: model.progress(),
            online: connectivity.is_online(),
            ..Default::default()
        };
        let (state_tx, _) = watch::channel(initial);

        let inner = Arc::new(Inner {
            router,
            store,
            history_limit,
            state_tx,
            in_flight: AtomicUsize::new(0),
            request_seq: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
        });

        spawn_connectivity_watch(Arc::downgrade(&inner), connectivity, inner.shutdown.clone());

        Self { inner }
    }

    // ── Reads ──────────────────────────────────────────────────────

    pub fn state(&self) -> EngineState {
        self.inner.state_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<EngineState> {
        self.inner.state_tx.subscribe()
    }

    pub fn model(&self) -> &ModelManager {
        self.inner.router.model()
    }

    pub fn store(&self) -> &OfflineStore {
        &self.inner.store
    }

    /// Stored sessions, newest first. Store failures degrade to an empty
    /// history.
    pub async fn history(&self, limit: Option<usize>) -> Vec<OfflineSession> {
        let limit = limit.unwrap_or(self.inner.history_limit);
        match self.inner.store.get_history(limit).await {
            Ok(sessions) => sessions,
            Err(e) => {
                tracing::warn!(error = %e, "history unavailable");
                Vec::new()
            }
        }
    }

    // ── Mode switching ─────────────────────────────────────────────

    /// Switch to on-device inference, loading the model if needed.
    ///
    /// Returns `true` when the model is ready. On failure the mode reverts to
    /// cloud and the reason lands in `last_error`; a load cancelled by
    /// [`switch_to_cloud`](Self::switch_to_cloud) reverts without an error.
    pub async fn enable_offline_mode(&self) -> bool {
        self.inner.update(|s| {
            s.mode = EngineMode::Offline;
            s.last_error = None;
        });

        let weak = Arc::downgrade(&self.inner);
        let on_progress: ProgressCallback = Arc::new(move |progress: &ModelProgress| {
            if let Some(inner) = weak.upgrade() {
                let progress = progress.clone();
                inner.update(|s| {
                    s.model_status = progress.status;
                    s.model_progress = progress;
                });
            }
        });

        let model = self.model();
        let ready = model.init_model(Some(on_progress)).await;
        let status = model.status();
        let progress = model.progress();

        self.inner.update(|s| {
            s.model_status = status;
            s.model_progress = progress.clone();
            if ready {
                s.mode = EngineMode::Offline;
            } else {
                s.mode = EngineMode::Cloud;
                if status != ModelStatus::Idle {
                    s.last_error = Some(offline_error(&progress));
                }
            }
        });

        if ready {
            tracing::info!(model = %model.model_id(), "offline mode enabled");
        } else {
            tracing::warn!(status = %status, "offline mode unavailable, staying in cloud mode");
        }
        ready
    }

    /// Switch back to remote inference.
    ///
    /// Cancels any in-flight load and clears progress and error state at
    /// once; the engine is released in the background. The returned handle
    /// completes when the release has finished.
    pub fn switch_to_cloud(&self) -> JoinHandle<()> {
        self.model().cancel_load();
        self.inner.update(|s| {
            s.mode = EngineMode::Cloud;
            s.model_status = ModelStatus::Idle;
            s.model_progress = ModelProgress::default();
            s.last_error = None;
        });

        let engine = self.clone();
        tokio::spawn(async move {
            engine.unload_model().await;
        })
    }

    /// Release the local model and return to `idle`.
    pub async fn unload_model(&self) {
        let model = self.model();
        model.unload_model().await;
        let (status, progress) = (model.status(), model.progress());
        self.inner.update(|s| {
            s.model_status = status;
            s.model_progress = progress;
        });
    }

    // ── Triage ─────────────────────────────────────────────────────

    /// Assess one submission.
    ///
    /// Never fails: errors resolve to `None` with the message recorded in
    /// the state. A submission that could not be assessed is kept in the
    /// store as unsynced so [`sync_pending`](Self::sync_pending) can replay
    /// it later.
    pub async fn run_triage(&self, input: TriageInput) -> Option<TriageResultData> {
        let seq = self.inner.request_seq.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.in_flight.fetch_add(1, Ordering::SeqCst);
        self.inner.update(|s| {
            s.busy = true;
            s.last_error = None;
            s.request_seq = seq;
        });

        let outcome = self.triage_once(&input).await;

        let remaining = self.inner.in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
        let latest = self.inner.request_seq.load(Ordering::SeqCst) == seq;
        self.inner.update(|s| {
            s.busy = remaining > 0;
            if latest {
                match &outcome {
                    Ok(result) => {
                        s.last_result = Some(result.clone());
                        s.last_error = None;
                    }
                    Err(e) => s.last_error = Some(e.to_string()),
                }
            }
        });

        match outcome {
            Ok(result) => Some(result),
            Err(e) => {
                tracing::warn!(seq, error = %e, "triage failed");
                None
            }
        }
    }

    async fn triage_once(&self, input: &TriageInput) -> Result<TriageResultData> {
        let image_url = input.image.as_ref().map(image_data_url);

        let routed = match self.inner.router.route(input).await {
            Ok(routed) => routed,
            Err(e) => {
                if !matches!(e, Error::InvalidInput(_)) {
                    self.keep_pending(input, image_url).await;
                }
                return Err(e);
            }
        };

        let result = routed.result;
        self.inner
            .store
            .save_session(
                &result.session_id,
                input.symptoms(),
                input.source,
                Some(result.clone()),
                image_url,
            )
            .await?;

        tracing::info!(
            session_id = %result.session_id,
            path = routed.path.as_str(),
            fell_back = routed.fallback_reason.is_some(),
            "triage complete"
        );
        Ok(result)
    }

    async fn keep_pending(&self, input: &TriageInput, image_url: Option<String>) {
        let id = uuid::Uuid::new_v4().to_string();
        if let Err(e) = self
            .inner
            .store
            .save_session(&id, input.symptoms(), input.source, None, image_url)
            .await
        {
            tracing::warn!(error = %e, "could not keep failed submission for later sync");
        }
    }

    /// Replay unsynced sessions through the remote path. Each success is
    /// stored under the session id the server assigned. Returns how many
    /// were synced; sessions that fail again stay pending.
    pub async fn sync_pending(&self) -> Result<usize> {
        let pending = self.inner.store.get_unsynced().await?;
        let mut synced = 0;

        for session in pending {
            let Some(input) = replay_input(&session) else {
                tracing::warn!(session_id = %session.id, "pending session cannot be replayed");
                continue;
            };

            match self.inner.router.run_remote(&input).await {
                Ok(result) => {
                    // Stored under the server's session id from here on.
                    if self.inner.store.settle_pending(&session.id, result).await? {
                        synced += 1;
                    }
                }
                Err(e) => {
                    tracing::warn!(session_id = %session.id, error = %e, "sync failed, will retry");
                }
            }
        }

        tracing::info!(synced, "pending sessions synced");
        Ok(synced)
    }
}

impl Inner {
    fn update(&self, f: impl FnOnce(&mut EngineState)) {
        self.state_tx.send_modify(f);
    }
}

fn spawn_connectivity_watch(
    weak: Weak<Inner>,
    source: Arc<dyn ConnectivitySource>,
    shutdown: CancellationToken,
) {
    let mut rx = source.subscribe();
    tokio::spawn(async move {
        // Keep the source alive for as long as the façade is.
        let _source = source;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }

            let online = *rx.borrow_and_update();
            let Some(inner) = weak.upgrade() else { break };
            TraceEvent::ConnectivityChanged { online }.emit();
            inner.update(|s| s.online = online);
        }
    });
}

fn offline_error(progress: &ModelProgress) -> String {
    match progress.status {
        ModelStatus::Unsupported => {
            format!("Offline mode is not available on this device: {}", progress.text)
        }
        _ if !progress.text.is_empty() => progress.text.clone(),
        _ => "Failed to enable offline mode".to_string(),
    }
}

/// Rebuild a submission from a stored session, decoding its image if any.
fn replay_input(session: &OfflineSession) -> Option<TriageInput> {
    let image = match &session.image_data_url {
        Some(url) => Some(decode_data_url(url)?),
        None => None,
    };
    let input = TriageInput {
        symptoms_text: (!session.symptoms.is_empty()).then(|| session.symptoms.clone()),
        image,
        source: session.source,
    };
    input.validate().ok()?;
    Some(input)
}

fn decode_data_url(url: &str) -> Option<ImageBlob> {
    let rest = url.strip_prefix("data:")?;
    let (content_type, data) = rest.split_once(";base64,")?;
    let bytes = base64::engine::general_purpose::STANDARD.decode(data).ok()?;
    let extension = content_type.rsplit('/').next().unwrap_or("bin");
    Some(ImageBlob::new(bytes, format!("image.{extension}"), content_type))
}
