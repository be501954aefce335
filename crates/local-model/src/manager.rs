//! The model lifecycle state machine.
//!
//! ```text
//! idle → checking → downloading → loading → ready
//!   any      → error        (load failure)
//!   loading* → idle         (cancel_load)
//!   ready    → idle         (unload_model)
//!   checking → unsupported  (no capability)
//! ```
//!
//! [`ModelManager`] is a cheap-to-clone handle; every clone drives the same
//! engine. Concurrent [`ModelManager::init_model`] calls share one in-flight
//! load and all receive its outcome.

use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use ht_domain::error::{Error, Result};
use ht_domain::model::{ModelProgress, ModelStatus};
use ht_domain::trace::TraceEvent;

use crate::engine::LocalEngine;
use crate::loader::{EngineLoader, LoadContext, ProgressSink};
use crate::probe::CapabilityProbe;

/// Callback invoked on every status or percentage change during a load.
pub type ProgressCallback = Arc<dyn Fn(&ModelProgress) + Send + Sync>;

/// Lifecycle state. Only `Ready` owns an engine handle.
#[derive(Clone, Default)]
pub enum ModelState {
    #[default]
    Idle,
    Checking,
    Downloading,
    Loading,
    Ready {
        engine: Arc<dyn LocalEngine>,
    },
    Error {
        message: String,
    },
    Unsupported,
}

impl ModelState {
    pub fn status(&self) -> ModelStatus {
        match self {
            ModelState::Idle => ModelStatus::Idle,
            ModelState::Checking => ModelStatus::Checking,
            ModelState::Downloading => ModelStatus::Downloading,
            ModelState::Loading => ModelStatus::Loading,
            ModelState::Ready { .. } => ModelStatus::Ready,
            ModelState::Error { .. } => ModelStatus::Error,
            ModelState::Unsupported => ModelStatus::Unsupported,
        }
    }

    fn for_progress(status: ModelStatus, text: &str) -> Option<Self> {
        match status {
            ModelStatus::Idle => Some(ModelState::Idle),
            ModelStatus::Checking => Some(ModelState::Checking),
            ModelStatus::Downloading => Some(ModelState::Downloading),
            ModelStatus::Loading => Some(ModelState::Loading),
            ModelStatus::Error => Some(ModelState::Error {
                message: text.to_string(),
            }),
            ModelStatus::Unsupported => Some(ModelState::Unsupported),
            // Ready needs an engine; only the manager itself may enter it.
            ModelStatus::Ready => None,
        }
    }
}

impl std::fmt::Debug for ModelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelState::Error { message } => write!(f, "Error({message})"),
            other => write!(f, "{}", other.status()),
        }
    }
}

struct Slot {
    state: ModelState,
    progress: ModelProgress,
    /// Generation of the load allowed to write state. Bumped by every new
    /// load and by unload, so a superseded load cannot clobber newer state.
    owner: u64,
}

struct InFlight {
    generation: u64,
    cancel: CancellationToken,
    outcome: Shared<BoxFuture<'static, bool>>,
}

struct Inner {
    model_id: String,
    probe: Arc<dyn CapabilityProbe>,
    loader: Arc<dyn EngineLoader>,
    slot: Mutex<Slot>,
    in_flight: Mutex<Option<InFlight>>,
    listeners: Mutex<Vec<ProgressCallback>>,
    next_generation: Mutex<u64>,
    status_tx: watch::Sender<ModelProgress>,
}

#[derive(Clone)]
pub struct ModelManager {
    inner: Arc<Inner>,
}

impl ModelManager {
    pub fn new(
        model_id: impl Into<String>,
        probe: Arc<dyn CapabilityProbe>,
        loader: Arc<dyn EngineLoader>,
    ) -> Self {
        let (status_tx, _) = watch::channel(ModelProgress::default());
        Self {
            inner: Arc::new(Inner {
                model_id: model_id.into(),
                probe,
                loader,
                slot: Mutex::new(Slot {
                    state: ModelState::Idle,
                    progress: ModelProgress::default(),
                    owner: 0,
                }),
                in_flight: Mutex::new(None),
                listeners: Mutex::new(Vec::new()),
                next_generation: Mutex::new(0),
                status_tx,
            }),
        }
    }

    pub fn model_id(&self) -> &str {
        &self.inner.model_id
    }

    // ── Reads ──────────────────────────────────────────────────────

    pub fn status(&self) -> ModelStatus {
        self.inner.slot.lock().state.status()
    }

    pub fn progress(&self) -> ModelProgress {
        self.inner.slot.lock().progress.clone()
    }

    pub fn is_model_ready(&self) -> bool {
        matches!(self.inner.slot.lock().state, ModelState::Ready { .. })
    }

    /// Whether an engine handle is currently held.
    pub fn has_engine(&self) -> bool {
        self.is_model_ready()
    }

    /// Subscribe to progress updates without registering a callback.
    pub fn subscribe(&self) -> watch::Receiver<ModelProgress> {
        self.inner.status_tx.subscribe()
    }

    /// Probe for the required compute capability. Never fails: a probe
    /// error counts as "not available".
    pub async fn check_capability(&self) -> bool {
        self.inner.check_capability().await
    }

    // ── Lifecycle ──────────────────────────────────────────────────

    /// Load the model, reporting progress to `on_progress`.
    ///
    /// Returns `true` once the model is ready. Overlapping calls join the
    /// load already in flight. Failures set the status to `unsupported` or
    /// `error` and return `false`; nothing is raised to the caller.
    pub async fn init_model(&self, on_progress: Option<ProgressCallback>) -> bool {
        if self.is_model_ready() {
            return true;
        }

        let outcome = {
            let mut in_flight = self.inner.in_flight.lock();
            if let Some(cb) = on_progress {
                self.inner.listeners.lock().push(cb);
            }

            match in_flight.as_ref() {
                Some(current) => {
                    tracing::debug!(generation = current.generation, "joining in-flight model load");
                    current.outcome.clone()
                }
                None => {
                    let generation = self.inner.claim_generation();
                    let cancel = CancellationToken::new();
                    let inner = self.inner.clone();
                    let token = cancel.clone();
                    let outcome = async move { inner.run_load(generation, token).await }
                        .boxed()
                        .shared();

                    // Drive the load independently of any one caller.
                    tokio::spawn(outcome.clone());

                    *in_flight = Some(InFlight {
                        generation,
                        cancel,
                        outcome: outcome.clone(),
                    });
                    outcome
                }
            }
        };

        outcome.await
    }

    /// Request cooperative cancellation of the in-flight load, if any.
    ///
    /// The load observes the token at its next checkpoint and unwinds to
    /// `idle`, releasing anything it acquired.
    pub fn cancel_load(&self) {
        if let Some(current) = self.inner.in_flight.lock().take() {
            tracing::info!(model = %self.inner.model_id, generation = current.generation, "cancelling model load");
            current.cancel.cancel();
        }
    }

    /// Run one chat completion against the loaded model.
    ///
    /// Fails with [`Error::ModelNotReady`] unless the status is exactly
    /// `ready`. An engine reply without content yields an empty string.
    pub async fn generate_response(&self, system_prompt: &str, user_message: &str) -> Result<String> {
        let engine = match &self.inner.slot.lock().state {
            ModelState::Ready { engine } => engine.clone(),
            _ => return Err(Error::ModelNotReady),
        };

        let text = engine.chat(system_prompt, user_message).await?;
        Ok(text.unwrap_or_default())
    }

    /// Cancel any load, release the engine, and return to `idle`. Safe from
    /// any state.
    pub async fn unload_model(&self) {
        self.cancel_load();

        let engine = {
            let generation = self.inner.claim_generation();
            let mut slot = self.inner.slot.lock();
            slot.owner = generation;
            match std::mem::take(&mut slot.state) {
                ModelState::Ready { engine } => Some(engine),
                _ => None,
            }
        };

        if let Some(engine) = engine {
            if let Err(e) = engine.unload().await {
                tracing::warn!(error = %e, "engine unload failed");
            }
        }

        self.inner
            .publish(None, ModelProgress::new(ModelStatus::Idle, 0.0, "Model unloaded"));
    }
}

impl Inner {
    fn claim_generation(&self) -> u64 {
        let mut next = self.next_generation.lock();
        *next += 1;
        *next
    }

    async fn check_capability(&self) -> bool {
        match self.probe.probe().await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(error = %e, "capability probe failed");
                false
            }
        }
    }

    async fn run_load(self: Arc<Self>, generation: u64, cancel: CancellationToken) -> bool {
        self.slot.lock().owner = generation;

        let result = self.load_engine(generation, &cancel).await;

        let ready = match result {
            Ok(engine) if !cancel.is_cancelled() => {
                let installed = {
                    let mut slot = self.slot.lock();
                    if slot.owner == generation {
                        slot.state = ModelState::Ready {
                            engine: engine.clone(),
                        };
                        true
                    } else {
                        false
                    }
                };
                if installed {
                    let text = format!("{} ready", self.model_id);
                    self.publish(Some(generation), ModelProgress::new(ModelStatus::Ready, 1.0, text));
                    tracing::info!(model = %self.model_id, "local model ready");
                    true
                } else {
                    release(engine).await;
                    false
                }
            }
            Ok(engine) => {
                // Cancelled after the engine came up: give it back.
                release(engine).await;
                self.unwind_cancelled(generation, "post-load");
                false
            }
            Err(Error::Cancelled) => {
                self.unwind_cancelled(generation, "loading");
                false
            }
            Err(Error::CapabilityUnavailable(reason)) => {
                tracing::info!(reason = %reason, "local model unsupported on this device");
                self.publish(
                    Some(generation),
                    ModelProgress::new(ModelStatus::Unsupported, 0.0, reason),
                );
                false
            }
            Err(e) => {
                tracing::error!(model = %self.model_id, error = %e, "model initialization failed");
                self.publish(
                    Some(generation),
                    ModelProgress::new(
                        ModelStatus::Error,
                        0.0,
                        format!("Failed to load AI model: {e}"),
                    ),
                );
                false
            }
        };

        {
            let mut in_flight = self.in_flight.lock();
            if in_flight.as_ref().is_some_and(|f| f.generation == generation) {
                *in_flight = None;
            }
            if in_flight.is_none() {
                self.listeners.lock().clear();
            }
        }

        ready
    }

    async fn load_engine(
        self: &Arc<Self>,
        generation: u64,
        cancel: &CancellationToken,
    ) -> Result<Arc<dyn LocalEngine>> {
        let ctx = LoadContext::new(cancel.clone(), self.sink(generation));

        ctx.checkpoint()?;
        ctx.report(ModelStatus::Checking, 0.0, "Checking GPU support...");
        let capable = self.check_capability().await;
        ctx.checkpoint()?;
        if !capable {
            return Err(Error::CapabilityUnavailable(
                "GPU acceleration not supported on this device".into(),
            ));
        }

        ctx.report(ModelStatus::Downloading, 0.0, "Initializing AI engine...");
        let engine = self.loader.load(&ctx).await?;

        if ctx.is_cancelled() {
            release(engine).await;
            return Err(Error::Cancelled);
        }
        Ok(engine)
    }

    fn sink(self: &Arc<Self>, generation: u64) -> ProgressSink {
        let weak = Arc::downgrade(self);
        Arc::new(move |progress: ModelProgress| {
            if let Some(inner) = weak.upgrade() {
                inner.publish(Some(generation), progress);
            }
        })
    }

    fn unwind_cancelled(&self, generation: u64, phase: &str) {
        TraceEvent::ModelLoadCancelled {
            model_id: self.model_id.clone(),
            phase: phase.to_string(),
        }
        .emit();
        self.publish(
            Some(generation),
            ModelProgress::new(ModelStatus::Idle, 0.0, "Model load cancelled"),
        );
    }

    /// Apply a progress report to the slot and fan it out. With
    /// `Some(generation)` the write is dropped unless that load still owns
    /// the slot.
    fn publish(&self, generation: Option<u64>, progress: ModelProgress) {
        let status_changed = {
            let mut slot = self.slot.lock();
            if generation.is_some_and(|g| g != slot.owner) {
                return;
            }
            let previous = slot.state.status();
            if progress.status != ModelStatus::Ready {
                if let Some(state) = ModelState::for_progress(progress.status, &progress.text) {
                    slot.state = state;
                }
            }
            slot.progress = progress.clone();
            previous != progress.status
        };

        if status_changed {
            TraceEvent::ModelStatusChanged {
                status: progress.status.to_string(),
                progress: progress.progress,
                text: progress.text.clone(),
            }
            .emit();
        } else {
            tracing::trace!(status = %progress.status, progress = progress.progress, "model progress");
        }

        self.status_tx.send_replace(progress.clone());

        let listeners: Vec<ProgressCallback> = self.listeners.lock().clone();
        for cb in listeners {
            cb(&progress);
        }
    }
}

async fn release(engine: Arc<dyn LocalEngine>) {
    if let Err(e) = engine.unload().await {
        tracing::warn!(error = %e, "failed to release engine");
    }
}
