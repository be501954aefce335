use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ht_domain::error::{Error, Result};
use ht_domain::model::ModelStatus;
use ht_domain::triage::{ImageBlob, InferenceMode, TriageInput, TriageSource};
use ht_engine::{EngineMode, ManualConnectivity, TriageEngine};
use ht_local_model::{
    EngineLoader, FixedProbe, LoadContext, LocalEngine, ModelManager, PrebuiltLoader,
};
use ht_providers::wire::{
    CreateSessionRequest, InferenceRequest, ResultPayload, SaveResultRequest, SessionPayload,
};
use ht_providers::{InferenceRouter, TriageApi};
use ht_sessions::{OfflineStore, DEFAULT_HISTORY_LIMIT};

// ── Fakes ──────────────────────────────────────────────────────────

/// Remote backend whose inference endpoint can be switched off, with an
/// optional delay keyed on the submitted symptoms.
#[derive(Default)]
struct FakeApi {
    down: AtomicBool,
    inferences: AtomicUsize,
    slow_symptom: Option<String>,
}

#[async_trait::async_trait]
impl TriageApi for FakeApi {
    async fn fetch_patient_context(&self) -> Result<String> {
        Ok(String::new())
    }

    async fn create_session(&self, _req: &CreateSessionRequest) -> Result<SessionPayload> {
        Ok(SessionPayload {
            id: "audit-1".into(),
            result: None,
        })
    }

    async fn create_result(&self, _req: &SaveResultRequest) -> Result<()> {
        Ok(())
    }

    async fn create_inference(&self, req: &InferenceRequest) -> Result<SessionPayload> {
        if self.down.load(Ordering::SeqCst) {
            return Err(Error::Http("connection refused".into()));
        }
        if self.slow_symptom.as_deref() == Some(req.symptoms_text.as_str()) {
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
        let n = self.inferences.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SessionPayload {
            id: format!("srv-{n}"),
            result: Some(ResultPayload {
                diagnosis: Some(format!("assessment of {}", req.symptoms_text)),
                severity: Some("LOW".into()),
                confidence_score: Some(0.6),
                ..Default::default()
            }),
        })
    }

    async fn upload_image(&self, _session_id: &str, _image: &ImageBlob) -> Result<()> {
        Ok(())
    }
}

struct QuietEngine;

#[async_trait::async_trait]
impl LocalEngine for QuietEngine {
    async fn chat(&self, _system: &str, _user: &str) -> Result<Option<String>> {
        Ok(Some(
            r#"{"diagnosis":"Dehydration","severity":"medium","confidence_score":0.8}"#.into(),
        ))
    }
    async fn unload(&self) -> Result<()> {
        Ok(())
    }
}

/// Reports download progress forever until cancelled.
struct EndlessLoader;

#[async_trait::async_trait]
impl EngineLoader for EndlessLoader {
    async fn load(&self, ctx: &LoadContext) -> Result<Arc<dyn LocalEngine>> {
        let mut done = 0.0;
        loop {
            ctx.checkpoint()?;
            done = (done + 0.01f64).min(0.99);
            ctx.report(ModelStatus::Downloading, done, "Downloading model...");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

struct Harness {
    engine: TriageEngine,
    api: Arc<FakeApi>,
    connectivity: Arc<ManualConnectivity>,
    _dir: tempfile::TempDir,
}

fn harness_with(api: FakeApi, capable: bool, loader: Arc<dyn EngineLoader>) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let api = Arc::new(api);
    let model = ModelManager::new("test-model", Arc::new(FixedProbe(capable)), loader);
    let router = InferenceRouter::new(api.clone(), model, "medgemma-4b-local");
    let store = Arc::new(OfflineStore::new(dir.path()));
    let connectivity = Arc::new(ManualConnectivity::new(true));
    let engine = TriageEngine::new(router, store, connectivity.clone(), DEFAULT_HISTORY_LIMIT);
    Harness {
        engine,
        api,
        connectivity,
        _dir: dir,
    }
}

fn harness(capable: bool) -> Harness {
    harness_with(
        FakeApi::default(),
        capable,
        Arc::new(PrebuiltLoader::new(Arc::new(QuietEngine))),
    )
}

// ── Mode switching ─────────────────────────────────────────────────

#[tokio::test]
async fn offline_mode_on_unsupported_device_stays_cloud() {
    let h = harness(false);

    assert!(!h.engine.enable_offline_mode().await);

    let state = h.engine.state();
    assert_eq!(state.mode, EngineMode::Cloud);
    assert_eq!(state.model_status, ModelStatus::Unsupported);
    assert!(state.last_error.unwrap().contains("not available"));
}

#[tokio::test]
async fn offline_mode_loads_model_and_routes_locally() {
    let h = harness(true);

    assert!(h.engine.enable_offline_mode().await);
    let state = h.engine.state();
    assert_eq!(state.mode, EngineMode::Offline);
    assert_eq!(state.model_status, ModelStatus::Ready);
    assert_eq!(state.model_progress.progress, 1.0);

    let result = h
        .engine
        .run_triage(TriageInput::text("dizzy after running"))
        .await
        .unwrap();
    assert_eq!(result.inference_mode, InferenceMode::Client);
    assert_eq!(result.session_id, "audit-1");
    assert_eq!(h.api.inferences.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn switch_to_cloud_cancels_load_and_clears_state() {
    let h = harness_with(FakeApi::default(), true, Arc::new(EndlessLoader));

    let enabling = {
        let engine = h.engine.clone();
        tokio::spawn(async move { engine.enable_offline_mode().await })
    };

    let mut rx = h.engine.subscribe();
    loop {
        let state = rx.borrow_and_update().clone();
        if state.model_status == ModelStatus::Downloading && state.model_progress.progress > 0.0 {
            break;
        }
        rx.changed().await.unwrap();
    }
    assert_eq!(h.engine.state().mode, EngineMode::Offline);

    let unloading = h.engine.switch_to_cloud();
    let state = h.engine.state();
    assert_eq!(state.mode, EngineMode::Cloud);
    assert_eq!(state.model_progress.progress, 0.0);
    assert!(state.last_error.is_none());

    assert!(!enabling.await.unwrap());
    unloading.await.unwrap();

    let state = h.engine.state();
    assert_eq!(state.mode, EngineMode::Cloud);
    assert_eq!(state.model_status, ModelStatus::Idle);
    assert!(state.last_error.is_none());
    assert!(!h.engine.model().has_engine());
}

#[tokio::test]
async fn unload_returns_to_idle() {
    let h = harness(true);
    assert!(h.engine.enable_offline_mode().await);

    h.engine.unload_model().await;
    assert_eq!(h.engine.state().model_status, ModelStatus::Idle);
    assert!(!h.engine.model().is_model_ready());
}

// ── Triage ─────────────────────────────────────────────────────────

#[tokio::test]
async fn successful_triage_is_persisted_as_synced() {
    let h = harness(true);

    let result = h
        .engine
        .run_triage(TriageInput::text("sore throat"))
        .await
        .unwrap();
    assert_eq!(result.inference_mode, InferenceMode::Server);

    let state = h.engine.state();
    assert!(!state.busy);
    assert_eq!(state.last_result.as_ref(), Some(&result));
    assert!(state.last_error.is_none());

    let history = h.engine.history(None).await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, result.session_id);
    assert!(history[0].synced);
    assert_eq!(history[0].result.as_ref(), Some(&result));
}

#[tokio::test]
async fn invalid_input_records_error_without_pending_session() {
    let h = harness(true);

    let input = TriageInput {
        symptoms_text: None,
        image: None,
        source: TriageSource::Multimodal,
    };
    assert!(h.engine.run_triage(input).await.is_none());

    let state = h.engine.state();
    assert!(!state.busy);
    assert!(state.last_error.unwrap().contains("Invalid triage input"));
    assert!(h.engine.history(None).await.is_empty());
}

#[tokio::test]
async fn failed_triage_is_kept_and_synced_later() {
    let h = harness(true);
    h.api.down.store(true, Ordering::SeqCst);

    let image = ImageBlob::new(vec![1, 2, 3], "rash.png", "image/png");
    assert!(h
        .engine
        .run_triage(TriageInput::multimodal("itchy rash", image))
        .await
        .is_none());
    assert!(h.engine.state().last_error.is_some());

    let pending = h.engine.store().get_unsynced().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert!(pending[0].result.is_none());
    assert!(pending[0].image_data_url.is_some());

    // Still down: nothing syncs, the session stays pending.
    assert_eq!(h.engine.sync_pending().await.unwrap(), 0);

    h.api.down.store(false, Ordering::SeqCst);
    assert_eq!(h.engine.sync_pending().await.unwrap(), 1);

    // The replayed session is re-keyed under the server's session id.
    assert!(h.engine.store().get(&pending[0].id).await.unwrap().is_none());
    let history = h.engine.history(None).await;
    assert_eq!(history.len(), 1);
    let session = &history[0];
    assert!(session.synced);
    let result = session.result.as_ref().unwrap();
    assert_eq!(session.id, result.session_id);
    assert_eq!(result.diagnosis, "assessment of itchy rash");
    assert_eq!(session.symptoms, "itchy rash");
    assert_eq!(session.image_data_url, pending[0].image_data_url);
    assert!(h.engine.store().get_unsynced().await.unwrap().is_empty());
}

#[tokio::test]
async fn overlapping_requests_keep_own_results() {
    let h = harness_with(
        FakeApi {
            slow_symptom: Some("slow".into()),
            ..Default::default()
        },
        true,
        Arc::new(PrebuiltLoader::new(Arc::new(QuietEngine))),
    );

    let slow = {
        let engine = h.engine.clone();
        tokio::spawn(async move { engine.run_triage(TriageInput::text("slow")).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let fast = h.engine.run_triage(TriageInput::text("fast")).await.unwrap();
    // The slow request is still running.
    assert!(h.engine.state().busy);
    assert_eq!(fast.diagnosis, "assessment of fast");

    let slow = slow.await.unwrap().unwrap();
    assert_eq!(slow.diagnosis, "assessment of slow");

    // The fast request started last, so its result stays in the state.
    let state = h.engine.state();
    assert!(!state.busy);
    assert_eq!(state.request_seq, 2);
    assert_eq!(state.last_result.unwrap().diagnosis, "assessment of fast");
}

// ── Connectivity ───────────────────────────────────────────────────

#[tokio::test]
async fn connectivity_is_mirrored_into_state() {
    let h = harness(true);
    assert!(h.engine.state().online);

    let mut rx = h.engine.subscribe();
    h.connectivity.set_online(false);
    tokio::time::timeout(Duration::from_secs(1), async {
        while rx.borrow_and_update().online {
            rx.changed().await.unwrap();
        }
    })
    .await
    .unwrap();

    // Routing ignores connectivity: the remote path is still attempted.
    let result = h.engine.run_triage(TriageInput::text("cough")).await;
    assert!(result.is_some());
}
