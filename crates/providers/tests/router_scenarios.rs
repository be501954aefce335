use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use ht_domain::error::{Error, Result};
use ht_domain::trace::TraceEvent;
use ht_domain::triage::{ImageBlob, InferenceMode, Severity, TriageInput, TriageSource};
use ht_local_model::{FixedProbe, LocalEngine, ModelManager, PrebuiltLoader};
use ht_providers::wire::{
    CreateSessionRequest, InferenceRequest, ResultPayload, SaveResultRequest, SessionPayload,
};
use ht_providers::{InferenceRouter, RoutePath, TriageApi};

// ── Fakes ──────────────────────────────────────────────────────────

#[derive(Default)]
struct FakeApi {
    context: String,
    fail_session: bool,
    fail_result: bool,
    fail_inference: bool,
    calls: Mutex<Vec<String>>,
    sessions: Mutex<Vec<CreateSessionRequest>>,
    saved: Mutex<Vec<SaveResultRequest>>,
    inferences: Mutex<Vec<InferenceRequest>>,
}

impl FakeApi {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn count(&self, name: &str) -> usize {
        self.calls.lock().iter().filter(|c| *c == name).count()
    }

    fn record(&self, name: &str) {
        self.calls.lock().push(name.to_string());
    }
}

fn remote_failure(endpoint: &str) -> Error {
    Error::Remote {
        endpoint: endpoint.into(),
        message: "HTTP 500: boom".into(),
    }
}

#[async_trait::async_trait]
impl TriageApi for FakeApi {
    async fn fetch_patient_context(&self) -> Result<String> {
        self.record("context");
        Ok(self.context.clone())
    }

    async fn create_session(&self, req: &CreateSessionRequest) -> Result<SessionPayload> {
        self.record("session");
        if self.fail_session {
            return Err(remote_failure("/triage/sessions/"));
        }
        self.sessions.lock().push(req.clone());
        Ok(SessionPayload {
            id: "local-session".into(),
            result: None,
        })
    }

    async fn create_result(&self, req: &SaveResultRequest) -> Result<()> {
        self.record("result");
        if self.fail_result {
            return Err(remote_failure("/triage/results/"));
        }
        self.saved.lock().push(req.clone());
        Ok(())
    }

    async fn create_inference(&self, req: &InferenceRequest) -> Result<SessionPayload> {
        self.record("inference");
        if self.fail_inference {
            return Err(remote_failure("/triage/inference/"));
        }
        self.inferences.lock().push(req.clone());
        Ok(SessionPayload {
            id: "server-session".into(),
            result: Some(ResultPayload {
                diagnosis: Some("Tension-type headache".into()),
                severity: Some("moderate".into()),
                confidence_score: Some(0.7),
                recommendations: Some(vec!["Rest".into()]),
                ..Default::default()
            }),
        })
    }

    async fn upload_image(&self, _session_id: &str, _image: &ImageBlob) -> Result<()> {
        self.record("image");
        Ok(())
    }
}

struct ScriptedEngine {
    reply: std::result::Result<String, String>,
    chats: AtomicUsize,
    last_user: Mutex<String>,
}

impl ScriptedEngine {
    fn replying(text: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(text.to_string()),
            chats: AtomicUsize::new(0),
            last_user: Mutex::new(String::new()),
        })
    }

    fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(message.to_string()),
            chats: AtomicUsize::new(0),
            last_user: Mutex::new(String::new()),
        })
    }
}

#[async_trait::async_trait]
impl LocalEngine for ScriptedEngine {
    async fn chat(&self, _system: &str, user: &str) -> Result<Option<String>> {
        self.chats.fetch_add(1, Ordering::SeqCst);
        *self.last_user.lock() = user.to_string();
        match &self.reply {
            Ok(text) => Ok(Some(text.clone())),
            Err(msg) => Err(Error::Other(msg.clone())),
        }
    }

    async fn unload(&self) -> Result<()> {
        Ok(())
    }
}

fn manager(engine: Arc<ScriptedEngine>) -> ModelManager {
    ModelManager::new(
        "test-model",
        Arc::new(FixedProbe(true)),
        Arc::new(PrebuiltLoader::new(engine)),
    )
}

async fn ready_router(api: Arc<FakeApi>, engine: Arc<ScriptedEngine>) -> InferenceRouter {
    let model = manager(engine);
    assert!(model.init_model(None).await);
    InferenceRouter::new(api, model, "medgemma-4b-local")
}

fn image() -> ImageBlob {
    ImageBlob::new(vec![0x89, 0x50], "rash.png", "image/png")
}

const HEADACHE: &str = "persistent headache 3 days";

// ── Scenarios ──────────────────────────────────────────────────────

#[tokio::test]
async fn unready_model_routes_remote_once() {
    let api = Arc::new(FakeApi::default());
    let engine = ScriptedEngine::replying("{}");
    let router = InferenceRouter::new(api.clone(), manager(engine.clone()), "v");

    let outcome = router.route(&TriageInput::text(HEADACHE)).await.unwrap();

    assert_eq!(outcome.path, RoutePath::Remote);
    assert!(!outcome.fell_back());
    assert_eq!(outcome.result.inference_mode, InferenceMode::Server);
    assert_eq!(outcome.result.session_id, "server-session");
    assert_eq!(api.calls(), ["inference"]);
    assert_eq!(engine.chats.load(Ordering::SeqCst), 0);
    assert_eq!(api.inferences.lock()[0].symptoms_text, HEADACHE);
}

#[tokio::test]
async fn ready_model_runs_locally_and_normalizes() {
    let api = Arc::new(FakeApi {
        context: "Type 2 diabetes".into(),
        ..Default::default()
    });
    let engine = ScriptedEngine::replying(
        r#"{"diagnosis":"Tension headache","severity":"low","confidence_score":1.4,"recommendations":["Rest"]}"#,
    );
    let router = ready_router(api.clone(), engine.clone()).await;

    let outcome = router.route(&TriageInput::text(HEADACHE)).await.unwrap();

    assert_eq!(outcome.path, RoutePath::Local);
    let result = outcome.result;
    assert_eq!(result.severity, Severity::Low);
    assert_eq!(result.confidence_score, 1.0);
    assert_eq!(result.inference_mode, InferenceMode::Client);
    assert_eq!(result.session_id, "local-session");
    assert_eq!(result.diagnosis, "Tension headache");

    assert_eq!(api.calls(), ["context", "session", "result"]);
    let audit = &api.sessions.lock()[0];
    assert_eq!(audit.inference_mode, InferenceMode::Client);
    assert_eq!(audit.model_version, "medgemma-4b-local");
    assert!(audit.symptoms_text.contains("--- Patient Medical History ---\nType 2 diabetes"));
    assert!(engine.last_user.lock().contains("Type 2 diabetes"));

    let saved = &api.saved.lock()[0];
    assert_eq!(saved.session_id, "local-session");
    assert_eq!(saved.confidence_score, 1.0);
}

#[tokio::test]
async fn generation_failure_falls_back_to_remote() {
    let api = Arc::new(FakeApi::default());
    let router = ready_router(api.clone(), ScriptedEngine::failing("out of memory")).await;

    let outcome = router.route(&TriageInput::text(HEADACHE)).await.unwrap();

    assert_eq!(outcome.path, RoutePath::Remote);
    assert!(outcome.fell_back());
    assert!(outcome.fallback_reason.unwrap().contains("out of memory"));
    assert_eq!(outcome.result.inference_mode, InferenceMode::Server);
    assert_eq!(api.count("inference"), 1);
    // The fallback resubmits the original symptoms, not the enriched text.
    assert_eq!(api.inferences.lock()[0].symptoms_text, HEADACHE);
}

#[tokio::test]
async fn prose_output_gets_default_assessment() {
    let api = Arc::new(FakeApi::default());
    let engine = ScriptedEngine::replying("I think you should rest and drink water.");
    let router = ready_router(api.clone(), engine).await;

    let result = router.route(&TriageInput::text(HEADACHE)).await.unwrap().result;

    assert_eq!(result.severity, Severity::Medium);
    assert_eq!(result.confidence_score, 0.5);
    assert_eq!(
        result.recommendations,
        ["Consult a healthcare professional for evaluation"]
    );
    assert_eq!(result.inference_mode, InferenceMode::Client);
}

// ── Routing properties ─────────────────────────────────────────────

#[tokio::test]
async fn images_always_go_remote_even_when_ready() {
    let api = Arc::new(FakeApi::default());
    let engine = ScriptedEngine::replying("{}");
    let router = ready_router(api.clone(), engine.clone()).await;

    let image_only = router
        .route(&TriageInput::image(None, image()))
        .await
        .unwrap();
    let multimodal = router
        .route(&TriageInput::multimodal("itchy rash", image()))
        .await
        .unwrap();

    assert_eq!(image_only.path, RoutePath::Remote);
    assert_eq!(multimodal.path, RoutePath::Remote);
    assert_eq!(api.calls(), ["inference", "image", "inference", "image"]);
    assert_eq!(engine.chats.load(Ordering::SeqCst), 0);
    assert_eq!(api.inferences.lock()[1].source, TriageSource::Multimodal);
}

#[tokio::test]
async fn route_decision_reports_model_readiness_for_images() {
    let api = Arc::new(FakeApi::default());
    let router = ready_router(api, ScriptedEngine::replying("{}")).await;

    match router.route_decision(&TriageInput::image(None, image())) {
        TraceEvent::RouteDecided {
            path, model_ready, ..
        } => {
            assert_eq!(path, "remote");
            assert!(model_ready);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn remote_severity_is_normalized() {
    let api = Arc::new(FakeApi::default());
    let router = InferenceRouter::new(api, manager(ScriptedEngine::replying("")), "v");
    let result = router.route(&TriageInput::text("cough")).await.unwrap().result;
    // "moderate" is not a recognised level.
    assert_eq!(result.severity, Severity::Medium);
    assert_eq!(result.confidence_score, 0.7);
}

#[tokio::test]
async fn audit_session_failure_falls_back() {
    let api = Arc::new(FakeApi {
        fail_session: true,
        ..Default::default()
    });
    let engine = ScriptedEngine::replying("{}");
    let router = ready_router(api.clone(), engine.clone()).await;

    let outcome = router.route(&TriageInput::text(HEADACHE)).await.unwrap();
    assert_eq!(outcome.path, RoutePath::Remote);
    assert_eq!(engine.chats.load(Ordering::SeqCst), 0);
    assert_eq!(api.count("inference"), 1);
}

#[tokio::test]
async fn result_save_failure_falls_back() {
    let api = Arc::new(FakeApi {
        fail_result: true,
        ..Default::default()
    });
    let router = ready_router(api.clone(), ScriptedEngine::replying(r#"{"severity":"high"}"#)).await;

    let outcome = router.route(&TriageInput::text(HEADACHE)).await.unwrap();
    assert!(outcome.fell_back());
    assert_eq!(outcome.result.session_id, "server-session");
}

#[tokio::test]
async fn remote_failure_is_terminal() {
    let api = Arc::new(FakeApi {
        fail_inference: true,
        ..Default::default()
    });
    let router = ready_router(api.clone(), ScriptedEngine::failing("boom")).await;

    let err = router.route(&TriageInput::text(HEADACHE)).await.unwrap_err();
    assert!(matches!(err, Error::Remote { .. }));
    assert_eq!(api.count("inference"), 1);
}

#[tokio::test]
async fn invalid_input_is_rejected_before_routing() {
    let api = Arc::new(FakeApi::default());
    let router = InferenceRouter::new(api.clone(), manager(ScriptedEngine::replying("")), "v");

    let err = router.route(&TriageInput::text("   ")).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
    assert!(api.calls().is_empty());
}
