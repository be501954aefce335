//! Hybrid inference router.
//!
//! Text submissions run on the local model when it is ready; everything
//! else, and any local attempt that fails, goes to the remote service.
//! The fallback is an explicit [`LocalOutcome`] rather than a swallowed
//! error, and every routed call reports its [`RouteOutcome`].

use std::sync::Arc;

use ht_domain::error::Result;
use ht_domain::trace::TraceEvent;
use ht_domain::triage::{InferenceMode, TriageInput, TriageResultData, TriageSource};
use ht_local_model::ModelManager;

use crate::parse::parse_model_response;
use crate::prompt::{enrich_symptoms, user_message, TRIAGE_SYSTEM_PROMPT};
use crate::traits::TriageApi;
use crate::wire::{CreateSessionRequest, DeviceInfo, InferenceRequest};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Outcome types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Which path a submission is sent down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutePath {
    Local,
    Remote,
}

impl RoutePath {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoutePath::Local => "local",
            RoutePath::Remote => "remote",
        }
    }
}

/// Result of one on-device attempt.
#[derive(Debug, Clone)]
pub enum LocalOutcome {
    Completed(TriageResultData),
    /// The attempt failed and the submission must go remote. `session_id`
    /// is the audit session, if one had been opened.
    FallingBack {
        session_id: Option<String>,
        reason: String,
    },
}

/// A successfully routed submission.
#[derive(Debug, Clone)]
pub struct RouteOutcome {
    pub result: TriageResultData,
    /// The path that produced `result`.
    pub path: RoutePath,
    /// Why the local attempt was abandoned, when it was.
    pub fallback_reason: Option<String>,
}

impl RouteOutcome {
    pub fn fell_back(&self) -> bool {
        self.fallback_reason.is_some()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Router
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct InferenceRouter {
    api: Arc<dyn TriageApi>,
    model: ModelManager,
    model_version: String,
    runtime: String,
}

impl InferenceRouter {
    pub fn new(api: Arc<dyn TriageApi>, model: ModelManager, model_version: impl Into<String>) -> Self {
        Self {
            api,
            model,
            model_version: model_version.into(),
            runtime: "llama.cpp".into(),
        }
    }

    pub fn api(&self) -> &Arc<dyn TriageApi> {
        &self.api
    }

    pub fn model(&self) -> &ModelManager {
        &self.model
    }

    /// Text goes local iff the model is ready. Images always go remote.
    pub fn choose_path(&self, input: &TriageInput) -> RoutePath {
        match input.source {
            TriageSource::Text if self.model.is_model_ready() => RoutePath::Local,
            _ => RoutePath::Remote,
        }
    }

    /// The `RouteDecided` event for `input` under the current model state.
    pub fn route_decision(&self, input: &TriageInput) -> TraceEvent {
        TraceEvent::RouteDecided {
            source: input.source.to_string(),
            path: self.choose_path(input).as_str().to_string(),
            model_ready: self.model.is_model_ready(),
        }
    }

    // ── Public routing API ─────────────────────────────────────────

    /// Route one submission.
    ///
    /// Local failures are absorbed into a remote retry. A failure of the
    /// remote path itself is terminal and returned to the caller.
    pub async fn route(&self, input: &TriageInput) -> Result<RouteOutcome> {
        input.validate()?;

        let path = self.choose_path(input);
        self.route_decision(input).emit();

        if path == RoutePath::Remote {
            let result = self.run_remote(input).await?;
            return Ok(RouteOutcome {
                result,
                path,
                fallback_reason: None,
            });
        }

        match self.run_local(input).await {
            LocalOutcome::Completed(result) => Ok(RouteOutcome {
                result,
                path: RoutePath::Local,
                fallback_reason: None,
            }),
            LocalOutcome::FallingBack { session_id, reason } => {
                tracing::warn!(
                    session_id = session_id.as_deref().unwrap_or("-"),
                    reason = %reason,
                    "local inference failed, falling back to remote"
                );
                TraceEvent::LocalFallback {
                    session_id: session_id.unwrap_or_default(),
                    reason: reason.clone(),
                }
                .emit();

                let result = self.run_remote(input).await?;
                Ok(RouteOutcome {
                    result,
                    path: RoutePath::Remote,
                    fallback_reason: Some(reason),
                })
            }
        }
    }

    /// The on-device path. Never fails; problems become
    /// [`LocalOutcome::FallingBack`].
    pub async fn run_local(&self, input: &TriageInput) -> LocalOutcome {
        let context = match self.api.fetch_patient_context().await {
            Ok(ctx) => ctx,
            Err(e) => {
                tracing::debug!(error = %e, "patient context unavailable");
                String::new()
            }
        };
        let symptoms = enrich_symptoms(input.symptoms(), &context);

        let session = self
            .api
            .create_session(&CreateSessionRequest {
                symptoms_text: symptoms.clone(),
                source: input.source,
                inference_mode: InferenceMode::Client,
                model_version: self.model_version.clone(),
                device_info: DeviceInfo::current(self.runtime.clone()),
            })
            .await;
        let session_id = match session {
            Ok(s) => s.id,
            Err(e) => {
                return LocalOutcome::FallingBack {
                    session_id: None,
                    reason: format!("audit session: {e}"),
                }
            }
        };

        let raw = match self
            .model
            .generate_response(TRIAGE_SYSTEM_PROMPT, &user_message(&symptoms))
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                return LocalOutcome::FallingBack {
                    session_id: Some(session_id),
                    reason: format!("generation: {e}"),
                }
            }
        };

        let assessment = parse_model_response(&raw);
        let save = assessment.to_save_request(&session_id, &raw);
        if let Err(e) = self.api.create_result(&save).await {
            return LocalOutcome::FallingBack {
                session_id: Some(session_id),
                reason: format!("saving result: {e}"),
            };
        }

        LocalOutcome::Completed(assessment.into_result(&session_id, InferenceMode::Client))
    }

    /// The remote path: one inference request, plus an image upload when the
    /// submission carries an image.
    pub async fn run_remote(&self, input: &TriageInput) -> Result<TriageResultData> {
        let session = self
            .api
            .create_inference(&InferenceRequest {
                symptoms_text: input.symptoms().to_string(),
                source: input.source,
            })
            .await?;

        if let (Some(image), TriageSource::Image | TriageSource::Multimodal) =
            (&input.image, input.source)
        {
            if let Err(e) = self.api.upload_image(&session.id, image).await {
                tracing::warn!(session_id = %session.id, error = %e, "image upload failed");
            }
        }

        Ok(session.into_result(InferenceMode::Server))
    }
}
