use ht_domain::error::Result;
use ht_domain::triage::ImageBlob;

use crate::wire::{CreateSessionRequest, InferenceRequest, SaveResultRequest, SessionPayload};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Remote triage API
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The remote triage backend as seen by the router.
///
/// [`crate::HttpTriageApi`] is the production implementation; tests supply
/// in-memory fakes.
#[async_trait::async_trait]
pub trait TriageApi: Send + Sync {
    /// The patient's medical history as free text. Empty when none exists.
    async fn fetch_patient_context(&self) -> Result<String>;

    /// Open an audit session for an on-device inference.
    async fn create_session(&self, req: &CreateSessionRequest) -> Result<SessionPayload>;

    /// Attach an on-device result to its audit session.
    async fn create_result(&self, req: &SaveResultRequest) -> Result<()>;

    /// Run a server-side inference. The returned session carries the result.
    async fn create_inference(&self, req: &InferenceRequest) -> Result<SessionPayload>;

    /// Attach an image to an existing session.
    async fn upload_image(&self, session_id: &str, image: &ImageBlob) -> Result<()>;
}
