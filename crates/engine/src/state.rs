use serde::Serialize;

use ht_domain::model::{ModelProgress, ModelStatus};
use ht_domain::triage::TriageResultData;

/// Which inference side the user intends to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineMode {
    #[default]
    Cloud,
    Offline,
}

/// Observable snapshot of the façade, published on every change.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineState {
    pub mode: EngineMode,
    pub model_status: ModelStatus,
    pub model_progress: ModelProgress,
    /// True while any triage request is in flight.
    pub busy: bool,
    pub online: bool,
    /// Outcome of the most recently started request, once it finishes.
    pub last_result: Option<TriageResultData>,
    pub last_error: Option<String>,
    /// Sequence number of the most recently started request.
    pub request_seq: u64,
}
