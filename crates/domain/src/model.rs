use serde::{Deserialize, Serialize};

/// Lifecycle status of the on-device model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    #[default]
    Idle,
    Checking,
    Downloading,
    Loading,
    Ready,
    Error,
    Unsupported,
}

impl ModelStatus {
    /// True for the states a load passes through before `Ready`.
    pub fn is_loading(&self) -> bool {
        matches!(
            self,
            ModelStatus::Checking | ModelStatus::Downloading | ModelStatus::Loading
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelStatus::Idle => "idle",
            ModelStatus::Checking => "checking",
            ModelStatus::Downloading => "downloading",
            ModelStatus::Loading => "loading",
            ModelStatus::Ready => "ready",
            ModelStatus::Error => "error",
            ModelStatus::Unsupported => "unsupported",
        }
    }
}

impl std::fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A progress report for the local model lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelProgress {
    pub status: ModelStatus,
    /// Fraction complete in `[0, 1]`.
    pub progress: f64,
    pub text: String,
}

impl ModelProgress {
    pub fn new(status: ModelStatus, progress: f64, text: impl Into<String>) -> Self {
        Self {
            status,
            progress: crate::triage::clamp_unit(progress),
            text: text.into(),
        }
    }
}

impl Default for ModelProgress {
    fn default() -> Self {
        Self::new(ModelStatus::Idle, 0.0, "")
    }
}
