use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// On-device model
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalModelConfig {
    /// Model identifier, reported in logs and progress text.
    #[serde(default = "d_model_id")]
    pub model_id: String,

    /// Version string recorded on the remote audit session.
    #[serde(default = "d_model_version")]
    pub model_version: String,

    /// Where to fetch weights on first use. `None` means the weights must
    /// already be present in `cache_dir`.
    #[serde(default)]
    pub weights_url: Option<String>,

    /// Filename of the weights inside `cache_dir`.
    #[serde(default = "d_weights_filename")]
    pub weights_filename: String,

    /// Expected SHA-256 of the weights file (hex).
    #[serde(default)]
    pub sha256: Option<String>,

    /// Weights cache directory.
    #[serde(default = "d_cache_dir")]
    pub cache_dir: PathBuf,

    /// Base URL of the local OpenAI-compatible inference runtime.
    #[serde(default = "d_runtime_url")]
    pub runtime_url: String,

    /// How long to wait for the runtime to report healthy after load.
    #[serde(default = "d_load_timeout_secs")]
    pub load_timeout_secs: u64,

    #[serde(default = "d_temperature")]
    pub temperature: f32,

    #[serde(default = "d_max_tokens")]
    pub max_tokens: u32,

    #[serde(default)]
    pub capability: CapabilityConfig,
}

impl Default for LocalModelConfig {
    fn default() -> Self {
        Self {
            model_id: d_model_id(),
            model_version: d_model_version(),
            weights_url: None,
            weights_filename: d_weights_filename(),
            sha256: None,
            cache_dir: d_cache_dir(),
            runtime_url: d_runtime_url(),
            load_timeout_secs: d_load_timeout_secs(),
            temperature: d_temperature(),
            max_tokens: d_max_tokens(),
            capability: CapabilityConfig::default(),
        }
    }
}

impl LocalModelConfig {
    pub fn weights_path(&self) -> PathBuf {
        self.cache_dir.join(&self.weights_filename)
    }
}

/// Hardware capability probing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityConfig {
    /// Skip probing: `Some(true)` always capable, `Some(false)` never.
    #[serde(default)]
    pub force: Option<bool>,

    /// Device nodes whose presence indicates a usable accelerator.
    #[serde(default = "d_device_paths")]
    pub device_paths: Vec<PathBuf>,
}

impl Default for CapabilityConfig {
    fn default() -> Self {
        Self {
            force: None,
            device_paths: d_device_paths(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_model_id() -> String {
    "gemma-2-2b-it-q4f16_1".into()
}
fn d_model_version() -> String {
    "medgemma-4b-local".into()
}
fn d_weights_filename() -> String {
    "gemma-2-2b-it-q4f16_1.gguf".into()
}
fn d_cache_dir() -> PathBuf {
    PathBuf::from("./data/models")
}
fn d_runtime_url() -> String {
    "http://127.0.0.1:11435".into()
}
fn d_load_timeout_secs() -> u64 {
    120
}
fn d_temperature() -> f32 {
    0.3
}
fn d_max_tokens() -> u32 {
    1024
}
fn d_device_paths() -> Vec<PathBuf> {
    vec![
        PathBuf::from("/dev/dri/renderD128"),
        PathBuf::from("/dev/nvidia0"),
        PathBuf::from("/dev/kfd"),
    ]
}
