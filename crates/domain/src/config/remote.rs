use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Remote triage service
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the triage REST API (no trailing slash needed).
    #[serde(default = "d_base_url")]
    pub base_url: String,

    /// Bearer token for the API. Prefer `api_key_env`.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Environment variable holding the bearer token.
    #[serde(default = "d_api_key_env")]
    pub api_key_env: String,

    /// Request timeout in seconds.
    #[serde(default = "d_timeout_secs")]
    pub timeout_secs: u64,

    /// Max retries on transient failures (network errors, 5xx).
    #[serde(default = "d_max_retries")]
    pub max_retries: u32,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: d_base_url(),
            api_key: None,
            api_key_env: d_api_key_env(),
            timeout_secs: d_timeout_secs(),
            max_retries: d_max_retries(),
        }
    }
}

impl RemoteConfig {
    /// Resolve the bearer token: direct key first, then the env var.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(ref key) = self.api_key {
            tracing::warn!(
                "API key loaded from plaintext config field 'api_key'; \
                 prefer 'api_key_env' instead"
            );
            return Some(key.clone());
        }
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|v| !v.is_empty())
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_base_url() -> String {
    "http://127.0.0.1:8000/api/v1".into()
}
fn d_api_key_env() -> String {
    "HT_API_TOKEN".into()
}
fn d_timeout_secs() -> u64 {
    30
}
fn d_max_retries() -> u32 {
    2
}
