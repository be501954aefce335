use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Connectivity tracking
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Online/offline probing. Observational only; routing never reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectivityConfig {
    /// URL polled to decide whether the network is reachable. When `None`,
    /// the remote service base URL is used.
    #[serde(default)]
    pub probe_url: Option<String>,

    #[serde(default = "d_interval_secs")]
    pub interval_secs: u64,

    #[serde(default = "d_probe_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            probe_url: None,
            interval_secs: d_interval_secs(),
            timeout_secs: d_probe_timeout_secs(),
        }
    }
}

fn d_interval_secs() -> u64 {
    15
}
fn d_probe_timeout_secs() -> u64 {
    5
}
