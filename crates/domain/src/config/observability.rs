use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Logging
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Log output configuration.
///
/// `RUST_LOG` always takes precedence over `log_filter` when set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Default `EnvFilter` directive.
    #[serde(default = "d_log_filter")]
    pub log_filter: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: d_log_filter(),
            json_logs: false,
        }
    }
}

fn d_log_filter() -> String {
    "htriage=info,ht_engine=info,ht_providers=info,ht_local_model=info,ht_sessions=info".into()
}
