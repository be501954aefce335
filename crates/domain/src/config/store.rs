use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Offline session store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Root directory for on-device state.
    #[serde(default = "d_state_path")]
    pub state_path: PathBuf,

    /// Default number of sessions returned by history reads.
    #[serde(default = "d_history_limit")]
    pub history_limit: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            state_path: d_state_path(),
            history_limit: d_history_limit(),
        }
    }
}

fn d_state_path() -> PathBuf {
    PathBuf::from("./data/state")
}
fn d_history_limit() -> usize {
    50
}
