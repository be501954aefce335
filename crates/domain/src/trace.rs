use serde::Serialize;

/// Structured trace events emitted across all triage crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    ModelStatusChanged {
        status: String,
        progress: f64,
        text: String,
    },
    ModelLoadCancelled {
        model_id: String,
        phase: String,
    },
    WeightsDownloaded {
        model_id: String,
        bytes: u64,
        cache_hit: bool,
        duration_ms: u64,
    },
    RouteDecided {
        source: String,
        path: String,
        model_ready: bool,
    },
    LocalFallback {
        session_id: String,
        reason: String,
    },
    RemoteCall {
        endpoint: String,
        status: u16,
        duration_ms: u64,
    },
    SessionPersisted {
        session_id: String,
        synced: bool,
    },
    ConnectivityChanged {
        online: bool,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "ht_event");
    }
}
