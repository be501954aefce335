//! Wiring a [`TriageEngine`] from configuration.

use std::sync::Arc;

use ht_domain::config::Config;
use ht_domain::error::Result;
use ht_local_model::{DeviceProbe, HttpEngineLoader, ModelManager};
use ht_providers::{HttpTriageApi, InferenceRouter};
use ht_sessions::OfflineStore;

use crate::connectivity::{ConnectivitySource, ProbeConnectivity};
use crate::facade::TriageEngine;

impl TriageEngine {
    /// Build the production engine: HTTP triage API, device capability
    /// probe, HTTP weights loader, JSON-file session store, and an HTTP
    /// connectivity probe. Must be called from within a Tokio runtime.
    pub fn from_config(config: &Config) -> Result<Self> {
        let api = Arc::new(HttpTriageApi::new(&config.remote)?);

        let local = &config.local_model;
        let model = ModelManager::new(
            local.model_id.clone(),
            Arc::new(DeviceProbe::new(local.capability.clone())),
            Arc::new(HttpEngineLoader::new(local.clone())?),
        );

        let router = InferenceRouter::new(api, model, local.model_version.clone());
        let store = Arc::new(OfflineStore::new(&config.store.state_path));

        let probe_url = config
            .connectivity
            .probe_url
            .clone()
            .unwrap_or_else(|| config.remote.base_url.clone());
        let connectivity: Arc<dyn ConnectivitySource> =
            Arc::new(ProbeConnectivity::spawn(probe_url, &config.connectivity)?);

        tracing::info!(
            remote = %config.remote.base_url,
            model = %local.model_id,
            state_path = %config.store.state_path.display(),
            "triage engine initialized"
        );

        Ok(Self::new(router, store, connectivity, config.store.history_limit))
    }
}
