//! Online/offline signals.
//!
//! Connectivity is observational: the façade mirrors it into its state, but
//! routing never consults it.

use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use ht_domain::config::ConnectivityConfig;
use ht_domain::error::{Error, Result};

/// A source of online/offline transitions.
pub trait ConnectivitySource: Send + Sync {
    /// Receiver whose value is `true` while the network is reachable.
    fn subscribe(&self) -> watch::Receiver<bool>;

    fn is_online(&self) -> bool {
        *self.subscribe().borrow()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Manual
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Connectivity driven by the host (for example from OS network events).
pub struct ManualConnectivity {
    tx: watch::Sender<bool>,
}

impl ManualConnectivity {
    pub fn new(online: bool) -> Self {
        let (tx, _) = watch::channel(online);
        Self { tx }
    }

    pub fn set_online(&self, online: bool) {
        self.tx.send_if_modified(|current| {
            let changed = *current != online;
            *current = online;
            changed
        });
    }
}

impl ConnectivitySource for ManualConnectivity {
    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// HTTP probe
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Polls a URL on an interval. Any HTTP answer, even an error status,
/// counts as online; only transport failures count as offline.
pub struct ProbeConnectivity {
    rx: watch::Receiver<bool>,
    shutdown: CancellationToken,
}

impl ProbeConnectivity {
    /// Start probing `url`. Must be called from within a Tokio runtime.
    pub fn spawn(url: impl Into<String>, config: &ConnectivityConfig) -> Result<Self> {
        let url = url.into();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| Error::Config(format!("HTTP client build failed: {e}")))?;

        // Optimistic until the first probe says otherwise.
        let (tx, rx) = watch::channel(true);
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let interval = Duration::from_secs(config.interval_secs.max(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let online = client.head(&url).send().await.is_ok();
                tx.send_if_modified(|current| {
                    let changed = *current != online;
                    *current = online;
                    changed
                });
            }
            tracing::debug!(url = %url, "connectivity probe stopped");
        });

        Ok(Self { rx, shutdown })
    }
}

impl ConnectivitySource for ProbeConnectivity {
    fn subscribe(&self) -> watch::Receiver<bool> {
        self.rx.clone()
    }
}

impl Drop for ProbeConnectivity {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
