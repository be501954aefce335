//! Hardware capability probing.

use ht_domain::config::CapabilityConfig;
use ht_domain::error::Result;

/// Reports whether the device can run the local model at all.
#[async_trait::async_trait]
pub trait CapabilityProbe: Send + Sync {
    /// `Ok(false)` when the capability is absent. Errors are treated as
    /// absent by the caller.
    async fn probe(&self) -> Result<bool>;
}

/// Probes for accelerator device nodes on the local filesystem.
pub struct DeviceProbe {
    config: CapabilityConfig,
}

impl DeviceProbe {
    pub fn new(config: CapabilityConfig) -> Self {
        Self { config }
    }
}

#[async_trait::async_trait]
impl CapabilityProbe for DeviceProbe {
    async fn probe(&self) -> Result<bool> {
        if let Some(forced) = self.config.force {
            tracing::debug!(forced, "capability probe overridden by config");
            return Ok(forced);
        }

        for path in &self.config.device_paths {
            if tokio::fs::try_exists(path).await? {
                tracing::debug!(device = %path.display(), "accelerator device found");
                return Ok(true);
            }
        }

        Ok(false)
    }
}

/// A probe with a fixed answer, for hosts where capability is known ahead
/// of time.
pub struct FixedProbe(pub bool);

#[async_trait::async_trait]
impl CapabilityProbe for FixedProbe {
    async fn probe(&self) -> Result<bool> {
        Ok(self.0)
    }
}
