//! Composer Configuration
//!
//! Loaded from a YAML file, every field has a default so partial files work.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// =============================================================================
// Reconciler
// =============================================================================

/// Configuration for the remote target creation reconciler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcilerConfig {
    /// Interval between sweeps of the pending creations
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Pending creations older than this are aborted (0 disables)
    #[serde(default = "default_creation_timeout_secs")]
    pub creation_timeout_secs: u64,
}

fn default_sweep_interval_secs() -> u64 {
    30
}

fn default_creation_timeout_secs() -> u64 {
    900
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval_secs(),
            creation_timeout_secs: default_creation_timeout_secs(),
        }
    }
}

impl ReconcilerConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn creation_timeout(&self) -> Option<Duration> {
        (self.creation_timeout_secs > 0).then(|| Duration::from_secs(self.creation_timeout_secs))
    }
}

// =============================================================================
// Provisioning
// =============================================================================

/// Configuration for remote target provisioning against storage services
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningConfig {
    /// Background creations running at the same time
    #[serde(default = "default_max_concurrent_creations")]
    pub max_concurrent_creations: usize,

    /// Fixed delay between polls of a volume being created
    #[serde(default = "default_poll_delay_ms")]
    pub poll_delay_ms: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Initiator allowed to log in to created targets
    #[serde(default)]
    pub initiator_iqn: Option<String>,
}

fn default_max_concurrent_creations() -> usize {
    4
}

fn default_poll_delay_ms() -> u64 {
    5000
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            max_concurrent_creations: default_max_concurrent_creations(),
            poll_delay_ms: default_poll_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            initiator_iqn: None,
        }
    }
}

impl ProvisioningConfig {
    pub fn poll_delay(&self) -> Duration {
        Duration::from_millis(self.poll_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// =============================================================================
// Compute
// =============================================================================

/// Configuration for compute (blade) actions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeConfig {
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ComputeConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// =============================================================================
// Composer
// =============================================================================

/// Top-level composer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposerConfig {
    #[serde(default)]
    pub reconciler: ReconcilerConfig,

    #[serde(default)]
    pub provisioning: ProvisioningConfig,

    #[serde(default)]
    pub compute: ComputeConfig,

    /// Capacity of the inventory event channel
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

fn default_event_channel_capacity() -> usize {
    crate::inventory::DEFAULT_EVENT_CAPACITY
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            reconciler: ReconcilerConfig::default(),
            provisioning: ProvisioningConfig::default(),
            compute: ComputeConfig::default(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

impl ComposerConfig {
    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.reconciler.sweep_interval_secs == 0 {
            return Err(Error::Configuration(
                "reconciler.sweepIntervalSecs must be positive".into(),
            ));
        }
        if self.provisioning.max_concurrent_creations == 0 {
            return Err(Error::Configuration(
                "provisioning.maxConcurrentCreations must be positive".into(),
            ));
        }
        if self.event_channel_capacity == 0 {
            return Err(Error::Configuration(
                "eventChannelCapacity must be positive".into(),
            ));
        }
        Ok(())
    }
}
