//! Compute Adapter
//!
//! `ComputeActions` over the blade management REST API.

use crate::config::ComputeConfig;
use crate::domain::{resolve_address, Blade, BootSourceType, ComputeActions, ResetType};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

pub struct HttpComputeActions {
    client: reqwest::Client,
}

impl HttpComputeActions {
    pub fn new(config: &ComputeConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self { client })
    }

    async fn send(
        &self,
        blade: &Blade,
        action: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<()> {
        let response = request.send().await.map_err(|e| action_error(blade, action, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(action_error(blade, action, format!("HTTP {}", status)));
        }
        Ok(())
    }
}

fn action_error(blade: &Blade, action: &str, reason: impl ToString) -> Error {
    Error::ComputeAction {
        blade: blade.id.to_string(),
        action: action.to_string(),
        reason: reason.to_string(),
    }
}

fn reset_url(blade: &Blade) -> Result<String> {
    let path = format!(
        "{}/Actions/ComputerSystem.Reset",
        blade.source_uri.trim_end_matches('/')
    );
    resolve_address(&blade.service_uri, &path)
}

fn boot_override_body(boot_source: BootSourceType) -> Value {
    json!({
        "Boot": {
            "BootSourceOverrideEnabled": "Continuous",
            "BootSourceOverrideTarget": boot_source.to_string(),
        }
    })
}

#[async_trait]
impl ComputeActions for HttpComputeActions {
    async fn reset(&self, blade: &Blade, reset_type: ResetType) -> Result<()> {
        let action = format!("reset {}", reset_type);
        let url = reset_url(blade)?;
        info!("Resetting {} ({}) via {}", blade.id, reset_type, url);

        let request = self
            .client
            .post(&url)
            .json(&json!({ "ResetType": reset_type.to_string() }));
        self.send(blade, &action, request).await
    }

    async fn override_boot_source_permanently(
        &self,
        blade: &Blade,
        boot_source: BootSourceType,
    ) -> Result<()> {
        let action = format!("boot override {}", boot_source);
        let url = resolve_address(&blade.service_uri, &blade.source_uri)?;
        info!("Overriding boot source of {} to {}", blade.id, boot_source);

        let request = self.client.patch(&url).json(&boot_override_body(boot_source));
        self.send(blade, &action, request).await
    }
}
