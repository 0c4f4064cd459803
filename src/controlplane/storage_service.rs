//! Storage Service Adapter
//!
//! `StorageControlPlane` over the storage service REST API. Volume creation
//! is asynchronous on the service side: the new volume is polled at a fixed
//! delay until it reports `Enabled` (ready) or `Absent` (creation failed).

use crate::config::ProvisioningConfig;
use crate::domain::{
    resolve_address, LogicalVolumeCreationRequest, RemoteTargetCreationRequest,
    StorageControlPlane,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::header::LOCATION;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

/// Resource state reported by the storage service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ResourceState {
    Enabled,
    Disabled,
    Absent,
    Starting,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct ResourceStatus {
    #[serde(rename = "State")]
    state: Option<ResourceState>,
}

#[derive(Debug, Deserialize)]
struct PolledResource {
    #[serde(rename = "Status")]
    status: Option<ResourceStatus>,
}

pub struct HttpStorageControlPlane {
    client: reqwest::Client,
    poll_delay: Duration,
}

impl HttpStorageControlPlane {
    pub fn new(config: &ProvisioningConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            client,
            poll_delay: config.poll_delay(),
        })
    }

    /// POST a creation request and return the absolute address of the
    /// created resource
    async fn post(&self, endpoint: &str, collection: &str, body: &Value) -> Result<String> {
        let url = resolve_address(endpoint, collection)?;
        info!("Posting to {}", url);

        let response = self.client.post(&url).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::ControlPlaneAction {
                operation: format!("POST {}", url),
                reason: format!("HTTP {}", status),
            });
        }

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| Error::ControlPlaneAction {
                operation: format!("POST {}", url),
                reason: "response carries no Location".into(),
            })?;
        resolve_address(endpoint, location)
    }

    async fn read_state(&self, location: &str) -> Option<ResourceState> {
        let response = match self.client.get(location).send().await {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                debug!("Could not read {}: HTTP {}", location, response.status());
                return None;
            }
            Err(e) => {
                debug!("Could not read {}: {}", location, e);
                return None;
            }
        };
        match response.json::<PolledResource>().await {
            Ok(resource) => resource.status.and_then(|status| status.state),
            Err(e) => {
                debug!("Unreadable state of {}: {}", location, e);
                None
            }
        }
    }

    /// Poll until the volume is Enabled or Absent. Transport errors and
    /// unknown states keep polling; the reconciler's creation timeout is
    /// the only bound, aborting the task from outside.
    async fn wait_for_enabled(&self, location: String) -> Result<String> {
        loop {
            match self.read_state(&location).await {
                Some(ResourceState::Enabled) => return Ok(location),
                Some(ResourceState::Absent) => {
                    return Err(Error::ControlPlaneAction {
                        operation: format!("create logical drive {}", location),
                        reason: "drive became absent during creation".into(),
                    })
                }
                _ => tokio::time::sleep(self.poll_delay).await,
            }
        }
    }
}

fn collection(storage_service: &str, name: &str) -> String {
    format!("{}/{}", storage_service.trim_end_matches('/'), name)
}

fn odata_link(path: &str) -> Value {
    json!({ "@odata.id": path })
}

fn logical_volume_body(request: &LogicalVolumeCreationRequest) -> Value {
    let mut links = json!({
        "LogicalDrives": [odata_link(&request.volume_group)],
    });
    if let Some(master) = &request.master_drive {
        links["MasterDrive"] = odata_link(master);
    }

    json!({
        "Name": "Composed Logical Drive",
        "Type": "LVM",
        "Mode": "LV",
        "Protected": false,
        "CapacityGB": request.capacity_gb,
        "Bootable": true,
        "Snapshot": request.snapshot,
        "Links": links,
    })
}

fn remote_target_body(request: &RemoteTargetCreationRequest) -> Value {
    let mut body = json!({
        "Addresses": [{
            "iSCSI": {
                "TargetIQN": request.target_iqn,
                "TargetLUN": [{
                    "LUN": request.lun,
                    "LogicalDrive": odata_link(&request.logical_drive),
                }],
            }
        }],
    });
    if let Some(initiator) = &request.initiator_iqn {
        body["Initiator"] = json!([{ "iSCSI": { "InitiatorIQN": initiator } }]);
    }
    body
}

#[async_trait]
impl StorageControlPlane for HttpStorageControlPlane {
    async fn create_logical_volume(
        &self,
        endpoint: &str,
        storage_service: &str,
        request: LogicalVolumeCreationRequest,
    ) -> Result<String> {
        let location = self
            .post(
                endpoint,
                &collection(storage_service, "LogicalDrives"),
                &logical_volume_body(&request),
            )
            .await?;
        self.wait_for_enabled(location).await
    }

    async fn create_target(
        &self,
        endpoint: &str,
        storage_service: &str,
        request: RemoteTargetCreationRequest,
    ) -> Result<String> {
        self.post(
            endpoint,
            &collection(storage_service, "Targets"),
            &remote_target_body(&request),
        )
        .await
    }
}
