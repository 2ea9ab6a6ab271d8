//! [`ResourceDriver`] backed by Hetzner Cloud
//!
//! Every resource belonging to one deployment carries the label
//! `token=<identity>`: the server, its snapshots, SSH keys and the floating
//! IP. The first server found under that label is the managed one.

use async_trait::async_trait;
use servertide_core::ResourceDriver;
use servertide_domain::constants::IDENTITY_LABEL_KEY;
use servertide_domain::{
    ActualState, HcloudConfig, ResourceId, ResourcePhase, Result, ServerTideError, SnapshotRef,
};
use tracing::{debug, info, instrument, warn};

use super::client::HcloudClient;
use super::types::{CreateImageRequest, CreateServerRequest, Image, Labels, Server};

const LABEL_SERVER_NAME: &str = "server_name";
const LABEL_SERVER_TYPE: &str = "server_type";
const LABEL_SERVER_LOCATION: &str = "server_location";

/// Map a provider server status onto the coarse lifecycle phase.
pub fn phase_for_status(status: &str) -> ResourcePhase {
    match status {
        "running" | "initializing" | "starting" => ResourcePhase::Active,
        "off" => ResourcePhase::Stopped,
        _ => ResourcePhase::Transitioning,
    }
}

pub fn label_selector(identity: &str) -> String {
    format!("{IDENTITY_LABEL_KEY}={identity}")
}

/// Settings for server creation that do not come from the snapshot
#[derive(Debug, Clone, Default)]
pub struct ProvisionSettings {
    pub default_server_type: Option<String>,
    pub user_data: String,
}

impl From<&HcloudConfig> for ProvisionSettings {
    fn from(config: &HcloudConfig) -> Self {
        Self {
            default_server_type: config.default_server_type.clone(),
            user_data: config.user_data.clone(),
        }
    }
}

/// Hetzner Cloud resource driver
#[derive(Clone)]
pub struct HcloudDriver {
    client: HcloudClient,
    provision: ProvisionSettings,
}

impl HcloudDriver {
    pub fn new(client: HcloudClient, provision: ProvisionSettings) -> Self {
        Self { client, provision }
    }

    pub fn from_config(config: &HcloudConfig) -> Result<Self> {
        Ok(Self::new(HcloudClient::from_config(config)?, ProvisionSettings::from(config)))
    }

    pub fn client(&self) -> &HcloudClient {
        &self.client
    }

    async fn first_server(&self, identity: &str) -> Result<Option<Server>> {
        let servers = self.client.list_servers(&label_selector(identity)).await?;
        if servers.len() > 1 {
            warn!(
                count = servers.len(),
                "several servers carry the identity label, managing the first"
            );
        }
        Ok(servers.into_iter().next())
    }

    /// Attach the first floating IP labelled with `identity` to the server.
    ///
    /// Returns the address, or `None` when the deployment has no floating IP.
    #[instrument(skip(self))]
    pub async fn assign_floating_ip(
        &self,
        identity: &str,
        server_id: u64,
    ) -> Result<Option<String>> {
        let floating_ips = self.client.list_floating_ips(&label_selector(identity)).await?;
        let Some(floating_ip) = floating_ips.into_iter().next() else {
            debug!("no floating IP for identity");
            return Ok(None);
        };

        if floating_ip.server == Some(server_id) {
            debug!(ip = %floating_ip.ip, "floating IP already assigned");
            return Ok(Some(floating_ip.ip));
        }

        let action = self.client.assign_floating_ip(floating_ip.id, server_id).await?;
        self.client.wait_for_action(&action).await?;
        info!(ip = %floating_ip.ip, server_id, "floating IP assigned");
        Ok(Some(floating_ip.ip))
    }

    /// Assign the floating IP to whichever server currently carries `identity`.
    pub async fn assign_floating_ip_to_current(&self, identity: &str) -> Result<Option<String>> {
        let server = self
            .first_server(identity)
            .await?
            .ok_or_else(|| ServerTideError::NotFound(format!("no server labelled '{identity}'")))?;
        self.assign_floating_ip(identity, server.id).await
    }

    fn server_type_for(&self, variant: &str, snapshot: &Image) -> Result<String> {
        if !variant.is_empty() {
            return Ok(variant.to_string());
        }
        if let Some(server_type) = snapshot.labels.get(LABEL_SERVER_TYPE) {
            return Ok(server_type.clone());
        }
        self.provision.default_server_type.clone().ok_or_else(|| {
            ServerTideError::Driver(format!(
                "snapshot {} has no server_type label and no default server type is configured",
                snapshot.id
            ))
        })
    }
}

fn snapshot_ref(image: &Image) -> SnapshotRef {
    SnapshotRef {
        id: image.id,
        description: image.description.clone(),
        protected: image.protection.delete,
        created: image.created,
    }
}

/// Server labels updated to describe the production state being snapshotted.
fn snapshot_labels(identity: &str, server: &Server) -> Labels {
    let mut labels = server.labels.clone();
    labels.insert(IDENTITY_LABEL_KEY.to_string(), identity.to_string());
    labels.insert(LABEL_SERVER_NAME.to_string(), server.name.clone());
    labels.insert(LABEL_SERVER_TYPE.to_string(), server.server_type.name.clone());
    if !labels.contains_key(LABEL_SERVER_LOCATION) {
        if let Some(location) = server.location() {
            labels.insert(LABEL_SERVER_LOCATION.to_string(), location.to_string());
        }
    }
    labels
}

#[async_trait]
impl ResourceDriver for HcloudDriver {
    #[instrument(skip(self))]
    async fn query_actual_state(&self, identity: &str) -> Result<ActualState> {
        let Some(server) = self.first_server(identity).await? else {
            return Ok(ActualState::absent());
        };
        let phase = phase_for_status(&server.status);
        debug!(server_id = server.id, status = %server.status, %phase, "observed server");
        Ok(ActualState::new(phase, server.server_type.name, ResourceId(server.id)))
    }

    #[instrument(skip(self))]
    async fn create_from_snapshot(&self, identity: &str, variant: &str) -> Result<ResourceId> {
        let selector = label_selector(identity);
        let snapshot = self
            .client
            .list_snapshots(&selector)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                ServerTideError::Driver(format!("no snapshot for identity '{identity}'"))
            })?;

        let server_type = self.server_type_for(variant, &snapshot)?;
        let name = snapshot
            .labels
            .get(LABEL_SERVER_NAME)
            .cloned()
            .unwrap_or_else(|| identity.to_string());
        let location = snapshot.labels.get(LABEL_SERVER_LOCATION).cloned();
        let ssh_keys: Vec<u64> =
            self.client.list_ssh_keys(&selector).await?.into_iter().map(|key| key.id).collect();

        info!(
            snapshot = snapshot.id,
            description = %snapshot.description,
            %name,
            %server_type,
            location = location.as_deref().unwrap_or("-"),
            ssh_keys = ssh_keys.len(),
            "creating server"
        );

        let mut labels = snapshot.labels.clone();
        labels.insert(IDENTITY_LABEL_KEY.to_string(), identity.to_string());

        let request = CreateServerRequest {
            name,
            server_type,
            image: snapshot.id.to_string(),
            location,
            start_after_create: true,
            ssh_keys,
            user_data: self.provision.user_data.clone(),
            labels,
        };
        let created = self.client.create_server(&request).await?;
        self.client.wait_for_action(&created.action).await?;
        info!(server_id = created.server.id, "server created");

        if let Err(e) = self.assign_floating_ip(identity, created.server.id).await {
            warn!(error = %e, kind = e.label(), "floating IP assignment failed");
        }

        Ok(ResourceId(created.server.id))
    }

    #[instrument(skip(self))]
    async fn power_on(&self, id: ResourceId) -> Result<()> {
        let action = self.client.server_action(id.0, "poweron").await?;
        self.client.wait_for_action(&action).await
    }

    /// Graceful ACPI shutdown, then wait for the provider to report `off`.
    #[instrument(skip(self))]
    async fn power_off(&self, id: ResourceId) -> Result<()> {
        let server = self.client.get_server(id.0).await?;
        if server.status == "off" {
            debug!("server already off");
            return Ok(());
        }

        let action = self.client.server_action(id.0, "shutdown").await?;
        self.client.wait_for_action(&action).await?;
        self.client.wait_for_server_status(id.0, "off").await?;
        info!("server powered off");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn create_snapshot(&self, identity: &str, id: ResourceId) -> Result<SnapshotRef> {
        let server = self.client.get_server(id.0).await?;
        let request = CreateImageRequest {
            description: format!("creation was automated for token {identity}"),
            kind: "snapshot".to_string(),
            labels: snapshot_labels(identity, &server),
        };

        let created = self.client.create_image(id.0, &request).await?;
        self.client.wait_for_action(&created.action).await?;
        info!(snapshot = created.image.id, server = %server.name, "snapshot created");
        Ok(snapshot_ref(&created.image))
    }

    async fn list_active_snapshots(&self, identity: &str) -> Result<Vec<SnapshotRef>> {
        let images = self.client.list_snapshots(&label_selector(identity)).await?;
        Ok(images
            .iter()
            .filter(|image| image.description.contains(identity))
            .map(snapshot_ref)
            .collect())
    }

    async fn delete_snapshot(&self, snapshot: &SnapshotRef) -> Result<()> {
        self.client.delete_image(snapshot.id).await?;
        info!(snapshot = snapshot.id, "snapshot deleted");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_resource(&self, id: ResourceId) -> Result<()> {
        let action = match self.client.delete_server(id.0).await {
            Ok(action) => action,
            Err(ServerTideError::NotFound(_)) => {
                debug!("server already gone");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        self.client.wait_for_action(&action).await
    }
}
