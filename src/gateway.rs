// MIT License
// Typed access to the panel's resources

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::BridgeConfig;
use crate::constants::{COMMAND_ACK, CONFIG_USER_COUNT, OUTPUT_CONTROL_PATH, PARTITION_CONTROL_PATH};
use crate::devices::{DesiredOutput, DesiredPartition, DeviceIdentity};
use crate::error::{BridgeError, Result};
use crate::protocol::{
    self, ConfigZone, NamedIndex, PrivilegeSet, Resource, StatusSample,
};
use crate::session::{AuthenticatedSession, SessionManager};
use crate::transport::{HttpTransport, Transport};

/// One call per panel resource.
///
/// Every call authenticates first and runs while holding the session, so
/// requests are serialized with the session's own heartbeats and logins.
pub struct PanelGateway<T> {
    session: Arc<SessionManager<T>>,
}

impl<T> Clone for PanelGateway<T> {
    fn clone(&self) -> Self {
        Self {
            session: Arc::clone(&self.session),
        }
    }
}

impl PanelGateway<HttpTransport> {
    /// Gateway over HTTP to the panel described by `config`.
    pub fn from_config(config: &BridgeConfig) -> Result<Self> {
        let transport = HttpTransport::new(config.base_url(), config.request_timeout())?;
        let session = SessionManager::new(
            Arc::new(transport),
            config.credentials(),
            config.session_policy(),
        );
        Ok(Self::new(Arc::new(session)))
    }
}

impl<T: Transport> PanelGateway<T> {
    pub fn new(session: Arc<SessionManager<T>>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Arc<SessionManager<T>> {
        &self.session
    }

    async fn read<R>(
        &self,
        resource: Resource,
        path: &str,
        decode: impl FnOnce(&str) -> Result<R>,
    ) -> Result<R> {
        let session = self.session.authenticated().await?;
        let body = session
            .transport()
            .get(path, session.token())
            .await
            .map_err(|e| e.into_fetch(resource.label()))?;
        decode(&body).map_err(|e| e.into_fetch(resource.label()))
    }

    pub async fn system_information(&self) -> Result<DeviceIdentity> {
        let resource = Resource::SystemInformation;
        self.read(resource, resource.path(), protocol::decode_system_information)
            .await
    }

    pub async fn privileges(&self) -> Result<PrivilegeSet> {
        let resource = Resource::Privileges;
        self.read(resource, resource.path(), protocol::decode_privileges)
            .await
    }

    pub async fn partition_names(&self) -> Result<Vec<NamedIndex>> {
        self.names(Resource::PartitionNames).await
    }

    pub async fn zone_names(&self) -> Result<Vec<NamedIndex>> {
        self.names(Resource::ZoneNames).await
    }

    pub async fn output_names(&self) -> Result<Vec<NamedIndex>> {
        self.names(Resource::OutputNames).await
    }

    async fn names(&self, resource: Resource) -> Result<Vec<NamedIndex>> {
        self.read(resource, resource.path(), |body| {
            protocol::decode_names(resource, body)
        })
        .await
    }

    pub async fn partition_status(&self) -> Result<Vec<StatusSample>> {
        self.statuses(Resource::PartitionStatus).await
    }

    pub async fn zone_status(&self) -> Result<Vec<StatusSample>> {
        self.statuses(Resource::ZoneStatus).await
    }

    pub async fn output_status(&self) -> Result<Vec<StatusSample>> {
        self.statuses(Resource::OutputStatus).await
    }

    /// Fetch the status list of `resource` (`pstats`, `zstats` or `ostats`).
    pub async fn statuses(&self, resource: Resource) -> Result<Vec<StatusSample>> {
        self.read(resource, resource.path(), |body| {
            protocol::decode_statuses(resource, body)
        })
        .await
    }

    /// Zones of the panel configuration file, with their partition links.
    pub async fn config_zones(&self) -> Result<Vec<ConfigZone>> {
        let resource = Resource::Config;
        // Goes out as `config.cfx?n=1?guid=<token>`, the same request the
        // panel's own web pages make.
        let path = format!("{}?n={}", resource.path(), CONFIG_USER_COUNT);
        self.read(resource, &path, protocol::decode_config).await
    }

    pub async fn control_output(&self, index: u32, desired: DesiredOutput) -> Result<()> {
        let session = self.session.authenticated().await?;
        let body = protocol::output_command_body(index, desired, session.token());
        Self::command(&session, OUTPUT_CONTROL_PATH, body).await
    }

    pub async fn control_partition(&self, index: u32, desired: DesiredPartition) -> Result<()> {
        let session = self.session.authenticated().await?;
        let body = protocol::partition_command_body(index, desired, session.token());
        Self::command(&session, PARTITION_CONTROL_PATH, body).await
    }

    async fn command(session: &AuthenticatedSession<'_, T>, path: &str, body: String) -> Result<()> {
        // Log the verb only, not the token.
        let command = body.split('?').next().unwrap_or_default().to_string();
        info!("Sending {command} to {path}");
        let reply = session.transport().post_body(path, body).await?;
        if reply != COMMAND_ACK {
            return Err(BridgeError::CommandRejected {
                command,
                expected: COMMAND_ACK,
                received: reply,
            });
        }
        debug!("{command} acknowledged");
        Ok(())
    }
}
