//! Container discovery via the Docker Engine API.

use async_trait::async_trait;
use bollard::container::ListContainersOptions;
use bollard::models::ContainerSummary;
use bollard::Docker;
use portwatch_core::ContainerRecord;
use tracing::debug;

use crate::error::{InventoryError, Result};
use crate::provider::ContainerProvider;

const PROVIDER: &str = "docker";

/// Lists every container (running or stopped) from the local engine.
#[derive(Debug, Clone)]
pub struct DockerContainerProvider {
    docker: Docker,
}

impl DockerContainerProvider {
    /// Connect using `DOCKER_HOST` or the platform's default socket.
    ///
    /// No request is made here; an unreachable engine surfaces on the first
    /// listing as an outage.
    pub fn connect() -> Result<Self> {
        let docker =
            Docker::connect_with_local_defaults().map_err(|e| InventoryError::outage(PROVIDER, e))?;
        Ok(Self { docker })
    }
}

#[async_trait]
impl ContainerProvider for DockerContainerProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn containers(&self) -> Result<Vec<ContainerRecord>> {
        let options = ListContainersOptions::<String> {
            all: true,
            ..Default::default()
        };

        let summaries = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| InventoryError::outage(PROVIDER, e))?;

        debug!(count = summaries.len(), "listed containers");
        Ok(summaries.iter().map(to_record).collect())
    }
}

fn to_record(summary: &ContainerSummary) -> ContainerRecord {
    let name = summary
        .names
        .as_ref()
        .and_then(|names| names.first())
        .map_or("", String::as_str);

    ContainerRecord::new(
        summary.id.as_deref().unwrap_or_default(),
        name,
        summary.state.as_deref().unwrap_or("unknown"),
        summary.image.as_deref(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_conversion() {
        let summary = ContainerSummary {
            id: Some("0123456789abcdef0123".into()),
            names: Some(vec!["/builder".into()]),
            image: Some("unknown/unknown-builder:latest".into()),
            state: Some("running".into()),
            ..Default::default()
        };

        let rec = to_record(&summary);
        assert_eq!(rec.id, "0123456789ab");
        assert_eq!(rec.name, "builder");
        assert_eq!(rec.status, "running");
        assert_eq!(rec.image_tag, "unknown/unknown-builder:latest");
    }

    #[test]
    fn test_sparse_summary() {
        let rec = to_record(&ContainerSummary::default());
        assert_eq!(rec.id, "");
        assert_eq!(rec.status, "unknown");
        assert!(rec.has_unknown_image());
    }
}
