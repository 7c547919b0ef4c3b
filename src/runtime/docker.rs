use super::ContainerRuntime;
use crate::error::RuntimeError;
use crate::types::ContainerRecord;
use async_trait::async_trait;
use bollard::container::ListContainersOptions;
use bollard::models::{ContainerSummary, ImageInspect};
use bollard::Docker;
use log::{debug, info, warn};

/// Label read from the image when none is configured.
pub const DEFAULT_VERSION_LABEL: &str = "org.opencontainers.image.version";

/// Seconds to wait for the daemon before giving up on a request.
const CONNECT_TIMEOUT_SECS: u64 = 120;

/// Runtime inspector talking to a Docker-API-compatible daemon.
///
/// Podman exposes the same API on its service socket, so pointing `socket`
/// at e.g. `/run/podman/podman.sock` works as well.
pub struct DockerRuntime {
    docker: Docker,
    version_label: String,
}

impl DockerRuntime {
    pub fn connect(socket: Option<&str>, version_label: impl Into<String>) -> Result<Self, RuntimeError> {
        let docker = match socket {
            Some(path) => {
                Docker::connect_with_socket(path, CONNECT_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)
            }
            // Handles the unix socket on Linux.
            None => Docker::connect_with_local_defaults(),
        }
        .map_err(RuntimeError::Connect)?;

        Ok(Self {
            docker,
            version_label: version_label.into(),
        })
    }

    /// Checks that the daemon answers before the first pass.
    pub async fn ping(&self) -> Result<(), RuntimeError> {
        let reply = self.docker.ping().await.map_err(RuntimeError::Connect)?;
        info!("Container runtime reachable ({})", reply);
        Ok(())
    }

    async fn image_version(&self, container: &str, image: &str) -> Result<String, RuntimeError> {
        let detail = self
            .docker
            .inspect_image(image)
            .await
            .map_err(|source| RuntimeError::InspectImage {
                container: container.to_string(),
                image: image.to_string(),
                source,
            })?;

        match label_value(&detail, &self.version_label) {
            Some(version) => Ok(version),
            None => {
                warn!(
                    "Image {} of container {} has no {} label",
                    image, container, self.version_label
                );
                Ok(String::new())
            }
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_running_containers(&self) -> Result<Vec<ContainerRecord>, RuntimeError> {
        let opts = ListContainersOptions::<String> {
            all: false,
            ..Default::default()
        };
        let containers = self
            .docker
            .list_containers(Some(opts))
            .await
            .map_err(RuntimeError::List)?;

        let mut records = Vec::with_capacity(containers.len());
        for c in containers {
            let name = container_name(&c).ok_or(RuntimeError::Unidentified)?;
            let image = match c.image_id.as_deref() {
                Some(id) if !id.is_empty() => id,
                _ => return Err(RuntimeError::MissingImage { container: name }),
            };

            let image_version = self.image_version(&name, image).await?;
            debug!("Container {} runs image {} version {:?}", name, image, image_version);
            records.push(ContainerRecord { name, image_version });
        }

        Ok(records)
    }
}

/// First listed name of a container, without the leading `/` Docker adds.
/// Falls back to the container id when the runtime reports no name.
fn container_name(summary: &ContainerSummary) -> Option<String> {
    let name = summary
        .names
        .as_ref()
        .and_then(|n| n.first())
        .map(|n| n.trim_start_matches('/').to_string())
        .filter(|n| !n.is_empty());
    let id = summary.id.as_ref().filter(|id| !id.is_empty()).cloned();
    match (name, id) {
        (Some(n), _) => Some(n),
        (_, Some(id)) => {
            warn!("Running container {} has no name, using its id", id);
            Some(id)
        }
        _ => None,
    }
}

fn label_value(detail: &ImageInspect, label: &str) -> Option<String> {
    detail
        .config
        .as_ref()
        .and_then(|c| c.labels.as_ref())
        .and_then(|labels| labels.get(label))
        .cloned()
}
