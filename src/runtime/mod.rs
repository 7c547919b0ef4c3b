use async_trait::async_trait;

use crate::error::RuntimeError;
use crate::types::ContainerRecord;

pub mod docker;
pub use docker::DockerRuntime;

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Snapshot of the containers running right now, with the version of
    /// the image each one was started from.
    async fn list_running_containers(&self) -> Result<Vec<ContainerRecord>, RuntimeError>;
}
