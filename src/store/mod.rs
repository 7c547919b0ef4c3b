use async_trait::async_trait;

use crate::error::StoreError;
use crate::types::ContainerRecord;

pub mod json;
pub use json::JsonVersionStore;

/// Keyed store of the last recorded image version per container name.
///
/// Mutations are held in memory until [`flush`](VersionStore::flush) makes
/// them durable.
#[async_trait]
pub trait VersionStore: Send + Sync {
    /// Fetch the recorded entry for `name`, or [`StoreError::NotFound`].
    async fn get_container(&self, name: &str) -> Result<ContainerRecord, StoreError>;

    /// Record a new entry.  An existing entry with the same name is overwritten.
    async fn create_container(&mut self, record: &ContainerRecord) -> Result<(), StoreError>;

    /// Replace the version of an existing entry, or fail with [`StoreError::NotFound`].
    async fn update_container(&mut self, record: &ContainerRecord) -> Result<(), StoreError>;

    /// Persist every mutation since the last successful flush.  A no-op when
    /// nothing is pending.
    async fn flush(&mut self) -> Result<(), StoreError>;

    /// Drop unflushed mutations, returning to the last durable state.  Used
    /// between passes after a failure, so the next pass sees what a fresh
    /// process would.
    async fn discard_pending(&mut self) -> Result<(), StoreError>;
}
