use async_trait::async_trait;

use crate::error::NotifyError;
use crate::types::ContainerRecord;

pub mod telegram;
pub use telegram::TelegramNotifier;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a message announcing that `record.name` now runs
    /// `record.image_version`.  Returns once the remote end has accepted or
    /// rejected it; never retries.
    async fn create_notification(&self, record: &ContainerRecord) -> Result<(), NotifyError>;
}

/// Human readable text for an update notification.
pub fn update_message(record: &ContainerRecord) -> String {
    format!("{} was updated to {}", record.name, record.image_version)
}
