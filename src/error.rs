//! Error types for the reconciler and its collaborators.
//!
//! Each collaborator has its own error enum so the reconciler can branch on
//! distinguished conditions (most importantly [`StoreError::NotFound`])
//! without inspecting messages.  [`ReconcileError`] wraps whichever
//! collaborator failed together with the operation and container involved.

use std::path::PathBuf;

use thiserror::Error;

/// Failures reported by a version store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No entry is recorded for the container.  Drives the first-seen path.
    #[error("container not found: {0}")]
    NotFound(String),

    #[error("error {op} versions database {path}")]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("error decoding versions database {path}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("error encoding versions database")]
    Encode(#[source] serde_json::Error),

    /// The document was written by a newer release.
    #[error("unsupported versions database version {found} (supported up to {supported})")]
    UnsupportedSchema { found: u32, supported: u32 },

    #[error("could not determine a state directory for the versions database")]
    NoStateDir,
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Failures reported while enumerating running containers.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("error connecting to container runtime")]
    Connect(#[source] bollard::errors::Error),

    #[error("error listing running containers")]
    List(#[source] bollard::errors::Error),

    #[error("running container reports neither a name nor an id")]
    Unidentified,

    #[error("container {container} reports no image id")]
    MissingImage { container: String },

    #[error("error inspecting image {image} of container {container}")]
    InspectImage {
        container: String,
        image: String,
        #[source]
        source: bollard::errors::Error,
    },
}

/// Failures reported while delivering a notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("error sending notification request")]
    Http(#[source] reqwest::Error),

    /// The remote end answered with a non-success status.
    #[error("notification rejected with status {0}")]
    BadStatus(reqwest::StatusCode),
}

/// The first failure of a reconciliation pass.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("error listing running containers")]
    ListContainers(#[source] RuntimeError),

    #[error("error looking up container {name} in versions database")]
    Lookup {
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("error creating container {name} in versions database")]
    Create {
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("error updating container {name} in versions database")]
    Update {
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("error sending update notification for container {name}")]
    Notify {
        name: String,
        #[source]
        source: NotifyError,
    },

    #[error("error flushing versions database")]
    Flush(#[source] StoreError),
}

impl ReconcileError {
    /// Name of the container the pass failed on, when the failure was per-container.
    pub fn container(&self) -> Option<&str> {
        match self {
            ReconcileError::Lookup { name, .. }
            | ReconcileError::Create { name, .. }
            | ReconcileError::Update { name, .. }
            | ReconcileError::Notify { name, .. } => Some(name),
            ReconcileError::ListContainers(_) | ReconcileError::Flush(_) => None,
        }
    }
}
