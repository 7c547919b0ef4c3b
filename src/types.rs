//! Data structures shared by the reconciler and its collaborators.
//!
//! A [`ContainerRecord`] is what the runtime reports, what the version
//! store remembers and what a notification describes.  The version is an
//! opaque label; the only thing ever done with it is an equality check.

/// A running container and the version label of the image it was started from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRecord {
    /// Container name, unique among the containers running at observation time.
    pub name: String,
    /// Version label of the container image, e.g. an OCI `image.version` label.
    pub image_version: String,
}

impl ContainerRecord {
    pub fn new(name: impl Into<String>, image_version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image_version: image_version.into(),
        }
    }
}
