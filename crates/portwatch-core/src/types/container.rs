use serde::{Deserialize, Serialize};

/// Length of a short container id
pub const SHORT_ID_LEN: usize = 12;

/// Image tag used when a container's image has no tag
pub const UNKNOWN_IMAGE: &str = "unknown";

/// A container known to the local container engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRecord {
    /// Short (12 character) container id
    pub id: String,

    /// Container name without the leading slash
    pub name: String,

    /// Container state (running, exited, ...)
    pub status: String,

    /// First image tag, or `"unknown"`
    pub image_tag: String,
}

impl ContainerRecord {
    /// Build a record from raw engine fields.
    ///
    /// The id is shortened, the name loses its leading `/`, and images that
    /// are missing or only referenced by digest become `"unknown"`.
    #[must_use]
    pub fn new(id: &str, name: &str, status: &str, image: Option<&str>) -> Self {
        let id: String = id
            .strip_prefix("sha256:")
            .unwrap_or(id)
            .chars()
            .take(SHORT_ID_LEN)
            .collect();

        let image_tag = image
            .map(str::trim)
            .filter(|i| !i.is_empty() && !i.starts_with("sha256:"))
            .unwrap_or(UNKNOWN_IMAGE)
            .to_string();

        Self {
            id,
            name: name.trim_start_matches('/').to_string(),
            status: status.to_string(),
            image_tag,
        }
    }

    /// Returns true if the engine did not report a usable tag
    #[must_use]
    pub fn has_unknown_image(&self) -> bool {
        self.image_tag == UNKNOWN_IMAGE
    }
}
