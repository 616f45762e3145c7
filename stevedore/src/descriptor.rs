use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::LaunchConfig;

/// Cluster-wide deployment description, owned by the coordinator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterDescriptor {
    pub name: String,
    /// Packaged binary image to stage into every container, if any.
    #[serde(default)]
    pub image_path: Option<PathBuf>,
    /// Home of the pre-installed binaries used when no image is staged.
    pub install_dir: PathBuf,
}

impl ClusterDescriptor {
    pub fn new(name: impl Into<String>, install_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            image_path: None,
            install_dir: install_dir.into(),
        }
    }

    pub fn with_image(mut self, image_path: impl Into<PathBuf>) -> Self {
        self.image_path = Some(image_path.into());
        self
    }

    pub fn has_image(&self) -> bool {
        self.image_path.is_some()
    }

    /// Stock resolution of a launch script.
    ///
    /// With an image the path stays relative to the container's working
    /// directory, where the image archive is unpacked; otherwise it is the
    /// absolute path into the pre-installed home.
    pub fn executable_path(&self, config: &LaunchConfig, script: &str) -> PathBuf {
        let home = if self.has_image() {
            PathBuf::from(&config.image_dir_name)
        } else {
            self.install_dir.clone()
        };
        home.join("bin").join(script)
    }
}
