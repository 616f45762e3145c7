//! Staging of launch resources.
//!
//! A launch stages two resource families next to whatever the role provider
//! already added: the generated config bundle, placed under a fixed relative
//! directory so command arguments can reference it, and optionally a packaged
//! cluster image. The [`LocalResources`] map keeps insertion order, which is
//! the order entries appear in the launch record.

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::LaunchConfig;
use crate::context::LaunchContextBuilder;
use crate::descriptor::ClusterDescriptor;
use crate::error::StagingError;
use crate::filesystem::{ClusterFilesystem, FileStatus};

/// Where a node fetches a staged resource from.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceLocator {
    pub scheme: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub file: String,
}

impl ResourceLocator {
    pub fn new(
        scheme: impl Into<String>,
        host: Option<String>,
        port: Option<u16>,
        file: impl Into<String>,
    ) -> Self {
        Self {
            scheme: scheme.into(),
            host,
            port,
            file: file.into(),
        }
    }

    /// Locator for a path on a filesystem every node mounts.
    pub fn file(path: &Path) -> Self {
        Self::new("file", None, None, path.to_string_lossy())
    }
}

impl fmt::Display for ResourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://", self.scheme)?;
        if let Some(host) = &self.host {
            write!(f, "{host}")?;
            if let Some(port) = self.port {
                write!(f, ":{port}")?;
            }
        }
        if !self.file.starts_with('/') {
            write!(f, "/")?;
        }
        write!(f, "{}", self.file)
    }
}

/// How the node treats a downloaded resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceKind {
    /// Copied as is.
    File,
    /// Unpacked into a directory named after the resource key.
    Archive,
}

/// Who may share a localized resource on the node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceVisibility {
    Public,
    Private,
    #[default]
    Application,
}

/// A resource the node must localize before the process starts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalResource {
    pub locator: ResourceLocator,
    pub size: u64,
    pub modified: DateTime<Utc>,
    pub kind: ResourceKind,
    pub visibility: ResourceVisibility,
}

impl LocalResource {
    pub fn from_status(
        fs: &dyn ClusterFilesystem,
        status: &FileStatus,
        kind: ResourceKind,
    ) -> Self {
        Self {
            locator: fs.locator(&status.path),
            size: status.len,
            modified: status.modified,
            kind,
            visibility: ResourceVisibility::Application,
        }
    }
}

/// Insertion-ordered map of resource key to resource.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalResources {
    entries: Vec<(String, LocalResource)>,
}

impl LocalResources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a resource. An existing key is replaced in place and keeps its
    /// position; a new key is appended.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        resource: LocalResource,
    ) -> Option<LocalResource> {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => Some(std::mem::replace(existing, resource)),
            None => {
                self.entries.push((key, resource));
                None
            }
        }
    }

    /// Merge `other` into this map, in `other`'s order.
    pub fn merge(&mut self, other: LocalResources) {
        for (key, resource) in other.entries {
            self.insert(key, resource);
        }
    }

    pub fn get(&self, key: &str) -> Option<&LocalResource> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, resource)| resource)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &LocalResource)> {
        self.entries
            .iter()
            .map(|(key, resource)| (key.as_str(), resource))
    }

    /// `key=locator` lines in map order.
    pub fn describe(&self) -> Vec<String> {
        self.iter()
            .map(|(key, resource)| format!("{key}={}", resource.locator))
            .collect()
    }
}

/// Stages the config bundle and the optional cluster image.
#[derive(Clone, Debug)]
pub struct ResourceResolver {
    conf_dir_name: String,
    image_dir_name: String,
}

impl ResourceResolver {
    pub fn new(config: &LaunchConfig) -> Self {
        Self {
            conf_dir_name: config.conf_dir_name.clone(),
            image_dir_name: config.image_dir_name.clone(),
        }
    }

    /// Stage every regular file of `conf_dir` under the relative config
    /// directory, ordered by file name.
    pub async fn stage_config_bundle(
        &self,
        fs: &dyn ClusterFilesystem,
        conf_dir: &Path,
    ) -> Result<LocalResources, StagingError> {
        let mut files: Vec<FileStatus> = fs
            .list(conf_dir)
            .await
            .map_err(|source| StagingError::ConfigDir {
                path: conf_dir.to_path_buf(),
                source,
            })?
            .into_iter()
            .filter(|status| !status.is_dir)
            .collect();

        if files.is_empty() {
            return Err(StagingError::EmptyConfigDir {
                path: conf_dir.to_path_buf(),
            });
        }
        files.sort_by(|a, b| a.path.file_name().cmp(&b.path.file_name()));

        let mut staged = LocalResources::new();
        for status in &files {
            let Some(name) = status.path.file_name() else {
                continue;
            };
            let key =
                format!("{}/{}", self.conf_dir_name, name.to_string_lossy());
            staged.insert(
                key,
                LocalResource::from_status(fs, status, ResourceKind::File),
            );
        }
        Ok(staged)
    }

    /// Stage the packaged cluster image as an archive.
    pub async fn stage_image(
        &self,
        fs: &dyn ClusterFilesystem,
        image_path: &Path,
    ) -> Result<(String, LocalResource), StagingError> {
        let status = fs.status(image_path).await.map_err(|source| {
            StagingError::Image {
                path: image_path.to_path_buf(),
                source,
            }
        })?;
        if status.is_dir {
            return Err(StagingError::Image {
                path: image_path.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "image path is a directory",
                ),
            });
        }
        let resource =
            LocalResource::from_status(fs, &status, ResourceKind::Archive);
        Ok((self.image_dir_name.clone(), resource))
    }

    /// Merge the config bundle, then the image when the descriptor names
    /// one, into the builder's resources.
    pub async fn resolve(
        &self,
        mut builder: LaunchContextBuilder,
        fs: &dyn ClusterFilesystem,
        conf_dir: &Path,
        descriptor: &ClusterDescriptor,
    ) -> Result<LaunchContextBuilder, StagingError> {
        let config = self.stage_config_bundle(fs, conf_dir).await?;
        builder = builder.merge_resources(config);

        if let Some(image_path) = &descriptor.image_path {
            tracing::info!(image = %image_path.display(), "using image path");
            let (key, resource) = self.stage_image(fs, image_path).await?;
            builder = builder.resource(key, resource);
        }
        Ok(builder)
    }
}
