use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::RoleProvider;
use crate::context::LaunchContextBuilder;
use crate::error::ProviderError;
use crate::filesystem::ClusterFilesystem;
use crate::resources::{LocalResource, ResourceKind};
use crate::role::RoleSpec;

pub const ENV_ROLE: &str = "STORAGE_ROLE";
pub const ENV_HEAPSIZE: &str = "STORAGE_HEAPSIZE";
pub const ENV_CONF_DIR: &str = "STORAGE_CONF_DIR";

/// Role option overriding the configured heap size, in MB.
pub const OPTION_HEAPSIZE: &str = "storage.heapsize";

/// Roles of the storage family and the server sub-command each runs.
const ROLES: &[(&str, &str)] = &[
    ("master", "master"),
    ("regionserver", "regionserver"),
    ("worker", "regionserver"),
];

/// Settings for [`StorageServerProvider`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageProviderConfig {
    /// Heap size in MB for roles without an explicit entry.
    pub default_heap_mb: u32,
    /// Per-role heap sizes in MB.
    pub heap_mb: HashMap<String, u32>,
    /// Root log level written into each role's logging config.
    pub log_level: String,
    /// Staged config directory name exported to the process.
    pub conf_dir_name: String,
}

impl Default for StorageProviderConfig {
    fn default() -> Self {
        Self {
            default_heap_mb: 1024,
            heap_mb: HashMap::new(),
            log_level: "INFO".to_string(),
            conf_dir_name: "propagatedconf".to_string(),
        }
    }
}

impl StorageProviderConfig {
    pub fn with_heap(mut self, role: impl Into<String>, mb: u32) -> Self {
        self.heap_mb.insert(role.into(), mb);
        self
    }

    fn heap_for(&self, role: &str) -> u32 {
        self.heap_mb
            .get(role)
            .copied()
            .unwrap_or(self.default_heap_mb)
    }
}

/// Provider for distributed-storage server roles.
#[derive(Clone, Debug, Default)]
pub struct StorageServerProvider {
    config: StorageProviderConfig,
}

impl StorageServerProvider {
    pub fn new(config: StorageProviderConfig) -> Self {
        Self { config }
    }

    /// Heap size for `role`: the `storage.heapsize` option, else the config.
    fn heap_mb(&self, role: &RoleSpec) -> Result<u32, ProviderError> {
        match role.option(OPTION_HEAPSIZE) {
            Some(value) => value
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|mb| *mb > 0)
                .ok_or_else(|| ProviderError::InvalidOption {
                    role: role.name.clone(),
                    key: OPTION_HEAPSIZE.to_string(),
                    value: value.to_string(),
                }),
            None => Ok(self.config.heap_for(&role.name)),
        }
    }

    fn logging_properties(&self, role: &str) -> String {
        format!(
            "log.root.level={}\nlog.root.appender=file\nlog.file.name={}.log\n",
            self.config.log_level, role
        )
    }
}

#[async_trait]
impl RoleProvider for StorageServerProvider {
    fn name(&self) -> &str {
        "storage"
    }

    fn roles(&self) -> Vec<String> {
        ROLES.iter().map(|(role, _)| role.to_string()).collect()
    }

    fn server_command(&self, role: &str) -> Result<String, ProviderError> {
        ROLES
            .iter()
            .find(|(name, _)| *name == role)
            .map(|(_, command)| command.to_string())
            .ok_or_else(|| ProviderError::UnsupportedRole {
                provider: self.name().to_string(),
                role: role.to_string(),
            })
    }

    async fn populate_launch_context(
        &self,
        context: LaunchContextBuilder,
        fs: &dyn ClusterFilesystem,
        staging_dir: &Path,
        role: &RoleSpec,
    ) -> Result<LaunchContextBuilder, ProviderError> {
        let name = role.name.as_str();
        // Fails early for roles outside the family.
        self.server_command(name)?;
        let heap_mb = self.heap_mb(role)?;

        let file_name = format!("{name}-logging.properties");
        let path = staging_dir.join(&file_name);
        let status = fs
            .write(&path, self.logging_properties(name).as_bytes())
            .await
            .map_err(|source| ProviderError::Io {
                path: path.clone(),
                source,
            })?;
        tracing::debug!(role = %name, path = %path.display(), "wrote role logging config");

        Ok(context
            .resource(
                format!("{}/{file_name}", self.config.conf_dir_name),
                LocalResource::from_status(fs, &status, ResourceKind::File),
            )
            .env(ENV_ROLE, name)
            .env(ENV_HEAPSIZE, heap_mb.to_string())
            .env(ENV_CONF_DIR, self.config.conf_dir_name.clone()))
    }
}
