//! Role providers populate the provider-specific part of a launch context.
//!
//! A provider serves one role family. The worker only relies on the contract
//! that after [`RoleProvider::populate_launch_context`] returns, the builder
//! holds everything the provider mandates for the role; it knows nothing else
//! about provider internals.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::LaunchContextBuilder;
use crate::error::ProviderError;
use crate::filesystem::ClusterFilesystem;
use crate::role::RoleSpec;

/// Storage server role family.
pub mod storage;

pub use storage::{StorageProviderConfig, StorageServerProvider};

/// Capability interface of one role family.
#[async_trait]
pub trait RoleProvider: Send + Sync {
    /// Name of the role family, for logs.
    fn name(&self) -> &str;

    /// Roles this provider can launch.
    fn roles(&self) -> Vec<String>;

    /// Server sub-command token that starts `role`.
    fn server_command(&self, role: &str) -> Result<String, ProviderError>;

    /// Add provider-mandated environment and resources for `role`.
    ///
    /// `staging_dir` belongs to this launch alone. Files written there are
    /// not staged on their own; add them to `context` as resources.
    async fn populate_launch_context(
        &self,
        context: LaunchContextBuilder,
        fs: &dyn ClusterFilesystem,
        staging_dir: &Path,
        role: &RoleSpec,
    ) -> Result<LaunchContextBuilder, ProviderError>;
}

/// Role name to provider lookup used when workers are constructed.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn RoleProvider>>,
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut roles: Vec<(&str, &str)> = self
            .providers
            .iter()
            .map(|(role, provider)| (role.as_str(), provider.name()))
            .collect();
        roles.sort_unstable();
        f.debug_struct("ProviderRegistry")
            .field("roles", &roles)
            .finish()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `provider` for every role it reports.
    pub fn register(&mut self, provider: Arc<dyn RoleProvider>) {
        for role in provider.roles() {
            self.register_role(role, Arc::clone(&provider));
        }
    }

    /// Register `provider` for a single role, replacing any earlier one.
    pub fn register_role(
        &mut self,
        role: impl Into<String>,
        provider: Arc<dyn RoleProvider>,
    ) {
        let role = role.into();
        if let Some(previous) = self.providers.insert(role.clone(), provider) {
            tracing::warn!(
                role = %role,
                previous = %previous.name(),
                "role provider replaced"
            );
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn RoleProvider>) -> Self {
        self.register(provider);
        self
    }

    pub fn provider_for(&self, role: &str) -> Option<Arc<dyn RoleProvider>> {
        self.providers.get(role).cloned()
    }

    pub fn roles(&self) -> Vec<&str> {
        let mut roles: Vec<&str> =
            self.providers.keys().map(String::as_str).collect();
        roles.sort_unstable();
        roles
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str, &'static [&'static str]);

    #[async_trait]
    impl RoleProvider for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn roles(&self) -> Vec<String> {
            self.1.iter().map(|r| r.to_string()).collect()
        }

        fn server_command(&self, role: &str) -> Result<String, ProviderError> {
            Ok(role.to_string())
        }

        async fn populate_launch_context(
            &self,
            context: LaunchContextBuilder,
            _fs: &dyn ClusterFilesystem,
            _staging_dir: &Path,
            _role: &RoleSpec,
        ) -> Result<LaunchContextBuilder, ProviderError> {
            Ok(context)
        }
    }

    #[test]
    fn test_registry_selects_by_role_name() {
        let registry = ProviderRegistry::new()
            .with_provider(Arc::new(Named("storage", &["master", "worker"])))
            .with_provider(Arc::new(Named("gateway", &["rest"])));

        assert_eq!(registry.roles(), vec!["master", "rest", "worker"]);
        assert_eq!(registry.provider_for("worker").unwrap().name(), "storage");
        assert_eq!(registry.provider_for("rest").unwrap().name(), "gateway");
        assert!(registry.provider_for("thrift").is_none());
    }

    #[test]
    fn test_later_registration_replaces_role() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(Named("old", &["worker"])));
        registry.register_role("worker", Arc::new(Named("new", &[])));

        assert_eq!(registry.provider_for("worker").unwrap().name(), "new");
    }
}
