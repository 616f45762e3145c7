use std::collections::BTreeMap;

use crate::credentials::DelegatedIdentity;
use crate::resources::{LocalResource, LocalResources};

/// Everything the container manager needs to start a role's process.
#[derive(Clone, Debug)]
pub struct LaunchContext {
    pub identity: DelegatedIdentity,
    pub environment: BTreeMap<String, String>,
    pub local_resources: LocalResources,
    /// Single-element list holding the full command line.
    pub commands: Vec<String>,
}

impl LaunchContext {
    pub fn command(&self) -> Option<&str> {
        self.commands.first().map(String::as_str)
    }
}

/// Launch context under construction.
///
/// Each launch stage takes the builder by value and hands it on, so no two
/// stages ever hold it at the same time.
#[derive(Clone, Debug)]
pub struct LaunchContextBuilder {
    identity: DelegatedIdentity,
    environment: BTreeMap<String, String>,
    local_resources: LocalResources,
    command: Option<String>,
}

impl LaunchContextBuilder {
    /// Start an empty context for a credentialed launch.
    pub fn new(identity: DelegatedIdentity) -> Self {
        Self {
            identity,
            environment: BTreeMap::new(),
            local_resources: LocalResources::new(),
            command: None,
        }
    }

    /// Set one environment variable, replacing any earlier value.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    /// Layer `vars` over the current environment.
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.environment
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn resource(
        mut self,
        key: impl Into<String>,
        resource: LocalResource,
    ) -> Self {
        self.local_resources.insert(key, resource);
        self
    }

    pub fn merge_resources(mut self, resources: LocalResources) -> Self {
        self.local_resources.merge(resources);
        self
    }

    pub fn command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn environment(&self) -> &BTreeMap<String, String> {
        &self.environment
    }

    pub fn local_resources(&self) -> &LocalResources {
        &self.local_resources
    }

    pub fn build(self) -> LaunchContext {
        LaunchContext {
            identity: self.identity,
            environment: self.environment,
            local_resources: self.local_resources,
            commands: self.command.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> DelegatedIdentity {
        DelegatedIdentity {
            principal: "c-1".to_string(),
            tokens: Vec::new(),
        }
    }

    #[test]
    fn test_later_env_layers_win() {
        let context = LaunchContextBuilder::new(identity())
            .env("HEAP", "256")
            .envs([("HEAP", "1024"), ("ROLE", "master")])
            .command("bin/start")
            .build();

        assert_eq!(context.environment["HEAP"], "1024");
        assert_eq!(context.environment["ROLE"], "master");
        assert_eq!(context.commands, vec!["bin/start".to_string()]);
        assert_eq!(context.command(), Some("bin/start"));
    }

    #[test]
    fn test_build_without_command_has_no_commands() {
        let context = LaunchContextBuilder::new(identity()).build();
        assert!(context.commands.is_empty());
        assert!(context.local_resources.is_empty());
    }
}
