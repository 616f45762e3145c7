use serde::{Deserialize, Serialize};

/// Layout conventions shared by every launch.
///
/// These names are part of the contract with the launched process and with
/// downstream tooling (restart, log collection), so they are configured once
/// per coordinator rather than per role.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchConfig {
    /// Relative directory the generated config bundle is staged under.
    pub conf_dir_name: String,
    /// Resource key the cluster image is staged under.
    pub image_dir_name: String,
    /// Directory under the generated config dir holding per-launch provider
    /// files, one subdirectory per container. Never part of the config bundle.
    pub staging_dir_name: String,
    /// Environment variable pointing the process at its log directory.
    pub log_dir_env: String,
    /// Log directory placeholder expanded by the container runtime.
    pub log_dir_placeholder: String,
    /// File under the log directory receiving stdout.
    pub stdout_file: String,
    /// File under the log directory receiving stderr.
    pub stderr_file: String,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            conf_dir_name: "propagatedconf".to_string(),
            image_dir_name: "image".to_string(),
            staging_dir_name: ".launches".to_string(),
            log_dir_env: "APP_LOG_DIR".to_string(),
            log_dir_placeholder: "<LOG_DIR>".to_string(),
            stdout_file: "out.txt".to_string(),
            stderr_file: "err.txt".to_string(),
        }
    }
}

impl LaunchConfig {
    /// Set the staged config directory name.
    pub fn with_conf_dir_name(mut self, name: impl Into<String>) -> Self {
        self.conf_dir_name = name.into();
        self
    }

    /// Set the staged image resource key.
    pub fn with_image_dir_name(mut self, name: impl Into<String>) -> Self {
        self.image_dir_name = name.into();
        self
    }

    /// Set the per-launch staging directory name.
    pub fn with_staging_dir_name(mut self, name: impl Into<String>) -> Self {
        self.staging_dir_name = name.into();
        self
    }

    /// Set the log directory environment variable.
    pub fn with_log_dir_env(mut self, name: impl Into<String>) -> Self {
        self.log_dir_env = name.into();
        self
    }
}

/// Configuration for the launch worker pool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Upper bound on concurrently running workers; `None` is unbounded.
    pub max_concurrent_launches: Option<usize>,
    /// How long shutdown waits for each in-flight worker, in seconds.
    pub shutdown_timeout_secs: u64,
    /// Buffer size of the launch event channel.
    pub event_capacity: usize,
    pub launch: LaunchConfig,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_launches: None,
            shutdown_timeout_secs: 30,
            event_capacity: 256,
            launch: LaunchConfig::default(),
        }
    }
}

impl SupervisorConfig {
    /// Bound the number of concurrently running workers.
    pub fn with_max_concurrent_launches(mut self, limit: usize) -> Self {
        self.max_concurrent_launches = Some(limit);
        self
    }

    /// Set the per-worker shutdown wait.
    pub fn with_shutdown_timeout(mut self, secs: u64) -> Self {
        self.shutdown_timeout_secs = secs;
        self
    }

    /// Set the launch layout conventions.
    pub fn with_launch(mut self, launch: LaunchConfig) -> Self {
        self.launch = launch;
        self
    }
}
