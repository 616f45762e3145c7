use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;
use parking_lot::Mutex;
use stevedore::*;
use uuid::Uuid;

pub const TEST_CONF_DIR: &str = "/cluster/app/generated";
pub const TEST_INSTALL_DIR: &str = "/opt/storage";
pub const TEST_IMAGE_PATH: &str = "/cluster/app/image/storage.tar.gz";
pub const TEST_SCRIPT: &str = "start-worker";

/// One accepted launch as the coordinator saw it.
#[derive(Clone, Debug)]
pub struct Submission {
    pub container_id: ContainerId,
    pub context: LaunchContext,
    pub record: LaunchRecord,
}

/// Coordinator that records every call for later assertions.
#[derive(Clone)]
pub struct RecordingCoordinator {
    fs: Arc<dyn ClusterFilesystem>,
    conf_dir: PathBuf,
    descriptor: ClusterDescriptor,
    config: LaunchConfig,
    submissions: Arc<Mutex<Vec<Submission>>>,
    reports: Arc<Mutex<Vec<WorkerReport>>>,
    rejection: Arc<Mutex<Option<String>>>,
    submit_delay: Arc<Mutex<Option<Duration>>>,
    launches: LaunchRegistry,
}

impl RecordingCoordinator {
    /// Coordinator over `fs` with the default layout and no image.
    pub fn new(fs: impl ClusterFilesystem + 'static) -> Self {
        Self {
            fs: Arc::new(fs),
            conf_dir: PathBuf::from(TEST_CONF_DIR),
            descriptor: ClusterDescriptor::new("test-cluster", TEST_INSTALL_DIR),
            config: LaunchConfig::default(),
            submissions: Arc::new(Mutex::new(Vec::new())),
            reports: Arc::new(Mutex::new(Vec::new())),
            rejection: Arc::new(Mutex::new(None)),
            submit_delay: Arc::new(Mutex::new(None)),
            launches: LaunchRegistry::new(),
        }
    }

    pub fn with_conf_dir(mut self, conf_dir: impl Into<PathBuf>) -> Self {
        self.conf_dir = conf_dir.into();
        self
    }

    pub fn with_image(mut self, image_path: impl Into<PathBuf>) -> Self {
        self.descriptor = self.descriptor.with_image(image_path);
        self
    }

    pub fn with_config(mut self, config: LaunchConfig) -> Self {
        self.config = config;
        self
    }

    /// Reject every later submission with `reason`.
    pub fn reject_submissions(&self, reason: impl Into<String>) {
        *self.rejection.lock() = Some(reason.into());
    }

    pub fn set_submit_delay(&self, delay: Duration) {
        *self.submit_delay.lock() = Some(delay);
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().clone()
    }

    pub fn submission_for(&self, container: &str) -> Option<Submission> {
        self.submissions
            .lock()
            .iter()
            .find(|s| s.container_id.as_str() == container)
            .cloned()
    }

    pub fn reports(&self) -> Vec<WorkerReport> {
        self.reports.lock().clone()
    }

    pub fn report_for(&self, container: &str) -> Option<WorkerReport> {
        self.reports
            .lock()
            .iter()
            .find(|r| r.container_id.as_str() == container)
            .cloned()
    }

    /// How many times `worker_id` was reported finished.
    pub fn finish_count(&self, worker_id: Uuid) -> usize {
        self.reports
            .lock()
            .iter()
            .filter(|r| r.worker_id == worker_id)
            .count()
    }

    pub fn launches(&self) -> LaunchRegistry {
        self.launches.clone()
    }

    pub fn assert_submission_count_eq(&self, expected: usize) {
        let actual = self.submissions.lock().len();
        assert_eq!(
            actual, expected,
            "Expected {} submissions, got {}",
            expected, actual
        );
    }

    /// Poll until at least `count` workers reported, or fail after `within`.
    pub async fn wait_for_reports(
        &self,
        count: usize,
        within: Duration,
    ) -> anyhow::Result<Vec<WorkerReport>> {
        let deadline = tokio::time::Instant::now() + within;
        loop {
            let reports = self.reports();
            if reports.len() >= count {
                return Ok(reports);
            }
            if tokio::time::Instant::now() >= deadline {
                bail!(
                    "expected {} worker reports within {:?}, got {}",
                    count,
                    within,
                    reports.len()
                );
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl Coordinator for RecordingCoordinator {
    fn filesystem(&self) -> Arc<dyn ClusterFilesystem> {
        Arc::clone(&self.fs)
    }

    fn generated_config_dir(&self) -> PathBuf {
        self.conf_dir.clone()
    }

    fn cluster_descriptor(&self) -> ClusterDescriptor {
        self.descriptor.clone()
    }

    fn resolve_executable_path(&self, descriptor: &ClusterDescriptor) -> PathBuf {
        descriptor.executable_path(&self.config, TEST_SCRIPT)
    }

    async fn submit(
        &self,
        container: &AllocatedContainer,
        context: LaunchContext,
        record: LaunchRecord,
    ) -> Result<(), SubmissionError> {
        let delay = *self.submit_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let rejection = self.rejection.lock().clone();
        if let Some(reason) = rejection {
            return Err(SubmissionError::Rejected {
                container: container.id.clone(),
                reason,
            });
        }

        self.launches.register(record.clone());
        self.submissions.lock().push(Submission {
            container_id: container.id.clone(),
            context,
            record,
        });
        Ok(())
    }

    fn on_worker_finished(&self, report: &WorkerReport) {
        tracing::debug!(
            container_id = %report.container_id,
            outcome = report.outcome.as_str(),
            "worker finished"
        );
        self.reports.lock().push(report.clone());
    }
}

/// Configurable role provider.
#[derive(Clone, Debug)]
pub struct StubProvider {
    name: String,
    roles: Vec<String>,
    server_command: String,
    env: HashMap<String, String>,
    resources: Vec<(String, PathBuf)>,
    failure: Option<String>,
    panic_on_populate: bool,
    delay: Option<Duration>,
}

impl StubProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            roles: Vec::new(),
            server_command: "server".to_string(),
            env: HashMap::new(),
            resources: Vec::new(),
            failure: None,
            panic_on_populate: false,
            delay: None,
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    pub fn with_server_command(mut self, command: impl Into<String>) -> Self {
        self.server_command = command.into();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Stage the file at `path` under `key` during population.
    pub fn with_resource(mut self, key: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.resources.push((key.into(), path.into()));
        self
    }

    /// Fail population with an invalid option error.
    pub fn failing(mut self, reason: impl Into<String>) -> Self {
        self.failure = Some(reason.into());
        self
    }

    pub fn panicking(mut self) -> Self {
        self.panic_on_populate = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl RoleProvider for StubProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn roles(&self) -> Vec<String> {
        self.roles.clone()
    }

    fn server_command(&self, _role: &str) -> Result<String, ProviderError> {
        Ok(self.server_command.clone())
    }

    async fn populate_launch_context(
        &self,
        mut context: LaunchContextBuilder,
        fs: &dyn ClusterFilesystem,
        _staging_dir: &Path,
        role: &RoleSpec,
    ) -> Result<LaunchContextBuilder, ProviderError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.panic_on_populate {
            panic!("stub provider {} panicked for role {}", self.name, role.name);
        }
        if let Some(reason) = &self.failure {
            return Err(ProviderError::InvalidOption {
                role: role.name.clone(),
                key: "stub".to_string(),
                value: reason.clone(),
            });
        }

        for (key, path) in &self.resources {
            let status = fs.status(path).await.map_err(|source| ProviderError::Io {
                path: path.clone(),
                source,
            })?;
            context = context.resource(
                key.clone(),
                LocalResource::from_status(fs, &status, ResourceKind::File),
            );
        }
        Ok(context.envs(self.env.clone()))
    }
}
