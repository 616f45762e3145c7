//! Spawning and tracking of launch workers.
//!
//! The coordinator hands each allocated container to
//! [`LaunchSupervisor::spawn_launch`], which builds a [`LaunchWorker`] for the
//! role's provider and runs it on its own tokio task. Workers never share
//! mutable launch state; the supervisor only keeps their join handles and the
//! live worker count.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify, Semaphore};
use tracing::Instrument;
use uuid::Uuid;

use crate::config::SupervisorConfig;
use crate::container::AllocatedContainer;
use crate::coordinator::{Coordinator, WorkerRegistry};
use crate::credentials::CredentialBinder;
use crate::error::SpawnError;
use crate::events::{LaunchEvent, LaunchEventBus};
use crate::provider::ProviderRegistry;
use crate::role::RoleSpec;
use crate::telemetry;
use crate::worker::LaunchWorker;

/// Token for signaling shutdown to whoever is watching the supervisor.
#[derive(Clone, Debug)]
pub struct ShutdownToken {
    inner: Arc<ShutdownTokenInner>,
}

#[derive(Debug)]
struct ShutdownTokenInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ShutdownTokenInner {
                cancelled: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Wait until cancelled.
    pub async fn cancelled(&self) {
        let notified = self.inner.notify.notified();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

impl Default for ShutdownToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Deregisters a worker when its task ends, however it ends.
struct LiveWorker {
    registry: WorkerRegistry,
    worker_id: Uuid,
}

impl LiveWorker {
    fn enter(
        registry: WorkerRegistry,
        worker_id: Uuid,
        container: &AllocatedContainer,
    ) -> Self {
        registry.register(worker_id, container.id.clone());
        telemetry::set_live_workers(registry.len());
        Self {
            registry,
            worker_id,
        }
    }
}

impl Drop for LiveWorker {
    fn drop(&mut self) {
        self.registry.deregister(self.worker_id);
        telemetry::set_live_workers(self.registry.len());
    }
}

/// Runs one launch worker per allocated container.
pub struct LaunchSupervisor<C: Coordinator + ?Sized + 'static> {
    config: SupervisorConfig,
    coordinator: Arc<C>,
    providers: ProviderRegistry,
    binder: CredentialBinder,
    events: Arc<LaunchEventBus>,
    limiter: Option<Arc<Semaphore>>,
    workers: WorkerRegistry,
    shutdown_token: ShutdownToken,
    worker_handles: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl<C: Coordinator + ?Sized + 'static> fmt::Debug for LaunchSupervisor<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LaunchSupervisor")
            .field("config", &self.config)
            .field("coordinator_type", &std::any::type_name::<C>())
            .field("providers", &self.providers)
            .field("live_workers", &self.workers.len())
            .field("shutdown_cancelled", &self.shutdown_token.is_cancelled())
            .finish()
    }
}

impl<C: Coordinator + ?Sized + 'static> LaunchSupervisor<C> {
    pub fn new(
        config: SupervisorConfig,
        coordinator: Arc<C>,
        providers: ProviderRegistry,
    ) -> Self {
        let limiter = config
            .max_concurrent_launches
            .map(|limit| Arc::new(Semaphore::new(limit.max(1))));
        let events = Arc::new(LaunchEventBus::new(config.event_capacity));
        Self {
            config,
            coordinator,
            providers,
            binder: CredentialBinder::new(),
            events,
            limiter,
            workers: WorkerRegistry::new(),
            shutdown_token: ShutdownToken::new(),
            worker_handles: Mutex::new(Vec::new()),
        }
    }

    /// Validate container tokens with `binder` instead of the wall clock one.
    pub fn with_binder(mut self, binder: CredentialBinder) -> Self {
        self.binder = binder;
        self
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn coordinator(&self) -> Arc<C> {
        Arc::clone(&self.coordinator)
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    pub fn events(&self) -> Arc<LaunchEventBus> {
        Arc::clone(&self.events)
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<LaunchEvent> {
        self.events.subscribe()
    }

    pub fn shutdown_token(&self) -> ShutdownToken {
        self.shutdown_token.clone()
    }

    /// Workers whose task has not ended yet, including ones waiting for a
    /// concurrency slot.
    pub fn live_workers(&self) -> usize {
        self.workers.len()
    }

    /// Start a worker launching `role` into `container`.
    ///
    /// Returns the worker id once the task is spawned; the launch itself
    /// proceeds in the background. No worker is created, and the coordinator
    /// is not called back, when the role has no provider or the supervisor is
    /// shutting down.
    pub async fn spawn_launch(
        &self,
        container: AllocatedContainer,
        role: RoleSpec,
    ) -> Result<Uuid, SpawnError> {
        // Held until the handle is pushed so `shutdown` either sees the new
        // worker or this call sees the cancelled token.
        let mut handles = self.worker_handles.lock().await;
        if self.shutdown_token.is_cancelled() {
            telemetry::record_spawn_rejected(&role.name, "shutting_down");
            return Err(SpawnError::ShuttingDown {
                container: container.id,
            });
        }
        let Some(provider) = self.providers.provider_for(&role.name) else {
            telemetry::record_spawn_rejected(&role.name, "unknown_role");
            return Err(SpawnError::UnknownRole { role: role.name });
        };

        let worker = LaunchWorker::new(
            container,
            role,
            provider,
            Arc::clone(&self.coordinator),
        )
        .with_config(self.config.launch.clone())
        .with_binder(self.binder.clone())
        .with_events(Arc::clone(&self.events));
        let worker_id = worker.id();
        let span = telemetry::launch_span(
            worker_id.to_string(),
            worker.container().id.as_str(),
            &worker.role().name,
        );
        let worker = worker.with_span(span);

        let live = LiveWorker::enter(
            self.workers.clone(),
            worker_id,
            worker.container(),
        );
        let limiter = self.limiter.clone();

        let handle = tokio::spawn(async move {
            let _live = live;
            let _permit = match limiter {
                Some(limiter) => limiter.acquire_owned().await.ok(),
                None => None,
            };
            worker.run().await;
        });

        handles.retain(|handle| !handle.is_finished());
        handles.push(handle);

        Ok(worker_id)
    }

    /// Wait for every worker spawned so far to end.
    pub async fn drain(&self) {
        let handles = {
            let mut guard = self.worker_handles.lock().await;
            std::mem::take(&mut *guard)
        };
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!("Launch worker task failed: {:?}", e);
            }
        }
    }

    /// Stop accepting launches and wait for in-flight workers.
    ///
    /// Each worker gets `shutdown_timeout_secs`; one that overruns is left
    /// running and reported.
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        let span = telemetry::shutdown_span(self.live_workers());
        async {
            tracing::info!("Initiating graceful shutdown of launch supervisor");
            self.shutdown_token.cancel();

            let handles = {
                let mut guard = self.worker_handles.lock().await;
                std::mem::take(&mut *guard)
            };
            let timeout = Duration::from_secs(self.config.shutdown_timeout_secs);

            for handle in handles {
                match tokio::time::timeout(timeout, handle).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::warn!("Launch worker task failed: {:?}", e)
                    }
                    Err(_) => tracing::warn!(
                        "Launch worker timed out during shutdown"
                    ),
                }
            }

            tracing::info!("Launch supervisor shutdown complete");
            Ok(())
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, Utc};
    use tokio::time::timeout;

    use crate::config::LaunchConfig;
    use crate::container::{ContainerId, NodeAddress};
    use crate::context::{LaunchContext, LaunchContextBuilder};
    use crate::credentials::{ContainerTokenIdentifier, TokenBlob};
    use crate::descriptor::ClusterDescriptor;
    use crate::error::{ProviderError, SubmissionError};
    use crate::filesystem::{ClusterFilesystem, LocalFilesystem};
    use crate::provider::RoleProvider;
    use crate::record::LaunchRecord;
    use crate::worker::WorkerReport;

    struct CountingCoordinator {
        conf_dir: PathBuf,
        submit_delay: Duration,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        finished: AtomicUsize,
    }

    impl CountingCoordinator {
        fn new(conf_dir: &Path, submit_delay: Duration) -> Self {
            Self {
                conf_dir: conf_dir.to_path_buf(),
                submit_delay,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                finished: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Coordinator for CountingCoordinator {
        fn filesystem(&self) -> Arc<dyn ClusterFilesystem> {
            Arc::new(LocalFilesystem::new())
        }

        fn generated_config_dir(&self) -> PathBuf {
            self.conf_dir.clone()
        }

        fn cluster_descriptor(&self) -> ClusterDescriptor {
            ClusterDescriptor::new("test", "/opt/app")
        }

        fn resolve_executable_path(
            &self,
            descriptor: &ClusterDescriptor,
        ) -> PathBuf {
            descriptor.executable_path(&LaunchConfig::default(), "start")
        }

        async fn submit(
            &self,
            _container: &AllocatedContainer,
            _context: LaunchContext,
            _record: LaunchRecord,
        ) -> Result<(), SubmissionError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.submit_delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }

        fn on_worker_finished(&self, _report: &WorkerReport) {
            self.finished.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct PlainProvider;

    #[async_trait]
    impl RoleProvider for PlainProvider {
        fn name(&self) -> &str {
            "plain"
        }

        fn roles(&self) -> Vec<String> {
            vec!["worker".into()]
        }

        fn server_command(&self, _role: &str) -> Result<String, ProviderError> {
            Ok("server".into())
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

    fn container(id: &str) -> AllocatedContainer {
        let node = NodeAddress::new("node-1", 8041);
        let token = TokenBlob::issue(
            ContainerTokenIdentifier {
                container_id: ContainerId::new(id),
                node: node.to_string(),
                submitter: "am".into(),
                expires_at: Utc::now() + ChronoDuration::hours(1),
            },
            b"pw",
        );
        AllocatedContainer::new(id, node, token)
    }

    fn setup(
        config: SupervisorConfig,
        submit_delay: Duration,
    ) -> (tempfile::TempDir, LaunchSupervisor<CountingCoordinator>) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("site.xml"), "<configuration/>").unwrap();
        let coordinator =
            Arc::new(CountingCoordinator::new(dir.path(), submit_delay));
        let providers =
            ProviderRegistry::new().with_provider(Arc::new(PlainProvider));
        let supervisor = LaunchSupervisor::new(config, coordinator, providers);
        (dir, supervisor)
    }

    #[tokio::test]
    async fn test_unknown_role_creates_no_worker() {
        let (_dir, supervisor) =
            setup(SupervisorConfig::default(), Duration::ZERO);

        let err = supervisor
            .spawn_launch(container("c-1"), RoleSpec::new("thrift"))
            .await
            .unwrap_err();

        assert!(matches!(err, SpawnError::UnknownRole { .. }));
        assert_eq!(supervisor.live_workers(), 0);
        supervisor.shutdown().await.unwrap();
        assert_eq!(supervisor.coordinator().finished.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_concurrency_limit_bounds_in_flight_launches() {
        let (_dir, supervisor) = setup(
            SupervisorConfig::default().with_max_concurrent_launches(2),
            Duration::from_millis(20),
        );

        for i in 0..8 {
            supervisor
                .spawn_launch(container(&format!("c-{i}")), RoleSpec::new("worker"))
                .await
                .unwrap();
        }
        supervisor.drain().await;

        let coordinator = supervisor.coordinator();
        assert_eq!(coordinator.finished.load(Ordering::SeqCst), 8);
        assert!(coordinator.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(supervisor.live_workers(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_in_flight_and_refuses_new_launches() {
        let (_dir, supervisor) =
            setup(SupervisorConfig::default(), Duration::from_millis(50));
        let token = supervisor.shutdown_token();

        supervisor
            .spawn_launch(container("c-1"), RoleSpec::new("worker"))
            .await
            .unwrap();
        supervisor.shutdown().await.unwrap();

        timeout(Duration::from_secs(1), token.cancelled())
            .await
            .expect("token should be cancelled");
        assert_eq!(supervisor.coordinator().finished.load(Ordering::SeqCst), 1);

        let err = supervisor
            .spawn_launch(container("c-2"), RoleSpec::new("worker"))
            .await
            .unwrap_err();
        assert!(matches!(err, SpawnError::ShuttingDown { .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_launch_racing_shutdown_is_refused_or_awaited() {
        let (_dir, supervisor) =
            setup(SupervisorConfig::default(), Duration::from_millis(5));
        let supervisor = Arc::new(supervisor);

        let spawners: Vec<_> = (0..32)
            .map(|i| {
                let supervisor = Arc::clone(&supervisor);
                tokio::spawn(async move {
                    supervisor
                        .spawn_launch(container(&format!("c-{i}")), RoleSpec::new("worker"))
                        .await
                })
            })
            .collect();
        tokio::task::yield_now().await;
        supervisor.shutdown().await.unwrap();
        let finished_at_shutdown =
            supervisor.coordinator().finished.load(Ordering::SeqCst);

        let mut accepted = 0;
        for spawner in spawners {
            match spawner.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(err) => assert!(matches!(err, SpawnError::ShuttingDown { .. })),
            }
        }
        assert_eq!(finished_at_shutdown, accepted);
        assert_eq!(supervisor.live_workers(), 0);
    }
}
