//! Launch a handful of storage roles against the local filesystem.
//!
//! Writes a generated config bundle into a temporary directory, then spawns
//! one worker per container. One container carries a broken token to show the
//! failure path. Run with `RUST_LOG=stevedore=debug` for stage-level logs.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use stevedore::*;
use stevedore_testkit::{container, malformed_container};
use tracing_subscriber::EnvFilter;

/// Coordinator that prints what it would hand to the node managers.
struct PrintingCoordinator {
    conf_dir: PathBuf,
    descriptor: ClusterDescriptor,
    launches: LaunchRegistry,
    finished: Mutex<Vec<WorkerReport>>,
}

#[async_trait]
impl Coordinator for PrintingCoordinator {
    fn filesystem(&self) -> Arc<dyn ClusterFilesystem> {
        Arc::new(LocalFilesystem::new())
    }

    fn generated_config_dir(&self) -> PathBuf {
        self.conf_dir.clone()
    }

    fn cluster_descriptor(&self) -> ClusterDescriptor {
        self.descriptor.clone()
    }

    fn resolve_executable_path(&self, descriptor: &ClusterDescriptor) -> PathBuf {
        descriptor.executable_path(&LaunchConfig::default(), "start-storage")
    }

    async fn submit(
        &self,
        container: &AllocatedContainer,
        context: LaunchContext,
        record: LaunchRecord,
    ) -> Result<(), SubmissionError> {
        println!(
            "[COORDINATOR] submitting {} with {} env vars",
            container.id,
            context.environment.len()
        );
        print!("{record}");
        self.launches.register(record);
        Ok(())
    }

    fn on_worker_finished(&self, report: &WorkerReport) {
        println!(
            "[COORDINATOR] {} ({}) finished: {} in {:?}",
            report.container_id,
            report.role,
            report.outcome.as_str(),
            report.elapsed
        );
        self.finished.lock().push(report.clone());
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("stevedore=info")),
        )
        .init();

    let workspace = tempfile::tempdir()?;
    let conf_dir = workspace.path().join("generated");
    std::fs::create_dir_all(&conf_dir)?;
    std::fs::write(conf_dir.join("storage-site.xml"), "<configuration/>")?;
    std::fs::write(conf_dir.join("core-site.xml"), "<configuration/>")?;

    let coordinator = Arc::new(PrintingCoordinator {
        conf_dir,
        descriptor: ClusterDescriptor::new("demo", "/opt/storage"),
        launches: LaunchRegistry::new(),
        finished: Mutex::new(Vec::new()),
    });
    let providers = ProviderRegistry::new().with_provider(Arc::new(
        StorageServerProvider::new(StorageProviderConfig::default().with_heap("master", 2048)),
    ));
    let supervisor = LaunchSupervisor::new(
        SupervisorConfig::default().with_max_concurrent_launches(2),
        Arc::clone(&coordinator),
        providers,
    );

    supervisor
        .spawn_launch(container("c-001"), RoleSpec::new("master"))
        .await?;
    for i in 2..=4 {
        supervisor
            .spawn_launch(
                container(&format!("c-00{i}")),
                RoleSpec::new("worker").with_option("env.JAVA_OPTS", "-Xmx1g"),
            )
            .await?;
    }
    supervisor
        .spawn_launch(malformed_container("c-005"), RoleSpec::new("worker"))
        .await?;
    if let Err(err) = supervisor
        .spawn_launch(container("c-006"), RoleSpec::new("thrift"))
        .await
    {
        println!("[MAIN] refused: {err}");
    }

    supervisor.shutdown().await?;

    println!(
        "[MAIN] {} launches recorded, {} workers finished",
        coordinator.launches.len(),
        coordinator.finished.lock().len()
    );
    Ok(())
}
