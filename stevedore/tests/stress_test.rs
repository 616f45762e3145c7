//! Stress tests for concurrent launches.
//!
//! Hundreds of workers share one coordinator and one filesystem; every launch
//! must stay isolated and report exactly once.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use stevedore::*;
use stevedore_testkit::*;

const LAUNCHES: usize = 400;

fn seeded_fs() -> InMemoryFilesystem {
    let fs = InMemoryFilesystem::new();
    fs.add_file(format!("{TEST_CONF_DIR}/core-site.xml"), "<configuration/>");
    fs.add_file("/cluster/extra/master.jar", vec![1u8; 16]);
    fs.add_file("/cluster/extra/worker.jar", vec![2u8; 32]);
    fs
}

fn providers() -> ProviderRegistry {
    ProviderRegistry::new()
        .with_provider(Arc::new(
            StubProvider::new("masters")
                .with_role("master")
                .with_server_command("master")
                .with_resource("lib/master.jar", "/cluster/extra/master.jar")
                .with_delay(Duration::from_millis(20)),
        ))
        .with_provider(Arc::new(
            StubProvider::new("workers")
                .with_role("worker")
                .with_server_command("regionserver")
                .with_resource("lib/worker.jar", "/cluster/extra/worker.jar"),
        ))
}

fn role_for(i: usize) -> &'static str {
    if i % 2 == 0 {
        "master"
    } else {
        "worker"
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_launches_are_isolated() {
    let coordinator = Arc::new(RecordingCoordinator::new(seeded_fs()));
    let supervisor = LaunchSupervisor::new(
        SupervisorConfig::default(),
        Arc::clone(&coordinator),
        providers(),
    );

    let mut worker_ids = Vec::with_capacity(LAUNCHES);
    for i in 0..LAUNCHES {
        let id = supervisor
            .spawn_launch(
                container(&format!("c-{i:04}")),
                RoleSpec::new(role_for(i)).with_option("env.LAUNCH_INDEX", i.to_string()),
            )
            .await
            .expect("spawn should succeed");
        worker_ids.push(id);
    }
    supervisor.shutdown().await.unwrap();

    coordinator.assert_submission_count_eq(LAUNCHES);
    for id in &worker_ids {
        assert_eq!(coordinator.finish_count(*id), 1);
    }
    assert_eq!(supervisor.live_workers(), 0);

    for (i, _) in worker_ids.iter().enumerate() {
        let container_id = format!("c-{i:04}");
        let submission = coordinator.submission_for(&container_id).unwrap();
        let keys: HashSet<&str> = submission.context.local_resources.keys().collect();

        let (own, foreign) = if role_for(i) == "master" {
            ("lib/master.jar", "lib/worker.jar")
        } else {
            ("lib/worker.jar", "lib/master.jar")
        };
        assert!(keys.contains(own), "{container_id} misses {own}");
        assert!(!keys.contains(foreign), "{container_id} sees {foreign}");
        assert_eq!(keys.len(), 2);

        assert_eq!(
            submission.context.environment["LAUNCH_INDEX"],
            i.to_string()
        );
        assert_eq!(submission.record.container_id.as_str(), container_id);
        assert_eq!(submission.context.identity.principal, container_id);
    }

    let registry = coordinator.launches();
    assert_eq!(registry.len(), LAUNCHES);
    assert_eq!(registry.by_role("master").len(), LAUNCHES / 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_storage_roles_stage_only_their_own_files() {
    const ROLES: [&str; 3] = ["master", "regionserver", "worker"];

    let fs = seeded_fs();
    let coordinator = Arc::new(RecordingCoordinator::new(fs.clone()));
    let supervisor = LaunchSupervisor::new(
        SupervisorConfig::default(),
        Arc::clone(&coordinator),
        ProviderRegistry::new().with_provider(Arc::new(StorageServerProvider::default())),
    );

    for i in 0..LAUNCHES {
        supervisor
            .spawn_launch(
                container(&format!("c-{i:04}")),
                RoleSpec::new(ROLES[i % ROLES.len()]),
            )
            .await
            .expect("spawn should succeed");
    }
    supervisor.shutdown().await.unwrap();

    coordinator.assert_submission_count_eq(LAUNCHES);
    for i in 0..LAUNCHES {
        let container_id = format!("c-{i:04}");
        let role = ROLES[i % ROLES.len()];
        let submission = coordinator.submission_for(&container_id).unwrap();
        let keys: Vec<&str> = submission.context.local_resources.keys().collect();
        let own = format!("propagatedconf/{role}-logging.properties");
        assert_eq!(
            keys,
            vec![own.as_str(), "propagatedconf/core-site.xml"],
            "{container_id} ({role})"
        );

        let logging = submission.context.local_resources.get(&own).unwrap();
        assert!(logging.locator.to_string().ends_with(&format!(
            "/.launches/{container_id}/{role}-logging.properties"
        )));
        let contents = fs
            .read(format!("{TEST_CONF_DIR}/.launches/{container_id}/{role}-logging.properties"))
            .unwrap();
        assert_eq!(logging.size, contents.len() as u64);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_slow_worker_may_finish_after_fast_one() {
    let coordinator = Arc::new(RecordingCoordinator::new(seeded_fs()));
    let supervisor = LaunchSupervisor::new(
        SupervisorConfig::default(),
        Arc::clone(&coordinator),
        providers(),
    );

    supervisor
        .spawn_launch(container("c-slow"), RoleSpec::new("master"))
        .await
        .unwrap();
    supervisor
        .spawn_launch(container("c-fast"), RoleSpec::new("worker"))
        .await
        .unwrap();
    supervisor.shutdown().await.unwrap();

    let order: Vec<String> = coordinator
        .reports()
        .into_iter()
        .map(|r| r.container_id.to_string())
        .collect();
    assert_eq!(order, vec!["c-fast", "c-slow"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_bounded_pool_completes_every_launch() {
    let coordinator = Arc::new(RecordingCoordinator::new(seeded_fs()));
    coordinator.set_submit_delay(Duration::from_millis(2));
    let supervisor = LaunchSupervisor::new(
        SupervisorConfig::default().with_max_concurrent_launches(4),
        Arc::clone(&coordinator),
        providers(),
    );

    for i in 0..64 {
        supervisor
            .spawn_launch(container(&format!("c-{i}")), RoleSpec::new("worker"))
            .await
            .unwrap();
    }
    supervisor.drain().await;

    let reports = coordinator.reports();
    assert_eq!(reports.len(), 64);
    let mut per_container: HashMap<String, usize> = HashMap::new();
    for report in &reports {
        assert!(report.outcome.is_submitted());
        *per_container.entry(report.container_id.to_string()).or_default() += 1;
    }
    assert!(per_container.values().all(|count| *count == 1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_mixed_failures_still_report_every_worker() {
    let coordinator = Arc::new(RecordingCoordinator::new(seeded_fs()));
    let supervisor = LaunchSupervisor::new(
        SupervisorConfig::default(),
        Arc::clone(&coordinator),
        providers(),
    );

    for i in 0..100 {
        let container = if i % 3 == 0 {
            malformed_container(&format!("c-{i}"))
        } else {
            container(&format!("c-{i}"))
        };
        supervisor
            .spawn_launch(container, RoleSpec::new(role_for(i)))
            .await
            .unwrap();
    }
    supervisor.shutdown().await.unwrap();

    let reports = coordinator
        .wait_for_reports(100, Duration::from_secs(5))
        .await
        .unwrap();
    let failed = reports
        .iter()
        .filter(|r| r.outcome.failure().is_some())
        .count();
    assert_eq!(failed, 34);
    coordinator.assert_submission_count_eq(66);
}
