//! The coordinator side of a launch.
//!
//! A coordinator owns container submission and the bookkeeping around it.
//! Launch workers call into it through [`Coordinator`]; the registries below
//! are the thread-safe structures a coordinator typically keeps, usable from
//! many workers at once without external locking.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::container::{AllocatedContainer, ContainerId};
use crate::context::LaunchContext;
use crate::descriptor::ClusterDescriptor;
use crate::error::SubmissionError;
use crate::filesystem::ClusterFilesystem;
use crate::record::LaunchRecord;
use crate::worker::WorkerReport;

/// Collaborator that owns submission and worker accounting.
#[async_trait]
pub trait Coordinator: Send + Sync {
    /// Filesystem launch resources are staged from.
    fn filesystem(&self) -> Arc<dyn ClusterFilesystem>;

    /// Directory holding the generated config bundle.
    fn generated_config_dir(&self) -> PathBuf;

    fn cluster_descriptor(&self) -> ClusterDescriptor;

    /// Path of the role executable; relative when an image is staged.
    fn resolve_executable_path(&self, descriptor: &ClusterDescriptor) -> PathBuf;

    /// Ask the container-management service to start the process.
    async fn submit(
        &self,
        container: &AllocatedContainer,
        context: LaunchContext,
        record: LaunchRecord,
    ) -> Result<(), SubmissionError>;

    /// Called exactly once per worker, on every exit path.
    ///
    /// Must not panic. Stage panics are caught before this runs, but a
    /// worker future dropped while its thread is already unwinding still
    /// reports from its drop guard, and a second panic there aborts the
    /// process.
    fn on_worker_finished(&self, report: &WorkerReport);
}

/// Live launch workers keyed by worker id.
#[derive(Clone, Debug, Default)]
pub struct WorkerRegistry {
    inner: Arc<Mutex<HashMap<Uuid, ContainerId>>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, worker_id: Uuid, container: ContainerId) {
        self.inner.lock().insert(worker_id, container);
    }

    /// Remove a worker; returns its container if it was registered.
    pub fn deregister(&self, worker_id: Uuid) -> Option<ContainerId> {
        self.inner.lock().remove(&worker_id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn contains(&self, worker_id: Uuid) -> bool {
        self.inner.lock().contains_key(&worker_id)
    }
}

/// Records of submitted launches, keyed by container.
///
/// Entries live until the container dies and the coordinator evicts them.
#[derive(Clone, Debug, Default)]
pub struct LaunchRegistry {
    inner: Arc<Mutex<BTreeMap<ContainerId, LaunchRecord>>>,
}

impl LaunchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a record; returns the one it replaced, if any.
    pub fn register(&self, record: LaunchRecord) -> Option<LaunchRecord> {
        self.inner
            .lock()
            .insert(record.container_id.clone(), record)
    }

    pub fn get(&self, container: &ContainerId) -> Option<LaunchRecord> {
        self.inner.lock().get(container).cloned()
    }

    /// Drop the record of a dead container.
    pub fn evict(&self, container: &ContainerId) -> Option<LaunchRecord> {
        let evicted = self.inner.lock().remove(container);
        if evicted.is_some() {
            tracing::debug!(container_id = %container, "evicted launch record");
        }
        evicted
    }

    /// Records ordered by container id.
    pub fn snapshot(&self) -> Vec<LaunchRecord> {
        self.inner.lock().values().cloned().collect()
    }

    /// Records for one role, ordered by container id.
    pub fn by_role(&self, role: &str) -> Vec<LaunchRecord> {
        self.inner
            .lock()
            .values()
            .filter(|record| record.role == role)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, role: &str) -> LaunchRecord {
        LaunchRecord::new(ContainerId::new(id), role, "bin/start", Vec::new())
    }

    #[test]
    fn test_launch_registry_lifecycle() {
        let registry = LaunchRegistry::new();
        assert!(registry.register(record("c-2", "worker")).is_none());
        assert!(registry.register(record("c-1", "master")).is_none());
        assert!(registry.register(record("c-3", "worker")).is_none());

        let ids: Vec<String> = registry
            .snapshot()
            .into_iter()
            .map(|r| r.container_id.to_string())
            .collect();
        assert_eq!(ids, vec!["c-1", "c-2", "c-3"]);
        assert_eq!(registry.by_role("worker").len(), 2);

        assert!(registry.evict(&ContainerId::new("c-2")).is_some());
        assert!(registry.evict(&ContainerId::new("c-2")).is_none());
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_worker_registry_concurrent_updates() {
        let registry = WorkerRegistry::new();
        let mut handles = Vec::new();
        for i in 0..32 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                let id = Uuid::now_v7();
                registry.register(id, ContainerId::new(format!("c-{i}")));
                tokio::task::yield_now().await;
                registry.deregister(id)
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_some());
        }
        assert!(registry.is_empty());
    }
}
