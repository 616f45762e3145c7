//! The per-container launch worker.
//!
//! A [`LaunchWorker`] runs the stages of one launch strictly in order:
//!
//! ```text
//! Created -> Credentialed -> ContextBuilt -> ResourcesResolved
//!         -> CommandReady -> Submitted -> Done
//! ```
//!
//! A failing stage is logged with the role and the error and the worker goes
//! straight to `Done` without submitting. A panicking stage is caught and
//! reported as abandoned at the stage it reached. Whatever happens, including
//! the task being dropped mid-launch, the coordinator's `on_worker_finished`
//! runs exactly once: the call lives in the drop of a [`CompletionGuard`]
//! created before the first stage.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{Instrument, Span};
use uuid::Uuid;

use crate::command::CommandAssembler;
use crate::config::LaunchConfig;
use crate::container::{AllocatedContainer, ContainerId};
use crate::context::LaunchContextBuilder;
use crate::coordinator::Coordinator;
use crate::credentials::CredentialBinder;
use crate::error::{LaunchError, LaunchErrorKind};
use crate::events::{EventMeta, LaunchEvent, LaunchEventBus, LaunchEventPayload};
use crate::provider::RoleProvider;
use crate::record::LaunchRecord;
use crate::resources::ResourceResolver;
use crate::role::RoleSpec;
use crate::telemetry::{self, LaunchTimingHandle};

/// Progress of a launch worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LaunchState {
    Created,
    Credentialed,
    ContextBuilt,
    ResourcesResolved,
    CommandReady,
    Submitted,
    Done,
}

impl LaunchState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Credentialed => "credentialed",
            Self::ContextBuilt => "context_built",
            Self::ResourcesResolved => "resources_resolved",
            Self::CommandReady => "command_ready",
            Self::Submitted => "submitted",
            Self::Done => "done",
        }
    }
}

impl std::fmt::Display for LaunchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a launch attempt gave up.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchFailure {
    /// Last state reached before the failing stage.
    pub stage: LaunchState,
    pub kind: LaunchErrorKind,
    pub message: String,
}

/// Final result of one worker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LaunchOutcome {
    /// The coordinator accepted the launch.
    Submitted { record: LaunchRecord },
    /// A stage failed and nothing was submitted.
    Failed(LaunchFailure),
    /// The worker stopped without finishing, by panic or cancellation.
    Abandoned { stage: LaunchState },
}

impl LaunchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted { .. } => "submitted",
            Self::Failed(_) => "failed",
            Self::Abandoned { .. } => "abandoned",
        }
    }

    pub fn is_submitted(&self) -> bool {
        matches!(self, Self::Submitted { .. })
    }

    pub fn record(&self) -> Option<&LaunchRecord> {
        match self {
            Self::Submitted { record } => Some(record),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&LaunchFailure> {
        match self {
            Self::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

/// What the coordinator learns when a worker finishes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkerReport {
    pub worker_id: Uuid,
    pub container_id: ContainerId,
    pub role: String,
    pub outcome: LaunchOutcome,
    pub elapsed: Duration,
}

/// Notifies the coordinator when dropped.
///
/// Holds the worker's current state so an interrupted launch can still be
/// reported with the stage it reached.
pub struct CompletionGuard<C: Coordinator + ?Sized> {
    coordinator: Arc<C>,
    events: Option<Arc<LaunchEventBus>>,
    worker_id: Uuid,
    container_id: ContainerId,
    role: String,
    state: LaunchState,
    timing: Option<LaunchTimingHandle>,
    report: Option<WorkerReport>,
}

impl<C: Coordinator + ?Sized> CompletionGuard<C> {
    fn new(
        coordinator: Arc<C>,
        events: Option<Arc<LaunchEventBus>>,
        worker_id: Uuid,
        container_id: ContainerId,
        role: String,
    ) -> Self {
        Self {
            coordinator,
            events,
            worker_id,
            container_id,
            role,
            state: LaunchState::Created,
            timing: Some(telemetry::record_launch_start(worker_id.to_string())),
            report: None,
        }
    }

    pub fn state(&self) -> LaunchState {
        self.state
    }

    fn advance(&mut self, next: LaunchState) {
        tracing::trace!(from = %self.state, to = %next, "launch state");
        self.state = next;
    }

    fn build_report(&self, outcome: LaunchOutcome) -> WorkerReport {
        WorkerReport {
            worker_id: self.worker_id,
            container_id: self.container_id.clone(),
            role: self.role.clone(),
            outcome,
            elapsed: self
                .timing
                .as_ref()
                .map(LaunchTimingHandle::elapsed)
                .unwrap_or_default(),
        }
    }

    /// Settle the outcome; the coordinator is notified when `self` drops.
    fn finish(mut self, outcome: LaunchOutcome) -> WorkerReport {
        let report = self.build_report(outcome);
        self.report = Some(report.clone());
        report
    }
}

impl<C: Coordinator + ?Sized> Drop for CompletionGuard<C> {
    fn drop(&mut self) {
        let report = match self.report.take() {
            Some(report) => report,
            None => {
                tracing::warn!(
                    container_id = %self.container_id,
                    role = %self.role,
                    stage = %self.state,
                    "launch worker stopped before finishing"
                );
                self.build_report(LaunchOutcome::Abandoned { stage: self.state })
            }
        };
        self.state = LaunchState::Done;

        if let Some(timing) = self.timing.take() {
            telemetry::record_launch_end(timing, &self.role, report.outcome.as_str());
        }
        self.coordinator.on_worker_finished(&report);

        if let Some(events) = &self.events {
            events.publish(LaunchEvent {
                meta: EventMeta::new(
                    self.worker_id,
                    self.container_id.clone(),
                    self.role.clone(),
                ),
                payload: LaunchEventPayload::Finished {
                    outcome: report.outcome,
                },
            });
        }
    }
}

/// Launches one role process into one allocated container.
pub struct LaunchWorker<C: Coordinator + ?Sized> {
    id: Uuid,
    container: AllocatedContainer,
    role: RoleSpec,
    provider: Arc<dyn RoleProvider>,
    coordinator: Arc<C>,
    config: LaunchConfig,
    binder: CredentialBinder,
    events: Option<Arc<LaunchEventBus>>,
    span: Option<Span>,
}

impl<C: Coordinator + ?Sized> std::fmt::Debug for LaunchWorker<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaunchWorker")
            .field("id", &self.id)
            .field("container", &self.container)
            .field("role", &self.role.name)
            .field("provider", &self.provider.name())
            .finish_non_exhaustive()
    }
}

impl<C: Coordinator + ?Sized> LaunchWorker<C> {
    pub fn new(
        container: AllocatedContainer,
        role: RoleSpec,
        provider: Arc<dyn RoleProvider>,
        coordinator: Arc<C>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            container,
            role,
            provider,
            coordinator,
            config: LaunchConfig::default(),
            binder: CredentialBinder::new(),
            events: None,
            span: None,
        }
    }

    pub fn with_config(mut self, config: LaunchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_binder(mut self, binder: CredentialBinder) -> Self {
        self.binder = binder;
        self
    }

    pub fn with_events(mut self, events: Arc<LaunchEventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Log under `span` instead of a fresh launch span.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn container(&self) -> &AllocatedContainer {
        &self.container
    }

    pub fn role(&self) -> &RoleSpec {
        &self.role
    }

    /// Run the launch to completion and report the outcome.
    pub async fn run(self) -> WorkerReport {
        let span = self.span.clone().unwrap_or_else(|| {
            telemetry::launch_span(
                self.id.to_string(),
                self.container.id.as_str(),
                &self.role.name,
            )
        });
        self.run_in_span().instrument(span).await
    }

    async fn run_in_span(self) -> WorkerReport {
        let mut guard = CompletionGuard::new(
            Arc::clone(&self.coordinator),
            self.events.clone(),
            self.id,
            self.container.id.clone(),
            self.role.name.clone(),
        );
        telemetry::record_launch_started(&self.role.name);
        self.publish(LaunchEventPayload::Started);

        let launched = AssertUnwindSafe(self.launch(&mut guard))
            .catch_unwind()
            .await;
        let outcome = match launched {
            Ok(Ok(record)) => {
                self.publish(LaunchEventPayload::Submitted {
                    record: record.clone(),
                });
                LaunchOutcome::Submitted { record }
            }
            Ok(Err(err)) => {
                tracing::error!(
                    role = %self.role.name,
                    container_id = %self.container.id,
                    stage = %guard.state(),
                    error = %err,
                    detail = ?err,
                    "failed to start role"
                );
                let failure = LaunchFailure {
                    stage: guard.state(),
                    kind: err.kind(),
                    message: err.to_string(),
                };
                self.publish(LaunchEventPayload::Failed {
                    failure: failure.clone(),
                });
                LaunchOutcome::Failed(failure)
            }
            Err(payload) => {
                tracing::error!(
                    role = %self.role.name,
                    container_id = %self.container.id,
                    stage = %guard.state(),
                    panic = %panic_message(&*payload),
                    "launch stage panicked"
                );
                LaunchOutcome::Abandoned {
                    stage: guard.state(),
                }
            }
        };

        guard.finish(outcome)
    }

    async fn launch(
        &self,
        guard: &mut CompletionGuard<C>,
    ) -> Result<LaunchRecord, LaunchError> {
        let role = self.role.name.as_str();

        let identity = self.binder.bind(&self.container)?;
        guard.advance(LaunchState::Credentialed);

        tracing::debug!(
            container_id = %self.container.id,
            role = %role,
            "launching container into role"
        );
        let fs = self.coordinator.filesystem();
        let conf_dir = self.coordinator.generated_config_dir();
        let staging_dir = conf_dir
            .join(&self.config.staging_dir_name)
            .join(self.container.id.as_str());

        let builder = self
            .provider
            .populate_launch_context(
                LaunchContextBuilder::new(identity),
                fs.as_ref(),
                &staging_dir,
                &self.role,
            )
            .instrument(telemetry::stage_span(LaunchState::ContextBuilt.as_str()))
            .await?
            .envs(self.role.environment())
            .env(
                self.config.log_dir_env.clone(),
                self.config.log_dir_placeholder.clone(),
            );
        guard.advance(LaunchState::ContextBuilt);

        let descriptor = self.coordinator.cluster_descriptor();
        let builder = ResourceResolver::new(&self.config)
            .resolve(builder, fs.as_ref(), &conf_dir, &descriptor)
            .instrument(telemetry::stage_span(
                LaunchState::ResourcesResolved.as_str(),
            ))
            .await?;
        guard.advance(LaunchState::ResourcesResolved);

        let executable = self.coordinator.resolve_executable_path(&descriptor);
        let server_command = self.provider.server_command(role)?;
        let command = CommandAssembler::new(&self.config)
            .assemble(&executable, &server_command)
            .to_command_line();
        tracing::info!(command = %command, "starting container with command");
        let builder = builder.command(command.clone());
        guard.advance(LaunchState::CommandReady);

        let resources = builder.local_resources().describe();
        for resource in &resources {
            tracing::info!(resource = %resource, "staged resource");
        }
        let record = LaunchRecord::new(
            self.container.id.clone(),
            role,
            command,
            resources,
        );

        self.coordinator
            .submit(&self.container, builder.build(), record.clone())
            .instrument(telemetry::stage_span(LaunchState::Submitted.as_str()))
            .await?;
        guard.advance(LaunchState::Submitted);

        Ok(record)
    }

    fn publish(&self, payload: LaunchEventPayload) {
        if let Some(events) = &self.events {
            events.publish(LaunchEvent {
                meta: EventMeta::new(
                    self.id,
                    self.container.id.clone(),
                    self.role.name.clone(),
                ),
                payload,
            });
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
