//! Stevedore - concurrent container-launch workers for cluster application
//! masters.
//!
//! When the cluster resource manager hands an application master a batch of
//! containers, each one has to be turned into a running role process. Every
//! launch runs on its own worker, concurrently with the others, and goes
//! through the same stages.
//!
//! # Core Concepts
//!
//! - **Credentials**: [`CredentialBinder`] turns the opaque token blob of an
//!   [`AllocatedContainer`] into a [`DelegatedIdentity`] scoped to that
//!   container.
//!
//! - **Launch context**: a [`LaunchContextBuilder`] accumulates environment,
//!   local resources and the start command. It is passed by value from stage
//!   to stage, so exactly one owner mutates it at a time.
//!
//! - **Role providers**: a [`RoleProvider`] fills in what its role family
//!   needs. The [`ProviderRegistry`] picks the provider by role name.
//!
//! - **Resources**: [`ResourceResolver`] stages the generated config bundle
//!   and, when the cluster ships one, the binary image.
//!
//! - **Commands**: [`CommandAssembler`] builds the start command line with
//!   output redirected into the container's log directory.
//!
//! - **Workers**: [`LaunchWorker`] runs the stages in order and always calls
//!   back the [`Coordinator`] exactly once. [`LaunchSupervisor`] spawns one
//!   per container.
//!
//! # Feature Flags
//!
//! - `metrics` - Prometheus metrics support
//!
//! # Example
//!
//! ```ignore
//! use stevedore::*;
//!
//! let providers = ProviderRegistry::new()
//!     .with_provider(Arc::new(StorageServerProvider::default()));
//! let supervisor =
//!     LaunchSupervisor::new(SupervisorConfig::default(), coordinator, providers);
//!
//! supervisor
//!     .spawn_launch(container, RoleSpec::new("worker"))
//!     .await?;
//! supervisor.shutdown().await?;
//! ```

/// Start command assembly.
pub mod command;

/// Launch and supervisor configuration.
pub mod config;

/// Allocated containers and node addresses.
pub mod container;

/// The launch context and its builder.
pub mod context;

/// The coordinator contract and its thread-safe registries.
pub mod coordinator;

/// Container token validation and delegated identities.
pub mod credentials;

/// Cluster deployment description.
pub mod descriptor;

/// Error types for every launch stage.
pub mod error;

/// Launch lifecycle events and the in-process bus.
pub mod events;

/// Filesystem abstraction used for staging.
pub mod filesystem;

#[cfg(feature = "metrics")]
/// Prometheus metrics, enabled by the `metrics` feature.
pub mod metrics;

/// Role providers and the registry that selects them.
pub mod provider;

/// Human-readable launch records.
pub mod record;

/// Local resources and their resolution.
pub mod resources;

/// Role names and options.
pub mod role;

/// Worker spawning, concurrency limiting and shutdown.
pub mod supervisor;

/// Tracing spans and launch telemetry.
pub mod telemetry;

/// The per-container launch worker.
pub mod worker;

pub use command::*;
pub use config::*;
pub use container::*;
pub use context::*;
pub use coordinator::*;
pub use credentials::*;
pub use descriptor::*;
pub use error::*;
pub use events::*;
pub use filesystem::*;
pub use provider::*;
pub use record::*;
pub use resources::*;
pub use role::*;
pub use supervisor::*;
pub use worker::*;
