use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::container::{ContainerId, NodeAddress};

/// The container token could not be bound to a node-scoped identity.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The token blob is not a well-formed container token.
    #[error("malformed container token for {container}: {reason}")]
    Malformed {
        container: ContainerId,
        reason: String,
    },

    /// The token is well formed but of the wrong kind.
    #[error("expected a ContainerToken for {container}, got {kind}")]
    WrongKind { container: ContainerId, kind: String },

    /// The token was issued for a different container.
    #[error("token issued for {issued_for}, not {container}")]
    ContainerMismatch {
        container: ContainerId,
        issued_for: ContainerId,
    },

    /// The token was issued for a different node.
    #[error("token for {container} is scoped to {issued_for}, not {node}")]
    NodeMismatch {
        container: ContainerId,
        node: NodeAddress,
        issued_for: String,
    },

    /// The token has expired.
    #[error("token for {container} expired at {expired_at}")]
    Expired {
        container: ContainerId,
        expired_at: chrono::DateTime<chrono::Utc>,
    },
}

/// A role provider failed to populate the launch context.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// I/O while staging provider-owned files.
    #[error("provider I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The provider does not know how to launch this role.
    #[error("provider {provider} does not support role {role}")]
    UnsupportedRole { provider: String, role: String },

    /// A role option holds a value the provider cannot use.
    #[error("invalid option {key}={value} for role {role}")]
    InvalidOption {
        role: String,
        key: String,
        value: String,
    },
}

/// Config bundle or image staging failed.
#[derive(Debug, Error)]
pub enum StagingError {
    /// Listing the generated config directory failed.
    #[error("cannot list config directory {path}: {source}")]
    ConfigDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The generated config directory has nothing to stage.
    #[error("config directory {path} contains no files")]
    EmptyConfigDir { path: PathBuf },

    /// The cluster image could not be resolved.
    #[error("cannot stage image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// The coordinator rejected or failed the submit call.
#[derive(Debug, Error)]
pub enum SubmissionError {
    /// The container-management service refused the request.
    #[error("container manager rejected {container}: {reason}")]
    Rejected {
        container: ContainerId,
        reason: String,
    },

    /// The call to the container-management service failed.
    #[error("submitting {container} failed: {source}")]
    Transport {
        container: ContainerId,
        #[source]
        source: anyhow::Error,
    },
}

/// Any failure of a single launch attempt.
///
/// None of these are retried by the worker; retry policy belongs to the
/// coordinator.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    ResourceStaging(#[from] StagingError),
    #[error(transparent)]
    Submission(#[from] SubmissionError),
}

impl LaunchError {
    pub fn kind(&self) -> LaunchErrorKind {
        match self {
            Self::Credential(_) => LaunchErrorKind::Credential,
            Self::Provider(_) => LaunchErrorKind::Provider,
            Self::ResourceStaging(_) => LaunchErrorKind::ResourceStaging,
            Self::Submission(_) => LaunchErrorKind::Submission,
        }
    }

    /// Launch attempts are never retried from inside a worker.
    pub fn is_retryable(&self) -> bool {
        false
    }
}

/// Error class of a failed launch, kept after the error itself is logged.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum LaunchErrorKind {
    Credential,
    Provider,
    ResourceStaging,
    Submission,
}

impl LaunchErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Credential => "credential",
            Self::Provider => "provider",
            Self::ResourceStaging => "resource_staging",
            Self::Submission => "submission",
        }
    }
}

impl std::fmt::Display for LaunchErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors returned by the supervisor before any worker exists.
#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("no role provider registered for role {role}")]
    UnknownRole { role: String },

    #[error("supervisor is shutting down, refusing launch of {container}")]
    ShuttingDown { container: ContainerId },
}
