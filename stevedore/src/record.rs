use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::container::ContainerId;

/// Human-readable record of a submitted launch, shown in cluster status.
///
/// Handed to the coordinator alongside the launch context; the coordinator
/// owns it from then on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchRecord {
    pub container_id: ContainerId,
    pub role: String,
    pub command: String,
    /// Staged resources as `key=locator`, in staging order.
    pub resources: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl LaunchRecord {
    pub fn new(
        container_id: ContainerId,
        role: impl Into<String>,
        command: impl Into<String>,
        resources: Vec<String>,
    ) -> Self {
        Self {
            container_id,
            role: role.into(),
            command: command.into(),
            resources,
            created_at: Utc::now(),
        }
    }
}

impl fmt::Display for LaunchRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} [{}]", self.container_id, self.role)?;
        writeln!(f, "  command: {}", self.command)?;
        for resource in &self.resources {
            writeln!(f, "  {resource}")?;
        }
        Ok(())
    }
}
