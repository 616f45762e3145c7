use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

/// Identifier assigned to a container by the cluster resource manager.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContainerId(String);

impl ContainerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ContainerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ContainerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ContainerId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Address of the node-local container manager hosting a container.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct NodeAddress {
    pub host: String,
    pub port: u16,
}

impl NodeAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl Display for NodeAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Error parsing a `host:port` node address.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid node address {0:?}, expected host:port")]
pub struct NodeAddressParseError(pub String);

impl FromStr for NodeAddress {
    type Err = NodeAddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| NodeAddressParseError(s.to_string()))?;
        if host.is_empty() {
            return Err(NodeAddressParseError(s.to_string()));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| NodeAddressParseError(s.to_string()))?;
        Ok(Self::new(host, port))
    }
}

/// A container slot granted by the resource manager.
///
/// The token blob is opaque here; [`crate::credentials::CredentialBinder`]
/// decodes it when the worker binds credentials.
#[derive(Clone, Serialize, Deserialize)]
pub struct AllocatedContainer {
    pub id: ContainerId,
    pub node: NodeAddress,
    pub token: Vec<u8>,
}

impl AllocatedContainer {
    pub fn new(
        id: impl Into<ContainerId>,
        node: NodeAddress,
        token: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            id: id.into(),
            node,
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for AllocatedContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AllocatedContainer")
            .field("id", &self.id)
            .field("node", &self.node)
            .field("token", &format_args!("[{} bytes]", self.token.len()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_address_round_trips_through_display() {
        let node: NodeAddress = "node-3.cluster:45454".parse().unwrap();
        assert_eq!(node.host, "node-3.cluster");
        assert_eq!(node.port, 45454);
        assert_eq!(node.to_string(), "node-3.cluster:45454");
    }

    #[test]
    fn test_node_address_rejects_missing_port() {
        assert!("node-3".parse::<NodeAddress>().is_err());
        assert!(":80".parse::<NodeAddress>().is_err());
        assert!("node:port".parse::<NodeAddress>().is_err());
    }

    #[test]
    fn test_container_debug_hides_token_bytes() {
        let container = AllocatedContainer::new(
            "c-1",
            NodeAddress::new("n1", 8041),
            b"secret".to_vec(),
        );
        let rendered = format!("{container:?}");
        assert!(rendered.contains("[6 bytes]"));
        assert!(!rendered.contains("secret"));
    }
}
