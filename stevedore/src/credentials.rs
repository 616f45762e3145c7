//! Binding of container tokens to node-scoped delegated identities.
//!
//! The resource manager hands every allocated container an opaque token. A
//! launch worker turns it into a [`DelegatedIdentity`] whose single
//! [`NodeToken`] is scoped to the node hosting the container, so the
//! container-management call on that node authenticates with the token rather
//! than with the coordinator's own long-lived credentials.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::container::{AllocatedContainer, ContainerId, NodeAddress};
use crate::error::CredentialError;

/// Token kind accepted for container launches.
pub const CONTAINER_TOKEN_KIND: &str = "ContainerToken";

/// Identifier portion of a container token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerTokenIdentifier {
    pub container_id: ContainerId,
    /// `host:port` of the node the token was issued for.
    pub node: String,
    pub submitter: String,
    pub expires_at: DateTime<Utc>,
}

/// Serialized layout of a container token blob.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenBlob {
    pub kind: String,
    pub identifier: ContainerTokenIdentifier,
    /// Base64 encoded token password.
    pub password: String,
}

impl TokenBlob {
    /// Encode a container token the way the resource manager issues it.
    pub fn issue(
        identifier: ContainerTokenIdentifier,
        password: &[u8],
    ) -> Vec<u8> {
        let blob = TokenBlob {
            kind: CONTAINER_TOKEN_KIND.to_string(),
            identifier,
            password: STANDARD.encode(password),
        };
        // Serializing plain strings and a timestamp cannot fail.
        serde_json::to_vec(&blob).unwrap_or_default()
    }
}

/// A token bound to the service address of one node.
#[derive(Clone)]
pub struct NodeToken {
    pub kind: String,
    pub service: NodeAddress,
    pub identifier: ContainerTokenIdentifier,
    password: Vec<u8>,
}

impl NodeToken {
    pub fn password(&self) -> &[u8] {
        &self.password
    }
}

impl fmt::Debug for NodeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeToken")
            .field("kind", &self.kind)
            .field("service", &self.service)
            .field("identifier", &self.identifier)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Remote identity a launch runs as, carrying its node-scoped tokens.
#[derive(Clone, Debug)]
pub struct DelegatedIdentity {
    pub principal: String,
    pub tokens: Vec<NodeToken>,
}

impl DelegatedIdentity {
    /// Token to present to the container manager at `node`, if any.
    pub fn token_for(&self, node: &NodeAddress) -> Option<&NodeToken> {
        self.tokens.iter().find(|token| &token.service == node)
    }
}

/// Derives delegated identities from allocated containers.
#[derive(Clone, Debug, Default)]
pub struct CredentialBinder {
    now: Option<DateTime<Utc>>,
}

impl CredentialBinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate token expiry against a fixed instant instead of the clock.
    pub fn at(now: DateTime<Utc>) -> Self {
        Self { now: Some(now) }
    }

    pub fn bind(
        &self,
        container: &AllocatedContainer,
    ) -> Result<DelegatedIdentity, CredentialError> {
        let blob: TokenBlob =
            serde_json::from_slice(&container.token).map_err(|err| {
                CredentialError::Malformed {
                    container: container.id.clone(),
                    reason: err.to_string(),
                }
            })?;

        if blob.kind != CONTAINER_TOKEN_KIND {
            return Err(CredentialError::WrongKind {
                container: container.id.clone(),
                kind: blob.kind,
            });
        }

        let password = STANDARD.decode(blob.password.as_bytes()).map_err(
            |err| CredentialError::Malformed {
                container: container.id.clone(),
                reason: format!("password is not base64: {err}"),
            },
        )?;

        let identifier = blob.identifier;
        if identifier.container_id != container.id {
            return Err(CredentialError::ContainerMismatch {
                container: container.id.clone(),
                issued_for: identifier.container_id,
            });
        }

        let scoped = identifier
            .node
            .parse::<NodeAddress>()
            .ok()
            .filter(|node| node == &container.node);
        let Some(service) = scoped else {
            return Err(CredentialError::NodeMismatch {
                container: container.id.clone(),
                node: container.node.clone(),
                issued_for: identifier.node,
            });
        };

        let now = self.now.unwrap_or_else(Utc::now);
        if identifier.expires_at <= now {
            return Err(CredentialError::Expired {
                container: container.id.clone(),
                expired_at: identifier.expires_at,
            });
        }

        tracing::debug!(
            container_id = %container.id,
            service = %service,
            "bound container token"
        );

        Ok(DelegatedIdentity {
            principal: container.id.to_string(),
            tokens: vec![NodeToken {
                kind: blob.kind,
                service,
                identifier,
                password,
            }],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn identifier(id: &str, node: &str) -> ContainerTokenIdentifier {
        ContainerTokenIdentifier {
            container_id: ContainerId::new(id),
            node: node.to_string(),
            submitter: "appmaster".to_string(),
            expires_at: Utc::now() + Duration::hours(1),
        }
    }

    fn container(id: &str, token: Vec<u8>) -> AllocatedContainer {
        AllocatedContainer::new(id, NodeAddress::new("node-1", 8041), token)
    }

    #[test]
    fn test_bind_scopes_token_to_node() {
        let token = TokenBlob::issue(identifier("c-1", "node-1:8041"), b"pw");
        let identity = CredentialBinder::new()
            .bind(&container("c-1", token))
            .unwrap();

        assert_eq!(identity.principal, "c-1");
        let node_token = identity
            .token_for(&NodeAddress::new("node-1", 8041))
            .expect("token scoped to node");
        assert_eq!(node_token.password(), b"pw");
        assert_eq!(node_token.kind, CONTAINER_TOKEN_KIND);
        assert!(identity
            .token_for(&NodeAddress::new("node-2", 8041))
            .is_none());
    }

    #[test]
    fn test_bind_rejects_garbage() {
        let err = CredentialBinder::new()
            .bind(&container("c-1", b"\x00\x01not-json".to_vec()))
            .unwrap_err();
        assert!(matches!(err, CredentialError::Malformed { .. }));
    }

    #[test]
    fn test_bind_rejects_bad_password_encoding() {
        let mut blob: TokenBlob = serde_json::from_slice(&TokenBlob::issue(
            identifier("c-1", "node-1:8041"),
            b"pw",
        ))
        .unwrap();
        blob.password = "***".to_string();
        let token = serde_json::to_vec(&blob).unwrap();

        let err = CredentialBinder::new()
            .bind(&container("c-1", token))
            .unwrap_err();
        assert!(matches!(err, CredentialError::Malformed { .. }));
    }

    #[test]
    fn test_bind_rejects_foreign_container_and_node() {
        let binder = CredentialBinder::new();

        let token = TokenBlob::issue(identifier("c-2", "node-1:8041"), b"pw");
        let err = binder.bind(&container("c-1", token)).unwrap_err();
        assert!(matches!(err, CredentialError::ContainerMismatch { .. }));

        let token = TokenBlob::issue(identifier("c-1", "node-9:8041"), b"pw");
        let err = binder.bind(&container("c-1", token)).unwrap_err();
        assert!(matches!(err, CredentialError::NodeMismatch { .. }));
    }

    #[test]
    fn test_bind_rejects_expired_token() {
        let ident = identifier("c-1", "node-1:8041");
        let later = ident.expires_at + Duration::seconds(1);
        let token = TokenBlob::issue(ident, b"pw");

        let err = CredentialBinder::at(later)
            .bind(&container("c-1", token))
            .unwrap_err();
        assert!(matches!(err, CredentialError::Expired { .. }));
    }

    #[test]
    fn test_debug_redacts_password() {
        let token = TokenBlob::issue(identifier("c-1", "node-1:8041"), b"pw");
        let identity = CredentialBinder::new()
            .bind(&container("c-1", token))
            .unwrap();
        let rendered = format!("{identity:?}");
        assert!(rendered.contains("[REDACTED]"));
    }
}
