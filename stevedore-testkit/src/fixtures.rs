use chrono::{Duration, Utc};
use stevedore::*;

pub const TEST_SUBMITTER: &str = "appmaster";
pub const TEST_PASSWORD: &[u8] = b"container-secret";

pub fn test_node() -> NodeAddress {
    NodeAddress::new("node-1.cluster", 8041)
}

/// Token identifier for `id` on `node`, valid for an hour.
pub fn token_identifier(id: &str, node: &NodeAddress) -> ContainerTokenIdentifier {
    ContainerTokenIdentifier {
        container_id: ContainerId::new(id),
        node: node.to_string(),
        submitter: TEST_SUBMITTER.to_string(),
        expires_at: Utc::now() + Duration::hours(1),
    }
}

/// A container with a valid token, on the default test node.
pub fn container(id: &str) -> AllocatedContainer {
    container_on(id, test_node())
}

pub fn container_on(id: &str, node: NodeAddress) -> AllocatedContainer {
    let token = TokenBlob::issue(token_identifier(id, &node), TEST_PASSWORD);
    AllocatedContainer::new(id, node, token)
}

/// A container whose token blob is not a token at all.
pub fn malformed_container(id: &str) -> AllocatedContainer {
    AllocatedContainer::new(id, test_node(), b"not-a-token".to_vec())
}

/// A container whose token expired a minute ago.
pub fn expired_container(id: &str) -> AllocatedContainer {
    let node = test_node();
    let mut identifier = token_identifier(id, &node);
    identifier.expires_at = Utc::now() - Duration::minutes(1);
    AllocatedContainer::new(id, node, TokenBlob::issue(identifier, TEST_PASSWORD))
}

/// A container carrying the token issued for `issued_for`.
pub fn container_with_foreign_token(id: &str, issued_for: &str) -> AllocatedContainer {
    let node = test_node();
    let token = TokenBlob::issue(token_identifier(issued_for, &node), TEST_PASSWORD);
    AllocatedContainer::new(id, node, token)
}
