//! Deterministic 256-bit hex digests identifying a node or edge independently of its storage id.
//!
//! Generalizes the key-sorted-JSON SHA-256 digest idiom into the tuple-join scheme described in
//! the graph store's identity design: every field participating in identity is joined with `|`
//! after being run through `stable_stringify`, then hashed once as a whole.

use sha2::{Digest, Sha256};

/// Lexicographically sorts object keys at every nesting level and serializes with serde_json's
/// default (compact, no whitespace) encoding, so the same logical value always produces the same
/// bytes regardless of map insertion order.
pub fn stable_stringify(value: &serde_json::Value) -> String {
    serde_json::to_string(&sort_json(value)).expect("json values always serialize")
}

fn sort_json(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut entries: Vec<(&String, &serde_json::Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut sorted = serde_json::Map::new();
            for (k, v) in entries {
                sorted.insert(k.clone(), sort_json(v));
            }
            serde_json::Value::Object(sorted)
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(sort_json).collect())
        }
        other => other.clone(),
    }
}

fn digest_joined(parts: &[&str]) -> String {
    let joined = parts.join("|");
    let mut hasher = Sha256::new();
    hasher.update(joined.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// `"entity" | entityType | orgId | projectId | domainId | teamId | originEndpointId |
/// originVendor | canonicalPath | fallbackId | stableStringify(externalId)`
#[allow(clippy::too_many_arguments)]
pub fn node_logical_key(
    entity_type: &str,
    org_id: &str,
    project_id: Option<&str>,
    domain_id: Option<&str>,
    team_id: Option<&str>,
    origin_endpoint_id: Option<&str>,
    origin_vendor: Option<&str>,
    canonical_path: Option<&str>,
    fallback_id: Option<&str>,
    external_id: &serde_json::Value,
) -> String {
    let external = stable_stringify(external_id);
    digest_joined(&[
        "entity",
        entity_type,
        org_id,
        project_id.unwrap_or(""),
        domain_id.unwrap_or(""),
        team_id.unwrap_or(""),
        origin_endpoint_id.unwrap_or(""),
        origin_vendor.unwrap_or(""),
        canonical_path.unwrap_or(""),
        fallback_id.unwrap_or(""),
        &external,
    ])
}

/// `"edge" | edgeType | orgId | projectId | domainId | teamId | originEndpointId | originVendor
/// | sourceLogicalKey | targetLogicalKey`
#[allow(clippy::too_many_arguments)]
pub fn edge_logical_key(
    edge_type: &str,
    org_id: &str,
    project_id: Option<&str>,
    domain_id: Option<&str>,
    team_id: Option<&str>,
    origin_endpoint_id: Option<&str>,
    origin_vendor: Option<&str>,
    source_logical_key: &str,
    target_logical_key: &str,
) -> String {
    digest_joined(&[
        "edge",
        edge_type,
        org_id,
        project_id.unwrap_or(""),
        domain_id.unwrap_or(""),
        team_id.unwrap_or(""),
        origin_endpoint_id.unwrap_or(""),
        origin_vendor.unwrap_or(""),
        source_logical_key,
        target_logical_key,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stable_stringify_ignores_key_order() {
        let a = json!({"b": 1, "a": 2});
        let b = json!({"a": 2, "b": 1});
        assert_eq!(stable_stringify(&a), stable_stringify(&b));
    }

    #[test]
    fn node_logical_key_is_deterministic() {
        let ext = json!({"id": "PR-123"});
        let k1 = node_logical_key(
            "project", "org1", None, None, None, Some("ep1"), Some("github"), None, None, &ext,
        );
        let k2 = node_logical_key(
            "project", "org1", None, None, None, Some("ep1"), Some("github"), None, None, &ext,
        );
        assert_eq!(k1, k2);
        assert_eq!(k1.len(), 64, "sha256 hex digest is 64 chars / 256 bits");
    }

    #[test]
    fn node_logical_key_changes_with_scope() {
        let ext = json!({"id": "PR-123"});
        let k1 = node_logical_key(
            "project", "org1", None, None, None, None, None, None, None, &ext,
        );
        let k2 = node_logical_key(
            "project", "org2", None, None, None, None, None, None, None, &ext,
        );
        assert_ne!(k1, k2);
    }

    #[test]
    fn edge_logical_key_is_deterministic() {
        let k1 = edge_logical_key("references", "org1", None, None, None, None, None, "a", "b");
        let k2 = edge_logical_key("references", "org1", None, None, None, None, None, "a", "b");
        assert_eq!(k1, k2);
    }
}
