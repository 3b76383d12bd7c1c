use ragcore_domain::{NodeId, Scope};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
    Both,
}

/// §4.2 listing & filtering: scope is always applied first, before any other predicate.
#[derive(Debug, Clone, Default)]
pub struct NodeFilter {
    pub entity_types: Vec<String>,
    pub neighbor_of: Option<NodeId>,
    pub limit: usize,
}

#[derive(Debug, Clone, Default)]
pub struct EdgeFilter {
    pub edge_types: Vec<String>,
    pub node_id: Option<NodeId>,
    pub limit: usize,
}

pub fn require_scope(scope: &Scope) -> Result<(), crate::error::StoreError> {
    if scope.org_id.trim().is_empty() {
        return Err(crate::error::StoreError::TenantMismatch);
    }
    Ok(())
}
