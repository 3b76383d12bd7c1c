use std::sync::Arc;
use std::time::Instant;

use ragcore_domain::{GraphEdge, GraphNode, NodeId};
use ragcore_ner::LlmProviderRegistry;
use ragcore_store::Direction;

use crate::communities::{Community, CommunityProvider};
use crate::context::{ContextBuilder, ContextBuilderConfig, RagContext};
use crate::error::GraphRagError;
use crate::expand::{apply_filter, ExpandConfig, ExpansionFilter, ExpansionResult, GraphExpander};

pub struct BuildContextRequest {
    pub tenant_id: String,
    pub query: String,
    pub embedding: Option<Vec<f32>>,
    pub config: ContextBuilderConfig,
}

pub struct BuildContextResponse {
    pub context: RagContext,
    pub wall_time_ms: u128,
}

pub struct ExpandGraphRequest {
    pub tenant_id: String,
    pub seeds: Vec<NodeId>,
    pub edge_types: Vec<String>,
    pub max_hops: Option<usize>,
    pub max_nodes_per_hop: Option<usize>,
    pub max_total_nodes: Option<usize>,
    pub filter: Option<ExpansionFilter>,
}

#[derive(Debug, Clone)]
pub struct Citation {
    pub node_id: NodeId,
    pub text: String,
    pub start_offset: Option<usize>,
    pub end_offset: Option<usize>,
}

pub struct GenerateAnswerRequest {
    pub tenant_id: String,
    pub query: String,
    pub context: RagContext,
    /// Tenant the context was built for; must equal `tenant_id` (§4.7).
    pub context_tenant_id: String,
    pub max_tokens: usize,
    pub llm_provider_id: Option<String>,
}

pub struct GenerateAnswerResponse {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub mock: bool,
}

/// Request/response facade over the context builder, expander, and LLM provider registry
/// (§4.7), grounded on the thin-handler-delegates-to-domain-logic idiom used throughout the
/// control-plane handlers.
pub struct GraphRagService {
    context_builder: Arc<ContextBuilder>,
    expander: Arc<GraphExpander>,
    llm_providers: Arc<LlmProviderRegistry>,
    community_provider: Arc<dyn CommunityProvider>,
}

impl GraphRagService {
    pub fn new(
        context_builder: Arc<ContextBuilder>,
        expander: Arc<GraphExpander>,
        llm_providers: Arc<LlmProviderRegistry>,
        community_provider: Arc<dyn CommunityProvider>,
    ) -> Self {
        Self {
            context_builder,
            expander,
            llm_providers,
            community_provider,
        }
    }

    pub async fn build_context(
        &self,
        req: BuildContextRequest,
    ) -> Result<BuildContextResponse, GraphRagError> {
        if req.tenant_id.trim().is_empty() {
            return Err(GraphRagError::InvalidInput("tenantId is required".to_string()));
        }
        if req.query.trim().is_empty() {
            return Err(GraphRagError::InvalidInput("query is required".to_string()));
        }

        let start = Instant::now();
        let context = self
            .context_builder
            .build(&req.tenant_id, &req.query, req.embedding, req.config)
            .await;
        Ok(BuildContextResponse {
            context,
            wall_time_ms: start.elapsed().as_millis(),
        })
    }

    pub async fn expand_graph(
        &self,
        req: ExpandGraphRequest,
    ) -> Result<ExpansionResult, GraphRagError> {
        if req.tenant_id.trim().is_empty() {
            return Err(GraphRagError::InvalidInput("tenantId is required".to_string()));
        }
        if req.seeds.is_empty() {
            return Err(GraphRagError::InvalidInput("seeds must not be empty".to_string()));
        }

        let config = ExpandConfig {
            edge_types: req.edge_types,
            direction: Direction::Both,
            max_hops: req.max_hops.unwrap_or(2),
            max_nodes_per_hop: req.max_nodes_per_hop.unwrap_or(20),
            max_total_nodes: req.max_total_nodes.unwrap_or(100),
            per_node_limit: req.max_nodes_per_hop.unwrap_or(20),
        };
        let result = self.expander.expand(&req.tenant_id, &req.seeds, &config).await?;
        Ok(match req.filter {
            Some(filter) => apply_filter(result, &filter),
            None => result,
        })
    }

    pub async fn get_entity_communities(
        &self,
        tenant_id: &str,
        node_ids: &[NodeId],
        max_communities: usize,
    ) -> Result<Vec<Community>, GraphRagError> {
        self.community_provider
            .get_communities(tenant_id, node_ids, max_communities)
            .await
    }

    pub async fn generate_answer(
        &self,
        req: GenerateAnswerRequest,
    ) -> Result<GenerateAnswerResponse, GraphRagError> {
        if req.tenant_id != req.context_tenant_id {
            return Err(GraphRagError::TenantMismatch);
        }

        let prompt = build_prompt(&req.query, &req.context, req.max_tokens);

        match self.resolve_provider(req.llm_provider_id.as_deref()) {
            Some(provider) => {
                let answer = provider.complete(&prompt, req.max_tokens).await?;
                Ok(GenerateAnswerResponse {
                    answer,
                    citations: Vec::new(),
                    mock: false,
                })
            }
            None => {
                let (answer, citations) = mock_answer(&req.query, &req.context);
                Ok(GenerateAnswerResponse {
                    answer,
                    citations,
                    mock: true,
                })
            }
        }
    }

    fn resolve_provider(&self, id: Option<&str>) -> Option<Arc<dyn ragcore_ner::LlmProvider>> {
        match id {
            Some(id) => self.llm_providers.for_id(id).ok(),
            None => self.llm_providers.default_provider(),
        }
    }
}

fn build_prompt(query: &str, context: &RagContext, max_tokens: usize) -> String {
    let mut prompt = format!("Question: {query}\n\nContext:\n");
    for node in &context.seeds {
        prompt.push_str(&format!("- {} ({})\n", node.display_name, node.entity_type));
    }
    for edge in &context.expanded_edges {
        prompt.push_str(&format!("- edge {}: {} -> {}\n", edge.edge_type, edge.source_node_id, edge.target_node_id));
    }
    for community in &context.communities {
        prompt.push_str(&format!("- community {} ({} nodes)\n", community.id, community.node_ids.len()));
    }
    let char_budget = max_tokens * 4;
    if prompt.len() > char_budget {
        prompt.truncate(char_budget);
    }
    prompt
}

/// Deterministic mock answer (§4.7): lists the seed entities found, with citations whose offsets
/// are accurate substring positions inside the generated text.
fn mock_answer(query: &str, context: &RagContext) -> (String, Vec<Citation>) {
    let mut answer = format!("Based on {} related entities, here is what was found for \"{query}\":\n", context.seeds.len());
    let mut citations = Vec::new();

    for node in &context.seeds {
        let mention = format!("{} ({})", node.display_name, node.entity_type);
        let start = answer.len();
        answer.push_str(&mention);
        answer.push('\n');
        let end = start + mention.len();
        citations.push(Citation {
            node_id: node.id.clone(),
            text: mention,
            start_offset: Some(start),
            end_offset: Some(end),
        });
    }

    (answer, citations)
}

pub fn nodes_of(result: &ExpansionResult) -> &[GraphNode] {
    &result.nodes
}

pub fn edges_of(result: &ExpansionResult) -> &[GraphEdge] {
    &result.edges
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_answer_citation_offsets_are_accurate() {
        let context = RagContext {
            seeds: vec![GraphNode {
                id: NodeId::from("n1".to_string()),
                tenant_id: "t1".to_string(),
                project_id: None,
                entity_type: "person".to_string(),
                display_name: "Jane Doe".to_string(),
                canonical_path: None,
                source_system: None,
                spec_ref: None,
                properties: Default::default(),
                version: 1,
                scope: ragcore_domain::Scope {
                    org_id: "t1".to_string(),
                    domain_id: None,
                    project_id: None,
                    team_id: None,
                },
                origin_endpoint_id: None,
                origin_vendor: None,
                logical_key: "lk".to_string(),
                external_id: Default::default(),
                phase: None,
                provenance: Default::default(),
                created_at: chrono::Utc::now(),
                updated_at: chrono::Utc::now(),
            }],
            expanded_nodes: Vec::new(),
            expanded_edges: Vec::new(),
            communities: Vec::new(),
        };
        let (answer, citations) = mock_answer("who is Jane", &context);
        let citation = &citations[0];
        let slice = &answer[citation.start_offset.unwrap()..citation.end_offset.unwrap()];
        assert_eq!(slice, citation.text);
    }
}
