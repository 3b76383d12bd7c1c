pub mod communities;
pub mod context;
pub mod error;
pub mod expand;
pub mod search;
pub mod service;

pub use communities::{Community, CommunityProvider, ConnectedComponentsProvider};
pub use context::{ContextBuilder, ContextBuilderConfig, RagContext};
pub use error::GraphRagError;
pub use expand::{apply_filter, ExpandConfig, ExpansionFilter, ExpansionResult, GraphExpander};
pub use search::{HybridSearcher, SearchFilter, SearchHit, SearchRequest};
pub use service::{
    BuildContextRequest, BuildContextResponse, Citation, ExpandGraphRequest,
    GenerateAnswerRequest, GenerateAnswerResponse, GraphRagService,
};
