pub mod classifier;
pub mod error;
pub mod extractor;
pub mod observer;
pub mod provider;

pub use classifier::{classify, Classification, ClassificationDetails, PolicyDetails, PolicyRule, ProcessDetails, ProcessStep};
pub use error::NerError;
pub use extractor::{extract_entities, ExtractedEntity};
pub use observer::{CrossSourceView, EntityMatcher, ExactNormalizedMatcher, MatchCandidate, Observer, ObservationInput};
pub use provider::{
    EmbeddingProvider, EmbeddingProviderRegistry, HttpLlmProvider, LlmProvider, LlmProviderRegistry,
    MockEmbeddingProvider, MockLlmProvider,
};
