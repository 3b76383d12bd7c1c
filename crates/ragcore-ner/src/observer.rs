use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use ragcore_domain::{ObservationId, ObservationStatus, ObservedEntity};
use serde_json::Value;
use uuid::Uuid;

use crate::error::NerError;

/// A candidate match returned by the entity matcher, scored in `[0.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct MatchCandidate {
    pub canonical_id: String,
    pub score: f64,
    pub matched_by: String,
}

/// Simplest possible matcher: exact match on `(type, normalized)` against everything already
/// observed for the tenant. Real deployments can swap in embedding-similarity matching; the
/// observer only depends on this trait's shape, not its implementation.
pub trait EntityMatcher: Send + Sync {
    fn find_candidate(
        &self,
        tenant_id: &str,
        entity_type: &str,
        normalized: &str,
        existing: &[&ObservedEntity],
    ) -> Option<MatchCandidate>;
}

pub struct ExactNormalizedMatcher;

impl EntityMatcher for ExactNormalizedMatcher {
    fn find_candidate(
        &self,
        _tenant_id: &str,
        entity_type: &str,
        normalized: &str,
        existing: &[&ObservedEntity],
    ) -> Option<MatchCandidate> {
        existing
            .iter()
            .find(|e| {
                e.canonical_id.is_some()
                    && e.payload.get("type").and_then(Value::as_str) == Some(entity_type)
                    && e.payload.get("normalized").and_then(Value::as_str) == Some(normalized)
            })
            .map(|e| MatchCandidate {
                canonical_id: e.canonical_id.clone().unwrap(),
                score: 1.0,
                matched_by: "exact_normalized".to_string(),
            })
    }
}

pub struct ObservationInput {
    pub tenant_id: String,
    pub source_type: String,
    pub source_id: String,
    pub source_url: Option<String>,
    pub entity_type: String,
    pub normalized: String,
    pub confidence: f64,
}

#[derive(Debug, Clone)]
pub struct CrossSourceView {
    pub normalized: String,
    pub entity_type: String,
    pub canonical_id: Option<String>,
    pub observations: Vec<ObservationId>,
    pub sources: Vec<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub confidence: f64,
}

struct Inner {
    observations: HashMap<ObservationId, ObservedEntity>,
    by_source: HashMap<String, Vec<ObservationId>>,
    by_normalized: HashMap<String, Vec<ObservationId>>,
}

fn source_key(tenant_id: &str, source_type: &str, source_id: &str) -> String {
    format!("{tenant_id}|{source_type}|{source_id}")
}

fn normalized_key(tenant_id: &str, normalized: &str, entity_type: &str) -> String {
    format!("{tenant_id}|{normalized}|{entity_type}")
}

/// Tenant-scoped cross-source entity observation index (§4.3 Observer).
pub struct Observer {
    matcher: Box<dyn EntityMatcher>,
    auto_merge_threshold: f64,
    inner: RwLock<Inner>,
}

impl Observer {
    pub fn new(auto_merge_threshold: f64) -> Self {
        Self::with_matcher(auto_merge_threshold, Box::new(ExactNormalizedMatcher))
    }

    pub fn with_matcher(auto_merge_threshold: f64, matcher: Box<dyn EntityMatcher>) -> Self {
        Self {
            matcher,
            auto_merge_threshold,
            inner: RwLock::new(Inner {
                observations: HashMap::new(),
                by_source: HashMap::new(),
                by_normalized: HashMap::new(),
            }),
        }
    }

    /// Records a new observation, scores it against prior observations for the same tenant, and
    /// transitions its status per §4.3.
    pub fn observe(&self, input: ObservationInput) -> ObservedEntity {
        let mut inner = self.inner.write().unwrap();

        let norm_key = normalized_key(&input.tenant_id, &input.normalized, &input.entity_type);
        let candidates: Vec<&ObservedEntity> = inner
            .by_normalized
            .get(&norm_key)
            .into_iter()
            .flatten()
            .filter_map(|id| inner.observations.get(id))
            .collect();
        let found = self.matcher.find_candidate(
            &input.tenant_id,
            &input.entity_type,
            &input.normalized,
            &candidates,
        );

        let (status, canonical_id, match_score, matched_by) = match found {
            Some(m) if m.score >= self.auto_merge_threshold => {
                (ObservationStatus::Matched, Some(m.canonical_id), m.score, Some(m.matched_by))
            }
            Some(m) => (ObservationStatus::Review, None, m.score, Some(m.matched_by)),
            None => {
                let new_canonical = Uuid::new_v4().to_string();
                (ObservationStatus::Created, Some(new_canonical), 0.0, None)
            }
        };

        let now = observed_at_now();
        let payload = serde_json::json!({
            "type": input.entity_type,
            "normalized": input.normalized,
            "confidence": input.confidence,
        });
        let observation = ObservedEntity {
            id: ObservationId::from(Uuid::new_v4().to_string()),
            tenant_id: input.tenant_id.clone(),
            source_type: input.source_type.clone(),
            source_id: input.source_id.clone(),
            source_url: input.source_url,
            payload,
            observed_at: now,
            status,
            canonical_id,
            match_score,
            matched_by,
        };

        let src_key = source_key(&input.tenant_id, &input.source_type, &input.source_id);
        inner.by_source.entry(src_key).or_default().push(observation.id.clone());
        inner.by_normalized.entry(norm_key).or_default().push(observation.id.clone());
        inner.observations.insert(observation.id.clone(), observation.clone());
        observation
    }

    pub fn approve(
        &self,
        tenant_id: &str,
        observation_id: &ObservationId,
        canonical_id: &str,
    ) -> Result<(), NerError> {
        let mut inner = self.inner.write().unwrap();
        let obs = inner
            .observations
            .get_mut(observation_id)
            .filter(|o| o.tenant_id == tenant_id)
            .ok_or(NerError::NotFound)?;
        obs.status = ObservationStatus::Matched;
        obs.canonical_id = Some(canonical_id.to_string());
        Ok(())
    }

    pub fn reject(&self, tenant_id: &str, observation_id: &ObservationId) -> Result<(), NerError> {
        let mut inner = self.inner.write().unwrap();
        let obs = inner
            .observations
            .get_mut(observation_id)
            .filter(|o| o.tenant_id == tenant_id)
            .ok_or(NerError::NotFound)?;
        obs.status = ObservationStatus::Rejected;
        obs.canonical_id = None;
        Ok(())
    }

    pub fn get(&self, tenant_id: &str, observation_id: &ObservationId) -> Result<ObservedEntity, NerError> {
        let inner = self.inner.read().unwrap();
        inner
            .observations
            .get(observation_id)
            .filter(|o| o.tenant_id == tenant_id)
            .cloned()
            .ok_or(NerError::NotFound)
    }

    /// Builds the cross-source canonical view for a `(normalized, type)` pair (§4.3 Cross-source view).
    pub fn build_view(
        &self,
        tenant_id: &str,
        normalized: &str,
        entity_type: &str,
    ) -> Result<CrossSourceView, NerError> {
        let inner = self.inner.read().unwrap();
        let key = normalized_key(tenant_id, normalized, entity_type);
        let ids = inner.by_normalized.get(&key).ok_or(NerError::NotFound)?;
        let observations: Vec<&ObservedEntity> = ids
            .iter()
            .filter_map(|id| inner.observations.get(id))
            .filter(|o| o.tenant_id == tenant_id)
            .collect();
        if observations.is_empty() {
            return Err(NerError::NotFound);
        }

        let canonical_id = observations
            .iter()
            .find_map(|o| o.canonical_id.clone());
        let sources: Vec<String> = observations
            .iter()
            .map(|o| source_key(tenant_id, &o.source_type, &o.source_id))
            .collect();
        let first_seen = observations.iter().map(|o| o.observed_at).min().unwrap();
        let last_seen = observations.iter().map(|o| o.observed_at).max().unwrap();
        let confidences: Vec<f64> = observations
            .iter()
            .filter_map(|o| o.payload.get("confidence").and_then(Value::as_f64))
            .collect();
        let confidence = if confidences.is_empty() {
            0.0
        } else {
            confidences.iter().sum::<f64>() / confidences.len() as f64
        };

        Ok(CrossSourceView {
            normalized: normalized.to_string(),
            entity_type: entity_type.to_string(),
            canonical_id,
            observations: observations.iter().map(|o| o.id.clone()).collect(),
            sources,
            first_seen,
            last_seen,
            confidence,
        })
    }
}

fn observed_at_now() -> DateTime<Utc> {
    Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(tenant: &str, source_id: &str, normalized: &str) -> ObservationInput {
        ObservationInput {
            tenant_id: tenant.to_string(),
            source_type: "document".to_string(),
            source_id: source_id.to_string(),
            source_url: None,
            entity_type: "organization".to_string(),
            normalized: normalized.to_string(),
            confidence: 0.9,
        }
    }

    #[test]
    fn first_observation_with_no_candidates_is_created() {
        let observer = Observer::new(0.9);
        let obs = observer.observe(input("t1", "doc1", "acme"));
        assert!(matches!(obs.status, ObservationStatus::Created));
        assert!(obs.canonical_id.is_some());
    }

    #[test]
    fn exact_repeat_observation_auto_merges() {
        let observer = Observer::new(0.9);
        let first = observer.observe(input("t1", "doc1", "acme"));
        let second = observer.observe(input("t1", "doc2", "acme"));
        assert!(matches!(second.status, ObservationStatus::Matched));
        assert_eq!(second.canonical_id, first.canonical_id);
    }

    #[test]
    fn approve_and_reject_are_tenant_scoped() {
        let observer = Observer::new(0.9);
        let obs = observer.observe(input("t1", "doc1", "acme"));
        assert!(matches!(
            observer.approve("other-tenant", &obs.id, "canon1"),
            Err(NerError::NotFound)
        ));
        assert!(observer.approve("t1", &obs.id, "canon1").is_ok());
        let fetched = observer.get("t1", &obs.id).unwrap();
        assert!(matches!(fetched.status, ObservationStatus::Matched));
        assert_eq!(fetched.canonical_id.as_deref(), Some("canon1"));
    }

    #[test]
    fn build_view_aggregates_across_sources() {
        let observer = Observer::new(0.9);
        observer.observe(input("t1", "doc1", "acme"));
        observer.observe(input("t1", "doc2", "acme"));
        let view = observer.build_view("t1", "acme", "organization").unwrap();
        assert_eq!(view.observations.len(), 2);
        assert_eq!(view.sources.len(), 2);
    }

    #[test]
    fn build_view_for_unknown_pair_is_not_found() {
        let observer = Observer::new(0.9);
        assert!(matches!(
            observer.build_view("t1", "nope", "organization"),
            Err(NerError::NotFound)
        ));
    }

    #[test]
    fn observations_never_cross_tenants() {
        let observer = Observer::new(0.9);
        observer.observe(input("t1", "doc1", "acme"));
        let obs2 = observer.observe(input("t2", "doc1", "acme"));
        assert!(matches!(obs2.status, ObservationStatus::Created));
    }
}
