use serde::{Deserialize, Serialize};

use crate::error::NerError;
use crate::provider::LlmProvider;

/// Closed entity-type set (§4.3). Anything else the LLM returns falls back to `other` rather than
/// being rejected, since the extractor must tolerate model drift.
const ENTITY_TYPES: &[&str] = &[
    "person",
    "organization",
    "project",
    "product",
    "document",
    "policy",
    "process",
    "technology",
    "location",
    "date",
    "code",
    "other",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedEntity {
    pub text: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub normalized: String,
    pub confidence: f64,
    #[serde(default)]
    pub qualifiers: Vec<String>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub start_offset: Option<usize>,
    #[serde(default)]
    pub end_offset: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RawEntity {
    text: String,
    #[serde(rename = "type")]
    entity_type: Option<String>,
    #[serde(default)]
    normalized: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    qualifiers: Option<Vec<String>>,
    #[serde(default)]
    context: Option<String>,
}

/// Strips a single leading/trailing Markdown code fence (```` ```json ... ``` ```` or
/// ```` ``` ... ``` ````), which chat-style LLM completions wrap JSON in more often than not.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(after_open) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let after_open = after_open
        .strip_prefix("json")
        .unwrap_or(after_open)
        .trim_start_matches('\n');
    after_open.strip_suffix("```").unwrap_or(after_open).trim()
}

fn build_prompt(text: &str, source_type: &str) -> String {
    format!(
        "Extract named entities from the following {source_type} content. \
         Return a JSON array of objects with fields: text, type, normalized, confidence, qualifiers, context. \
         Valid types: {}.\n\n{text}",
        ENTITY_TYPES.join(", ")
    )
}

/// Extracts entities from `text` (§4.3 Extractor). `tenant_id`/`source_id` are not sent to the
/// model; they identify the caller for tracing only.
pub async fn extract_entities(
    llm: &dyn LlmProvider,
    tenant_id: &str,
    source_id: &str,
    source_type: &str,
    text: &str,
) -> Result<Vec<ExtractedEntity>, NerError> {
    tracing::debug!(tenant_id, source_id, source_type, "extracting entities");
    let prompt = build_prompt(text, source_type);
    let raw = llm.complete(&prompt, 2000).await?;
    let cleaned = strip_code_fences(&raw);
    let parsed: Vec<RawEntity> = serde_json::from_str(cleaned)
        .map_err(|e| NerError::Invalid(format!("malformed entity extraction response: {e}")))?;

    let mut entities = Vec::with_capacity(parsed.len());
    for raw in parsed {
        let entity_type = raw
            .entity_type
            .filter(|t| ENTITY_TYPES.contains(&t.as_str()))
            .unwrap_or_else(|| "other".to_string());
        let (start_offset, end_offset) = text
            .find(&raw.text)
            .map(|start| (Some(start), Some(start + raw.text.len())))
            .unwrap_or((None, None));
        let normalized = raw.normalized.unwrap_or_else(|| raw.text.to_lowercase());

        entities.push(ExtractedEntity {
            text: raw.text,
            entity_type,
            normalized,
            confidence: raw.confidence.unwrap_or(0.8),
            qualifiers: raw.qualifiers.unwrap_or_default(),
            context: raw.context,
            start_offset,
            end_offset,
        });
    }
    Ok(entities)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockLlmProvider;

    #[tokio::test]
    async fn extracts_and_defaults_confidence() {
        let llm = MockLlmProvider::with_response(
            r#"[{"text": "Acme Corp", "type": "organization", "normalized": "acme corp"}]"#,
        );
        let entities = extract_entities(&llm, "tenant1", "doc1", "document", "Acme Corp is here")
            .await
            .unwrap();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].confidence, 0.8);
        assert_eq!(entities[0].start_offset, Some(0));
        assert_eq!(entities[0].end_offset, Some(9));
    }

    #[tokio::test]
    async fn unknown_type_falls_back_to_other() {
        let llm = MockLlmProvider::with_response(
            r#"[{"text": "widget", "type": "gadget", "normalized": "widget"}]"#,
        );
        let entities = extract_entities(&llm, "t", "s", "document", "a widget here")
            .await
            .unwrap();
        assert_eq!(entities[0].entity_type, "other");
    }

    #[tokio::test]
    async fn strips_code_fence_before_parsing() {
        let llm = MockLlmProvider::with_response(
            "```json\n[{\"text\": \"Bob\", \"type\": \"person\", \"normalized\": \"bob\"}]\n```",
        );
        let entities = extract_entities(&llm, "t", "s", "document", "Bob said hi")
            .await
            .unwrap();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].entity_type, "person");
    }

    #[tokio::test]
    async fn mention_not_found_verbatim_has_no_offsets() {
        let llm = MockLlmProvider::with_response(
            r#"[{"text": "not in text", "type": "other", "normalized": "x"}]"#,
        );
        let entities = extract_entities(&llm, "t", "s", "document", "completely different text")
            .await
            .unwrap();
        assert_eq!(entities[0].start_offset, None);
        assert_eq!(entities[0].end_offset, None);
    }
}
