use serde::{Deserialize, Serialize};

use crate::error::NerError;
use crate::provider::LlmProvider;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeClassification {
    #[serde(rename = "type")]
    pub entity_type: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRule {
    pub id: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PolicyDetails {
    pub rules: Vec<PolicyRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessStep {
    pub id: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProcessDetails {
    pub steps: Vec<ProcessStep>,
}

#[derive(Debug, Clone)]
pub enum ClassificationDetails {
    None,
    Policy(PolicyDetails),
    Process(ProcessDetails),
}

#[derive(Debug, Clone)]
pub struct Classification {
    pub entity_type: String,
    pub confidence: f64,
    pub details: ClassificationDetails,
}

#[derive(Deserialize)]
struct RawRule {
    #[serde(default)]
    id: Option<String>,
    text: String,
}

#[derive(Deserialize)]
struct RawRules {
    rules: Vec<RawRule>,
}

#[derive(Deserialize)]
struct RawStep {
    #[serde(default)]
    id: Option<String>,
    text: String,
}

#[derive(Deserialize)]
struct RawSteps {
    steps: Vec<RawStep>,
}

/// Classifies `text` against the closed type set, then — only for `policy`/`process` — issues a
/// second call to extract rules/steps (§4.3 Classifier).
pub async fn classify(
    llm: &dyn LlmProvider,
    text: &str,
) -> Result<Classification, NerError> {
    let type_prompt = format!(
        "Classify the following content into exactly one type: person, organization, project, \
         product, document, policy, process, technology, location, date, code, other. \
         Return JSON: {{\"type\": \"...\", \"confidence\": 0.0}}.\n\n{text}"
    );
    let raw = llm.complete(&type_prompt, 200).await?;
    let cleaned = crate::extractor::strip_code_fences(&raw);
    let classification: TypeClassification = serde_json::from_str(cleaned)
        .map_err(|e| NerError::Invalid(format!("malformed classification response: {e}")))?;

    let details = match classification.entity_type.as_str() {
        "policy" => ClassificationDetails::Policy(extract_policy_details(llm, text).await?),
        "process" => ClassificationDetails::Process(extract_process_details(llm, text).await?),
        _ => ClassificationDetails::None,
    };

    Ok(Classification {
        entity_type: classification.entity_type,
        confidence: classification.confidence,
        details,
    })
}

async fn extract_policy_details(
    llm: &dyn LlmProvider,
    text: &str,
) -> Result<PolicyDetails, NerError> {
    let prompt = format!(
        "Extract the individual rules stated in this policy. \
         Return JSON: {{\"rules\": [{{\"id\": \"...\", \"text\": \"...\"}}]}}.\n\n{text}"
    );
    let raw = llm.complete(&prompt, 1000).await?;
    let cleaned = crate::extractor::strip_code_fences(&raw);
    let parsed: RawRules = serde_json::from_str(cleaned)
        .map_err(|e| NerError::Invalid(format!("malformed policy details response: {e}")))?;

    let rules = parsed
        .rules
        .into_iter()
        .enumerate()
        .map(|(i, r)| PolicyRule {
            id: r.id.unwrap_or_else(|| format!("R{}", i + 1)),
            text: r.text,
        })
        .collect();
    Ok(PolicyDetails { rules })
}

async fn extract_process_details(
    llm: &dyn LlmProvider,
    text: &str,
) -> Result<ProcessDetails, NerError> {
    let prompt = format!(
        "Extract the ordered steps described in this process. \
         Return JSON: {{\"steps\": [{{\"id\": \"...\", \"text\": \"...\"}}]}}.\n\n{text}"
    );
    let raw = llm.complete(&prompt, 1000).await?;
    let cleaned = crate::extractor::strip_code_fences(&raw);
    let parsed: RawSteps = serde_json::from_str(cleaned)
        .map_err(|e| NerError::Invalid(format!("malformed process details response: {e}")))?;

    let steps = parsed
        .steps
        .into_iter()
        .enumerate()
        .map(|(i, s)| ProcessStep {
            id: s.id.unwrap_or_else(|| format!("S{}", i + 1)),
            text: s.text,
        })
        .collect();
    Ok(ProcessDetails { steps })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockLlmProvider;

    struct SequencedProvider {
        responses: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl LlmProvider for SequencedProvider {
        async fn complete(&self, _prompt: &str, _max_tokens: usize) -> Result<String, NerError> {
            Ok(self.responses.lock().unwrap().remove(0))
        }
    }

    #[tokio::test]
    async fn non_policy_process_type_skips_details_call() {
        let llm = MockLlmProvider::with_response(r#"{"type": "person", "confidence": 0.9}"#);
        let result = classify(&llm, "Jane Doe").await.unwrap();
        assert_eq!(result.entity_type, "person");
        assert!(matches!(result.details, ClassificationDetails::None));
    }

    #[tokio::test]
    async fn policy_type_triggers_rule_extraction_with_generated_ids() {
        let llm = SequencedProvider {
            responses: std::sync::Mutex::new(vec![
                r#"{"type": "policy", "confidence": 0.95}"#.to_string(),
                r#"{"rules": [{"text": "no pets"}, {"text": "no smoking"}]}"#.to_string(),
            ]),
        };
        let result = classify(&llm, "Office policy text").await.unwrap();
        assert_eq!(result.entity_type, "policy");
        match result.details {
            ClassificationDetails::Policy(details) => {
                assert_eq!(details.rules.len(), 2);
                assert_eq!(details.rules[0].id, "R1");
                assert_eq!(details.rules[1].id, "R2");
            }
            _ => panic!("expected policy details"),
        }
    }

    #[tokio::test]
    async fn process_type_triggers_step_extraction() {
        let llm = SequencedProvider {
            responses: std::sync::Mutex::new(vec![
                r#"{"type": "process", "confidence": 0.8}"#.to_string(),
                r#"{"steps": [{"id": "custom1", "text": "open ticket"}]}"#.to_string(),
            ]),
        };
        let result = classify(&llm, "Process text").await.unwrap();
        match result.details {
            ClassificationDetails::Process(details) => {
                assert_eq!(details.steps.len(), 1);
                assert_eq!(details.steps[0].id, "custom1");
            }
            _ => panic!("expected process details"),
        }
    }
}
