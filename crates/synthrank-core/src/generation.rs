//! Response generation fan-out for candidate and anchor groups.
//!
//! One batch call per configuration. Every model that errors, is missing
//! from the reply, or returns no usable draft is dropped from its group with
//! a [`SoftFailure`]; it never reaches scoring.

use tracing::debug;

use crate::collaborators::{GenerationConfig, ResponseGenerator};
use crate::domain::{SoftFailure, Stage};
use crate::extract::extract_nonempty_draft;

/// A usable draft from one model.
#[derive(Debug, Clone, PartialEq)]
pub struct Draft {
    pub model_id: String,
    pub text: String,
}

/// Outcome of generating one group.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupGeneration {
    pub group_id: String,
    /// Drafts in configuration model order.
    pub drafts: Vec<Draft>,
    pub failures: Vec<SoftFailure>,
}

/// Run one generation configuration and extract drafts.
pub async fn generate_group(
    generator: &dyn ResponseGenerator,
    config: &GenerationConfig,
) -> GroupGeneration {
    let mut result = GroupGeneration {
        group_id: config.group_id.clone(),
        ..Default::default()
    };
    if config.models.is_empty() {
        return result;
    }

    let groups = match generator.generate_all(config).await {
        Ok(groups) => groups,
        Err(e) => {
            result.failures = config
                .models
                .iter()
                .map(|m| SoftFailure::new(Stage::Generation, m, format!("batch failed: {e}")))
                .collect();
            return result;
        }
    };
    let outcomes = groups.get(&config.group_id);

    for model in &config.models {
        match outcomes.and_then(|o| o.get(model)) {
            None => result.failures.push(SoftFailure::new(
                Stage::Generation,
                model,
                "no response returned",
            )),
            Some(Err(e)) => {
                result
                    .failures
                    .push(SoftFailure::new(Stage::Generation, model, e.to_string()))
            }
            Some(Ok(response)) => match response
                .final_assistant_response_text
                .as_deref()
                .and_then(extract_nonempty_draft)
            {
                Some(text) => result.drafts.push(Draft {
                    model_id: model.clone(),
                    text,
                }),
                None => result.failures.push(SoftFailure::new(
                    Stage::Generation,
                    model,
                    "response contained no draft",
                )),
            },
        }
    }

    debug!(
        group = %config.group_id,
        drafts = result.drafts.len(),
        failures = result.failures.len(),
        "generation group finished"
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::CANDIDATE_GROUP;
    use crate::domain::CollaboratorError;
    use crate::fakes::StaticGenerator;

    fn config(models: &[&str]) -> GenerationConfig {
        GenerationConfig {
            group_id: CANDIDATE_GROUP.to_string(),
            models: models.iter().map(|m| m.to_string()).collect(),
            temperature: 0.9,
            system_prompt: None,
            prompt: "write".to_string(),
        }
    }

    #[tokio::test]
    async fn test_drafts_extracted_in_model_order() {
        let gen = StaticGenerator::new()
            .with_response(CANDIDATE_GROUP, "m2", "preamble <draft>second</draft>")
            .with_response(CANDIDATE_GROUP, "m1", "first");
        let out = generate_group(&gen, &config(&["m1", "m2"])).await;
        assert_eq!(
            out.drafts,
            vec![
                Draft {
                    model_id: "m1".into(),
                    text: "first".into()
                },
                Draft {
                    model_id: "m2".into(),
                    text: "second".into()
                },
            ]
        );
        assert!(out.failures.is_empty());
    }

    #[tokio::test]
    async fn test_failed_missing_and_empty_models_are_dropped() {
        let gen = StaticGenerator::new()
            .with_response(CANDIDATE_GROUP, "ok", "fine")
            .with_error(CANDIDATE_GROUP, "err", CollaboratorError::Failed("500".into()))
            .with_empty_response(CANDIDATE_GROUP, "blank")
            .with_response(CANDIDATE_GROUP, "hollow", "<draft>  </draft>");
        let out = generate_group(&gen, &config(&["ok", "err", "blank", "hollow", "missing"])).await;
        assert_eq!(out.drafts.len(), 1);
        assert_eq!(out.drafts[0].model_id, "ok");
        let failed: Vec<&str> = out.failures.iter().map(|f| f.subject.as_str()).collect();
        assert_eq!(failed, vec!["err", "blank", "hollow", "missing"]);
    }

    #[tokio::test]
    async fn test_batch_failure_fails_every_model_softly() {
        let gen = StaticGenerator::new()
            .with_group_failure(CANDIDATE_GROUP, CollaboratorError::Transient("503".into()));
        let out = generate_group(&gen, &config(&["a", "b"])).await;
        assert!(out.drafts.is_empty());
        assert_eq!(out.failures.len(), 2);
        assert!(out.failures[0].reason.contains("batch failed"));
    }

    #[tokio::test]
    async fn test_empty_config_skips_call() {
        let gen = StaticGenerator::new();
        let out = generate_group(&gen, &config(&[])).await;
        assert!(out.drafts.is_empty());
        assert!(gen.configs().is_empty());
    }
}
