//! Instruction and rubric synthesis.
//!
//! Both are single chat calls against the source text. Either failing is
//! fatal for the round, so transient collaborator errors are retried with
//! exponential backoff before giving up.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::collaborators::{ChatCompletion, ChatRequest, CollaboratorResult};
use crate::domain::{CollaboratorError, Result, RoundError, Stage};

const INSTRUCTION_SYSTEM_PROMPT: &str = "Compile a task instruction from this source. \
Write the instruction a writer would need to produce text that conveys the same content. \
Reply with the instruction only.";

const RUBRIC_SYSTEM_PROMPT: &str = "Compile a rubric from this source. \
List the checkable points a faithful response must cover, one point per line. \
Reply with the points only.";

/// Retry behaviour for fatal-path collaborator calls.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first (>= 1).
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles on each further attempt.
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 2000,
        }
    }
}

impl RetryPolicy {
    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 0,
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }
}

/// Call the chat collaborator, retrying transient failures.
///
/// An empty (whitespace-only) response counts as a non-retryable failure.
pub async fn complete_with_retry(
    chat: &dyn ChatCompletion,
    request: ChatRequest,
    policy: RetryPolicy,
) -> CollaboratorResult<String> {
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match chat.complete(request.clone()).await {
            Ok(text) if text.trim().is_empty() => {
                return Err(CollaboratorError::Failed(format!(
                    "model {} returned an empty response",
                    request.model
                )));
            }
            Ok(text) => return Ok(text),
            Err(e) if e.is_retryable() && attempt + 1 < attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    model = %request.model,
                    attempt = attempt + 1,
                    max_attempts = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "chat call failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Turn the source text into a task instruction. The response is used
/// verbatim (no draft-tag extraction).
pub async fn synthesize_instruction(
    chat: &dyn ChatCompletion,
    source_text: &str,
    model: &str,
    temperature: f64,
    policy: RetryPolicy,
) -> Result<String> {
    let request = ChatRequest {
        model: model.to_string(),
        system_prompt: Some(INSTRUCTION_SYSTEM_PROMPT.to_string()),
        user_content: source_text.to_string(),
        temperature,
    };
    let text = complete_with_retry(chat, request, policy)
        .await
        .map_err(|e| RoundError::StageFailed {
            stage: Stage::Instruction,
            reason: e.to_string(),
        })?;
    debug!(model = %model, chars = text.len(), "instruction synthesized");
    Ok(text)
}

/// Turn the source text into ordered rubric points.
pub async fn synthesize_rubric(
    chat: &dyn ChatCompletion,
    source_text: &str,
    model: &str,
    temperature: f64,
    policy: RetryPolicy,
) -> Result<Vec<String>> {
    let request = ChatRequest {
        model: model.to_string(),
        system_prompt: Some(RUBRIC_SYSTEM_PROMPT.to_string()),
        user_content: source_text.to_string(),
        temperature,
    };
    let text = complete_with_retry(chat, request, policy)
        .await
        .map_err(|e| RoundError::StageFailed {
            stage: Stage::Assertions,
            reason: e.to_string(),
        })?;

    let points = parse_rubric(&text);
    if points.is_empty() {
        return Err(RoundError::StageFailed {
            stage: Stage::Assertions,
            reason: format!("model {model} returned no rubric points"),
        });
    }
    debug!(model = %model, points = points.len(), "rubric synthesized");
    Ok(points)
}

/// Split a rubric response into points: one per non-empty line, list
/// markers stripped, order preserved.
pub fn parse_rubric(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| strip_list_marker(line.trim()).trim().to_string())
        .filter(|line| !line.is_empty())
        .collect()
}

fn strip_list_marker(line: &str) -> &str {
    for bullet in ['-', '*', '•'] {
        if let Some(rest) = line.strip_prefix(bullet) {
            if rest.is_empty() || rest.starts_with(char::is_whitespace) {
                return rest;
            }
        }
    }
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &line[digits..];
        for sep in ['.', ')'] {
            if let Some(stripped) = rest.strip_prefix(sep) {
                if stripped.is_empty() || stripped.starts_with(char::is_whitespace) {
                    return stripped;
                }
            }
        }
    }
    line
}
