//! AI plan client
//!
//! Turns the board and project tree into prompts and the model's replies into
//! thinking plans. The plans call never fails; the architecture call does.

use std::sync::Arc;

use lazy_static::lazy_static;
use serde::Deserialize;
use serde_json::{json, Value};

use super::transport::{AiError, GenerateRequest, Transport};
use crate::models::{clock_stamp, FileItem, Task, ThinkingPlan};

/// Thought text of the plan substituted for a failed sync
pub const SENTINEL_THOUGHT: &str = "neural bridge interrupted, retrying";
/// Action text of the plan substituted for a failed sync
pub const SENTINEL_ACTION: &str = "restart sync protocol";

const PLAN_THINKING_BUDGET: u32 = 8000;
const SUMMARY_THINKING_BUDGET: u32 = 4000;

lazy_static! {
    static ref PLANS_SCHEMA: Value = json!({
        "type": "OBJECT",
        "properties": {
            "plans": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "thought": {"type": "STRING"},
                        "action": {"type": "STRING"},
                        "timestamp": {"type": "STRING"}
                    },
                    "required": ["thought", "action", "timestamp"]
                }
            }
        },
        "required": ["plans"]
    });
}

/// Result of a plans request. Failures are already folded into `Fallback`.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanBatch {
    /// Plans parsed from the service, in the service's order (may be empty)
    Fresh(Vec<ThinkingPlan>),
    /// The sentinel plan standing in for a failed request
    Fallback(ThinkingPlan),
}

impl PlanBatch {
    pub fn sentinel() -> Self {
        PlanBatch::Fallback(ThinkingPlan::new(
            SENTINEL_THOUGHT,
            SENTINEL_ACTION,
            clock_stamp(),
        ))
    }

    pub fn plans(&self) -> &[ThinkingPlan] {
        match self {
            PlanBatch::Fresh(plans) => plans,
            PlanBatch::Fallback(plan) => std::slice::from_ref(plan),
        }
    }

    pub fn into_plans(self) -> Vec<ThinkingPlan> {
        match self {
            PlanBatch::Fresh(plans) => plans,
            PlanBatch::Fallback(plan) => vec![plan],
        }
    }

    pub fn len(&self) -> usize {
        self.plans().len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans().is_empty()
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, PlanBatch::Fallback(_))
    }
}

#[derive(Deserialize)]
struct PlansEnvelope {
    plans: Vec<ThinkingPlan>,
}

/// Builds the prompt for the thinking feed
pub fn build_plan_prompt(tasks: &[Task], files: &[FileItem]) -> Result<String, AiError> {
    let task_context = tasks
        .iter()
        .map(|task| format!("{} ({})", task.title(), task.status()))
        .collect::<Vec<_>>()
        .join(", ");
    let file_context = serde_json::to_string(files)?;

    Ok(format!(
        "System state:\n\
         Tasks: {}\n\
         File Structure: {}\n\n\
         Act as a Silicon Autonomous PM. Provide a list of thoughts and actions in JSON format.\n\
         Analyze the architecture based on the files and tasks. Focus on high-level system coherence.",
        task_context, file_context
    ))
}

/// Builds the prompt for the on-demand architecture summary
pub fn build_architecture_prompt(files: &[FileItem]) -> Result<String, AiError> {
    Ok(format!(
        "Examine this file structure and suggest a scalable architecture for a high-performance autonomous system: {}. Return a concise technical summary.",
        serde_json::to_string(files)?
    ))
}

/// Parses `{"plans": [...]}` out of model output, tolerating a Markdown code fence
pub fn parse_plans(text: &str) -> Result<Vec<ThinkingPlan>, AiError> {
    let envelope: PlansEnvelope = serde_json::from_str(strip_code_fence(text.trim()))?;
    Ok(envelope.plans)
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // drop the info string (e.g. "json") on the opening line
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Client for the two AI-backed dashboard features
#[derive(Clone)]
pub struct PlanClient {
    transport: Arc<dyn Transport>,
    model: String,
}

impl PlanClient {
    pub fn new(transport: Arc<dyn Transport>, model: impl Into<String>) -> Self {
        Self {
            transport,
            model: model.into(),
        }
    }

    /// Asks for new thinking plans. Any failure yields the sentinel plan instead.
    pub async fn request_plans(&self, tasks: &[Task], files: &[FileItem]) -> PlanBatch {
        match self.try_request_plans(tasks, files).await {
            Ok(plans) => {
                tracing::debug!(count = plans.len(), "received thinking plans");
                PlanBatch::Fresh(plans)
            }
            Err(e) => {
                tracing::warn!(error = %e, "plan request failed; substituting sentinel plan");
                PlanBatch::sentinel()
            }
        }
    }

    async fn try_request_plans(
        &self,
        tasks: &[Task],
        files: &[FileItem],
    ) -> Result<Vec<ThinkingPlan>, AiError> {
        let request = GenerateRequest::new(&self.model, build_plan_prompt(tasks, files)?)
            .with_thinking_budget(PLAN_THINKING_BUDGET)
            .with_json_schema(PLANS_SCHEMA.clone());
        let text = self.transport.generate(request).await?;
        parse_plans(&text)
    }

    /// Asks for a free-text architecture summary. Failures are returned to the caller.
    pub async fn request_architecture_summary(&self, files: &[FileItem]) -> Result<String, AiError> {
        let request = GenerateRequest::new(&self.model, build_architecture_prompt(files)?)
            .with_thinking_budget(SUMMARY_THINKING_BUDGET);
        self.transport.generate(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::fakes::{FailingTransport, ScriptedTransport};
    use crate::seed::{default_files, default_tasks};
    use pretty_assertions::assert_eq;

    fn client(transport: Arc<dyn Transport>) -> PlanClient {
        PlanClient::new(transport, "test-model")
    }

    #[tokio::test]
    async fn test_failing_transport_yields_sentinel() {
        let transport = Arc::new(FailingTransport::default());
        let batch = client(transport.clone())
            .request_plans(&default_tasks(), &default_files())
            .await;

        assert!(batch.is_fallback());
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.plans()[0].thought, SENTINEL_THOUGHT);
        assert_eq!(batch.plans()[0].action, SENTINEL_ACTION);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_parses_service_plans() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(
            r#"{"plans":[{"thought":"a","action":"b","timestamp":"c"}]}"#.to_string(),
        )]));
        let batch = client(transport).request_plans(&[], &[]).await;

        assert_eq!(batch, PlanBatch::Fresh(vec![ThinkingPlan::new("a", "b", "c")]));
    }

    #[tokio::test]
    async fn test_malformed_output_yields_sentinel() {
        let replies = vec![
            Ok("not json".to_string()),
            Ok(r#"{"thoughts":[]}"#.to_string()),
            Ok(r#"{"plans":[{"thought":"a","action":"b"}]}"#.to_string()),
            Ok(r#"{"plans":"soon"}"#.to_string()),
        ];
        let count = replies.len();
        let client = client(Arc::new(ScriptedTransport::new(replies)));

        for _ in 0..count {
            let batch = client.request_plans(&[], &[]).await;
            assert!(batch.is_fallback(), "expected fallback, got {:?}", batch);
            assert_eq!(batch.len(), 1);
        }
    }

    #[tokio::test]
    async fn test_empty_plan_list_is_not_a_failure() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(r#"{"plans":[]}"#.to_string())]));
        let batch = client(transport).request_plans(&[], &[]).await;

        assert_eq!(batch, PlanBatch::Fresh(Vec::new()));
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn test_plan_request_shape() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(r#"{"plans":[]}"#.to_string())]));
        client(transport.clone())
            .request_plans(&default_tasks(), &default_files())
            .await;

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.model, "test-model");
        assert_eq!(request.thinking_budget, Some(PLAN_THINKING_BUDGET));
        assert_eq!(request.response_schema.as_ref(), Some(&*PLANS_SCHEMA));
        assert!(request
            .prompt
            .contains("Implement Silicon-Kernel (backlog), Neural UI Refresh (in-progress)"));
        assert!(request.prompt.contains(r#"{"id":"3-2","name":"Theme.config","type":"file"}"#));
    }

    #[tokio::test]
    async fn test_architecture_summary_propagates_failure() {
        let result = client(Arc::new(FailingTransport::default()))
            .request_architecture_summary(&default_files())
            .await;
        assert!(result.is_err());

        let transport = Arc::new(ScriptedTransport::new(vec![Ok("Use layers.".to_string())]));
        let summary = client(transport.clone())
            .request_architecture_summary(&default_files())
            .await
            .unwrap();
        assert_eq!(summary, "Use layers.");
        let request = &transport.requests()[0];
        assert_eq!(request.response_schema, None);
        assert_eq!(request.thinking_budget, Some(SUMMARY_THINKING_BUDGET));
    }

    #[test]
    fn test_parse_plans_strips_code_fence() {
        let text = "```json\n{\"plans\":[{\"thought\":\"t\",\"action\":\"a\",\"timestamp\":\"10:00:00\"}]}\n```\n";
        let plans = parse_plans(text).unwrap();
        assert_eq!(plans, vec![ThinkingPlan::new("t", "a", "10:00:00")]);
    }

    #[test]
    fn test_empty_inputs_still_build_a_prompt() {
        let prompt = build_plan_prompt(&[], &[]).unwrap();
        assert!(prompt.contains("Tasks: \n"));
        assert!(prompt.contains("File Structure: []"));
    }
}
