//! Generative-AI access
//!
//! `transport` talks to the provider; `planner` builds prompts from dashboard
//! state and turns the replies into thinking plans.

mod planner;
mod transport;

#[cfg(test)]
pub(crate) mod fakes;

pub use planner::{
    build_architecture_prompt, build_plan_prompt, parse_plans, PlanBatch, PlanClient,
    SENTINEL_ACTION, SENTINEL_THOUGHT,
};
pub use transport::{
    AiConfig, AiError, GeminiTransport, GenerateRequest, Transport, API_KEY_ENV,
    DEFAULT_ENDPOINT, DEFAULT_MODEL,
};
