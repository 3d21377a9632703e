//! Personas and prompt composition

use crate::category::TaskCategory;

const PERSONA_CHAT: &str = "You are OpenClaw, a sentient Coordinator. Professional but gritty.";
const PERSONA_REASON: &str =
    "You are the LOGIC CORE. TRUTH and ACCURACY only. Chain of thought, no fluff.";
const PERSONA_REASON_STRICT: &str =
    "You are the LOGIC CORE (strict). Red teaming. Data integrity.";
const PERSONA_TOOL: &str = "You are the EXECUTION ENGINE. Output VALID JSON ONLY.";

/// Fixed system prompt for a category
#[must_use]
pub fn persona(category: TaskCategory) -> &'static str {
    match category {
        TaskCategory::Chat => PERSONA_CHAT,
        TaskCategory::Reason => PERSONA_REASON,
        TaskCategory::ReasonStrict => PERSONA_REASON_STRICT,
        TaskCategory::Tool => PERSONA_TOOL,
    }
}

/// System prompt actually sent; a caller context only replaces the chat persona
pub(crate) fn system_prompt(category: TaskCategory, system_context: Option<&str>) -> String {
    match (category, system_context) {
        (TaskCategory::Chat, Some(ctx)) if !ctx.trim().is_empty() => ctx.to_string(),
        _ => persona(category).to_string(),
    }
}

/// Wrap a user prompt with optional context or schema
///
/// `reason` prompts get a context summary header, `tool` prompts a schema
/// requirement header. Other combinations return the prompt unchanged.
#[must_use]
pub fn compose_prompt(
    category: TaskCategory,
    prompt: &str,
    context: Option<&str>,
    schema: Option<&str>,
) -> String {
    match (category, context, schema) {
        (TaskCategory::Reason | TaskCategory::ReasonStrict, Some(ctx), _) => {
            format!("Context Summary:\n{ctx}\n\nTask:\n{prompt}")
        }
        (TaskCategory::Tool, _, Some(schema)) => {
            format!("Schema Requirement:\n{schema}\n\nInput Data:\n{prompt}")
        }
        _ => prompt.to_string(),
    }
}
