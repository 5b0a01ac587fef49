// Prompt fragments shared by every LLM-backed step.
// Step-specific templates live in steps/prompts.rs.

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You are a precise, structured assistant. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON value. \
    Do NOT use markdown code fences.";

/// Appended to every prompt that produces or judges resume claims.
pub const GROUNDING_INSTRUCTION: &str = "\
    CRITICAL: Every claim must be traceable to at least one evidence card id listed in the \
    context. Do NOT infer, round, or invent numbers, titles, dates or scope. \
    If the evidence does not support a claim, leave the claim out.";

/// Defects quoted back to the model when a reply is re-asked.
const RETRY_FEEDBACK_LIMIT: usize = 3;

/// Builds a system prompt from a role description plus the JSON-only rule.
pub fn system_prompt(role: &str) -> String {
    format!("{role}\n\n{JSON_ONLY_SYSTEM}")
}

/// The original prompt plus the first defects of the rejected reply, so a re-ask
/// tells the model what to fix.
pub fn with_retry_feedback(prompt: &str, defects: &[String]) -> String {
    if defects.is_empty() {
        return prompt.to_string();
    }
    let listed: Vec<String> = defects
        .iter()
        .take(RETRY_FEEDBACK_LIMIT)
        .map(|d| format!("- {d}"))
        .collect();
    let more = defects.len().saturating_sub(RETRY_FEEDBACK_LIMIT);
    let tail = if more > 0 {
        format!("\n({more} more of the same kind)")
    } else {
        String::new()
    };
    format!(
        "{prompt}\n\nYour previous reply was rejected:\n{}{tail}\nReturn a corrected reply.",
        listed.join("\n")
    )
}
