//! Grounded prompt for explaining a run diff
//!
//! The prompt only ever carries facts computed by the diff engine, serialized as
//! JSON after a fixed instruction block.

use crate::services::run_analyzer::models::RunDiff;

// ============================================================================
// Prompt Text
// ============================================================================

const PROMPT_BASE: &str = r#"You are an internal Spark + Reconciliation observability assistant.

Rules:
- Use ONLY the facts provided in the JSON below.
- Do NOT invent Spark configs, cluster sizes, table names or data volumes.
- If a fact needed for a conclusion is missing, say that it is missing.
- Keep recommendations actionable and specific to the facts.
"#;

const PROMPT_TASKS: &str = r#"Tasks:
1. Did performance regress or improve between baseline and candidate, and why?
2. How did match quality change (overall and per rule), and which rules drove it?
3. Which precision vs recall pattern does the change show?
4. Give deterministic tuning suggestions: input partitions, shuffle partitions, executor sizing.
"#;

const PROMPT_FACTS_HEADER: &str = "Facts JSON:\n";

/// Build the prompt text for one diff.
pub fn build_diff_prompt(diff: &RunDiff) -> serde_json::Result<String> {
    let facts = serde_json::to_string_pretty(diff)?;

    let mut prompt = String::with_capacity(
        PROMPT_BASE.len() + PROMPT_TASKS.len() + PROMPT_FACTS_HEADER.len() + facts.len() + 2,
    );
    prompt.push_str(PROMPT_BASE);
    prompt.push('\n');
    prompt.push_str(PROMPT_TASKS);
    prompt.push('\n');
    prompt.push_str(PROMPT_FACTS_HEADER);
    prompt.push_str(&facts);
    prompt.push('\n');
    Ok(prompt)
}
