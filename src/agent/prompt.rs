//! Prompt templates for the agent.

use crate::memory::Rule;
use crate::trajectory::{render_trajectory, Step};

/// System role for primary reasoning calls.
pub const REACT_SYSTEM_PROMPT: &str =
    "You are a helpful reasoning agent that uses tools via ReAct.";

/// Build the per-step prompt: question, file, retrieved rules, tool
/// contract, remaining reflection budget, and the trajectory so far.
///
/// The `Question: ` / `Associated file path: ` / `Observation:` line shapes
/// are load-bearing: the simulated model client keys off them.
pub fn build_react_prompt(
    question: &str,
    file_path: &str,
    trajectory: &[Step],
    reflections_remaining: u32,
    rules: &[Rule],
) -> String {
    let rules_text = if rules.is_empty() {
        "(no stored rules matched this task)".to_string()
    } else {
        rules
            .iter()
            .map(|rule| format!("- [{}] {}: {}", rule.id, rule.title, rule.content.join(" ")))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let trajectory_text = if trajectory.is_empty() {
        "(no steps taken yet)".to_string()
    } else {
        render_trajectory(trajectory)
    };

    format!(
        r#"You are solving a data question step by step using tools.

Question: {question}
Associated file path: {file_path}

Lessons retrieved from past runs:
{rules_text}

Available tools:
- python_exec("<path>") runs a Python script and returns its output
- xlsx_query("<path>", "<query>") inspects a spreadsheet for a query

Respond with a Thought line followed by either exactly one Action line or a
final Answer line. Use the exact call forms shown above.

Remaining reflections: {reflections_remaining}

Trajectory so far:
{trajectory_text}
"#
    )
}
