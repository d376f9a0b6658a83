//! Reflection-triggered rule extraction.
//!
//! One secondary reasoning call asks the model for 0-3 "memory items" in a
//! fixed markdown shape, parsed with a tolerant line scanner. Extraction
//! never fails: a raised call or an empty parse both degrade to a single
//! deterministic fallback rule, and simulated mode skips the call entirely.

use crate::llm::{ModelClient, ModelRequest};
use crate::trajectory::{render_trajectory, Step};

use super::bank::{Polarity, RuleDraft};
use super::tags::infer_tags;

const EXTRACTION_SYSTEM_PROMPT: &str =
    "You are an expert at summarizing reusable reasoning strategies from trajectories.";

const EXTRACTION_TEMPERATURE: f32 = 0.3;

/// Distill 0-3 rules from a completed trajectory and a reflection note.
/// Never fails; the worst case is one deterministic fallback rule.
pub fn extract_rules(
    model: &dyn ModelClient,
    simulated: bool,
    question: &str,
    file_path: &str,
    trajectory: &[Step],
    reflection_note: &str,
) -> Vec<RuleDraft> {
    let tags = infer_tags(question, file_path);

    if simulated {
        return vec![simulated_rule(tags)];
    }

    let last_observation = trajectory
        .iter()
        .rev()
        .find_map(|step| step.observation.as_ref())
        .map(|observation| observation.render())
        .unwrap_or_else(|| "N/A".to_string());

    let prompt = build_extraction_prompt(
        question,
        file_path,
        &last_observation,
        reflection_note,
        &render_trajectory(trajectory),
    );
    let request = ModelRequest::new(EXTRACTION_SYSTEM_PROMPT, prompt, EXTRACTION_TEMPERATURE);

    let text = match model.complete(&request) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!("Rule extraction call failed: {}, using fallback", e);
            return vec![exception_fallback_rule(tags)];
        }
    };

    let drafts: Vec<RuleDraft> = parse_memory_items(&text)
        .into_iter()
        .map(|item| item.into_draft(&tags, &last_observation))
        .collect();

    if drafts.is_empty() {
        tracing::warn!("Rule extraction parsed no memory items, using fallback");
        return vec![empty_parse_fallback_rule(tags)];
    }
    drafts
}

fn build_extraction_prompt(
    question: &str,
    file_path: &str,
    last_observation: &str,
    reflection_note: &str,
    trajectory_text: &str,
) -> String {
    format!(
        r#"You analyze tool-using agent trajectories.

You will be given a user query, the associated file, the agent's trajectory, the final tool observation and a brief reflection.
Extract and summarize useful insights in the format of memory items.

Guidelines:
- First think about why the trajectory succeeded or failed, then summarize the insights.
- Memory items must be helpful and generalizable for future similar tasks.
- Extract at most 3 memory items.
- Do not repeat similar or overlapping items.
- Do not mention specific file names, queries, or concrete string contents.

Output format (strictly follow this Markdown structure):
# Memory Item 1
## Title
<one short title>
## Description
<one-sentence summary>
## Content
<1-3 sentences describing the insight in a generic and reusable way>

Now produce memory items for the following input.

Query: {question}
File path: {file_path}
Last tool observation: {last_observation}
Reflection: {reflection_note}
Trajectory:
{trajectory_text}
"#
    )
}

#[derive(Debug, Default)]
struct ParsedItem {
    title: String,
    description: String,
    content: Vec<String>,
}

impl ParsedItem {
    fn into_draft(self, tags: &[String], last_observation: &str) -> RuleDraft {
        let lower_observation = last_observation.to_lowercase();
        let polarity = if lower_observation.contains("error") || lower_observation.contains("exception")
        {
            Polarity::Failure
        } else {
            Polarity::Success
        };

        let title = if self.title.is_empty() {
            "Memory item".to_string()
        } else {
            self.title
        };
        let description = if self.description.is_empty() {
            "Strategy extracted from a past trajectory.".to_string()
        } else {
            self.description
        };
        let content = if self.content.is_empty() {
            vec!["Reflect on the tool output before answering.".to_string()]
        } else {
            self.content
        };

        RuleDraft {
            title,
            description,
            content,
            tags: tags.to_vec(),
            polarity,
            evidence: "Extracted from memory-item markdown.".to_string(),
        }
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    None,
    Title,
    Description,
    Content,
}

/// Tolerant line scanner for the memory-item markdown shape. Title and
/// Description keep only the first non-empty line after their header;
/// Content accumulates every non-empty line until the next header.
fn parse_memory_items(text: &str) -> Vec<ParsedItem> {
    let mut items = Vec::new();
    let mut current: Option<ParsedItem> = None;
    let mut section = Section::None;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with("```") {
            continue;
        }
        if line.starts_with("# Memory Item") {
            if let Some(item) = current.take() {
                items.push(item);
            }
            current = Some(ParsedItem::default());
            section = Section::None;
            continue;
        }
        if line.starts_with("## Title") {
            section = Section::Title;
            continue;
        }
        if line.starts_with("## Description") {
            section = Section::Description;
            continue;
        }
        if line.starts_with("## Content") {
            section = Section::Content;
            continue;
        }

        let Some(item) = current.as_mut() else {
            continue;
        };
        match section {
            Section::Title => {
                if item.title.is_empty() {
                    item.title = line.to_string();
                }
            }
            Section::Description => {
                if item.description.is_empty() {
                    item.description = line.to_string();
                }
            }
            Section::Content => item.content.push(line.to_string()),
            Section::None => {}
        }
    }
    if let Some(item) = current {
        items.push(item);
    }
    items
}

fn simulated_rule(tags: Vec<String>) -> RuleDraft {
    RuleDraft {
        title: "Basic strategy for this type of task".to_string(),
        description: "A simple rule distilled in simulated mode.".to_string(),
        content: vec![
            "Carefully inspect the tool output before answering.".to_string(),
            "If the question asks for a comparison, explicitly compare the key numeric values."
                .to_string(),
        ],
        tags,
        polarity: Polarity::Success,
        evidence: "Generated in simulated mode from the recent trajectory.".to_string(),
    }
}

fn empty_parse_fallback_rule(tags: Vec<String>) -> RuleDraft {
    RuleDraft {
        title: "Fallback rule".to_string(),
        description: "Fallback rule when memory extraction yields nothing.".to_string(),
        content: vec!["Always cross-check the tool output before finalizing the answer.".to_string()],
        tags,
        polarity: Polarity::Success,
        evidence: "Fallback generated after empty memory extraction.".to_string(),
    }
}

fn exception_fallback_rule(tags: Vec<String>) -> RuleDraft {
    RuleDraft {
        title: "Extraction failure fallback rule".to_string(),
        description: "Rule generated after a failed memory-extraction call.".to_string(),
        content: vec!["Verify numerical results and edge cases when using tools.".to_string()],
        tags,
        polarity: Polarity::Failure,
        evidence: "Fallback generated after a failed extraction call.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ModelError;
    use crate::tools::{ErrorKind, Observation};
    use serde_json::json;

    struct FixedModel(String);

    impl ModelClient for FixedModel {
        fn complete(&self, _request: &ModelRequest) -> Result<String, ModelError> {
            Ok(self.0.clone())
        }
    }

    struct FailingModel;

    impl ModelClient for FailingModel {
        fn complete(&self, _request: &ModelRequest) -> Result<String, ModelError> {
            Err(ModelError::Transport("connection refused".to_string()))
        }
    }

    fn tool_step(observation: Observation) -> Step {
        Step {
            step: 1,
            thought: "Thought: run the tool".to_string(),
            action: None,
            observation: Some(observation),
            retrieved_rules: vec![],
        }
    }

    const QUESTION: &str = "Which city had the greater total sales?";
    const FILE: &str = "sales.xlsx";
    const NOTE: &str = "double-check the results";

    #[test]
    fn failed_call_yields_one_failure_rule_with_content() {
        let trajectory = vec![tool_step(Observation::ok(json!({"rows": []})))];
        let rules = extract_rules(&FailingModel, false, QUESTION, FILE, &trajectory, NOTE);
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].polarity, Polarity::Failure);
        assert!(!rules[0].content.is_empty());
        assert_eq!(rules[0].tags, infer_tags(QUESTION, FILE));
    }

    #[test]
    fn empty_output_yields_one_success_fallback_rule() {
        let trajectory = vec![tool_step(Observation::ok(json!({"rows": []})))];
        let model = FixedModel("I have no items to report.".to_string());
        let rules = extract_rules(&model, false, QUESTION, FILE, &trajectory, NOTE);
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].polarity, Polarity::Success);
        assert!(!rules[0].content.is_empty());
    }

    #[test]
    fn simulated_mode_skips_the_model_entirely() {
        let trajectory = vec![tool_step(Observation::ok(json!({})))];
        // A failing model proves the call is bypassed.
        let rules = extract_rules(&FailingModel, true, QUESTION, FILE, &trajectory, NOTE);
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].polarity, Polarity::Success);
        assert_eq!(rules[0].tags, infer_tags(QUESTION, FILE));
    }

    #[test]
    fn markdown_items_are_parsed_into_rules() {
        let text = "\
# Memory Item 1
## Title
Compare before answering
## Description
Comparisons need both values.
## Content
Extract both quantities first.
Then compare them explicitly.

# Memory Item 2
## Title
Inspect tool output
## Description
Do not answer blind.
## Content
Read the observation fully before concluding.
";
        let trajectory = vec![tool_step(Observation::ok(json!({"rows": [1, 2]})))];
        let model = FixedModel(text.to_string());
        let rules = extract_rules(&model, false, QUESTION, FILE, &trajectory, NOTE);

        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].title, "Compare before answering");
        assert_eq!(rules[0].description, "Comparisons need both values.");
        assert_eq!(
            rules[0].content,
            vec![
                "Extract both quantities first.".to_string(),
                "Then compare them explicitly.".to_string(),
            ]
        );
        assert_eq!(rules[1].title, "Inspect tool output");
        assert_eq!(rules[0].polarity, Polarity::Success);
    }

    #[test]
    fn error_observation_flips_polarity_to_failure() {
        let text = "\
# Memory Item 1
## Title
Handle tool errors
## Description
Errors deserve a retry with different input.
## Content
Check the error message before retrying.
";
        let trajectory = vec![tool_step(Observation::err(
            ErrorKind::Python,
            "Traceback: ZeroDivisionError",
        ))];
        let model = FixedModel(text.to_string());
        let rules = extract_rules(&model, false, QUESTION, FILE, &trajectory, NOTE);
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].polarity, Polarity::Failure);
    }

    #[test]
    fn missing_sections_get_default_texts() {
        let text = "# Memory Item 1\n## Title\nOnly a title\n";
        let trajectory = vec![tool_step(Observation::ok(json!({})))];
        let model = FixedModel(text.to_string());
        let rules = extract_rules(&model, false, QUESTION, FILE, &trajectory, NOTE);
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].title, "Only a title");
        assert!(!rules[0].description.is_empty());
        assert!(!rules[0].content.is_empty());
    }

    #[test]
    fn code_fences_around_items_are_tolerated() {
        let text = "```\n# Memory Item 1\n## Title\nFenced\n## Content\nStill parsed.\n```\n";
        let trajectory = vec![tool_step(Observation::ok(json!({})))];
        let model = FixedModel(text.to_string());
        let rules = extract_rules(&model, false, QUESTION, FILE, &trajectory, NOTE);
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].title, "Fenced");
    }
}
