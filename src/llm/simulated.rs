//! Simulated model client (offline, no API needed).
//!
//! Scans the prompt for the task markers the prompt builder emits and replies
//! with a canned ReAct turn: a tool action on the first step, an answer once
//! an observation is present. Deterministic, which keeps end-to-end runs
//! reproducible without network access.

use super::{ModelClient, ModelError, ModelRequest};

const QUESTION_MARKER: &str = "Question: ";
const FILE_MARKER: &str = "Associated file path: ";
const OBSERVATION_MARKER: &str = "Observation:";

/// Offline client: derives a plausible ReAct turn from the prompt alone.
#[derive(Debug, Default)]
pub struct SimulatedClient;

impl ModelClient for SimulatedClient {
    fn complete(&self, request: &ModelRequest) -> Result<String, ModelError> {
        let mut question: Option<&str> = None;
        let mut file_path: Option<&str> = None;
        let mut has_observation = false;

        for line in request.prompt.lines() {
            if let Some(rest) = line.strip_prefix(QUESTION_MARKER) {
                question = Some(rest.trim());
            } else if let Some(rest) = line.strip_prefix(FILE_MARKER) {
                file_path = Some(rest.trim());
            } else if line.trim_start().starts_with(OBSERVATION_MARKER) {
                has_observation = true;
            }
        }

        if has_observation {
            let question = question.unwrap_or("the question");
            return Ok(format!(
                "Thought: I have seen the tool result.\nAnswer: simulated answer for {question}."
            ));
        }

        let Some(path) = file_path else {
            return Ok(
                "Thought: simulated mode but no file path found.\nAnswer: simulated answer."
                    .to_string(),
            );
        };

        if path.ends_with(".py") {
            Ok(format!(
                "Thought: I should run the script to get the numeric result.\nAction: python_exec(\"{path}\")"
            ))
        } else if path.ends_with(".xlsx") {
            let query = question.unwrap_or("Query over the spreadsheet.");
            Ok(format!(
                "Thought: I should query the spreadsheet using the question.\nAction: xlsx_query(\"{path}\", \"{query}\")"
            ))
        } else {
            Ok(
                "Thought: unsupported file type in simulated mode.\nAnswer: simulated answer."
                    .to_string(),
            )
        }
    }
}
