//! Run trajectories: ordered steps, terminal run records, and the run-log
//! writer.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::tools::{Action, Observation};

/// One logged step of a run. Reflection pseudo-steps carry neither action
/// nor observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub step: u32,
    pub thought: String,
    pub action: Option<Action>,
    pub observation: Option<Observation>,
    pub retrieved_rules: Vec<u64>,
}

/// Terminal classification of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Judgment {
    Answered,
    Failed,
}

impl fmt::Display for Judgment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Judgment::Answered => write!(f, "answered"),
            Judgment::Failed => write!(f, "failed"),
        }
    }
}

/// Everything one run produced, persisted exactly once at termination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub task_id: u64,
    pub mode: String,
    pub run_id: u32,
    pub question: String,
    pub file_name: String,
    pub final_answer: Option<String>,
    pub judgment: Judgment,
    pub trajectory: Vec<Step>,
    pub created_at: String,
    pub finished_at: String,
}

/// Render a trajectory as step-ordered text blocks for prompts.
pub fn render_trajectory(steps: &[Step]) -> String {
    let mut lines = Vec::new();
    for step in steps {
        lines.push(format!("Step {}", step.step));
        lines.push(format!("Thought: {}", step.thought));
        if let Some(action) = &step.action {
            lines.push(format!("Action: {}", action.render()));
        }
        if let Some(observation) = &step.observation {
            lines.push(format!("Observation: {}", observation.render()));
        }
        lines.push(String::new());
    }
    lines.join("\n")
}

/// Write the run record to `<runs_dir>/<task_id>/<mode>_<run_id>.json`.
pub fn write_run_record(runs_dir: &Path, record: &RunRecord) -> std::io::Result<PathBuf> {
    let dir = runs_dir.join(record.task_id.to_string());
    fs::create_dir_all(&dir)?;
    let path = dir.join(format!("{}_{}.json", record.mode, record.run_id));
    let contents = serde_json::to_string_pretty(record)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    fs::write(&path, contents)?;
    tracing::debug!("Wrote run record to {}", path.display());
    Ok(path)
}
