//! Tool invocation: typed actions, tagged observations, and the system
//! executor.
//!
//! Tool failures are data, not exceptions: `invoke` always returns an
//! `Observation`, and error-shaped observations feed the reflection
//! predicate downstream.

mod python;
mod xlsx;

pub use python::python_exec;
pub use xlsx::xlsx_query;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The two tool calls the model is allowed to request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tool", content = "input", rename_all = "snake_case")]
pub enum Action {
    PythonExec(String),
    XlsxQuery { path: String, query: String },
}

impl Action {
    /// Render in the wire form the model is asked to produce.
    pub fn render(&self) -> String {
        match self {
            Action::PythonExec(path) => format!("python_exec(\"{path}\")"),
            Action::XlsxQuery { path, query } => format!("xlsx_query(\"{path}\", \"{query}\")"),
        }
    }
}

/// Discriminant carried by error-shaped observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Io,
    Python,
    Xlsx,
    Parse,
    Model,
}

/// Result of one tool call (or of a failed model/parse step).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Observation {
    Ok { value: Value },
    #[serde(rename = "error")]
    Err { kind: ErrorKind, message: String },
}

impl Observation {
    pub fn ok(value: Value) -> Self {
        Observation::Ok { value }
    }

    pub fn err(kind: ErrorKind, message: impl Into<String>) -> Self {
        Observation::Err {
            kind,
            message: message.into(),
        }
    }

    pub fn is_err(&self) -> bool {
        matches!(self, Observation::Err { .. })
    }

    /// Textual rendering used in prompts and for polarity inference.
    pub fn render(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Dispatches parsed actions to concrete tools.
pub trait ToolInvoker {
    fn invoke(&self, action: &Action) -> Observation;
}

/// Executes tool actions against the local system.
#[derive(Debug, Default)]
pub struct SystemTools;

impl ToolInvoker for SystemTools {
    fn invoke(&self, action: &Action) -> Observation {
        tracing::debug!(action = %action.render(), "invoking tool");
        match action {
            Action::PythonExec(path) => python_exec(path),
            Action::XlsxQuery { path, query } => xlsx_query(path, query),
        }
    }
}
