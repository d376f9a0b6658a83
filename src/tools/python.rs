//! Script execution tool.

use std::process::Command;

use serde_json::json;

use super::{ErrorKind, Observation};

/// Run a Python script with the system interpreter and capture its output.
///
/// A non-zero exit status is an error-shaped observation carrying stderr;
/// failure to spawn the interpreter is an io error. Neither raises.
pub fn python_exec(path: &str) -> Observation {
    let output = match Command::new("python3").arg(path).output() {
        Ok(output) => output,
        Err(e) => {
            return Observation::err(ErrorKind::Io, format!("failed to spawn python3: {e}"));
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).trim_end().to_string();

    if !output.status.success() {
        let message = if stderr.is_empty() {
            format!("python exited with {}", output.status)
        } else {
            stderr
        };
        return Observation::err(ErrorKind::Python, message);
    }

    Observation::ok(json!({
        "stdout": stdout,
        "stderr": stderr,
        "returncode": output.status.code().unwrap_or(0),
    }))
}
