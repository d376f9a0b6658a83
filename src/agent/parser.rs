//! Grammar for the model's raw output.
//!
//! A completion resolves to exactly one directive: a final answer (the
//! `Answer:` marker wins over everything else), a single recognized tool
//! call after an `Action:` marker, or `Unparseable`. The two call forms are
//! validated for argument arity; anything else is unparseable and terminal
//! for the run.

use crate::tools::Action;

/// What the model's raw text resolved to.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    FinalAnswer(String),
    ToolCall(Action),
    Unparseable,
}

/// Resolve raw model output into a directive.
pub fn parse_directive(raw: &str) -> Directive {
    if let Some((_, answer)) = raw.split_once("Answer:") {
        return Directive::FinalAnswer(answer.trim().to_string());
    }

    let Some(call_text) = action_text(raw) else {
        return Directive::Unparseable;
    };
    let Some((name, args)) = parse_call(call_text) else {
        return Directive::Unparseable;
    };

    match (name, args.as_slice()) {
        ("python_exec", [path]) => Directive::ToolCall(Action::PythonExec(path.clone())),
        ("xlsx_query", [path, query]) => Directive::ToolCall(Action::XlsxQuery {
            path: path.clone(),
            query: query.clone(),
        }),
        _ => Directive::Unparseable,
    }
}

/// Find the first `Action:` line and return the text after the marker.
fn action_text(raw: &str) -> Option<&str> {
    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.to_lowercase().starts_with("action:") {
            return trimmed.split_once(':').map(|(_, rest)| rest.trim());
        }
    }
    None
}

/// Split `name(args)` into the call name and its string arguments.
fn parse_call(text: &str) -> Option<(&str, Vec<String>)> {
    let open = text.find('(')?;
    let close = text.rfind(')')?;
    if close < open {
        return None;
    }
    let name = text[..open].trim();
    let args = parse_string_args(&text[open + 1..close])?;
    Some((name, args))
}

/// Parse a comma-separated list of single- or double-quoted string literals.
fn parse_string_args(raw: &str) -> Option<Vec<String>> {
    let mut args = Vec::new();
    let mut rest = raw.trim();
    while !rest.is_empty() {
        let quote = rest.chars().next()?;
        if quote != '"' && quote != '\'' {
            return None;
        }
        let body = &rest[1..];
        let end = body.find(quote)?;
        args.push(body[..end].to_string());
        rest = body[end + 1..].trim_start();
        if let Some(after_comma) = rest.strip_prefix(',') {
            rest = after_comma.trim_start();
            if rest.is_empty() {
                // Trailing comma with no following argument.
                return None;
            }
        } else if !rest.is_empty() {
            return None;
        }
    }
    Some(args)
}
