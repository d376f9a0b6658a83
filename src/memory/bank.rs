//! Persistent rule store ("reasoning bank") with tag-ranked retrieval.
//!
//! The bank is one JSON file holding every rule ever accepted. Rules are
//! append-only within this design: ids are sequential, nothing is deleted or
//! merged, and every `add_rule` rewrites the whole file under an advisory
//! lock. A missing or malformed file starts an empty bank instead of failing
//! the process.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BankError {
    #[error("rule is missing required field: {0}")]
    MissingField(&'static str),

    #[error("failed to persist bank: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize bank: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Whether a rule was distilled from a successful or a failed trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    Success,
    Failure,
}

/// A reusable heuristic distilled from a past trajectory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: u64,
    pub title: String,
    pub description: String,
    pub content: Vec<String>,
    pub tags: Vec<String>,
    pub polarity: Polarity,
    pub evidence: String,
}

/// A rule before the bank has assigned it an id.
#[derive(Debug, Clone)]
pub struct RuleDraft {
    pub title: String,
    pub description: String,
    pub content: Vec<String>,
    pub tags: Vec<String>,
    pub polarity: Polarity,
    pub evidence: String,
}

/// The rule store backing one or more runs.
pub struct ReasoningBank {
    rules: Vec<Rule>,
    path: PathBuf,
}

impl ReasoningBank {
    /// Open a bank at `path`, loading existing rules when the file is
    /// readable. Missing or malformed files start an empty bank.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let rules = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<Vec<Rule>>(&contents) {
                Ok(rules) => {
                    tracing::info!("Loaded {} rules from {}", rules.len(), path.display());
                    rules
                }
                Err(e) => {
                    tracing::warn!(
                        "Malformed bank file {}: {}, starting empty",
                        path.display(),
                        e
                    );
                    Vec::new()
                }
            },
            Err(_) => {
                tracing::info!("No bank file at {}, starting empty", path.display());
                Vec::new()
            }
        };
        Self { rules, path }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Rank every stored rule by the size of its tag intersection with
    /// `tags` (descending), ties broken by insertion order, and return the
    /// top `max_rules`. Ranking, not filtering: zero-overlap rules may
    /// appear when fewer than `max_rules` rules overlap at all.
    pub fn retrieve_rules(&self, tags: &[String], max_rules: usize) -> Vec<Rule> {
        let mut ranked: Vec<(usize, &Rule)> = self
            .rules
            .iter()
            .map(|rule| (tag_overlap(&rule.tags, tags), rule))
            .collect();
        // Stable sort keeps insertion order for equal overlap counts.
        ranked.sort_by(|a, b| b.0.cmp(&a.0));
        ranked
            .into_iter()
            .take(max_rules)
            .map(|(_, rule)| rule.clone())
            .collect()
    }

    /// Validate the draft, assign the next sequential id, append, and flush
    /// the full collection to disk before returning.
    pub fn add_rule(&mut self, draft: RuleDraft) -> Result<u64, BankError> {
        if draft.title.trim().is_empty() {
            return Err(BankError::MissingField("title"));
        }
        if draft.content.is_empty() {
            return Err(BankError::MissingField("content"));
        }

        let id = self.rules.last().map_or(1, |rule| rule.id + 1);
        self.rules.push(Rule {
            id,
            title: draft.title,
            description: draft.description,
            content: draft.content,
            tags: draft.tags,
            polarity: draft.polarity,
            evidence: draft.evidence,
        });
        self.flush()?;
        Ok(id)
    }

    /// Rewrite the backing file with the full rule collection, holding an
    /// advisory lock for the duration of the write. The lock covers the
    /// rewrite itself; concurrent read-modify-write cycles across processes
    /// can still lose updates.
    fn flush(&self) -> Result<(), BankError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let contents = serde_json::to_string_pretty(&self.rules)?;

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)?;
        fs2::FileExt::lock_exclusive(&file)?;
        let written = file.write_all(contents.as_bytes()).and_then(|_| file.flush());
        let _ = fs2::FileExt::unlock(&file);
        written?;
        Ok(())
    }
}

fn tag_overlap(rule_tags: &[String], query_tags: &[String]) -> usize {
    query_tags
        .iter()
        .filter(|tag| rule_tags.contains(tag))
        .count()
}
