//! Memory subsystem: the persistent reasoning bank, tag inference, and
//! reflection-triggered rule extraction.

mod bank;
mod extract;
mod tags;

pub use bank::{BankError, Polarity, ReasoningBank, Rule, RuleDraft};
pub use extract::extract_rules;
pub use tags::infer_tags;
