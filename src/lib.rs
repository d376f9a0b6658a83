//! # ReasonBank
//!
//! A self-improving tool-using task solver.
//!
//! This library provides:
//! - A ReAct-style agent loop that answers data questions with tools
//! - A persistent "reasoning bank" of rules distilled from past runs
//! - Reflection-triggered rule extraction with deterministic fallbacks
//!
//! ## Architecture
//!
//! The agent follows a "tools in a loop" pattern, enhanced with memory:
//! 1. Infer topical tags for the task and retrieve matching rules
//! 2. Build a prompt with the question, trajectory so far, and rules
//! 3. Call the model, parse its output into an answer or a tool action
//! 4. Execute the action, log the observation, and reflect on errors
//! 5. Reflections distill new rules into the bank for future runs
//!
//! ## Example
//!
//! ```rust,ignore
//! use reasonbank::{agent::Agent, config::AgentConfig};
//!
//! let config = AgentConfig::new("gpt-4o-mini", true, "memory/bank.json");
//! let mut agent = Agent::new(config)?;
//! let record = agent.run_single(1, "Which city had more sales?", "sales.xlsx", 0)?;
//! println!("{:?}", record.judgment);
//! ```

pub mod agent;
pub mod config;
pub mod llm;
pub mod memory;
pub mod tools;
pub mod trajectory;

pub use config::AgentConfig;
