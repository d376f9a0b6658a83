//! Agent module - the core decision loop.
//!
//! The agent follows a ReAct pattern with memory:
//! 1. Retrieve rules matching the task's tags and build the prompt
//! 2. Call the model, parse its output into an answer or one tool action
//! 3. Execute the action and log the observation
//! 4. Reflect on errors or uncertainty, distilling new rules into the bank
//! 5. Repeat until answered, unparseable, or out of steps

mod agent_loop;
mod parser;
mod prompt;

pub use agent_loop::Agent;
pub use parser::{parse_directive, Directive};
pub use prompt::{build_react_prompt, REACT_SYSTEM_PROMPT};
