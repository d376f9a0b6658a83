//! Model client abstraction.
//!
//! Both backends (live OpenAI-compatible / simulated) implement `ModelClient`.
//! The backend is chosen once when the agent is constructed; the loop itself
//! never branches on the mode.

mod openai;
mod simulated;

pub use openai::OpenAiClient;
pub use simulated::SimulatedClient;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model request failed: {0}")]
    Transport(String),

    #[error("model API returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("model response contained no content")]
    EmptyResponse,
}

/// One completion request: a system role, the user prompt, and sampling
/// temperature.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub system: String,
    pub prompt: String,
    pub temperature: f32,
}

impl ModelRequest {
    pub fn new(system: impl Into<String>, prompt: impl Into<String>, temperature: f32) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
            temperature,
        }
    }
}

/// Blocking model client. Each call returns the raw completion text.
pub trait ModelClient {
    fn complete(&self, request: &ModelRequest) -> Result<String, ModelError>;
}
