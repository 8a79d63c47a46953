//! LLM integration module.
//!
//! Provides the [`TextGenerator`] seam, an OpenAI-compatible client,
//! retry handling, and the prompts used for structure extraction.

mod client;
mod generator;
mod prompts;
mod retry;

pub use client::{LlmClient, LlmResponse, Message, Role, TokenUsage};
pub use generator::{
    DisabledGenerator, FnGenerator, GenerationRequest, ResponseFormat, Task, TextGenerator,
};
pub use prompts::Prompts;
pub use retry::{Retrying, extract_json, is_yes, parse_json};
