//! The text-generation seam.
//!
//! Every stage that needs a language model talks to a [`TextGenerator`].
//! The HTTP client implements it, and so do the closure and "disabled"
//! generators used for deterministic and offline runs.

use crate::error::{PageIndexError, Result};
use crate::llm::Prompts;
use std::future::Future;

/// What a generation request is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Task {
    /// Does this page contain a table of contents?
    TocDetection,
    /// Turn raw TOC text into structured entries.
    TocTransform,
    /// Find the start page of one section within a page window.
    TocIndexFix,
    /// Infer headings straight from page text.
    HeadingInference,
    /// Summarize one node.
    Summary,
    /// Describe the whole document.
    Description,
}

impl Task {
    /// Shape of the answer the task expects.
    pub fn format(&self) -> ResponseFormat {
        match self {
            Task::Summary | Task::Description => ResponseFormat::Text,
            _ => ResponseFormat::Json,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Task::TocDetection => "toc_detection",
            Task::TocTransform => "toc_transform",
            Task::TocIndexFix => "toc_index_fix",
            Task::HeadingInference => "heading_inference",
            Task::Summary => "summary",
            Task::Description => "description",
        }
    }
}

/// Whether the generator should answer with JSON or free text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Json,
    Text,
}

/// A single prompt sent to the generator.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub task: Task,
    pub system: Option<String>,
    pub prompt: String,
    /// Model override; `None` uses the generator's configured model.
    pub model: Option<String>,
    pub format: ResponseFormat,
}

impl GenerationRequest {
    /// A request using the document-analyzer system prompt and the
    /// task's answer format.
    pub fn new(task: Task, prompt: impl Into<String>) -> Self {
        Self {
            task,
            system: Some(Prompts::system_document_analyzer().to_string()),
            prompt: prompt.into(),
            model: None,
            format: task.format(),
        }
    }

    /// Send the request to a specific model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Replace the system prompt.
    pub fn with_system(mut self, system: Option<String>) -> Self {
        self.system = system;
        self
    }
}

/// A black-box text generator.
pub trait TextGenerator: Send + Sync {
    /// Produce a completion for `request`.
    fn generate(&self, request: &GenerationRequest) -> impl Future<Output = Result<String>> + Send;

    /// Whether calling [`generate`](Self::generate) can succeed at all.
    fn is_available(&self) -> bool {
        true
    }
}

/// Generator backed by a plain function, handy for deterministic stubs.
pub struct FnGenerator<F>(pub F);

impl<F> TextGenerator for FnGenerator<F>
where
    F: Fn(&GenerationRequest) -> Result<String> + Send + Sync,
{
    fn generate(&self, request: &GenerationRequest) -> impl Future<Output = Result<String>> + Send {
        std::future::ready((self.0)(request))
    }
}

/// Generator that refuses every request, for heuristic-only runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledGenerator;

impl TextGenerator for DisabledGenerator {
    fn generate(&self, request: &GenerationRequest) -> impl Future<Output = Result<String>> + Send {
        std::future::ready(Err(PageIndexError::LlmApi(format!(
            "text generation disabled ({})",
            request.task.as_str()
        ))))
    }

    fn is_available(&self) -> bool {
        false
    }
}
