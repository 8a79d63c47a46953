//! Bounded retries and JSON extraction around a [`TextGenerator`].

use crate::config::IndexConfig;
use crate::error::{PageIndexError, Result};
use crate::llm::generator::{GenerationRequest, TextGenerator};
use regex::Regex;
use serde::de::DeserializeOwned;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, warn};

static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*([\]}])").expect("valid trailing comma regex"));

static BARE_NONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bNone\b").expect("valid None regex"));

/// Wraps a generator with retry-on-transient-failure semantics.
pub struct Retrying<G> {
    inner: G,
    max_attempts: usize,
    backoff: Duration,
}

impl<G: TextGenerator> Retrying<G> {
    pub fn new(inner: G, max_attempts: usize, backoff: Duration) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Use the retry settings from the pipeline config.
    pub fn from_config(inner: G, config: &IndexConfig) -> Self {
        Self::new(
            inner,
            config.max_retries,
            Duration::from_millis(config.retry_backoff_ms),
        )
    }

    pub fn inner(&self) -> &G {
        &self.inner
    }

    /// False when the wrapped generator refuses every request.
    pub fn is_available(&self) -> bool {
        self.inner.is_available()
    }

    /// Free-text completion.
    pub async fn text(&self, request: &GenerationRequest) -> Result<String> {
        self.attempt(request, |response| {
            let trimmed = response.trim();
            if trimmed.is_empty() {
                Err(PageIndexError::MalformedResponse("empty response".to_string()))
            } else {
                Ok(trimmed.to_string())
            }
        })
        .await
    }

    /// Completion parsed as JSON into `T`; unparseable answers are retried.
    pub async fn json<T: DeserializeOwned>(&self, request: &GenerationRequest) -> Result<T> {
        self.attempt(request, parse_json).await
    }

    async fn attempt<T>(
        &self,
        request: &GenerationRequest,
        parse: impl Fn(&str) -> Result<T>,
    ) -> Result<T> {
        let mut attempt = 1;
        loop {
            let result = self
                .inner
                .generate(request)
                .await
                .and_then(|response| parse(&response));

            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = self
                        .backoff
                        .saturating_mul(2u32.saturating_pow(attempt as u32 - 1));
                    warn!(
                        task = request.task.as_str(),
                        attempt,
                        error = %e,
                        "retrying LLM request in {:?}",
                        delay
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
                Err(e) => {
                    debug!(task = request.task.as_str(), attempt, error = %e, "LLM request failed");
                    return Err(e);
                }
            }
        }
    }
}

/// Parse a model answer as JSON, tolerating code fences and prose around it.
pub fn parse_json<T: DeserializeOwned>(response: &str) -> Result<T> {
    let json_str = extract_json(response);
    if let Ok(value) = serde_json::from_str(&json_str) {
        return Ok(value);
    }

    // Python-flavoured answers: `None` and trailing commas
    let cleaned = BARE_NONE.replace_all(&json_str, "null");
    let cleaned = TRAILING_COMMA.replace_all(&cleaned, "$1");
    serde_json::from_str(&cleaned).map_err(|e| {
        PageIndexError::MalformedResponse(format!(
            "{}: {}",
            e,
            &response[..floor_boundary(response, 200)]
        ))
    })
}

fn floor_boundary(text: &str, max: usize) -> usize {
    let mut end = text.len().min(max);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    end
}

/// Extract JSON from potentially markdown-wrapped response.
pub fn extract_json(response: &str) -> String {
    let response = response.trim();

    // Check for ```json code block
    if let Some(rest) = response.strip_prefix("```json") {
        if let Some(end) = rest.rfind("```") {
            return rest[..end].trim().to_string();
        }
    }

    // Check for ``` code block
    if response.starts_with("```") {
        if let Some(end) = response.rfind("```") {
            let start = response.find('\n').map(|n| n + 1).unwrap_or(3);
            if end > start {
                return response[start..end].trim().to_string();
            }
        }
    }

    // Find the outermost JSON array or object, whichever opens first
    let array = response.find('[').zip(response.rfind(']'));
    let object = response.find('{').zip(response.rfind('}'));
    let span = match (array, object) {
        (Some(a), Some(o)) => Some(if a.0 < o.0 { a } else { o }),
        (a, o) => a.or(o),
    };
    if let Some((start, end)) = span {
        if end > start {
            return response[start..=end].to_string();
        }
    }

    response.to_string()
}

/// Interpret a yes/no answer field.
pub fn is_yes(answer: &str) -> bool {
    answer.trim().eq_ignore_ascii_case("yes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::generator::{FnGenerator, Task};
    use serde::Deserialize;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Deserialize)]
    struct Answer {
        answer: String,
    }

    #[test]
    fn test_extract_json_plain() {
        let response = r#"[{"title": "Test"}]"#;
        assert_eq!(extract_json(response), r#"[{"title": "Test"}]"#);
    }

    #[test]
    fn test_extract_json_markdown() {
        let response = "```json\n[{\"title\": \"Test\"}]\n```";
        assert_eq!(extract_json(response), r#"[{"title": "Test"}]"#);
    }

    #[test]
    fn test_extract_json_with_text() {
        let response = "Here's the structure:\n[{\"title\": \"Test\"}]\nThat's the result.";
        assert_eq!(extract_json(response), r#"[{"title": "Test"}]"#);
    }

    #[test]
    fn test_extract_json_object_containing_array() {
        let response = r#"Sure: {"table_of_contents": [{"title": "A"}]}"#;
        assert_eq!(
            extract_json(response),
            r#"{"table_of_contents": [{"title": "A"}]}"#
        );
    }

    #[test]
    fn test_parse_json_python_flavoured() {
        let response = r#"{"structure": None, "title": "Intro", "page": 3,}"#;
        let value: serde_json::Value = parse_json(response).unwrap();
        assert!(value["structure"].is_null());
        assert_eq!(value["page"], 3);
    }

    #[test]
    fn test_parse_json_failure_is_malformed() {
        let err = parse_json::<Answer>("I cannot answer that").unwrap_err();
        assert!(matches!(err, PageIndexError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_retries_malformed_then_succeeds() {
        let calls = AtomicUsize::new(0);
        let generator = FnGenerator(|_: &GenerationRequest| {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Ok("not json".to_string())
            } else {
                Ok(r#"{"answer": "yes"}"#.to_string())
            }
        });
        let retrying = Retrying::new(generator, 3, Duration::ZERO);
        let answer: Answer = retrying
            .json(&GenerationRequest::new(Task::TocDetection, "p"))
            .await
            .unwrap();
        assert!(is_yes(&answer.answer));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicUsize::new(0);
        let generator = FnGenerator(|_: &GenerationRequest| {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(PageIndexError::RateLimited("slow down".to_string()))
        });
        let retrying = Retrying::new(generator, 3, Duration::ZERO);
        let err = retrying
            .text(&GenerationRequest::new(Task::Summary, "p"))
            .await
            .unwrap_err();
        assert!(matches!(err, PageIndexError::RateLimited(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let calls = AtomicUsize::new(0);
        let generator = FnGenerator(|_: &GenerationRequest| {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(PageIndexError::LlmApi("401".to_string()))
        });
        let retrying = Retrying::new(generator, 5, Duration::ZERO);
        assert!(
            retrying
                .text(&GenerationRequest::new(Task::Summary, "p"))
                .await
                .is_err()
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_blank_text_counts_as_malformed() {
        let generator = FnGenerator(|_: &GenerationRequest| Ok("   \n".to_string()));
        let retrying = Retrying::new(generator, 2, Duration::ZERO);
        let err = tokio_test::block_on(retrying.text(&GenerationRequest::new(Task::Description, "p")))
            .unwrap_err();
        assert!(matches!(err, PageIndexError::MalformedResponse(_)));
    }
}
