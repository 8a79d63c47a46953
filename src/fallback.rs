//! Structure inference when a document has no usable table of contents.
//!
//! Pages are shown to the generator a window at a time, tagged with their
//! physical index. The first window uses the init prompt; later windows get
//! the headings found so far and are asked to continue them.

use crate::builder::{build_tree, normalize_levels};
use crate::config::IndexConfig;
use crate::document::Document;
use crate::error::Result;
use crate::llm::{GenerationRequest, Prompts, Retrying, Task, TextGenerator};
use crate::toc::matching::normalize;
use crate::toc::{TocEntry, physical_index};
use crate::tree::TreeNode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// One heading as the generator reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct InferredHeading {
    #[serde(default)]
    structure: Option<String>,
    title: String,
    #[serde(default, alias = "page")]
    physical_index: Option<serde_json::Value>,
}

impl InferredHeading {
    fn level(&self) -> usize {
        self.structure
            .as_deref()
            .map(|s| s.split('.').filter(|p| !p.trim().is_empty()).count())
            .filter(|&depth| depth > 0)
            .unwrap_or(1)
    }
}

async fn infer_window<G: TextGenerator>(
    document: &Document,
    window: (usize, usize),
    previous: &[InferredHeading],
    llm: &Retrying<G>,
) -> Result<Vec<InferredHeading>> {
    let content = document.content_range(window.0, window.1);
    let prompt = if previous.is_empty() {
        Prompts::generate_toc_init().replace("{content}", &content)
    } else {
        let previous = serde_json::to_string_pretty(previous)
            .map_err(|e| crate::error::PageIndexError::Serialization(e.to_string()))?;
        Prompts::generate_toc_continue()
            .replace("{content}", &content)
            .replace("{previous}", &previous)
    };
    llm.json(&GenerationRequest::new(Task::HeadingInference, prompt))
        .await
}

/// Ask the generator for the headings inside pages `[start, end]`.
///
/// Returns located entries with normalized levels, in page order. Windows
/// the generator fails on are skipped.
pub async fn infer_entries<G: TextGenerator>(
    document: &Document,
    start: usize,
    end: usize,
    config: &IndexConfig,
    llm: &Retrying<G>,
) -> Vec<TocEntry> {
    if !llm.is_available() || start > end {
        return Vec::new();
    }
    let window_pages = config.fallback_window_pages.max(1);

    let mut found: Vec<InferredHeading> = Vec::new();
    let mut entries: Vec<TocEntry> = Vec::new();
    let mut window_start = start;
    while window_start <= end {
        let window_end = (window_start + window_pages - 1).min(end);
        match infer_window(document, (window_start, window_end), &found, llm).await {
            Ok(headings) => {
                debug!(window_start, window_end, headings = headings.len(), "headings inferred");
                for heading in headings {
                    let title = heading.title.trim();
                    if title.is_empty() {
                        continue;
                    }
                    let Some(reported) = heading.physical_index.as_ref().and_then(physical_index)
                    else {
                        continue;
                    };
                    let page = reported.clamp(window_start, window_end);
                    let floor = entries.last().and_then(|e| e.resolved_physical_page);
                    // repeats from the continue prompt, and headings going backwards
                    let repeated = entries.iter().any(|e| {
                        normalize(&e.title) == normalize(title)
                            && (e.resolved_physical_page == Some(reported)
                                || e.resolved_physical_page == Some(page))
                    });
                    if repeated || floor.is_some_and(|f| page < f) {
                        continue;
                    }
                    entries.push(TocEntry::located(title, heading.level(), page));
                    found.push(heading);
                }
            }
            Err(e) => warn!(window_start, window_end, error = %e, "heading inference failed for window"),
        }
        window_start = window_end + 1;
    }

    normalize_levels(&mut entries);
    entries
}

/// Build top-level nodes for a document without a usable TOC.
///
/// When no headings can be inferred, one node named after the document
/// covers every page.
pub async fn structure_without_toc<G: TextGenerator>(
    document: &Document,
    config: &IndexConfig,
    llm: &Retrying<G>,
) -> Vec<TreeNode> {
    let last_page = document.last_page();
    let entries = infer_entries(document, 0, last_page, config, llm).await;
    info!(headings = entries.len(), "structure inferred without TOC");

    if !entries.is_empty() {
        match build_tree(entries, last_page) {
            Ok(nodes) => return nodes,
            Err(e) => warn!(error = %e, "inferred headings did not form a tree"),
        }
    }
    vec![TreeNode::new(document.name.clone(), 1, 0, last_page)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{DisabledGenerator, FnGenerator};
    use crate::tokenizer::HeuristicTokenizer;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn doc(page_count: usize) -> Document {
        let pages = (0..page_count).map(|i| format!("page {} text", i)).collect();
        Document::from_page_texts("report", pages, &HeuristicTokenizer::default()).unwrap()
    }

    fn config(window: usize) -> IndexConfig {
        IndexConfig {
            fallback_window_pages: window,
            ..IndexConfig::default()
        }
    }

    #[tokio::test]
    async fn test_windows_use_init_then_continue() {
        let calls = AtomicUsize::new(0);
        let generator = FnGenerator(|req: &GenerationRequest| {
            assert_eq!(req.task, Task::HeadingInference);
            match calls.fetch_add(1, Ordering::SeqCst) {
                0 => {
                    assert!(req.prompt.contains("<physical_index_0>"));
                    assert!(!req.prompt.contains("Previous tree structure"));
                    Ok(r#"[{"structure": "1", "title": "Overview", "physical_index": "<physical_index_0>"},
                           {"structure": "1.1", "title": "Scope", "physical_index": "<physical_index_2>"}]"#
                        .to_string())
                }
                _ => {
                    assert!(req.prompt.contains("<physical_index_4>"));
                    assert!(req.prompt.contains("Overview"));
                    // repeats one known heading and adds a new one
                    Ok(r#"[{"structure": "1.1", "title": "Scope", "physical_index": "<physical_index_2>"},
                           {"structure": "2", "title": "Findings", "physical_index": 5}]"#
                        .to_string())
                }
            }
        });
        let llm = Retrying::new(generator, 1, Duration::ZERO);
        let entries = infer_entries(&doc(7), 0, 6, &config(4), &llm).await;
        let got: Vec<(&str, usize, Option<usize>)> = entries
            .iter()
            .map(|e| (e.title.as_str(), e.level, e.resolved_physical_page))
            .collect();
        assert_eq!(
            got,
            vec![("Overview", 1, Some(0)), ("Scope", 2, Some(2)), ("Findings", 1, Some(5))]
        );
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_pages_are_clamped_into_the_window() {
        let generator = FnGenerator(|_: &GenerationRequest| {
            Ok(r#"[{"structure": "2.1", "title": "Somewhere", "physical_index": 40}]"#.to_string())
        });
        let llm = Retrying::new(generator, 1, Duration::ZERO);
        let entries = infer_entries(&doc(5), 0, 4, &config(5), &llm).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].resolved_physical_page, Some(4));
        assert_eq!(entries[0].level, 1);
        assert!(entries[0].verified);
    }

    #[tokio::test]
    async fn test_no_headings_gives_single_node() {
        let llm = Retrying::new(DisabledGenerator, 1, Duration::ZERO);
        let nodes = structure_without_toc(&doc(6), &IndexConfig::default(), &llm).await;
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].title, "report");
        assert_eq!((nodes[0].start_page, nodes[0].end_page), (0, 5));
    }

    #[tokio::test]
    async fn test_failed_windows_are_skipped() {
        let calls = AtomicUsize::new(0);
        let generator = FnGenerator(|_: &GenerationRequest| {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok("nothing useful".to_string())
            } else {
                Ok(r#"[{"structure": "1", "title": "Late Start", "physical_index": "<physical_index_3>"}]"#.to_string())
            }
        });
        let llm = Retrying::new(generator, 1, Duration::ZERO);
        let nodes = structure_without_toc(&doc(6), &config(3), &llm).await;
        let ranges: Vec<_> = nodes.iter().map(|n| (n.title.as_str(), n.start_page, n.end_page)).collect();
        assert_eq!(ranges, vec![("Preface", 0, 2), ("Late Start", 3, 5)]);
    }
}
