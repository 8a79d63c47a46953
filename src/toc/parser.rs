//! Parsing TOC text into leveled entries.
//!
//! Line patterns handle the common layouts (title, optional dot leader,
//! trailing page number). When the result looks unreliable the text is
//! handed to the generator for structured extraction instead.

use crate::error::{PageIndexError, Result};
use crate::llm::{GenerationRequest, Prompts, Retrying, Task, TextGenerator};
use crate::toc::{PageLabel, TocEntry};
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

/// Title followed by an arabic page number after whitespace or a leader.
static ARABIC_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<title>.*?[^\s.…_])(?:\s*(?:\.{2,}|(?:\.\s){2,}\.?|…+|_{3,})\s*|\s+)(?P<page>\d{1,4})$")
        .expect("valid arabic entry regex")
});

/// Title followed by a roman page number; needs a leader or a wide gap so
/// "Appendix C" is not read as page 100.
static ROMAN_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?P<title>.*?[^\s.…_])(?:\s*(?:\.{2,}|(?:\.\s){2,}\.?|…+|_{3,})\s*|\s{2,})(?P<page>[ivxlcdm]{1,7})$")
        .expect("valid roman entry regex")
});

/// Leading section number such as "2", "2.3" or "2.3.1.".
static NUMBERING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<num>\d+(?:\.\d+)*)\.?\s+\S").expect("valid numbering regex")
});

static CONTENTS_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:table\s+of\s+)?contents\s*$").expect("valid contents heading regex")
});

/// Below this share of labelled lines the heuristic parse is distrusted.
pub const MIN_CONFIDENCE: f64 = 0.6;

/// Result of the line-pattern parse.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedToc {
    pub entries: Vec<TocEntry>,
    /// Share of content lines that carried a page label.
    pub confidence: f64,
    /// Whether levels ever jump by more than one.
    pub has_level_jumps: bool,
}

impl ParsedToc {
    pub fn is_confident(&self) -> bool {
        self.entries.len() >= 2 && self.confidence >= MIN_CONFIDENCE && !self.has_level_jumps
    }
}

struct RawLine {
    indent: usize,
    depth: Option<usize>,
    title: String,
    label: Option<PageLabel>,
}

fn indent_width(line: &str) -> usize {
    line.chars()
        .take_while(|c| c.is_whitespace())
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum()
}

fn split_label(line: &str) -> Option<(String, PageLabel)> {
    let caps = ARABIC_ENTRY
        .captures(line)
        .or_else(|| ROMAN_ENTRY.captures(line))?;
    let title = caps["title"].trim().to_string();
    let label = PageLabel::parse(&caps["page"])?;
    // a bare number line ("12") has no title
    title
        .chars()
        .any(char::is_alphabetic)
        .then_some((title, label))
}

/// Parse TOC text with line patterns.
pub fn parse_heuristic(text: &str) -> ParsedToc {
    let mut raw: Vec<RawLine> = Vec::new();
    let mut pending: Option<(usize, String)> = None;
    let mut content_lines = 0;
    let mut labelled = 0;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || CONTENTS_HEADING.is_match(trimmed) {
            continue;
        }
        content_lines += 1;

        match split_label(trimmed) {
            Some((title, label)) => {
                labelled += 1;
                let (indent, title) = match pending.take() {
                    Some((indent, head)) => (indent, format!("{} {}", head, title)),
                    None => (indent_width(line), title),
                };
                let depth = NUMBERING
                    .captures(&title)
                    .map(|c| c["num"].split('.').count());
                raw.push(RawLine {
                    indent,
                    depth,
                    title,
                    label: Some(label),
                });
            }
            None => {
                // wrapped title; carried onto the next labelled line
                pending = Some(match pending.take() {
                    Some((indent, head)) => (indent, format!("{} {}", head, trimmed)),
                    None => (indent_width(line), trimmed.to_string()),
                });
            }
        }
    }

    if let Some((indent, title)) = pending {
        if title.chars().any(char::is_alphabetic) {
            let depth = NUMBERING.captures(&title).map(|c| c["num"].split('.').count());
            raw.push(RawLine {
                indent,
                depth,
                title,
                label: None,
            });
        }
    }

    // indentation rank among unnumbered lines
    let indents: BTreeSet<usize> = raw
        .iter()
        .filter(|r| r.depth.is_none())
        .map(|r| r.indent)
        .collect();
    let indents: Vec<usize> = indents.into_iter().collect();

    let entries: Vec<TocEntry> = raw
        .into_iter()
        .map(|r| {
            let level = r.depth.unwrap_or_else(|| {
                indents.iter().position(|&i| i == r.indent).unwrap_or(0) + 1
            });
            TocEntry::new(r.title, level, r.label)
        })
        .collect();

    let has_level_jumps = entries.first().is_some_and(|e| e.level > 1)
        || entries.windows(2).any(|w| w[1].level > w[0].level + 1);

    ParsedToc {
        confidence: if content_lines == 0 {
            0.0
        } else {
            labelled as f64 / content_lines as f64
        },
        has_level_jumps,
        entries,
    }
}

#[derive(Debug, Deserialize)]
struct TransformedToc {
    table_of_contents: Vec<TransformedItem>,
}

#[derive(Debug, Deserialize)]
struct TransformedItem {
    #[serde(default)]
    structure: Option<String>,
    title: String,
    #[serde(default, alias = "physical_index")]
    page: Option<serde_json::Value>,
}

impl TransformedItem {
    fn label(&self) -> Option<PageLabel> {
        match &self.page {
            Some(serde_json::Value::Number(n)) => n.as_u64().map(|n| PageLabel::Arabic(n as usize)),
            Some(serde_json::Value::String(s)) => PageLabel::parse(s),
            _ => None,
        }
    }

    fn level(&self) -> usize {
        self.structure
            .as_deref()
            .map(|s| s.split('.').filter(|p| !p.trim().is_empty()).count())
            .filter(|&depth| depth > 0)
            .unwrap_or(1)
    }
}

/// Structured extraction of the TOC by the generator.
pub async fn parse_with_llm<G: TextGenerator>(
    text: &str,
    llm: &Retrying<G>,
) -> Result<Vec<TocEntry>> {
    let prompt = Prompts::toc_transformer().replace("{toc_content}", text);
    let parsed: TransformedToc = llm
        .json(&GenerationRequest::new(Task::TocTransform, prompt))
        .await?;

    Ok(parsed
        .table_of_contents
        .into_iter()
        .filter(|item| !item.title.trim().is_empty())
        .map(|item| TocEntry::new(item.title.trim(), item.level(), item.label()))
        .collect())
}

/// Parse TOC text, preferring the generator when line patterns are unsure.
///
/// Fails with [`PageIndexError::MalformedToc`] when nothing usable comes out.
pub async fn parse_toc<G: TextGenerator>(text: &str, llm: &Retrying<G>) -> Result<Vec<TocEntry>> {
    let heuristic = parse_heuristic(text);
    debug!(
        entries = heuristic.entries.len(),
        confidence = heuristic.confidence,
        "heuristic TOC parse"
    );

    let entries = if heuristic.is_confident() || !llm.is_available() {
        heuristic.entries
    } else {
        match parse_with_llm(text, llm).await {
            Ok(entries) if !entries.is_empty() => {
                info!(entries = entries.len(), "TOC parsed by LLM");
                entries
            }
            Ok(_) => {
                warn!("LLM returned an empty TOC, keeping line-pattern parse");
                heuristic.entries
            }
            Err(e) => {
                warn!(error = %e, "LLM TOC parse failed, keeping line-pattern parse");
                heuristic.entries
            }
        }
    };

    if entries.is_empty() {
        return Err(PageIndexError::MalformedToc(
            "table of contents yielded no entries".to_string(),
        ));
    }
    Ok(entries)
}
