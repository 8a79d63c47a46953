//! Finding the table of contents among the first pages of a document.

use crate::config::{IndexConfig, TocDetection};
use crate::document::Document;
use crate::llm::{GenerationRequest, Prompts, Retrying, Task, TextGenerator, is_yes};
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

/// A line ending in a page reference, optionally after a dot leader.
static TOC_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[[:alpha:]].*?(?:\.{2,}|…+|\s)\s*(?:\d{1,4}|[ivxlcdm]{1,7})$")
        .expect("valid toc line regex")
});

static DOT_LEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.{4,}|(?:\. ){3,}|…{2,}").expect("valid dot leader regex"));

static CONTENTS_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:table\s+of\s+)?contents\s*$").expect("valid contents heading regex")
});

/// Fraction of TOC-looking lines needed for a page to count as TOC.
pub const TOC_LINE_RATIO: f64 = 0.5;
/// Lower ratio accepted when the page carries a "Contents" heading.
pub const TOC_LINE_RATIO_WITH_HEADING: f64 = 0.3;
/// A TOC page needs at least this many TOC-looking lines.
pub const MIN_TOC_LINES: usize = 3;

/// Physical pages holding the table of contents, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocRegion {
    pub pages: Vec<usize>,
}

impl TocRegion {
    pub fn contains(&self, page: usize) -> bool {
        self.pages.contains(&page)
    }

    /// Last TOC page.
    pub fn end(&self) -> usize {
        self.pages.last().copied().unwrap_or(0)
    }
}

/// Line statistics for one page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageScore {
    pub toc_lines: usize,
    pub total_lines: usize,
    pub has_heading: bool,
}

impl PageScore {
    pub fn ratio(&self) -> f64 {
        if self.total_lines == 0 {
            0.0
        } else {
            self.toc_lines as f64 / self.total_lines as f64
        }
    }

    pub fn is_toc(&self) -> bool {
        let needed = if self.has_heading {
            TOC_LINE_RATIO_WITH_HEADING
        } else {
            TOC_LINE_RATIO
        };
        self.toc_lines >= MIN_TOC_LINES && self.ratio() >= needed
    }
}

/// Score a page by how many of its lines look like TOC entries.
pub fn score_page(text: &str) -> PageScore {
    let mut score = PageScore {
        toc_lines: 0,
        total_lines: 0,
        has_heading: false,
    };
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if CONTENTS_HEADING.is_match(line) {
            score.has_heading = true;
            continue;
        }
        score.total_lines += 1;
        if TOC_LINE.is_match(line) || DOT_LEADER.is_match(line) {
            score.toc_lines += 1;
        }
    }
    score
}

/// Find the TOC region by line heuristics alone.
pub fn locate_heuristic(document: &Document, scan_pages: usize) -> Option<TocRegion> {
    let is_toc = |i: usize| document.get_page(i).is_some_and(|p| score_page(&p.text).is_toc());

    let first = (0..scan_pages.min(document.page_count())).find(|&i| is_toc(i))?;
    // a TOC may run past the scan window once it has started
    let pages: Vec<usize> = (first..document.page_count())
        .take_while(|&i| is_toc(i))
        .collect();
    Some(TocRegion { pages })
}

#[derive(Debug, Deserialize)]
struct TocDetectionAnswer {
    toc_detected: String,
}

/// Find the TOC region, asking the generator when heuristics find nothing
/// or when LLM detection is configured.
pub async fn locate_toc<G: TextGenerator>(
    document: &Document,
    config: &IndexConfig,
    llm: &Retrying<G>,
) -> Option<TocRegion> {
    if config.toc_detection == TocDetection::Heuristic {
        if let Some(region) = locate_heuristic(document, config.toc_check_page_num) {
            info!(pages = ?region.pages, "table of contents found by line pattern");
            return Some(region);
        }
    }

    if !llm.is_available() {
        debug!("no generator available for TOC detection");
        return None;
    }

    let scan = config.toc_check_page_num.min(document.page_count());
    let mut pages = Vec::new();
    for i in 0..document.page_count() {
        if pages.is_empty() && i >= scan {
            break;
        }
        match detect_page(document, i, llm).await {
            Some(true) => pages.push(i),
            Some(false) if pages.is_empty() => continue,
            Some(false) => break,
            None => break,
        }
    }

    if pages.is_empty() {
        info!(scanned = scan, "no table of contents found");
        None
    } else {
        info!(pages = ?pages, "table of contents found by LLM");
        Some(TocRegion { pages })
    }
}

/// Ask whether one page is a TOC page; `None` when the generator gave up.
async fn detect_page<G: TextGenerator>(
    document: &Document,
    index: usize,
    llm: &Retrying<G>,
) -> Option<bool> {
    let page = document.get_page(index)?;
    let prompt = Prompts::toc_detector().replace("{content}", &page.text);
    match llm
        .json::<TocDetectionAnswer>(&GenerationRequest::new(Task::TocDetection, prompt))
        .await
    {
        Ok(answer) => Some(is_yes(&answer.toc_detected)),
        Err(e) => {
            warn!(page = index, error = %e, "TOC detection failed, treating as no TOC");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PageIndexError;
    use crate::llm::{DisabledGenerator, FnGenerator};
    use crate::tokenizer::HeuristicTokenizer;
    use std::time::Duration;

    const TOC_PAGE: &str = "Contents\n\
        Preface ........ v\n\
        1 Introduction ........ 1\n\
        1.1 Motivation ........ 3\n\
        2 Methods ........ 9\n\
        3 Results   15\n";

    fn doc(pages: &[&str]) -> Document {
        Document::from_page_texts(
            "doc",
            pages.iter().map(|p| p.to_string()).collect(),
            &HeuristicTokenizer::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_toc_page_scores_high() {
        let score = score_page(TOC_PAGE);
        assert!(score.has_heading);
        assert_eq!(score.toc_lines, 5);
        assert!(score.is_toc());
    }

    #[test]
    fn test_prose_page_scores_low() {
        let prose = "The study began in 2019.\nWe collected samples from many sites\n\
                     and analysed them carefully over several months.\nResults follow.";
        assert!(!score_page(prose).is_toc());
    }

    #[test]
    fn test_heuristic_region_spans_consecutive_pages() {
        let document = doc(&["Title page", TOC_PAGE, TOC_PAGE, "1 Introduction\nText", "More"]);
        let region = locate_heuristic(&document, 20).unwrap();
        assert_eq!(region.pages, vec![1, 2]);
        assert!(region.contains(2));
        assert_eq!(region.end(), 2);
    }

    #[test]
    fn test_scan_window_limits_start() {
        let document = doc(&["a", "b", TOC_PAGE]);
        assert!(locate_heuristic(&document, 2).is_none());
        assert!(locate_heuristic(&document, 3).is_some());
    }

    #[tokio::test]
    async fn test_llm_detection_when_heuristics_fail() {
        let document = doc(&["Cover", "Overview\nIntroduction\nMethods", "Body text", "More body"]);
        let generator = FnGenerator(|req: &GenerationRequest| {
            assert_eq!(req.task, Task::TocDetection);
            if req.prompt.contains("Overview") {
                Ok(r#"{"thinking": "list of sections", "toc_detected": "yes"}"#.to_string())
            } else {
                Ok(r#"{"thinking": "prose", "toc_detected": "no"}"#.to_string())
            }
        });
        let llm = Retrying::new(generator, 1, Duration::ZERO);
        let region = locate_toc(&document, &IndexConfig::default(), &llm).await;
        assert_eq!(region, Some(TocRegion { pages: vec![1] }));
    }

    #[tokio::test]
    async fn test_llm_failure_means_not_found() {
        let document = doc(&["Cover", "Body"]);
        let generator =
            FnGenerator(|_: &GenerationRequest| Err(PageIndexError::Timeout("slow".into())));
        let llm = Retrying::new(generator, 2, Duration::ZERO);
        assert!(locate_toc(&document, &IndexConfig::default(), &llm).await.is_none());

        let disabled = Retrying::new(DisabledGenerator, 1, Duration::ZERO);
        assert!(locate_toc(&document, &IndexConfig::default(), &disabled).await.is_none());
    }
}
