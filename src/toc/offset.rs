//! Mapping printed page labels onto physical pages.
//!
//! Printed numbers usually trail the physical index by a constant amount
//! (cover, front matter, TOC pages). The offset is found by voting over a
//! sample of entries, then every entry is checked against the page it lands
//! on. Entries that fail the check are searched for between their verified
//! neighbours.

use crate::config::IndexConfig;
use crate::document::Document;
use crate::error::{PageIndexError, Result};
use crate::llm::{GenerationRequest, Prompts, Retrying, Task, TextGenerator};
use crate::toc::{TitleMatcher, TocEntry, TocRegion, physical_index};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info, warn};

/// Entries sampled per label group when voting on the offset.
pub const OFFSET_SAMPLE: usize = 8;

/// Largest page window shown to the generator when fixing one entry.
pub const MAX_FIX_WINDOW: usize = 10;

/// Vote on the offset between labels and physical pages.
///
/// Each sampled `(title, label)` votes once for every `page - label` where
/// the title appears on `page`. The most-voted offset wins; ties go to the
/// smallest magnitude, positive first.
fn vote_offset(
    samples: &[(&str, usize)],
    document: &Document,
    region: &TocRegion,
    matcher: &TitleMatcher,
) -> Option<i64> {
    let mut votes: HashMap<i64, usize> = HashMap::new();
    for &(title, label) in samples {
        let offsets: BTreeSet<i64> = document
            .pages
            .iter()
            .filter(|p| !region.contains(p.physical_index))
            .filter(|p| matcher.matches(title, &p.text))
            .map(|p| p.physical_index as i64 - label as i64)
            .collect();
        for d in offsets {
            *votes.entry(d).or_default() += 1;
        }
    }
    debug!(?votes, "offset votes");

    votes
        .into_iter()
        .max_by_key(|&(d, count)| (count, std::cmp::Reverse(d.abs()), d > 0))
        .map(|(d, _)| d)
}

fn apply_offset(label: usize, offset: i64, last_page: usize) -> usize {
    (label as i64 + offset).clamp(0, last_page as i64) as usize
}

fn verify(
    entry: &mut TocEntry,
    page: usize,
    document: &Document,
    region: &TocRegion,
    matcher: &TitleMatcher,
) {
    entry.resolved_physical_page = Some(page);
    entry.verified = !region.contains(page)
        && document
            .get_page(page)
            .is_some_and(|p| matcher.matches(&entry.title, &p.text));
}

/// Resolve one label group (arabic or roman) with its own offset.
fn resolve_group(
    entries: &mut [TocEntry],
    label_of: impl Fn(&TocEntry) -> Option<usize>,
    document: &Document,
    region: &TocRegion,
    matcher: &TitleMatcher,
) -> Option<i64> {
    let samples: Vec<(String, usize)> = entries
        .iter()
        .filter_map(|e| label_of(e).map(|l| (e.title.clone(), l)))
        .take(OFFSET_SAMPLE)
        .collect();
    if samples.is_empty() {
        return None;
    }
    let borrowed: Vec<(&str, usize)> = samples.iter().map(|(t, l)| (t.as_str(), *l)).collect();
    let offset = vote_offset(&borrowed, document, region, matcher)?;

    for entry in entries.iter_mut() {
        if let Some(label) = label_of(entry) {
            let page = apply_offset(label, offset, document.last_page());
            verify(entry, page, document, region, matcher);
        }
    }
    Some(offset)
}

#[derive(Debug, Deserialize)]
struct IndexFixAnswer {
    physical_index: serde_json::Value,
}

/// Page window between the nearest verified neighbours of `entries[i]`.
fn repair_window(entries: &[TocEntry], i: usize, last_page: usize) -> Option<(usize, usize)> {
    let lower = entries[..i]
        .iter()
        .rev()
        .find(|e| e.verified)
        .and_then(|e| e.resolved_physical_page)
        .unwrap_or(0);
    let upper = entries[i + 1..]
        .iter()
        .find(|e| e.verified)
        .and_then(|e| e.resolved_physical_page)
        .unwrap_or(last_page);
    (lower <= upper).then_some((lower, upper))
}

async fn ask_fixer<G: TextGenerator>(
    title: &str,
    window: (usize, usize),
    document: &Document,
    region: &TocRegion,
    llm: &Retrying<G>,
) -> Option<usize> {
    let (start, end) = window;
    let prompt = Prompts::toc_index_fixer()
        .replace("{title}", title)
        .replace("{content}", &document.content_range(start, end));
    match llm
        .json::<IndexFixAnswer>(&GenerationRequest::new(Task::TocIndexFix, prompt))
        .await
    {
        Ok(answer) => physical_index(&answer.physical_index)
            .filter(|p| (start..=end).contains(p) && !region.contains(*p)),
        Err(e) => {
            warn!(title, error = %e, "index fix failed");
            None
        }
    }
}

/// Search for unverified entries between their verified neighbours.
async fn repair<G: TextGenerator>(
    entries: &mut [TocEntry],
    document: &Document,
    region: &TocRegion,
    matcher: &TitleMatcher,
    llm: &Retrying<G>,
) {
    for i in 0..entries.len() {
        if entries[i].verified {
            continue;
        }
        let Some((lower, upper)) = repair_window(entries, i, document.last_page()) else {
            continue;
        };

        let found = (lower..=upper)
            .filter(|&p| !region.contains(p))
            .find(|&p| {
                document
                    .get_page(p)
                    .is_some_and(|page| matcher.matches(&entries[i].title, &page.text))
            });
        if let Some(page) = found {
            debug!(title = %entries[i].title, page, "entry found by search");
            entries[i].resolved_physical_page = Some(page);
            entries[i].verified = true;
            continue;
        }

        if !llm.is_available() {
            continue;
        }
        // keep the window small, centred on the current guess when there is one
        let guess = entries[i].resolved_physical_page.unwrap_or(lower);
        let start = guess
            .saturating_sub(MAX_FIX_WINDOW / 2)
            .clamp(lower, upper);
        let end = (start + MAX_FIX_WINDOW - 1).min(upper);
        if let Some(page) = ask_fixer(&entries[i].title, (start, end), document, region, llm).await
        {
            debug!(title = %entries[i].title, page, "entry placed by LLM");
            entries[i].resolved_physical_page = Some(page);
            entries[i].verified = true;
        }
    }
}

/// Resolve the physical page of every entry.
///
/// Returns the arabic offset, or `None` when no entry carries an arabic
/// label. Fails with [`PageIndexError::OffsetUnresolved`] when the arabic
/// offset cannot be determined or when no entry ends up verified.
pub async fn resolve_offsets<G: TextGenerator>(
    entries: &mut [TocEntry],
    document: &Document,
    region: &TocRegion,
    config: &IndexConfig,
    llm: &Retrying<G>,
) -> Result<Option<i64>> {
    let matcher = TitleMatcher::new(config.title_match_threshold);

    let arabic = |e: &TocEntry| e.raw_page_label.as_ref().and_then(|l| l.arabic());
    let has_arabic = entries.iter().any(|e| arabic(e).is_some());
    let offset = resolve_group(entries, arabic, document, region, &matcher);
    if has_arabic && offset.is_none() {
        return Err(PageIndexError::OffsetUnresolved(
            "no page offset matches the sampled titles".to_string(),
        ));
    }

    let roman = |e: &TocEntry| e.raw_page_label.as_ref().and_then(|l| l.roman());
    if let Some(d) = resolve_group(entries, roman, document, region, &matcher) {
        debug!(offset = d, "front matter offset");
    }

    repair(entries, document, region, &matcher, llm).await;

    let verified = entries.iter().filter(|e| e.verified).count();
    if verified == 0 {
        return Err(PageIndexError::OffsetUnresolved(
            "no TOC entry could be located in the document".to_string(),
        ));
    }
    info!(
        offset = ?offset,
        verified,
        total = entries.len(),
        "TOC page labels resolved"
    );
    Ok(offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{DisabledGenerator, FnGenerator};
    use crate::toc::PageLabel;
    use crate::tokenizer::HeuristicTokenizer;
    use std::time::Duration;

    /// A document with the given headings on the given pages and filler elsewhere.
    fn doc(page_count: usize, headings: &[(usize, &str)]) -> Document {
        let pages = (0..page_count)
            .map(|i| match headings.iter().find(|(p, _)| *p == i) {
                Some((_, text)) => format!("{}\nbody of the section", text),
                None => format!("lorem filler text page {}", i),
            })
            .collect();
        Document::from_page_texts("doc", pages, &HeuristicTokenizer::default()).unwrap()
    }

    fn entry(title: &str, label: &str) -> TocEntry {
        TocEntry::new(title, 1, PageLabel::parse(label))
    }

    fn offline() -> Retrying<DisabledGenerator> {
        Retrying::new(DisabledGenerator, 1, Duration::ZERO)
    }

    fn region() -> TocRegion {
        TocRegion { pages: vec![1] }
    }

    #[tokio::test]
    async fn test_known_offset_round_trip() {
        let document = doc(
            12,
            &[
                (1, "Contents\nIntroduction 1\nBackground 3\nMethods 6\nResults 8"),
                (4, "Introduction"),
                (6, "Background"),
                (9, "Methods"),
                (11, "Results"),
            ],
        );
        let mut entries = vec![
            entry("Introduction", "1"),
            entry("Background", "3"),
            entry("Methods", "6"),
            entry("Results", "8"),
        ];
        let offset = resolve_offsets(&mut entries, &document, &region(), &IndexConfig::default(), &offline())
            .await
            .unwrap();
        assert_eq!(offset, Some(3));
        let pages: Vec<_> = entries.iter().map(|e| e.resolved_physical_page).collect();
        assert_eq!(pages, vec![Some(4), Some(6), Some(9), Some(11)]);
        assert!(entries.iter().all(|e| e.verified));
    }

    #[tokio::test]
    async fn test_misprinted_label_is_repaired_by_search() {
        let document = doc(
            12,
            &[(3, "Introduction"), (5, "Background"), (8, "Methods"), (10, "Results")],
        );
        let mut entries = vec![
            entry("Introduction", "1"),
            entry("Background", "3"),
            // printed as 4, actually on label 6
            entry("Methods", "4"),
            entry("Results", "8"),
        ];
        let offset = resolve_offsets(&mut entries, &document, &region(), &IndexConfig::default(), &offline())
            .await
            .unwrap();
        assert_eq!(offset, Some(2));
        assert_eq!(entries[2].resolved_physical_page, Some(8));
        assert!(entries[2].verified);
    }

    #[tokio::test]
    async fn test_roman_labels_use_their_own_offset() {
        let document = doc(
            10,
            &[(2, "Preface"), (3, "Acknowledgements"), (5, "Introduction"), (8, "Conclusion")],
        );
        let mut entries = vec![
            entry("Preface", "iii"),
            entry("Acknowledgements", "iv"),
            entry("Introduction", "1"),
            entry("Conclusion", "4"),
        ];
        let offset = resolve_offsets(&mut entries, &document, &region(), &IndexConfig::default(), &offline())
            .await
            .unwrap();
        assert_eq!(offset, Some(4));
        assert_eq!(entries[0].resolved_physical_page, Some(2));
        assert_eq!(entries[1].resolved_physical_page, Some(3));
        assert!(entries.iter().all(|e| e.verified));
    }

    #[tokio::test]
    async fn test_llm_places_entry_the_search_misses() {
        let document = doc(
            10,
            &[(3, "Introduction"), (7, "Conclusion"), (5, "completely different words")],
        );
        let mut entries = vec![
            entry("Introduction", "1"),
            TocEntry::new("Interlude", 1, None),
            entry("Conclusion", "5"),
        ];
        let generator = FnGenerator(|req: &GenerationRequest| {
            assert_eq!(req.task, Task::TocIndexFix);
            assert!(req.prompt.contains("Interlude"));
            Ok(r#"{"thinking": "starts on page 5", "physical_index": "<physical_index_5>"}"#.to_string())
        });
        let llm = Retrying::new(generator, 1, Duration::ZERO);
        resolve_offsets(&mut entries, &document, &region(), &IndexConfig::default(), &llm)
            .await
            .unwrap();
        assert_eq!(entries[1].resolved_physical_page, Some(5));
        assert!(entries[1].verified);
    }

    #[tokio::test]
    async fn test_out_of_window_llm_answer_is_ignored() {
        let document = doc(10, &[(3, "Introduction"), (7, "Conclusion")]);
        let mut entries = vec![
            entry("Introduction", "1"),
            TocEntry::new("Interlude", 1, None),
            entry("Conclusion", "5"),
        ];
        let llm = Retrying::new(
            FnGenerator(|_: &GenerationRequest| Ok(r#"{"physical_index": 9}"#.to_string())),
            1,
            Duration::ZERO,
        );
        resolve_offsets(&mut entries, &document, &region(), &IndexConfig::default(), &llm)
            .await
            .unwrap();
        assert_eq!(entries[1].resolved_physical_page, None);
        assert!(entries[1].is_low_confidence());
    }

    #[tokio::test]
    async fn test_no_matching_offset_is_unresolved() {
        let document = doc(6, &[]);
        let mut entries = vec![entry("Introduction", "1"), entry("Methods", "3")];
        let err = resolve_offsets(&mut entries, &document, &region(), &IndexConfig::default(), &offline())
            .await
            .unwrap_err();
        assert!(matches!(err, PageIndexError::OffsetUnresolved(_)));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_vote_prefers_small_offsets_on_ties() {
        // "Summary" appears on pages 2 and 6, label 4: offsets -2 and +2 tie
        let document = doc(8, &[(2, "Summary"), (6, "Summary")]);
        let matcher = TitleMatcher::new(0.8);
        let d = vote_offset(&[("Summary", 4)], &document, &TocRegion { pages: vec![] }, &matcher);
        assert_eq!(d, Some(2));
    }
}
