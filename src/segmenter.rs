//! Plain-text page segmentation.
//!
//! Text has no physical pages, so pages are synthesized from a fixed budget
//! of tokens or characters. Each page after the first repeats the last
//! `txt_chunk_overlap` units of its predecessor so a heading cut at a page
//! boundary is still readable in one piece. The repeated prefix is recorded
//! in [`PageUnit::overlap`], which keeps the fresh parts an exact partition
//! of the source.

use crate::config::{IndexConfig, PageMethod};
use crate::document::PageUnit;
use crate::tokenizer::Tokenizer;

/// Split `text` into page units according to the text settings in `config`.
pub fn segment_text(text: &str, config: &IndexConfig, tokenizer: &dyn Tokenizer) -> Vec<PageUnit> {
    let (starts, per_page) = match config.txt_page_method {
        PageMethod::Token => (tokenizer.token_starts(text), config.txt_tokens_per_page),
        PageMethod::Char => (
            text.char_indices().map(|(i, _)| i).collect(),
            config.txt_chars_per_page,
        ),
    };
    cut_units(
        text,
        &starts,
        per_page.max(1),
        config.txt_chunk_overlap,
        tokenizer,
    )
}

/// Group the units beginning at `starts` into pages of `per_page` units.
fn cut_units(
    text: &str,
    starts: &[usize],
    per_page: usize,
    overlap: usize,
    tokenizer: &dyn Tokenizer,
) -> Vec<PageUnit> {
    let unit_count = starts.len();
    let boundary = |unit: usize| -> usize {
        if unit == 0 {
            0
        } else if unit >= unit_count {
            text.len()
        } else {
            starts[unit]
        }
    };

    let mut pages = Vec::with_capacity(unit_count.div_ceil(per_page));
    let mut first = 0;
    while first < unit_count {
        let end = (first + per_page).min(unit_count);
        let fresh_start = boundary(first);
        let text_start = boundary(first.saturating_sub(overlap));
        let slice = &text[text_start..boundary(end)];

        pages.push(PageUnit {
            physical_index: pages.len(),
            text: slice.to_string(),
            token_count: tokenizer.count(slice),
            overlap: fresh_start - text_start,
        });
        first = end;
    }
    pages
}
