//! Table-of-contents handling: finding the TOC, parsing it, and mapping its
//! printed page labels onto physical pages.

pub mod locator;
pub mod matching;
pub mod offset;
pub mod parser;

use crate::document::Document;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

pub use locator::{TocRegion, locate_toc};
pub use matching::TitleMatcher;
pub use offset::resolve_offsets;
pub use parser::{ParsedToc, parse_heuristic, parse_toc};

/// The page reference printed next to a TOC title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum PageLabel {
    /// An arabic page number, e.g. `37`.
    Arabic(usize),
    /// A roman front-matter number, stored lowercase, e.g. `xiv`.
    Roman(String),
    /// Anything else, e.g. `A-3`.
    Text(String),
}

impl PageLabel {
    /// Classify a raw label; blank input has no label.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if let Ok(n) = raw.parse::<usize>() {
            return Some(PageLabel::Arabic(n));
        }
        let lower = raw.to_ascii_lowercase();
        if roman_value(&lower).is_some() {
            return Some(PageLabel::Roman(lower));
        }
        Some(PageLabel::Text(raw.to_string()))
    }

    pub fn arabic(&self) -> Option<usize> {
        match self {
            PageLabel::Arabic(n) => Some(*n),
            _ => None,
        }
    }

    pub fn roman(&self) -> Option<usize> {
        match self {
            PageLabel::Roman(s) => roman_value(s),
            _ => None,
        }
    }
}

/// Value of a lowercase roman numeral in canonical form, e.g. `xiv` → 14.
pub fn roman_value(numeral: &str) -> Option<usize> {
    if numeral.is_empty() || numeral.len() > 15 {
        return None;
    }
    let digit = |c: char| match c {
        'i' => Some(1),
        'v' => Some(5),
        'x' => Some(10),
        'l' => Some(50),
        'c' => Some(100),
        'd' => Some(500),
        'm' => Some(1000),
        _ => None,
    };
    let values: Vec<usize> = numeral.chars().map(digit).collect::<Option<_>>()?;

    let mut total = 0;
    for (i, &value) in values.iter().enumerate() {
        match values.get(i + 1) {
            Some(&next) if next > value => total -= value as isize,
            _ => total += value as isize,
        }
    }
    let total = usize::try_from(total).ok().filter(|&t| t > 0)?;

    // reject non-canonical forms like "iiii" or "vx"
    (to_roman(total) == numeral).then_some(total)
}

fn to_roman(mut n: usize) -> String {
    const TABLE: [(usize, &str); 13] = [
        (1000, "m"),
        (900, "cm"),
        (500, "d"),
        (400, "cd"),
        (100, "c"),
        (90, "xc"),
        (50, "l"),
        (40, "xl"),
        (10, "x"),
        (9, "ix"),
        (5, "v"),
        (4, "iv"),
        (1, "i"),
    ];
    let mut out = String::new();
    for (value, symbol) in TABLE {
        while n >= value {
            out.push_str(symbol);
            n -= value;
        }
    }
    out
}

/// One line of a table of contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TocEntry {
    pub title: String,
    /// 1 for top-level sections.
    pub level: usize,
    pub raw_page_label: Option<PageLabel>,
    /// Physical page the section starts on, once known.
    pub resolved_physical_page: Option<usize>,
    /// Whether the title was confirmed on `resolved_physical_page`.
    #[serde(default)]
    pub verified: bool,
}

impl TocEntry {
    /// An entry as printed in a TOC, not yet resolved.
    pub fn new(title: impl Into<String>, level: usize, raw_page_label: Option<PageLabel>) -> Self {
        Self {
            title: title.into(),
            level,
            raw_page_label,
            resolved_physical_page: None,
            verified: false,
        }
    }

    /// An entry found directly on a physical page.
    pub fn located(title: impl Into<String>, level: usize, physical_page: usize) -> Self {
        Self {
            title: title.into(),
            level,
            raw_page_label: None,
            resolved_physical_page: Some(physical_page),
            verified: true,
        }
    }

    /// Resolved, but the title was not found where the TOC says.
    pub fn is_low_confidence(&self) -> bool {
        !self.verified
    }
}

static PHYSICAL_INDEX_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^<?\s*physical_index_(\d+)\s*>?$").expect("valid physical index regex")
});

/// Read a page reference given as `5`, `"5"` or `"<physical_index_5>"`.
pub fn physical_index(value: &serde_json::Value) -> Option<usize> {
    match value {
        serde_json::Value::Number(n) => n.as_u64().map(|n| n as usize),
        serde_json::Value::String(s) => {
            let s = s.trim();
            s.parse().ok().or_else(|| {
                PHYSICAL_INDEX_TAG
                    .captures(s)
                    .and_then(|c| c[1].parse().ok())
            })
        }
        _ => None,
    }
}

/// Text of the TOC pages, joined with newlines.
pub fn region_text(document: &Document, region: &TocRegion) -> String {
    region
        .pages
        .iter()
        .filter_map(|&i| document.get_page(i))
        .map(|p| p.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}
