//! Approximate matching of section titles against page text.

use strsim::normalized_levenshtein;

/// Decides whether a section title appears on a page.
#[derive(Debug, Clone, Copy)]
pub struct TitleMatcher {
    threshold: f64,
}

impl TitleMatcher {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// True when `title` starts a line of `page_text` (fuzzily).
    pub fn matches(&self, title: &str, page_text: &str) -> bool {
        self.similarity(title, page_text) >= self.threshold
    }

    /// Best similarity in `[0, 1]` between the title and any line of the page.
    ///
    /// Lines are compared after normalization, with and without leading
    /// section numbers, and also joined with the following line to catch
    /// headings wrapped over two lines. A line that begins with the whole
    /// title scores 1.0.
    pub fn similarity(&self, title: &str, page_text: &str) -> f64 {
        let title = normalize(title);
        if title.is_empty() {
            return 0.0;
        }
        let title_words = title.split(' ').count();

        let lines: Vec<String> = page_text
            .lines()
            .map(normalize)
            .filter(|l| !l.is_empty())
            .collect();

        let mut best: f64 = 0.0;
        for (i, line) in lines.iter().enumerate() {
            let joined = lines.get(i + 1).map(|next| format!("{} {}", line, next));
            let candidates = [Some(line.as_str()), joined.as_deref()];
            for candidate in candidates.into_iter().flatten() {
                for text in [candidate, strip_numbering(candidate)] {
                    best = best.max(score(&title, title_words, text));
                    if best >= 1.0 {
                        return 1.0;
                    }
                }
            }
        }
        best
    }
}

fn score(title: &str, title_words: usize, line: &str) -> f64 {
    if let Some(rest) = line.strip_prefix(title) {
        if rest.is_empty() || rest.starts_with(' ') {
            return 1.0;
        }
    }
    // the title as whole words anywhere in the line ("chapter 3 results")
    if format!(" {} ", line).contains(&format!(" {} ", title)) {
        return 1.0;
    }
    // compare against the line's opening words, allowing one extra or missing word
    let words: Vec<&str> = line.split(' ').collect();
    let mut best = normalized_levenshtein(title, line);
    for n in title_words.saturating_sub(1).max(1)..=title_words + 1 {
        if n > words.len() {
            break;
        }
        best = best.max(normalized_levenshtein(title, &words[..n].join(" ")));
    }
    best
}

/// Drop leading purely numeric tokens ("2 3 methods" → "methods").
fn strip_numbering(line: &str) -> &str {
    let mut rest = line;
    while let Some((head, tail)) = rest.split_once(' ') {
        if head.chars().all(|c| c.is_ascii_digit()) {
            rest = tail;
        } else {
            break;
        }
    }
    rest
}

/// Lowercase, keep alphanumerics, collapse everything else into single spaces.
pub fn normalize(text: &str) -> String {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}
