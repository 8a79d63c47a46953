//! Tokenizer adapter.
//!
//! Page budgets and node size limits are measured in tokens. The pipeline
//! only needs two things from a tokenizer: how many tokens a text has, and
//! where each token starts (for cutting text into token-sized pages).

use tracing::debug;

/// A deterministic text tokenizer identified by an encoding name.
pub trait Tokenizer: Send + Sync {
    /// Encoding name this tokenizer was created for.
    fn name(&self) -> &str;

    /// Byte offsets at which each token of `text` starts, ascending.
    ///
    /// Every offset lies on a `char` boundary.
    fn token_starts(&self, text: &str) -> Vec<usize>;

    /// Number of tokens in `text`.
    fn count(&self, text: &str) -> usize {
        self.token_starts(text).len()
    }
}

/// Approximates a BPE vocabulary without any model files.
///
/// Words are cut into pieces of at most four characters, punctuation
/// marks are single tokens, and whitespace is folded into the token that
/// follows it (the way GPT-2 attaches a leading space to words).
#[derive(Debug, Clone)]
pub struct HeuristicTokenizer {
    name: String,
}

const PIECE_CHARS: usize = 4;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Run {
    Start,
    Space,
    Word,
    Mark,
}

impl HeuristicTokenizer {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for HeuristicTokenizer {
    fn default() -> Self {
        Self::new("heuristic")
    }
}

impl Tokenizer for HeuristicTokenizer {
    fn name(&self) -> &str {
        &self.name
    }

    fn token_starts(&self, text: &str) -> Vec<usize> {
        let mut starts = Vec::new();
        let mut run = Run::Start;
        let mut piece_len = 0;
        let mut space_start: Option<usize> = None;

        for (i, c) in text.char_indices() {
            if c.is_whitespace() {
                space_start.get_or_insert(i);
                run = Run::Space;
                continue;
            }

            let start = space_start.take().unwrap_or(i);
            if c.is_alphanumeric() {
                if run == Run::Word && piece_len < PIECE_CHARS {
                    piece_len += 1;
                    continue;
                }
                starts.push(start);
                run = Run::Word;
                piece_len = 1;
            } else {
                starts.push(start);
                run = Run::Mark;
                piece_len = 0;
            }
        }

        // trailing whitespace is its own token
        if let Some(start) = space_start {
            starts.push(start);
        }

        starts
    }
}

/// Tokenizer backed by a pretrained Hugging Face `tokenizer.json`.
#[cfg(feature = "hf-tokenizers")]
pub struct HfTokenizer {
    name: String,
    inner: tokenizers::Tokenizer,
    fallback: HeuristicTokenizer,
}

#[cfg(feature = "hf-tokenizers")]
impl HfTokenizer {
    /// Fetch a tokenizer by model name from the Hugging Face Hub (e.g. "gpt2").
    pub fn from_pretrained(name: &str) -> crate::error::Result<Self> {
        let inner = tokenizers::Tokenizer::from_pretrained(name, None).map_err(|e| {
            crate::error::PageIndexError::Config(format!(
                "Failed to load tokenizer '{}': {}",
                name, e
            ))
        })?;
        Ok(Self {
            name: name.to_string(),
            inner,
            fallback: HeuristicTokenizer::new(name),
        })
    }

    /// Load a tokenizer from a local `tokenizer.json`.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let inner = tokenizers::Tokenizer::from_file(path).map_err(|e| {
            crate::error::PageIndexError::Config(format!(
                "Failed to load tokenizer from '{}': {}",
                path.display(),
                e
            ))
        })?;
        let name = path.display().to_string();
        Ok(Self {
            fallback: HeuristicTokenizer::new(name.clone()),
            name,
            inner,
        })
    }
}

#[cfg(feature = "hf-tokenizers")]
impl Tokenizer for HfTokenizer {
    fn name(&self) -> &str {
        &self.name
    }

    fn token_starts(&self, text: &str) -> Vec<usize> {
        match self.inner.encode(text, false) {
            Ok(encoding) => {
                let mut starts: Vec<usize> = encoding
                    .get_offsets()
                    .iter()
                    .map(|&(start, _)| floor_char_boundary(text, start))
                    .collect();
                starts.sort_unstable();
                starts.dedup();
                starts
            }
            Err(e) => {
                tracing::warn!(tokenizer = %self.name, error = %e, "encode failed, using heuristic token boundaries");
                self.fallback.token_starts(text)
            }
        }
    }
}

#[cfg(feature = "hf-tokenizers")]
fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    index = index.min(text.len());
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Resolve an encoding name to a tokenizer.
///
/// With the `hf-tokenizers` feature the named pretrained tokenizer is
/// loaded; otherwise (or if loading fails) the heuristic tokenizer stands in.
pub fn tokenizer_for(name: &str) -> Box<dyn Tokenizer> {
    #[cfg(feature = "hf-tokenizers")]
    {
        match HfTokenizer::from_pretrained(name) {
            Ok(tokenizer) => return Box::new(tokenizer),
            Err(e) => tracing::warn!(error = %e, "falling back to heuristic tokenizer"),
        }
    }

    debug!(encoding = name, "using heuristic tokenizer");
    Box::new(HeuristicTokenizer::new(name))
}
