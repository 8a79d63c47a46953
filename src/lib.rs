//! PageIndex - hierarchical, page-anchored document structure.
//!
//! Turns a PDF or plain-text document into a table-of-contents tree where
//! every node covers an exact range of physical pages. Downstream retrieval
//! and summarization tools can then address "section 2.3" as pages 14-19
//! instead of a flat blob of text.
//!
//! # Overview
//!
//! 1. The document is split into page units (PDF pages, or synthetic pages
//!    cut from text by a token or character budget)
//! 2. A table of contents is located and parsed when the document has one
//! 3. Printed page numbers are mapped onto physical pages and checked
//!    against the page text
//! 4. The tree is built, oversized leaves are split, and nodes are enriched
//!    with ids, text, summaries and a document description
//!
//! Documents without a usable table of contents get their structure from
//! headings inferred by the language model, a few pages at a time.
//!
//! # Quick Start
//!
//! ```no_run
//! use pageindex::{
//!     config::Config,
//!     document::Document,
//!     indexer::TreeIndexer,
//!     llm::LlmClient,
//!     pdf::LopdfExtractor,
//!     persistence::save_tree,
//!     tokenizer::tokenizer_for,
//! };
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     config.validate()?;
//!
//!     let tokenizer = tokenizer_for(&config.index.txt_tokenizer);
//!     let document = Document::from_path(
//!         Path::new("report.pdf"),
//!         &config.index,
//!         tokenizer.as_ref(),
//!         &LopdfExtractor,
//!     )?;
//!
//!     let indexer = TreeIndexer::new(LlmClient::new(config.llm), config.index);
//!     let tree = indexer.index(&document).await?;
//!
//!     save_tree(&tree, Path::new("results/report_structure.json"))?;
//!     println!("{}", tree.format());
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Document**: page units with token counts ([`document`], [`segmenter`], [`pdf`])
//! - **TOC handling**: locating, parsing and page-offset resolution ([`toc`])
//! - **Tree building**: [`builder`], [`splitter`], [`fallback`], [`enricher`]
//! - **TreeIndexer**: runs the pipeline ([`indexer`])
//! - **TextGenerator**: the language-model seam ([`llm`])

pub mod builder;
pub mod config;
pub mod document;
pub mod enricher;
pub mod error;
pub mod fallback;
pub mod indexer;
pub mod llm;
pub mod pdf;
pub mod persistence;
pub mod segmenter;
pub mod splitter;
pub mod toc;
pub mod tokenizer;
pub mod tree;

// Re-export commonly used types
pub use config::{Config, IndexConfig};
pub use document::{Document, PageUnit};
pub use error::{PageIndexError, Result};
pub use indexer::{TreeIndexer, index_path};
pub use llm::{DisabledGenerator, FnGenerator, LlmClient, TextGenerator};
pub use persistence::{load_tree, save_tree};
pub use toc::TocEntry;
pub use tree::{DocumentTree, StructureWarning, TreeNode};
