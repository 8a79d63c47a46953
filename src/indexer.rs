//! Tree indexer - generates hierarchical tree structure from documents.
//!
//! This module runs the structuring pipeline:
//! 1. Locate and parse the table of contents, if the document has one
//! 2. Map printed page labels onto physical pages
//! 3. Build the node tree, falling back to inferred headings when the TOC
//!    is missing or unusable
//! 4. Split oversized leaves, validate, and enrich the nodes

use crate::builder::build_tree;
use crate::config::IndexConfig;
use crate::document::Document;
use crate::enricher::enrich;
use crate::error::{PageIndexError, Result};
use crate::fallback::structure_without_toc;
use crate::llm::{Retrying, TextGenerator};
use crate::pdf::LopdfExtractor;
use crate::splitter::split_oversized;
use crate::tokenizer::tokenizer_for;
use crate::toc::{locate_toc, parse_toc, region_text, resolve_offsets};
use crate::tree::{DocumentTree, StructureWarning, TreeNode};
use std::path::Path;
use tracing::{info, warn};

/// Tree indexer that builds document structure.
pub struct TreeIndexer<G> {
    llm: Retrying<G>,
    config: IndexConfig,
}

impl<G: TextGenerator> TreeIndexer<G> {
    /// Create an indexer using `generator` with the retry settings of `config`.
    pub fn new(generator: G, config: IndexConfig) -> Self {
        Self {
            llm: Retrying::from_config(generator, &config),
            config,
        }
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Build a tree index for a document.
    pub async fn index(&self, document: &Document) -> Result<DocumentTree> {
        info!(
            document = %document.name,
            pages = document.page_count(),
            tokens = document.total_tokens(),
            "indexing document"
        );

        let mut warnings = Vec::new();
        let nodes = match self.structure_from_toc(document).await {
            Ok(Some(nodes)) => nodes,
            Ok(None) => structure_without_toc(document, &self.config, &self.llm).await,
            Err(e) if e.is_recoverable() => {
                warn!(error = %e, "table of contents unusable, inferring structure");
                warnings.push(StructureWarning::StructureFallback {
                    reason: e.to_string(),
                });
                structure_without_toc(document, &self.config, &self.llm).await
            }
            Err(e) => return Err(e),
        };

        let mut tree = DocumentTree::new(document.name.clone(), nodes, document.page_count());
        tree.warnings = warnings;
        tree.assign_levels();

        split_oversized(&mut tree, document, &self.config, &self.llm).await;
        tree.validate()?;

        enrich(&mut tree, document, &self.config, &self.llm).await;
        info!(
            sections = tree.node_count(),
            depth = tree.max_depth(),
            "tree index built"
        );
        Ok(tree)
    }

    /// Top-level nodes from the document's own TOC; `None` when it has none.
    async fn structure_from_toc(&self, document: &Document) -> Result<Option<Vec<TreeNode>>> {
        let Some(region) = locate_toc(document, &self.config, &self.llm).await else {
            info!("no table of contents, inferring structure");
            return Ok(None);
        };

        let mut entries = parse_toc(&region_text(document, &region), &self.llm).await?;
        resolve_offsets(&mut entries, document, &region, &self.config, &self.llm).await?;
        let nodes = build_tree(entries, document.last_page())?;

        // a tree that does not hold together is treated like a bad TOC
        let candidate = DocumentTree::new(document.name.clone(), nodes, document.page_count());
        candidate
            .validate()
            .map_err(|e| PageIndexError::MalformedToc(e.to_string()))?;
        Ok(Some(candidate.nodes))
    }
}

/// Convenience function to index a document from a file path.
pub async fn index_path<G: TextGenerator>(
    path: &Path,
    generator: G,
    config: IndexConfig,
) -> Result<DocumentTree> {
    config.validate()?;
    let tokenizer = tokenizer_for(&config.txt_tokenizer);
    let document = Document::from_path(path, &config, tokenizer.as_ref(), &LopdfExtractor)?;
    TreeIndexer::new(generator, config).index(&document).await
}
