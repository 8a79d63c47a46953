//! Subdividing leaves that exceed the page or token budget.
//!
//! An oversized leaf first gets natural sub-headings from the generator when
//! that is enabled. Otherwise, or when the headings do not help, it is cut
//! into consecutive "(part k)" children that fit the budget. New leaves are
//! checked again until everything fits or is down to a single page.

use crate::builder::{build_nodes, normalize_levels};
use crate::config::IndexConfig;
use crate::document::Document;
use crate::fallback::infer_entries;
use crate::llm::{Retrying, TextGenerator};
use crate::toc::matching::normalize;
use crate::tree::{DocumentTree, StructureWarning, TreeNode};
use tracing::{debug, info, warn};

/// Page and token limits for a single leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeBudget {
    pub max_pages: usize,
    pub max_tokens: usize,
}

impl NodeBudget {
    pub fn from_config(config: &IndexConfig) -> Self {
        Self {
            max_pages: config.max_page_num_each_node,
            max_tokens: config.max_token_num_each_node,
        }
    }

    pub fn fits(&self, document: &Document, start: usize, end: usize) -> bool {
        end + 1 - start <= self.max_pages && document.tokens_in_range(start, end) <= self.max_tokens
    }
}

/// Cut `[start, end]` into consecutive runs that fit the budget.
///
/// Pages are added greedily; a single page over the token budget becomes a
/// run on its own.
pub fn greedy_parts(document: &Document, start: usize, end: usize, budget: NodeBudget) -> Vec<(usize, usize)> {
    let mut parts = Vec::new();
    let mut part_start = start;
    let mut tokens = 0;
    for page in start..=end {
        let page_tokens = document.get_page(page).map_or(0, |p| p.token_count);
        let pages = page - part_start;
        if page > part_start && (pages + 1 > budget.max_pages || tokens + page_tokens > budget.max_tokens) {
            parts.push((part_start, page - 1));
            part_start = page;
            tokens = 0;
        }
        tokens += page_tokens;
    }
    parts.push((part_start, end));
    parts
}

fn part_nodes(node: &TreeNode, document: &Document, budget: NodeBudget) -> Vec<TreeNode> {
    greedy_parts(document, node.start_page, node.end_page, budget)
        .into_iter()
        .enumerate()
        .map(|(k, (start, end))| {
            TreeNode::new(format!("{} (part {})", node.title, k + 1), node.level + 1, start, end)
        })
        .collect()
}

async fn heading_nodes<G: TextGenerator>(
    node: &TreeNode,
    document: &Document,
    config: &IndexConfig,
    llm: &Retrying<G>,
) -> Option<Vec<TreeNode>> {
    let mut entries = infer_entries(document, node.start_page, node.end_page, config, llm).await;
    // the section's own heading usually comes back first
    if entries
        .first()
        .is_some_and(|e| normalize(&e.title) == normalize(&node.title))
    {
        let own = entries.remove(0);
        // the remaining headings move up to the level the section had
        for entry in &mut entries {
            entry.level = entry.level.saturating_sub(own.level).max(1);
        }
        normalize_levels(&mut entries);
    }
    if entries.is_empty() {
        return None;
    }
    for entry in &mut entries {
        entry.level += node.level;
    }

    let children = build_nodes(
        &entries,
        node.start_page,
        node.end_page,
        node.level + 1,
        Some(&node.title),
    );
    // every child must be strictly smaller, or splitting would not terminate
    let shrinks = children.iter().all(|c| c.page_span() < node.page_span());
    (children.len() >= 2 && shrinks).then_some(children)
}

/// Split every oversized leaf of `tree`, recording unsplittable ones as
/// [`StructureWarning::OversizedLeaf`].
pub async fn split_oversized<G: TextGenerator>(
    tree: &mut DocumentTree,
    document: &Document,
    config: &IndexConfig,
    llm: &Retrying<G>,
) {
    let budget = NodeBudget::from_config(config);
    let use_headings = config.split_with_headings && llm.is_available();

    // reversed so leaves pop in document order
    let mut pending: Vec<Vec<usize>> = tree.leaf_paths().into_iter().rev().collect();
    let mut splits = 0;

    while let Some(path) = pending.pop() {
        let Some(node) = tree.node_at_mut(&path) else {
            continue;
        };
        if budget.fits(document, node.start_page, node.end_page) {
            continue;
        }
        if node.start_page == node.end_page {
            let token_count = document.tokens_in_range(node.start_page, node.end_page);
            warn!(title = %node.title, page = node.start_page, token_count, "single page exceeds token budget");
            let warning = StructureWarning::OversizedLeaf {
                title: node.title.clone(),
                start_page: node.start_page,
                end_page: node.end_page,
                page_count: 1,
                token_count,
            };
            tree.warnings.push(warning);
            continue;
        }

        let snapshot = node.clone();
        let inferred = if use_headings {
            heading_nodes(&snapshot, document, config, llm).await
        } else {
            None
        };
        let children = inferred.unwrap_or_else(|| part_nodes(&snapshot, document, budget));
        debug!(title = %snapshot.title, children = children.len(), "split oversized node");
        splits += 1;

        let Some(node) = tree.node_at_mut(&path) else {
            continue;
        };
        node.nodes = children;

        // queue the new leaves under this node
        let subtree = DocumentTree::new("", node.nodes.clone(), 0);
        for sub in subtree.leaf_paths().into_iter().rev() {
            let mut full = path.clone();
            full.extend(sub);
            pending.push(full);
        }
    }

    if splits > 0 {
        info!(splits, "oversized nodes split");
    }
}
