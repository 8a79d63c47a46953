//! Tree structure for hierarchical document indexing.
//!
//! A document tree is a list of top-level [`TreeNode`]s, each anchored to an
//! inclusive range of 0-indexed physical pages. Children of a node cover the
//! parent's range in order, without gaps or overlaps.

use crate::error::{PageIndexError, Result};
use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// A node in the document tree structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct TreeNode {
    /// Section title.
    pub title: String,

    /// Preorder identifier ("0000", "0001", ...), when enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,

    /// First physical page (0-indexed).
    pub start_page: usize,

    /// Last physical page (0-indexed, inclusive).
    pub end_page: usize,

    /// Optional summary of the section.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    /// Text of the covered pages, when enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Child nodes (subsections).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<TreeNode>,

    /// Depth in the tree, 1 for top-level nodes. Derived, not serialized.
    #[serde(skip)]
    pub level: usize,
}

impl TreeNode {
    /// Create a new tree node.
    pub fn new(title: impl Into<String>, level: usize, start_page: usize, end_page: usize) -> Self {
        Self {
            title: title.into(),
            node_id: None,
            start_page,
            end_page,
            summary: None,
            text: None,
            nodes: Vec::new(),
            level,
        }
    }

    /// Add a child node.
    pub fn add_child(&mut self, child: TreeNode) {
        self.nodes.push(child);
    }

    /// Check if this node has children.
    pub fn has_children(&self) -> bool {
        !self.nodes.is_empty()
    }

    /// Number of pages covered.
    pub fn page_span(&self) -> usize {
        if self.end_page >= self.start_page {
            self.end_page - self.start_page + 1
        } else {
            0
        }
    }

    /// Recursively count all nodes in this subtree (including self).
    pub fn node_count(&self) -> usize {
        1 + self.nodes.iter().map(|n| n.node_count()).sum::<usize>()
    }

    /// Find all leaf nodes (nodes without children).
    pub fn leaves(&self) -> Vec<&TreeNode> {
        if self.nodes.is_empty() {
            vec![self]
        } else {
            self.nodes.iter().flat_map(|n| n.leaves()).collect()
        }
    }

    /// Find a node by title (case-insensitive).
    pub fn find_by_title(&self, title: &str) -> Option<&TreeNode> {
        if self.title.eq_ignore_ascii_case(title) {
            return Some(self);
        }
        self.nodes.iter().find_map(|child| child.find_by_title(title))
    }

    /// Visit this subtree in preorder.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a TreeNode)) {
        visit(self);
        for child in &self.nodes {
            child.walk(visit);
        }
    }

    /// Visit this subtree in preorder, mutably.
    pub fn walk_mut(&mut self, visit: &mut impl FnMut(&mut TreeNode)) {
        visit(self);
        for child in &mut self.nodes {
            child.walk_mut(visit);
        }
    }

    /// Format the tree as a string for display.
    pub fn format_tree(&self, indent: usize) -> String {
        let prefix = "  ".repeat(indent);
        let id = self
            .node_id
            .as_ref()
            .map(|s| format!("[{}] ", s))
            .unwrap_or_default();

        let mut result = format!(
            "{}{}{} [pages {}-{}]\n",
            prefix, id, self.title, self.start_page, self.end_page
        );

        for child in &self.nodes {
            result.push_str(&child.format_tree(indent + 1));
        }

        result
    }
}

/// A non-fatal problem recorded while building a tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StructureWarning {
    /// A single-page leaf still over the token budget.
    OversizedLeaf {
        title: String,
        start_page: usize,
        end_page: usize,
        page_count: usize,
        token_count: usize,
    },
    /// A summary or description could not be generated.
    EnrichmentFailed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        field: String,
        error: String,
    },
    /// The table of contents could not be used.
    StructureFallback { reason: String },
}

/// A complete document tree (wrapper around root nodes).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct DocumentTree {
    /// Document name.
    #[serde(rename = "doc_name")]
    pub name: String,

    /// Optional document description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Total page count.
    pub total_pages: usize,

    /// Root-level nodes.
    #[serde(rename = "structure")]
    pub nodes: Vec<TreeNode>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<StructureWarning>,
}

impl DocumentTree {
    /// Create a new document tree.
    pub fn new(name: impl Into<String>, nodes: Vec<TreeNode>, total_pages: usize) -> Self {
        Self {
            name: name.into(),
            description: None,
            total_pages,
            nodes,
            warnings: Vec::new(),
        }
    }

    /// Get total node count.
    pub fn node_count(&self) -> usize {
        self.nodes.iter().map(|n| n.node_count()).sum()
    }

    /// Get maximum depth of the tree.
    pub fn max_depth(&self) -> usize {
        fn depth(node: &TreeNode) -> usize {
            if node.nodes.is_empty() {
                1
            } else {
                1 + node.nodes.iter().map(depth).max().unwrap_or(0)
            }
        }

        self.nodes.iter().map(depth).max().unwrap_or(0)
    }

    /// Find a node by title.
    pub fn find_by_title(&self, title: &str) -> Option<&TreeNode> {
        self.nodes.iter().find_map(|n| n.find_by_title(title))
    }

    /// Visit every node in preorder.
    pub fn walk<'a>(&'a self, mut visit: impl FnMut(&'a TreeNode)) {
        for node in &self.nodes {
            node.walk(&mut visit);
        }
    }

    /// Visit every node in preorder, mutably.
    pub fn walk_mut(&mut self, mut visit: impl FnMut(&mut TreeNode)) {
        for node in &mut self.nodes {
            node.walk_mut(&mut visit);
        }
    }

    /// Leaf nodes in document order.
    pub fn leaves(&self) -> Vec<&TreeNode> {
        self.nodes.iter().flat_map(|n| n.leaves()).collect()
    }

    /// Child-index paths of the leaves, in document order.
    pub fn leaf_paths(&self) -> Vec<Vec<usize>> {
        fn collect(node: &TreeNode, path: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
            if node.nodes.is_empty() {
                out.push(path.clone());
            }
            for (i, child) in node.nodes.iter().enumerate() {
                path.push(i);
                collect(child, path, out);
                path.pop();
            }
        }
        let mut out = Vec::new();
        for (i, node) in self.nodes.iter().enumerate() {
            collect(node, &mut vec![i], &mut out);
        }
        out
    }

    /// The node at a child-index path.
    pub fn node_at_mut(&mut self, path: &[usize]) -> Option<&mut TreeNode> {
        let (first, rest) = path.split_first()?;
        let mut node = self.nodes.get_mut(*first)?;
        for &i in rest {
            node = node.nodes.get_mut(i)?;
        }
        Some(node)
    }

    /// Re-derive `level` from nesting depth (after deserialization).
    pub fn assign_levels(&mut self) {
        fn assign(node: &mut TreeNode, level: usize) {
            node.level = level;
            for child in &mut node.nodes {
                assign(child, level + 1);
            }
        }
        for node in &mut self.nodes {
            assign(node, 1);
        }
    }

    /// Check page ranges and levels.
    ///
    /// Every range must lie inside the document, children must tile their
    /// parent's range in order and top-level nodes must tile the whole
    /// document. A zero-length sibling `[p, p]` may share page `p` with the
    /// sibling that follows it.
    pub fn validate(&self) -> Result<()> {
        if self.total_pages == 0 {
            return Err(PageIndexError::TreeError("document has no pages".into()));
        }
        let last = self.total_pages - 1;
        check_cover(&self.nodes, 0, last, 1, "document")?;
        for node in &self.nodes {
            check_node(node, last)?;
        }
        Ok(())
    }

    /// Format the entire tree for display.
    pub fn format(&self) -> String {
        let mut result = format!(
            "Document: {} ({} pages, {} sections)\n",
            self.name,
            self.total_pages,
            self.node_count()
        );
        if let Some(description) = &self.description {
            result.push_str(description);
            result.push('\n');
        }
        result.push_str(&"─".repeat(50));
        result.push('\n');

        for node in &self.nodes {
            result.push_str(&node.format_tree(0));
        }

        result
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| PageIndexError::Serialization(e.to_string()))
    }

    /// Parse from JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        let mut tree: Self = serde_json::from_str(json)
            .map_err(|e| PageIndexError::Serialization(e.to_string()))?;
        tree.assign_levels();
        Ok(tree)
    }
}

fn check_node(node: &TreeNode, last: usize) -> Result<()> {
    if node.start_page > node.end_page || node.end_page > last {
        return Err(PageIndexError::TreeError(format!(
            "node '{}' has invalid range [{}, {}] (last page {})",
            node.title, node.start_page, node.end_page, last
        )));
    }
    if node.has_children() {
        check_cover(
            &node.nodes,
            node.start_page,
            node.end_page,
            node.level + 1,
            &node.title,
        )?;
        for child in &node.nodes {
            check_node(child, last)?;
        }
    }
    Ok(())
}

fn check_cover(nodes: &[TreeNode], start: usize, end: usize, level: usize, owner: &str) -> Result<()> {
    let (Some(first), Some(final_node)) = (nodes.first(), nodes.last()) else {
        return Err(PageIndexError::TreeError(format!("'{}' has no sections", owner)));
    };
    if let Some(bad) = nodes.iter().find(|n| n.level != level) {
        return Err(PageIndexError::TreeError(format!(
            "node '{}' has level {} under '{}', expected {}",
            bad.title, bad.level, owner, level
        )));
    }
    if first.start_page != start || final_node.end_page != end {
        return Err(PageIndexError::TreeError(format!(
            "children of '{}' cover [{}, {}], expected [{}, {}]",
            owner, first.start_page, final_node.end_page, start, end
        )));
    }
    for pair in nodes.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        let contiguous = next.start_page == prev.end_page + 1;
        let zero_length = prev.start_page == prev.end_page && next.start_page == prev.start_page;
        if !contiguous && !zero_length {
            return Err(PageIndexError::TreeError(format!(
                "'{}' [{}, {}] and '{}' [{}, {}] are not contiguous",
                prev.title, prev.start_page, prev.end_page, next.title, next.start_page, next.end_page
            )));
        }
    }
    Ok(())
}
