//! Filling in node ids, text, summaries and the document description.
//!
//! Generator failures never fail the run: the field is left empty and an
//! [`StructureWarning::EnrichmentFailed`] is recorded on the tree.

use crate::config::IndexConfig;
use crate::document::Document;
use crate::llm::{GenerationRequest, Prompts, Retrying, Task, TextGenerator};
use crate::tree::{DocumentTree, StructureWarning, TreeNode};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

/// Number every node in preorder: "0000", "0001", ...
pub fn assign_node_ids(tree: &mut DocumentTree) {
    let mut next = 0;
    tree.walk_mut(|node| {
        node.node_id = Some(format!("{:04}", next));
        next += 1;
    });
}

/// Attach the text of the covered pages to every node.
pub fn attach_text(tree: &mut DocumentTree, document: &Document) {
    tree.walk_mut(|node| node.text = Some(document.text_range(node.start_page, node.end_page)));
}

/// Text handed to the summarizer: whole pages from the start of the node
/// while they fit the token budget, at least one page.
fn summary_input(document: &Document, start: usize, end: usize, max_tokens: usize) -> String {
    let mut tokens = 0;
    let mut last = start;
    for page in document.page_range(start, end) {
        if page.physical_index > start && tokens + page.token_count > max_tokens {
            break;
        }
        tokens += page.token_count;
        last = page.physical_index;
    }
    document.text_range(start, last)
}

/// Generate a summary for every node, preorder.
pub async fn summarize_nodes<G: TextGenerator>(
    tree: &mut DocumentTree,
    document: &Document,
    config: &IndexConfig,
    llm: &Retrying<G>,
) {
    let mut targets: Vec<(String, usize, usize)> = Vec::new();
    tree.walk(|node| targets.push((node.title.clone(), node.start_page, node.end_page)));

    let mut summaries = Vec::with_capacity(targets.len());
    for (title, start, end) in &targets {
        let (start, end) = (*start, *end);
        if document.tokens_in_range(start, end) < config.summary_token_threshold {
            let text = document.text_range(start, end);
            summaries.push(Some(text.trim().to_string()));
            continue;
        }

        let prompt = Prompts::generate_node_summary()
            .replace("{title}", title)
            .replace(
                "{content}",
                &summary_input(document, start, end, config.max_token_num_each_node),
            );
        match llm.text(&GenerationRequest::new(Task::Summary, prompt)).await {
            Ok(summary) => summaries.push(Some(summary)),
            Err(e) => {
                warn!(title = %title, error = %e, "summary generation failed");
                tree.warnings.push(StructureWarning::EnrichmentFailed {
                    title: Some(title.clone()),
                    field: "summary".to_string(),
                    error: e.to_string(),
                });
                summaries.push(None);
            }
        }
    }

    let mut summaries = summaries.into_iter();
    tree.walk_mut(|node| node.summary = summaries.next().flatten());
    debug!(nodes = targets.len(), "node summaries attached");
}

fn outline(nodes: &[TreeNode]) -> Value {
    Value::Array(
        nodes
            .iter()
            .map(|n| {
                if n.nodes.is_empty() {
                    json!({ "title": n.title })
                } else {
                    json!({ "title": n.title, "nodes": outline(&n.nodes) })
                }
            })
            .collect(),
    )
}

/// Describe the document in one sentence from its outline.
pub async fn describe_document<G: TextGenerator>(tree: &mut DocumentTree, llm: &Retrying<G>) {
    let structure = serde_json::to_string_pretty(&outline(&tree.nodes)).unwrap_or_default();
    let prompt = Prompts::generate_doc_description().replace("{structure}", &structure);
    match llm.text(&GenerationRequest::new(Task::Description, prompt)).await {
        Ok(description) => tree.description = Some(description),
        Err(e) => {
            warn!(error = %e, "document description failed");
            tree.warnings.push(StructureWarning::EnrichmentFailed {
                title: None,
                field: "description".to_string(),
                error: e.to_string(),
            });
        }
    }
}

/// Apply every enrichment the configuration asks for.
pub async fn enrich<G: TextGenerator>(
    tree: &mut DocumentTree,
    document: &Document,
    config: &IndexConfig,
    llm: &Retrying<G>,
) {
    if config.if_add_node_id {
        assign_node_ids(tree);
    }
    if config.if_add_node_text {
        attach_text(tree, document);
    }
    if config.if_add_node_summary {
        summarize_nodes(tree, document, config, llm).await;
    }
    if config.if_add_doc_description {
        describe_document(tree, llm).await;
    }
    info!(
        nodes = tree.node_count(),
        warnings = tree.warnings.len(),
        "tree enriched"
    );
}
