//! End-to-end runs of the structuring pipeline with scripted generators.

use pageindex::config::PageMethod;
use pageindex::llm::{GenerationRequest, Task};
use pageindex::tokenizer::HeuristicTokenizer;
use pageindex::{
    DisabledGenerator, Document, DocumentTree, FnGenerator, IndexConfig, PageIndexError,
    TreeIndexer, TreeNode,
};
use serde_json::json;

fn config() -> IndexConfig {
    IndexConfig {
        if_add_doc_description: false,
        retry_backoff_ms: 0,
        ..IndexConfig::default()
    }
}

/// A guide whose printed page 1 is physical page 3.
fn guide() -> Document {
    let toc = [
        "Contents",
        "1 Getting Started ........ 1",
        "1.1 Installation ........ 2",
        "1.2 First Run ........ 4",
        "2 Reference ........ 6",
        "2.1 Commands ........ 6",
        "2.2 Options ........ 9",
        "3 Appendix ........ 11",
    ]
    .join("\n");

    let mut pages = vec![
        "User Guide".to_string(),
        toc,
        "Foreword\nthanks to everyone who helped".to_string(),
    ];
    for physical in 3..15 {
        let text = match physical {
            3 => "1 Getting Started\nwhat this guide covers".to_string(),
            4 => "1.1 Installation\ndownload the archive".to_string(),
            6 => "1.2 First Run\nstart the program".to_string(),
            8 => "2 Reference\n2.1 Commands\nevery command in turn".to_string(),
            11 => "2.2 Options\nflags and settings".to_string(),
            13 => "3 Appendix\nlicense terms".to_string(),
            n => format!("continued discussion on page {}", n),
        };
        pages.push(text);
    }
    Document::from_page_texts("guide", pages, &HeuristicTokenizer::default()).unwrap()
}

/// Every node sits inside its parent, siblings are contiguous and each
/// child is one level below its parent.
fn assert_well_formed(tree: &DocumentTree) {
    fn check(nodes: &[TreeNode], level: usize) {
        for node in nodes {
            assert_eq!(node.level, level, "level of {}", node.title);
            assert!(node.start_page <= node.end_page, "range of {}", node.title);
            for child in &node.nodes {
                assert!(child.start_page >= node.start_page && child.end_page <= node.end_page);
            }
            check(&node.nodes, level + 1);
        }
    }
    tree.validate().unwrap();
    check(&tree.nodes, 1);
    assert_eq!(tree.nodes.first().unwrap().start_page, 0);
    assert_eq!(tree.nodes.last().unwrap().end_page, tree.total_pages - 1);
}

fn ranges(nodes: &[TreeNode]) -> Vec<(&str, usize, usize)> {
    nodes
        .iter()
        .map(|n| (n.title.as_str(), n.start_page, n.end_page))
        .collect()
}

#[tokio::test]
async fn test_toc_offset_maps_to_physical_pages() {
    let tree = TreeIndexer::new(DisabledGenerator, config())
        .index(&guide())
        .await
        .unwrap();

    assert_well_formed(&tree);
    assert!(tree.warnings.is_empty());
    assert_eq!(
        ranges(&tree.nodes),
        vec![
            ("Preface", 0, 2),
            ("1 Getting Started", 3, 7),
            ("2 Reference", 8, 12),
            ("3 Appendix", 13, 14),
        ]
    );
    assert_eq!(
        ranges(&tree.nodes[1].nodes),
        vec![
            ("1 Getting Started (preface)", 3, 3),
            ("1.1 Installation", 4, 5),
            ("1.2 First Run", 6, 7),
        ]
    );
    assert_eq!(
        ranges(&tree.nodes[2].nodes),
        vec![("2.1 Commands", 8, 10), ("2.2 Options", 11, 12)]
    );
}

#[tokio::test]
async fn test_indexing_is_deterministic() {
    let document = guide();
    let generator = || {
        FnGenerator(|req: &GenerationRequest| match req.task {
            Task::Description => Ok("A guide to installing and using a tool.".to_string()),
            _ => Err(PageIndexError::LlmApi("unexpected request".into())),
        })
    };
    let config = IndexConfig {
        if_add_doc_description: true,
        ..config()
    };

    let first = TreeIndexer::new(generator(), config.clone())
        .index(&document)
        .await
        .unwrap();
    let second = TreeIndexer::new(generator(), config)
        .index(&document)
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(
        first.description.as_deref(),
        Some("A guide to installing and using a tool.")
    );
    assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
}

#[tokio::test]
async fn test_node_ids_and_summaries_in_output() {
    let config = IndexConfig {
        if_add_node_summary: true,
        ..config()
    };
    let tree = TreeIndexer::new(DisabledGenerator, config)
        .index(&guide())
        .await
        .unwrap();

    // every node is short enough to be its own summary
    let mut ids = Vec::new();
    tree.walk(|node| {
        assert!(node.summary.is_some(), "summary of {}", node.title);
        ids.push(node.node_id.clone().unwrap());
    });
    assert_eq!(ids.first().map(String::as_str), Some("0000"));
    assert_eq!(ids.len(), tree.node_count());
    assert!(tree.warnings.is_empty());

    let value: serde_json::Value = serde_json::from_str(&tree.to_json().unwrap()).unwrap();
    assert_eq!(value["doc_name"], "guide");
    assert_eq!(value["total_pages"], 15);
    assert!(value["structure"][1]["summary"].is_string());
    assert!(value.get("warnings").is_none());
}

#[tokio::test]
async fn test_summaries_off_leave_no_summary_key() {
    let tree = TreeIndexer::new(DisabledGenerator, config())
        .index(&guide())
        .await
        .unwrap();

    let json = tree.to_json().unwrap();
    assert!(!json.contains("\"summary\""));
    assert!(!json.contains("\"text\""));
    assert!(!json.contains("\"level\""));
    assert!(json.contains("\"node_id\": \"0000\""));
}

#[tokio::test]
async fn test_long_leaf_split_into_parts() {
    let pages: Vec<String> = (0..46).map(|i| format!("page {} filler", i)).collect();
    let document = Document::from_page_texts("scan", pages, &HeuristicTokenizer::default()).unwrap();

    let generator = FnGenerator(|req: &GenerationRequest| match req.task {
        Task::TocDetection => Ok(r#"{"thinking": "plain text", "toc_detected": "no"}"#.to_string()),
        Task::HeadingInference if req.prompt.contains("<physical_index_0>") => Ok(json!([
            {"structure": "1", "title": "Cover", "physical_index": "<physical_index_0>"},
            {"structure": "2", "title": "Body", "physical_index": "<physical_index_1>"}
        ])
        .to_string()),
        Task::HeadingInference => Ok("[]".to_string()),
        _ => Err(PageIndexError::LlmApi("unexpected request".into())),
    });
    let config = IndexConfig {
        max_page_num_each_node: 20,
        split_with_headings: false,
        ..config()
    };

    let tree = TreeIndexer::new(generator, config)
        .index(&document)
        .await
        .unwrap();

    assert_well_formed(&tree);
    assert_eq!(ranges(&tree.nodes), vec![("Cover", 0, 0), ("Body", 1, 45)]);
    assert_eq!(
        ranges(&tree.nodes[1].nodes),
        vec![
            ("Body (part 1)", 1, 20),
            ("Body (part 2)", 21, 40),
            ("Body (part 3)", 41, 45),
        ]
    );
    for leaf in tree.leaves() {
        assert!(leaf.page_span() <= 20);
    }
}

#[tokio::test]
async fn test_text_without_toc_uses_inferred_headings() {
    let text = format!(
        "Chapter 1\n{}\nChapter 2\n{}",
        "alpha beta gamma delta. ".repeat(200),
        "epsilon zeta eta theta. ".repeat(200)
    );
    let config = IndexConfig {
        txt_page_method: PageMethod::Char,
        txt_chars_per_page: 2048,
        txt_chunk_overlap: 5,
        ..config()
    };
    let document =
        Document::from_text("notes", &text, &config, &HeuristicTokenizer::default()).unwrap();

    assert_eq!(document.reconstruct_text(), text);
    assert_eq!(document.pages[1].overlap, 5);

    let second = document
        .pages
        .iter()
        .find(|p| p.text.contains("Chapter 2"))
        .map(|p| p.physical_index)
        .unwrap();
    let heading = format!("<physical_index_{}>", second);
    let generator = FnGenerator(move |req: &GenerationRequest| match req.task {
        Task::TocDetection => Ok(r#"{"thinking": "prose", "toc_detected": "no"}"#.to_string()),
        Task::HeadingInference => {
            let mut found = Vec::new();
            if req.prompt.contains("Chapter 1\n") {
                found.push(json!({"structure": "1", "title": "Chapter 1", "physical_index": "<physical_index_0>"}));
            }
            if req.prompt.contains("Chapter 2\n") {
                found.push(json!({"structure": "2", "title": "Chapter 2", "physical_index": heading}));
            }
            Ok(serde_json::Value::Array(found).to_string())
        }
        _ => Err(PageIndexError::LlmApi("unexpected request".into())),
    });

    let tree = TreeIndexer::new(generator, config)
        .index(&document)
        .await
        .unwrap();

    assert_well_formed(&tree);
    assert_eq!(
        ranges(&tree.nodes),
        vec![
            ("Chapter 1", 0, second - 1),
            ("Chapter 2", second, document.last_page()),
        ]
    );
}

#[tokio::test]
async fn test_no_toc_and_no_generator_covers_document() {
    let pages: Vec<String> = (0..6).map(|i| format!("meeting minutes, sheet {}", i)).collect();
    let document = Document::from_page_texts("minutes", pages, &HeuristicTokenizer::default()).unwrap();

    let tree = TreeIndexer::new(DisabledGenerator, config())
        .index(&document)
        .await
        .unwrap();

    assert_well_formed(&tree);
    assert_eq!(ranges(&tree.nodes), vec![("minutes", 0, 5)]);
}
