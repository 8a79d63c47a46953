//! Building the node tree from leveled, resolved TOC entries.

use crate::error::{PageIndexError, Result};
use crate::toc::TocEntry;
use crate::toc::matching::normalize;
use crate::tree::TreeNode;
use tracing::debug;

/// Reject entry lists whose levels do not form a tree.
fn check_levels(entries: &[TocEntry]) -> Result<()> {
    let Some(first) = entries.first() else {
        return Err(PageIndexError::MalformedToc("no entries".to_string()));
    };
    if first.level != 1 {
        return Err(PageIndexError::MalformedToc(format!(
            "first entry '{}' has level {}",
            first.title, first.level
        )));
    }
    if let Some(pair) = entries
        .windows(2)
        .find(|w| w[1].level == 0 || w[1].level > w[0].level + 1)
    {
        return Err(PageIndexError::MalformedToc(format!(
            "'{}' jumps from level {} to {}",
            pair[1].title, pair[0].level, pair[1].level
        )));
    }
    Ok(())
}

/// Clamp levels so the list starts at 1 and never jumps by more than one.
pub fn normalize_levels(entries: &mut [TocEntry]) {
    let mut previous = 0;
    for entry in entries.iter_mut() {
        entry.level = entry.level.clamp(1, previous + 1);
        previous = entry.level;
    }
}

fn is_leaf(entries: &[TocEntry], i: usize) -> bool {
    entries.get(i + 1).is_none_or(|next| next.level <= entries[i].level)
}

/// Give every entry a page inside the document, in non-decreasing order.
fn place_entries(mut entries: Vec<TocEntry>, last_page: usize) -> Vec<TocEntry> {
    // entries without a page start where the next located entry does
    let mut next_page = None;
    for entry in entries.iter_mut().rev() {
        match entry.resolved_physical_page {
            Some(p) => next_page = Some(p),
            None => entry.resolved_physical_page = next_page,
        }
    }
    let mut previous_page = None;
    for entry in entries.iter_mut() {
        match entry.resolved_physical_page {
            Some(p) => previous_page = Some(p),
            None => entry.resolved_physical_page = Some(previous_page.unwrap_or(0)),
        }
    }
    let page = |e: &TocEntry| e.resolved_physical_page.unwrap_or(0).min(last_page);

    // unverified leaves that break page order are absorbed by their neighbour
    let mut kept: Vec<TocEntry> = Vec::with_capacity(entries.len());
    for i in 0..entries.len() {
        let p = page(&entries[i]);
        if entries[i].is_low_confidence() && is_leaf(&entries, i) {
            let before = kept.last().is_some_and(|prev| p < page(prev));
            let after = entries[i + 1..]
                .iter()
                .find(|e| e.verified)
                .is_some_and(|next| p > page(next));
            if before || after {
                debug!(title = %entries[i].title, page = p, "dropping out-of-order entry");
                continue;
            }
        }
        kept.push(entries[i].clone());
    }

    // same page, same title: keep the first
    let mut result: Vec<TocEntry> = Vec::with_capacity(kept.len());
    let mut floor = 0;
    for i in 0..kept.len() {
        let p = page(&kept[i]).max(floor);
        let duplicate = result
            .iter()
            .rev()
            .take_while(|prev| prev.resolved_physical_page == Some(p))
            .any(|prev| {
                normalize(&prev.title) == normalize(&kept[i].title)
                    && (prev.level == kept[i].level || is_leaf(&kept, i))
            });
        if duplicate {
            debug!(title = %kept[i].title, page = p, "dropping duplicate entry");
            continue;
        }
        let mut entry = kept[i].clone();
        entry.resolved_physical_page = Some(p);
        floor = p;
        result.push(entry);
    }
    result
}

/// Build the top-level nodes covering pages `[0, last_page]`.
///
/// Entries must carry levels starting at 1 and deepening one step at a
/// time; otherwise the TOC is reported as malformed.
pub fn build_tree(entries: Vec<TocEntry>, last_page: usize) -> Result<Vec<TreeNode>> {
    check_levels(&entries)?;
    let entries = place_entries(entries, last_page);
    Ok(build_nodes(&entries, 0, last_page, 1, None))
}

/// Build the nodes for `entries` (all at `level` or deeper) covering
/// `[range_start, range_end]`.
pub fn build_nodes(
    entries: &[TocEntry],
    range_start: usize,
    range_end: usize,
    level: usize,
    parent: Option<&str>,
) -> Vec<TreeNode> {
    let page = |e: &TocEntry| {
        e.resolved_physical_page
            .unwrap_or(range_start)
            .clamp(range_start, range_end)
    };

    // each group is one entry at `level` plus its deeper followers
    let heads: Vec<usize> = entries
        .iter()
        .enumerate()
        .filter(|(_, e)| e.level <= level)
        .map(|(i, _)| i)
        .collect();

    let mut nodes = Vec::with_capacity(heads.len() + 1);
    if let Some(&first) = heads.first() {
        let first_page = page(&entries[first]);
        if first_page > range_start {
            let title = match parent {
                Some(parent) => format!("{} (preface)", parent),
                None => "Preface".to_string(),
            };
            nodes.push(TreeNode::new(title, level, range_start, first_page - 1));
        }
    }

    for (k, &head) in heads.iter().enumerate() {
        let entry = &entries[head];
        let start = page(entry);
        let (end, group_end) = match heads.get(k + 1) {
            Some(&next) => {
                let next_start = page(&entries[next]);
                (if next_start > start { next_start - 1 } else { start }, next)
            }
            None => (range_end, entries.len()),
        };

        let mut node = TreeNode::new(entry.title.clone(), level, start, end);
        let children = &entries[head + 1..group_end];
        if !children.is_empty() {
            node.nodes = build_nodes(children, start, end, level + 1, Some(&entry.title));
        }
        nodes.push(node);
    }
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::DocumentTree;

    fn at(title: &str, level: usize, page: usize) -> TocEntry {
        TocEntry::located(title, level, page)
    }

    fn ranges(nodes: &[TreeNode]) -> Vec<(&str, usize, usize)> {
        nodes
            .iter()
            .map(|n| (n.title.as_str(), n.start_page, n.end_page))
            .collect()
    }

    fn valid(nodes: Vec<TreeNode>, last_page: usize) -> Vec<TreeNode> {
        let tree = DocumentTree::new("doc", nodes, last_page + 1);
        tree.validate().unwrap();
        tree.nodes
    }

    #[test]
    fn test_nested_ranges_with_preface() {
        let entries = vec![
            at("Introduction", 1, 2),
            at("Background", 2, 2),
            at("Scope", 2, 5),
            at("Methods", 1, 8),
        ];
        let nodes = valid(build_tree(entries, 11).unwrap(), 11);
        assert_eq!(
            ranges(&nodes),
            vec![("Preface", 0, 1), ("Introduction", 2, 7), ("Methods", 8, 11)]
        );
        assert_eq!(ranges(&nodes[1].nodes), vec![("Background", 2, 4), ("Scope", 5, 7)]);
        assert_eq!(nodes[1].nodes[0].level, 2);
    }

    #[test]
    fn test_nested_preface_covers_gap_before_first_child() {
        let entries = vec![at("Part One", 1, 0), at("Chapter 1", 2, 3), at("Part Two", 1, 6)];
        let nodes = valid(build_tree(entries, 9).unwrap(), 9);
        assert_eq!(
            ranges(&nodes[0].nodes),
            vec![("Part One (preface)", 0, 2), ("Chapter 1", 3, 5)]
        );
    }

    #[test]
    fn test_same_page_entries() {
        let entries = vec![
            at("Foreword", 1, 0),
            at("Dedication", 1, 0),
            at("dedication", 1, 0),
            at("Chapter 1", 1, 0),
            at("Chapter 2", 1, 3),
        ];
        let nodes = valid(build_tree(entries, 5).unwrap(), 5);
        assert_eq!(
            ranges(&nodes),
            vec![
                ("Foreword", 0, 0),
                ("Dedication", 0, 0),
                ("Chapter 1", 0, 2),
                ("Chapter 2", 3, 5)
            ]
        );
    }

    #[test]
    fn test_repeat_further_down_the_same_page_is_dropped() {
        let entries = vec![at("A", 1, 0), at("B", 1, 0), at("A", 1, 0), at("C", 1, 2)];
        let nodes = valid(build_tree(entries, 4).unwrap(), 4);
        assert_eq!(
            ranges(&nodes),
            vec![("A", 0, 0), ("B", 0, 1), ("C", 2, 4)]
        );
    }

    #[test]
    fn test_level_jump_is_malformed() {
        let entries = vec![at("Intro", 1, 0), at("Deep", 3, 1)];
        assert!(matches!(build_tree(entries, 3), Err(PageIndexError::MalformedToc(_))));

        let entries = vec![at("Starts deep", 2, 0)];
        assert!(matches!(build_tree(entries, 3), Err(PageIndexError::MalformedToc(_))));

        assert!(build_tree(Vec::new(), 3).is_err());
    }

    #[test]
    fn test_out_of_order_unverified_leaf_is_dropped() {
        let mut misplaced = TocEntry::new("Stray", 1, None);
        misplaced.resolved_physical_page = Some(9);
        let entries = vec![at("A", 1, 2), misplaced, at("C", 1, 5), at("D", 1, 7)];
        let nodes = valid(build_tree(entries, 10).unwrap(), 10);
        assert_eq!(
            ranges(&nodes),
            vec![("Preface", 0, 1), ("A", 2, 4), ("C", 5, 6), ("D", 7, 10)]
        );
    }

    #[test]
    fn test_pages_are_filled_and_clamped() {
        let unplaced = TocEntry::new("Part One", 1, None);
        let entries = vec![unplaced, at("Chapter 1", 2, 1), at("Appendix", 1, 50)];
        let nodes = valid(build_tree(entries, 6).unwrap(), 6);
        assert_eq!(
            ranges(&nodes),
            vec![("Preface", 0, 0), ("Part One", 1, 5), ("Appendix", 6, 6)]
        );
        assert_eq!(ranges(&nodes[1].nodes), vec![("Chapter 1", 1, 5)]);
    }

    #[test]
    fn test_normalize_levels() {
        let mut entries = vec![at("a", 2, 0), at("b", 4, 1), at("c", 1, 2), at("d", 3, 3)];
        normalize_levels(&mut entries);
        let levels: Vec<usize> = entries.iter().map(|e| e.level).collect();
        assert_eq!(levels, vec![1, 2, 1, 2]);
        assert!(build_tree(entries, 4).is_ok());
    }
}
