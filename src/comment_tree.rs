use std::collections::HashMap;
use thiserror::Error;

use crate::models::{CommentNode, CommentRecord};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommentTreeError {
    #[error("comment {id} is part of a reply cycle")]
    Cycle { id: String },
}

/// Nests a flat, chronologically ordered comment list into reply trees.
///
/// A comment whose parent id is empty or unknown becomes a root. Reply lists
/// keep input order. Comments that can only reach each other through parent
/// links (a cycle) are rejected rather than silently dropped.
pub fn build_comment_tree(records: Vec<CommentRecord>) -> Result<Vec<CommentNode>, CommentTreeError> {
    let mut index_by_id: HashMap<&str, usize> = HashMap::with_capacity(records.len());
    for (i, record) in records.iter().enumerate() {
        index_by_id.entry(record.id.as_str()).or_insert(i);
    }

    let mut roots = Vec::new();
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); records.len()];
    for (i, record) in records.iter().enumerate() {
        let parent = record
            .parent_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .and_then(|id| index_by_id.get(id).copied());

        match parent {
            Some(p) => children[p].push(i),
            None => roots.push(i),
        }
    }

    // Preorder walk from the roots. Every node reachable from a root is
    // visited exactly once; anything left over hangs off a cycle.
    let mut order = Vec::with_capacity(records.len());
    let mut stack: Vec<usize> = roots.iter().rev().copied().collect();
    while let Some(i) = stack.pop() {
        order.push(i);
        stack.extend(children[i].iter().rev().copied());
    }

    if order.len() != records.len() {
        let mut visited = vec![false; records.len()];
        for &i in &order {
            visited[i] = true;
        }
        let id = visited
            .iter()
            .position(|seen| !seen)
            .map(|i| records[i].id.clone())
            .unwrap_or_default();
        return Err(CommentTreeError::Cycle { id });
    }

    drop(index_by_id);
    let mut slots: Vec<Option<CommentNode>> = records.into_iter().map(|r| Some(CommentNode::from(r))).collect();

    // Children always follow their parent in preorder, so walking it backwards
    // finishes every reply list before its parent is assembled.
    for &i in order.iter().rev() {
        let replies: Vec<CommentNode> = children[i].iter().filter_map(|&c| slots[c].take()).collect();
        if let Some(node) = slots[i].as_mut() {
            node.replies = replies;
        }
    }

    Ok(roots.iter().filter_map(|&r| slots[r].take()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(id: &str, parent: Option<&str>) -> CommentRecord {
        CommentRecord {
            id: id.to_string(),
            post_id: "post".to_string(),
            parent_id: parent.map(str::to_string),
            content: format!("comment {}", id),
            author_name: "reader".to_string(),
            author_email: "reader@example.com".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn ids(nodes: &[CommentNode]) -> Vec<&str> {
        nodes.iter().map(|n| n.record.id.as_str()).collect()
    }

    #[test]
    fn replies_keep_submission_order() {
        let tree = build_comment_tree(vec![
            record("1", None),
            record("2", Some("1")),
            record("3", Some("1")),
        ])
        .unwrap();

        assert_eq!(ids(&tree), vec!["1"]);
        assert_eq!(ids(&tree[0].replies), vec!["2", "3"]);
    }

    #[test]
    fn dangling_parent_becomes_root() {
        let tree = build_comment_tree(vec![record("1", None), record("2", Some("missing"))]).unwrap();
        assert_eq!(ids(&tree), vec!["1", "2"]);
        assert!(tree.iter().all(|n| n.replies.is_empty()));
    }

    #[test]
    fn empty_parent_id_is_a_root() {
        let tree = build_comment_tree(vec![record("1", Some("")), record("2", Some("1"))]).unwrap();
        assert_eq!(ids(&tree), vec!["1"]);
        assert_eq!(ids(&tree[0].replies), vec!["2"]);
    }

    #[test]
    fn reply_may_precede_its_parent_in_input() {
        let tree = build_comment_tree(vec![record("2", Some("1")), record("1", None)]).unwrap();
        assert_eq!(ids(&tree), vec!["1"]);
        assert_eq!(ids(&tree[0].replies), vec!["2"]);
    }

    #[test]
    fn nests_multiple_levels() {
        let tree = build_comment_tree(vec![
            record("a", None),
            record("b", Some("a")),
            record("c", Some("b")),
            record("d", None),
            record("e", Some("c")),
        ])
        .unwrap();

        assert_eq!(ids(&tree), vec!["a", "d"]);
        let b = &tree[0].replies[0];
        assert_eq!(ids(&b.replies), vec!["c"]);
        assert_eq!(ids(&b.replies[0].replies), vec!["e"]);
        assert_eq!(tree[0].descendant_count(), 3);
    }

    #[test]
    fn deep_chain_does_not_overflow() {
        let mut records = vec![record("0", None)];
        for i in 1..2_000 {
            records.push(record(&i.to_string(), Some(&(i - 1).to_string())));
        }
        let tree = build_comment_tree(records).unwrap();
        assert_eq!(tree.len(), 1);

        let mut depth = 0;
        let mut node = &tree[0];
        while let Some(next) = node.replies.first() {
            node = next;
            depth += 1;
        }
        assert_eq!(depth, 1_999);
    }

    #[test]
    fn cycle_fails_closed() {
        let err = build_comment_tree(vec![
            record("root", None),
            record("x", Some("y")),
            record("y", Some("x")),
        ])
        .unwrap_err();
        assert_eq!(err, CommentTreeError::Cycle { id: "x".to_string() });
    }

    #[test]
    fn self_parent_is_a_cycle() {
        let err = build_comment_tree(vec![record("1", Some("1"))]).unwrap_err();
        assert_eq!(err, CommentTreeError::Cycle { id: "1".to_string() });
    }

    #[test]
    fn empty_input_gives_empty_forest() {
        assert!(build_comment_tree(Vec::new()).unwrap().is_empty());
    }
}
