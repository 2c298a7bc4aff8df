use std::collections::VecDeque;

use famshield_common::ScreenNode;

pub const DEFAULT_MAX_NODES: usize = 500;

/// Collect visible text from a screen tree.
///
/// Walks breadth-first, visiting at most `max_nodes` nodes, and joins every
/// non-blank text and content description with single spaces.
pub fn extract_text(root: &ScreenNode, max_nodes: usize) -> String {
    let mut parts: Vec<&str> = Vec::new();
    let mut queue = VecDeque::from([root]);
    let mut visited = 0;

    while let Some(node) = queue.pop_front() {
        if visited >= max_nodes {
            break;
        }
        visited += 1;

        for value in [node.text.as_deref(), node.content_description.as_deref()].into_iter().flatten()
        {
            let value = value.trim();
            if !value.is_empty() {
                parts.push(value);
            }
        }

        queue.extend(node.children.iter());
    }

    parts.join(" ")
}
