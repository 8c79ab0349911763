//! Anchor resolution: portable structural paths for document nodes.
//!
//! A path is either `#<id>` for a node carrying an identifier, or the root
//! marker followed by one `tag:nth-of-type(k)` segment per level, joined with
//! ` > `, for example `body > section:nth-of-type(2) > p:nth-of-type(1)`.
//! `k` is the 1-based index of the node among its same-tag siblings.
//!
//! [`resolve`] and [`locate`] are inverses on any single document, and a path
//! produced on one client re-resolves on another client rendering the same
//! page even when its layout differs.

#[cfg(test)]
#[path = "anchor_test.rs"]
mod anchor_test;

use crate::document::{Document, NodeId};

/// Separator between path segments.
pub const SEGMENT_SEPARATOR: &str = " > ";

/// Deepest ancestor chain walked before giving up.
const MAX_DEPTH: usize = 4096;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AnchorError {
    /// The node's ancestor chain does not reach the document root.
    #[error("node {0:?} is not attached to the document root")]
    PathConstruction(NodeId),
    /// No node matches the path.
    #[error("no node matches anchor path {0:?}")]
    NotFound(String),
}

/// Build the structural path of `node`.
///
/// # Errors
///
/// Returns [`AnchorError::PathConstruction`] when `node` is detached or
/// unknown to `doc`.
pub fn resolve(doc: &dyn Document, node: NodeId) -> Result<String, AnchorError> {
    if let Some(id) = doc.element_id(node).filter(|id| !id.is_empty()) {
        return Ok(format!("#{id}"));
    }

    let root = doc.root();
    let mut segments = Vec::new();
    let mut current = node;
    while current != root {
        if segments.len() >= MAX_DEPTH {
            return Err(AnchorError::PathConstruction(node));
        }
        let parent = doc.parent(current).ok_or(AnchorError::PathConstruction(node))?;
        let tag = doc.tag(current).ok_or(AnchorError::PathConstruction(node))?;
        let index = nth_of_type(doc, parent, current, &tag).ok_or(AnchorError::PathConstruction(node))?;
        segments.push(format!("{tag}:nth-of-type({index})"));
        current = parent;
    }

    let marker = doc.tag(root).ok_or(AnchorError::PathConstruction(node))?;
    segments.push(marker);
    segments.reverse();
    Ok(segments.join(SEGMENT_SEPARATOR))
}

/// 1-based position of `node` among the children of `parent` sharing `tag`.
fn nth_of_type(doc: &dyn Document, parent: NodeId, node: NodeId, tag: &str) -> Option<usize> {
    let mut index = 0;
    for sibling in doc.children(parent) {
        if doc.tag(sibling).as_deref() == Some(tag) {
            index += 1;
            if sibling == node {
                return Some(index);
            }
        }
    }
    None
}

/// Find the node a structural path points at.
///
/// # Errors
///
/// Returns [`AnchorError::NotFound`] when no node matches or the path is
/// malformed.
pub fn locate(doc: &dyn Document, path: &str) -> Result<NodeId, AnchorError> {
    let not_found = || AnchorError::NotFound(path.to_owned());

    if let Some(id) = path.strip_prefix('#') {
        if id.is_empty() {
            return Err(not_found());
        }
        return doc.element_by_id(id).ok_or_else(not_found);
    }

    let mut segments = path.split(SEGMENT_SEPARATOR);
    let root = doc.root();
    let marker = segments.next().ok_or_else(not_found)?;
    if doc.tag(root).as_deref() != Some(marker) {
        return Err(not_found());
    }

    let mut current = root;
    for segment in segments {
        let (tag, index) = parse_segment(segment).ok_or_else(not_found)?;
        current = doc
            .children(current)
            .into_iter()
            .filter(|child| doc.tag(*child).as_deref() == Some(tag))
            .nth(index - 1)
            .ok_or_else(not_found)?;
    }
    Ok(current)
}

/// Split `tag:nth-of-type(k)` into its tag and `k`. Rejects `k == 0`.
fn parse_segment(segment: &str) -> Option<(&str, usize)> {
    let (tag, rest) = segment.split_once(":nth-of-type(")?;
    let digits = rest.strip_suffix(')')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let Ok(index) = digits.parse::<usize>() else {
        return None;
    };
    if tag.is_empty() || index == 0 {
        return None;
    }
    Some((tag, index))
}
