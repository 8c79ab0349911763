use super::*;
use crate::document::StaticDocument;
use crate::geometry::Rect;

fn sections(n: usize) -> (StaticDocument, Vec<NodeId>) {
    let mut doc = StaticDocument::new("https://site/page", Rect::new(0.0, 0.0, 800.0, 600.0));
    let root = doc.root();
    let mut nodes = Vec::new();
    for i in 0..n {
        let offset = f64::from(u32::try_from(i).unwrap_or(0)) * 10.0;
        nodes.push(doc.append(root, "section", Rect::new(0.0, offset, 800.0, 10.0)));
        // Interleave a different tag so indices are per-type, not per-child.
        doc.append(root, "div", Rect::new(0.0, offset, 1.0, 1.0));
    }
    (doc, nodes)
}

// --- resolve ---

#[test]
fn resolve_prefers_identifier() {
    let mut doc = StaticDocument::new("loc", Rect::default());
    let root = doc.root();
    let boxed = doc.append_with_id(root, "div", "box", Rect::default());
    assert_eq!(resolve(&doc, boxed).expect("path"), "#box");
}

#[test]
fn resolve_ignores_empty_identifier() {
    let mut doc = StaticDocument::new("loc", Rect::default());
    let root = doc.root();
    let node = doc.append_with_id(root, "div", "", Rect::default());
    assert_eq!(resolve(&doc, node).expect("path"), "body > div:nth-of-type(1)");
}

#[test]
fn resolve_root_is_bare_marker() {
    let doc = StaticDocument::new("loc", Rect::default());
    assert_eq!(resolve(&doc, doc.root()).expect("path"), "body");
}

#[test]
fn resolve_builds_root_to_leaf_path() {
    let mut doc = StaticDocument::new("loc", Rect::default());
    let root = doc.root();
    doc.append(root, "section", Rect::default());
    let second = doc.append(root, "section", Rect::default());
    doc.append(second, "p", Rect::default());
    doc.append(second, "span", Rect::default());
    let para = doc.append(second, "p", Rect::default());
    assert_eq!(
        resolve(&doc, para).expect("path"),
        "body > section:nth-of-type(2) > p:nth-of-type(2)"
    );
}

#[test]
fn resolve_same_tag_siblings_get_indices_one_to_n() {
    let (doc, nodes) = sections(5);
    let paths: Vec<String> = nodes.iter().map(|n| resolve(&doc, *n).expect("path")).collect();
    let expected: Vec<String> = (1..=5).map(|k| format!("body > section:nth-of-type({k})")).collect();
    assert_eq!(paths, expected);
}

#[test]
fn resolve_is_deterministic() {
    let (doc, nodes) = sections(3);
    assert_eq!(resolve(&doc, nodes[1]), resolve(&doc, nodes[1]));
}

#[test]
fn resolve_detached_node_fails() {
    let mut doc = StaticDocument::new("loc", Rect::default());
    let root = doc.root();
    let parent = doc.append(root, "div", Rect::default());
    let child = doc.append(parent, "span", Rect::default());
    doc.detach(parent);
    assert_eq!(resolve(&doc, child), Err(AnchorError::PathConstruction(child)));
}

#[test]
fn resolve_unknown_node_fails() {
    let doc = StaticDocument::new("loc", Rect::default());
    assert_eq!(resolve(&doc, NodeId(99)), Err(AnchorError::PathConstruction(NodeId(99))));
}

// --- locate ---

#[test]
fn locate_inverts_resolve() {
    let (doc, nodes) = sections(4);
    for node in nodes {
        let path = resolve(&doc, node).expect("path");
        assert_eq!(locate(&doc, &path), Ok(node));
    }
}

#[test]
fn locate_identifier() {
    let mut doc = StaticDocument::new("loc", Rect::default());
    let root = doc.root();
    let boxed = doc.append_with_id(root, "div", "box", Rect::default());
    assert_eq!(locate(&doc, "#box"), Ok(boxed));
    assert_eq!(locate(&doc, "#nope"), Err(AnchorError::NotFound("#nope".to_owned())));
}

#[test]
fn locate_root_marker() {
    let doc = StaticDocument::new("loc", Rect::default());
    assert_eq!(locate(&doc, "body"), Ok(doc.root()));
}

#[test]
fn locate_missing_index_is_not_found() {
    let (doc, _) = sections(2);
    assert!(matches!(locate(&doc, "body > section:nth-of-type(3)"), Err(AnchorError::NotFound(_))));
}

#[test]
fn locate_rejects_malformed_paths() {
    let (doc, _) = sections(2);
    for path in [
        "",
        "#",
        "html > section:nth-of-type(1)",
        "body > section:nth-of-type(0)",
        "body > section:nth-of-type(-1)",
        "body > section:nth-of-type(x)",
        "body > section",
        "body > :nth-of-type(1)",
        "body>section:nth-of-type(1)",
    ] {
        assert!(matches!(locate(&doc, path), Err(AnchorError::NotFound(_))), "path {path:?}");
    }
}

#[test]
fn locate_survives_layout_differences() {
    let (sender, nodes) = sections(3);
    let path = resolve(&sender, nodes[2]).expect("path");

    // Same structure, different layout.
    let mut receiver = StaticDocument::new("https://site/page", Rect::new(0.0, 0.0, 320.0, 2000.0));
    let root = receiver.root();
    let mut expected = None;
    for i in 0..3 {
        let node = receiver.append(root, "section", Rect::new(0.0, 500.0, 320.0, 500.0));
        receiver.append(root, "div", Rect::default());
        if i == 2 {
            expected = Some(node);
        }
    }
    assert_eq!(locate(&receiver, &path).ok(), expected);
}
