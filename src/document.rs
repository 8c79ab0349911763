//! Document capability: the read-only view of a page that the engine queries.
//!
//! SYSTEM CONTEXT
//! ==============
//! The anchor resolver, the position encoder and the remote cursor renderer
//! never touch a concrete page model. They go through [`Document`], which a
//! host implements over whatever tree it has (a browser DOM bridge, a
//! headless layout, a test fixture). [`StaticDocument`] is the in-memory
//! implementation used by the CLI and the test suite.
//!
//! Coordinates: bounding boxes are viewport-relative; [`Document::scroll_offset`]
//! converts them to page space.

#[cfg(test)]
#[path = "document_test.rs"]
mod document_test;

use std::cell::RefCell;

use serde::{Deserialize, Serialize};

use crate::geometry::{Point, Rect};

/// Tag given to the root node of a [`StaticDocument`].
pub const ROOT_TAG: &str = "body";

/// Opaque handle to a node of a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub usize);

/// Read-only structural and layout queries over a page.
pub trait Document {
    /// Location (URL) of the page currently shown.
    fn location(&self) -> String;

    /// The root element. Every attached node has it as an ancestor.
    fn root(&self) -> NodeId;

    /// Parent of `node`, or `None` for the root and for detached nodes.
    fn parent(&self, node: NodeId) -> Option<NodeId>;

    /// Children of `node` in document order.
    fn children(&self, node: NodeId) -> Vec<NodeId>;

    /// Element tag, or `None` for an unknown node.
    fn tag(&self, node: NodeId) -> Option<String>;

    /// Element identifier attribute, if any.
    fn element_id(&self, node: NodeId) -> Option<String>;

    /// Viewport-relative bounding box, or `None` for an unknown node.
    fn bounding_box(&self, node: NodeId) -> Option<Rect>;

    /// Current scroll offset of the viewport.
    fn scroll_offset(&self) -> Point;

    /// Whether `node` is one of the engine's own cursor overlays.
    fn is_overlay(&self, _node: NodeId) -> bool {
        false
    }

    /// First attached node (pre-order) whose identifier equals `id`.
    fn element_by_id(&self, id: &str) -> Option<NodeId> {
        let mut stack = vec![self.root()];
        while let Some(node) = stack.pop() {
            if self.element_id(node).as_deref() == Some(id) {
                return Some(node);
            }
            stack.extend(self.children(node).into_iter().rev());
        }
        None
    }

    /// Attached nodes whose box contains `point`, front-to-back.
    ///
    /// Later siblings and deeper descendants paint over earlier ones, so the
    /// result is the reverse of a pre-order walk.
    fn nodes_at(&self, point: Point) -> Vec<NodeId> {
        let mut hits = Vec::new();
        let mut stack = vec![self.root()];
        while let Some(node) = stack.pop() {
            if self.bounding_box(node).is_some_and(|b| b.contains(point)) {
                hits.push(node);
            }
            stack.extend(self.children(node).into_iter().rev());
        }
        hits.reverse();
        hits
    }
}

impl<D: Document + ?Sized> Document for RefCell<D> {
    fn location(&self) -> String {
        self.borrow().location()
    }

    fn root(&self) -> NodeId {
        self.borrow().root()
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.borrow().parent(node)
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.borrow().children(node)
    }

    fn tag(&self, node: NodeId) -> Option<String> {
        self.borrow().tag(node)
    }

    fn element_id(&self, node: NodeId) -> Option<String> {
        self.borrow().element_id(node)
    }

    fn bounding_box(&self, node: NodeId) -> Option<Rect> {
        self.borrow().bounding_box(node)
    }

    fn scroll_offset(&self) -> Point {
        self.borrow().scroll_offset()
    }

    fn is_overlay(&self, node: NodeId) -> bool {
        self.borrow().is_overlay(node)
    }

    fn element_by_id(&self, id: &str) -> Option<NodeId> {
        self.borrow().element_by_id(id)
    }

    fn nodes_at(&self, point: Point) -> Vec<NodeId> {
        self.borrow().nodes_at(point)
    }
}

// =============================================================================
// STATIC DOCUMENT
// =============================================================================

#[derive(Debug, Clone)]
struct NodeData {
    tag: String,
    element_id: Option<String>,
    bounds: Rect,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    overlay: bool,
}

/// Arena-backed element tree with fixed layout.
#[derive(Debug, Clone)]
pub struct StaticDocument {
    nodes: Vec<NodeData>,
    location: String,
    scroll: Point,
}

impl StaticDocument {
    /// Create a document holding only a `body` root covering `root_bounds`.
    #[must_use]
    pub fn new(location: impl Into<String>, root_bounds: Rect) -> Self {
        Self::with_root_tag(location, ROOT_TAG, root_bounds)
    }

    fn with_root_tag(location: impl Into<String>, tag: impl Into<String>, root_bounds: Rect) -> Self {
        let root = NodeData {
            tag: tag.into(),
            element_id: None,
            bounds: root_bounds,
            parent: None,
            children: Vec::new(),
            overlay: false,
        };
        Self { nodes: vec![root], location: location.into(), scroll: Point::default() }
    }

    /// Append a child element under `parent`. An unknown parent yields a
    /// detached node.
    pub fn append(&mut self, parent: NodeId, tag: &str, bounds: Rect) -> NodeId {
        self.insert(parent, tag, None, bounds)
    }

    /// Append a child element carrying an identifier attribute.
    pub fn append_with_id(&mut self, parent: NodeId, tag: &str, id: &str, bounds: Rect) -> NodeId {
        self.insert(parent, tag, Some(id.to_owned()), bounds)
    }

    fn insert(&mut self, parent: NodeId, tag: &str, element_id: Option<String>, bounds: Rect) -> NodeId {
        let id = NodeId(self.nodes.len());
        let attached = match self.nodes.get_mut(parent.0) {
            Some(data) => {
                data.children.push(id);
                Some(parent)
            }
            None => None,
        };
        self.nodes.push(NodeData {
            tag: tag.to_owned(),
            element_id,
            bounds,
            parent: attached,
            children: Vec::new(),
            overlay: false,
        });
        id
    }

    /// Remove `node` (and its subtree) from the tree. The handle stays valid.
    pub fn detach(&mut self, node: NodeId) {
        let Some(parent) = self.nodes.get_mut(node.0).and_then(|data| data.parent.take()) else {
            return;
        };
        if let Some(data) = self.nodes.get_mut(parent.0) {
            data.children.retain(|child| *child != node);
        }
    }

    pub fn set_bounds(&mut self, node: NodeId, bounds: Rect) {
        if let Some(data) = self.nodes.get_mut(node.0) {
            data.bounds = bounds;
        }
    }

    pub fn set_scroll(&mut self, scroll: Point) {
        self.scroll = scroll;
    }

    pub fn set_location(&mut self, location: impl Into<String>) {
        self.location = location.into();
    }

    /// Flag `node` as a cursor overlay so the encoder looks through it.
    pub fn mark_overlay(&mut self, node: NodeId) {
        if let Some(data) = self.nodes.get_mut(node.0) {
            data.overlay = true;
        }
    }

    /// Number of nodes ever created, detached ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Build a document from a [`DocumentFixture`].
    #[must_use]
    pub fn from_fixture(fixture: &DocumentFixture) -> Self {
        let root = &fixture.root;
        let mut doc = Self::with_root_tag(fixture.location.clone(), root.tag.clone(), root.bounds);
        doc.scroll = fixture.scroll;
        if let Some(data) = doc.nodes.get_mut(0) {
            data.element_id.clone_from(&root.id);
        }
        let root_id = doc.root();
        doc.append_fixtures(root_id, &root.children);
        doc
    }

    fn append_fixtures(&mut self, parent: NodeId, fixtures: &[NodeFixture]) {
        for fixture in fixtures {
            let node = self.insert(parent, &fixture.tag, fixture.id.clone(), fixture.bounds);
            if fixture.overlay {
                self.mark_overlay(node);
            }
            self.append_fixtures(node, &fixture.children);
        }
    }

    /// Parse a JSON [`DocumentFixture`].
    ///
    /// # Errors
    ///
    /// Returns the JSON error when `text` does not describe a fixture.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        let fixture: DocumentFixture = serde_json::from_str(text)?;
        Ok(Self::from_fixture(&fixture))
    }
}

impl Document for StaticDocument {
    fn location(&self) -> String {
        self.location.clone()
    }

    fn root(&self) -> NodeId {
        NodeId(0)
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node.0).and_then(|data| data.parent)
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.nodes.get(node.0).map(|data| data.children.clone()).unwrap_or_default()
    }

    fn tag(&self, node: NodeId) -> Option<String> {
        self.nodes.get(node.0).map(|data| data.tag.clone())
    }

    fn element_id(&self, node: NodeId) -> Option<String> {
        self.nodes.get(node.0).and_then(|data| data.element_id.clone())
    }

    fn bounding_box(&self, node: NodeId) -> Option<Rect> {
        self.nodes.get(node.0).map(|data| data.bounds)
    }

    fn scroll_offset(&self) -> Point {
        self.scroll
    }

    fn is_overlay(&self, node: NodeId) -> bool {
        self.nodes.get(node.0).is_some_and(|data| data.overlay)
    }
}

// =============================================================================
// FIXTURES
// =============================================================================

/// JSON shape of a static page layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentFixture {
    pub location: String,
    #[serde(default)]
    pub scroll: Point,
    pub root: NodeFixture,
}

/// One element of a [`DocumentFixture`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeFixture {
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub bounds: Rect,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub overlay: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeFixture>,
}
