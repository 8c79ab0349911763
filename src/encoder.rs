//! Pointer sampling: turns a viewport point into a [`PositionMessage`].

#[cfg(test)]
#[path = "encoder_test.rs"]
mod encoder_test;

use frames::PositionMessage;
use tracing::debug;

use crate::anchor;
use crate::document::{Document, NodeId};
use crate::geometry::Point;

/// Decides whether a node may serve as an anchor.
pub type TrackablePredicate = Box<dyn Fn(&dyn Document, NodeId) -> bool>;

/// Picks the trackable node under the pointer and encodes the pointer
/// relative to it.
pub struct PositionEncoder {
    trackable: TrackablePredicate,
}

impl Default for PositionEncoder {
    /// Every element is trackable.
    fn default() -> Self {
        Self { trackable: Box::new(|_, _| true) }
    }
}

impl std::fmt::Debug for PositionEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PositionEncoder").finish_non_exhaustive()
    }
}

impl PositionEncoder {
    #[must_use]
    pub fn with_predicate(trackable: impl Fn(&dyn Document, NodeId) -> bool + 'static) -> Self {
        Self { trackable: Box::new(trackable) }
    }

    /// Only elements whose tag is in `tags` are trackable.
    #[must_use]
    pub fn tracking_tags(tags: &[&str]) -> Self {
        let tags: Vec<String> = tags.iter().map(|tag| (*tag).to_owned()).collect();
        Self::with_predicate(move |doc, node| doc.tag(node).is_some_and(|tag| tags.contains(&tag)))
    }

    /// Encode `pointer` against the first trackable node of `candidates`
    /// (front-to-back).
    ///
    /// Overlay nodes and nodes without a positive-area box are looked
    /// through. With no trackable candidate, or when the chosen node cannot
    /// be resolved to a path, the sentinel is returned. The fraction is not
    /// clamped.
    #[must_use]
    pub fn sample(&self, doc: &dyn Document, pointer: Point, candidates: &[NodeId]) -> PositionMessage {
        for &node in candidates {
            if doc.is_overlay(node) || !(self.trackable)(doc, node) {
                continue;
            }
            let Some(fraction) = doc.bounding_box(node).and_then(|bounds| bounds.fraction_of(pointer)) else {
                continue;
            };
            return match anchor::resolve(doc, node) {
                Ok(path) => PositionMessage::tracked(fraction.x, fraction.y, path, doc.location()),
                Err(error) => {
                    debug!(%error, "anchor path unavailable; sending sentinel");
                    PositionMessage::Untracked
                }
            };
        }
        PositionMessage::Untracked
    }

    /// [`PositionEncoder::sample`] against the document's own hit test.
    #[must_use]
    pub fn sample_at(&self, doc: &dyn Document, pointer: Point) -> PositionMessage {
        let candidates = doc.nodes_at(pointer);
        self.sample(doc, pointer, &candidates)
    }
}
