//! Remote cursor rendering.
//!
//! Each inbound member batch is a full snapshot. Rendering hides every
//! overlay, frees the overlays of members absent from the batch, then places
//! and shows one overlay per member whose anchor resolves on the local page.
//! Overlays are created lazily through an [`OverlayFactory`] and mutated in
//! place afterwards. Every surviving overlay is settled once the batch is
//! applied, so backends can act on the final state of each batch only.

#[cfg(test)]
#[path = "render_test.rs"]
mod render_test;

use std::collections::{BTreeMap, BTreeSet};

use frames::{Member, MemberId};
use tracing::debug;

use crate::anchor;
use crate::document::Document;
use crate::geometry::{Point, Rect};

/// A visual cursor for one remote member.
pub trait Overlay {
    /// Move the overlay to a page-space position.
    fn set_position(&mut self, position: Point);
    fn set_visible(&mut self, visible: bool);

    /// Called once per batch after all position and visibility updates.
    fn settle(&mut self) {}
}

/// Creates overlays on first sight of a member.
pub trait OverlayFactory {
    fn create(&self, member_id: MemberId, given_identifier: &str) -> Box<dyn Overlay>;
}

/// Outcome of one [`RemoteCursorRenderer::render`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderSummary {
    /// Members placed and made visible.
    pub shown: usize,
    /// Members in the batch that were not shown.
    pub skipped: usize,
    /// Overlays dropped because their member left.
    pub freed: usize,
}

/// Page-space position of `fraction` within `bounds`, rounded to whole pixels.
#[must_use]
pub fn overlay_position(bounds: Rect, fraction: Point, scroll: Point) -> Point {
    bounds.point_at(fraction).offset(scroll).rounded()
}

pub struct RemoteCursorRenderer {
    factory: Box<dyn OverlayFactory>,
    overlays: BTreeMap<MemberId, Box<dyn Overlay>>,
    draw_self: bool,
}

impl std::fmt::Debug for RemoteCursorRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteCursorRenderer")
            .field("overlays", &self.overlays.keys().collect::<Vec<_>>())
            .field("draw_self", &self.draw_self)
            .finish_non_exhaustive()
    }
}

impl RemoteCursorRenderer {
    #[must_use]
    pub fn new(factory: Box<dyn OverlayFactory>, draw_self: bool) -> Self {
        Self { factory, overlays: BTreeMap::new(), draw_self }
    }

    /// Apply one member batch.
    ///
    /// `local_member_id` is the id the broker assigned to this client; that
    /// member is only drawn when self-rendering is enabled.
    pub fn render(&mut self, doc: &dyn Document, members: &[Member], local_member_id: Option<MemberId>) -> RenderSummary {
        let mut summary = RenderSummary::default();

        for overlay in self.overlays.values_mut() {
            overlay.set_visible(false);
        }

        let present: BTreeSet<MemberId> = members.iter().map(|member| member.member_id).collect();
        let before = self.overlays.len();
        self.overlays.retain(|member_id, _| present.contains(member_id));
        summary.freed = before - self.overlays.len();

        let location = doc.location();
        let scroll = doc.scroll_offset();
        for member in members {
            if self.place(doc, member, local_member_id, &location, scroll) {
                summary.shown += 1;
            } else {
                summary.skipped += 1;
            }
        }

        for overlay in self.overlays.values_mut() {
            overlay.settle();
        }
        summary
    }

    fn place(
        &mut self,
        doc: &dyn Document,
        member: &Member,
        local_member_id: Option<MemberId>,
        location: &str,
        scroll: Point,
    ) -> bool {
        if !self.draw_self && local_member_id == Some(member.member_id) {
            return false;
        }
        let Some(placement) = member.position.placement() else {
            return false;
        };
        if placement.page_location != location {
            return false;
        }
        let node = match anchor::locate(doc, &placement.anchor_path) {
            Ok(node) => node,
            Err(error) => {
                debug!(member_id = member.member_id, %error, "remote anchor not on this page");
                return false;
            }
        };
        let Some(bounds) = doc.bounding_box(node) else {
            return false;
        };

        let position = overlay_position(bounds, Point::new(placement.x, placement.y), scroll);
        let factory = &self.factory;
        let overlay = self
            .overlays
            .entry(member.member_id)
            .or_insert_with(|| factory.create(member.member_id, &member.given_identifier));
        overlay.set_position(position);
        overlay.set_visible(true);
        true
    }

    /// Drop every overlay.
    pub fn release_all(&mut self) -> usize {
        let count = self.overlays.len();
        self.overlays.clear();
        count
    }

    #[must_use]
    pub fn overlay_count(&self) -> usize {
        self.overlays.len()
    }

    #[must_use]
    pub fn has_overlay(&self, member_id: MemberId) -> bool {
        self.overlays.contains_key(&member_id)
    }
}
