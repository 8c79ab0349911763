#![allow(clippy::float_cmp)]

use super::*;
use crate::document::StaticDocument;
use crate::geometry::Rect;

const LOCATION: &str = "https://site/page";

fn page() -> (StaticDocument, NodeId, NodeId) {
    let mut doc = StaticDocument::new(LOCATION, Rect::new(0.0, 0.0, 800.0, 600.0));
    let root = doc.root();
    let section = doc.append(root, "section", Rect::new(0.0, 100.0, 800.0, 400.0));
    let boxed = doc.append_with_id(section, "div", "box", Rect::new(100.0, 200.0, 200.0, 100.0));
    (doc, section, boxed)
}

#[test]
fn sample_over_identified_node_uses_id_anchor() {
    let (doc, ..) = page();
    let message = PositionEncoder::default().sample_at(&doc, Point::new(200.0, 250.0));
    assert_eq!(message, PositionMessage::tracked(0.5, 0.5, "#box", LOCATION));
}

#[test]
fn sample_fraction_is_relative_to_box_origin() {
    let (doc, ..) = page();
    let message = PositionEncoder::default().sample_at(&doc, Point::new(150.0, 275.0));
    assert_eq!(message.x(), 0.25);
    assert_eq!(message.y(), 0.75);
}

#[test]
fn sample_with_no_candidates_is_sentinel() {
    let (doc, ..) = page();
    assert!(PositionEncoder::default().sample(&doc, Point::new(1.0, 1.0), &[]).is_sentinel());
}

#[test]
fn sample_outside_everything_is_sentinel() {
    let (doc, ..) = page();
    assert!(PositionEncoder::default().sample_at(&doc, Point::new(900.0, 900.0)).is_sentinel());
}

#[test]
fn sample_skips_overlays() {
    let (mut doc, _, boxed) = page();
    let root = doc.root();
    let overlay = doc.append(root, "div", Rect::new(190.0, 240.0, 20.0, 20.0));
    doc.mark_overlay(overlay);
    let candidates = doc.nodes_at(Point::new(200.0, 250.0));
    assert_eq!(candidates.first(), Some(&overlay));
    let message = PositionEncoder::default().sample(&doc, Point::new(200.0, 250.0), &candidates);
    assert_eq!(message.placement().map(|p| p.anchor_path.as_str()), Some("#box"));
    assert!(candidates.contains(&boxed));
}

#[test]
fn sample_respects_tag_predicate() {
    let (doc, ..) = page();
    let encoder = PositionEncoder::tracking_tags(&["section"]);
    let message = encoder.sample_at(&doc, Point::new(200.0, 300.0));
    let placement = message.placement().expect("tracked");
    assert_eq!(placement.anchor_path, "body > section:nth-of-type(1)");
    assert_eq!(placement.y, 0.5);
}

#[test]
fn sample_with_no_trackable_tag_is_sentinel() {
    let (doc, ..) = page();
    let encoder = PositionEncoder::tracking_tags(&["article"]);
    assert!(encoder.sample_at(&doc, Point::new(200.0, 250.0)).is_sentinel());
}

#[test]
fn sample_looks_through_zero_area_nodes() {
    let (mut doc, section, boxed) = page();
    doc.set_bounds(boxed, Rect::new(100.0, 200.0, 0.0, 100.0));
    let message = PositionEncoder::default().sample(&doc, Point::new(100.0, 250.0), &[boxed, section]);
    assert_eq!(message.placement().map(|p| p.anchor_path.as_str()), Some("body > section:nth-of-type(1)"));
}

#[test]
fn sample_detached_candidate_falls_back_to_sentinel() {
    let (mut doc, section, _) = page();
    let root = doc.root();
    let ghost = doc.append(root, "aside", Rect::new(0.0, 0.0, 50.0, 50.0));
    doc.detach(ghost);
    let message = PositionEncoder::default().sample(&doc, Point::new(10.0, 10.0), &[ghost, section]);
    assert!(message.is_sentinel());
}

#[test]
fn sample_is_not_clamped() {
    let (doc, _, boxed) = page();
    let message = PositionEncoder::default().sample(&doc, Point::new(500.0, 200.0), &[boxed]);
    assert_eq!(message.x(), 2.0);
    assert_eq!(message.y(), 0.0);
}

#[test]
fn sample_tags_current_location() {
    let (mut doc, ..) = page();
    doc.set_location("https://site/other");
    let message = PositionEncoder::default().sample_at(&doc, Point::new(200.0, 250.0));
    assert_eq!(message.placement().map(|p| p.page_location.as_str()), Some("https://site/other"));
}
