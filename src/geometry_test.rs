#![allow(clippy::float_cmp)]

use super::*;

const EPSILON: f64 = 1e-10;

fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < EPSILON
}

// --- Point ---

#[test]
fn point_offset_adds_components() {
    let p = Point::new(3.0, 4.0).offset(Point::new(10.0, -2.0));
    assert_eq!(p, Point::new(13.0, 2.0));
}

#[test]
fn point_rounded_uses_nearest_pixel() {
    assert_eq!(Point::new(1.4, 2.5).rounded(), Point::new(1.0, 3.0));
    assert_eq!(Point::new(-0.6, 9.49).rounded(), Point::new(-1.0, 9.0));
}

// --- Rect ---

#[test]
fn rect_contains_is_half_open() {
    let r = Rect::new(10.0, 20.0, 100.0, 50.0);
    assert!(r.contains(Point::new(10.0, 20.0)));
    assert!(r.contains(Point::new(109.9, 69.9)));
    assert!(!r.contains(Point::new(110.0, 30.0)));
    assert!(!r.contains(Point::new(50.0, 70.0)));
    assert!(!r.contains(Point::new(9.9, 30.0)));
}

#[test]
fn rect_zero_area_has_no_area() {
    assert!(!Rect::new(0.0, 0.0, 0.0, 10.0).has_area());
    assert!(!Rect::new(0.0, 0.0, 10.0, 0.0).has_area());
    assert!(Rect::new(0.0, 0.0, 1.0, 1.0).has_area());
}

#[test]
fn rect_fraction_of_center() {
    let r = Rect::new(100.0, 200.0, 200.0, 100.0);
    let f = r.fraction_of(Point::new(200.0, 250.0)).expect("fraction");
    assert!(approx_eq(f.x, 0.5));
    assert!(approx_eq(f.y, 0.5));
}

#[test]
fn rect_fraction_of_zero_area_is_none() {
    assert!(Rect::new(5.0, 5.0, 0.0, 0.0).fraction_of(Point::new(5.0, 5.0)).is_none());
}

#[test]
fn rect_point_at_inverts_fraction() {
    let r = Rect::new(-40.0, 12.0, 80.0, 30.0);
    let p = Point::new(-10.0, 33.0);
    let f = r.fraction_of(p).expect("fraction");
    let back = r.point_at(f);
    assert!(approx_eq(back.x, p.x));
    assert!(approx_eq(back.y, p.y));
}

#[test]
fn rect_point_at_can_leave_box() {
    let r = Rect::new(0.0, 0.0, 10.0, 10.0);
    assert_eq!(r.point_at(Point::new(1.5, -0.5)), Point::new(15.0, -5.0));
}
