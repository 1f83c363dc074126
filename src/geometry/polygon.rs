//! Convex polygon helpers for bird's-eye-view overlap.

use nalgebra::{Point2, Rotation2, Vector2};

const EPS: f64 = 1e-12;

/// Corners of a `length` x `width` rectangle centered at `center` and
/// rotated by `heading`, in counter-clockwise order.
pub fn rectangle(center: Point2<f64>, length: f64, width: f64, heading: f64) -> [Point2<f64>; 4] {
    let rot = Rotation2::new(heading);
    let (hl, hw) = (length / 2.0, width / 2.0);
    [
        center + rot * Vector2::new(hl, hw),
        center + rot * Vector2::new(-hl, hw),
        center + rot * Vector2::new(-hl, -hw),
        center + rot * Vector2::new(hl, -hw),
    ]
}

/// Signed shoelace area; positive for counter-clockwise vertices.
pub fn signed_area(poly: &[Point2<f64>]) -> f64 {
    if poly.len() < 3 {
        return 0.0;
    }
    let mut acc = 0.0;
    for (i, a) in poly.iter().enumerate() {
        let b = poly[(i + 1) % poly.len()];
        acc += a.x * b.y - b.x * a.y;
    }
    acc / 2.0
}

fn side(a: &Point2<f64>, b: &Point2<f64>, p: &Point2<f64>) -> f64 {
    (*b - *a).perp(&(*p - *a))
}

fn crossing(s: &Point2<f64>, e: &Point2<f64>, a: &Point2<f64>, b: &Point2<f64>) -> Point2<f64> {
    let ds = side(a, b, s);
    let de = side(a, b, e);
    let denom = ds - de;
    if denom.abs() < EPS {
        return *e;
    }
    let t = ds / denom;
    *s + (*e - *s) * t
}

/// Clips `subject` against the convex counter-clockwise polygon `clip`
/// (Sutherland-Hodgman). Returns the intersection polygon, possibly empty.
pub fn clip_convex(subject: &[Point2<f64>], clip: &[Point2<f64>]) -> Vec<Point2<f64>> {
    let mut output: Vec<Point2<f64>> = subject.to_vec();
    for (i, a) in clip.iter().enumerate() {
        if output.is_empty() {
            break;
        }
        let b = clip[(i + 1) % clip.len()];
        let input = std::mem::take(&mut output);
        for (j, e) in input.iter().enumerate() {
            let s = input[(j + input.len() - 1) % input.len()];
            let e_in = side(a, &b, e) >= -EPS;
            let s_in = side(a, &b, &s) >= -EPS;
            if e_in {
                if !s_in {
                    output.push(crossing(&s, e, a, &b));
                }
                output.push(*e);
            } else if s_in {
                output.push(crossing(&s, e, a, &b));
            }
        }
    }
    output
}

/// Area of the intersection of two convex counter-clockwise polygons.
pub fn intersection_area(a: &[Point2<f64>], b: &[Point2<f64>]) -> f64 {
    signed_area(&clip_convex(a, b)).abs()
}
