use units::plain::Lengthf64;
use crate::{Dot, Point, Vector};

/// The part of a line lying inside a circle.
///
/// `entry` and `exit` are the line parameters `t` of the two intersections of
/// `origin + t * direction` with the circle, `entry <= exit`. A tangent line
/// has `entry == exit`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Chord {
    pub entry: Lengthf64,
    pub exit: Lengthf64,
}

impl Chord {
    pub fn length(&self) -> Lengthf64 { self.exit - self.entry }
}

/// Intersect the line `origin + t * direction` with the circle of radius `r`
/// centred on the origin. `direction` must be a unit vector.
///
/// Returns `None` when the line misses the circle.
pub fn circle_line_intersection(origin: Point, direction: Vector, r: Lengthf64) -> Option<Chord> {
    let w = origin - Point::zero();
    // Viète coefficients of t² + bt + c = 0, given |direction| = 1
    let half_b = direction.dot(w);
    let c = w.dot(w) - r * r;
    let delta = half_b * half_b - c;
    if delta < 0.0 { return None }
    let root = delta.sqrt();
    Some(Chord { entry: -half_b - root, exit: -half_b + root })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use proptest::prelude::*;
    use float_eq::assert_float_eq;

    #[rstest(/**/   x ,   y ,  dx,  dy,   r , expected_length,
             case( 0.0,  0.0, 1.0, 0.0, 1.5, 3.0),  // through centre
             case( 0.0,  1.0, 1.0, 0.0, 1.5, 2.0 * 1.25_f64.sqrt()),
             case(-9.0,  0.0, 0.0, 1.0, 4.0, 0.0),  // parallel, misses ...
             case( 3.0,  3.0, 0.0, 1.0, 2.0, 0.0),  // ... both ways
             case( 5.0, -5.0, 0.0, 1.0, 5.0, 0.0),  // tangent
    )]
    fn chord_lengths(x: f64, y: f64, dx: f64, dy: f64, r: f64, expected_length: f64) {
        let chord = circle_line_intersection(Point::new(x, y), Vector::new(dx, dy), r);
        let length = chord.map_or(0.0, |c| c.length());
        assert_float_eq!(length, expected_length, abs <= 1e-12);
    }

    #[test]
    fn tangent_line_touches_once() {
        let chord = circle_line_intersection(Point::new(0.0, 2.0), Vector::new(1.0, 0.0), 2.0);
        assert_eq!(chord, Some(Chord { entry: 0.0, exit: 0.0 }));
    }

    #[test]
    fn exit_lies_ahead_of_origin_inside_circle() {
        let chord = circle_line_intersection(Point::new(0.5, 0.0), Vector::new(1.0, 0.0), 2.0).unwrap();
        assert_float_eq!(chord.entry, -2.5, ulps <= 1);
        assert_float_eq!(chord.exit ,  1.5, ulps <= 1);
    }

    proptest! {
        #[test]
        fn both_intersections_lie_on_circle(
            x in -10.0..10.0_f64,
            y in -10.0..10.0_f64,
            angle in 0.0..std::f64::consts::TAU,
            r in 0.5..20.0_f64,
        ) {
            let origin = Point::new(x, y);
            let direction = Vector::from_angle(angle);
            if let Some(Chord { entry, exit }) = circle_line_intersection(origin, direction, r) {
                for t in [entry, exit] {
                    let p = origin + direction * t;
                    assert_float_eq!(p.radius(), r, rel <= 1e-9);
                }
            }
        }
    }
}
