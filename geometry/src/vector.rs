use std::ops::{Add, Mul, Neg, Sub};
use units::plain::Lengthf64;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vector {
    pub x: Lengthf64,
    pub y: Lengthf64,
}

pub trait Dot<Rhs = Self> {
    type Output;
    fn dot(self, other: Rhs) -> Self::Output;
}

impl Dot for Vector {
    type Output = Lengthf64;
    fn dot(self, other: Self) -> Self::Output { self.x * other.x + self.y * other.y }
}

impl Vector {

    pub fn new(x: Lengthf64, y: Lengthf64) -> Self { Self { x, y } }

    /// Unit vector pointing at `angle` (radians) anticlockwise from the x-axis
    pub fn from_angle(angle: f64) -> Self {
        let (sin, cos) = angle.sin_cos();
        Self::new(cos, sin)
    }

    pub fn norm(self) -> Lengthf64 { self.dot(self).sqrt() }

    pub fn normalize(self) -> Self { self * (1.0 / self.norm()) }

    /// Rotate anticlockwise by `angle` radians
    pub fn rotate(self, angle: f64) -> Self {
        let (sin, cos) = angle.sin_cos();
        Self::new(self.x * cos - self.y * sin,
                  self.x * sin + self.y * cos)
    }

    /// The vector rotated by a quarter turn anticlockwise
    pub fn perpendicular(self) -> Self { Self::new(-self.y, self.x) }
}

impl Add for Vector {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output { Self::new(self.x + rhs.x, self.y + rhs.y) }
}

impl Sub for Vector {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output { Self::new(self.x - rhs.x, self.y - rhs.y) }
}

impl Neg for Vector {
    type Output = Self;
    fn neg(self) -> Self::Output { Self::new(-self.x, -self.y) }
}

impl Mul<f64> for Vector {
    type Output = Self;
    fn mul(self, rhs: f64) -> Self::Output { Self::new(self.x * rhs, self.y * rhs) }
}

impl Mul<Vector> for f64 {
    type Output = Vector;
    fn mul(self, rhs: Vector) -> Self::Output { rhs * self }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::assert_float_eq;
    use rstest::rstest;
    use std::f64::consts::{FRAC_PI_2, PI};

    #[rstest(/**/ x,    y,   norm,
             case(0.0,  0.0,  0.0),
             case(1.0,  0.0,  1.0),
             case(0.0, -1.0,  1.0),
             case(3.0,  4.0,  5.0),
             case(5.0, 12.0, 13.0),
    )]
    fn vector_norm(x: f64, y: f64, norm: f64) {
        assert_eq!(Vector::new(x, y).norm(), norm);
    }

    #[rstest(/**/  angle   ,  x  ,  y  ,
             case(0.0      ,  1.0,  0.0),
             case(FRAC_PI_2,  0.0,  1.0),
             case(PI       , -1.0,  0.0),
             case(-FRAC_PI_2, 0.0, -1.0),
    )]
    fn unit_vector_from_angle(angle: f64, x: f64, y: f64) {
        let v = Vector::from_angle(angle);
        assert_float_eq!((v.x, v.y), (x, y), abs <= (1e-12, 1e-12));
    }

    #[test]
    fn rotation_and_perpendicular_agree() {
        let v = Vector::new(2.0, 1.0);
        let r = v.rotate(FRAC_PI_2);
        let p = v.perpendicular();
        assert_float_eq!((r.x, r.y), (p.x, p.y), abs <= (1e-12, 1e-12));
        assert_eq!(v.dot(p), 0.0);
    }

    #[test]
    fn normalized_vector_has_unit_length() {
        assert_float_eq!(Vector::new(-7.0, 3.5).normalize().norm(), 1.0, ulps <= 2);
    }
}
