use std::ops::{Add, AddAssign, Sub};
use units::plain::Lengthf64;
use crate::Vector;

/// Position in a phantom slice, relative to the slice centre
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: Lengthf64,
    pub y: Lengthf64,
}

impl Point {
    pub fn new(x: Lengthf64, y: Lengthf64) -> Self { Self { x, y } }
    pub fn zero() -> Self { Self::new(0.0, 0.0) }

    /// Distance from the origin
    pub fn radius(&self) -> Lengthf64 { (*self - Self::zero()).norm() }
}

impl Sub for Point {
    type Output = Vector;
    fn sub(self, rhs: Self) -> Self::Output {
        Vector::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Add<Vector> for Point {
    type Output = Self;
    fn add(self, rhs: Vector) -> Self::Output {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub<Vector> for Point {
    type Output = Self;
    fn sub(self, rhs: Vector) -> Self::Output {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl AddAssign<Vector> for Point {
    fn add_assign(&mut self, rhs: Vector) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}
