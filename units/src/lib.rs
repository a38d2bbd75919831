pub use uom;
pub use float_eq;

pub mod plain;

pub use uom::si::f64::{Angle, Length, Ratio};
pub use uom::si::Quantity;

mod units {
  pub use uom::si::{length::{micrometer, millimeter, centimeter},
                    angle ::{radian, degree},
                    ratio ::ratio,
  };
}

// Making values from float literals is very long-winded, so provide some
// pithily-named convenience constructors.

/// Generate a function called NAME which returns QUANTITY by interpreting its
/// argument as UNIT
///
/// wrap!(NAME QUANTITY UNIT);
macro_rules! wrap {
  ($name:ident $quantity:ident $unit:ident ) => {
    pub fn $name(x: f64) -> $quantity { $quantity::new::<units::$unit>(x) }
  };
}

wrap!(um     Length  micrometer);
wrap!(mm     Length  millimeter);
wrap!(cm     Length  centimeter);
wrap!(ratio  Ratio        ratio);
wrap!(radian Angle       radian);
wrap!(degree Angle       degree);

// Reverse direction of the above.
pub fn um_(x: Length) -> f64 { x.get::<units::micrometer>() }
pub fn mm_(x: Length) -> f64 { x.get::<units::millimeter>() }
pub fn cm_(x: Length) -> f64 { x.get::<units::centimeter>() }

pub fn ratio_ (x: Ratio) -> f64 { x.get::<units::ratio>() }
pub fn radian_(x: Angle) -> f64 { x.get::<units::radian>() }
pub fn degree_(x: Angle) -> f64 { x.get::<units::degree>() }

#[macro_export]
macro_rules! assert_uom_eq {
  ($unit:ident, $lhs:expr, $rhs:expr, $algo:ident <= $tol:expr) => {
    $crate::float_eq::assert_float_eq!($lhs.get::<$unit>(), $rhs.get::<$unit>(), $algo <= $tol)
  };
}
