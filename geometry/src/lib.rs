//! Plane geometry in voxel-width units.
//!
//! Reconstruction happens slice by slice, so everything here is 2D: positions
//! inside a phantom slice, directions of incoming and outgoing beams, and the
//! circular active region through which rays are traced.

mod point;
mod vector;
mod circle;

pub use point::Point;
pub use vector::{Vector, Dot};
pub use circle::{circle_line_intersection, Chord};
