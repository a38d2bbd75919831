pub use units::{Angle, Length, Ratio};
pub use units::plain::{Lengthf64, Densityf64, Intensityf64, Weightf64, Ratiof64};
pub use geometry::{Point, Vector, Dot};

#[allow(non_camel_case_types)] pub type Index1_u = usize;
#[allow(non_camel_case_types)] pub type Index3_u = [usize; 3];
/// Volume dimensions: `[length, width, height]`
#[allow(non_camel_case_types)] pub type BoxDim_u = [usize; 3];

/// Width of every incoming ray, in voxel widths
pub const RAY_WIDTH: Lengthf64 = 1.0;

/// A sample point can fall between at most this many voxels
pub const MAX_VOXELS_PER_SAMPLE: usize = 4;
