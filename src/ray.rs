//! Sampled rays.
//!
//! A ray is a sequence of sample points, each of which records the (at most
//! 4) voxels it falls between and their interpolation weights. Rays are
//! allocated once with enough room for the longest chord through the active
//! disc, and re-filled in place for every rotation: the number of points in
//! use (`len`) is distinct from the number allocated (`capacity`).

use crate::types::{Index1_u, Intensityf64, Point, Vector, Weightf64,
                   MAX_VOXELS_PER_SAMPLE};

/// The voxels contributing to one sample point of a ray
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RayPoint {
    nb_voxels: usize,
    indices: [Index1_u; MAX_VOXELS_PER_SAMPLE],
    weights: [Weightf64; MAX_VOXELS_PER_SAMPLE],
}

impl RayPoint {

    /// Forget the selected voxels. The backing storage is left untouched.
    #[inline]
    pub fn reset(&mut self) { self.nb_voxels = 0; }

    #[inline]
    pub fn push(&mut self, index: Index1_u, weight: Weightf64) {
        debug_assert!(self.nb_voxels < MAX_VOXELS_PER_SAMPLE);
        self.indices[self.nb_voxels] = index;
        self.weights[self.nb_voxels] = weight;
        self.nb_voxels += 1;
    }

    pub fn nb_voxels(&self) -> usize { self.nb_voxels }
    pub fn is_empty (&self) -> bool  { self.nb_voxels == 0 }

    pub fn indices(&self) -> &[Index1_u]  { &self.indices[..self.nb_voxels] }
    pub fn weights(&self) -> &[Weightf64] { &self.weights[..self.nb_voxels] }

    /// `(voxel index, weight)` pairs
    #[inline]
    pub fn voxels(&self) -> impl Iterator<Item = (Index1_u, Weightf64)> + '_ {
        self.indices().iter().copied().zip(self.weights().iter().copied())
    }

    /// Interpolate `values` (indexed like the voxels) at this point
    #[inline]
    pub fn interpolate(&self, values: &[f64]) -> f64 {
        self.voxels().map(|(i, w)| w * values[i]).sum()
    }
}

#[derive(Clone, Debug)]
pub struct Ray {
    points: Vec<RayPoint>,
    current_size: usize,
    /// Position of the first sample point
    pub init_position: Point,
    /// Step between consecutive sample points
    pub point_increment: Vector,
    pub i0: Intensityf64,
}

impl Ray {

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            points: vec![RayPoint::default(); capacity],
            current_size: 0,
            init_position: Point::zero(),
            point_increment: Vector::default(),
            i0: 1.0,
        }
    }

    pub fn capacity(&self) -> usize { self.points.len() }

    /// Number of sample points used by the current rotation
    pub fn len(&self) -> usize { self.current_size }
    pub fn is_empty(&self) -> bool { self.current_size == 0 }

    /// Throw away the previous rotation's points, keeping the allocation
    pub fn reset(&mut self) { self.current_size = 0; }

    /// Claim the next sample point, or `None` if the ray is full
    #[inline]
    pub fn next_point(&mut self) -> Option<&mut RayPoint> {
        let point = self.points.get_mut(self.current_size)?;
        point.reset();
        self.current_size += 1;
        Some(point)
    }

    #[inline]
    pub fn sample_points(&self) -> &[RayPoint] { &self.points[..self.current_size] }

    /// Position of the `k`th sample point
    #[inline]
    pub fn position(&self, k: usize) -> Point {
        self.init_position + self.point_increment * k as f64
    }

    /// Sample points together with their positions
    pub fn points_with_positions(&self) -> impl Iterator<Item = (Point, &RayPoint)> + '_ {
        self.sample_points().iter().enumerate().map(|(k, p)| (self.position(k), p))
    }
}

/// One angular projection. Rotations do not own rays: the rays of the
/// current rotation live in the pool of the geometry table.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rotation {
    /// Direction of the incoming beam, in radians
    pub angle: f64,
    /// Converts a sum over sample points into a line integral in centimetres
    /// (multiplied by the over-sampling factor)
    pub integral_normalization: f64,
    pub tot_sampled_points: usize,
}
