//! Which voxels contribute to a sample at a continuous position.

use crate::volume::flat_index;
use crate::ray::RayPoint;
use crate::types::{Lengthf64, Point};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VoxelSelector {
    length: usize,
    width: usize,
    interpolation: bool,
}

impl VoxelSelector {

    pub fn new(length: usize, width: usize, interpolation: bool) -> Self {
        Self { length, width, interpolation }
    }

    pub fn interpolation(&self) -> bool { self.interpolation }

    /// Fill `point` with the voxels around position `p` (relative to the
    /// centre of the slice) and their weights.
    ///
    /// With interpolation, the up to 4 voxels whose centres surround `p`
    /// receive bilinear weights; without it, the nearest voxel receives
    /// weight 1. Voxels lying outside the slice are dropped and their weight
    /// is *not* redistributed, so near the edges the weights may sum to less
    /// than 1, and a point entirely outside selects nothing.
    #[inline]
    pub fn select_voxels(&self, p: Point, point: &mut RayPoint) {
        point.reset();
        let (fx, fy) = self.voxel_coordinates(p);
        if self.interpolation { self.bilinear(fx, fy, point) }
        else                  { self.nearest (fx, fy, point) }
    }

    /// Express `p` in voxel coordinates: voxel `i` has its centre at `i`
    #[inline]
    fn voxel_coordinates(&self, p: Point) -> (Lengthf64, Lengthf64) {
        (p.x + (self.length as f64 - 1.0) / 2.0,
         p.y + (self.width  as f64 - 1.0) / 2.0)
    }

    #[inline]
    fn index(&self, ix: usize, iy: usize) -> usize {
        flat_index([ix, iy, 0], [self.length, self.width, 1])
    }

    #[inline]
    fn in_slice(&self, ix: f64, iy: f64) -> bool {
        ix >= 0.0 && iy >= 0.0 && ix < self.length as f64 && iy < self.width as f64
    }

    fn nearest(&self, fx: f64, fy: f64, point: &mut RayPoint) {
        let (ix, iy) = (fx.round(), fy.round());
        if self.in_slice(ix, iy) {
            point.push(self.index(ix as usize, iy as usize), 1.0);
        }
    }

    fn bilinear(&self, fx: f64, fy: f64, point: &mut RayPoint) {
        let (x0, y0) = (fx.floor(), fy.floor());
        let (a, b) = (fx - x0, fy - y0);
        for (iy, wy) in [(y0, 1.0 - b), (y0 + 1.0, b)] {
            for (ix, wx) in [(x0, 1.0 - a), (x0 + 1.0, a)] {
                let weight = wx * wy;
                if weight > 0.0 && self.in_slice(ix, iy) {
                    point.push(self.index(ix as usize, iy as usize), weight);
                }
            }
        }
    }
}
