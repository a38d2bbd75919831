use crate::ray::RayPoint;
use crate::volume::Volume;

/// Spread `correction` over the voxels touched by `points`, in proportion to
/// their interpolation weights.
pub fn execute(volume: &mut Volume, points: &[RayPoint], correction: f64) {
    for point in points {
        for (i, w) in point.voxels() {
            volume[i] += correction * w;
        }
    }
}
