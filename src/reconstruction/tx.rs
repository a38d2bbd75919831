use crate::config::Modality;
use crate::error::Result;
use crate::geometry_factory::GeometryFactory;
use crate::geometry_table::GeometryTable;
use crate::ray::Rotation;
use crate::volume::Volume;

use super::Reconstruction;

/// Transmission: the phantom holds attenuation coefficients and the sinogram
/// the intensity transmitted along each ray.
#[derive(Clone, Copy, Debug, Default)]
pub struct TxReconstruction;

impl Reconstruction for TxReconstruction {

    fn modality(&self) -> Modality { Modality::Transmission }

    fn prepare_geometry(&self, _: &GeometryFactory, _: &mut GeometryTable, _: &Volume, _: &Volume) -> Result<()> {
        Ok(())
    }

    #[inline]
    fn point_param(&self, _: &GeometryTable, _: usize) -> f64 { 1.0 }

    fn measured_absorption(&self, value: f64, i0: f64, voxel_length: f64) -> f64 {
        -(value / i0).ln() / voxel_length
    }

    fn sinogram_value(&self, signal: f64, rotation: &Rotation, i0: f64, over_sampling: usize) -> f64 {
        i0 * (-signal * self.rotation_factor(rotation) / over_sampling as f64).exp()
    }
}
