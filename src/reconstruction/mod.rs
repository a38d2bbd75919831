//! Modality-specific forward projection.
//!
//! All modalities project the same way: every sample point of a ray
//! contributes its interpolated voxel value, scaled by a per-point parameter
//! that accounts for the physics of the modality (attenuation of the
//! incoming beam, solid angle of the detector, attenuation of the outgoing
//! beam). The modalities differ in that parameter, in the per-point data
//! they need computed up front, and in how measured values relate to line
//! integrals.

mod tx;
mod fluo;
mod diffract;

pub use tx::TxReconstruction;
pub use fluo::FluoReconstruction;
pub use diffract::DiffractReconstruction;

use crate::config::{Detector, Modality, ReconstructionParameters};
use crate::error::{Error, Result};
use crate::geometry_factory::GeometryFactory;
use crate::geometry_table::GeometryTable;
use crate::ray::{Ray, Rotation};
use crate::volume::{Mask, Volume};

/// Forward projection of one ray, and the SART denominator that goes with it
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Projection {
    /// Σ param · weight · voxel
    pub value: f64,
    /// Σ param · weight²
    pub denominator: f64,
}

pub trait Reconstruction: Send + Sync {

    fn modality(&self) -> Modality;

    /// Fill in the per-point data of `table` needed by this modality.
    /// `absorption` holds attenuation coefficients at the incoming energy,
    /// `self_absorption` at the outgoing one; either may be empty.
    fn prepare_geometry(
        &self,
        factory: &GeometryFactory,
        table: &mut GeometryTable,
        absorption: &Volume,
        self_absorption: &Volume,
    ) -> Result<()>;

    /// Weight of the sample point at `offset` in the table's flat per-point
    /// arrays
    fn point_param(&self, table: &GeometryTable, offset: usize) -> f64;

    /// Resample the rays of rotation `rot` into `pool`
    fn init_rotation<'t>(&self, table: &'t GeometryTable, rot: usize, pool: &mut [Ray]) -> Result<&'t Rotation> {
        table.init_rotation(rot, pool)
    }

    fn fwd_projection(&self, table: &GeometryTable, rot: usize, ray_index: usize, ray: &Ray, phantom: &Volume) -> Projection {
        debug_assert_eq!(ray.len(), table.lookup().ray_len(rot, ray_index));
        let start = table.lookup().offset(rot, ray_index);
        let mut projection = Projection::default();
        for (k, point) in ray.sample_points().iter().enumerate() {
            if point.is_empty() { continue }
            let param = self.point_param(table, start + k);
            for (i, w) in point.voxels() {
                projection.value       += param * w * phantom[i];
                projection.denominator += param * w * w;
            }
        }
        projection
    }

    /// Total signal along a ray, optionally counting only voxels in `mask`
    fn ray_sum(&self, table: &GeometryTable, rot: usize, ray_index: usize, ray: &Ray, phantom: &Volume, mask: Option<&Mask>) -> f64 {
        let start = table.lookup().offset(rot, ray_index);
        let mut signal = 0.0;
        for (k, point) in ray.sample_points().iter().enumerate() {
            if point.is_empty() { continue }
            let param = self.point_param(table, start + k);
            for (i, w) in point.voxels() {
                if mask.map_or(true, |mask| mask[i]) {
                    signal += param * w * phantom[i];
                }
            }
        }
        signal
    }

    /// Converts a sum over sample points into a line integral
    fn rotation_factor(&self, rotation: &Rotation) -> f64 { rotation.integral_normalization }

    /// Line integral, per voxel width, that produced the measured `value`
    fn measured_absorption(&self, value: f64, i0: f64, voxel_length: f64) -> f64 {
        value / (i0 * voxel_length)
    }

    /// Value recorded in a sinogram for a ray whose sum over sample points
    /// is `signal`
    fn sinogram_value(&self, signal: f64, rotation: &Rotation, i0: f64, over_sampling: usize) -> f64 {
        signal * i0 * self.rotation_factor(rotation) / over_sampling as f64
    }

    /// Drop the per-point data computed by `prepare_geometry`
    fn clean(&self, table: &mut GeometryTable) { table.clear_attenuation() }

    fn detector_nb(&self) -> Result<usize> {
        Err(Error::NotImplemented(format!("{:?} reconstruction has no detectors", self.modality())))
    }

    fn set_detector_geometry(&mut self, _detectors: &[Detector]) -> Result<()> {
        Err(Error::NotImplemented(format!("{:?} reconstruction has no detectors", self.modality())))
    }
}

/// The reconstruction for the modality selected in `params`, with its
/// detectors in place
pub fn for_modality(params: &ReconstructionParameters) -> Result<Box<dyn Reconstruction>> {
    Ok(match params.modality {
        Modality::Transmission => Box::new(TxReconstruction),
        Modality::Fluorescence => {
            let mut fluo = FluoReconstruction::new(params.self_absorption);
            fluo.set_detector_geometry(&params.detectors)?;
            Box::new(fluo)
        }
        Modality::Diffraction => {
            let mut diffract = DiffractReconstruction::new(params.self_absorption);
            diffract.set_detector_geometry(&params.detectors)?;
            Box::new(diffract)
        }
    })
}

fn wrong_detector_count(modality: Modality, expected: usize, got: usize) -> Error {
    Error::Initialization(format!("{modality:?} needs exactly {expected} detector(s), got {got}"))
}
