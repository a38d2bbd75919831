//! The SART driver.
//!
//! A `SartAlgorithm` is set up either to reconstruct a phantom from a
//! sinogram, or to synthesize the sinogram of a phantom. It must then be
//! initialized with the matching `init_*` method (or `init`), which samples
//! the geometry of every rotation and computes the per-point attenuation
//! data of the modality.
//!
//! Each SART iteration visits every rotation in turn. The corrections from
//! all rays of a rotation are accumulated in a difference volume, which is
//! added to the phantom (clamped to the configured limits) before moving on
//! to the next rotation.

use ndarray::Array3;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::backprojection;
use crate::config::{Modality, ReconstructionParameters};
use crate::error::{Error, Result};
use crate::geometry_factory::GeometryFactory;
use crate::geometry_table::GeometryTable;
use crate::ray::Ray;
use crate::reconstruction::{self, Reconstruction};
use crate::sinogram::Sinogram;
use crate::types::BoxDim_u;
use crate::volume::{Mask, Volume};

enum Mode {
    /// Reconstruct from measured data
    Reconstruct(Sinogram),
    /// Synthesize the sinogram of the phantom at these angles (radians)
    Synthesize(Vec<f64>),
}

pub struct SartAlgorithm {
    params: ReconstructionParameters,
    mode: Mode,
    phantom: Volume,
    /// Attenuation coefficients at the incoming beam's energy
    absorption: Volume,
    /// Attenuation coefficients at the outgoing beam's energy
    self_absorption: Volume,
    reconstruction: Box<dyn Reconstruction>,
    table: Option<GeometryTable>,
    pool: Vec<Ray>,
    rng: StdRng,
}

impl SartAlgorithm {

    /// Set up reconstruction of the phantom that produced `sinogram`.
    /// `absorption` and `self_absorption` may be empty.
    pub fn for_reconstruction(
        params: ReconstructionParameters,
        sinogram: Sinogram,
        absorption: Volume,
        self_absorption: Volume,
    ) -> Result<Self> {
        Self::new(params, Mode::Reconstruct(sinogram), Volume::empty(), absorption, self_absorption)
    }

    /// Set up synthesis of the sinogram of `phantom`, at the angles
    /// configured in `params`
    pub fn for_sinogram(
        params: ReconstructionParameters,
        phantom: Volume,
        absorption: Volume,
        self_absorption: Volume,
    ) -> Result<Self> {
        let angles = params.synthesis_angles();
        Self::new(params, Mode::Synthesize(angles), phantom, absorption, self_absorption)
    }

    fn new(
        params: ReconstructionParameters,
        mode: Mode,
        phantom: Volume,
        absorption: Volume,
        self_absorption: Volume,
    ) -> Result<Self> {
        params.validate()?;
        let reconstruction = reconstruction::for_modality(&params)?;
        let rng = StdRng::seed_from_u64(params.seed);
        Ok(Self {
            params, mode, phantom, absorption, self_absorption, reconstruction,
            table: None, pool: vec![], rng,
        })
    }

    pub fn params        (&self) -> &ReconstructionParameters { &self.params }
    pub fn phantom       (&self) -> &Volume                   { &self.phantom }
    pub fn into_phantom  (self)  -> Volume                    { self.phantom }
    pub fn table         (&self) -> Option<&GeometryTable>    { self.table.as_ref() }
    pub fn reconstruction(&self) -> &dyn Reconstruction       { &*self.reconstruction }
    pub fn modality      (&self) -> Modality                  { self.params.modality }
    pub fn is_make_sino  (&self) -> bool { matches!(self.mode, Mode::Synthesize(_)) }

    pub fn init(&mut self) -> Result<()> {
        if self.is_make_sino() { self.init_make_sino() } else { self.init_reconstr() }
    }

    pub fn init_reconstr(&mut self) -> Result<()> {
        let Mode::Reconstruct(sinogram) = &self.mode else {
            return Err(Error::Initialization("set up for sinogram synthesis, not reconstruction".into()));
        };
        if self.params.slice >= sinogram.size() {
            return Err(Error::WrongArg(format!(
                "slice {} requested from a sinogram of {} slices", self.params.slice, sinogram.size())));
        }
        let factory = GeometryFactory::new(&self.params);
        let table = factory.create_table_from_sinogram(sinogram)?;
        if self.phantom.is_empty() {
            self.phantom.reset(table.phantom_dims());
        } else if self.phantom.dims() != table.phantom_dims() {
            return Err(Error::Initialization(format!(
                "starting phantom has dimensions {:?}, sinogram geometry needs {:?}",
                self.phantom.dims(), table.phantom_dims())));
        }
        self.install(table)
    }

    pub fn init_make_sino(&mut self) -> Result<()> {
        let Mode::Synthesize(angles) = &self.mode else {
            return Err(Error::Initialization("set up for reconstruction, not sinogram synthesis".into()));
        };
        if self.phantom.is_empty() {
            return Err(Error::Initialization("cannot synthesize the sinogram of an empty phantom".into()));
        }
        if self.phantom.height() != 1 {
            return Err(Error::Initialization(format!(
                "only single-slice phantoms are supported, got {} slices", self.phantom.height())));
        }
        let table = GeometryFactory::new(&self.params).create_table(self.phantom.dims(), angles)?;
        self.install(table)
    }

    fn install(&mut self, mut table: GeometryTable) -> Result<()> {
        check_attenuation(&self.absorption, &self.self_absorption, table.phantom_dims())?;
        let factory = GeometryFactory::new(&self.params);
        self.reconstruction.prepare_geometry(&factory, &mut table, &self.absorption, &self.self_absorption)?;
        self.pool = table.scanner().ray_pool();
        log::info!("Initialized {:?} {}: {} rotations of {} rays, phantom {:?}",
                   self.params.modality,
                   if self.is_make_sino() { "sinogram synthesis" } else { "reconstruction" },
                   table.rotation_nb(), table.rays_per_rotation(), table.phantom_dims());
        self.table = Some(table);
        Ok(())
    }

    fn initialized_table(&self) -> Result<&GeometryTable> {
        self.table.as_ref()
            .ok_or_else(|| Error::NotInitialized("geometry: call init() first".into()))
    }

    /// Replace the starting point of the reconstruction, or the phantom
    /// whose sinogram is synthesized
    pub fn set_phantom(&mut self, phantom: Volume) -> Result<()> {
        if let Some(table) = &self.table {
            if phantom.dims() != table.phantom_dims() {
                return Err(Error::WrongArg(format!(
                    "phantom has dimensions {:?}, geometry expects {:?}", phantom.dims(), table.phantom_dims())));
            }
        }
        self.phantom = phantom;
        Ok(())
    }

    /// Replace the attenuation volumes, recomputing the attenuation data if
    /// already initialized
    pub fn set_absorption(&mut self, absorption: Volume, self_absorption: Volume) -> Result<()> {
        if let Some(table) = &self.table {
            check_attenuation(&absorption, &self_absorption, table.phantom_dims())?;
        }
        self.absorption = absorption;
        self.self_absorption = self_absorption;
        if let Some(mut table) = self.table.take() {
            self.reconstruction.clean(&mut table);
            self.install(table)?;
        }
        Ok(())
    }

    /// Run `iterations` SART iterations over all rotations
    pub fn do_work(&mut self, iterations: usize) -> Result<()> {
        let Mode::Reconstruct(sinogram) = &self.mode else {
            return Err(Error::Initialization("no sinogram to reconstruct from".into()));
        };
        let table = self.table.as_ref()
            .ok_or_else(|| Error::NotInitialized("geometry: call init() first".into()))?;
        let reconstruction = &*self.reconstruction;
        let (lower, upper) = self.params.limits();
        let over_sampling = self.params.over_sampling as f64;
        let damping = self.params.damping;
        let voxel_length = self.params.voxel_length();
        let slice = self.params.slice;

        let mut difference: Volume = Volume::new(self.phantom.dims());
        let mut order: Vec<usize> = (0..table.rotation_nb()).collect();
        for iteration in 0..iterations {
            if self.params.random_order { order.shuffle(&mut self.rng) }
            let mut skipped = 0;
            for &rot in &order {
                difference.clear_values();
                reconstruction.init_rotation(table, rot, &mut self.pool)?;
                let measured = sinogram.rotation(slice, rot);
                for (j, ray) in self.pool.iter().enumerate() {
                    if ray.is_empty() { continue }
                    let projection = reconstruction.fwd_projection(table, rot, j, ray, &self.phantom);
                    let target = reconstruction.measured_absorption(measured.rays[j], ray.i0, voxel_length);
                    // Each voxel receives `over_sampling` weighted shares of
                    // the correction, which the denominator already counts
                    let correction = damping * (target - projection.value / over_sampling)
                                             / projection.denominator;
                    if !correction.is_finite() {
                        log::debug!("Skipping ray {j} of rotation {rot}: correction {correction}");
                        skipped += 1;
                        continue;
                    }
                    backprojection::execute(&mut difference, ray.sample_points(), correction);
                }
                self.phantom.set_corrections(&difference, upper, lower)?;
            }
            log::info!("SART iteration {}/{iterations} done, {skipped} rays skipped, phantom sum {:.6e}",
                       iteration + 1, self.phantom.sum());
        }
        Ok(())
    }

    /// Synthesize the sinogram of the phantom. With a `mask`, only the
    /// voxels it selects contribute. Masks are not supported in
    /// transmission, whose sinogram needs the full attenuation along each
    /// ray.
    pub fn make_sinogram(&self, mask: Option<&Mask>) -> Result<Sinogram> {
        let Mode::Synthesize(angles) = &self.mode else {
            return Err(Error::Initialization("set up for reconstruction, not sinogram synthesis".into()));
        };
        let table = self.initialized_table()?;
        let mask = mask.filter(|m| !m.is_empty());
        if let Some(mask) = mask {
            if self.params.modality == Modality::Transmission {
                return Err(Error::WrongArg("transmission sinograms cannot be masked".into()));
            }
            if !mask.have_equal_dimensions(&self.phantom) {
                return Err(Error::Initialization(format!(
                    "mask has dimensions {:?}, phantom has {:?}", mask.dims(), self.phantom.dims())));
            }
        }
        let (lower, upper) = self.params.limits();
        let over_sampling = self.params.over_sampling;
        let reconstruction = &*self.reconstruction;
        let phantom = &self.phantom;
        let rows = table.map_rotations(|scratch, rot, rotation| {
            Ok(scratch.incoming.iter().enumerate()
               .map(|(j, ray)| {
                   let signal = reconstruction.ray_sum(table, rot, j, ray, phantom, mask)
                       .max(lower)
                       .min(upper);
                   reconstruction.sinogram_value(signal, rotation, ray.i0, over_sampling)
               })
               .collect::<Vec<_>>())
        })?;
        let mut values = Array3::<f64>::zeros((1, rows.len(), table.rays_per_rotation()));
        for (rot, row) in rows.into_iter().enumerate() {
            for (j, value) in row.into_iter().enumerate() {
                values[[0, rot, j]] = value;
            }
        }
        log::info!("Synthesized {:?} sinogram: {} rotations of {} rays",
                   self.params.modality, angles.len(), table.rays_per_rotation());
        Sinogram::from_values(angles.clone(), values)
    }
}

/// Attenuation volumes are either empty or shaped like the phantom
fn check_attenuation(absorption: &Volume, self_absorption: &Volume, dims: BoxDim_u) -> Result<()> {
    for (volume, role) in [(absorption, "absorption"), (self_absorption, "self-absorption")] {
        if !volume.is_empty() && volume.dims() != dims {
            return Err(Error::Initialization(format!(
                "{role} volume has dimensions {:?}, phantom has {dims:?}", volume.dims())));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    #[allow(unused)] use pretty_assertions::{assert_eq, assert_ne};

    fn phantom() -> Volume { Volume::from_data([3, 3, 1], vec![1.0; 9]).unwrap() }

    fn synthesis() -> SartAlgorithm {
        let params = ReconstructionParameters { rotations: 4, ..ReconstructionParameters::default() };
        SartAlgorithm::for_sinogram(params, phantom(), Volume::empty(), Volume::empty()).unwrap()
    }

    #[test]
    fn wrong_init_mode() {
        let mut sart = synthesis();
        assert!(matches!(sart.init_reconstr(), Err(Error::Initialization(_))));
        let sinogram = Sinogram::new(vec![0.0], 1, 3);
        let mut sart = SartAlgorithm::for_reconstruction(
            ReconstructionParameters::default(), sinogram, Volume::empty(), Volume::empty()).unwrap();
        assert!(matches!(sart.init_make_sino(), Err(Error::Initialization(_))));
        assert!(matches!(sart.make_sinogram(None), Err(Error::Initialization(_))));
    }

    #[test]
    fn use_before_init() {
        let sart = synthesis();
        assert!(matches!(sart.make_sinogram(None), Err(Error::NotInitialized(_))));
        let sinogram = Sinogram::new(vec![0.0], 1, 3);
        let mut sart = SartAlgorithm::for_reconstruction(
            ReconstructionParameters::default(), sinogram, Volume::empty(), Volume::empty()).unwrap();
        assert!(matches!(sart.do_work(1), Err(Error::NotInitialized(_))));
    }

    #[test]
    fn absorption_must_match_phantom() {
        let params = ReconstructionParameters::default();
        let mut sart = SartAlgorithm::for_sinogram(params, phantom(), Volume::new([4, 4, 1]), Volume::empty()).unwrap();
        assert!(matches!(sart.init(), Err(Error::Initialization(_))));
    }

    #[test]
    fn transmission_rejects_mask() {
        let mut sart = synthesis();
        sart.init().unwrap();
        let mask: Mask = Volume::from_data([3, 3, 1], vec![true; 9]).unwrap();
        assert!(matches!(sart.make_sinogram(Some(&mask)), Err(Error::WrongArg(_))));
        // An empty mask is no mask
        assert!(sart.make_sinogram(Some(&Mask::empty())).is_ok());
    }

    #[test]
    fn slice_must_exist() {
        let params = ReconstructionParameters { slice: 1, ..ReconstructionParameters::default() };
        let sinogram = Sinogram::new(vec![0.0], 1, 3);
        let mut sart = SartAlgorithm::for_reconstruction(params, sinogram, Volume::empty(), Volume::empty()).unwrap();
        assert!(matches!(sart.init(), Err(Error::WrongArg(_))));
    }

    #[test]
    fn reconstruction_phantom_is_guessed_from_sinogram() {
        let sinogram = Sinogram::new(vec![0.0, 1.0], 1, 4);
        let mut sart = SartAlgorithm::for_reconstruction(
            ReconstructionParameters::default(), sinogram, Volume::empty(), Volume::empty()).unwrap();
        sart.init().unwrap();
        assert_eq!(sart.phantom().dims(), [4, 4, 1]);
        assert!(sart.set_phantom(Volume::new([3, 3, 1])).is_err());
        assert!(sart.set_phantom(Volume::new([4, 4, 1])).is_ok());
    }

    #[test]
    fn starting_phantom_must_fit_sinogram() {
        let sinogram = Sinogram::new(vec![0.0], 1, 3);
        let mut sart = SartAlgorithm::for_reconstruction(
            ReconstructionParameters::default(), sinogram, Volume::empty(), Volume::empty()).unwrap();
        sart.set_phantom(Volume::from_data([5, 5, 1], vec![0.7; 25]).unwrap()).unwrap();
        assert!(matches!(sart.init(), Err(Error::Initialization(_))));
        assert!(sart.table().is_none());
        sart.set_phantom(Volume::from_data([3, 3, 1], vec![0.7; 9]).unwrap()).unwrap();
        sart.init().unwrap();
        float_eq::assert_float_eq!(sart.phantom().sum(), 6.3, rmax <= 1e-12);
    }

    #[test]
    fn rejected_absorption_keeps_previous_state() {
        let mut sart = synthesis();
        sart.init().unwrap();
        let before = sart.make_sinogram(None).unwrap();
        let result = sart.set_absorption(Volume::new([4, 4, 1]), Volume::empty());
        assert!(matches!(result, Err(Error::Initialization(_))));
        assert!(sart.table().is_some());
        assert_eq!(sart.make_sinogram(None).unwrap(), before);
        assert!(sart.set_absorption(Volume::from_data([3, 3, 1], vec![0.5; 9]).unwrap(), Volume::empty()).is_ok());
    }
}
