use crate::config::{Detector, Modality};
use crate::error::{Error, Result};
use crate::geometry_factory::GeometryFactory;
use crate::geometry_table::GeometryTable;
use crate::volume::Volume;

use super::{wrong_detector_count, Reconstruction};

/// Diffraction: the signal is collected by two virtual detectors, on either
/// side of the beam, and the outgoing attenuation is their average.
#[derive(Clone, Debug, Default)]
pub struct DiffractReconstruction {
    detectors: Option<[Detector; 2]>,
    self_absorption: bool,
}

impl DiffractReconstruction {

    pub fn new(self_absorption: bool) -> Self { Self { detectors: None, self_absorption } }

    pub fn detectors(&self) -> Option<&[Detector; 2]> { self.detectors.as_ref() }
}

impl Reconstruction for DiffractReconstruction {

    fn modality(&self) -> Modality { Modality::Diffraction }

    /// Without a separate self-absorption volume, the outgoing beam is taken
    /// to be attenuated like the incoming one.
    fn prepare_geometry(
        &self,
        factory: &GeometryFactory,
        table: &mut GeometryTable,
        absorption: &Volume,
        self_absorption: &Volume,
    ) -> Result<()> {
        let detectors = self.detectors
            .ok_or_else(|| Error::NotInitialized("diffraction detector geometry".into()))?;
        factory.update_incoming_loss_fraction(table, absorption)?;
        let outgoing_absorption = match (self.self_absorption, self_absorption.is_empty()) {
            (false, _)    => Volume::empty(),
            (true, false) => self_absorption.clone(),
            (true, true)  => absorption.clone(),
        };
        factory.update_self_absorption_matrices(table, &outgoing_absorption, &detectors)
    }

    #[inline]
    fn point_param(&self, table: &GeometryTable, offset: usize) -> f64 {
        let outgoing = |d| table.outgoing_loss_fraction(d).map_or(1.0, |f| f[offset]);
        table.incoming_loss_fraction()[offset] * 0.5 * (outgoing(0) + outgoing(1))
    }

    fn detector_nb(&self) -> Result<usize> { Ok(if self.detectors.is_some() { 2 } else { 0 }) }

    fn set_detector_geometry(&mut self, detectors: &[Detector]) -> Result<()> {
        match detectors {
            &[left, right] => { self.detectors = Some([left, right]); Ok(()) }
            _ => Err(wrong_detector_count(self.modality(), 2, detectors.len())),
        }
    }
}
