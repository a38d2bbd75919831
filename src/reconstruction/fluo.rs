use crate::config::{Detector, Modality};
use crate::error::{Error, Result};
use crate::geometry_factory::GeometryFactory;
use crate::geometry_table::GeometryTable;
use crate::volume::Volume;

use super::{wrong_detector_count, Reconstruction};

/// Fluorescence: the phantom holds the concentration of the emitting
/// element, and the sinogram the fluorescence signal reaching a single
/// detector.
#[derive(Clone, Debug, Default)]
pub struct FluoReconstruction {
    detector: Option<Detector>,
    /// Correct for attenuation of the fluorescence on its way out
    self_absorption: bool,
}

impl FluoReconstruction {

    pub fn new(self_absorption: bool) -> Self { Self { detector: None, self_absorption } }

    pub fn detector(&self) -> Option<&Detector> { self.detector.as_ref() }
}

impl Reconstruction for FluoReconstruction {

    fn modality(&self) -> Modality { Modality::Fluorescence }

    fn prepare_geometry(
        &self,
        factory: &GeometryFactory,
        table: &mut GeometryTable,
        absorption: &Volume,
        self_absorption: &Volume,
    ) -> Result<()> {
        let detector = self.detector
            .ok_or_else(|| Error::NotInitialized("fluorescence detector geometry".into()))?;
        factory.update_incoming_loss_fraction(table, absorption)?;
        factory.assign_solid_angles(table, Some(&detector))?;
        if self.self_absorption {
            factory.update_self_absorption_matrices(table, self_absorption, &[detector])?;
        } else {
            factory.update_self_absorption_matrices(table, &Volume::empty(), &[detector])?;
        }
        Ok(())
    }

    #[inline]
    fn point_param(&self, table: &GeometryTable, offset: usize) -> f64 {
        let outgoing = table.outgoing_loss_fraction(0).map_or(1.0, |f| f[offset]);
        table.solid_angles()[offset] * table.incoming_loss_fraction()[offset] * outgoing
    }

    fn detector_nb(&self) -> Result<usize> { Ok(self.detector.iter().count()) }

    fn set_detector_geometry(&mut self, detectors: &[Detector]) -> Result<()> {
        match detectors {
            [detector] => { self.detector = Some(*detector); Ok(()) }
            _ => Err(wrong_detector_count(self.modality(), 1, detectors.len())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReconstructionParameters;
    use float_eq::assert_float_eq;
    use units::{cm, radian};
    use std::f64::consts::FRAC_PI_2;

    fn detector() -> Detector { Detector { angle: radian(FRAC_PI_2), distance: cm(10.0), radius: cm(1.0) } }

    #[test]
    fn exactly_one_detector() {
        let mut fluo = FluoReconstruction::new(true);
        assert_eq!(fluo.detector_nb().unwrap(), 0);
        assert!(matches!(fluo.set_detector_geometry(&[]), Err(Error::Initialization(_))));
        assert!(matches!(fluo.set_detector_geometry(&[detector(), detector()]), Err(Error::Initialization(_))));
        fluo.set_detector_geometry(&[detector()]).unwrap();
        assert_eq!(fluo.detector_nb().unwrap(), 1);
    }

    #[test]
    fn geometry_needs_detector() -> Result<()> {
        let params = ReconstructionParameters::new(Modality::Fluorescence);
        let factory = GeometryFactory::new(&params);
        let mut table = factory.create_table_at_angle([3, 3, 1], 0.0)?;
        let result = FluoReconstruction::new(false).prepare_geometry(&factory, &mut table, &Volume::empty(), &Volume::empty());
        assert!(matches!(result, Err(Error::NotInitialized(_))));
        Ok(())
    }

    #[test]
    fn point_param_combines_all_corrections() -> Result<()> {
        let params = ReconstructionParameters {
            over_sampling: 1, interpolation: false, detectors: vec![detector()],
            ..ReconstructionParameters::new(Modality::Fluorescence)
        };
        let factory = GeometryFactory::new(&params);
        let mut table = factory.create_table_at_angle([3, 3, 1], 0.0)?;
        let mu = Volume::from_data([3, 3, 1], vec![0.2; 9])?;
        let mut fluo = FluoReconstruction::new(true);
        fluo.set_detector_geometry(&params.detectors)?;
        fluo.prepare_geometry(&factory, &mut table, &mu, &mu)?;
        let outgoing = table.outgoing_loss_fraction(0).unwrap();
        for offset in 0..table.lookup().total_points() {
            let expected = table.solid_angles()[offset] * table.incoming_loss_fraction()[offset] * outgoing[offset];
            assert_float_eq!(fluo.point_param(&table, offset), expected, ulps <= 1);
            assert!(fluo.point_param(&table, offset) < table.solid_angles()[offset]);
        }
        Ok(())
    }

    #[test]
    fn self_absorption_can_be_disabled() -> Result<()> {
        let params = ReconstructionParameters {
            detectors: vec![detector()],
            ..ReconstructionParameters::new(Modality::Fluorescence)
        };
        let factory = GeometryFactory::new(&params);
        let mut table = factory.create_table_at_angle([3, 3, 1], 0.0)?;
        let mu = Volume::from_data([3, 3, 1], vec![0.2; 9])?;
        let mut fluo = FluoReconstruction::new(false);
        fluo.set_detector_geometry(&params.detectors)?;
        fluo.prepare_geometry(&factory, &mut table, &Volume::empty(), &mu)?;
        assert!(table.outgoing_loss_fraction(0).unwrap().iter().all(|&f| f == 1.0));
        Ok(())
    }
}
