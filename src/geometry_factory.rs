//! Construction of geometry tables, and of the attenuation and solid-angle
//! data attached to their sample points.

use itertools::iproduct;

use crate::config::{Detector, OutgoingRayAlgorithm, ReconstructionParameters};
use crate::error::{Error, Result};
use crate::geometry_table::{split_by_ray, GeometryTable};
use crate::ray::{Ray, RayPoint, Rotation};
use crate::scanner::ScannerPhantom2D;
use crate::sinogram::Sinogram;
use crate::types::{BoxDim_u, Lengthf64, Point, Ratiof64, Vector, RAY_WIDTH};
use crate::volume::Volume;
use units::{cm_, radian_};

/// Beyond this, a single Beer-Lambert step `exp(-μ·Δ)` is a poor
/// approximation of the attenuation across the step.
const STABLE_ATTENUATION_STEP: f64 = 2.0;

pub struct GeometryFactory<'p> {
    params: &'p ReconstructionParameters,
}

impl<'p> GeometryFactory<'p> {

    pub fn new(params: &'p ReconstructionParameters) -> Self { Self { params } }

    /// Table for a phantom of `phantom_dims`, with one rotation per angle (in
    /// radians)
    pub fn create_table(&self, phantom_dims: BoxDim_u, angles: &[f64]) -> Result<GeometryTable> {
        let [length, width, _] = phantom_dims;
        if length == 0 || width == 0 {
            return Err(Error::Initialization(format!("cannot sample an empty phantom {phantom_dims:?}")));
        }
        let radius = self.params.active_radius
            .unwrap_or(length.min(width) as f64 / 2.0);
        let rays = self.params.rays_per_rotation
            .unwrap_or_else(|| ScannerPhantom2D::rays_to_cover(radius));
        self.build(phantom_dims, angles, radius, rays)
    }

    pub fn create_table_at_angle(&self, phantom_dims: BoxDim_u, angle: f64) -> Result<GeometryTable> {
        self.create_table(phantom_dims, &[angle])
    }

    /// Table matching the rotations and rays of `sinogram`. The phantom's
    /// dimensions are deduced from the number of rays.
    pub fn create_table_from_sinogram(&self, sinogram: &Sinogram) -> Result<GeometryTable> {
        let rays = sinogram.ray_nb();
        if let Some(expected) = self.params.rays_per_rotation {
            if expected != rays {
                return Err(Error::WrongArg(format!(
                    "sinogram has {rays} rays per rotation, configuration expects {expected}")));
            }
        }
        let phantom_dims = Self::guess_phantom_dims(sinogram);
        let radius = self.params.active_radius
            .unwrap_or(rays as f64 * RAY_WIDTH / 2.0);
        self.build(phantom_dims, sinogram.angles(), radius, rays)
    }

    fn build(&self, phantom_dims: BoxDim_u, angles: &[f64], radius: Lengthf64, rays: usize) -> Result<GeometryTable> {
        if angles.is_empty() {
            return Err(Error::WrongArg("no rotation angles".into()));
        }
        if rays == 0 {
            return Err(Error::Initialization("no rays per rotation".into()));
        }
        let [length, width, _] = phantom_dims;
        let scanner = ScannerPhantom2D::new(
            [length, width], radius, self.params.over_sampling, rays, self.params.interpolation,
        ).with_i0(self.params.i0);
        let mut rotations = Vec::with_capacity(angles.len());
        for &angle in angles {
            self.add_rotation(&mut rotations, angle);
        }
        let mut pool = scanner.ray_pool();
        let lookup = scanner.sample_voxels(&mut pool, &mut rotations);
        log::info!("Sampled {} rotations of {rays} rays through a {length}x{width} phantom: {} points",
                   rotations.len(), lookup.total_points());
        Ok(GeometryTable::new(scanner, phantom_dims, rotations, lookup))
    }

    /// Append an (as yet unsampled) rotation at `angle`
    pub fn add_rotation(&self, rotations: &mut Vec<Rotation>, angle: f64) {
        rotations.push(Rotation {
            angle,
            integral_normalization: self.params.voxel_length(),
            tot_sampled_points: 0,
        });
    }

    /// One voxel per ray width, in a square slice
    pub fn guess_phantom_dims(sinogram: &Sinogram) -> BoxDim_u {
        let n = (sinogram.ray_nb() as f64 * RAY_WIDTH).round() as usize;
        [n, n, 1]
    }

    fn check_dims(table: &GeometryTable, volume: &Volume, role: &str) -> Result<()> {
        if volume.dims() != table.phantom_dims() {
            return Err(Error::Initialization(format!(
                "{role} has dimensions {:?}, phantom has {:?}", volume.dims(), table.phantom_dims())));
        }
        Ok(())
    }

    /// Fraction of the incoming beam reaching every sample point, given the
    /// attenuation coefficients (per cm) in `absorption`. An empty
    /// `absorption` means no attenuation.
    pub fn update_incoming_loss_fraction(&self, table: &mut GeometryTable, absorption: &Volume) -> Result<()> {
        let mut fractions = std::mem::take(&mut table.incoming_loss_fraction);
        if absorption.is_empty() {
            fractions.fill(1.0);
            table.incoming_loss_fraction = fractions;
            return Ok(());
        }
        Self::check_dims(table, absorption, "absorption volume")?;
        let step = self.params.interaction_length();
        let result = table.for_each_rotation(&mut fractions, |scratch, _, rotation, chunk| {
            let mut largest = 0.0_f64;
            for (ray, out) in split_rays(&mut scratch.incoming, chunk) {
                largest = largest.max(incoming_loss_fraction(ray, absorption.data(), step, out));
            }
            if largest >= STABLE_ATTENUATION_STEP {
                log::warn!("Attenuation per step reaches {largest:.3} at angle {:.4} rad: \
                            increase over-sampling", rotation.angle);
            }
            Ok(())
        });
        table.incoming_loss_fraction = fractions;
        result
    }

    /// Fraction of the radiation emitted at every sample point that reaches
    /// `detector`. All 1 when solid angle correction is disabled or there is
    /// no detector.
    pub fn assign_solid_angles(&self, table: &mut GeometryTable, detector: Option<&Detector>) -> Result<()> {
        let mut solid_angles = std::mem::take(&mut table.solid_angles);
        let result = match detector {
            Some(detector) if self.params.solid_angle => {
                table.for_each_rotation(&mut solid_angles, |scratch, _, rotation, chunk| {
                    for (ray, out) in split_rays(&mut scratch.incoming, chunk) {
                        for ((position, _), omega) in ray.points_with_positions().zip(out.iter_mut()) {
                            *omega = self.solid_angle(position, rotation.angle, detector)?;
                        }
                    }
                    Ok(())
                })
            }
            _ => { solid_angles.fill(1.0); Ok(()) }
        };
        table.solid_angles = solid_angles;
        result
    }

    /// Solid angle (as a fraction of the sphere) subtended at `position` by
    /// a disc-shaped `detector` facing it, when the incoming beam travels at
    /// `beam_angle`.
    pub fn solid_angle(&self, position: Point, beam_angle: f64, detector: &Detector) -> Result<Ratiof64> {
        let voxel_length = self.params.voxel_length();
        let direction = Vector::from_angle(beam_angle + radian_(detector.angle));
        let centre = Point::zero() + direction * cm_(detector.distance);
        let emitter = Point::new(position.x * voxel_length, position.y * voxel_length);
        let d = (centre - emitter).norm();
        let r = cm_(detector.radius);
        let omega = 0.5 * (1.0 - d / (d * d + r * r).sqrt());
        #[cfg(debug_assertions)]
        if !(omega >= 0.0) {
            return Err(Error::BadSolidAngle { value: omega });
        }
        Ok(omega)
    }

    /// Fraction of the outgoing radiation reaching each detector from every
    /// sample point, given the attenuation coefficients (per cm) of the
    /// sample at the outgoing energy.
    pub fn update_self_absorption_matrices(
        &self,
        table: &mut GeometryTable,
        self_absorption: &Volume,
        detectors: &[Detector],
    ) -> Result<()> {
        let total = table.lookup().total_points();
        table.self_absorption_matrices.clear();
        if self_absorption.is_empty() {
            table.outgoing_loss_fractions = vec![vec![1.0; total]; detectors.len()];
            return Ok(());
        }
        Self::check_dims(table, self_absorption, "self-absorption volume")?;
        let mut all_fractions = Vec::with_capacity(detectors.len());
        let mut all_matrices = Vec::with_capacity(detectors.len());
        for detector in detectors {
            let angle = radian_(detector.angle);
            let mut fractions = vec![1.0; total];
            match self.params.outgoing_ray_algorithm {
                OutgoingRayAlgorithm::OneRayPerSamplePoint => {
                    table.for_each_rotation(&mut fractions, |scratch, _, rotation, chunk| {
                        let direction = Vector::from_angle(rotation.angle + angle);
                        for (ray, out) in split_rays(&mut scratch.incoming, chunk) {
                            for (k, fraction) in out.iter_mut().enumerate() {
                                table.scanner().sample_line_from_origin_and_direction(
                                    &mut scratch.outgoing, ray.position(k), direction);
                                *fraction = self.get_outgoing_loss_fraction(&scratch.outgoing, self_absorption);
                            }
                        }
                        Ok(())
                    })?;
                }
                OutgoingRayAlgorithm::MatrixSubdivision => {
                    let matrices = table.map_rotations(|scratch, _, rotation| {
                        let direction = Vector::from_angle(rotation.angle + angle);
                        Ok(self.create_self_absorption_matrix_from_rays(
                            table.scanner(), direction, self_absorption, &mut scratch.outgoing))
                    })?;
                    table.for_each_rotation(&mut fractions, |scratch, rot, _, chunk| {
                        let matrix = matrices[rot].data();
                        for (ray, out) in split_rays(&mut scratch.incoming, chunk) {
                            for (point, fraction) in ray.sample_points().iter().zip(out.iter_mut()) {
                                *fraction = point.interpolate(matrix);
                            }
                        }
                        Ok(())
                    })?;
                    all_matrices.push(matrices);
                }
            }
            all_fractions.push(fractions);
        }
        table.outgoing_loss_fractions = all_fractions;
        table.self_absorption_matrices = all_matrices;
        Ok(())
    }

    /// Average fraction of outgoing radiation (travelling along `direction`)
    /// that escapes the sample from each voxel.
    ///
    /// Every voxel centred in the active disc is sampled on a
    /// `subdivision × subdivision` grid; each grid point's loss fraction is
    /// spread over the voxels around it with the usual interpolation weights,
    /// and each voxel's total is normalized by the weight it received.
    /// Voxels that were never sampled are left at 0.
    pub fn create_self_absorption_matrix_from_rays(
        &self,
        scanner: &ScannerPhantom2D,
        direction: Vector,
        self_absorption: &Volume,
        outgoing: &mut Ray,
    ) -> Volume {
        let [length, width, _] = self_absorption.dims();
        let sub = self.params.subdivision as f64;
        let selector = scanner.selector();
        let radius = scanner.radius();
        let mut numerator  : Volume = Volume::new_2d(length, width);
        let mut denominator: Volume = Volume::new_2d(length, width);
        let mut point = RayPoint::default();
        let (half_length, half_width) = ((length as f64 - 1.0) / 2.0, (width as f64 - 1.0) / 2.0);
        let subdivision = self.params.subdivision;
        for (iy, ix, b, a) in iproduct!(0..width, 0..length, 0..subdivision, 0..subdivision) {
            let p = Point::new(
                ix as f64 - half_length + (a as f64 + 0.5) / sub - 0.5,
                iy as f64 - half_width  + (b as f64 + 0.5) / sub - 0.5,
            );
            if p.radius() > radius { continue }
            scanner.sample_line_from_origin_and_direction(outgoing, p, direction);
            let fraction = self.get_outgoing_loss_fraction(outgoing, self_absorption);
            selector.select_voxels(p, &mut point);
            for (i, w) in point.voxels() {
                numerator  [i] += w * fraction;
                denominator[i] += w;
            }
        }
        for (n, &d) in numerator.data_mut().iter_mut().zip(denominator.data()) {
            *n /= if d > 0.0 { d } else { 1.0 };
        }
        numerator
    }

    /// Fraction of the radiation entering `ray` that survives to its end,
    /// given attenuation coefficients (per cm) in `matrix`
    pub fn get_outgoing_loss_fraction(&self, ray: &Ray, matrix: &Volume) -> Ratiof64 {
        let step = self.params.interaction_length();
        let integral: f64 = ray.sample_points().iter()
            .map(|point| point.interpolate(matrix.data()))
            .sum();
        (-integral * step).exp()
    }
}

/// Pair each ray of a rotation with its part of the rotation's per-point data
fn split_rays<'r, 'c, T>(rays: &'r mut [Ray], chunk: &'c mut [T]) -> impl Iterator<Item = (&'r mut Ray, &'c mut [T])> {
    let parts = split_by_ray(chunk, rays);
    rays.iter_mut().zip(parts)
}

/// Fill `out` with the fraction of the beam surviving to each sample point
/// of `ray`. Each point is taken to sit in the middle of its step. Returns
/// the largest attenuation per step.
fn incoming_loss_fraction(ray: &Ray, absorption: &[f64], step: f64, out: &mut [Ratiof64]) -> f64 {
    let mut integral = 0.0;
    let mut largest = 0.0_f64;
    for (point, fraction) in ray.sample_points().iter().zip(out.iter_mut()) {
        let attenuation = point.interpolate(absorption) * step;
        *fraction = (-(integral + attenuation / 2.0)).exp();
        integral += attenuation;
        largest = largest.max(attenuation);
    }
    largest
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Modality;
    use float_eq::assert_float_eq;
    use rstest::rstest;
    use units::{cm, radian};
    use std::f64::consts::{FRAC_PI_2, PI};

    fn params(modality: Modality) -> ReconstructionParameters {
        ReconstructionParameters { over_sampling: 1, interpolation: false, ..ReconstructionParameters::new(modality) }
    }

    fn detector(angle: f64) -> Detector {
        Detector { angle: radian(angle), distance: cm(100.0), radius: cm(1.0) }
    }

    #[test]
    fn table_from_angles() -> Result<()> {
        let p = params(Modality::Transmission);
        let table = GeometryFactory::new(&p).create_table([3, 3, 1], &[0.0, FRAC_PI_2])?;
        assert_eq!(table.rotation_nb(), 2);
        assert_eq!(table.rays_per_rotation(), 3);
        assert_eq!(table.rotations()[0].integral_normalization, 1.0);
        assert_eq!(table.lookup().total_points(), 14);
        assert_eq!(table.incoming_loss_fraction(), &[1.0; 14]);
        Ok(())
    }

    #[test]
    fn table_from_sinogram_guesses_phantom() -> Result<()> {
        let p = params(Modality::Transmission);
        let sinogram = Sinogram::new(vec![0.0, 1.0, 2.0], 1, 5);
        assert_eq!(GeometryFactory::guess_phantom_dims(&sinogram), [5, 5, 1]);
        let table = GeometryFactory::new(&p).create_table_from_sinogram(&sinogram)?;
        assert_eq!(table.phantom_dims(), [5, 5, 1]);
        assert_eq!(table.rotation_nb(), 3);
        assert_eq!(table.rays_per_rotation(), 5);
        Ok(())
    }

    #[test]
    fn table_rejects_mismatched_ray_count() {
        let p = ReconstructionParameters { rays_per_rotation: Some(4), ..params(Modality::Transmission) };
        let sinogram = Sinogram::new(vec![0.0], 1, 5);
        assert!(matches!(GeometryFactory::new(&p).create_table_from_sinogram(&sinogram), Err(Error::WrongArg(_))));
    }

    #[test]
    fn table_needs_angles_and_phantom() {
        let p = params(Modality::Transmission);
        let factory = GeometryFactory::new(&p);
        assert!(matches!(factory.create_table([3, 3, 1], &[]), Err(Error::WrongArg(_))));
        assert!(matches!(factory.create_table([0, 0, 0], &[0.0]), Err(Error::Initialization(_))));
    }

    #[test]
    fn table_grows_by_one_rotation() -> Result<()> {
        let p = params(Modality::Transmission);
        let mut table = GeometryFactory::new(&p).create_table_at_angle([3, 3, 1], 0.0)?;
        table.add_rotation(PI, p.voxel_length());
        assert_eq!(table.rotation_nb(), 2);
        assert_eq!(table.lookup().rotation_range(1), 7..14);
        assert_eq!(table.incoming_loss_fraction().len(), 14);
        Ok(())
    }

    #[test]
    fn incoming_loss_fraction_along_central_row() -> Result<()> {
        let p = params(Modality::Fluorescence);
        let factory = GeometryFactory::new(&p);
        let mut table = factory.create_table_at_angle([3, 3, 1], 0.0)?;
        let mu = Volume::from_data([3, 3, 1], vec![0.0, 0.0, 0.0,
                                                   0.2, 0.4, 0.6,
                                                   0.0, 0.0, 0.0])?;
        factory.update_incoming_loss_fraction(&mut table, &mu)?;
        let central = table.lookup().ray_range(0, 1);
        let fractions = &table.incoming_loss_fraction()[central];
        let expected = [(-0.1_f64).exp(), (-0.4_f64).exp(), (-0.9_f64).exp()];
        assert_eq!(fractions.len(), 3);
        for (f, e) in fractions.iter().zip(expected) {
            assert_float_eq!(*f, e, rmax <= 1e-12);
        }
        // Outer rows are transparent
        assert!(table.incoming_loss_fraction()[table.lookup().ray_range(0, 0)].iter().all(|&f| f == 1.0));
        Ok(())
    }

    #[test]
    fn absorption_of_wrong_shape_is_rejected() -> Result<()> {
        let p = params(Modality::Fluorescence);
        let factory = GeometryFactory::new(&p);
        let mut table = factory.create_table_at_angle([3, 3, 1], 0.0)?;
        let mu: Volume = Volume::new([4, 4, 1]);
        assert!(matches!(factory.update_incoming_loss_fraction(&mut table, &mu), Err(Error::Initialization(_))));
        Ok(())
    }

    #[rstest(/**/ distance, radius, expected,
             case(  4.0, 3.0, 0.1),
             case(  1.0, 1.0, 0.5 * (1.0 - std::f64::consts::FRAC_1_SQRT_2)),
             case(  3.0, 4.0, 0.5 * (1.0 - 3.0 / 5.0)),
    )]
    fn solid_angle_of_detector_seen_from_centre(distance: f64, radius: f64, expected: f64) -> Result<()> {
        let p = params(Modality::Fluorescence);
        let detector = Detector { angle: radian(FRAC_PI_2), distance: cm(distance), radius: cm(radius) };
        let omega = GeometryFactory::new(&p).solid_angle(Point::zero(), 0.3, &detector)?;
        assert_float_eq!(omega, expected, abs <= 1e-12);
        Ok(())
    }

    #[test]
    fn solid_angle_grows_towards_detector() -> Result<()> {
        let p = params(Modality::Fluorescence);
        let factory = GeometryFactory::new(&p);
        let d = Detector { angle: radian(FRAC_PI_2), distance: cm(5.0), radius: cm(1.0) };
        // Beam along x, so the detector sits on the positive y axis
        let near = factory.solid_angle(Point::new(0.0,  2.0), 0.0, &d)?;
        let far  = factory.solid_angle(Point::new(0.0, -2.0), 0.0, &d)?;
        assert!(near > far);
        Ok(())
    }

    #[test]
    fn disabled_solid_angle_is_one() -> Result<()> {
        let p = ReconstructionParameters { solid_angle: false, ..params(Modality::Fluorescence) };
        let factory = GeometryFactory::new(&p);
        let mut table = factory.create_table_at_angle([3, 3, 1], 0.0)?;
        factory.assign_solid_angles(&mut table, Some(&detector(FRAC_PI_2)))?;
        assert!(table.solid_angles().iter().all(|&w| w == 1.0));
        Ok(())
    }

    #[test]
    fn outgoing_loss_through_empty_matrix_is_one() -> Result<()> {
        let p = ReconstructionParameters { over_sampling: 3, ..params(Modality::Fluorescence) };
        let factory = GeometryFactory::new(&p);
        let table = factory.create_table_at_angle([5, 5, 1], 0.0)?;
        let zeros: Volume = Volume::new([5, 5, 1]);
        let mut pool = table.scanner().ray_pool();
        table.init_rotation(0, &mut pool)?;
        let mut outgoing = Ray::with_capacity(table.scanner().ray_capacity());
        for ray in &pool {
            for k in 0..ray.len() {
                table.scanner().sample_line_from_origin_and_direction(&mut outgoing, ray.position(k), Vector::new(0.0, 1.0));
                assert_eq!(factory.get_outgoing_loss_fraction(&outgoing, &zeros), 1.0);
            }
        }
        Ok(())
    }

    #[test]
    fn outgoing_loss_through_uniform_matrix() -> Result<()> {
        let p = params(Modality::Fluorescence);
        let factory = GeometryFactory::new(&p);
        let table = factory.create_table_at_angle([9, 9, 1], 0.0)?;
        let mu = Volume::from_data([9, 9, 1], vec![0.5; 81])?;
        let mut outgoing = Ray::with_capacity(table.scanner().ray_capacity());
        // 4.5 voxel widths from the centre to the edge: the last of the 5
        // points lies on the phantom's edge and samples nothing
        table.scanner().sample_line_from_origin_and_direction(&mut outgoing, Point::zero(), Vector::new(1.0, 0.0));
        assert_eq!(outgoing.len(), 5);
        assert!(outgoing.sample_points()[4].is_empty());
        assert_float_eq!(factory.get_outgoing_loss_fraction(&outgoing, &mu), (-2.0_f64).exp(), rmax <= 1e-12);
        Ok(())
    }

    #[rstest(/**/ algorithm,
             case(OutgoingRayAlgorithm::MatrixSubdivision),
             case(OutgoingRayAlgorithm::OneRayPerSamplePoint),
    )]
    fn self_absorption_favours_points_near_detector(algorithm: OutgoingRayAlgorithm) -> Result<()> {
        let p = ReconstructionParameters { outgoing_ray_algorithm: algorithm, ..params(Modality::Fluorescence) };
        let factory = GeometryFactory::new(&p);
        let mut table = factory.create_table_at_angle([5, 5, 1], 0.0)?;
        let mu = Volume::from_data([5, 5, 1], vec![0.1; 25])?;
        // Detector on the positive y side of the beam
        factory.update_self_absorption_matrices(&mut table, &mu, &[detector(FRAC_PI_2)])?;
        assert_eq!(table.detector_nb(), 1);
        let fractions = table.outgoing_loss_fraction(0).unwrap();
        let centre_of = |ray: usize| {
            let range = table.lookup().ray_range(0, ray);
            fractions[range.start + range.len() / 2]
        };
        // Rays are ordered from negative to positive y
        assert!(centre_of(0) < centre_of(2));
        assert!(centre_of(2) < centre_of(4));
        assert!(fractions.iter().all(|&f| (0.0..=1.0).contains(&f)));
        let has_matrix = algorithm == OutgoingRayAlgorithm::MatrixSubdivision;
        assert_eq!(table.self_absorption_matrix(0, 0).is_some(), has_matrix);
        Ok(())
    }

    #[test]
    fn empty_self_absorption_means_no_loss() -> Result<()> {
        let p = params(Modality::Diffraction);
        let factory = GeometryFactory::new(&p);
        let mut table = factory.create_table_at_angle([3, 3, 1], 0.0)?;
        factory.update_self_absorption_matrices(&mut table, &Volume::<f64>::empty(), &[detector(0.5), detector(-0.5)])?;
        assert_eq!(table.detector_nb(), 2);
        assert!(table.outgoing_loss_fraction(1).unwrap().iter().all(|&f| f == 1.0));
        Ok(())
    }
}
