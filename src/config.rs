//! Reconstruction parameters, read from TOML.
//!
//! Quantities with units are written as strings and parsed by `uom`:
//!
//! ```toml
//! modality = "fluorescence"
//! voxel_size = "10 um"
//! over_sampling = 2
//!
//! [[detectors]]
//! angle = "1.5707963 rad"
//! distance = "5 cm"
//! radius = "0.4 cm"
//! ```

use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, de};

use units::{cm, cm_, radian, radian_};
use crate::error::{Error, Result};
use crate::types::{Angle, Length};

fn deserialize_uom<'d, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'d>,
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    String::deserialize(deserializer)?
        .parse::<T>()
        .map_err(de::Error::custom)
}

fn deserialize_uom_vec_opt<'d, D, T>(deserializer: D) -> std::result::Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'d>,
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    Option::<Vec<String>>::deserialize(deserializer)?
        .map(|v| v.iter().map(|s| s.parse::<T>()).collect::<std::result::Result<Vec<_>, _>>())
        .transpose()
        .map_err(de::Error::custom)
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Modality {
    Transmission,
    Fluorescence,
    Diffraction,
}

/// How the attenuation of the outgoing (fluorescence or diffraction) beam is
/// evaluated
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum OutgoingRayAlgorithm {
    /// One self-absorption matrix per rotation and detector, built by
    /// tracing outgoing rays from `subdivision²` points in every voxel
    MatrixSubdivision,
    /// Trace a real outgoing ray from every sample point of every incoming
    /// ray. Accurate and slow.
    OneRayPerSamplePoint,
}

/// Geometry of a detector of the outgoing beam
#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Detector {
    /// Direction of the detector, anticlockwise from the incoming beam
    #[serde(deserialize_with = "deserialize_uom")]
    pub angle: Angle,

    /// From the centre of rotation to the centre of the detector
    #[serde(deserialize_with = "deserialize_uom")]
    pub distance: Length,

    /// Half-size of the detector's sensitive area
    #[serde(default = "zero_length")]
    #[serde(deserialize_with = "deserialize_uom")]
    pub radius: Length,
}

fn zero_length() -> Length { cm(0.0) }

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
#[serde(default)]
pub struct ReconstructionParameters {

    pub modality: Modality,

    /// Physical width of a voxel. Attenuation coefficients stored in
    /// volumes are per centimetre.
    #[serde(deserialize_with = "deserialize_uom")]
    pub voxel_size: Length,

    /// Number of sample points per voxel width along every ray
    pub over_sampling: usize,

    /// Relaxation factor applied to every SART correction
    pub damping: f64,

    /// Radius of the reconstructed disc, in voxel widths. Defaults to half
    /// the smaller phantom dimension.
    pub active_radius: Option<f64>,

    /// Number of incoming rays per rotation. Defaults to what covers the
    /// active disc.
    pub rays_per_rotation: Option<usize>,

    pub outgoing_ray_algorithm: OutgoingRayAlgorithm,

    /// Sub-sampling factor of self-absorption matrices; 1 samples voxel
    /// centres only
    pub subdivision: usize,

    /// Bilinear interpolation between the 4 nearest voxels, rather than
    /// nearest-voxel sampling
    pub interpolation: bool,

    /// Incoming beam intensity
    pub i0: f64,

    /// Weight fluorescence samples by the solid angle of the detector
    pub solid_angle: bool,

    /// Correct for attenuation of the outgoing beam
    pub self_absorption: bool,

    pub lower_limit: f64,
    pub upper_limit: Option<f64>,

    /// Visit rotations in a different random order on every iteration
    pub random_order: bool,
    pub seed: u64,

    /// Which sinogram slice is reconstructed
    pub slice: usize,

    pub detectors: Vec<Detector>,

    /// Explicit rotation angles for sinogram synthesis ...
    #[serde(deserialize_with = "deserialize_uom_vec_opt")]
    pub angles: Option<Vec<Angle>>,

    /// ... or `rotations` equally spaced angles in `[min_angle, max_angle)`
    pub rotations: usize,
    #[serde(deserialize_with = "deserialize_uom")]
    pub min_angle: Angle,
    #[serde(deserialize_with = "deserialize_uom")]
    pub max_angle: Angle,
}

impl Default for ReconstructionParameters {
    fn default() -> Self {
        Self {
            modality: Modality::Transmission,
            voxel_size: cm(1.0),
            over_sampling: 2,
            damping: 1.0,
            active_radius: None,
            rays_per_rotation: None,
            outgoing_ray_algorithm: OutgoingRayAlgorithm::MatrixSubdivision,
            subdivision: 1,
            interpolation: true,
            i0: 1.0,
            solid_angle: true,
            self_absorption: true,
            lower_limit: 0.0,
            upper_limit: None,
            random_order: false,
            seed: 0,
            slice: 0,
            detectors: vec![],
            angles: None,
            rotations: 1,
            min_angle: radian(0.0),
            max_angle: radian(std::f64::consts::TAU),
        }
    }
}

impl ReconstructionParameters {

    pub fn new(modality: Modality) -> Self { Self { modality, ..Self::default() } }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let params: Self = toml::from_str(text)?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        let bad = |message: String| Err(Error::WrongArg(message));
        if self.over_sampling == 0 { return bad("over_sampling must be at least 1".into()) }
        if self.subdivision   == 0 { return bad("subdivision must be at least 1".into()) }
        if !(self.damping > 0.0 && self.damping.is_finite()) {
            return bad(format!("damping must be positive, got {}", self.damping))
        }
        if !(self.voxel_length() > 0.0) {
            return bad(format!("voxel size must be positive, got {} cm", self.voxel_length()))
        }
        if !(self.i0 > 0.0) { return bad(format!("i0 must be positive, got {}", self.i0)) }
        if let Some(r) = self.active_radius {
            if !(r > 0.0) { return bad(format!("active radius must be positive, got {r}")) }
        }
        for detector in &self.detectors {
            if !(cm_(detector.distance) > 0.0) {
                return bad(format!("detector distance must be positive, got {} cm", cm_(detector.distance)))
            }
            if self.solid_angle && self.modality == Modality::Fluorescence && !(cm_(detector.radius) > 0.0) {
                return bad("solid angle correction needs a detector of positive radius".into())
            }
        }
        let (lower, upper) = self.limits();
        if lower > upper {
            return bad(format!("lower limit {lower} exceeds upper limit {upper}"))
        }
        Ok(())
    }

    /// Voxel width in centimetres
    pub fn voxel_length(&self) -> f64 { cm_(self.voxel_size) }

    /// Physical distance between consecutive sample points on a ray, in
    /// centimetres
    pub fn interaction_length(&self) -> f64 { self.voxel_length() / self.over_sampling as f64 }

    /// Clamping range applied to voxels after every rotation. Attenuation
    /// cannot be negative, so transmission ignores any lower limit below 0.
    pub fn limits(&self) -> (f64, f64) {
        let upper = self.upper_limit.unwrap_or(f64::INFINITY);
        let lower = match self.modality {
            Modality::Transmission => 0.0,
            _ => self.lower_limit,
        };
        (lower, upper)
    }

    /// Rotation angles, in radians, at which sinograms are synthesised
    pub fn synthesis_angles(&self) -> Vec<f64> {
        if let Some(angles) = &self.angles {
            return angles.iter().copied().map(radian_).collect()
        }
        let (min, max) = (radian_(self.min_angle), radian_(self.max_angle));
        let step = (max - min) / self.rotations as f64;
        (0..self.rotations).map(|i| min + i as f64 * step).collect()
    }
}

pub fn read_config_file(path: impl AsRef<Path>) -> Result<ReconstructionParameters> {
    let text = fs::read_to_string(path.as_ref())?;
    ReconstructionParameters::from_toml_str(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use units::{mm, degree};
    use float_eq::assert_float_eq;

    fn parse(input: &str) -> ReconstructionParameters {
        ReconstructionParameters::from_toml_str(input).unwrap()
    }

    macro_rules! check {
        ($text:expr => $($field:ident = $expected:expr);+$(;)?) => {
            let config = parse($text);
            println!("DESERIALIZED: {config:?}");
            $(assert_eq!(config.$field, $expected);)*
        }
    }

    #[test]
    fn empty_config_gives_defaults() {
        assert_eq!(parse(""), ReconstructionParameters::default());
    }

    #[test]
    fn config_modality_and_sampling() {
        check!(r#"
                 modality = "diffraction"
                 over_sampling = 4
                 damping = 0.5
                 interpolation = false
               "# =>
               modality      = Modality::Diffraction;
               over_sampling = 4;
               damping       = 0.5;
               interpolation = false;
        );
    }

    #[test]
    fn config_voxel_size_with_units() {
        check!(r#"voxel_size = "2.5 mm""# => voxel_size = mm(2.5));
        assert_float_eq!(parse(r#"voxel_size = "2.5 mm""#).voxel_length(), 0.25, ulps <= 1);
    }

    #[test]
    fn config_outgoing_algorithm() {
        check!(r#"
                 outgoing_ray_algorithm = "one-ray-per-sample-point"
                 subdivision = 3
               "# =>
               outgoing_ray_algorithm = OutgoingRayAlgorithm::OneRayPerSamplePoint;
               subdivision = 3;
        );
    }

    #[test]
    fn config_detectors() {
        let config = parse(r#"
                 modality = "fluorescence"
                 [[detectors]]
                 angle = "1.5 rad"
                 distance = "5 cm"
                 radius = "4 mm"
               "#);
        assert_eq!(config.detectors, vec![Detector { angle: radian(1.5), distance: cm(5.0), radius: mm(4.0) }]);
    }

    #[test]
    fn detector_radius_is_optional() {
        let config = parse(r#"
                 [[detectors]]
                 angle = "0.5 rad"
                 distance = "1 cm"
               "#);
        assert_eq!(config.detectors[0].radius, cm(0.0));
    }

    #[test]
    fn explicit_angles_win() {
        let config = parse(r#"
                 angles = ["0 rad", "0.5 rad"]
                 rotations = 7
               "#);
        assert_eq!(config.synthesis_angles(), vec![0.0, 0.5]);
    }

    #[test]
    fn equally_spaced_angles() {
        let config = ReconstructionParameters {
            rotations: 4,
            min_angle: degree(0.0),
            max_angle: degree(180.0),
            ..ReconstructionParameters::default()
        };
        let angles = config.synthesis_angles();
        let expected = [0.0, 0.25, 0.5, 0.75].map(|f| f * std::f64::consts::PI);
        assert_eq!(angles.len(), expected.len());
        for (a, e) in angles.into_iter().zip(expected) {
            assert_float_eq!(a, e, abs <= 1e-12);
        }
    }

    #[test]
    fn transmission_forces_non_negative_lower_limit() {
        let mut config = ReconstructionParameters { lower_limit: -3.0, upper_limit: Some(5.0), ..Default::default() };
        assert_eq!(config.limits(), (0.0, 5.0));
        config.modality = Modality::Fluorescence;
        assert_eq!(config.limits(), (-3.0, 5.0));
    }

    #[test]
    fn reject_unknown_field() {
        assert!(matches!(ReconstructionParameters::from_toml_str("unknown_field = 666"), Err(Error::Config(_))));
    }

    #[test]
    fn reject_nonsense_values() {
        assert!(matches!(ReconstructionParameters::from_toml_str("over_sampling = 0"), Err(Error::WrongArg(_))));
        assert!(matches!(ReconstructionParameters::from_toml_str("damping = -1.0"), Err(Error::WrongArg(_))));
        assert!(matches!(ReconstructionParameters::from_toml_str(
            "modality = \"fluorescence\"\nlower_limit = 2.0\nupper_limit = 1.0"), Err(Error::WrongArg(_))));
        assert!(matches!(ReconstructionParameters::from_toml_str(r#"
                 modality = "fluorescence"
                 [[detectors]]
                 angle = "0 rad"
                 distance = "5 cm"
               "#), Err(Error::WrongArg(_))));
    }

    #[test]
    fn read_from_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("sart.toml");
        fs::write(&path, "over_sampling = 3\nrandom_order = true\nseed = 42\n")?;
        let config = read_config_file(&path)?;
        assert_eq!((config.over_sampling, config.random_order, config.seed), (3, true, 42));
        Ok(())
    }
}
