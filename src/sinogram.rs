//! Measured (or synthesised) projection data: one row of ray values per
//! rotation angle, for each slice.

use ndarray::{Array3, ArrayView1};

use crate::error::{Error, Result};

#[derive(Clone, Debug, PartialEq)]
pub struct Sinogram {
    /// Rotation angles in radians, shared by all slices
    angles: Vec<f64>,
    /// Indexed by `[slice, rotation, ray]`
    values: Array3<f64>,
}

/// One rotation of one slice
#[derive(Clone, Debug)]
pub struct SinogramRotation<'s> {
    pub angle: f64,
    pub rays: ArrayView1<'s, f64>,
}

impl Sinogram {

    /// All-zero sinogram, to be filled by sinogram synthesis
    pub fn new(angles: Vec<f64>, slices: usize, rays: usize) -> Self {
        let values = Array3::zeros((slices, angles.len(), rays));
        Self { angles, values }
    }

    pub fn from_values(angles: Vec<f64>, values: Array3<f64>) -> Result<Self> {
        let (_, rotations, _) = values.dim();
        if rotations != angles.len() {
            return Err(Error::WrongArg(format!(
                "{} angles given for {} rotations", angles.len(), rotations)));
        }
        Ok(Self { angles, values })
    }

    /// Number of slices
    pub fn size  (&self) -> usize { self.values.dim().0 }
    pub fn rot_nb(&self) -> usize { self.values.dim().1 }
    pub fn ray_nb(&self) -> usize { self.values.dim().2 }

    pub fn angles(&self) -> &[f64] { &self.angles }

    pub fn rotation(&self, slice: usize, rot: usize) -> SinogramRotation<'_> {
        SinogramRotation {
            angle: self.angles[rot],
            rays: self.values.slice(ndarray::s![slice, rot, ..]),
        }
    }

    #[inline]
    pub fn get_point(&self, slice: usize, rot: usize, ray: usize) -> f64 {
        self.values[[slice, rot, ray]]
    }

    #[inline]
    pub fn set_point(&mut self, slice: usize, rot: usize, ray: usize, value: f64) {
        self.values[[slice, rot, ray]] = value;
    }

    pub fn values(&self) -> &Array3<f64> { &self.values }
}
