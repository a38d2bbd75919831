//! Dense voxel storage shared by phantoms, absorption matrices, self-absorption
//! matrices and voxel masks.

use ndarray::azip;

use crate::error::{Error, Result};
use crate::types::{BoxDim_u, Densityf64, Index1_u, Index3_u};

/// Position of voxel `[ix, iy, iz]` in the buffer of a volume with dimensions
/// `dims`. `x` varies fastest, `z` slowest.
#[inline]
pub(crate) fn flat_index([ix, iy, iz]: Index3_u, [length, width, _]: BoxDim_u) -> Index1_u {
    (iz * width + iy) * length + ix
}

/// A flat buffer of voxel values with `[length, width, height]` dimensions.
///
/// The buffer always holds exactly `length * width * height` values. A
/// volume with any zero dimension is empty.
#[derive(Clone, Debug, PartialEq)]
pub struct Volume<T = Densityf64> {
    dims: BoxDim_u,
    data: Vec<T>,
}

/// Selects the voxels which contribute to a masked ray sum
pub type Mask = Volume<bool>;

impl<T: Clone + Default> Volume<T> {

    /// Volume of given dimensions, filled with `T::default()`
    pub fn new(dims: BoxDim_u) -> Self {
        let [l, w, h] = dims;
        Self { dims, data: vec![T::default(); l * w * h] }
    }

    /// Single-slice volume
    pub fn new_2d(length: usize, width: usize) -> Self { Self::new([length, width, 1]) }

    pub fn empty() -> Self { Self::new([0, 0, 0]) }

    pub fn from_data(dims: BoxDim_u, data: Vec<T>) -> Result<Self> {
        let [l, w, h] = dims;
        if data.len() != l * w * h {
            return Err(Error::WrongArg(format!(
                "{} values do not fill a volume of dimensions {:?}", data.len(), dims)));
        }
        Ok(Self { dims, data })
    }

    /// Change the dimensions and set every voxel to `T::default()`
    pub fn reset(&mut self, dims: BoxDim_u) {
        let [l, w, h] = dims;
        self.dims = dims;
        self.data.clear();
        self.data.resize(l * w * h, T::default());
    }

    /// Set every voxel to `T::default()`, keeping the dimensions
    pub fn clear_values(&mut self) {
        self.data.iter_mut().for_each(|v| *v = T::default());
    }
}

impl<T> Volume<T> {
    pub fn dims  (&self) -> BoxDim_u { self.dims }
    pub fn length(&self) -> usize { self.dims[0] }
    pub fn width (&self) -> usize { self.dims[1] }
    pub fn height(&self) -> usize { self.dims[2] }

    pub fn len(&self) -> usize { self.data.len() }
    pub fn is_empty(&self) -> bool { self.data.is_empty() }

    pub fn data(&self) -> &[T] { &self.data }
    pub fn data_mut(&mut self) -> &mut [T] { &mut self.data }

    pub fn have_equal_dimensions<U>(&self, other: &Volume<U>) -> bool {
        self.dims == other.dims
    }

    #[inline]
    pub fn get(&self, ix: usize, iy: usize, iz: usize) -> &T {
        &self[[ix, iy, iz]]
    }

    /// Bounds-checked access which reports the offending index instead of
    /// panicking
    pub fn try_get(&self, ix: usize, iy: usize, iz: usize) -> Result<&T> {
        let [l, w, h] = self.dims;
        if ix >= l || iy >= w || iz >= h {
            let index = flat_index([ix, iy, iz], self.dims);
            return Err(Error::OutOfBound { index, size: self.len() });
        }
        Ok(self.get(ix, iy, iz))
    }
}

impl Volume<Densityf64> {

    /// Add `corrections` voxel by voxel, clamping every result into
    /// `[lower_limit, upper_limit]`.
    pub fn set_corrections(&mut self, corrections: &Self, upper_limit: f64, lower_limit: f64) -> Result<()> {
        if !self.have_equal_dimensions(corrections) {
            return Err(Error::WrongArg(format!(
                "corrections of dimensions {:?} cannot be applied to volume of dimensions {:?}",
                corrections.dims, self.dims)));
        }
        azip!((voxel in &mut self.data[..], &c in &corrections.data[..]) {
            *voxel = (*voxel + c).max(lower_limit).min(upper_limit)
        });
        Ok(())
    }

    pub fn sum(&self) -> f64 { self.data.iter().sum() }
}

impl<T> core::ops::Index<Index1_u> for Volume<T> {
    type Output = T;
    #[inline]
    fn index(&self, i: Index1_u) -> &Self::Output {
        debug_assert!(i < self.data.len(), "voxel {i} outside volume of {} voxels", self.data.len());
        &self.data[i]
    }
}

impl<T> core::ops::IndexMut<Index1_u> for Volume<T> {
    #[inline]
    fn index_mut(&mut self, i: Index1_u) -> &mut Self::Output {
        debug_assert!(i < self.data.len(), "voxel {i} outside volume of {} voxels", self.data.len());
        &mut self.data[i]
    }
}

impl<T> core::ops::Index<Index3_u> for Volume<T> {
    type Output = T;
    fn index(&self, i3: Index3_u) -> &Self::Output {
        &self[flat_index(i3, self.dims)]
    }
}

impl<T> core::ops::IndexMut<Index3_u> for Volume<T> {
    fn index_mut(&mut self, i3: Index3_u) -> &mut Self::Output {
        let i1 = flat_index(i3, self.dims);
        &mut self[i1]
    }
}
