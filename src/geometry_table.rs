//! Sampled geometry of all rotations, and the per-point attenuation data
//! that goes with it.
//!
//! Per-point quantities (incoming loss fraction, solid angle, outgoing loss
//! fractions) are stored in flat arrays covering every sample point of every
//! ray of every rotation. The `LookupTable` locates a ray's points in them.

use std::ops::Range;

#[cfg(not(feature = "serial"))]
use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::ray::{Ray, Rotation};
use crate::scanner::{ScannerPhantom2D, Scratch};
use crate::types::{BoxDim_u, Ratiof64};
use crate::volume::Volume;

/// Maps `(rotation, ray)` to the offset of the ray's first sample point in
/// the flat per-point arrays.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LookupTable {
    rays_per_rotation: usize,
    /// Prefix sums of ray sizes, with a trailing total
    offsets: Vec<usize>,
}

impl LookupTable {

    /// `ray_sizes` lists the number of points of every ray, rotation by
    /// rotation.
    pub fn from_ray_sizes(rays_per_rotation: usize, ray_sizes: &[usize]) -> Self {
        debug_assert!(rays_per_rotation == 0 || ray_sizes.len() % rays_per_rotation == 0);
        let mut offsets = Vec::with_capacity(ray_sizes.len() + 1);
        let mut total = 0;
        offsets.push(total);
        for size in ray_sizes {
            total += size;
            offsets.push(total);
        }
        Self { rays_per_rotation, offsets }
    }

    /// Append the sizes of the rays of one more rotation
    pub fn push_rotation(&mut self, ray_sizes: &[usize]) {
        debug_assert_eq!(ray_sizes.len(), self.rays_per_rotation);
        if self.offsets.is_empty() { self.offsets.push(0) }
        let mut total = self.total_points();
        for size in ray_sizes {
            total += size;
            self.offsets.push(total);
        }
    }

    pub fn rays_per_rotation(&self) -> usize { self.rays_per_rotation }

    pub fn rotation_nb(&self) -> usize {
        if self.rays_per_rotation == 0 { return 0 }
        self.offsets.len().saturating_sub(1) / self.rays_per_rotation
    }

    pub fn total_points(&self) -> usize { self.offsets.last().copied().unwrap_or(0) }

    #[inline]
    fn ray_index(&self, rot: usize, ray: usize) -> usize { rot * self.rays_per_rotation + ray }

    #[inline]
    pub fn offset(&self, rot: usize, ray: usize) -> usize {
        debug_assert!(ray < self.rays_per_rotation && rot < self.rotation_nb());
        self.offsets[self.ray_index(rot, ray)]
    }

    pub fn try_offset(&self, rot: usize, ray: usize) -> Result<usize> {
        let size = self.rotation_nb() * self.rays_per_rotation;
        let index = self.ray_index(rot, ray);
        if ray >= self.rays_per_rotation || index >= size {
            return Err(Error::OutOfBound { index, size });
        }
        Ok(self.offsets[index])
    }

    /// Points of ray `ray` in rotation `rot`
    pub fn ray_range(&self, rot: usize, ray: usize) -> Range<usize> {
        let i = self.ray_index(rot, ray);
        self.offsets[i]..self.offsets[i + 1]
    }

    pub fn ray_len(&self, rot: usize, ray: usize) -> usize { self.ray_range(rot, ray).len() }

    /// Points of all rays of rotation `rot`
    pub fn rotation_range(&self, rot: usize) -> Range<usize> {
        let first = self.ray_index(rot, 0);
        self.offsets[first]..self.offsets[first + self.rays_per_rotation]
    }

    /// Split a flat per-point array into disjoint per-rotation slices
    pub fn split_by_rotation<'a, T>(&self, mut data: &'a mut [T]) -> Vec<&'a mut [T]> {
        debug_assert_eq!(data.len(), self.total_points());
        let mut chunks = Vec::with_capacity(self.rotation_nb());
        for rot in 0..self.rotation_nb() {
            let (head, tail) = std::mem::take(&mut data).split_at_mut(self.rotation_range(rot).len());
            chunks.push(head);
            data = tail;
        }
        chunks
    }
}

/// The sampled geometry of a whole scan
#[derive(Clone, Debug)]
pub struct GeometryTable {
    scanner: ScannerPhantom2D,
    phantom_dims: BoxDim_u,
    rotations: Vec<Rotation>,
    lookup: LookupTable,
    pub(crate) incoming_loss_fraction: Vec<Ratiof64>,
    pub(crate) solid_angles: Vec<Ratiof64>,
    /// One per-point array per detector
    pub(crate) outgoing_loss_fractions: Vec<Vec<Ratiof64>>,
    /// `[detector][rotation]`; only filled by matrix subdivision
    pub(crate) self_absorption_matrices: Vec<Vec<Volume>>,
}

impl GeometryTable {

    pub fn new(scanner: ScannerPhantom2D, phantom_dims: BoxDim_u, rotations: Vec<Rotation>, lookup: LookupTable) -> Self {
        let total = lookup.total_points();
        Self {
            scanner, phantom_dims, rotations, lookup,
            incoming_loss_fraction: vec![1.0; total],
            solid_angles: vec![1.0; total],
            outgoing_loss_fractions: vec![],
            self_absorption_matrices: vec![],
        }
    }

    pub fn scanner     (&self) -> &ScannerPhantom2D { &self.scanner }
    pub fn phantom_dims(&self) -> BoxDim_u          { self.phantom_dims }
    pub fn rotations   (&self) -> &[Rotation]       { &self.rotations }
    pub fn lookup      (&self) -> &LookupTable      { &self.lookup }
    pub fn rotation_nb (&self) -> usize             { self.rotations.len() }
    pub fn rays_per_rotation(&self) -> usize        { self.scanner.rays_per_rotation() }

    pub fn rotation(&self, rot: usize) -> Result<&Rotation> {
        let size = self.rotations.len();
        self.rotations.get(rot).ok_or(Error::OutOfBound { index: rot, size })
    }

    /// Append a rotation at `angle`. Per-point data for the new rotation
    /// start out unattenuated, and any self-absorption data is dropped as it
    /// no longer covers every rotation.
    pub fn add_rotation(&mut self, angle: f64, integral_normalization: f64) {
        let mut pool = self.scanner.ray_pool();
        self.scanner.sample_rotation(&mut pool, angle);
        let sizes: Vec<usize> = pool.iter().map(Ray::len).collect();
        let tot_sampled_points = sizes.iter().sum();
        self.lookup.push_rotation(&sizes);
        self.rotations.push(Rotation { angle, integral_normalization, tot_sampled_points });
        let total = self.lookup.total_points();
        self.incoming_loss_fraction.resize(total, 1.0);
        self.solid_angles          .resize(total, 1.0);
        self.outgoing_loss_fractions.clear();
        self.self_absorption_matrices.clear();
    }

    /// Resample the rays of rotation `rot` into `pool`
    pub fn init_rotation(&self, rot: usize, pool: &mut [Ray]) -> Result<&Rotation> {
        let rotation = self.rotation(rot)?;
        if pool.len() != self.rays_per_rotation() {
            return Err(Error::WrongArg(format!(
                "ray pool holds {} rays, rotation has {}", pool.len(), self.rays_per_rotation())));
        }
        self.scanner.sample_rotation(pool, rotation.angle);
        debug_assert_eq!(pool.iter().map(Ray::len).sum::<usize>(), rotation.tot_sampled_points);
        Ok(rotation)
    }

    pub fn incoming_loss_fraction(&self) -> &[Ratiof64] { &self.incoming_loss_fraction }
    pub fn solid_angles          (&self) -> &[Ratiof64] { &self.solid_angles }

    pub fn outgoing_loss_fraction(&self, detector: usize) -> Option<&[Ratiof64]> {
        self.outgoing_loss_fractions.get(detector).map(Vec::as_slice)
    }

    pub fn self_absorption_matrix(&self, detector: usize, rot: usize) -> Option<&Volume> {
        self.self_absorption_matrices.get(detector)?.get(rot)
    }

    /// Forget all attenuation and solid-angle data
    pub fn clear_attenuation(&mut self) {
        self.incoming_loss_fraction.fill(1.0);
        self.solid_angles.fill(1.0);
        self.outgoing_loss_fractions.clear();
        self.self_absorption_matrices.clear();
    }

    /// Number of detectors for which outgoing loss fractions are available
    pub fn detector_nb(&self) -> usize { self.outgoing_loss_fractions.len() }

    /// Run `job` on every rotation, handing it the rotation's chunk of the
    /// flat per-point array `data`, and per-thread ray buffers in which the
    /// rotation's incoming rays have been sampled.
    ///
    /// Rotations are independent, so they are processed in parallel unless
    /// the `serial` feature is enabled.
    pub fn for_each_rotation<T, F>(&self, data: &mut [T], job: F) -> Result<()>
    where
        T: Send,
        F: Fn(&mut Scratch, usize, &Rotation, &mut [T]) -> Result<()> + Sync + Send,
    {
        let work: Vec<_> = self.rotations.iter()
            .zip(self.lookup.split_by_rotation(data))
            .enumerate()
            .collect();
        let run = |scratch: &mut Scratch, (rot, (rotation, chunk)): (usize, (&Rotation, &mut [T]))| {
            self.scanner.sample_rotation(&mut scratch.incoming, rotation.angle);
            job(scratch, rot, rotation, chunk)
        };

        #[cfg(not(feature = "serial"))]
        { work.into_par_iter().try_for_each_init(|| self.scanner.scratch(), run) }

        #[cfg(feature = "serial")]
        {
            let mut scratch = self.scanner.scratch();
            work.into_iter().try_for_each(|item| run(&mut scratch, item))
        }
    }

    /// Compute one value per rotation, in rotation order. `job` receives
    /// the same freshly-sampled ray buffers as in `for_each_rotation`.
    pub fn map_rotations<R, F>(&self, job: F) -> Result<Vec<R>>
    where
        R: Send,
        F: Fn(&mut Scratch, usize, &Rotation) -> Result<R> + Sync + Send,
    {
        let run = |scratch: &mut Scratch, (rot, rotation): (usize, &Rotation)| {
            self.scanner.sample_rotation(&mut scratch.incoming, rotation.angle);
            job(scratch, rot, rotation)
        };

        #[cfg(not(feature = "serial"))]
        { self.rotations.par_iter().enumerate().map_init(|| self.scanner.scratch(), run).collect() }

        #[cfg(feature = "serial")]
        {
            let mut scratch = self.scanner.scratch();
            self.rotations.iter().enumerate().map(|item| run(&mut scratch, item)).collect()
        }
    }
}

/// Split the chunk of per-point data belonging to one rotation into the
/// parts belonging to each of its rays.
pub fn split_by_ray<'a, T>(mut chunk: &'a mut [T], rays: &[Ray]) -> Vec<&'a mut [T]> {
    let mut parts = Vec::with_capacity(rays.len());
    for ray in rays {
        let (head, tail) = std::mem::take(&mut chunk).split_at_mut(ray.len());
        parts.push(head);
        chunk = tail;
    }
    debug_assert!(chunk.is_empty());
    parts
}
