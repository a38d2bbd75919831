//! Sampling of rays through the circular active region of a phantom slice.
//!
//! Rays are walked at fixed increments of `1/over_sampling` voxel widths
//! (Joseph's method): rather than tracking exact voxel boundary crossings,
//! the phantom is interpolated at every sample point. Finer increments give
//! better accuracy at linearly increasing cost.

use geometry::{circle_line_intersection, Chord};

use crate::geometry_table::LookupTable;
use crate::ray::{Ray, Rotation};
use crate::selector::VoxelSelector;
use crate::types::{Intensityf64, Lengthf64, Point, Vector, RAY_WIDTH};

#[derive(Clone, Debug)]
pub struct ScannerPhantom2D {
    selector: VoxelSelector,
    /// Radius of the active disc, in voxel widths
    radius: Lengthf64,
    over_sampling: usize,
    rays_per_rotation: usize,
    /// Intensity of the beam entering every incoming ray
    i0: Intensityf64,
}

/// Quantities shared by all rays of one rotation
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RotationData {
    /// Direction of travel of the incoming beam
    pub direction: Vector,
    /// Axis along which parallel rays are offset from one another
    pub normal: Vector,
    /// Step between consecutive sample points
    pub increment: Vector,
}

/// Per-thread ray buffers: a pool of incoming rays for one rotation, and a
/// single ray for tracing outgoing beams.
pub struct Scratch {
    pub incoming: Vec<Ray>,
    pub outgoing: Ray,
}

impl ScannerPhantom2D {

    /// `[length, width]` of the phantom slice
    pub fn new(
        [length, width]: [usize; 2],
        radius: Lengthf64,
        over_sampling: usize,
        rays_per_rotation: usize,
        interpolation: bool,
    ) -> Self {
        Self {
            selector: VoxelSelector::new(length, width, interpolation),
            radius, over_sampling, rays_per_rotation,
            i0: 1.0,
        }
    }

    pub fn with_i0(self, i0: Intensityf64) -> Self { Self { i0, ..self } }

    /// Number of rays of width `RAY_WIDTH` needed to cover a disc of `radius`
    pub fn rays_to_cover(radius: Lengthf64) -> usize {
        (2.0 * radius / RAY_WIDTH).ceil() as usize
    }

    pub fn radius           (&self) -> Lengthf64     { self.radius }
    pub fn over_sampling    (&self) -> usize         { self.over_sampling }
    pub fn rays_per_rotation(&self) -> usize         { self.rays_per_rotation }
    pub fn selector         (&self) -> VoxelSelector { self.selector }
    pub fn i0               (&self) -> Intensityf64  { self.i0 }

    /// Enough sample points for the longest chord through the active disc
    pub fn ray_capacity(&self) -> usize {
        (2.0 * self.radius * self.over_sampling as f64).ceil() as usize + 1
    }

    pub fn ray_pool(&self) -> Vec<Ray> {
        (0..self.rays_per_rotation)
            .map(|_| {
                let mut ray = Ray::with_capacity(self.ray_capacity());
                ray.i0 = self.i0;
                ray
            })
            .collect()
    }

    pub fn scratch(&self) -> Scratch {
        Scratch { incoming: self.ray_pool(), outgoing: Ray::with_capacity(self.ray_capacity()) }
    }

    /// Signed distance of ray `i` from the centre of rotation. The rays are
    /// laid out symmetrically about the centre.
    pub fn ray_offset(&self, i: usize) -> Lengthf64 {
        (i as f64 - (self.rays_per_rotation as f64 - 1.0) / 2.0) * RAY_WIDTH
    }

    pub fn set_rot_data(&self, angle: f64) -> RotationData {
        let direction = Vector::from_angle(angle);
        RotationData {
            direction,
            normal: direction.perpendicular(),
            increment: direction * (1.0 / self.over_sampling as f64),
        }
    }

    /// Where the line `origin + t * direction` crosses the boundary of the
    /// active disc. `None` if it misses the disc.
    pub fn fix_ray_exit(&self, origin: Point, direction: Vector) -> Option<Chord> {
        circle_line_intersection(origin, direction, self.radius)
    }

    /// Sample the incoming ray at distance `offset` from the centre, for the
    /// rotation described by `rot`.
    ///
    /// The points are spaced by one increment and centred on the middle of
    /// the chord. A ray tangent to the disc gets a single point; a ray
    /// missing the disc gets none.
    pub fn sample_line(&self, ray: &mut Ray, rot: &RotationData, offset: Lengthf64) {
        ray.reset();
        ray.point_increment = rot.increment;
        let origin = Point::zero() + rot.normal * offset;
        let Some(chord) = self.fix_ray_exit(origin, rot.direction) else {
            ray.init_position = origin;
            return;
        };
        let n = ((chord.length() * self.over_sampling as f64).round() as usize)
            .max(1)
            .min(ray.capacity());
        let middle = origin + rot.direction * ((chord.entry + chord.exit) / 2.0);
        ray.init_position = middle - rot.increment * ((n as f64 - 1.0) / 2.0);
        self.fill(ray, n);
    }

    /// Sample from `origin` forwards along `direction` until the ray leaves
    /// the active disc. Used for beams emitted inside the sample.
    pub fn sample_line_from_origin_and_direction(&self, ray: &mut Ray, origin: Point, direction: Vector) {
        ray.reset();
        ray.point_increment = direction * (1.0 / self.over_sampling as f64);
        ray.init_position = origin;
        let Some(chord) = self.fix_ray_exit(origin, direction) else { return };
        if chord.exit <= 0.0 { return }
        let start = chord.entry.max(0.0);
        let n = (((chord.exit - start) * self.over_sampling as f64).round() as usize)
            .min(ray.capacity());
        ray.init_position = origin + direction * start + ray.point_increment * 0.5;
        self.fill(ray, n);
    }

    fn fill(&self, ray: &mut Ray, n: usize) {
        let mut position = ray.init_position;
        let increment = ray.point_increment;
        for _ in 0..n {
            let Some(point) = ray.next_point() else { break };
            self.selector.select_voxels(position, point);
            position += increment;
        }
    }

    /// Sample every ray of the rotation at `angle` into `pool`
    pub fn sample_rotation(&self, pool: &mut [Ray], angle: f64) {
        let rot = self.set_rot_data(angle);
        for (i, ray) in pool.iter_mut().enumerate() {
            self.sample_line(ray, &rot, self.ray_offset(i));
        }
    }

    /// Sample all rotations, record how many points each one has, and build
    /// the table locating every ray's points in flat per-point arrays.
    pub fn sample_voxels(&self, pool: &mut [Ray], rotations: &mut [Rotation]) -> LookupTable {
        let mut ray_sizes = Vec::with_capacity(rotations.len() * self.rays_per_rotation);
        for rotation in rotations.iter_mut() {
            self.sample_rotation(pool, rotation.angle);
            ray_sizes.extend(pool.iter().map(Ray::len));
            rotation.tot_sampled_points = pool.iter().map(Ray::len).sum();
        }
        LookupTable::from_ray_sizes(self.rays_per_rotation, &ray_sizes)
    }
}
