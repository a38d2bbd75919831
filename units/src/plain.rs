/// Quantities which are kept as bare `f64`s rather than `uom` `Quantity`s.
///
/// The inner loops of the ray sampler and of the SART iterations work in
/// voxel-width units and on attenuation coefficients stored inside volumes.
/// Wrapping every one of those in `uom` would buy nothing but noise, so they
/// are plain floats whose aliases still give a clue as to what they represent.

/// Length expressed in voxel widths
pub type Lengthf64    = f64;
/// Linear attenuation coefficient (per centimetre) or emitter density
pub type Densityf64   = f64;
/// Beam or detected intensity
pub type Intensityf64 = f64;
/// Interpolation weight of a voxel in a ray sample
pub type Weightf64    = f64;
/// Fraction of the beam surviving attenuation, in `[0, 1]`
pub type Ratiof64     = f64;
