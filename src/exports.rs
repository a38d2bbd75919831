pub use crate::types::*;

pub use crate::error::{Error, Result};
pub use crate::config::{Detector, Modality, OutgoingRayAlgorithm, ReconstructionParameters, read_config_file};
pub use crate::volume::{Mask, Volume};
pub use crate::sinogram::{Sinogram, SinogramRotation};
pub use crate::sart::SartAlgorithm;
pub use crate::reconstruction::{Projection, Reconstruction};
pub use crate::geometry_factory::GeometryFactory;
pub use crate::geometry_table::{GeometryTable, LookupTable};
