//! Reading and writing sinograms and volumes
pub mod text;
pub mod edf;
