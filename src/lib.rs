mod exports;
pub use exports::*;

pub mod types;
pub mod error;
pub mod volume;
pub mod sinogram;
pub mod config;
pub mod ray;
pub mod selector;
pub mod scanner;
pub mod geometry_table;
pub mod geometry_factory;
pub mod reconstruction;
pub mod backprojection;
pub mod sart;
pub mod io;
