//! Plain-text sinograms and volumes.
//!
//! Sinogram: the numbers of slices, rotations and rays on one line each,
//! then the rotation angles (radians) on one line, then one line of ray
//! values per rotation, slice after slice. Transmission files hold the
//! attenuation `−ln(I/I₀)` along each ray, and are converted to and from
//! the transmitted intensities kept in memory. Fluorescence and diffraction
//! files hold the measured signal as is.
//!
//! Volume: length, width and height on one line each, then `height` blocks
//! of `width` lines of `length` values.
//!
//! Blank lines are ignored.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use itertools::Itertools;
use ndarray::Array3;

use crate::config::{Modality, ReconstructionParameters};
use crate::error::{Error, Result};
use crate::sinogram::Sinogram;
use crate::volume::Volume;

struct Lines<R> {
    lines: std::io::Lines<R>,
    what: &'static str,
    number: usize,
}

impl<R: BufRead> Lines<R> {

    fn new(reader: R, what: &'static str) -> Self { Self { lines: reader.lines(), what, number: 0 } }

    fn next_line(&mut self) -> Result<String> {
        loop {
            let Some(line) = self.lines.next() else {
                return Err(Error::WrongFile(format!(
                    "{}: unexpected end of file after line {}", self.what, self.number)));
            };
            self.number += 1;
            let line = line?;
            if !line.trim().is_empty() { return Ok(line) }
        }
    }

    fn count(&mut self, name: &str) -> Result<usize> {
        let line = self.next_line()?;
        let text = line.trim();
        text.parse()
            .map_err(|e| Error::parse(text, &format!("{} {name}, line {}", self.what, self.number), e))
    }

    fn values(&mut self, expected: usize, name: &str) -> Result<Vec<f64>> {
        if expected == 0 { return Ok(vec![]) }
        let line = self.next_line()?;
        let values = line.split_whitespace()
            .map(|v| v.parse::<f64>()
                 .map_err(|e| Error::parse(v, &format!("{} {name}, line {}", self.what, self.number), e)))
            .collect::<Result<Vec<_>>>()?;
        if values.len() != expected {
            return Err(Error::WrongFile(format!(
                "{} {name}, line {}: expected {expected} values, found {}",
                self.what, self.number, values.len())));
        }
        Ok(values)
    }
}

fn join(values: impl IntoIterator<Item = f64>) -> String {
    values.into_iter().map(|v| format!("{v:e}")).join(" ")
}

/// Conversion of ray values between file and memory
#[derive(Clone, Copy, Debug)]
enum RayValues {
    /// `−ln(I/I₀)` in the file, `I` in memory
    Attenuation { i0: f64 },
    Signal,
}

impl RayValues {
    fn of(params: &ReconstructionParameters) -> Self {
        match params.modality {
            Modality::Transmission => Self::Attenuation { i0: params.i0 },
            Modality::Fluorescence | Modality::Diffraction => Self::Signal,
        }
    }

    fn load(self, v: f64) -> f64 {
        match self {
            Self::Attenuation { i0 } => i0 * (-v).exp(),
            Self::Signal => v,
        }
    }

    fn store(self, v: f64) -> f64 {
        match self {
            Self::Attenuation { i0 } => -(v / i0).ln(),
            Self::Signal => v,
        }
    }
}

/// Read a sinogram measured with the modality and beam intensity of `params`
pub fn read_sinogram_from(reader: impl BufRead, params: &ReconstructionParameters) -> Result<Sinogram> {
    let convert = RayValues::of(params);
    let mut lines = Lines::new(reader, "sinogram");
    let slices    = lines.count("slice count")?;
    let rotations = lines.count("rotation count")?;
    let rays      = lines.count("ray count")?;
    let angles = lines.values(rotations, "angles")?;
    let mut data = Vec::with_capacity(slices * rotations * rays);
    for _ in 0..slices * rotations {
        data.extend(lines.values(rays, "ray values")?.into_iter().map(|v| convert.load(v)));
    }
    let values = Array3::from_shape_vec((slices, rotations, rays), data)
        .map_err(|e| Error::WrongFile(format!("sinogram: {e}")))?;
    Sinogram::from_values(angles, values)
}

pub fn write_sinogram_to(mut writer: impl Write, sinogram: &Sinogram, params: &ReconstructionParameters) -> Result<()> {
    let convert = RayValues::of(params);
    writeln!(writer, "{}", sinogram.size())?;
    writeln!(writer, "{}", sinogram.rot_nb())?;
    writeln!(writer, "{}", sinogram.ray_nb())?;
    writeln!(writer, "{}", sinogram.angles().iter().join(" "))?;
    for row in sinogram.values().rows() {
        writeln!(writer, "{}", join(row.iter().map(|&v| convert.store(v))))?;
    }
    Ok(())
}

pub fn read_volume_from(reader: impl BufRead) -> Result<Volume> {
    let mut lines = Lines::new(reader, "volume");
    let length = lines.count("length")?;
    let width  = lines.count("width")?;
    let height = lines.count("height")?;
    let mut data = Vec::with_capacity(length * width * height);
    for _ in 0..width * height {
        data.extend(lines.values(length, "voxel values")?);
    }
    Volume::from_data([length, width, height], data)
}

pub fn write_volume_to(mut writer: impl Write, volume: &Volume) -> Result<()> {
    let [length, width, height] = volume.dims();
    writeln!(writer, "{length}\n{width}\n{height}")?;
    if volume.is_empty() { return Ok(()) }
    for block in volume.data().chunks(length * width) {
        for line in block.chunks(length) {
            writeln!(writer, "{}", join(line.iter().copied()))?;
        }
        writeln!(writer)?;
    }
    Ok(())
}

pub fn read_sinogram(path: impl AsRef<Path>, params: &ReconstructionParameters) -> Result<Sinogram> {
    read_sinogram_from(BufReader::new(File::open(path)?), params)
}

pub fn write_sinogram(path: impl AsRef<Path>, sinogram: &Sinogram, params: &ReconstructionParameters) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_sinogram_to(&mut writer, sinogram, params)?;
    Ok(writer.flush()?)
}

pub fn read_volume(path: impl AsRef<Path>) -> Result<Volume> {
    read_volume_from(BufReader::new(File::open(path)?))
}

pub fn write_volume(path: impl AsRef<Path>, volume: &Volume) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_volume_to(&mut writer, volume)?;
    Ok(writer.flush()?)
}
