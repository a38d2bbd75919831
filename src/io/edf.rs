//! ESRF data format (EDF) images: an ASCII header of `key = value ;` pairs
//! between braces, padded with spaces to a multiple of 512 bytes, followed
//! by the image as raw 4-byte floats, `Dim_1` varying fastest.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Cursor, Write};
use std::path::Path;

use binrw::{BinReaderExt, BinWrite, Endian};

use crate::error::{Error, Result};
use crate::sinogram::Sinogram;
use crate::volume::Volume;

/// Size of the headers written by this module
pub const HEADER_SIZE: usize = 1024;
const HEADER_BLOCK: usize = 512;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ByteOrder {
    LowByteFirst,
    HighByteFirst,
}

impl ByteOrder {
    fn endian(self) -> Endian {
        match self {
            Self::LowByteFirst  => Endian::Little,
            Self::HighByteFirst => Endian::Big,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::LowByteFirst  => "LowByteFirst",
            Self::HighByteFirst => "HighByteFirst",
        }
    }

    fn parse(name: &str) -> Result<Self> {
        match name {
            "LowByteFirst"  => Ok(Self::LowByteFirst),
            "HighByteFirst" => Ok(Self::HighByteFirst),
            _ => Err(Error::WrongFile(format!("EDF: unknown byte order `{name}`"))),
        }
    }
}

/// An image read from an EDF file
#[derive(Clone, Debug, PartialEq)]
pub struct EdfImage {
    pub dim_1: usize,
    pub dim_2: usize,
    pub byte_order: ByteOrder,
    pub data: Vec<f32>,
}

fn header(dim_1: usize, dim_2: usize, byte_order: ByteOrder) -> Result<String> {
    let mut header = format!(
        "{{\nHeaderID = EH:000001:000000:000000 ;\nImage = 1 ;\nByteOrder = {} ;\n\
         DataType = Float ;\nDim_1 = {dim_1} ;\nDim_2 = {dim_2} ;\nSize = {} ;\n",
        byte_order.name(), dim_1 * dim_2 * std::mem::size_of::<f32>());
    if header.len() + 2 > HEADER_SIZE {
        return Err(Error::WrongArg(format!("EDF header of {} bytes does not fit", header.len())));
    }
    let padding = HEADER_SIZE - 2 - header.len();
    header.extend(std::iter::repeat(' ').take(padding));
    header.push_str("}\n");
    Ok(header)
}

/// Write `data`, a `dim_1 × dim_2` image with `dim_1` varying fastest, as
/// 4-byte floats
pub fn write_data_to_edf(
    path: impl AsRef<Path>,
    data: &[f64],
    dim_1: usize,
    dim_2: usize,
    byte_order: ByteOrder,
) -> Result<()> {
    if data.len() != dim_1 * dim_2 {
        return Err(Error::WrongArg(format!(
            "{} values do not make a {dim_1}x{dim_2} image", data.len())));
    }
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(header(dim_1, dim_2, byte_order)?.as_bytes())?;
    let values: Vec<f32> = data.iter().map(|&v| v as f32).collect();
    values.write_options(&mut writer, byte_order.endian(), ())?;
    Ok(writer.flush()?)
}

/// Write every slice of `volume` one after the other: `Dim_1` is the
/// volume's length, `Dim_2` its width times its height.
pub fn write_volume(path: impl AsRef<Path>, volume: &Volume, byte_order: ByteOrder) -> Result<()> {
    let [length, width, height] = volume.dims();
    write_data_to_edf(path, volume.data(), length, width * height, byte_order)
}

/// Write one slice of `sinogram`: one row of rays per rotation
pub fn write_sinogram(path: impl AsRef<Path>, sinogram: &Sinogram, slice: usize, byte_order: ByteOrder) -> Result<()> {
    if slice >= sinogram.size() {
        return Err(Error::WrongArg(format!("no slice {slice} in a sinogram of {} slices", sinogram.size())));
    }
    let data: Vec<f64> = (0..sinogram.rot_nb())
        .flat_map(|rot| sinogram.rotation(slice, rot).rays.to_vec())
        .collect();
    write_data_to_edf(path, &data, sinogram.ray_nb(), sinogram.rot_nb(), byte_order)
}

fn parse_header(text: &str) -> Result<HashMap<&str, &str>> {
    let body = text.trim_end().strip_prefix('{').and_then(|t| t.strip_suffix('}'))
        .ok_or_else(|| Error::WrongFile("EDF: header is not enclosed in braces".into()))?;
    Ok(body.split(';')
       .filter_map(|entry| entry.split_once('='))
       .map(|(key, value)| (key.trim(), value.trim()))
       .collect())
}

fn dimension(fields: &HashMap<&str, &str>, key: &str) -> Result<usize> {
    let text = fields.get(key)
        .ok_or_else(|| Error::WrongFile(format!("EDF: header lacks {key}")))?;
    text.parse().map_err(|e| Error::parse(text, &format!("EDF header {key}"), e))
}

pub fn read_edf(path: impl AsRef<Path>) -> Result<EdfImage> {
    let bytes = fs::read(path)?;
    let end = bytes.windows(2).position(|w| w == b"}\n")
        .map(|i| i + 2)
        .ok_or_else(|| Error::WrongFile("EDF: no end of header".into()))?;
    if end % HEADER_BLOCK != 0 {
        return Err(Error::WrongFile(format!("EDF: header of {end} bytes is not a multiple of {HEADER_BLOCK}")));
    }
    let text = String::from_utf8_lossy(&bytes[..end]);
    let fields = parse_header(&text)?;
    // `FloatValue` is the long spelling of `Float` used by other EDF writers
    let data_type = fields.get("DataType").copied().unwrap_or("Float");
    if !matches!(data_type, "Float" | "FloatValue") {
        return Err(Error::WrongFile(format!("EDF: unsupported data type {data_type}")));
    }
    let byte_order = ByteOrder::parse(fields.get("ByteOrder").copied().unwrap_or("LowByteFirst"))?;
    let dim_1 = dimension(&fields, "Dim_1")?;
    let dim_2 = dimension(&fields, "Dim_2")?;
    let n = dim_1 * dim_2;
    let payload = &bytes[end..];
    if payload.len() < n * std::mem::size_of::<f32>() {
        return Err(Error::WrongFile(format!(
            "EDF: {} bytes of data for a {dim_1}x{dim_2} image", payload.len())));
    }
    let mut reader = Cursor::new(payload);
    let data = (0..n)
        .map(|_| reader.read_type::<f32>(byte_order.endian()))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(EdfImage { dim_1, dim_2, byte_order, data })
}

/// A single-slice volume of `Dim_1 × Dim_2` voxels
pub fn read_volume(path: impl AsRef<Path>) -> Result<Volume> {
    let image = read_edf(path)?;
    let data = image.data.iter().map(|&v| v as f64).collect();
    Volume::from_data([image.dim_1, image.dim_2, 1], data)
}
