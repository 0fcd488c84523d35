//! NIfTI file I/O
//!
//! Whole-file reads and in-place rewrites of `.nii` / `.nii.gz` images for the
//! header repair, plus voxel loading through the `nifti` crate for inspecting
//! image contents.

use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use ndarray::Array;
use nifti::volume::ndarray::IntoNdArray;
use nifti::{InMemNiftiObject, NiftiObject};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{Error, Result};
use crate::header::{Affine, NiftiHeader, NiftiMagic, HEADER_SIZE};

/// Check if bytes are gzip compressed
pub fn is_gzip(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0x1f && bytes[1] == 0x8b
}

/// Decompress every gzip member, as bgzip and concatenated streams have
/// more than one.
fn gunzip(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = MultiGzDecoder::new(Cursor::new(bytes));
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

fn gzip(bytes: &[u8]) -> Result<Vec<u8>> {
    let compress_err = |e: std::io::Error| Error::Unsupported(format!("gzip compression failed: {}", e));
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).map_err(compress_err)?;
    encoder.finish().map_err(compress_err)
}

/// A NIfTI file held in memory: parsed header plus the raw, uncompressed
/// file contents it was parsed from.
#[derive(Debug, Clone)]
pub struct NiftiFile {
    pub header: NiftiHeader,
    /// Whether the file on disk was gzip compressed.
    pub gzipped: bool,
    raw: Vec<u8>,
}

impl NiftiFile {
    /// Parse file contents, decompressing first if they are gzipped.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let gzipped = is_gzip(bytes);
        let raw = if gzipped {
            gunzip(bytes).map_err(|e| Error::InvalidHeader(format!("corrupt gzip stream: {}", e)))?
        } else {
            bytes.to_vec()
        };
        let header = NiftiHeader::from_bytes(&raw)?;

        if header.magic == NiftiMagic::SingleFile {
            let needed = data_end(&header);
            if (raw.len() as u64) < needed {
                return Err(Error::InvalidHeader(format!(
                    "image truncated: {} bytes, header describes {}",
                    raw.len(),
                    needed
                )));
            }
        }
        Ok(NiftiFile { header, gzipped, raw })
    }

    /// Voxel payload of a single-file image. Empty for the header half of
    /// an `ni1` pair.
    pub fn voxel_bytes(&self) -> &[u8] {
        if self.header.magic == NiftiMagic::Pair {
            return &[];
        }
        let offset = (self.header.vox_offset.max(0.0) as usize).min(self.raw.len());
        &self.raw[offset..]
    }

    /// Serialize with the current header, recompressing if the source was
    /// gzipped. Everything past the header is emitted unchanged.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = self.raw.clone();
        self.header.write_to(&mut out[..HEADER_SIZE])?;
        if !self.gzipped {
            return Ok(out);
        }

        gzip(&out)
    }
}

/// End of the voxel data a single-file header describes.
fn data_end(header: &NiftiHeader) -> u64 {
    let voxels = header
        .shape()
        .iter()
        .fold(1u64, |n, &d| n.saturating_mul(d as u64));
    let bits = voxels.saturating_mul(header.bitpix.max(0) as u64);
    (header.vox_offset.max(0.0) as u64).saturating_add(bits / 8)
}

/// Read and parse a NIfTI file from disk
pub fn read_image(path: &Path) -> Result<NiftiFile> {
    let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
    let image = NiftiFile::from_bytes(&bytes)?;
    debug!(
        path = %path.display(),
        gzipped = image.gzipped,
        qform_code = %image.header.qform_code,
        sform_code = %image.header.sform_code,
        "read NIfTI header"
    );
    Ok(image)
}

/// Replace the file at `path` with `image`.
///
/// The new contents go to a temporary file in the same directory which is then
/// renamed over the target, so readers never observe a half-written image.
/// The target's permissions are carried over when it already exists, and a
/// symlink is written through to the file it points at.
pub fn write_image(path: &Path, image: &NiftiFile) -> Result<()> {
    let bytes = image.to_bytes()?;
    let resolved = fs::canonicalize(path).ok();
    let path = resolved.as_deref().unwrap_or(path);
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| Error::io(dir, e))?;
    tmp.write_all(&bytes).map_err(|e| Error::io(path, e))?;
    if let Ok(meta) = fs::metadata(path) {
        tmp.as_file()
            .set_permissions(meta.permissions())
            .map_err(|e| Error::io(path, e))?;
    }
    tmp.persist(path).map_err(|e| Error::io(path, e.error))?;
    Ok(())
}

/// NIfTI voxel data loaded from bytes
#[derive(Debug, Clone)]
pub struct NiftiData {
    /// Voxel values as f64, Fortran order (x varies fastest)
    pub data: Vec<f64>,
    /// Image shape, `dim[1..=ndim]`
    pub shape: Vec<usize>,
    /// Voxel sizes in mm
    pub voxel_size: (f64, f64, f64),
    /// Best available voxel-to-world transform
    pub affine: Affine,
    /// Data scaling slope
    pub scl_slope: f64,
    /// Data scaling intercept
    pub scl_inter: f64,
}

/// Load voxel data from `.nii` or `.nii.gz` bytes (gzip is auto-detected)
pub fn load_nifti(bytes: &[u8]) -> Result<NiftiData> {
    let file = NiftiFile::from_bytes(bytes)?;
    let header = &file.header;

    let obj = InMemNiftiObject::from_reader(Cursor::new(file.raw.as_slice()))
        .map_err(|e| Error::InvalidHeader(format!("failed to read NIfTI volume: {}", e)))?;

    let array: Array<f64, _> = obj
        .into_volume()
        .into_ndarray()
        .map_err(|e| Error::Unsupported(format!("failed to convert volume: {}", e)))?;

    // index = x + y*nx + z*nx*ny
    let data: Vec<f64> = array.t().iter().copied().collect();

    let scl_slope = if header.scl_slope == 0.0 { 1.0 } else { f64::from(header.scl_slope) };

    Ok(NiftiData {
        data,
        shape: array.shape().to_vec(),
        voxel_size: (
            f64::from(header.pixdim[1]),
            f64::from(header.pixdim[2]),
            f64::from(header.pixdim[3]),
        ),
        affine: header.best_affine(),
        scl_slope,
        scl_inter: f64::from(header.scl_inter),
    })
}

/// Read voxel data from a filesystem path
pub fn read_nifti_file(path: &Path) -> Result<NiftiData> {
    let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
    load_nifti(&bytes)
}

/// Encode float32 voxel data behind `header` as an uncompressed `.nii`
///
/// The header's datatype, bitpix and vox_offset are forced to float32 at 352
/// (header plus the empty 4-byte extension block).
pub fn save_nifti(data: &[f64], header: &NiftiHeader) -> Result<Vec<u8>> {
    let expected: usize = header.shape().iter().product();
    if data.len() != expected {
        return Err(Error::InvalidHeader(format!(
            "data length {} does not match shape {:?}",
            data.len(),
            header.shape()
        )));
    }

    let mut header = header.clone();
    header.datatype = 16;
    header.bitpix = 32;
    header.vox_offset = 352.0;
    header.magic = NiftiMagic::SingleFile;

    let mut buffer = Vec::with_capacity(352 + data.len() * 4);
    buffer.extend_from_slice(&header.to_bytes());
    buffer.extend_from_slice(&[0u8; 4]);
    for &val in data {
        let val = val as f32;
        if header.little_endian {
            buffer.extend_from_slice(&val.to_le_bytes());
        } else {
            buffer.extend_from_slice(&val.to_be_bytes());
        }
    }
    Ok(buffer)
}

/// Save data as gzipped NIfTI bytes (.nii.gz)
pub fn save_nifti_gz(data: &[f64], header: &NiftiHeader) -> Result<Vec<u8>> {
    let uncompressed = save_nifti(data, header)?;
    gzip(&uncompressed)
}

/// Save NIfTI data to a file
///
/// If the path ends with .nii.gz, the file is gzip compressed.
/// Otherwise it is saved as uncompressed .nii.
pub fn save_nifti_to_file(path: &Path, data: &[f64], header: &NiftiHeader) -> Result<()> {
    let bytes = if path.to_string_lossy().ends_with(".gz") {
        save_nifti_gz(data, header)?
    } else {
        save_nifti(data, header)?
    };
    fs::write(path, &bytes).map_err(|e| Error::io(path, e))
}
