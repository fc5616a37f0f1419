//! NIfTI-1 reading and writing.
//!
//! Purpose
//! -------
//! Load input images, fixed-parameter maps and masks from `.nii` /
//! `.nii.gz` files into [`Volume`]s, and write output channels back.
//!
//! Key behaviors
//! -------------
//! - Reading goes through the `nifti` crate; gzip is detected from the
//!   magic bytes and decoded with `flate2`. Scale slope/intercept are
//!   applied by the decoder.
//! - 3-D files become single-channel volumes; the 4th dimension of 4-D
//!   files is the channel axis.
//! - Geometry comes from the sform when present, the qform otherwise, and
//!   falls back to `pixdim` spacing with identity direction.
//! - Writing builds a single-file NIfTI-1 header (float32, sform only) and
//!   gzips the result when the path ends in `.gz`.
//!
//! Conventions
//! -----------
//! - Voxel data on disk are x-fastest (Fortran order), channel slowest.
//! - Output precision is float32; geometry is stored as float32 in the
//!   header, which bounds round-trip precision (see `GEOMETRY_TOLERANCE`).
use crate::{
    fitting::errors::{FitError, FitResult},
    volume::{geometry::Geometry, image::Volume},
};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use ndarray::{Array4, Axis, Ix4};
use nifti::{volume::ndarray::IntoNdArray, InMemNiftiObject, NiftiHeader, NiftiObject};
use std::io::{Cursor, Write};
use std::path::Path;

const HEADER_SIZE: usize = 348;
const VOX_OFFSET: usize = 352;
const DT_FLOAT32: i16 = 16;

fn nifti_err(path: &Path, reason: impl ToString) -> FitError {
    FitError::Nifti { path: path.display().to_string(), reason: reason.to_string() }
}

fn io_err(path: &Path, err: std::io::Error) -> FitError {
    FitError::Io { path: path.display().to_string(), reason: err.to_string() }
}

fn is_gzip(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0x1f && bytes[1] == 0x8b
}

/// Read a `.nii` or `.nii.gz` file.
///
/// # Errors
/// - `FitError::Io` when the file cannot be read.
/// - `FitError::Nifti` for malformed files or more than four dimensions.
pub fn read_volume<P: AsRef<Path>>(path: P) -> FitResult<Volume> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| io_err(path, e))?;
    let object = if is_gzip(&bytes) {
        InMemNiftiObject::from_reader(GzDecoder::new(Cursor::new(bytes)))
    } else {
        InMemNiftiObject::from_reader(Cursor::new(bytes))
    }
    .map_err(|e| nifti_err(path, e))?;

    let header = object.header().clone();
    let ndim = usize::from(header.dim[0]);
    if !(1..=4).contains(&ndim) {
        return Err(nifti_err(path, format!("unsupported dimensionality {ndim}")));
    }
    let mut array = object
        .into_volume()
        .into_ndarray::<f64>()
        .map_err(|e| nifti_err(path, e))?;
    while array.ndim() < 4 {
        let axis = array.ndim();
        array = array.insert_axis(Axis(axis));
    }
    let data: Array4<f64> = array
        .into_dimensionality::<Ix4>()
        .map_err(|e| nifti_err(path, e))?
        .as_standard_layout()
        .into_owned();

    let (nx, ny, nz, _) = data.dim();
    let geometry = Geometry::from_affine([nx, ny, nz], &header_affine(&header));
    Volume::new(data, geometry)
}

/// Voxel-to-world affine from sform, qform or pixdim, in that order.
fn header_affine(header: &NiftiHeader) -> [[f64; 4]; 4] {
    let pixdim = |i: usize| {
        let v = f64::from(header.pixdim[i]).abs();
        if v > 0.0 {
            v
        } else {
            1.0
        }
    };
    let mut affine = [[0.0; 4]; 4];
    affine[3][3] = 1.0;
    if header.sform_code > 0 {
        for (r, row) in [header.srow_x, header.srow_y, header.srow_z].iter().enumerate() {
            for c in 0..4 {
                affine[r][c] = f64::from(row[c]);
            }
        }
    } else if header.qform_code > 0 {
        let (b, c, d) = (
            f64::from(header.quatern_b),
            f64::from(header.quatern_c),
            f64::from(header.quatern_d),
        );
        let a = (1.0 - (b * b + c * c + d * d)).max(0.0).sqrt();
        let rot = [
            [a * a + b * b - c * c - d * d, 2.0 * (b * c - a * d), 2.0 * (b * d + a * c)],
            [2.0 * (b * c + a * d), a * a + c * c - b * b - d * d, 2.0 * (c * d - a * b)],
            [2.0 * (b * d - a * c), 2.0 * (c * d + a * b), a * a + d * d - c * c - b * b],
        ];
        let qfac = if header.pixdim[0] < 0.0 { -1.0 } else { 1.0 };
        let scale = [pixdim(1), pixdim(2), pixdim(3) * qfac];
        for r in 0..3 {
            for col in 0..3 {
                affine[r][col] = rot[r][col] * scale[col];
            }
        }
        affine[0][3] = f64::from(header.quatern_x);
        affine[1][3] = f64::from(header.quatern_y);
        affine[2][3] = f64::from(header.quatern_z);
    } else {
        for i in 0..3 {
            affine[i][i] = pixdim(i + 1);
        }
    }
    affine
}

/// Encode a volume as single-file NIfTI-1 (float32) bytes.
///
/// # Errors
/// `FitError::Nifti` when a dimension does not fit the 16-bit header field.
pub fn encode_volume(volume: &Volume, path_hint: &Path) -> FitResult<Vec<u8>> {
    let [nx, ny, nz] = volume.dims();
    let depth = volume.depth();
    let to_i16 = |n: usize| {
        i16::try_from(n).map_err(|_| nifti_err(path_hint, format!("dimension {n} exceeds 32767")))
    };
    let geometry = volume.geometry();
    let affine = geometry.affine();

    let mut header = [0u8; HEADER_SIZE];
    let mut put = |offset: usize, bytes: &[u8]| header[offset..offset + bytes.len()].copy_from_slice(bytes);
    put(0, &(HEADER_SIZE as i32).to_le_bytes());
    let ndim: i16 = if depth > 1 { 4 } else { 3 };
    let dim = [ndim, to_i16(nx)?, to_i16(ny)?, to_i16(nz)?, to_i16(depth)?, 1, 1, 1];
    for (i, d) in dim.iter().enumerate() {
        put(40 + 2 * i, &d.to_le_bytes());
    }
    put(70, &DT_FLOAT32.to_le_bytes());
    put(72, &32i16.to_le_bytes());
    let s = geometry.spacing;
    let pixdim = [1.0f32, s[0] as f32, s[1] as f32, s[2] as f32, 1.0, 1.0, 1.0, 1.0];
    for (i, p) in pixdim.iter().enumerate() {
        put(76 + 4 * i, &p.to_le_bytes());
    }
    put(108, &(VOX_OFFSET as f32).to_le_bytes());
    put(112, &1.0f32.to_le_bytes());
    put(254, &1i16.to_le_bytes());
    for (r, base) in [280usize, 296, 312].iter().enumerate() {
        for c in 0..4 {
            put(base + 4 * c, &(affine[r][c] as f32).to_le_bytes());
        }
    }
    put(344, b"n+1\0");

    let data = volume.data();
    let mut out = Vec::with_capacity(VOX_OFFSET + 4 * data.len());
    out.extend_from_slice(&header);
    out.extend_from_slice(&[0u8; VOX_OFFSET - HEADER_SIZE]);
    for c in 0..depth {
        for z in 0..nz {
            for y in 0..ny {
                for x in 0..nx {
                    out.extend_from_slice(&(data[[x, y, z, c]] as f32).to_le_bytes());
                }
            }
        }
    }
    Ok(out)
}

/// Write a volume; gzip-compressed when the path ends in `.gz`.
///
/// # Errors
/// `FitError::Io` on file-system failures, `FitError::Nifti` from encoding.
pub fn write_volume<P: AsRef<Path>>(path: P, volume: &Volume) -> FitResult<()> {
    let path = path.as_ref();
    let raw = encode_volume(volume, path)?;
    let bytes = if path.extension().is_some_and(|ext| ext == "gz") {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&raw).map_err(|e| io_err(path, e))?;
        encoder.finish().map_err(|e| io_err(path, e))?
    } else {
        raw
    };
    std::fs::write(path, bytes).map_err(|e| io_err(path, e))
}
