//! NIfTI-1 header model
//!
//! Only the fields that describe geometry and provenance are modelled. Parsing
//! goes through `nifti::NiftiHeader` and records the original byte order;
//! `write_to` patches the modelled fields into an existing header buffer so
//! that everything else (intent, calibration, aux_file, extensions, voxel
//! data) is preserved byte for byte.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::fmt;

use crate::error::{Error, Result};

/// Size of a NIfTI-1 header on disk.
pub const HEADER_SIZE: usize = 348;

/// Width of the `descrip` field.
pub const DESCRIP_LEN: usize = 80;

const NIFTI2_HEADER_SIZE: i32 = 540;

/// 4x4 voxel-to-world matrix, row-major.
pub type Affine = [[f64; 4]; 4];

mod offsets {
    pub const SIZEOF_HDR: usize = 0;
    pub const DIM: usize = 40;
    pub const DATATYPE: usize = 70;
    pub const BITPIX: usize = 72;
    pub const PIXDIM: usize = 76;
    pub const VOX_OFFSET: usize = 108;
    pub const SCL_SLOPE: usize = 112;
    pub const SCL_INTER: usize = 116;
    pub const DESCRIP: usize = 148;
    pub const QFORM_CODE: usize = 252;
    pub const SFORM_CODE: usize = 254;
    pub const QUATERN_B: usize = 256;
    pub const QOFFSET_X: usize = 268;
    pub const SROW_X: usize = 280;
    pub const SROW_Y: usize = 296;
    pub const SROW_Z: usize = 312;
    pub const MAGIC: usize = 344;
}

/// Meaning attached to a qform or sform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum XformCode {
    #[default]
    Unknown,
    Scanner,
    Aligned,
    Talairach,
    Mni,
    Template,
    /// Out-of-range code, kept verbatim.
    Other(i16),
}

impl XformCode {
    pub fn from_code(code: i16) -> Self {
        match code {
            0 => Self::Unknown,
            1 => Self::Scanner,
            2 => Self::Aligned,
            3 => Self::Talairach,
            4 => Self::Mni,
            5 => Self::Template,
            other => Self::Other(other),
        }
    }

    pub fn code(self) -> i16 {
        match self {
            Self::Unknown => 0,
            Self::Scanner => 1,
            Self::Aligned => 2,
            Self::Talairach => 3,
            Self::Mni => 4,
            Self::Template => 5,
            Self::Other(code) => code,
        }
    }

    /// Whether the transform carrying this code should be used. Any nonzero
    /// code counts, including out-of-range ones.
    pub fn is_set(self) -> bool {
        self.code() != 0
    }
}

impl fmt::Display for XformCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Scanner => write!(f, "scanner"),
            Self::Aligned => write!(f, "aligned"),
            Self::Talairach => write!(f, "talairach"),
            Self::Mni => write!(f, "mni"),
            Self::Template => write!(f, "template"),
            Self::Other(code) => write!(f, "code {}", code),
        }
    }
}

/// Single-file (`n+1`) or header/image pair (`ni1`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NiftiMagic {
    #[default]
    SingleFile,
    Pair,
}

impl NiftiMagic {
    fn from_bytes(magic: &[u8]) -> Option<Self> {
        match magic {
            b"n+1\0" => Some(Self::SingleFile),
            b"ni1\0" => Some(Self::Pair),
            _ => None,
        }
    }

    fn as_bytes(self) -> &'static [u8; 4] {
        match self {
            Self::SingleFile => b"n+1\0",
            Self::Pair => b"ni1\0",
        }
    }
}

/// Coded quaternion transform.
///
/// The quaternion alone does not describe the transform: the voxel sizes in
/// `pixdim[1..4]` and the handedness flag `pixdim[0]` belong to it as well.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Qform {
    pub code: XformCode,
    /// Quaternion (b, c, d); a is implied.
    pub quatern: [f32; 3],
    pub qoffset: [f32; 3],
    /// `pixdim[0]`, negative for a left-handed voxel grid.
    pub qfac: f32,
    /// `pixdim[1..4]`
    pub zooms: [f32; 3],
}

impl Qform {
    /// Decompose an affine into quaternion form.
    ///
    /// The rotation part is assumed orthogonal up to per-axis scaling; shears
    /// cannot be represented and are not stripped.
    pub fn from_affine(affine: &Affine, code: XformCode) -> Self {
        let mut cols = [[0.0f64; 3]; 3];
        let mut zooms = [0.0f64; 3];
        for c in 0..3 {
            let col = [affine[0][c], affine[1][c], affine[2][c]];
            let norm = (col[0] * col[0] + col[1] * col[1] + col[2] * col[2]).sqrt();
            let norm = if norm == 0.0 { 1.0 } else { norm };
            zooms[c] = norm;
            cols[c] = [col[0] / norm, col[1] / norm, col[2] / norm];
        }

        // r[row][col]
        let mut r = [[0.0f64; 3]; 3];
        for (c, col) in cols.iter().enumerate() {
            for row in 0..3 {
                r[row][c] = col[row];
            }
        }

        let det = r[0][0] * (r[1][1] * r[2][2] - r[1][2] * r[2][1])
            - r[0][1] * (r[1][0] * r[2][2] - r[1][2] * r[2][0])
            + r[0][2] * (r[1][0] * r[2][1] - r[1][1] * r[2][0]);
        let qfac = if det > 0.0 {
            1.0
        } else {
            for row in r.iter_mut() {
                row[2] = -row[2];
            }
            -1.0
        };

        let trace = r[0][0] + r[1][1] + r[2][2] + 1.0;
        let (b, c, d) = if trace > 0.5 {
            let a = 0.5 * trace.sqrt();
            (
                0.25 * (r[2][1] - r[1][2]) / a,
                0.25 * (r[0][2] - r[2][0]) / a,
                0.25 * (r[1][0] - r[0][1]) / a,
            )
        } else {
            let xd = 1.0 + r[0][0] - (r[1][1] + r[2][2]);
            let yd = 1.0 + r[1][1] - (r[0][0] + r[2][2]);
            let zd = 1.0 + r[2][2] - (r[0][0] + r[1][1]);
            let (a, b, c, d) = if xd > 1.0 {
                let b = 0.5 * xd.sqrt();
                (
                    0.25 * (r[2][1] - r[1][2]) / b,
                    b,
                    0.25 * (r[0][1] + r[1][0]) / b,
                    0.25 * (r[0][2] + r[2][0]) / b,
                )
            } else if yd > 1.0 {
                let c = 0.5 * yd.sqrt();
                (
                    0.25 * (r[0][2] - r[2][0]) / c,
                    0.25 * (r[0][1] + r[1][0]) / c,
                    c,
                    0.25 * (r[1][2] + r[2][1]) / c,
                )
            } else {
                let d = 0.5 * zd.sqrt();
                (
                    0.25 * (r[1][0] - r[0][1]) / d,
                    0.25 * (r[0][2] + r[2][0]) / d,
                    0.25 * (r[1][2] + r[2][1]) / d,
                    d,
                )
            };
            // keep a >= 0 so that it can be implied on read
            if a < 0.0 { (-b, -c, -d) } else { (b, c, d) }
        };

        Qform {
            code,
            quatern: [b as f32, c as f32, d as f32],
            qoffset: [affine[0][3] as f32, affine[1][3] as f32, affine[2][3] as f32],
            qfac: qfac as f32,
            zooms: [zooms[0] as f32, zooms[1] as f32, zooms[2] as f32],
        }
    }

    /// Rebuild the voxel-to-world matrix.
    #[allow(clippy::many_single_char_names)]
    pub fn to_affine(&self) -> Affine {
        let [b, c, d] = self.quatern.map(f64::from);
        let a = (1.0 - (b * b + c * c + d * d)).max(0.0).sqrt();
        let qfac = if self.qfac < 0.0 { -1.0 } else { 1.0 };
        let [i, j, k] = self.zooms.map(f64::from);
        let k = k * qfac;
        let [ox, oy, oz] = self.qoffset.map(f64::from);

        [
            [
                (a * a + b * b - c * c - d * d) * i,
                2.0 * (b * c - a * d) * j,
                2.0 * (b * d + a * c) * k,
                ox,
            ],
            [
                2.0 * (b * c + a * d) * i,
                (a * a + c * c - b * b - d * d) * j,
                2.0 * (c * d - a * b) * k,
                oy,
            ],
            [
                2.0 * (b * d - a * c) * i,
                2.0 * (c * d + a * b) * j,
                (a * a + d * d - b * b - c * c) * k,
                oz,
            ],
            [0.0, 0.0, 0.0, 1.0],
        ]
    }
}

/// Coded general affine transform (the three stored rows).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Sform {
    pub code: XformCode,
    pub rows: [[f32; 4]; 3],
}

impl Sform {
    pub fn from_affine(affine: &Affine, code: XformCode) -> Self {
        let row = |r: usize| affine[r].map(|v| v as f32);
        Sform { code, rows: [row(0), row(1), row(2)] }
    }

    pub fn to_affine(&self) -> Affine {
        let row = |r: usize| self.rows[r].map(f64::from);
        [row(0), row(1), row(2), [0.0, 0.0, 0.0, 1.0]]
    }
}

/// Geometry and provenance fields of a NIfTI-1 header.
#[derive(Debug, Clone, PartialEq)]
pub struct NiftiHeader {
    pub dim: [i16; 8],
    pub datatype: i16,
    pub bitpix: i16,
    pub pixdim: [f32; 8],
    pub vox_offset: f32,
    pub scl_slope: f32,
    pub scl_inter: f32,
    pub descrip: String,
    pub qform_code: XformCode,
    pub sform_code: XformCode,
    pub quatern: [f32; 3],
    pub qoffset: [f32; 3],
    pub srow_x: [f32; 4],
    pub srow_y: [f32; 4],
    pub srow_z: [f32; 4],
    pub magic: NiftiMagic,
    pub little_endian: bool,
}

impl NiftiHeader {
    /// Header for a fresh little-endian float32 single-file image.
    ///
    /// The sform is set from `affine` with the scanner code; the qform is
    /// filled in from the same affine but left uncoded.
    pub fn new(shape: &[usize], affine: &Affine) -> Result<Self> {
        if shape.is_empty() || shape.len() > 7 {
            return Err(Error::InvalidHeader(format!(
                "expected 1 to 7 dimensions, got {}",
                shape.len()
            )));
        }
        let mut dim = [1i16; 8];
        dim[0] = shape.len() as i16;
        for (i, &n) in shape.iter().enumerate() {
            dim[i + 1] = i16::try_from(n).map_err(|_| {
                Error::InvalidHeader(format!("dimension {} does not fit NIfTI-1: {}", i, n))
            })?;
        }

        let qform = Qform::from_affine(affine, XformCode::Unknown);
        let sform = Sform::from_affine(affine, XformCode::Scanner);

        let mut pixdim = [1.0f32; 8];
        pixdim[0] = qform.qfac;
        pixdim[1..4].copy_from_slice(&qform.zooms);

        Ok(NiftiHeader {
            dim,
            datatype: 16,
            bitpix: 32,
            pixdim,
            vox_offset: 352.0,
            scl_slope: 1.0,
            scl_inter: 0.0,
            descrip: String::new(),
            qform_code: XformCode::Unknown,
            sform_code: sform.code,
            quatern: qform.quatern,
            qoffset: qform.qoffset,
            srow_x: sform.rows[0],
            srow_y: sform.rows[1],
            srow_z: sform.rows[2],
            magic: NiftiMagic::SingleFile,
            little_endian: true,
        })
    }

    /// Parse a header, detecting byte order from `sizeof_hdr`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 4 {
            return Err(Error::InvalidHeader(format!(
                "file too small ({} bytes)",
                bytes.len()
            )));
        }

        let le = LittleEndian::read_i32(&bytes[0..4]);
        let be = BigEndian::read_i32(&bytes[0..4]);
        let little_endian = if le == HEADER_SIZE as i32 {
            true
        } else if be == HEADER_SIZE as i32 {
            false
        } else if le == NIFTI2_HEADER_SIZE || be == NIFTI2_HEADER_SIZE {
            return Err(Error::Unsupported("NIfTI-2 headers are not supported".into()));
        } else {
            return Err(Error::InvalidHeader(format!("sizeof_hdr={}", le)));
        };

        if bytes.len() < HEADER_SIZE {
            return Err(Error::InvalidHeader(format!(
                "header truncated: {} bytes, need {}",
                bytes.len(),
                HEADER_SIZE
            )));
        }

        let magic_bytes = &bytes[offsets::MAGIC..offsets::MAGIC + 4];
        let magic = NiftiMagic::from_bytes(magic_bytes).ok_or_else(|| {
            Error::InvalidHeader(format!(
                "bad magic '{}'",
                String::from_utf8_lossy(magic_bytes).trim_end_matches('\0')
            ))
        })?;

        let h = nifti::NiftiHeader::from_reader(&bytes[..HEADER_SIZE])
            .map_err(|e| Error::InvalidHeader(e.to_string()))?;

        let mut dim = [0i16; 8];
        for (d, &raw) in dim.iter_mut().zip(&h.dim) {
            *d = i16::try_from(raw)
                .map_err(|_| Error::InvalidHeader(format!("dimension out of range: {}", raw)))?;
        }
        if !(1..=7).contains(&dim[0]) {
            return Err(Error::InvalidHeader(format!("dim[0] must be 1..=7, got {}", dim[0])));
        }

        let end = h.descrip.iter().position(|&b| b == 0).unwrap_or(h.descrip.len());
        let descrip = String::from_utf8_lossy(&h.descrip[..end]).into_owned();

        Ok(NiftiHeader {
            dim,
            datatype: h.datatype,
            bitpix: h.bitpix,
            pixdim: h.pixdim,
            vox_offset: h.vox_offset,
            scl_slope: h.scl_slope,
            scl_inter: h.scl_inter,
            descrip,
            qform_code: XformCode::from_code(h.qform_code),
            sform_code: XformCode::from_code(h.sform_code),
            quatern: [h.quatern_b, h.quatern_c, h.quatern_d],
            qoffset: [h.quatern_x, h.quatern_y, h.quatern_z],
            srow_x: h.srow_x,
            srow_y: h.srow_y,
            srow_z: h.srow_z,
            magic,
            little_endian,
        })
    }

    /// Write the modelled fields into `buf` in this header's byte order.
    ///
    /// Bytes of fields that are not modelled are left untouched.
    pub fn write_to(&self, buf: &mut [u8]) -> Result<()> {
        if buf.len() < HEADER_SIZE {
            return Err(Error::InvalidHeader(format!(
                "buffer too small for header: {} bytes",
                buf.len()
            )));
        }
        if self.little_endian {
            self.write_fields::<LittleEndian>(buf);
        } else {
            self.write_fields::<BigEndian>(buf);
        }
        Ok(())
    }

    fn write_fields<E: ByteOrder>(&self, buf: &mut [u8]) {
        use offsets::*;

        E::write_i32(&mut buf[SIZEOF_HDR..], HEADER_SIZE as i32);
        for (i, &d) in self.dim.iter().enumerate() {
            E::write_i16(&mut buf[DIM + i * 2..], d);
        }
        E::write_i16(&mut buf[DATATYPE..], self.datatype);
        E::write_i16(&mut buf[BITPIX..], self.bitpix);
        for (i, &p) in self.pixdim.iter().enumerate() {
            E::write_f32(&mut buf[PIXDIM + i * 4..], p);
        }
        E::write_f32(&mut buf[VOX_OFFSET..], self.vox_offset);
        E::write_f32(&mut buf[SCL_SLOPE..], self.scl_slope);
        E::write_f32(&mut buf[SCL_INTER..], self.scl_inter);

        let descrip = &mut buf[DESCRIP..DESCRIP + DESCRIP_LEN];
        descrip.fill(0);
        let text = self.descrip.as_bytes();
        let n = text.len().min(DESCRIP_LEN);
        descrip[..n].copy_from_slice(&text[..n]);

        E::write_i16(&mut buf[QFORM_CODE..], self.qform_code.code());
        E::write_i16(&mut buf[SFORM_CODE..], self.sform_code.code());
        for i in 0..3 {
            E::write_f32(&mut buf[QUATERN_B + i * 4..], self.quatern[i]);
            E::write_f32(&mut buf[QOFFSET_X + i * 4..], self.qoffset[i]);
        }
        for (offset, row) in [(SROW_X, &self.srow_x), (SROW_Y, &self.srow_y), (SROW_Z, &self.srow_z)] {
            for (i, &v) in row.iter().enumerate() {
                E::write_f32(&mut buf[offset + i * 4..], v);
            }
        }
        buf[MAGIC..MAGIC + 4].copy_from_slice(self.magic.as_bytes());
    }

    /// Serialize into a fresh zeroed header block.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; HEADER_SIZE];
        if self.little_endian {
            self.write_fields::<LittleEndian>(&mut buf);
        } else {
            self.write_fields::<BigEndian>(&mut buf);
        }
        buf
    }

    pub fn ndim(&self) -> usize {
        self.dim[0].clamp(0, 7) as usize
    }

    /// Image shape, `dim[1..=ndim]`.
    pub fn shape(&self) -> Vec<usize> {
        self.dim[1..=self.ndim()].iter().map(|&d| d.max(0) as usize).collect()
    }

    pub fn qform(&self) -> Qform {
        Qform {
            code: self.qform_code,
            quatern: self.quatern,
            qoffset: self.qoffset,
            qfac: self.pixdim[0],
            zooms: [self.pixdim[1], self.pixdim[2], self.pixdim[3]],
        }
    }

    /// Install a coded qform. An unset code only clears the code.
    pub fn set_qform(&mut self, qform: &Qform) {
        self.qform_code = qform.code;
        if !qform.code.is_set() {
            return;
        }
        self.quatern = qform.quatern;
        self.qoffset = qform.qoffset;
        self.pixdim[0] = qform.qfac;
        self.pixdim[1..4].copy_from_slice(&qform.zooms);
    }

    pub fn sform(&self) -> Sform {
        Sform {
            code: self.sform_code,
            rows: [self.srow_x, self.srow_y, self.srow_z],
        }
    }

    /// Install a coded sform. An unset code only clears the code.
    pub fn set_sform(&mut self, sform: &Sform) {
        self.sform_code = sform.code;
        if !sform.code.is_set() {
            return;
        }
        self.srow_x = sform.rows[0];
        self.srow_y = sform.rows[1];
        self.srow_z = sform.rows[2];
    }

    /// Qform matrix, or `None` when the qform code is unset.
    pub fn qform_affine(&self) -> Option<Affine> {
        self.qform_code.is_set().then(|| self.qform().to_affine())
    }

    /// Sform matrix, or `None` when the sform code is unset.
    pub fn sform_affine(&self) -> Option<Affine> {
        self.sform_code.is_set().then(|| self.sform().to_affine())
    }

    /// Analyze-style fallback: voxel sizes on the diagonal, x flipped, and the
    /// origin at the centre of the first three axes.
    pub fn base_affine(&self) -> Affine {
        let ndim = self.ndim();
        let mut shape = [1.0f64; 3];
        let mut zooms = [1.0f64; 3];
        for i in 0..ndim.min(3) {
            shape[i] = f64::from(self.dim[i + 1]);
            zooms[i] = f64::from(self.pixdim[i + 1]);
        }
        zooms[0] = -zooms[0];

        let mut affine = [[0.0; 4]; 4];
        for i in 0..3 {
            let origin = (shape[i] - 1.0) / 2.0;
            affine[i][i] = zooms[i];
            affine[i][3] = -origin * zooms[i];
        }
        affine[3][3] = 1.0;
        affine
    }

    /// The transform an image reader would use: sform, then qform, then the
    /// base affine.
    pub fn best_affine(&self) -> Affine {
        self.sform_affine()
            .or_else(|| self.qform_affine())
            .unwrap_or_else(|| self.base_affine())
    }

    /// Set `descrip`, truncated to the field width on a character boundary.
    pub fn set_descrip(&mut self, text: &str) {
        let mut end = text.len().min(DESCRIP_LEN);
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        self.descrip = text[..end].to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDENTITY: Affine = [
        [1.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ];

    fn assert_affine_eq(a: &Affine, b: &Affine, tol: f64) {
        for r in 0..4 {
            for c in 0..4 {
                assert!(
                    (a[r][c] - b[r][c]).abs() < tol,
                    "affine[{}][{}]: {} vs {}",
                    r, c, a[r][c], b[r][c]
                );
            }
        }
    }

    #[test]
    fn test_xform_code_mapping() {
        assert_eq!(XformCode::from_code(0), XformCode::Unknown);
        assert_eq!(XformCode::from_code(4), XformCode::Mni);
        assert_eq!(XformCode::from_code(42), XformCode::Other(42));
        assert_eq!(XformCode::Other(42).code(), 42);
        assert!(!XformCode::Unknown.is_set());
        assert!(XformCode::Aligned.is_set());
        assert!(XformCode::Other(-3).is_set());
    }

    #[test]
    fn test_negative_code_still_carries_transform() {
        let shifted = [
            [1.0, 0.0, 0.0, 4.0],
            [0.0, 1.0, 0.0, 5.0],
            [0.0, 0.0, 1.0, 6.0],
            [0.0, 0.0, 0.0, 1.0],
        ];
        let mut header = NiftiHeader::new(&[2, 2, 2], &IDENTITY).unwrap();
        header.set_sform(&Sform::from_affine(&shifted, XformCode::Other(-2)));

        let parsed = NiftiHeader::from_bytes(&header.to_bytes()).unwrap();
        assert_eq!(parsed.sform_code, XformCode::Other(-2));
        assert_eq!(parsed.sform_affine(), Some(shifted));
        assert_affine_eq(&parsed.best_affine(), &shifted, 1e-12);
    }

    #[test]
    fn test_new_header_fields() {
        let affine = [
            [2.0, 0.0, 0.0, -10.0],
            [0.0, 2.0, 0.0, -20.0],
            [0.0, 0.0, 3.0, -30.0],
            [0.0, 0.0, 0.0, 1.0],
        ];
        let header = NiftiHeader::new(&[4, 5, 6], &affine).unwrap();
        assert_eq!(header.shape(), vec![4, 5, 6]);
        assert_eq!(header.sform_code, XformCode::Scanner);
        assert_eq!(header.qform_code, XformCode::Unknown);
        assert_eq!(&header.pixdim[1..4], &[2.0, 2.0, 3.0]);
        assert_affine_eq(&header.best_affine(), &affine, 1e-6);
    }

    #[test]
    fn test_new_header_rejects_bad_shape() {
        assert!(NiftiHeader::new(&[], &IDENTITY).is_err());
        assert!(NiftiHeader::new(&[1, 2, 3, 4, 5, 6, 7, 8], &IDENTITY).is_err());
        assert!(NiftiHeader::new(&[40000, 2, 2], &IDENTITY).is_err());
    }

    #[test]
    fn test_parse_written_header() {
        let mut header = NiftiHeader::new(&[3, 3, 3], &IDENTITY).unwrap();
        header.set_descrip("hello");
        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(&bytes[344..348], b"n+1\0");
        let parsed = NiftiHeader::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn test_big_endian_header() {
        let mut header = NiftiHeader::new(&[2, 3, 4], &IDENTITY).unwrap();
        header.little_endian = false;
        let bytes = header.to_bytes();
        assert_eq!(BigEndian::read_i32(&bytes[0..4]), 348);
        assert_eq!(BigEndian::read_i16(&bytes[42..44]), 2);

        let parsed = NiftiHeader::from_bytes(&bytes).unwrap();
        assert!(!parsed.little_endian);
        assert_eq!(parsed.shape(), vec![2, 3, 4]);
    }

    #[test]
    fn test_write_to_preserves_unmodelled_bytes() {
        let header = NiftiHeader::new(&[2, 2, 2], &IDENTITY).unwrap();
        let mut bytes = header.to_bytes();
        // aux_file lives at 228..252 and is not modelled
        bytes[228..232].copy_from_slice(b"aux!");
        let mut parsed = NiftiHeader::from_bytes(&bytes).unwrap();
        parsed.set_descrip("patched");
        parsed.write_to(&mut bytes).unwrap();
        assert_eq!(&bytes[228..232], b"aux!");
        assert_eq!(&bytes[148..155], b"patched");
    }

    #[test]
    fn test_rejects_nifti2_and_garbage() {
        let mut bytes = vec![0u8; 540];
        bytes[0..4].copy_from_slice(&540i32.to_le_bytes());
        assert!(matches!(NiftiHeader::from_bytes(&bytes), Err(Error::Unsupported(_))));

        assert!(matches!(NiftiHeader::from_bytes(&[0u8; 2]), Err(Error::InvalidHeader(_))));
        assert!(matches!(NiftiHeader::from_bytes(&[0u8; 348]), Err(Error::InvalidHeader(_))));
    }

    #[test]
    fn test_rejects_bad_magic() {
        let header = NiftiHeader::new(&[2, 2, 2], &IDENTITY).unwrap();
        let mut bytes = header.to_bytes();
        bytes[344..348].copy_from_slice(b"xyz\0");
        let err = NiftiHeader::from_bytes(&bytes).unwrap_err();
        assert!(err.to_string().contains("bad magic"), "{}", err);
    }

    #[test]
    fn test_descrip_truncated_on_char_boundary() {
        let mut header = NiftiHeader::new(&[1], &IDENTITY).unwrap();
        let long = "é".repeat(50); // 100 bytes
        header.set_descrip(&long);
        assert_eq!(header.descrip.len(), 80);
        assert!(header.descrip.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_qform_roundtrip_rotation() {
        // 90 degrees about z, anisotropic voxels, offset
        let affine = [
            [0.0, -2.0, 0.0, 5.0],
            [1.5, 0.0, 0.0, -7.0],
            [0.0, 0.0, 3.0, 11.0],
            [0.0, 0.0, 0.0, 1.0],
        ];
        let qform = Qform::from_affine(&affine, XformCode::Scanner);
        assert_eq!(qform.qfac, 1.0);
        assert_affine_eq(&qform.to_affine(), &affine, 1e-5);
    }

    #[test]
    fn test_qform_left_handed() {
        // RAS -> LAS flip has a negative determinant
        let affine = [
            [-1.0, 0.0, 0.0, 90.0],
            [0.0, 1.0, 0.0, -126.0],
            [0.0, 0.0, 1.0, -72.0],
            [0.0, 0.0, 0.0, 1.0],
        ];
        let qform = Qform::from_affine(&affine, XformCode::Aligned);
        assert_affine_eq(&qform.to_affine(), &affine, 1e-5);
    }

    #[test]
    fn test_set_qform_with_unknown_code_keeps_fields() {
        let mut header = NiftiHeader::new(&[2, 2, 2], &IDENTITY).unwrap();
        header.qform_code = XformCode::Scanner;
        header.quatern = [0.5, 0.5, 0.5];
        header.set_qform(&Qform::default());
        assert_eq!(header.qform_code, XformCode::Unknown);
        assert_eq!(header.quatern, [0.5, 0.5, 0.5]);
    }

    #[test]
    fn test_best_affine_preference() {
        let sform_aff = [
            [2.0, 0.0, 0.0, 1.0],
            [0.0, 2.0, 0.0, 2.0],
            [0.0, 0.0, 2.0, 3.0],
            [0.0, 0.0, 0.0, 1.0],
        ];
        let mut header = NiftiHeader::new(&[4, 4, 4], &sform_aff).unwrap();
        assert_affine_eq(&header.best_affine(), &sform_aff, 1e-6);

        header.set_qform(&Qform::from_affine(&IDENTITY, XformCode::Scanner));
        header.sform_code = XformCode::Unknown;
        assert_affine_eq(&header.best_affine(), &IDENTITY, 1e-6);

        header.qform_code = XformCode::Unknown;
        assert_affine_eq(&header.best_affine(), &header.base_affine(), 1e-12);
    }

    #[test]
    fn test_base_affine_2d() {
        let mut header = NiftiHeader::new(&[5, 5], &IDENTITY).unwrap();
        header.sform_code = XformCode::Unknown;
        let expected = [
            [-1.0, 0.0, 0.0, 2.0],
            [0.0, 1.0, 0.0, -2.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ];
        assert_affine_eq(&header.base_affine(), &expected, 1e-12);
    }
}
