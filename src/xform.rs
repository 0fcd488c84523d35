//! Header transform repair
//!
//! External tools that write NIfTI outputs frequently drop or rewrite the
//! qform/sform of the image they were given. `copy_xform` puts the input's
//! coded transforms back onto such an output so the two stay in the same
//! world frame.

use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::header::Affine;
use crate::nifti_io::{read_image, write_image};

/// Relative tolerance for affine comparison.
pub const AFFINE_RTOL: f64 = 1e-5;

/// Absolute tolerance for affine comparison.
pub const AFFINE_ATOL: f64 = 1e-8;

/// Element-wise `|a - b| <= atol + rtol * |b|`.
pub fn affines_close(a: &Affine, b: &Affine) -> bool {
    a.iter()
        .flatten()
        .zip(b.iter().flatten())
        .all(|(&x, &y)| (x - y).abs() <= AFFINE_ATOL + AFFINE_RTOL * y.abs())
}

/// Provenance string written to `descrip`.
pub fn provenance(message: Option<&str>) -> String {
    format!("xform matrices modified by {}.", message.unwrap_or("(unknown)"))
}

/// Copy the coded qform and sform of `reference` onto `output`.
///
/// `output` is rewritten in place with the same compression; only its
/// header changes. A mismatch between the two images' affines is reported
/// but does not stop the repair.
///
/// # Arguments
/// * `reference` - Image whose transforms are authoritative (read only)
/// * `output` - Image to repair
/// * `message` - Name of the producing step, recorded in `descrip`
pub fn copy_xform(reference: &Path, output: &Path, message: Option<&str>) -> Result<()> {
    let orig = read_image(reference)?;
    let mut resampled = read_image(output)?;

    if !affines_close(&orig.header.best_affine(), &resampled.header.best_affine()) {
        warn!(
            reference = %reference.display(),
            output = %output.display(),
            "Affines of input and reference images do not match; the reference image \
             headers will be used. Check that the x-form matrices of the input dataset \
             are correct and manually verify the alignment of results."
        );
    }

    let qform = orig.header.qform();
    let sform = orig.header.sform();
    debug!(qform_code = %qform.code, sform_code = %sform.code, "copying xforms");

    resampled.header.set_qform(&qform);
    resampled.header.set_sform(&sform);
    resampled.header.set_descrip(&provenance(message));

    write_image(output, &resampled)?;
    info!(output = %output.display(), "xform headers restored");
    Ok(())
}
