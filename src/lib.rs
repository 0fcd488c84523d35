//! SynthStrip-Core: skull-stripping with header repair
//!
//! This crate wraps the external SynthStrip brain-extraction tool and keeps
//! its outputs in the input image's world frame.
//!
//! # Modules
//! - `header`: NIfTI-1 header fields, qform/sform and affine math
//! - `nifti_io`: whole-file reads and in-place rewrites, voxel loading
//! - `xform`: copy coded transforms from a reference image onto an output
//! - `synthstrip`: build and run the tool command, then repair its outputs
//! - `config`: tool location, launcher, threads, working directory
//! - `utils`: output filename helpers

pub mod error;

// I/O modules
pub mod header;
pub mod nifti_io;

// Header repair and the tool shim
pub mod xform;
pub mod synthstrip;
pub mod config;

pub mod utils;

pub use error::{Error, Result};
pub use synthstrip::{SynthStrip, SynthStripInputs, SynthStripOutputs};
pub use xform::copy_xform;
