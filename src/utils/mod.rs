//! Utility functions
//!
//! - `fname`: derive output filenames from an input path

pub mod fname;

pub use fname::{fname_presuffix, split_filename};
