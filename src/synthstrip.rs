//! SynthStrip skull-stripping shim
//!
//! Runs the external `mri_synthstrip` tool on one image and returns the
//! brain-extracted image and its mask. The tool does not preserve the input's
//! qform/sform, so both outputs get their xforms copied back from the input
//! before they are handed to the caller.
//!
//! Reference:
//! Hoopes, A. et al. (2022). "SynthStrip: skull-stripping for any brain image."
//! NeuroImage, 260:119474. https://doi.org/10.1016/j.neuroimage.2022.119474

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::info;

use crate::config::{ToolConfig, THREADS_ENV};
use crate::error::{Error, Result};
use crate::utils::fname_presuffix;
use crate::xform::copy_xform;

/// Suffix of the brain-extracted output.
pub const BRAIN_SUFFIX: &str = "_skullstripped";

/// Suffix of the brain mask output.
pub const MASK_SUFFIX: &str = "_boldmask";

/// Step name recorded in the repaired headers.
pub const PROVENANCE: &str = "SynthStrip";

/// Arguments of one skull-stripping run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SynthStripInputs {
    /// Image to skull-strip; must exist.
    pub input_image: PathBuf,
    /// Exclude CSF from the brain border.
    pub no_csf: bool,
    /// Mask border threshold in mm. The tool defaults to 1.
    pub border: Option<i32>,
    /// Run the model on the GPU.
    pub gpu: bool,
}

impl SynthStripInputs {
    pub fn new(input_image: impl Into<PathBuf>) -> Self {
        SynthStripInputs {
            input_image: input_image.into(),
            ..Default::default()
        }
    }

    pub fn with_no_csf(mut self, no_csf: bool) -> Self {
        self.no_csf = no_csf;
        self
    }

    pub fn with_border(mut self, border: i32) -> Self {
        self.border = Some(border);
        self
    }

    pub fn with_gpu(mut self, gpu: bool) -> Self {
        self.gpu = gpu;
        self
    }
}

/// Files produced by a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthStripOutputs {
    pub out_brain: PathBuf,
    pub out_brain_mask: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct SynthStrip {
    config: ToolConfig,
}

impl SynthStrip {
    pub fn new(config: ToolConfig) -> Self {
        SynthStrip { config }
    }

    pub fn config(&self) -> &ToolConfig {
        &self.config
    }

    /// Output locations for `input`, inside the working directory.
    pub fn output_paths(&self, input: &Path) -> SynthStripOutputs {
        let dir = Some(self.config.working_dir.as_path());
        SynthStripOutputs {
            out_brain: fname_presuffix(input, "", BRAIN_SUFFIX, dir),
            out_brain_mask: fname_presuffix(input, "", MASK_SUFFIX, dir),
        }
    }

    /// Arguments passed to the spawned program, in order.
    ///
    /// When an interpreter is configured the executable comes first, since the
    /// interpreter is the program being spawned.
    pub fn command_args(&self, inputs: &SynthStripInputs, outputs: &SynthStripOutputs) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        if self.config.interpreter.is_some() {
            args.push(self.config.executable.clone().into_os_string());
        }
        args.push("-i".into());
        args.push(inputs.input_image.clone().into_os_string());
        args.push("-o".into());
        args.push(outputs.out_brain.clone().into_os_string());
        args.push("-m".into());
        args.push(outputs.out_brain_mask.clone().into_os_string());
        if inputs.no_csf {
            args.push("--no-csf".into());
        }
        if let Some(border) = inputs.border {
            args.push("-b".into());
            args.push(border.to_string().into());
        }
        if inputs.gpu {
            args.push("-g".into());
        }
        args
    }

    pub fn command(&self, inputs: &SynthStripInputs, outputs: &SynthStripOutputs) -> Command {
        let mut cmd = Command::new(self.config.program());
        cmd.args(self.command_args(inputs, outputs))
            .current_dir(&self.config.working_dir);
        if let Some(threads) = self.config.num_threads {
            cmd.env(THREADS_ENV, threads.to_string());
        }
        cmd
    }

    /// Human-readable command line, for logs.
    pub fn cmdline(&self, inputs: &SynthStripInputs, outputs: &SynthStripOutputs) -> String {
        std::iter::once(self.config.program().as_os_str().to_os_string())
            .chain(self.command_args(inputs, outputs))
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Skull-strip `inputs.input_image` and repair the output headers.
    ///
    /// Blocks until the tool exits. Fails if the input is missing, the tool
    /// cannot be launched or exits unsuccessfully, or either output was not
    /// written.
    pub fn run(&self, inputs: &SynthStripInputs) -> Result<SynthStripOutputs> {
        self.config.validate()?;
        if !inputs.input_image.is_file() {
            return Err(Error::MissingInput(inputs.input_image.clone()));
        }

        // the tool runs in the working directory, so relative paths would
        // resolve against the wrong base
        let inputs = SynthStripInputs {
            input_image: absolute(&inputs.input_image)?,
            ..inputs.clone()
        };
        let mut outputs = self.output_paths(&inputs.input_image);
        outputs.out_brain = absolute(&outputs.out_brain)?;
        outputs.out_brain_mask = absolute(&outputs.out_brain_mask)?;

        let program = self.config.program().display().to_string();
        info!(cmdline = %self.cmdline(&inputs, &outputs), "running SynthStrip");

        let status = self
            .command(&inputs, &outputs)
            .status()
            .map_err(|source| Error::Spawn { program: program.clone(), source })?;
        if !status.success() {
            return Err(Error::ToolFailed { program, status });
        }

        for path in [&outputs.out_brain, &outputs.out_brain_mask] {
            if !path.exists() {
                return Err(Error::MissingOutput(path.clone()));
            }
        }

        copy_xform(&inputs.input_image, &outputs.out_brain, Some(PROVENANCE))?;
        copy_xform(&inputs.input_image, &outputs.out_brain_mask, Some(PROVENANCE))?;

        info!(
            out_brain = %outputs.out_brain.display(),
            out_brain_mask = %outputs.out_brain_mask.display(),
            "SynthStrip finished"
        );
        Ok(outputs)
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(|e| Error::io(path, e))?;
    Ok(cwd.join(path))
}
