//! Tool configuration
//!
//! Where to find the SynthStrip executable, how to launch it, and where its
//! outputs go. The CLI fills this from flags or environment variables; library
//! users build it directly.
//!
//! | Field | Default | Description |
//! |-------|---------|-------------|
//! | `executable` | `mri_synthstrip` | Tool binary or script, resolved through `PATH` |
//! | `interpreter` | none | Program used to launch `executable` (e.g. `python`) |
//! | `num_threads` | none | Exported to the tool as `OMP_NUM_THREADS` |
//! | `working_dir` | `.` | Directory the tool runs in and outputs are written to |

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Name of the SynthStrip binary shipped with FreeSurfer.
pub const DEFAULT_EXECUTABLE: &str = "mri_synthstrip";

/// Environment variable that caps the tool's internal parallelism.
pub const THREADS_ENV: &str = "OMP_NUM_THREADS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolConfig {
    pub executable: PathBuf,
    pub interpreter: Option<PathBuf>,
    pub num_threads: Option<usize>,
    pub working_dir: PathBuf,
}

impl Default for ToolConfig {
    fn default() -> Self {
        ToolConfig {
            executable: PathBuf::from(DEFAULT_EXECUTABLE),
            interpreter: None,
            num_threads: None,
            working_dir: PathBuf::from("."),
        }
    }
}

impl ToolConfig {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        ToolConfig {
            executable: executable.into(),
            ..Default::default()
        }
    }

    pub fn with_interpreter(mut self, interpreter: impl Into<PathBuf>) -> Self {
        self.interpreter = Some(interpreter.into());
        self
    }

    pub fn with_num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = Some(num_threads);
        self
    }

    pub fn with_working_dir(mut self, working_dir: impl Into<PathBuf>) -> Self {
        self.working_dir = working_dir.into();
        self
    }

    /// Program actually spawned: the interpreter if one is set, else the
    /// executable itself.
    pub fn program(&self) -> &Path {
        self.interpreter.as_deref().unwrap_or(&self.executable)
    }

    pub fn validate(&self) -> Result<()> {
        if self.executable.as_os_str().is_empty() {
            return Err(Error::InvalidConfig("executable must not be empty".to_string()));
        }
        if matches!(&self.interpreter, Some(p) if p.as_os_str().is_empty()) {
            return Err(Error::InvalidConfig("interpreter must not be empty".to_string()));
        }
        if self.num_threads == Some(0) {
            return Err(Error::InvalidConfig("thread count must be greater than 0".to_string()));
        }
        if !self.working_dir.is_dir() {
            return Err(Error::InvalidConfig(format!(
                "working directory '{}' does not exist",
                self.working_dir.display()
            )));
        }
        Ok(())
    }
}
