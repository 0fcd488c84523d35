use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use synthstrip_core::config::{ToolConfig, DEFAULT_EXECUTABLE};
use synthstrip_core::{copy_xform, SynthStrip, SynthStripInputs};

/// Skull-strip NIfTI images with SynthStrip and keep their xform headers intact
#[derive(Parser, Debug)]
#[command(name = "synthstrip", version)]
struct Args {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Run SynthStrip on an image, then restore the input's qform/sform on both outputs
    Run {
        /// Image to skull-strip
        #[arg(short, long)]
        input: PathBuf,

        /// Exclude CSF from the brain border
        #[arg(long)]
        no_csf: bool,

        /// Mask border threshold in mm (tool default: 1)
        #[arg(short, long, allow_negative_numbers = true)]
        border: Option<i32>,

        /// Run the model on the GPU
        #[arg(short, long)]
        gpu: bool,

        /// Directory for the outputs (and the tool's working directory)
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,

        /// SynthStrip executable or script
        #[arg(long, env = "SYNTHSTRIP_EXECUTABLE", default_value = DEFAULT_EXECUTABLE)]
        executable: PathBuf,

        /// Interpreter used to launch the executable, e.g. python
        #[arg(long, env = "SYNTHSTRIP_PYTHON")]
        python: Option<PathBuf>,

        /// Thread cap passed to the tool
        #[arg(long, env = "OMP_NUM_THREADS")]
        threads: Option<usize>,
    },

    /// Copy the coded qform/sform of a reference image onto another image
    CopyXform {
        /// Image whose transforms are authoritative
        #[arg(short, long)]
        reference: PathBuf,

        /// Image to repair in place
        #[arg(short, long)]
        output: PathBuf,

        /// Step name recorded in the header description
        #[arg(short, long)]
        message: Option<String>,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("SYNTHSTRIP_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging();

    match args.command {
        Cmd::Run {
            input,
            no_csf,
            border,
            gpu,
            out_dir,
            executable,
            python,
            threads,
        } => {
            let mut config = ToolConfig::new(executable).with_working_dir(out_dir);
            config.interpreter = python;
            config.num_threads = threads;

            let inputs = SynthStripInputs {
                input_image: input,
                no_csf,
                border,
                gpu,
            };
            let outputs = SynthStrip::new(config)
                .run(&inputs)
                .with_context(|| format!("SynthStrip failed on '{}'", inputs.input_image.display()))?;

            println!("{}", outputs.out_brain.display());
            println!("{}", outputs.out_brain_mask.display());
        }
        Cmd::CopyXform { reference, output, message } => {
            copy_xform(&reference, &output, message.as_deref())
                .with_context(|| format!("failed to repair headers of '{}'", output.display()))?;
        }
    }

    Ok(())
}
