//! Common test utilities for synthstrip-core integration tests
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use synthstrip_core::header::{Affine, NiftiHeader};
use synthstrip_core::nifti_io::save_nifti_to_file;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

pub const IDENTITY: Affine = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// Root of the shared sample data cache, `$TEST_DATA_HOME` or
/// `~/.cache/stanford-crn`.
pub fn test_data_home() -> PathBuf {
    if let Some(home) = std::env::var_os("TEST_DATA_HOME") {
        return PathBuf::from(home);
    }
    let user_home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_default();
    user_home.join(".cache").join("stanford-crn")
}

/// BIDS sample dataset used by the data-driven tests.
pub fn data_dir() -> PathBuf {
    test_data_home().join("BIDS-examples-1-enh-ds054")
}

/// Temporary directory holding a small random image, removed on drop.
pub struct Fixture {
    pub tmpdir: TempDir,
    /// 5x5 float32 image with an identity affine
    pub nifti_fname: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let tmpdir = tempfile::tempdir().expect("create temporary directory");
        let nifti_fname = tmpdir.path().join("test.nii.gz");
        let data: Vec<f64> = (0..25).map(|_| f64::from(rand::random::<f32>())).collect();
        write_image(&nifti_fname, &[5, 5], &IDENTITY, &data);
        Fixture { tmpdir, nifti_fname }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.tmpdir.path().join(name)
    }
}

/// Write a float32 image with `affine` as its scanner sform and returns the
/// header used.
pub fn write_image(path: &Path, shape: &[usize], affine: &Affine, data: &[f64]) -> NiftiHeader {
    let header = NiftiHeader::new(shape, affine).expect("valid header");
    save_nifti_to_file(path, data, &header).expect("write test image");
    header
}

/// Write an image whose header is prepared by `edit`.
pub fn write_image_with(path: &Path, shape: &[usize], data: &[f64], edit: impl FnOnce(&mut NiftiHeader)) {
    let mut header = NiftiHeader::new(shape, &IDENTITY).expect("valid header");
    edit(&mut header);
    save_nifti_to_file(path, data, &header).expect("write test image");
}

/// Ramp data for a volume of `n` voxels.
pub fn ramp(n: usize) -> Vec<f64> {
    (0..n).map(|i| i as f64 * 0.25 - 3.0).collect()
}

pub fn read_bytes(path: &Path) -> Vec<u8> {
    fs::read(path).expect("read file")
}

/// Write a shell script standing in for the SynthStrip binary, to be launched
/// through `sh` as the configured interpreter.
///
/// The script records its arguments and `OMP_NUM_THREADS` to `args.txt`
/// next to itself, then runs `body` with `$IN`, `$OUT` and `$MASK` set from
/// the `-i`, `-o` and `-m` flags.
pub fn fake_tool(dir: &Path, body: &str) -> PathBuf {
    let log = dir.join("args.txt");
    let script = format!(
        r#"#!/bin/sh
echo "$@" > "{log}"
echo "threads=$OMP_NUM_THREADS" >> "{log}"
while [ $# -gt 0 ]; do
  case "$1" in
    -i) IN="$2"; shift 2 ;;
    -o) OUT="$2"; shift 2 ;;
    -m) MASK="$2"; shift 2 ;;
    *) shift ;;
  esac
done
{body}
"#,
        log = log.display(),
        body = body,
    );

    let path = dir.join("fake_synthstrip");
    fs::write(&path, script).expect("write fake tool");
    path
}

/// Arguments and environment recorded by the last `fake_tool` run.
pub fn recorded_call(dir: &Path) -> (String, String) {
    let text = fs::read_to_string(dir.join("args.txt")).expect("tool was not called");
    let mut lines = text.lines();
    let args = lines.next().unwrap_or_default().to_string();
    let threads = lines.next().unwrap_or_default().to_string();
    (args, threads)
}

/// Log output captured from a closure run under its own subscriber.
struct LogCapture(Mutex<Vec<u8>>);

impl std::io::Write for &LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().expect("poisoned").write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Run `f` with a `warn`-and-above subscriber and return its result along
/// with the formatted log lines.
pub fn capture_warnings<T>(f: impl FnOnce() -> T) -> (T, String) {
    let capture = Arc::new(LogCapture(Mutex::new(Vec::new())));
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_ansi(false)
        .with_env_filter(EnvFilter::new("warn"))
        .without_time()
        .with_writer(Arc::clone(&capture))
        .finish();

    let result = tracing::dispatcher::with_default(&tracing::Dispatch::new(subscriber), f);
    let logs = String::from_utf8_lossy(&capture.0.lock().expect("poisoned")).into_owned();
    (result, logs)
}
