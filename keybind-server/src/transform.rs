//! Media transform run on behalf of authorized callers.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

/// Default `-itsscale` factor: timestamps are stretched twofold.
pub const DEFAULT_TIME_SCALE: &str = "2";

#[derive(Debug, Error)]
pub enum TransformError {
    /// The tool ran and exited unsuccessfully.
    #[error("transform failed ({status}): {stderr}")]
    Failed { status: String, stderr: String },

    /// The tool could not be started or its files could not be handled.
    #[error("transform I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Rescales input timestamps with ffmpeg, copying both streams unchanged.
#[derive(Debug, Clone)]
pub struct FfmpegTransform {
    program: PathBuf,
    time_scale: String,
}

impl FfmpegTransform {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            time_scale: DEFAULT_TIME_SCALE.to_string(),
        }
    }

    pub fn with_time_scale(mut self, time_scale: impl Into<String>) -> Self {
        self.time_scale = time_scale.into();
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments for one run, in order.
    pub fn args(&self, input: &Path, output: &Path) -> Vec<OsString> {
        vec![
            "-itsscale".into(),
            self.time_scale.clone().into(),
            "-i".into(),
            input.into(),
            "-c:v".into(),
            "copy".into(),
            "-c:a".into(),
            "copy".into(),
            output.into(),
        ]
    }

    /// Transforms `input` and returns the produced bytes.
    ///
    /// `file_name` only contributes its extension, which the container
    /// format is inferred from.
    pub async fn run(&self, input: &[u8], file_name: Option<&str>) -> Result<Vec<u8>, TransformError> {
        let suffix = file_name
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .map(|ext| format!(".{ext}"))
            .unwrap_or_default();

        let workdir = tempfile::Builder::new().prefix("keybind-").tempdir()?;
        let in_path = workdir.path().join(format!("input{suffix}"));
        let out_path = workdir.path().join(format!("output{suffix}"));
        tokio::fs::write(&in_path, input).await?;

        debug!("Running {:?} on {} bytes", self.program, input.len());
        let output = Command::new(&self.program)
            .args(self.args(&in_path, &out_path))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!("Transform exited with {}: {}", output.status, stderr);
            return Err(TransformError::Failed {
                status: output.status.to_string(),
                stderr,
            });
        }

        Ok(tokio::fs::read(&out_path).await?)
    }
}

impl Default for FfmpegTransform {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}
