use crate::error::PixelError;
use anyhow::{Context, Result};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// The three container-level operations a job needs from the external mux tool.
/// Each call blocks until the tool exits; a non-zero exit is an error.
pub trait MuxTool: Sync {
    /// Copy the audio stream of `source` into `audio`.
    fn extract_audio(&self, source: &Path, audio: &Path) -> Result<()>;
    /// Stream-copy the files listed in a concat `manifest` into `output`, in order.
    fn concat(&self, manifest: &Path, output: &Path) -> Result<()>;
    /// Merge the video of `video` with the audio of `audio` into `output` without re-encoding.
    fn remux(&self, video: &Path, audio: &Path, output: &Path) -> Result<()>;
}

/// `ffmpeg` command line invoked as a subprocess.
pub struct FfmpegCli {
    program: PathBuf,
}

impl FfmpegCli {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn run(&self, operation: &'static str, args: &[&OsStr]) -> Result<()> {
        tracing::debug!("FfmpegCli: {} {:?}", operation, args);

        let output = Command::new(&self.program)
            .args(["-y", "-loglevel", "error", "-nostdin"])
            .args(args)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("Failed to run {:?} for {}", self.program, operation))?;

        if !output.status.success() {
            return Err(PixelError::ExternalToolFailure {
                tool: self.program.display().to_string(),
                operation,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .into());
        }
        Ok(())
    }
}

impl MuxTool for FfmpegCli {
    fn extract_audio(&self, source: &Path, audio: &Path) -> Result<()> {
        self.run(
            "audio extraction",
            &[
                OsStr::new("-i"),
                source.as_os_str(),
                OsStr::new("-vn"),
                OsStr::new("-c:a"),
                OsStr::new("copy"),
                audio.as_os_str(),
            ],
        )
    }

    fn concat(&self, manifest: &Path, output: &Path) -> Result<()> {
        self.run(
            "concatenation",
            &[
                OsStr::new("-f"),
                OsStr::new("concat"),
                OsStr::new("-safe"),
                OsStr::new("0"),
                OsStr::new("-i"),
                manifest.as_os_str(),
                OsStr::new("-c"),
                OsStr::new("copy"),
                output.as_os_str(),
            ],
        )
    }

    fn remux(&self, video: &Path, audio: &Path, output: &Path) -> Result<()> {
        self.run(
            "remux",
            &[
                OsStr::new("-i"),
                video.as_os_str(),
                OsStr::new("-i"),
                audio.as_os_str(),
                OsStr::new("-map"),
                OsStr::new("0:v:0"),
                OsStr::new("-map"),
                OsStr::new("1:a:0"),
                OsStr::new("-c"),
                OsStr::new("copy"),
                output.as_os_str(),
            ],
        )
    }
}

/// Concat-demuxer manifest listing `parts` in order. Entries are file names
/// relative to the manifest's own directory.
pub fn concat_manifest<S: AsRef<str>>(parts: &[S]) -> String {
    parts
        .iter()
        .map(|p| format!("file '{}'\n", p.as_ref().replace('\'', r"'\''")))
        .collect()
}
