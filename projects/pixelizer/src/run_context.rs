// Job working directory: artifact naming and cleanup

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Private working directory of one video job.
///
/// Holds the per-worker parts, the concat manifest, the extracted audio and
/// the silent assembled video. `close` removes it once every artifact is
/// gone; if the job fails first, dropping the workspace removes the whole
/// directory.
#[derive(Debug)]
pub struct JobWorkspace {
    dir: PathBuf,
    closed: bool,
}

impl JobWorkspace {
    pub fn create(work_root: &Path, source: &Path) -> Result<Self> {
        let stem = source
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| anyhow!("Invalid video name: {:?}", source))?;

        fs::create_dir_all(work_root)
            .with_context(|| format!("Failed to create work root {:?}", work_root))?;

        let dir = work_root.join(format!(
            "{}-{}",
            stem,
            Utc::now().format("%Y%m%d%H%M%S%f")
        ));
        fs::create_dir(&dir).with_context(|| format!("Failed to create job directory {:?}", dir))?;
        tracing::debug!("JobWorkspace: created {:?}", dir);

        Ok(Self { dir, closed: false })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn part_name(index: usize) -> String {
        format!("part_{}.mp4", index)
    }

    pub fn part_path(&self, index: usize) -> PathBuf {
        self.dir.join(Self::part_name(index))
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join("video_parts.txt")
    }

    /// Matroska accepts any audio codec, so the source stream is copied as is.
    pub fn audio_path(&self) -> PathBuf {
        self.dir.join("audio.mka")
    }

    pub fn silent_video_path(&self) -> PathBuf {
        self.dir.join("video.mp4")
    }

    /// Delete one artifact. A missing file is not an error.
    pub fn remove_artifact(&self, path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove artifact {:?}", path)),
        }
    }

    /// Remove the (now empty) directory. Fails if anything is left inside.
    pub fn close(mut self) -> Result<()> {
        fs::remove_dir(&self.dir)
            .with_context(|| format!("Job directory {:?} is not empty", self.dir))?;
        self.closed = true;
        tracing::debug!("JobWorkspace: removed {:?}", self.dir);
        Ok(())
    }
}

impl Drop for JobWorkspace {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => tracing::info!("JobWorkspace: discarded {:?}", self.dir),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("JobWorkspace: failed to discard {:?}: {}", self.dir, e),
        }
    }
}
