use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};

/// Progress bar over `total` frames, shared by all workers of a job.
/// Hidden bars keep the same API for tests and `--no-progress`.
pub fn frame_progress(total: usize, visible: bool) -> Result<ProgressBar> {
    if !visible {
        return Ok(ProgressBar::hidden());
    }

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec:.1.yellow} fps, {eta})")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}
