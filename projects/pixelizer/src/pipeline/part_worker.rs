// Part worker: decodes its frame range, transforms each frame and writes a sub-video

use crate::pipeline::transform::FrameStrategy;
use crate::pipeline::types::{FrameRange, PartOutcome, StreamInfo};
use crate::video::MediaBackend;
use anyhow::{Context, Result};
use indicatif::ProgressBar;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Everything one worker needs to produce its part.
#[derive(Debug, Clone)]
pub struct PartTask<'a> {
    pub index: usize,
    pub range: FrameRange,
    pub source: &'a Path,
    pub output: PathBuf,
    pub info: StreamInfo,
}

/// Process one part. Returns `None` when another worker failed first and
/// `abort` was raised; the partial file is left for the workspace to discard.
pub fn process_part(
    task: &PartTask,
    strategy: &FrameStrategy,
    backend: &dyn MediaBackend,
    progress: &ProgressBar,
    abort: &AtomicBool,
) -> Result<Option<PartOutcome>> {
    let start_inst = Instant::now();
    tracing::info!("Worker {}: processing frames {}", task.index, task.range);

    // Each worker owns its transform, decoder and encoder.
    let mut transform = strategy.instantiate()?;
    let mut reader = backend.open_reader(task.source)?;
    reader
        .seek_to_frame(task.range.start)
        .with_context(|| format!("Worker {}: seek to frame {}", task.index, task.range.start))?;
    let mut writer = backend.create_writer(&task.output, &task.info)?;

    let mut faces_found = false;
    for frame_id in task.range.iter() {
        if abort.load(Ordering::Relaxed) {
            tracing::info!("Worker {}: stopping at frame {}, job aborted", task.index, frame_id);
            return Ok(None);
        }

        let mut frame = reader
            .read_frame()
            .with_context(|| format!("Worker {}: failed to decode frame {}", task.index, frame_id))?;
        faces_found |= transform
            .apply(&mut frame)
            .with_context(|| format!("Worker {}: failed to transform frame {}", task.index, frame_id))?;
        writer.write_frame(&frame)?;
        progress.inc(1);
    }
    writer.finish()?;

    tracing::debug!(
        "Worker {}: wrote {} frames to {:?} in {:.1}s (faces_found={})",
        task.index,
        task.range.len(),
        task.output,
        start_inst.elapsed().as_secs_f64(),
        faces_found
    );

    Ok(Some(PartOutcome {
        index: task.index,
        frames: task.range.len(),
        faces_found,
    }))
}
