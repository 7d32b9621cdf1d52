// Pipeline orchestrator: manages the video job lifecycle
//
// Extracts audio, partitions the source, runs one part worker per range,
// joins them, concatenates the parts and puts the audio back on.

use crate::error::PixelError;
use crate::pipeline::part_worker::{process_part, PartTask};
use crate::pipeline::partition::{
    available_parallelism, partition_frames, worker_count, MAX_WORKERS,
};
use crate::pipeline::transform::FrameStrategy;
use crate::pipeline::types::{FrameRange, JobMode, PartOutcome, StreamInfo};
use crate::run_context::JobWorkspace;
use crate::video::face_detector::DetectorFactory;
use crate::video::mux::{concat_manifest, MuxTool};
use crate::video::processor::frame_progress;
use crate::video::MediaBackend;
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Lifecycle of a video job. `CleanedUp` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Created,
    AudioExtracted,
    Dispatched,
    AllWorkersDone,
    Assembled,
    AudioRemuxed,
    CleanedUp,
    Failed,
}

impl JobState {
    fn next(self) -> Option<JobState> {
        use JobState::*;
        match self {
            Created => Some(AudioExtracted),
            AudioExtracted => Some(Dispatched),
            Dispatched => Some(AllWorkersDone),
            AllWorkersDone => Some(Assembled),
            Assembled => Some(AudioRemuxed),
            AudioRemuxed => Some(CleanedUp),
            CleanedUp | Failed => None,
        }
    }
}

/// Runtime knobs of the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Parent of every job's private working directory.
    pub work_root: PathBuf,
    /// Host parallelism, detected at construction.
    pub parallelism: usize,
    /// Requested worker count. Still capped by `MAX_WORKERS` and `parallelism`.
    pub workers: Option<usize>,
    pub show_progress: bool,
}

impl PipelineConfig {
    pub fn new(work_root: impl Into<PathBuf>) -> Self {
        Self {
            work_root: work_root.into(),
            parallelism: available_parallelism(),
            workers: None,
            show_progress: true,
        }
    }

    /// `min(MAX_WORKERS, parallelism)`, lowered by an explicit request and
    /// never above the frame count, so no part is empty.
    fn resolve_workers(&self, frame_count: usize) -> usize {
        let cap = worker_count(MAX_WORKERS, self.parallelism);
        let w = self.workers.map_or(cap, |w| w.min(cap));
        w.clamp(1, frame_count.max(1))
    }
}

/// A request to pixelize or anonymize one video file.
#[derive(Debug)]
pub struct VideoJob {
    pub input: PathBuf,
    pub output: PathBuf,
    pub mode: JobMode,
    state: JobState,
}

/// What a finished job hands back to its caller.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    pub output: PathBuf,
    /// Set for anonymize jobs: whether any worker saw a face.
    pub faces_found: Option<bool>,
    pub frames: usize,
    pub workers: usize,
    pub elapsed: Duration,
}

impl VideoJob {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>, mode: JobMode) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            mode,
            state: JobState::Created,
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    fn advance(&mut self, to: JobState) -> Result<()> {
        if self.state.next() != Some(to) {
            return Err(anyhow!(
                "VideoJob: invalid transition {:?} -> {:?}",
                self.state,
                to
            ));
        }
        tracing::info!("VideoJob: {:?} -> {:?} ({:?})", self.state, to, self.input);
        self.state = to;
        Ok(())
    }

    fn fail(&mut self) {
        tracing::error!("VideoJob: {:?} -> Failed ({:?})", self.state, self.input);
        self.state = JobState::Failed;
    }
}

/// Run a video job to completion.
///
/// Parameter errors surface before any artifact exists. Once the working
/// directory is created, every exit path removes it, and a failed job also
/// removes any partially written output.
///
/// The per-frame transform is built from `job.mode`; `detectors` is required
/// for anonymize jobs.
pub fn run_video_job(
    job: &mut VideoJob,
    detectors: Option<DetectorFactory>,
    backend: &dyn MediaBackend,
    mux: &dyn MuxTool,
    config: &PipelineConfig,
) -> Result<JobOutcome> {
    if job.state != JobState::Created {
        return Err(anyhow!("VideoJob: already run (state {:?})", job.state));
    }
    let start_inst = Instant::now();

    let (strategy, info, ranges) = match prepare(job, detectors, backend, config) {
        Ok(plan) => plan,
        Err(e) => {
            job.fail();
            return Err(e);
        }
    };

    match execute(job, &strategy, backend, mux, config, info, &ranges) {
        Ok(outcomes) => Ok(JobOutcome {
            output: job.output.clone(),
            faces_found: strategy
                .detects_faces()
                .then(|| reduce_faces_found(&outcomes)),
            frames: outcomes.iter().map(|o| o.frames).sum(),
            workers: outcomes.len(),
            elapsed: start_inst.elapsed(),
        }),
        Err(e) => {
            job.fail();
            if job.output.exists() {
                if let Err(rm) = fs::remove_file(&job.output) {
                    tracing::warn!("VideoJob: failed to remove partial output {:?}: {}", job.output, rm);
                }
            }
            Err(e)
        }
    }
}

/// Validation and planning. Touches nothing on disk.
fn prepare(
    job: &VideoJob,
    detectors: Option<DetectorFactory>,
    backend: &dyn MediaBackend,
    config: &PipelineConfig,
) -> Result<(FrameStrategy, StreamInfo, Vec<FrameRange>)> {
    if job.output == job.input {
        return Err(PixelError::OutputIsInput(job.output.clone()).into());
    }
    let strategy = FrameStrategy::from_mode(job.mode, detectors)?;

    let info = backend
        .open_reader(&job.input)
        .with_context(|| format!("Failed to read stream info of {:?}", job.input))?
        .info();
    strategy.validate(info.width, info.height)?;
    if info.frame_count == 0 {
        return Err(PixelError::EmptyVideo(job.input.clone()).into());
    }

    let workers = config.resolve_workers(info.frame_count);
    let ranges = partition_frames(info.frame_count, workers);
    tracing::info!(
        "VideoJob: {:?} {}x{} @ {:.2} fps, {} frames across {} workers",
        job.input,
        info.width,
        info.height,
        info.fps,
        info.frame_count,
        workers
    );
    Ok((strategy, info, ranges))
}

fn execute(
    job: &mut VideoJob,
    strategy: &FrameStrategy,
    backend: &dyn MediaBackend,
    mux: &dyn MuxTool,
    config: &PipelineConfig,
    info: StreamInfo,
    ranges: &[FrameRange],
) -> Result<Vec<PartOutcome>> {
    let workspace = JobWorkspace::create(&config.work_root, &job.input)?;

    let audio = workspace.audio_path();
    mux.extract_audio(&job.input, &audio)?;
    job.advance(JobState::AudioExtracted)?;

    job.advance(JobState::Dispatched)?;
    let progress = frame_progress(info.frame_count, config.show_progress)?;
    let outcomes = dispatch_parts(&workspace, &job.input, info, ranges, strategy, backend, &progress);
    progress.finish_and_clear();
    let outcomes = outcomes?;
    job.advance(JobState::AllWorkersDone)?;

    let silent = workspace.silent_video_path();
    assemble_parts(&workspace, ranges.len(), mux, &silent)?;
    job.advance(JobState::Assembled)?;

    mux.remux(&silent, &audio, &job.output)?;
    workspace.remove_artifact(&silent)?;
    workspace.remove_artifact(&audio)?;
    job.advance(JobState::AudioRemuxed)?;

    workspace.close()?;
    job.advance(JobState::CleanedUp)?;

    if strategy.detects_faces() && !reduce_faces_found(&outcomes) {
        tracing::warn!("VideoJob: no faces found in {:?}", job.input);
    }
    Ok(outcomes)
}

/// Run one worker per range in parallel and join them all.
///
/// The first failing worker raises a shared abort flag so the others stop at
/// their next frame. Any failure fails the whole dispatch; the error of the
/// lowest failing worker index is returned, wrapped in `WorkerFailure`.
pub fn dispatch_parts(
    workspace: &JobWorkspace,
    source: &Path,
    info: StreamInfo,
    ranges: &[FrameRange],
    strategy: &FrameStrategy,
    backend: &dyn MediaBackend,
    progress: &indicatif::ProgressBar,
) -> Result<Vec<PartOutcome>> {
    let abort = AtomicBool::new(false);

    let results: Vec<Result<Option<PartOutcome>>> = crossbeam::thread::scope(|s| {
        let abort = &abort;
        let handles: Vec<_> = ranges
            .iter()
            .enumerate()
            .map(|(index, &range)| {
                let task = PartTask {
                    index,
                    range,
                    source,
                    output: workspace.part_path(index),
                    info,
                };
                s.spawn(move |_| {
                    let result = process_part(&task, strategy, backend, progress, abort);
                    if let Err(e) = &result {
                        tracing::error!("Worker {} failed: {:#}", index, e);
                        abort.store(true, Ordering::Relaxed);
                    }
                    result
                })
            })
            .collect();

        handles
            .into_iter()
            .enumerate()
            .map(|(index, handle)| {
                handle
                    .join()
                    .unwrap_or_else(|_| Err(anyhow!("Worker {} panicked", index)))
            })
            .collect()
    })
    .map_err(|_| anyhow!("Worker scope panicked"))?;

    let mut outcomes = Vec::with_capacity(results.len());
    for (index, result) in results.into_iter().enumerate() {
        match result {
            Ok(Some(outcome)) => {
                tracing::debug!(
                    "Worker {} finished {} frames (faces_found={})",
                    outcome.index,
                    outcome.frames,
                    outcome.faces_found
                );
                outcomes.push(outcome)
            }
            Ok(None) => {}
            Err(e) => return Err(e.context(PixelError::WorkerFailure { index })),
        }
    }
    if outcomes.len() != ranges.len() {
        return Err(anyhow!(
            "Only {} of {} workers completed",
            outcomes.len(),
            ranges.len()
        ));
    }
    Ok(outcomes)
}

/// Logical OR of every worker's local face flag. Order does not matter.
pub fn reduce_faces_found(outcomes: &[PartOutcome]) -> bool {
    outcomes.iter().any(|o| o.faces_found)
}

/// Concatenate `parts` sub-videos in worker order into `output` by stream
/// copy, then delete the parts and the manifest.
pub fn assemble_parts(
    workspace: &JobWorkspace,
    parts: usize,
    mux: &dyn MuxTool,
    output: &Path,
) -> Result<()> {
    let names: Vec<String> = (0..parts).map(JobWorkspace::part_name).collect();
    let manifest = workspace.manifest_path();
    fs::write(&manifest, concat_manifest(&names))
        .with_context(|| format!("Failed to write concat manifest {:?}", manifest))?;

    mux.concat(&manifest, output)?;

    for index in 0..parts {
        workspace.remove_artifact(&workspace.part_path(index))?;
    }
    workspace.remove_artifact(&manifest)?;
    Ok(())
}
