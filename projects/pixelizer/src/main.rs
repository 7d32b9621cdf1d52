mod cli;
mod error;
mod image_job;
mod pipeline;
mod report;
mod run_context;
#[cfg(test)]
mod testing;
mod video;

use anyhow::{Context, Result};
use cli::Args;
use error::find_root_kind;
use image_job::{is_image_path, run_image_job};
use pipeline::orchestrator::{run_video_job, PipelineConfig, VideoJob};
use pipeline::transform::FrameStrategy;
use pipeline::types::JobMode;
use report::JobReport;
use std::path::Path;
use video::face_detector::DetectorFactory;
use video::mux::FfmpegCli;
use video::NativeBackend;

fn main() -> Result<()> {
    // Load environment variables from .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    let args = Args::parse_args();

    if let Err(e) = run(&args) {
        if let Some(kind) = find_root_kind(&e) {
            tracing::error!("Job failed: {}", kind);
        }
        return Err(e);
    }

    Ok(())
}

fn run(args: &Args) -> Result<()> {
    let input = args.command.input();
    let output = args.command.output();
    let mode = args.command.mode();

    let detectors = match mode {
        JobMode::Anonymize => Some(cascade_detectors(&args.face_cascade)?),
        JobMode::Pixelize { .. } => None,
    };

    let report = if is_image_path(input) {
        let strategy = FrameStrategy::from_mode(mode, detectors)?;
        let outcome = run_image_job(input, &output, &strategy)?;
        JobReport::new(input, &output, mode, outcome.faces_found, 1, 1, outcome.elapsed)
    } else {
        let mut config = PipelineConfig::new(&args.work_root);
        config.workers = args.workers;
        config.show_progress = !args.no_progress;

        let backend = NativeBackend::new(args.backend);
        let mux = FfmpegCli::new(&args.ffmpeg);
        let mut job = VideoJob::new(input, &output, mode);
        let outcome = run_video_job(&mut job, detectors, &backend, &mux, &config)?;
        tracing::info!(
            "Wrote {:?}: {} frames, {} workers, {:.1}s",
            outcome.output,
            outcome.frames,
            outcome.workers,
            outcome.elapsed.as_secs_f64()
        );
        JobReport::new(
            input,
            &output,
            mode,
            outcome.faces_found,
            outcome.frames,
            outcome.workers,
            outcome.elapsed,
        )
    };

    // Nothing was anonymized, so the output is just a copy of the input.
    if report.faces_found == Some(false) {
        tracing::warn!("No faces found, discarding {:?}", output);
        std::fs::remove_file(&output)
            .with_context(|| format!("Failed to discard {:?}", output))?;
    }
    if let Some(path) = &args.report {
        report.write(path)?;
    }

    Ok(())
}

#[cfg(feature = "opencv")]
fn cascade_detectors(cascade: &Path) -> Result<DetectorFactory> {
    use std::sync::Arc;
    use video::face_detector::{CascadeFaceDetector, FaceDetector};

    // Load once here so a bad cascade fails before any job artifact exists.
    CascadeFaceDetector::new(cascade)?;

    let cascade = cascade.to_path_buf();
    Ok(Arc::new(move || -> Result<Box<dyn FaceDetector>> {
        Ok(Box::new(CascadeFaceDetector::new(&cascade)?))
    }))
}

#[cfg(not(feature = "opencv"))]
fn cascade_detectors(cascade: &Path) -> Result<DetectorFactory> {
    Err(anyhow::anyhow!(
        "Built without the opencv feature, cannot load face cascade {:?}",
        cascade
    ))
}
