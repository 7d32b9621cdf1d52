use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PixelError {
    #[error("invalid color level {0}, expected one of 4, 8, 16, 32, 64")]
    InvalidColorLevel(u32),

    #[error("invalid pixel size {size} for a {width}x{height} region")]
    InvalidPixelSize { size: u32, width: u32, height: u32 },

    #[error("{tool} {operation} failed ({status}): {stderr}")]
    ExternalToolFailure {
        tool: String,
        operation: &'static str,
        status: String,
        stderr: String,
    },

    #[error("stream ended at frame {frame}, expected frames up to {expected}")]
    DecodeFailure { frame: usize, expected: usize },

    #[error("worker {index} failed")]
    WorkerFailure { index: usize },

    #[error("video has no frames: {0}")]
    EmptyVideo(PathBuf),

    #[error("output path must differ from input path: {0}")]
    OutputIsInput(PathBuf),
}

/// Finds the innermost `PixelError` in an error chain.
///
/// Worker failures wrap the original error, so the outermost `PixelError`
/// is `WorkerFailure` while the one that triggered it sits deeper.
pub fn find_root_kind(err: &anyhow::Error) -> Option<&PixelError> {
    err.chain()
        .filter_map(|e| e.downcast_ref::<PixelError>())
        .last()
}
