pub mod face_detector;
#[cfg(feature = "ffmpeg")]
pub mod ffmpeg_reader;
pub mod mux;
#[cfg(feature = "opencv")]
pub mod opencv_reader;
#[cfg(feature = "opencv")]
pub mod opencv_writer;
pub mod processor;

use crate::pipeline::types::{Frame, StreamInfo};
use anyhow::Result;
use std::path::Path;

/// Sequential decoder with an independent seek cursor.
pub trait VideoReader: Send {
    fn info(&self) -> StreamInfo;
    fn seek_to_frame(&mut self, frame_num: usize) -> Result<()>;
    /// Next frame in BGR order. Fails with `DecodeFailure` at end of stream.
    fn read_frame(&mut self) -> Result<Frame>;
}

/// Encoder for one output artifact. fps and dimensions come from the source `StreamInfo`.
pub trait VideoWriter: Send {
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;
    /// Flush and close the container.
    fn finish(&mut self) -> Result<()>;
}

/// Opens readers and writers by path. Shared by all workers of a job.
pub trait MediaBackend: Sync {
    fn open_reader(&self, path: &Path) -> Result<Box<dyn VideoReader>>;
    fn create_writer(&self, path: &Path, info: &StreamInfo) -> Result<Box<dyn VideoWriter>>;
}

/// Decoder implementation used by [`NativeBackend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DecoderBackend {
    Opencv,
    Ffmpeg,
}

/// Real codec layer: the selected decoder plus OpenCV's `VideoWriter` (`mp4v`).
pub struct NativeBackend {
    decoder: DecoderBackend,
}

impl NativeBackend {
    pub fn new(decoder: DecoderBackend) -> Self {
        Self { decoder }
    }
}

impl MediaBackend for NativeBackend {
    fn open_reader(&self, path: &Path) -> Result<Box<dyn VideoReader>> {
        match self.decoder {
            #[cfg(feature = "opencv")]
            DecoderBackend::Opencv => Ok(Box::new(opencv_reader::OpencvReader::new(path)?)),
            #[cfg(feature = "ffmpeg")]
            DecoderBackend::Ffmpeg => Ok(Box::new(ffmpeg_reader::FfmpegReader::new(path)?)),
            #[allow(unreachable_patterns)]
            other => Err(anyhow::anyhow!(
                "Unsupported or disabled backend: {:?} (opening {:?})",
                other,
                path
            )),
        }
    }

    fn create_writer(&self, path: &Path, info: &StreamInfo) -> Result<Box<dyn VideoWriter>> {
        #[cfg(feature = "opencv")]
        {
            Ok(Box::new(opencv_writer::OpencvWriter::new(path, info)?))
        }
        #[cfg(not(feature = "opencv"))]
        {
            let _ = info;
            Err(anyhow::anyhow!(
                "Built without the opencv feature, cannot encode {:?}",
                path
            ))
        }
    }
}
