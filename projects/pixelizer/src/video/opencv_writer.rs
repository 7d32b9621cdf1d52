use super::opencv_reader::frame_to_mat;
use super::VideoWriter;
use crate::pipeline::types::{Frame, StreamInfo};
use anyhow::{anyhow, Context, Result};
use opencv::{core, prelude::*, videoio};
use std::path::Path;

/// FourCC every artifact is encoded with.
pub const CODEC_TAG: [char; 4] = ['m', 'p', '4', 'v'];

pub struct OpencvWriter {
    writer: videoio::VideoWriter,
    width: u32,
    height: u32,
    frames_written: usize,
}

// SAFETY: a writer is created and used by a single worker thread.
unsafe impl Send for OpencvWriter {}

impl OpencvWriter {
    pub fn new(path: &Path, info: &StreamInfo) -> Result<Self> {
        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow!("Non UTF-8 output path: {:?}", path))?;
        let [a, b, c, d] = CODEC_TAG;
        let fourcc = videoio::VideoWriter::fourcc(a, b, c, d)?;
        let writer = videoio::VideoWriter::new(
            path_str,
            fourcc,
            info.fps,
            core::Size::new(info.width as i32, info.height as i32),
            true,
        )
        .with_context(|| format!("Failed to create video writer at '{}'", path_str))?;
        if !writer.is_opened()? {
            return Err(anyhow!("Video writer did not open: {}", path_str));
        }
        tracing::debug!(
            "OpencvWriter: writing {} ({}x{} @ {:.2} fps)",
            path_str,
            info.width,
            info.height,
            info.fps
        );

        Ok(Self {
            writer,
            width: info.width,
            height: info.height,
            frames_written: 0,
        })
    }
}

impl VideoWriter for OpencvWriter {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if frame.width() != self.width || frame.height() != self.height {
            return Err(anyhow!(
                "Frame is {}x{}, writer expects {}x{}",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            ));
        }
        let mat = frame_to_mat(frame)?;
        self.writer.write(&mat)?;
        self.frames_written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.release()?;
        tracing::debug!("OpencvWriter: closed after {} frames", self.frames_written);
        Ok(())
    }
}
