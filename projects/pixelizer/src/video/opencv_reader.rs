use super::VideoReader;
use crate::error::PixelError;
use crate::pipeline::types::{Frame, StreamInfo};
use anyhow::{anyhow, Context, Result};
use opencv::{
    core,
    prelude::*,
    videoio::{
        VideoCapture, CAP_ANY, CAP_PROP_FPS, CAP_PROP_FRAME_COUNT, CAP_PROP_FRAME_HEIGHT,
        CAP_PROP_FRAME_WIDTH, CAP_PROP_POS_FRAMES,
    },
};
use std::path::Path;

pub struct OpencvReader {
    capture: VideoCapture,
    info: StreamInfo,
    position: usize,
}

impl OpencvReader {
    pub fn new(path: &Path) -> Result<Self> {
        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow!("Non UTF-8 video path: {:?}", path))?;
        let capture = VideoCapture::from_file(path_str, CAP_ANY)
            .with_context(|| format!("Failed to open video at: '{}'", path_str))?;
        if !capture.is_opened()? {
            return Err(anyhow!("Failed to open video file: {}", path_str));
        }

        let mut fps = capture.get(CAP_PROP_FPS)?;
        if fps <= 0.0 {
            tracing::warn!("OpencvReader: Failed to get FPS from metadata, falling back to 30.0");
            fps = 30.0;
        }
        let frame_count = capture.get(CAP_PROP_FRAME_COUNT)?.max(0.0) as usize;
        let width = capture.get(CAP_PROP_FRAME_WIDTH)? as u32;
        let height = capture.get(CAP_PROP_FRAME_HEIGHT)? as u32;

        tracing::info!(
            "OpencvReader: opened {}, {}x{}, fps={:.2}, stream_frames={}",
            path_str,
            width,
            height,
            fps,
            frame_count
        );

        Ok(Self {
            capture,
            info: StreamInfo {
                fps,
                width,
                height,
                frame_count,
            },
            position: 0,
        })
    }
}

impl VideoReader for OpencvReader {
    fn info(&self) -> StreamInfo {
        self.info
    }

    fn seek_to_frame(&mut self, frame_num: usize) -> Result<()> {
        if frame_num == self.position {
            return Ok(());
        }
        if !self.capture.set(CAP_PROP_POS_FRAMES, frame_num as f64)? {
            return Err(anyhow!("OpencvReader: failed to seek to frame {}", frame_num));
        }
        self.position = frame_num;
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Frame> {
        let mut mat = core::Mat::default();
        let success = self.capture.read(&mut mat)?;
        if !success || mat.empty() {
            return Err(PixelError::DecodeFailure {
                frame: self.position,
                expected: self.info.frame_count,
            }
            .into());
        }
        self.position += 1;

        mat_to_frame(&mat)
    }
}

/// Copy a `CV_8UC3` BGR Mat into an owned [`Frame`].
pub fn mat_to_frame(mat: &core::Mat) -> Result<Frame> {
    if mat.typ() != core::CV_8UC3 {
        return Err(anyhow!("Expected an 8-bit 3-channel Mat, got type {}", mat.typ()));
    }
    let size = mat.size()?;
    let width = size.width as usize;

    let data = if mat.is_continuous() {
        mat.data_bytes()?.to_vec()
    } else {
        let mut data = Vec::with_capacity(width * size.height as usize * 3);
        for y in 0..size.height {
            let row = mat.ptr(y)?;
            // SAFETY: each row of a CV_8UC3 Mat holds `width * 3` bytes.
            let row = unsafe { std::slice::from_raw_parts(row, width * 3) };
            data.extend_from_slice(row);
        }
        data
    };

    Frame::from_raw(size.width as u32, size.height as u32, data)
}

/// Copy a [`Frame`] into a freshly allocated `CV_8UC3` Mat.
pub fn frame_to_mat(frame: &Frame) -> Result<core::Mat> {
    let width = frame.width() as usize;
    let height = frame.height() as i32;
    let src = frame.as_bytes();

    let mut mat = unsafe { core::Mat::new_rows_cols(height, width as i32, core::CV_8UC3)? };
    for y in 0..height as usize {
        let src_row = &src[y * width * 3..(y + 1) * width * 3];
        let dst_ptr = mat.ptr_mut(y as i32)?;
        unsafe {
            std::ptr::copy_nonoverlapping(src_row.as_ptr(), dst_ptr, width * 3);
        }
    }

    Ok(mat)
}
