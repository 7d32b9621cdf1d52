// Per-frame transform strategies shared by the video and image paths

use crate::pipeline::palette::Palette;
use crate::pipeline::pixelate::{pixelate, pixelate_faces, validate_pixel_size, FillStrategy};
use crate::pipeline::types::{Frame, JobMode};
use crate::video::face_detector::{DetectorFactory, FaceDetector};
use anyhow::{anyhow, Result};
use std::sync::Arc;

/// A per-frame transformation owned by one worker.
pub trait FrameTransform: Send {
    /// Transform `frame` in place. Returns true when the frame contained a face.
    fn apply(&mut self, frame: &mut Frame) -> Result<bool>;
}

/// Job-wide choice of transform. Built once, before dispatch, and
/// instantiated once per worker.
#[derive(Clone)]
pub enum FrameStrategy {
    Pixelize {
        pixel_size: u32,
        palette: Option<Arc<Palette>>,
    },
    Anonymize {
        detectors: DetectorFactory,
    },
}

impl FrameStrategy {
    /// Resolve a job mode. Fails with `InvalidColorLevel` before any frame is touched.
    pub fn from_mode(mode: JobMode, detectors: Option<DetectorFactory>) -> Result<Self> {
        match mode {
            JobMode::Pixelize {
                pixel_size,
                color_depth,
            } => {
                let palette = color_depth.map(Palette::new).transpose()?.map(Arc::new);
                Ok(FrameStrategy::Pixelize {
                    pixel_size,
                    palette,
                })
            }
            JobMode::Anonymize => {
                let detectors =
                    detectors.ok_or_else(|| anyhow!("Anonymize mode needs a face detector"))?;
                Ok(FrameStrategy::Anonymize { detectors })
            }
        }
    }

    /// Check frame-size dependent parameters against the source dimensions.
    pub fn validate(&self, width: u32, height: u32) -> Result<()> {
        if let FrameStrategy::Pixelize { pixel_size, .. } = self {
            validate_pixel_size(*pixel_size, width, height)?;
        }
        Ok(())
    }

    pub fn instantiate(&self) -> Result<Box<dyn FrameTransform>> {
        match self {
            FrameStrategy::Pixelize {
                pixel_size,
                palette,
            } => Ok(Box::new(PixelizeTransform {
                pixel_size: *pixel_size,
                palette: palette.clone(),
            })),
            FrameStrategy::Anonymize { detectors } => Ok(Box::new(AnonymizeTransform {
                detector: detectors()?,
            })),
        }
    }

    pub fn detects_faces(&self) -> bool {
        matches!(self, FrameStrategy::Anonymize { .. })
    }
}

struct PixelizeTransform {
    pixel_size: u32,
    palette: Option<Arc<Palette>>,
}

impl FrameTransform for PixelizeTransform {
    fn apply(&mut self, frame: &mut Frame) -> Result<bool> {
        let fill = match &self.palette {
            Some(palette) => FillStrategy::Quantized(palette),
            None => FillStrategy::RawAverage,
        };
        *frame = pixelate(frame, self.pixel_size, fill)?;
        Ok(false)
    }
}

struct AnonymizeTransform {
    detector: Box<dyn FaceDetector>,
}

impl FrameTransform for AnonymizeTransform {
    fn apply(&mut self, frame: &mut Frame) -> Result<bool> {
        pixelate_faces(frame, self.detector.as_mut())
    }
}
