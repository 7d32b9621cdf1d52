use crate::error::PixelError;
use crate::pipeline::palette::Palette;
use crate::pipeline::types::{Bgr, Frame, Rect, BLACK};
use crate::video::face_detector::FaceDetector;
use anyhow::Result;

/// How a cell's fill color is derived from its average.
#[derive(Debug, Clone, Copy)]
pub enum FillStrategy<'a> {
    /// The rounded per-channel mean itself.
    RawAverage,
    /// The palette entry for the quantized mean.
    Quantized(&'a Palette),
}

impl FillStrategy<'_> {
    fn resolve(&self, mean: Bgr) -> Bgr {
        match self {
            FillStrategy::RawAverage => mean,
            FillStrategy::Quantized(palette) => palette.quantize(mean),
        }
    }
}

/// Accepts `2 <= size <= min(width, height)`.
pub fn validate_pixel_size(size: u32, width: u32, height: u32) -> Result<(), PixelError> {
    if size < 2 || size > width || size > height {
        return Err(PixelError::InvalidPixelSize {
            size,
            width,
            height,
        });
    }
    Ok(())
}

/// Cell size used for a face box of the given height.
pub fn face_pixel_size(box_height: i32) -> u32 {
    if box_height > 16 {
        (box_height / 8) as u32
    } else {
        2
    }
}

/// Pixelates a whole frame into a new frame.
///
/// The output starts black, so black cells are left untouched.
pub fn pixelate(frame: &Frame, pixel_size: u32, fill: FillStrategy) -> Result<Frame, PixelError> {
    validate_pixel_size(pixel_size, frame.width(), frame.height())?;

    let mut out = Frame::new(frame.width(), frame.height());
    for cell in frame.bounds().cells(pixel_size) {
        let color = fill.resolve(frame.mean_color(cell));
        if color == BLACK {
            continue;
        }
        out.fill_rect(cell, color);
    }
    Ok(out)
}

/// Raw-average pixelation of one region, in place. Cells are clipped to `region`.
pub fn pixelate_region(frame: &mut Frame, region: Rect, pixel_size: u32) -> Result<(), PixelError> {
    validate_pixel_size(pixel_size, region.width, region.height)?;

    for cell in region.cells(pixel_size) {
        let color = frame.mean_color(cell);
        frame.fill_rect(cell, color);
    }
    Ok(())
}

/// Pixelates every detected face in place. Returns whether any face was found.
pub fn pixelate_faces(frame: &mut Frame, detector: &mut dyn FaceDetector) -> Result<bool> {
    let faces = detector.detect(frame)?;

    for face in &faces {
        let region = face.clip(frame.width(), frame.height());
        let pixel_size = face_pixel_size(face.height);
        tracing::trace!(
            "Pixelating face {:?} (clipped {:?}) with pixel size {}",
            face,
            region,
            pixel_size
        );
        pixelate_region(frame, region, pixel_size)?;
    }

    Ok(!faces.is_empty())
}
