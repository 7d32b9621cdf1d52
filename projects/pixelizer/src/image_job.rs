// Still-image jobs: the video transforms applied to a single picture

use crate::error::PixelError;
use crate::pipeline::transform::FrameStrategy;
use crate::pipeline::types::Frame;
use anyhow::{anyhow, Context, Result};
use image::{DynamicImage, ImageBuffer, Rgb, RgbImage};
use std::path::Path;
use std::time::{Duration, Instant};

/// File extensions routed to the still-image path.
pub const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "bmp", "gif", "webp"];

pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageOutcome {
    pub width: u32,
    pub height: u32,
    /// Set for anonymize jobs.
    pub faces_found: Option<bool>,
    pub elapsed: Duration,
}

/// Convert an RGB image buffer into a BGR frame.
pub fn rgb_to_frame(img: &RgbImage) -> Result<Frame> {
    let mut data = img.as_raw().clone();
    for px in data.chunks_exact_mut(3) {
        px.swap(0, 2);
    }
    Frame::from_raw(img.width(), img.height(), data)
}

/// Convert a BGR frame back into an RGB image buffer.
pub fn frame_to_rgb(frame: &Frame) -> Result<RgbImage> {
    let mut data = frame.as_bytes().to_vec();
    for px in data.chunks_exact_mut(3) {
        px.swap(0, 2);
    }
    ImageBuffer::<Rgb<u8>, _>::from_vec(frame.width(), frame.height(), data)
        .ok_or_else(|| anyhow!("Failed to create ImageBuffer from frame data"))
}

/// Apply `strategy` to an in-memory image.
pub fn transform_image(img: &DynamicImage, strategy: &FrameStrategy) -> Result<(RgbImage, bool)> {
    let mut frame = rgb_to_frame(&img.to_rgb8())?;
    strategy.validate(frame.width(), frame.height())?;

    let mut transform = strategy.instantiate()?;
    let faces_found = transform.apply(&mut frame)?;
    Ok((frame_to_rgb(&frame)?, faces_found))
}

/// Decode `input`, transform it and encode the result to `output`. The
/// output format follows the extension of `output`.
pub fn run_image_job(input: &Path, output: &Path, strategy: &FrameStrategy) -> Result<ImageOutcome> {
    let start_inst = Instant::now();
    if input == output {
        return Err(PixelError::OutputIsInput(output.to_path_buf()).into());
    }

    let img = image::open(input).with_context(|| format!("Failed to decode image {:?}", input))?;
    tracing::info!("ImageJob: {:?} {}x{}", input, img.width(), img.height());

    let (result, faces_found) = transform_image(&img, strategy)?;
    result
        .save(output)
        .with_context(|| format!("Failed to encode image {:?}", output))?;

    if strategy.detects_faces() && !faces_found {
        tracing::warn!("ImageJob: no faces found in {:?}", input);
    }

    Ok(ImageOutcome {
        width: result.width(),
        height: result.height(),
        faces_found: strategy.detects_faces().then_some(faces_found),
        elapsed: start_inst.elapsed(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::{FaceBox, JobMode};
    use crate::testing::{gradient_frame, static_detectors};

    fn pixelize(pixel_size: u32, color_depth: Option<u32>) -> FrameStrategy {
        FrameStrategy::from_mode(
            JobMode::Pixelize {
                pixel_size,
                color_depth,
            },
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_channel_order_conversion() {
        let img = RgbImage::from_pixel(2, 1, Rgb([10, 20, 30]));
        let frame = rgb_to_frame(&img).unwrap();
        assert_eq!(frame.pixel(1, 0), [30, 20, 10]);
        assert_eq!(frame_to_rgb(&frame).unwrap(), img);
    }

    #[test]
    fn test_image_extensions() {
        assert!(is_image_path(Path::new("a/b/cat.PNG")));
        assert!(is_image_path(Path::new("cat.jpeg")));
        assert!(!is_image_path(Path::new("cat.mp4")));
        assert!(!is_image_path(Path::new("cat")));
    }

    #[test]
    fn test_quantized_image() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([128, 128, 128])));
        let (out, faces) = transform_image(&img, &pixelize(4, Some(8))).unwrap();
        assert!(!faces);
        assert!(out.pixels().all(|p| p.0 == [109, 109, 109]));
    }

    #[test]
    fn test_pixel_size_larger_than_image() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(640, 480));
        let err = transform_image(&img, &pixelize(1080, None)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PixelError>(),
            Some(PixelError::InvalidPixelSize { size: 1080, .. })
        ));
    }

    #[test]
    fn test_run_image_job_roundtrips_through_png() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.png");
        let output = dir.path().join("out.png");
        frame_to_rgb(&gradient_frame(24, 16, 3))
            .unwrap()
            .save(&input)
            .unwrap();

        let strategy = FrameStrategy::from_mode(
            JobMode::Anonymize,
            Some(static_detectors(vec![FaceBox::new(2, 2, 8, 8)])),
        )
        .unwrap();
        let outcome = run_image_job(&input, &output, &strategy).unwrap();

        assert_eq!((outcome.width, outcome.height), (24, 16));
        assert_eq!(outcome.faces_found, Some(true));
        let written = image::open(&output).unwrap().to_rgb8();
        let source = image::open(&input).unwrap().to_rgb8();
        assert_ne!(written, source);
        // outside the face box nothing changes
        assert_eq!(written.get_pixel(20, 12), source.get_pixel(20, 12));
    }

    #[test]
    fn test_output_must_differ_from_input() {
        let strategy = pixelize(2, None);
        let err = run_image_job(Path::new("a.png"), Path::new("a.png"), &strategy).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PixelError>(),
            Some(PixelError::OutputIsInput(_))
        ));
    }
}
