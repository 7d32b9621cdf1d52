use crate::pipeline::types::{FaceBox, Frame};
use anyhow::Result;
use std::sync::Arc;

/// Pluggable face detection backend.
///
/// Detectors may keep per-instance state, so each worker builds its own
/// through a [`DetectorFactory`].
pub trait FaceDetector: Send {
    /// Detect faces in a BGR frame. Boxes may overlap or hang over the frame edge.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceBox>>;
}

/// Builds one detector per worker thread.
pub type DetectorFactory = Arc<dyn Fn() -> Result<Box<dyn FaceDetector>> + Send + Sync>;

#[cfg(feature = "opencv")]
pub use cascade::CascadeFaceDetector;

#[cfg(feature = "opencv")]
mod cascade {
    use super::FaceDetector;
    use crate::pipeline::types::{FaceBox, Frame};
    use crate::video::opencv_reader::frame_to_mat;
    use anyhow::{anyhow, Context, Result};
    use opencv::{core, imgproc, objdetect, prelude::*};
    use std::path::Path;

    /// Haar-cascade face detector from OpenCV's `objdetect` module.
    pub struct CascadeFaceDetector {
        classifier: objdetect::CascadeClassifier,
        min_face: i32,
    }

    impl CascadeFaceDetector {
        pub fn new(cascade_path: &Path) -> Result<Self> {
            let path_str = cascade_path
                .to_str()
                .ok_or_else(|| anyhow!("Non UTF-8 cascade path: {:?}", cascade_path))?;
            let classifier = objdetect::CascadeClassifier::new(path_str)
                .with_context(|| format!("Failed to load face cascade at '{}'", path_str))?;
            if classifier.empty()? {
                return Err(anyhow!("Face cascade at '{}' is empty", path_str));
            }
            tracing::debug!("CascadeFaceDetector: loaded {}", path_str);

            Ok(Self {
                classifier,
                min_face: 24,
            })
        }
    }

    impl FaceDetector for CascadeFaceDetector {
        fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceBox>> {
            let bgr = frame_to_mat(frame)?;
            let mut gray = core::Mat::default();
            imgproc::cvt_color_def(&bgr, &mut gray, imgproc::COLOR_BGR2GRAY)?;
            let mut equalized = core::Mat::default();
            imgproc::equalize_hist(&gray, &mut equalized)?;

            let mut faces = core::Vector::<core::Rect>::new();
            self.classifier.detect_multi_scale(
                &equalized,
                &mut faces,
                1.1,
                5,
                0,
                core::Size::new(self.min_face, self.min_face),
                core::Size::new(0, 0),
            )?;

            Ok(faces
                .iter()
                .map(|r| FaceBox::new(r.x, r.y, r.width, r.height))
                .collect())
        }
    }
}
