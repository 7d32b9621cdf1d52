// In-memory stand-ins for the codec layer, the face detector and the mux tool

use crate::error::PixelError;
use crate::pipeline::types::{Bgr, FaceBox, Frame, StreamInfo};
use crate::video::face_detector::{DetectorFactory, FaceDetector};
use crate::video::mux::MuxTool;
use crate::video::{MediaBackend, VideoReader, VideoWriter};
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Pixel value at (0, 0) that [`marker_detectors`] treats as "face present".
/// `gradient_frame` never produces it.
pub const MARKER: Bgr = [1, 2, 3];

/// Deterministic, non-flat frame. Different seeds give different frames.
pub fn gradient_frame(width: u32, height: u32, seed: u32) -> Frame {
    let mut frame = Frame::new(width, height);
    for y in 0..height {
        for x in 0..width {
            frame.put_pixel(
                x,
                y,
                [
                    ((x * 7 + seed * 13) % 256) as u8,
                    ((y * 11 + seed) % 256) as u8,
                    (((x + y) * 5) % 256) as u8,
                ],
            );
        }
    }
    frame
}

/// Returns the same boxes for every frame.
pub struct StaticDetector {
    faces: Vec<FaceBox>,
}

impl StaticDetector {
    pub fn new(faces: Vec<FaceBox>) -> Self {
        Self { faces }
    }
}

impl FaceDetector for StaticDetector {
    fn detect(&mut self, _frame: &Frame) -> Result<Vec<FaceBox>> {
        Ok(self.faces.clone())
    }
}

pub fn static_detectors(faces: Vec<FaceBox>) -> DetectorFactory {
    Arc::new(move || -> Result<Box<dyn FaceDetector>> {
        Ok(Box::new(StaticDetector::new(faces.clone())))
    })
}

/// Detector backed by a closure.
pub struct FnDetector<F> {
    detect: F,
}

impl<F> FaceDetector for FnDetector<F>
where
    F: FnMut(&Frame) -> Result<Vec<FaceBox>> + Send,
{
    fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceBox>> {
        (self.detect)(frame)
    }
}

pub fn fn_detectors<F>(detect: F) -> DetectorFactory
where
    F: Fn(&Frame) -> Result<Vec<FaceBox>> + Clone + Send + Sync + 'static,
{
    Arc::new(move || -> Result<Box<dyn FaceDetector>> {
        Ok(Box::new(FnDetector {
            detect: detect.clone(),
        }))
    })
}

/// Reports `face` on frames whose top-left pixel is [`MARKER`].
pub fn marker_detectors(face: FaceBox) -> DetectorFactory {
    fn_detectors(move |frame: &Frame| {
        if frame.pixel(0, 0) == MARKER {
            Ok(vec![face])
        } else {
            Ok(vec![])
        }
    })
}

/// Writes frames back to back as raw BGR, the container format of [`RawBackend`].
pub fn write_raw_video(path: &Path, frames: &[Frame]) {
    let bytes: Vec<u8> = frames.iter().flat_map(|f| f.as_bytes().to_vec()).collect();
    fs::write(path, bytes).unwrap();
}

/// Lossless codec layer over raw BGR files with fixed dimensions.
///
/// Concatenating two such files byte-wise concatenates their frames, which
/// is what [`FakeMux`] relies on.
pub struct RawBackend {
    width: u32,
    height: u32,
    claimed_frames: Option<usize>,
    parts: Arc<Mutex<Vec<(usize, usize)>>>,
}

impl RawBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            claimed_frames: None,
            parts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Report more frames in the header than the stream holds.
    pub fn claiming_frames(mut self, count: usize) -> Self {
        self.claimed_frames = Some(count);
        self
    }

    fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    /// `(part index, frame count)` of every finished part, by index.
    pub fn parts_written(&self) -> Vec<(usize, usize)> {
        let mut parts = self.parts.lock().unwrap().clone();
        parts.sort();
        parts
    }

    pub fn read_all(&self, path: &Path) -> Vec<Frame> {
        fs::read(path)
            .unwrap()
            .chunks(self.frame_len())
            .map(|c| Frame::from_raw(self.width, self.height, c.to_vec()).unwrap())
            .collect()
    }
}

impl MediaBackend for RawBackend {
    fn open_reader(&self, path: &Path) -> Result<Box<dyn VideoReader>> {
        let data = fs::read(path).with_context(|| format!("Failed to open {:?}", path))?;
        let stored = data.len() / self.frame_len();
        Ok(Box::new(RawReader {
            info: StreamInfo {
                fps: 25.0,
                width: self.width,
                height: self.height,
                frame_count: self.claimed_frames.unwrap_or(stored),
            },
            data,
            stored,
            position: 0,
        }))
    }

    fn create_writer(&self, path: &Path, info: &StreamInfo) -> Result<Box<dyn VideoWriter>> {
        if info.width != self.width || info.height != self.height {
            return Err(anyhow!("Unexpected writer size {}x{}", info.width, info.height));
        }
        Ok(Box::new(RawWriter {
            path: path.to_path_buf(),
            width: self.width,
            height: self.height,
            data: Vec::new(),
            frames: 0,
            parts: self.parts.clone(),
        }))
    }
}

struct RawReader {
    info: StreamInfo,
    data: Vec<u8>,
    stored: usize,
    position: usize,
}

impl VideoReader for RawReader {
    fn info(&self) -> StreamInfo {
        self.info
    }

    fn seek_to_frame(&mut self, frame_num: usize) -> Result<()> {
        self.position = frame_num;
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Frame> {
        if self.position >= self.stored {
            return Err(PixelError::DecodeFailure {
                frame: self.position,
                expected: self.info.frame_count,
            }
            .into());
        }
        let len = self.info.width as usize * self.info.height as usize * 3;
        let start = self.position * len;
        self.position += 1;
        Frame::from_raw(
            self.info.width,
            self.info.height,
            self.data[start..start + len].to_vec(),
        )
    }
}

struct RawWriter {
    path: PathBuf,
    width: u32,
    height: u32,
    data: Vec<u8>,
    frames: usize,
    parts: Arc<Mutex<Vec<(usize, usize)>>>,
}

impl VideoWriter for RawWriter {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if frame.width() != self.width || frame.height() != self.height {
            return Err(anyhow!("Frame size mismatch"));
        }
        self.data.extend_from_slice(frame.as_bytes());
        self.frames += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        fs::write(&self.path, &self.data)?;
        let index = self
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.strip_prefix("part_"))
            .and_then(|s| s.parse().ok());
        if let Some(index) = index {
            self.parts.lock().unwrap().push((index, self.frames));
        }
        Ok(())
    }
}

const AUDIO: &[u8] = b"AUDIO";

/// Mux tool working on raw files: byte-wise concat, remux is a copy.
#[derive(Default)]
pub struct FakeMux {
    pub calls: AtomicUsize,
    pub remuxed_with_audio: AtomicBool,
}

impl MuxTool for FakeMux {
    fn extract_audio(&self, source: &Path, audio: &Path) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(source.exists());
        fs::write(audio, AUDIO)?;
        Ok(())
    }

    fn concat(&self, manifest: &Path, output: &Path) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let dir = manifest.parent().unwrap();
        let mut joined = Vec::new();
        for line in fs::read_to_string(manifest)?.lines() {
            let name = line
                .strip_prefix("file '")
                .and_then(|l| l.strip_suffix('\''))
                .ok_or_else(|| anyhow!("Bad manifest line: {}", line))?;
            joined.extend(fs::read(dir.join(name))?);
        }
        fs::write(output, joined)?;
        Ok(())
    }

    fn remux(&self, video: &Path, audio: &Path, output: &Path) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if fs::read(audio)? == AUDIO {
            self.remuxed_with_audio.store(true, Ordering::SeqCst);
        }
        fs::copy(video, output)?;
        Ok(())
    }
}

/// [`FakeMux`] that fails at one named stage: "extract", "concat" or "remux".
pub struct FailingMux {
    stage: &'static str,
    inner: FakeMux,
}

impl FailingMux {
    pub fn at(stage: &'static str) -> Self {
        Self {
            stage,
            inner: FakeMux::default(),
        }
    }

    fn failure(&self) -> anyhow::Error {
        PixelError::ExternalToolFailure {
            tool: "fake".to_string(),
            operation: self.stage,
            status: "exit status: 1".to_string(),
            stderr: String::new(),
        }
        .into()
    }
}

impl MuxTool for FailingMux {
    fn extract_audio(&self, source: &Path, audio: &Path) -> Result<()> {
        if self.stage == "extract" {
            return Err(self.failure());
        }
        self.inner.extract_audio(source, audio)
    }

    fn concat(&self, manifest: &Path, output: &Path) -> Result<()> {
        if self.stage == "concat" {
            // leave a half-written file behind
            fs::write(output, b"partial")?;
            return Err(self.failure());
        }
        self.inner.concat(manifest, output)
    }

    fn remux(&self, video: &Path, audio: &Path, output: &Path) -> Result<()> {
        if self.stage == "remux" {
            fs::write(output, b"partial")?;
            return Err(self.failure());
        }
        self.inner.remux(video, audio, output)
    }
}
