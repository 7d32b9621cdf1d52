use super::VideoReader;
use crate::error::PixelError;
use crate::pipeline::types::{Frame, StreamInfo};
use anyhow::{anyhow, Context, Result};
use ffmpeg_next::ffi;
use std::path::Path;

/// Video reader backed by FFmpeg via ffmpeg-next, CPU decoding to BGR24.
pub struct FfmpegReader {
    input_ctx: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::codec::decoder::Video,
    video_stream_index: usize,
    /// Lazily created on first frame (source format is only known then).
    scaler: Option<ffmpeg_next::software::scaling::Context>,
    time_base: f64,
    /// Pts of the first frame, in `time_base` units.
    start_pts: i64,
    info: StreamInfo,
    position: usize,
    /// After a seek, decoded frames before this pts are dropped.
    skip_until_pts: Option<i64>,
    packet: ffmpeg_next::codec::packet::Packet,
    eof_sent: bool,
}

// SAFETY: a reader is created inside and only used by its own worker thread.
unsafe impl Send for FfmpegReader {}

impl FfmpegReader {
    pub fn new(path: &Path) -> Result<Self> {
        ffmpeg_next::init().context("Failed to initialize FFmpeg")?;

        if !path.exists() {
            return Err(anyhow!("Video file not found: {:?}", path));
        }

        let input_ctx = ffmpeg_next::format::input(&path).context("Failed to open video file")?;

        let video_stream = input_ctx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| anyhow!("No video stream found in {:?}", path))?;

        let video_stream_index = video_stream.index();

        let rational_fps = video_stream.avg_frame_rate();
        let fps = if rational_fps.denominator() > 0 && rational_fps.numerator() > 0 {
            rational_fps.numerator() as f64 / rational_fps.denominator() as f64
        } else {
            tracing::warn!("FfmpegReader: could not determine FPS, defaulting to 30.0");
            30.0
        };
        let time_base = f64::from(video_stream.time_base());
        let start_pts = match video_stream.start_time() {
            ffi::AV_NOPTS_VALUE => 0,
            pts => pts,
        };

        let stream_frames = video_stream.frames().max(0) as usize;
        let duration_secs = input_ctx.duration() as f64 / ffi::AV_TIME_BASE as f64;
        let frame_count = if stream_frames == 0 {
            (duration_secs * fps).round() as usize
        } else {
            stream_frames
        };

        let decoder_ctx =
            ffmpeg_next::codec::context::Context::from_parameters(video_stream.parameters())
                .context("Failed to create decoder context")?;
        let decoder = decoder_ctx
            .decoder()
            .video()
            .context("Failed to open video decoder")?;

        let info = StreamInfo {
            fps,
            width: decoder.width(),
            height: decoder.height(),
            frame_count,
        };

        tracing::info!(
            "FfmpegReader: opened {:?}, {}x{}, duration={:.2}s, fps={:.2}, stream_frames={}, estimated_total={}",
            path,
            info.width,
            info.height,
            duration_secs,
            fps,
            stream_frames,
            frame_count
        );

        Ok(Self {
            input_ctx,
            decoder,
            video_stream_index,
            scaler: None,
            time_base,
            start_pts,
            info,
            position: 0,
            skip_until_pts: None,
            packet: ffmpeg_next::codec::packet::Packet::empty(),
            eof_sent: false,
        })
    }

    /// Pull the next decoded frame, feeding packets of our stream as needed.
    fn decode_next(&mut self) -> Result<Option<ffmpeg_next::util::frame::Video>> {
        let mut frame = ffmpeg_next::util::frame::Video::empty();
        loop {
            match self.decoder.receive_frame(&mut frame) {
                Ok(()) => return Ok(Some(frame)),
                Err(ffmpeg_next::Error::Other { errno: ffi::EAGAIN }) => {
                    if self.eof_sent {
                        return Ok(None);
                    }
                }
                Err(ffmpeg_next::Error::Eof) => return Ok(None),
                Err(e) => return Err(anyhow!("Decoder error: {}", e)),
            }

            let mut found_packet = false;
            while self.packet.read(&mut self.input_ctx).is_ok() {
                if self.packet.stream() == self.video_stream_index {
                    self.decoder
                        .send_packet(&self.packet)
                        .context("Failed to send packet to decoder")?;
                    found_packet = true;
                    break;
                }
            }

            if !found_packet {
                self.decoder
                    .send_eof()
                    .context("Failed to send EOF to decoder")?;
                self.eof_sent = true;
            }
        }
    }

    fn convert(&mut self, frame: &ffmpeg_next::util::frame::Video) -> Result<Frame> {
        if self.scaler.is_none() {
            let scaler = ffmpeg_next::software::scaling::Context::get(
                frame.format(),
                self.info.width,
                self.info.height,
                ffmpeg_next::format::Pixel::BGR24,
                self.info.width,
                self.info.height,
                ffmpeg_next::software::scaling::Flags::BILINEAR,
            )
            .context("Failed to create scaler")?;
            self.scaler = Some(scaler);
        }
        let scaler = self
            .scaler
            .as_mut()
            .ok_or_else(|| anyhow!("Scaler missing"))?;

        let mut bgr = ffmpeg_next::util::frame::Video::empty();
        scaler.run(frame, &mut bgr).context("Scaler failed")?;

        let width = bgr.width() as usize;
        let height = bgr.height() as usize;
        let stride = bgr.stride(0);
        let plane = bgr.data(0);
        let mut data = Vec::with_capacity(width * height * 3);
        for y in 0..height {
            data.extend_from_slice(&plane[y * stride..y * stride + width * 3]);
        }
        Frame::from_raw(width as u32, height as u32, data)
    }
}

/// Pts of frame `frame_num`. Streams need not start at zero.
fn seek_target_pts(frame_num: usize, fps: f64, time_base: f64, start_pts: i64) -> i64 {
    start_pts + ((frame_num as f64 / fps) / time_base).round() as i64
}

impl VideoReader for FfmpegReader {
    fn info(&self) -> StreamInfo {
        self.info
    }

    fn seek_to_frame(&mut self, frame_num: usize) -> Result<()> {
        if frame_num == self.position {
            return Ok(());
        }
        let target = seek_target_pts(frame_num, self.info.fps, self.time_base, self.start_pts);
        let time_secs = target as f64 * self.time_base;
        let timestamp = (time_secs * ffi::AV_TIME_BASE as f64) as i64;
        self.input_ctx
            .seek(timestamp, ..timestamp)
            .context("Failed to seek")?;
        self.decoder.flush();
        self.eof_sent = false;
        self.scaler = None;
        self.skip_until_pts = Some(target);
        self.position = frame_num;
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Frame> {
        loop {
            let raw = self.decode_next()?.ok_or(PixelError::DecodeFailure {
                frame: self.position,
                expected: self.info.frame_count,
            })?;

            // The seek lands on the keyframe at or before the target.
            if let Some(target) = self.skip_until_pts {
                if raw.timestamp().is_some_and(|pts| pts < target) {
                    continue;
                }
                self.skip_until_pts = None;
            }

            let frame = self.convert(&raw)?;
            self.position += 1;
            return Ok(frame);
        }
    }
}
