use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A color in OpenCV channel order (blue, green, red).
pub type Bgr = [u8; 3];

pub const BLACK: Bgr = [0, 0, 0];

/// A decoded frame: tightly packed, row-major, 3 bytes per pixel in BGR order.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Frame {
    /// An all-black frame.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * 3],
        }
    }

    pub fn filled(width: u32, height: u32, color: Bgr) -> Self {
        let mut frame = Self::new(width, height);
        frame.fill_rect(frame.bounds(), color);
        frame
    }

    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(anyhow!(
                "Frame buffer has {} bytes, expected {} for {}x{}",
                data.len(),
                expected,
                width,
                height
            ));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 3
    }

    pub fn pixel(&self, x: u32, y: u32) -> Bgr {
        let i = self.offset(x, y);
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    pub fn put_pixel(&mut self, x: u32, y: u32, color: Bgr) {
        let i = self.offset(x, y);
        self.data[i..i + 3].copy_from_slice(&color);
    }

    /// Per-channel mean of `rect`, rounded half to even. `rect` must lie inside the frame.
    pub fn mean_color(&self, rect: Rect) -> Bgr {
        let mut sums = [0u64; 3];
        for y in rect.y..rect.bottom() {
            let start = self.offset(rect.x, y);
            let row = &self.data[start..start + rect.width as usize * 3];
            for px in row.chunks_exact(3) {
                sums[0] += px[0] as u64;
                sums[1] += px[1] as u64;
                sums[2] += px[2] as u64;
            }
        }

        let count = rect.area();
        if count == 0 {
            return BLACK;
        }
        sums.map(|s| (s as f64 / count as f64).round_ties_even() as u8)
    }

    pub fn fill_rect(&mut self, rect: Rect, color: Bgr) {
        for y in rect.y..rect.bottom() {
            let start = self.offset(rect.x, y);
            let row = &mut self.data[start..start + rect.width as usize * 3];
            for px in row.chunks_exact_mut(3) {
                px.copy_from_slice(&color);
            }
        }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

/// Pixel-space rectangle with non-negative origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Splits the rectangle into `cell`-sized squares, row by row. The last
    /// row and column are clipped to this rectangle.
    pub fn cells(&self, cell: u32) -> impl Iterator<Item = Rect> + '_ {
        let step = cell.max(1);
        (self.y..self.bottom())
            .step_by(step as usize)
            .flat_map(move |y| {
                (self.x..self.right()).step_by(step as usize).map(move |x| {
                    Rect::new(
                        x,
                        y,
                        step.min(self.right() - x),
                        step.min(self.bottom() - y),
                    )
                })
            })
    }
}

/// A face region reported by a detector, in frame pixel coordinates.
/// Detectors may report boxes that hang over the frame edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaceBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl FaceBox {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Intersection with a `width` x `height` frame. Empty when the box lies outside it.
    pub fn clip(&self, width: u32, height: u32) -> Rect {
        let clamp_x = |v: i64| v.clamp(0, width as i64) as u32;
        let clamp_y = |v: i64| v.clamp(0, height as i64) as u32;

        let x0 = clamp_x(self.x as i64);
        let y0 = clamp_y(self.y as i64);
        let x1 = clamp_x(self.x as i64 + self.width.max(0) as i64);
        let y1 = clamp_y(self.y as i64 + self.height.max(0) as i64);

        Rect::new(x0, y0, x1 - x0, y1 - y0)
    }
}

/// Half-open range of frame indices `[start, end)` owned by one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrameRange {
    pub start: usize,
    pub end: usize,
}

impl FrameRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn iter(&self) -> std::ops::Range<usize> {
        self.start..self.end
    }
}

impl fmt::Display for FrameRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Stream properties that pass unchanged from the source to every output artifact.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StreamInfo {
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    pub frame_count: usize,
}

/// What a job does to each frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum JobMode {
    Pixelize {
        pixel_size: u32,
        /// Palette depth for quantized fill; raw-average fill when absent.
        color_depth: Option<u32>,
    },
    Anonymize,
}

/// Result reported by one worker after its range is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartOutcome {
    pub index: usize,
    pub frames: usize,
    pub faces_found: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cells_clip_last_row_and_column() {
        let cells: Vec<Rect> = Rect::new(0, 0, 10, 7).cells(4).collect();
        assert_eq!(cells.len(), 6);
        assert_eq!(cells[0], Rect::new(0, 0, 4, 4));
        assert_eq!(cells[2], Rect::new(8, 0, 2, 4));
        assert_eq!(cells[5], Rect::new(8, 4, 2, 3));
        let covered: u64 = cells.iter().map(Rect::area).sum();
        assert_eq!(covered, 70);
    }

    #[test]
    fn test_cells_with_offset_origin() {
        let cells: Vec<Rect> = Rect::new(5, 3, 6, 6).cells(4).collect();
        assert_eq!(
            cells,
            vec![
                Rect::new(5, 3, 4, 4),
                Rect::new(9, 3, 2, 4),
                Rect::new(5, 7, 4, 2),
                Rect::new(9, 7, 2, 2),
            ]
        );
    }

    #[test]
    fn test_mean_color_rounds_half_to_even() {
        let mut frame = Frame::new(2, 1);
        frame.put_pixel(0, 0, [1, 2, 3]);
        frame.put_pixel(1, 0, [2, 3, 4]);
        // means: 1.5 -> 2, 2.5 -> 2, 3.5 -> 4
        assert_eq!(frame.mean_color(frame.bounds()), [2, 2, 4]);
    }

    #[test]
    fn test_face_box_clip() {
        let b = FaceBox::new(-5, 10, 20, 30);
        assert_eq!(b.clip(100, 30), Rect::new(0, 10, 15, 20));

        let outside = FaceBox::new(200, 200, 10, 10);
        assert_eq!(outside.clip(100, 100).area(), 0);
    }

    #[test]
    fn test_from_raw_checks_length() {
        assert!(Frame::from_raw(2, 2, vec![0; 12]).is_ok());
        assert!(Frame::from_raw(2, 2, vec![0; 11]).is_err());
    }
}
