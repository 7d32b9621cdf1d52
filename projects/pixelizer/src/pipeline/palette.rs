use crate::error::PixelError;
use crate::pipeline::types::Bgr;

/// Color depths a palette can be built for (levels per channel).
pub const COLOR_LEVELS: [u32; 5] = [4, 8, 16, 32, 64];

/// Per-channel bucket index of a color: `value / step`, remainder discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QuantizationKey(pub [u8; 3]);

/// Evenly spaced color cube used for quantized pixelation.
///
/// Holds `depth³` colors. Each channel samples `depth` levels over `[0, 255]`
/// with both endpoints included; the colors are stored in key order so a
/// lookup is a direct index.
#[derive(Debug, Clone)]
pub struct Palette {
    depth: u32,
    step: u32,
    colors: Vec<Bgr>,
}

impl Palette {
    pub fn new(depth: u32) -> Result<Self, PixelError> {
        if !COLOR_LEVELS.contains(&depth) {
            return Err(PixelError::InvalidColorLevel(depth));
        }

        let levels: Vec<u8> = (0..depth).map(|i| (i * 255 / (depth - 1)) as u8).collect();
        let mut colors = Vec::with_capacity((depth * depth * depth) as usize);
        for &b in &levels {
            for &g in &levels {
                for &r in &levels {
                    colors.push([b, g, r]);
                }
            }
        }

        Ok(Self {
            depth,
            step: 255 / (depth - 1),
            colors,
        })
    }

    pub fn step(&self) -> u32 {
        self.step
    }

    pub fn colors(&self) -> &[Bgr] {
        &self.colors
    }

    pub fn key(&self, color: Bgr) -> QuantizationKey {
        let max = (self.depth - 1) as u8;
        QuantizationKey(color.map(|c| ((c as u32 / self.step) as u8).min(max)))
    }

    pub fn lookup(&self, key: QuantizationKey) -> Bgr {
        let d = self.depth as usize;
        let [b, g, r] = key.0.map(|k| k as usize);
        self.colors[(b * d + g) * d + r]
    }

    pub fn quantize(&self, color: Bgr) -> Bgr {
        self.lookup(self.key(color))
    }
}
