//! Indexed color palettes.

pub use rgb::RGB8;

use crate::error::CodecError;

/// Ordered list of up to 256 colors with an optional transparent index.
///
/// The transparent index, when set, is always below the color count.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Palette {
    colors: Vec<RGB8>,
    transparent: Option<u8>,
}

impl Default for Palette {
    /// Two-entry black/white palette.
    fn default() -> Self {
        Self::mono()
    }
}

impl Palette {
    pub const MAX_COLORS: usize = 256;

    pub fn new(colors: Vec<RGB8>) -> Result<Self, CodecError> {
        if colors.is_empty() || colors.len() > Self::MAX_COLORS {
            return Err(CodecError::InvalidData(format!(
                "palette must hold 1..=256 colors, got {}",
                colors.len()
            )));
        }
        Ok(Self {
            colors,
            transparent: None,
        })
    }

    /// Build from packed `r, g, b` triples; a trailing partial triple is ignored.
    pub fn from_rgb_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        Self::new(
            bytes
                .chunks_exact(3)
                .map(|c| RGB8::new(c[0], c[1], c[2]))
                .collect(),
        )
    }

    /// Evenly spaced gray ramp from black to white (`n` in `2..=256`).
    pub fn grayscale(n: usize) -> Self {
        let n = n.clamp(2, Self::MAX_COLORS);
        let colors = (0..n)
            .map(|i| {
                let v = ((i * 255 + (n - 1) / 2) / (n - 1)) as u8;
                RGB8::new(v, v, v)
            })
            .collect();
        Self {
            colors,
            transparent: None,
        }
    }

    /// Black and white.
    pub fn mono() -> Self {
        Self {
            colors: vec![RGB8::new(0, 0, 0), RGB8::new(255, 255, 255)],
            transparent: None,
        }
    }

    /// White background, black foreground (the PBM and XBM convention).
    pub fn paper_ink() -> Self {
        Self {
            colors: vec![RGB8::new(255, 255, 255), RGB8::new(0, 0, 0)],
            transparent: None,
        }
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn colors(&self) -> &[RGB8] {
        &self.colors
    }

    /// Color at `index`, or black for indices past the end.
    pub fn color(&self, index: u8) -> RGB8 {
        self.colors
            .get(usize::from(index))
            .copied()
            .unwrap_or_default()
    }

    pub fn transparent(&self) -> Option<u8> {
        self.transparent
    }

    pub fn set_transparent(&mut self, index: Option<u8>) -> Result<(), CodecError> {
        if let Some(i) = index {
            if usize::from(i) >= self.colors.len() {
                return Err(CodecError::InvalidData(format!(
                    "transparent index {i} outside {}-color palette",
                    self.colors.len()
                )));
            }
        }
        self.transparent = index;
        Ok(())
    }

    /// Like [`set_transparent`](Self::set_transparent) but drops out-of-range indices.
    pub(crate) fn set_transparent_lossy(&mut self, index: Option<u8>) {
        self.transparent = index.filter(|&i| usize::from(i) < self.colors.len());
    }

    /// Append a color, returning its index.
    pub fn push(&mut self, color: RGB8) -> Result<u8, CodecError> {
        if self.colors.len() >= Self::MAX_COLORS {
            return Err(CodecError::InvalidData("palette is full".into()));
        }
        self.colors.push(color);
        Ok((self.colors.len() - 1) as u8)
    }

    /// First index holding exactly `color`.
    pub fn find(&self, color: RGB8) -> Option<u8> {
        self.colors.iter().position(|&c| c == color).map(|i| i as u8)
    }

    /// Pad with black up to `len` entries (no-op if already that long).
    pub(crate) fn pad_to(&mut self, len: usize) {
        let len = len.min(Self::MAX_COLORS);
        if self.colors.len() < len {
            self.colors.resize(len, RGB8::default());
        }
    }

    /// Packed `r, g, b` bytes.
    pub fn to_rgb_bytes(&self) -> Vec<u8> {
        use rgb::ComponentBytes;
        self.colors.as_bytes().to_vec()
    }

    /// Whether every entry is a gray level equal to its index scaled to 8 bits.
    pub(crate) fn is_gray_ramp(&self) -> bool {
        let n = self.colors.len();
        n >= 2 && self.colors == Self::grayscale(n).colors
    }
}
