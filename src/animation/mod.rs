//! Animation frames and the compositing engine.
//!
//! Drivers for animated formats produce a [`Frameset`] of raw frames, each
//! positioned on a shared canvas. [`Compositor`] replays the disposal
//! state machine over them and produces one full-canvas frame per step.

mod compositor;
mod explode;
mod playback;
mod reconcile;

pub use compositor::{Compositor, VisibilityMap, composite};
pub use explode::{ExplodeReport, ExplodeRequest, explode_frames};
pub use playback::{Playback, PlaybackFrame, SlotRing};
pub use reconcile::{ColorUsage, PaletteDecision, reconcile};

use crate::image::{Channel, Image};
use crate::palette::Palette;

/// What happens to a frame's area once the next frame begins.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Disposal {
    /// The file did not say; treated as [`Leave`](Self::Leave).
    #[default]
    Unspecified,
    /// Keep the frame as the base of the next one.
    Leave,
    /// Clear the frame's rectangle to background.
    RestoreToBackground,
    /// Revert to the image before this frame.
    RestoreToPrevious,
}

/// A rectangle on the canvas.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    fn right(&self) -> u64 {
        u64::from(self.x) + u64::from(self.width)
    }

    fn bottom(&self) -> u64 {
        u64::from(self.y) + u64::from(self.height)
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x
            && y >= self.y
            && u64::from(x) < self.right()
            && u64::from(y) < self.bottom()
    }

    /// Overlap of two rectangles, `None` if they do not meet.
    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= u64::from(x) || bottom <= u64::from(y) {
            return None;
        }
        Some(Rect::new(
            x,
            y,
            (right - u64::from(x)) as u32,
            (bottom - u64::from(y)) as u32,
        ))
    }
}

/// One decoded animation frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Offset of the frame on the canvas.
    pub x: u32,
    pub y: u32,
    /// Pixels; indexed (bpp 1) or RGB (bpp 3), with optional alpha.
    pub image: Image,
    /// Local palette; `None` means the frameset's shared palette.
    pub palette: Option<Palette>,
    pub disposal: Disposal,
    /// Display time in hundredths of a second.
    pub delay: u16,
}

impl Frame {
    pub fn new(image: Image) -> Self {
        Self {
            x: 0,
            y: 0,
            image,
            palette: None,
            disposal: Disposal::Unspecified,
            delay: 0,
        }
    }

    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.image.width(), self.image.height())
    }

    pub fn bpp(&self) -> u8 {
        self.image.bpp()
    }

    /// Packed RGBA of this frame alone.
    pub fn to_rgba(&self, shared: Option<&Palette>) -> Vec<u8> {
        let fallback = Palette::default();
        let palette = self.palette.as_ref().or(shared).unwrap_or(&fallback);
        self.image.to_rgba(palette)
    }

    /// Palette to interpret this frame with, padded so every index used by
    /// the image has an entry.
    pub(crate) fn resolved_palette(&self, shared: Option<&Palette>) -> Palette {
        let mut palette = self
            .palette
            .clone()
            .or_else(|| shared.cloned())
            .unwrap_or_default();
        if self.image.bpp() == 1 {
            if let Some(max) = self
                .image
                .channel(Channel::Image)
                .and_then(|px| px.iter().copied().max())
            {
                palette.pad_to(usize::from(max) + 1);
            }
        }
        palette
    }
}

/// Ordered frames on one canvas plus an optional shared palette.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Frameset {
    pub width: u32,
    pub height: u32,
    pub palette: Option<Palette>,
    pub frames: Vec<Frame>,
}

impl Frameset {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            palette: None,
            frames: Vec::new(),
        }
    }

    pub fn canvas(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Palette a frame is drawn with.
    pub fn palette_of<'a>(&'a self, frame: &'a Frame) -> Option<&'a Palette> {
        frame.palette.as_ref().or(self.palette.as_ref())
    }
}

/// How [`load_frameset`](crate::load_frameset) returns frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FramesetMode {
    /// Frames as stored in the file, at their own offsets.
    Raw,
    /// Full-canvas frames from the compositor.
    Composited {
        /// Fold zero-delay frames into their successor.
        skip_zero_delay: bool,
    },
}

impl Default for FramesetMode {
    fn default() -> Self {
        FramesetMode::Composited {
            skip_zero_delay: false,
        }
    }
}
