//! The frame disposal state machine.
//!
//! The compositor holds at most one underlayer, the last retained output
//! frame, plus a pending background rectangle left by a
//! `RestoreToBackground` frame. Each pushed frame is merged over the
//! underlayer into a full-canvas output frame; the new frame's disposal
//! then decides what the next step sees.
//!
//! Disposal takes effect one step late: the output that a
//! `RestoreToBackground` frame's successor is drawn over still shows the
//! disposed frame, and only the step after that sees its rectangle as
//! background.

use enough::Stop;
use log::trace;

use super::reconcile::{ColorUsage, PaletteDecision, reconcile};
use super::{Disposal, Frame, Frameset, Rect};
use crate::error::CodecError;
use crate::image::{Channel, Image};
use crate::palette::{Palette, RGB8};

/// Per-pixel provenance of one compositing step, canvas sized.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VisibilityMap {
    width: u32,
    height: u32,
    bits: Vec<u8>,
}

impl VisibilityMap {
    /// Visible pixel of the new frame.
    pub const NEW: u8 = 1;
    /// Visible pixel of the underlayer, not covered by the new frame.
    pub const UNDER: u8 = 2;
    /// Inside the pending background rectangle and covered by neither.
    pub const BACKGROUND: u8 = 4;

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.bits[y as usize * self.width as usize + x as usize]
    }

    pub fn bits(&self) -> &[u8] {
        &self.bits
    }
}

/// Read access to one layer's pixels.
struct Layer<'a> {
    rect: Rect,
    bpp: usize,
    px: &'a [u8],
    alpha: Option<&'a [u8]>,
    palette: &'a Palette,
}

impl<'a> Layer<'a> {
    fn new(image: &'a Image, palette: &'a Palette, x: u32, y: u32) -> Self {
        Self {
            rect: Rect::new(x, y, image.width(), image.height()),
            bpp: usize::from(image.bpp()),
            px: image.channel(Channel::Image).unwrap_or(&[]),
            alpha: image.channel(Channel::Alpha),
            palette,
        }
    }

    fn is_rgb(&self) -> bool {
        self.bpp == 3
    }

    /// Local sample index of canvas position (x, y).
    fn at(&self, x: u32, y: u32) -> Option<usize> {
        if !self.rect.contains(x, y) {
            return None;
        }
        let i = (y - self.rect.y) as usize * self.rect.width as usize + (x - self.rect.x) as usize;
        (self.px.len() >= (i + 1) * self.bpp).then_some(i)
    }

    fn alpha(&self, i: usize) -> u8 {
        self.alpha.and_then(|a| a.get(i).copied()).unwrap_or(255)
    }

    fn index(&self, i: usize) -> u8 {
        if self.is_rgb() { 0 } else { self.px[i] }
    }

    fn visible(&self, i: usize) -> bool {
        self.alpha(i) != 0 && (self.is_rgb() || self.palette.transparent() != Some(self.px[i]))
    }

    fn rgb(&self, i: usize) -> RGB8 {
        if self.is_rgb() {
            RGB8::new(self.px[i * 3], self.px[i * 3 + 1], self.px[i * 3 + 2])
        } else {
            self.palette.color(self.px[i])
        }
    }
}

/// Layer and local index a visibility bit points at.
fn pick<'l, 'a>(
    new: &'l Layer<'a>,
    under: Option<&'l Layer<'a>>,
    x: u32,
    y: u32,
    bit: u8,
) -> Option<(&'l Layer<'a>, usize)> {
    match bit {
        VisibilityMap::NEW => new.at(x, y).map(|i| (new, i)),
        VisibilityMap::UNDER => under.and_then(|u| u.at(x, y).map(|i| (u, i))),
        _ => None,
    }
}

struct Underlayer {
    frame: Frame,
    palette: Palette,
    /// Area that shows as background on the next step.
    hidden: Option<Rect>,
}

/// Incremental compositor; push frames in order, then [`finish`](Self::finish).
pub struct Compositor {
    canvas: Rect,
    shared: Option<Palette>,
    skip_zero_delay: bool,
    underlayer: Option<Underlayer>,
    pending: Option<Rect>,
    output: Vec<Frame>,
    last_zero_delay: bool,
    visibility: Option<VisibilityMap>,
}

impl Compositor {
    pub fn new(width: u32, height: u32, shared: Option<Palette>, skip_zero_delay: bool) -> Self {
        Self {
            canvas: Rect::new(0, 0, width, height),
            shared,
            skip_zero_delay,
            underlayer: None,
            pending: None,
            output: Vec::new(),
            last_zero_delay: false,
            visibility: None,
        }
    }

    /// Pending background rectangle for the next step.
    pub fn pending(&self) -> Option<Rect> {
        self.pending
    }

    /// Whether an underlayer is held.
    pub fn is_holding(&self) -> bool {
        self.underlayer.is_some()
    }

    /// Visibility map of the most recent step, unless it short-circuited.
    pub fn last_visibility(&self) -> Option<&VisibilityMap> {
        self.visibility.as_ref()
    }

    /// Composite one frame and advance the state machine.
    pub fn push(&mut self, frame: &Frame) -> Result<(), CodecError> {
        let out = self.step(frame)?;
        let active_pending = self.pending;

        match frame.disposal {
            Disposal::Unspecified | Disposal::Leave => {
                self.retain(&out, active_pending);
                self.pending = None;
            }
            Disposal::RestoreToBackground => {
                self.retain(&out, active_pending);
                self.pending = frame.rect().intersect(&self.canvas);
            }
            Disposal::RestoreToPrevious => {}
        }
        trace!(
            "composited {}x{}@{},{} {:?}, pending {:?}",
            frame.image.width(),
            frame.image.height(),
            frame.x,
            frame.y,
            frame.disposal,
            self.pending
        );

        // The dropped frame is already merged into `out` via the underlayer.
        if self.last_zero_delay {
            self.output.pop();
        }
        self.output.push(out);
        self.last_zero_delay = self.skip_zero_delay && frame.delay == 0;
        Ok(())
    }

    /// Composited frames. The last frame is kept even if it had zero delay.
    pub fn finish(self) -> Vec<Frame> {
        self.output
    }

    fn retain(&mut self, out: &Frame, hidden: Option<Rect>) {
        self.underlayer = Some(Underlayer {
            frame: out.clone(),
            palette: out.palette.clone().unwrap_or_default(),
            hidden,
        });
    }

    fn step(&mut self, frame: &Frame) -> Result<Frame, CodecError> {
        let palette = frame.resolved_palette(self.shared.as_ref());
        let finish = |image: Image, palette: Palette| Frame {
            x: 0,
            y: 0,
            image,
            palette: Some(palette),
            disposal: frame.disposal,
            delay: frame.delay,
        };

        if self.underlayer.is_none() && frame.rect() == self.canvas {
            self.visibility = None;
            return Ok(finish(frame.image.clone(), palette));
        }

        let (w, h) = (self.canvas.width, self.canvas.height);
        let n = w as usize * h as usize;
        let new = Layer::new(&frame.image, &palette, frame.x, frame.y);
        let under = self
            .underlayer
            .as_ref()
            .map(|u| (Layer::new(&u.frame.image, &u.palette, 0, 0), u.hidden));

        let mut bits = vec![0u8; n];
        let mut usage = ColorUsage::default();
        for y in 0..h {
            for x in 0..w {
                let o = y as usize * w as usize + x as usize;
                let mut b = 0;
                if let Some(i) = new.at(x, y).filter(|&i| new.visible(i)) {
                    b = VisibilityMap::NEW;
                    if new.is_rgb() {
                        usage.new_rgb = true;
                    } else {
                        usage.mark_new(new.index(i));
                    }
                    usage.partial_alpha |= new.alpha(i) != 255;
                } else if let Some((u, hidden)) = &under {
                    let shown = !hidden.is_some_and(|r| r.contains(x, y));
                    if let Some(i) = u.at(x, y).filter(|&i| shown && u.visible(i)) {
                        b = VisibilityMap::UNDER;
                        if u.is_rgb() {
                            usage.under_rgb = true;
                        } else {
                            usage.mark_under(u.index(i));
                        }
                        usage.partial_alpha |= u.alpha(i) != 255;
                    }
                }
                if b == 0 {
                    usage.needs_transparency = true;
                    if self.pending.is_some_and(|r| r.contains(x, y)) {
                        b = VisibilityMap::BACKGROUND;
                    }
                }
                bits[o] = b;
            }
        }

        let decision = reconcile(&palette, under.as_ref().map(|(u, _)| u.palette), &usage);
        let under_layer = under.as_ref().map(|(u, _)| u);
        let source = |x: u32, y: u32, b: u8| pick(&new, under_layer, x, y, b);

        let out = match decision {
            PaletteDecision::Indexed {
                palette: out_pal,
                new_map,
                under_map,
            } => {
                let t = out_pal.transparent().unwrap_or(0);
                let mut px = vec![t; n];
                for y in 0..h {
                    for x in 0..w {
                        let o = y as usize * w as usize + x as usize;
                        px[o] = match bits[o] {
                            VisibilityMap::NEW => source(x, y, bits[o])
                                .map_or(t, |(l, i)| new_map[usize::from(l.index(i))]),
                            VisibilityMap::UNDER => source(x, y, bits[o])
                                .map_or(t, |(l, i)| under_map[usize::from(l.index(i))]),
                            _ => t,
                        };
                    }
                }
                finish(Image::indexed(w, h, px)?, out_pal)
            }
            PaletteDecision::Rgb {
                palette: carried,
                alpha,
            } => {
                let mut rgb = vec![0u8; n * 3];
                let mut a = vec![0u8; n];
                for y in 0..h {
                    for x in 0..w {
                        let o = y as usize * w as usize + x as usize;
                        if let Some((l, i)) = source(x, y, bits[o]) {
                            let c = l.rgb(i);
                            rgb[o * 3..o * 3 + 3].copy_from_slice(&[c.r, c.g, c.b]);
                            a[o] = l.alpha(i);
                        }
                    }
                }
                let mut image = Image::rgb(w, h, rgb)?;
                if alpha {
                    image.set_channel(Channel::Alpha, a)?;
                }
                finish(image, carried)
            }
        };

        self.visibility = Some(VisibilityMap {
            width: w,
            height: h,
            bits,
        });
        Ok(out)
    }
}

/// Composite a whole frameset, checking `stop` before every frame.
pub fn composite(
    frames: &Frameset,
    skip_zero_delay: bool,
    stop: &dyn Stop,
) -> Result<Frameset, CodecError> {
    let mut c = Compositor::new(frames.width, frames.height, frames.palette.clone(), skip_zero_delay);
    for frame in &frames.frames {
        stop.check()?;
        c.push(frame)?;
    }
    Ok(Frameset {
        width: frames.width,
        height: frames.height,
        palette: frames.palette.clone(),
        frames: c.finish(),
    })
}
