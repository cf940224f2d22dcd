//! Palette reconciliation between a new frame and the underlayer.
//!
//! The output of one compositing step stays indexed whenever the colors
//! visible in it, plus a transparent slot if one is needed, fit in 256
//! entries. Otherwise it becomes RGB with an alpha channel.

use crate::palette::{Palette, RGB8};

/// Palette entries referenced by the visible pixels of each layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColorUsage {
    pub new_used: [bool; 256],
    pub under_used: [bool; 256],
    /// A visible pixel of the new frame is RGB.
    pub new_rgb: bool,
    /// A visible pixel of the underlayer is RGB.
    pub under_rgb: bool,
    /// A visible pixel has alpha strictly between 0 and 255.
    pub partial_alpha: bool,
    /// Some canvas pixel is covered by neither layer.
    pub needs_transparency: bool,
}

impl Default for ColorUsage {
    fn default() -> Self {
        Self {
            new_used: [false; 256],
            under_used: [false; 256],
            new_rgb: false,
            under_rgb: false,
            partial_alpha: false,
            needs_transparency: false,
        }
    }
}

impl ColorUsage {
    pub fn mark_new(&mut self, index: u8) {
        self.new_used[usize::from(index)] = true;
    }

    pub fn mark_under(&mut self, index: u8) {
        self.under_used[usize::from(index)] = true;
    }

    pub fn under_visible(&self) -> bool {
        self.under_rgb || self.under_used.contains(&true)
    }

    /// Whether only an RGB rendering can show these pixels.
    pub fn needs_rgb(&self) -> bool {
        self.new_rgb || self.under_rgb || self.partial_alpha
    }
}

/// Outcome of [`reconcile`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PaletteDecision {
    /// Render indexed through `palette`. The maps translate indices of the
    /// new frame and of the underlayer into it. The palette's transparent
    /// index is set exactly when some pixel must be transparent.
    Indexed {
        palette: Palette,
        new_map: [u8; 256],
        under_map: [u8; 256],
    },
    /// Render RGB; transparency goes into an alpha channel when `alpha`.
    /// `palette` is carried forward for later saves as indexed.
    Rgb { palette: Palette, alpha: bool },
}

impl PaletteDecision {
    pub fn is_indexed(&self) -> bool {
        matches!(self, PaletteDecision::Indexed { .. })
    }
}

struct Scheme {
    colors: Vec<RGB8>,
    new_map: [u8; 256],
    under_map: [u8; 256],
}

fn identity() -> [u8; 256] {
    core::array::from_fn(|i| i as u8)
}

fn used(set: &[bool; 256]) -> impl Iterator<Item = u8> + '_ {
    (0..=255u8).filter(|&i| set[usize::from(i)])
}

/// Map every used color of `source` to its first exact match in `target`.
fn map_onto(target: &Palette, source: &Palette, set: &[bool; 256]) -> Option<[u8; 256]> {
    let mut map = [0u8; 256];
    for i in used(set) {
        map[usize::from(i)] = target.find(source.color(i))?;
    }
    Some(map)
}

fn union(new: &Palette, under: &Palette, usage: &ColorUsage) -> Option<Scheme> {
    let mut colors: Vec<RGB8> = Vec::new();
    let mut add = |c: RGB8| -> Option<u8> {
        if let Some(p) = colors.iter().position(|&k| k == c) {
            return Some(p as u8);
        }
        if colors.len() == Palette::MAX_COLORS {
            return None;
        }
        colors.push(c);
        Some((colors.len() - 1) as u8)
    };
    let mut new_map = [0u8; 256];
    for i in used(&usage.new_used) {
        new_map[usize::from(i)] = add(new.color(i))?;
    }
    let mut under_map = [0u8; 256];
    for i in used(&usage.under_used) {
        under_map[usize::from(i)] = add(under.color(i))?;
    }
    Some(Scheme {
        colors,
        new_map,
        under_map,
    })
}

/// Pick the transparent slot: the underlayer's index, then the new frame's,
/// then any unused slot, then a fresh black entry.
fn place_transparency(
    colors: &mut Vec<RGB8>,
    taken: &[bool; 256],
    candidates: [Option<u8>; 2],
) -> Option<u8> {
    let free = |i: usize, colors: &Vec<RGB8>| i < colors.len() && !taken[i];
    if let Some(t) = candidates
        .into_iter()
        .flatten()
        .find(|&t| free(usize::from(t), colors))
    {
        return Some(t);
    }
    if let Some(i) = (0..colors.len()).find(|&i| free(i, colors)) {
        return Some(i as u8);
    }
    if colors.len() < Palette::MAX_COLORS {
        colors.push(RGB8::default());
        return Some((colors.len() - 1) as u8);
    }
    None
}

fn finish(
    mut scheme: Scheme,
    usage: &ColorUsage,
    candidates: [Option<u8>; 2],
) -> Option<PaletteDecision> {
    let mut taken = [false; 256];
    for i in used(&usage.new_used) {
        taken[usize::from(scheme.new_map[usize::from(i)])] = true;
    }
    for i in used(&usage.under_used) {
        taken[usize::from(scheme.under_map[usize::from(i)])] = true;
    }
    let transparent = if usage.needs_transparency {
        Some(place_transparency(&mut scheme.colors, &taken, candidates)?)
    } else {
        None
    };
    if scheme.colors.is_empty() {
        scheme.colors.push(RGB8::default());
    }
    let mut palette = Palette::new(scheme.colors).ok()?;
    palette.set_transparent_lossy(transparent);
    Some(PaletteDecision::Indexed {
        palette,
        new_map: scheme.new_map,
        under_map: scheme.under_map,
    })
}

/// Decide how the composited step is represented.
///
/// Schemes are tried in a fixed order: the new frame's palette, then the
/// underlayer's, then the de-duplicated union of used colors. The first
/// one that can also hold a transparent slot (when needed) wins, so when
/// both palettes would work as they are the new frame's is kept. Never
/// fails: anything that does not fit becomes [`PaletteDecision::Rgb`].
pub fn reconcile(new: &Palette, under: Option<&Palette>, usage: &ColorUsage) -> PaletteDecision {
    let rgb = || {
        let mut palette = under.unwrap_or(new).clone();
        palette.set_transparent_lossy(None);
        PaletteDecision::Rgb {
            palette,
            alpha: usage.needs_transparency || usage.partial_alpha,
        }
    };
    if usage.needs_rgb() {
        return rgb();
    }

    let empty = Palette::default();
    let under_pal = under.unwrap_or(&empty);
    let candidates = [under.and_then(Palette::transparent), new.transparent()];

    let reuse_new = || {
        map_onto(new, under_pal, &usage.under_used).map(|under_map| Scheme {
            colors: new.colors().to_vec(),
            new_map: identity(),
            under_map,
        })
    };
    let reuse_under = || {
        let under = under?;
        map_onto(under, new, &usage.new_used).map(|new_map| Scheme {
            colors: under.colors().to_vec(),
            new_map,
            under_map: identity(),
        })
    };
    let merged = || union(new, under_pal, usage);

    let schemes: [&dyn Fn() -> Option<Scheme>; 3] = [&reuse_new, &reuse_under, &merged];
    schemes
        .into_iter()
        .filter_map(|build| build())
        .find_map(|scheme| finish(scheme, usage, candidates))
        .unwrap_or_else(rgb)
}
