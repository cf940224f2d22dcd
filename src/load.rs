//! Top-level load and save: source handling, detection, driver dispatch.

use std::borrow::Cow;
use std::path::Path;

use enough::Stop;

use crate::animation::{Frameset, FramesetMode, composite};
use crate::channels::LoadMode;
use crate::error::CodecError;
use crate::format::{self, FormatId};
use crate::image::Channel;
use crate::limits::Limits;
use crate::palette::Palette;
use crate::progress::{Progress, ProgressFn};
use crate::settings::Settings;
use crate::{bmp, lss16, palfile, pcx, pnm, tga, xbm, xpm};

/// Where encoded bytes come from.
#[derive(Clone, Copy, Debug)]
pub enum Source<'a> {
    Path(&'a Path),
    Memory(&'a [u8]),
}

impl<'a> Source<'a> {
    fn read(&self) -> Result<Cow<'a, [u8]>, CodecError> {
        Ok(match *self {
            Source::Path(p) => Cow::Owned(std::fs::read(p)?),
            Source::Memory(b) => Cow::Borrowed(b),
        })
    }

    fn path(&self) -> Option<&'a Path> {
        match *self {
            Source::Path(p) => Some(p),
            Source::Memory(_) => None,
        }
    }
}

/// Where encoded bytes go.
#[derive(Debug)]
pub enum Destination<'a> {
    Path(&'a Path),
    /// Cleared, then filled with the file.
    Memory(&'a mut Vec<u8>),
}

fn resolve_format(
    data: &[u8],
    hint: Option<&Path>,
    forced: Option<FormatId>,
) -> Result<FormatId, CodecError> {
    if let Some(f) = forced {
        return Ok(f);
    }
    let head = &data[..data.len().min(1024)];
    format::detect(head, hint).ok_or(CodecError::UnrecognizedFormat)
}

fn not_built(format: FormatId) -> CodecError {
    CodecError::UnsupportedVariant(format!("{} support is not built in", format.name()))
}

fn load_with(
    format: FormatId,
    data: &[u8],
    settings: &mut Settings,
    limits: &Limits,
    progress: &mut Progress<'_>,
) -> Result<(), CodecError> {
    match format {
        FormatId::Bmp => bmp::load(data, settings, limits, progress),
        FormatId::Pbm | FormatId::Pgm | FormatId::Ppm | FormatId::Pam => {
            pnm::load(data, settings, limits, progress)
        }
        FormatId::Tga => tga::load(data, settings, limits, progress),
        FormatId::Pcx => pcx::load(data, settings, limits, progress),
        FormatId::Lss16 => lss16::load(data, settings, limits, progress),
        FormatId::Xpm => xpm::load(data, settings, limits, progress),
        FormatId::Xbm => xbm::load(data, settings, limits, progress),
        FormatId::Gpl => palfile::load_gpl(data, settings),
        FormatId::TxtPalette => palfile::load_txt(data, settings),
        #[cfg(feature = "png")]
        FormatId::Png => crate::png::load(data, settings, limits, progress),
        #[cfg(feature = "gif")]
        FormatId::Gif => crate::gif::load(data, settings, limits, progress),
        #[cfg(feature = "jpeg")]
        FormatId::Jpeg => crate::jpeg::load(data, settings, limits, progress),
        #[cfg(feature = "tiff")]
        FormatId::Tiff => crate::tiff::load(data, settings, limits, progress),
        #[cfg(feature = "jp2")]
        FormatId::Jp2 | FormatId::J2k => crate::jp2::load(data, settings, limits, progress),
        FormatId::Layers => Err(CodecError::UnsupportedVariant(
            "layers files are opened by the layers loader".into(),
        )),
        FormatId::Svg => Err(CodecError::UnsupportedVariant("SVG is not rasterized here".into())),
        #[allow(unreachable_patterns)]
        other => Err(not_built(other)),
    }
}

fn save_with(
    format: FormatId,
    settings: &Settings,
    progress: &Progress<'_>,
) -> Result<Vec<u8>, CodecError> {
    match format {
        FormatId::Bmp => bmp::save(settings, progress),
        FormatId::Pbm | FormatId::Pgm | FormatId::Ppm | FormatId::Pam => {
            pnm::save(settings, progress)
        }
        FormatId::Tga => tga::save(settings, progress),
        FormatId::Pcx => pcx::save(settings, progress),
        FormatId::Lss16 => lss16::save(settings, progress),
        FormatId::Xpm => xpm::save(settings, progress),
        FormatId::Xbm => xbm::save(settings, progress),
        FormatId::Gpl => palfile::save_gpl(settings),
        FormatId::TxtPalette => palfile::save_txt(settings),
        #[cfg(feature = "png")]
        FormatId::Png => crate::png::save(settings, progress),
        #[cfg(feature = "gif")]
        FormatId::Gif => crate::gif::save(settings, progress),
        #[cfg(feature = "jpeg")]
        FormatId::Jpeg => crate::jpeg::save(settings, progress),
        #[cfg(feature = "tiff")]
        FormatId::Tiff => crate::tiff::save(settings, progress),
        FormatId::Jp2 | FormatId::J2k | FormatId::Layers | FormatId::Svg => Err(
            CodecError::UnsupportedVariant(format!("{} cannot be saved", format.name())),
        ),
        #[allow(unreachable_patterns)]
        other => Err(not_built(other)),
    }
}

fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((u32::from(r) * 299 + u32::from(g) * 587 + u32::from(b) * 114 + 500) / 1000) as u8
}

/// Turn the loaded image into one byte of gray per pixel, ready to replace
/// a single channel.
fn into_channel_values(settings: &mut Settings) -> Result<(), CodecError> {
    let Some(px) = settings.image.take_channel(Channel::Image) else {
        return Ok(());
    };
    let gray: Vec<u8> = if settings.bpp() == 3 {
        px.chunks_exact(3).map(|c| luma(c[0], c[1], c[2])).collect()
    } else {
        px.iter()
            .map(|&i| {
                let c = settings.palette.color(i);
                luma(c.r, c.g, c.b)
            })
            .collect()
    };
    let (w, h) = (settings.width(), settings.height());
    settings.image = crate::image::Image::indexed(w, h, gray)?;
    settings.palette = Palette::grayscale(256);
    settings.rgb_transparent = None;
    Ok(())
}

// ── LoadRequest ──────────────────────────────────────────────────────

/// Builder for one image load.
pub struct LoadRequest<'a> {
    source: Source<'a>,
    mode: LoadMode,
    format: Option<FormatId>,
    limits: Limits,
    progress: Option<ProgressFn<'a>>,
}

impl<'a> LoadRequest<'a> {
    pub fn new(source: Source<'a>) -> Self {
        Self {
            source,
            mode: LoadMode::Image,
            format: None,
            limits: Limits::default(),
            progress: None,
        }
    }

    pub fn with_mode(mut self, mode: LoadMode) -> Self {
        self.mode = mode;
        self
    }

    /// Skip detection and decode as `format`.
    pub fn with_format(mut self, format: FormatId) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_progress(mut self, callback: ProgressFn<'a>) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Decode. On error nothing of the partial image is returned.
    pub fn load(self, stop: impl Stop) -> Result<Settings, CodecError> {
        self.run(&stop)
    }

    fn run(self, stop: &dyn Stop) -> Result<Settings, CodecError> {
        let data = self.source.read()?;
        let format = resolve_format(&data, self.source.path(), self.format)?;
        log::debug!("loading {} as {:?} ({:?})", format.name(), self.mode, self.source.path());

        let mut settings = Settings::new(self.mode);
        settings.format = Some(format);
        let mut progress = Progress::new(stop, self.progress);
        load_with(format, &data, &mut settings, &self.limits, &mut progress)?;

        match self.mode {
            LoadMode::Channel { .. } => into_channel_values(&mut settings)?,
            LoadMode::Pattern if settings.image.has(Channel::Image) && settings.bpp() != 1 => {
                return Err(CodecError::UnsupportedVariant(
                    "patterns must be indexed images".into(),
                ));
            }
            _ => {}
        }
        log::debug!(
            "loaded {}x{} bpp {} with {} colors, channels {:?}",
            settings.width(),
            settings.height(),
            settings.bpp(),
            settings.palette.len(),
            settings.image.present()
        );
        Ok(settings)
    }
}

// ── SaveRequest ──────────────────────────────────────────────────────

/// Builder for one image save.
pub struct SaveRequest<'a> {
    format: Option<FormatId>,
    progress: Option<ProgressFn<'a>>,
}

impl Default for SaveRequest<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> SaveRequest<'a> {
    /// Format comes from the destination's extension, then from
    /// [`Settings::format`].
    pub fn new() -> Self {
        Self {
            format: None,
            progress: None,
        }
    }

    pub fn with_format(mut self, format: FormatId) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_progress(mut self, callback: ProgressFn<'a>) -> Self {
        self.progress = Some(callback);
        self
    }

    fn resolve(&self, dest: &Destination<'_>, settings: &Settings) -> Result<FormatId, CodecError> {
        let by_ext = match dest {
            Destination::Path(p) => p
                .extension()
                .and_then(|e| e.to_str())
                .and_then(FormatId::from_extension),
            Destination::Memory(_) => None,
        };
        self.format
            .or(by_ext)
            .or(settings.format)
            .ok_or(CodecError::UnrecognizedFormat)
    }

    /// Encode `settings` without writing it anywhere.
    pub fn encode(
        &self,
        format: FormatId,
        settings: &Settings,
        stop: impl Stop,
    ) -> Result<Vec<u8>, CodecError> {
        self.encode_with(format, settings, &stop)
    }

    fn encode_with(
        &self,
        format: FormatId,
        settings: &Settings,
        stop: &dyn Stop,
    ) -> Result<Vec<u8>, CodecError> {
        let mut progress = Progress::new(stop, self.progress);
        progress.set_silent(settings.silent);
        progress.start(settings.height());
        let caps = format.caps();
        if !caps.palette_only && !settings.image.has(Channel::Image) {
            return Err(CodecError::InvalidData("nothing to save: no image channel".into()));
        }
        let bytes = save_with(format, settings, &progress)?;
        progress.finish();
        log::debug!("saved {} bytes of {}", bytes.len(), format.name());
        Ok(bytes)
    }

    pub fn save(
        &self,
        dest: Destination<'_>,
        settings: &Settings,
        stop: impl Stop,
    ) -> Result<(), CodecError> {
        self.write(dest, settings, &stop)
    }

    pub(crate) fn write(
        &self,
        dest: Destination<'_>,
        settings: &Settings,
        stop: &dyn Stop,
    ) -> Result<(), CodecError> {
        let format = self.resolve(&dest, settings)?;
        let bytes = self.encode_with(format, settings, stop)?;
        match dest {
            Destination::Path(p) => std::fs::write(p, bytes)?,
            Destination::Memory(buf) => *buf = bytes,
        }
        Ok(())
    }
}

// ── FramesetRequest ──────────────────────────────────────────────────

/// Builder for loading every frame of an animated file.
pub struct FramesetRequest<'a> {
    source: Source<'a>,
    mode: FramesetMode,
    format: Option<FormatId>,
    limits: Limits,
    progress: Option<ProgressFn<'a>>,
}

impl<'a> FramesetRequest<'a> {
    pub fn new(source: Source<'a>) -> Self {
        Self {
            source,
            mode: FramesetMode::default(),
            format: None,
            limits: Limits::default(),
            progress: None,
        }
    }

    pub fn with_mode(mut self, mode: FramesetMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_format(mut self, format: FormatId) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_progress(mut self, callback: ProgressFn<'a>) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn load(self, stop: impl Stop) -> Result<Frameset, CodecError> {
        self.run(&stop)
    }

    pub(crate) fn run(self, stop: &dyn Stop) -> Result<Frameset, CodecError> {
        let data = self.source.read()?;
        let format = resolve_format(&data, self.source.path(), self.format)?;
        let mut progress = Progress::new(stop, self.progress);
        let raw = match format {
            #[cfg(feature = "gif")]
            FormatId::Gif => crate::gif::load_frames(&data, &self.limits, &mut progress)?,
            other if other.caps().animation => return Err(not_built(other)),
            other => {
                return Err(CodecError::UnsupportedVariant(format!(
                    "{} holds no animation",
                    other.name()
                )));
            }
        };
        match self.mode {
            FramesetMode::Raw => Ok(raw),
            FramesetMode::Composited { skip_zero_delay } => composite(&raw, skip_zero_delay, stop),
        }
    }
}

/// Write a frameset as an animated file. Only GIF holds animation on save.
#[cfg_attr(not(feature = "gif"), allow(unused_variables))]
pub fn save_frameset(
    dest: Destination<'_>,
    frames: &Frameset,
    stop: impl Stop,
) -> Result<(), CodecError> {
    let by_ext = match &dest {
        Destination::Path(p) => p
            .extension()
            .and_then(|e| e.to_str())
            .and_then(FormatId::from_extension),
        Destination::Memory(_) => None,
    };
    let bytes = match by_ext.unwrap_or(FormatId::Gif) {
        #[cfg(feature = "gif")]
        FormatId::Gif => crate::gif::save_frames(frames, &stop)?,
        other if other.caps().animation => return Err(not_built(other)),
        other => {
            return Err(CodecError::UnsupportedVariant(format!(
                "{} cannot hold animation",
                other.name()
            )));
        }
    };
    log::debug!("saved {} frames, {} bytes", frames.len(), bytes.len());
    match dest {
        Destination::Path(p) => std::fs::write(p, bytes)?,
        Destination::Memory(buf) => *buf = bytes,
    }
    Ok(())
}

// ── Plain functions ──────────────────────────────────────────────────

/// Load an image. `format` skips detection.
pub fn load(
    source: Source<'_>,
    mode: LoadMode,
    format: Option<FormatId>,
) -> Result<Settings, CodecError> {
    let mut req = LoadRequest::new(source).with_mode(mode);
    if let Some(f) = format {
        req = req.with_format(f);
    }
    req.load(enough::Unstoppable)
}

/// Save an image, picking the format from the destination's extension or
/// the format it was loaded from.
pub fn save(dest: Destination<'_>, settings: &Settings) -> Result<(), CodecError> {
    SaveRequest::new().save(dest, settings, enough::Unstoppable)
}

/// Load every frame of an animated file.
pub fn load_frameset(source: Source<'_>, mode: FramesetMode) -> Result<Frameset, CodecError> {
    FramesetRequest::new(source)
        .with_mode(mode)
        .load(enough::Unstoppable)
}
