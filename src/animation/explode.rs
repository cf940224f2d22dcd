//! Write every composited frame of an animation to its own file.

use std::path::{Path, PathBuf};

use enough::Stop;

use super::FramesetMode;
use crate::error::CodecError;
use crate::format::FormatId;
use crate::limits::Limits;
use crate::load::{Destination, FramesetRequest, SaveRequest, Source};
use crate::settings::Settings;

/// Outcome of [`explode_frames`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExplodeReport {
    /// Files written, in frame order.
    pub written: Vec<PathBuf>,
    /// Frames saved as PNG because the requested format could not hold them.
    pub fallbacks: usize,
}

/// Builder for splitting an animation into numbered files.
pub struct ExplodeRequest<'a> {
    source: Source<'a>,
    dest_dir: &'a Path,
    format: FormatId,
    basename: Option<&'a str>,
    limits: Limits,
    skip_zero_delay: bool,
}

impl<'a> ExplodeRequest<'a> {
    pub fn new(source: Source<'a>, dest_dir: &'a Path, format: FormatId) -> Self {
        Self {
            source,
            dest_dir,
            format,
            basename: None,
            limits: Limits::default(),
            skip_zero_delay: false,
        }
    }

    /// Output file stem; defaults to the source file's stem, or `frame`.
    pub fn with_basename(mut self, basename: &'a str) -> Self {
        self.basename = Some(basename);
        self
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_skip_zero_delay(mut self, skip: bool) -> Self {
        self.skip_zero_delay = skip;
        self
    }

    fn basename(&self) -> String {
        if let Some(b) = self.basename {
            return b.to_owned();
        }
        match self.source {
            Source::Path(p) => p
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "frame".to_owned()),
            Source::Memory(_) => "frame".to_owned(),
        }
    }

    /// Load, composite and write `{basename}.{NNN}.{ext}` for each frame.
    pub fn explode(self, stop: impl Stop) -> Result<ExplodeReport, CodecError> {
        let frames = FramesetRequest::new(self.source)
            .with_mode(FramesetMode::Composited {
                skip_zero_delay: self.skip_zero_delay,
            })
            .with_limits(self.limits.clone())
            .run(&stop)?;
        let base = self.basename();
        let mut report = ExplodeReport::default();

        for (i, frame) in frames.frames.iter().enumerate() {
            stop.check()?;
            let palette = frames.palette_of(frame).cloned().unwrap_or_default();
            let mut settings = Settings::from_image(frame.image.clone(), palette);
            settings.gif_delay = frame.delay;
            settings.silent = true;

            let format = if self.format.can_save(&settings) {
                self.format
            } else {
                log::warn!(
                    "frame {i} cannot be saved as {}, writing PNG instead",
                    self.format.name()
                );
                report.fallbacks += 1;
                FormatId::Png
            };
            let path = self
                .dest_dir
                .join(format!("{base}.{i:03}.{}", format.extension()));
            SaveRequest::new()
                .with_format(format)
                .write(Destination::Path(&path), &settings, &stop)?;
            report.written.push(path);
        }
        log::debug!(
            "exploded {} frames into {:?}, {} as PNG",
            report.written.len(),
            self.dest_dir,
            report.fallbacks
        );
        Ok(report)
    }
}

/// Split an animation into `{basename}.{NNN}.{ext}` files under `dest_dir`.
pub fn explode_frames(
    source: Source<'_>,
    dest_dir: &Path,
    format: FormatId,
    stop: impl Stop,
) -> Result<ExplodeReport, CodecError> {
    ExplodeRequest::new(source, dest_dir, format).explode(stop)
}
