//! JPEG via the `image` crate's baseline/progressive codec.
//!
//! Grayscale files load as an indexed image over a 256-level gray palette.
//! CMYK and YCCK files are converted to RGB by the library.

use std::io::Cursor;

use image::codecs::jpeg::{JpegDecoder, JpegEncoder};
use image::error::ImageError;
use image::{ColorType, ExtendedColorType, ImageDecoder};

use crate::error::{CodecError, guard};
use crate::image::{Channel, ChannelMask};
use crate::limits::Limits;
use crate::palette::Palette;
use crate::progress::Progress;
use crate::settings::Settings;

fn map_error(e: ImageError) -> CodecError {
    match e {
        ImageError::IoError(io) if io.kind() == std::io::ErrorKind::UnexpectedEof => {
            CodecError::TruncatedStream
        }
        ImageError::IoError(io) => CodecError::Io(io),
        ImageError::Unsupported(u) => CodecError::UnsupportedVariant(u.to_string()),
        ImageError::Limits(l) => CodecError::LimitExceeded(l.to_string()),
        other => CodecError::library("jpeg", other),
    }
}

pub(crate) fn load(
    data: &[u8],
    settings: &mut Settings,
    limits: &Limits,
    progress: &mut Progress<'_>,
) -> Result<(), CodecError> {
    guard("jpeg", || decode(data, settings, limits, progress))
}

fn decode(
    data: &[u8],
    settings: &mut Settings,
    limits: &Limits,
    progress: &mut Progress<'_>,
) -> Result<(), CodecError> {
    let mut decoder = JpegDecoder::new(Cursor::new(data)).map_err(map_error)?;
    let (width, height) = decoder.dimensions();
    let color = decoder.color_type();
    log::debug!("JPEG {width}x{height} {color:?}");
    limits.check(width, height)?;
    settings.icc_profile = decoder.icc_profile().map_err(map_error)?;

    let bpp = match color {
        ColorType::L8 => 1,
        ColorType::Rgb8 => 3,
        other => {
            return Err(CodecError::UnsupportedVariant(format!("JPEG output {other:?}")));
        }
    };
    if bpp == 1 {
        settings.palette = Palette::grayscale(256);
    }
    if settings.mode.palette_only() {
        return if bpp == 1 {
            Ok(())
        } else {
            Err(CodecError::UnsupportedVariant("JPEG has no palette".into()))
        };
    }

    settings.begin(width, height, bpp, ChannelMask::IMAGE, limits, progress)?;
    progress.check()?;
    let expected = decoder.total_bytes();
    let pixels = settings.pixels_mut()?;
    if pixels.len() as u64 != expected {
        return Err(CodecError::InvalidData(format!(
            "JPEG decodes to {expected} bytes, channel holds {}",
            pixels.len()
        )));
    }
    decoder.read_image(pixels).map_err(map_error)?;
    progress.finish();
    Ok(())
}

/// Encode RGB, or grayscale when every palette entry is gray.
///
/// Alpha and transparency are dropped.
pub(crate) fn save(settings: &Settings, progress: &Progress<'_>) -> Result<Vec<u8>, CodecError> {
    guard("jpeg", || encode(settings, progress))
}

fn encode(settings: &Settings, progress: &Progress<'_>) -> Result<Vec<u8>, CodecError> {
    let img = settings
        .image
        .channel(Channel::Image)
        .ok_or_else(|| CodecError::InvalidData("no image channel to save".into()))?;
    let (width, height) = (settings.width(), settings.height());
    let palette = &settings.palette;
    let gray = settings.bpp() == 1 && palette.colors().iter().all(|c| c.r == c.g && c.g == c.b);

    let mut data = Vec::with_capacity(img.len() * if gray { 1 } else { 3 });
    for (y, row) in img
        .chunks_exact(width as usize * usize::from(settings.bpp()))
        .enumerate()
    {
        progress.row(y as u32)?;
        match settings.bpp() {
            3 => data.extend_from_slice(row),
            _ if gray => data.extend(row.iter().map(|&i| palette.color(i).r)),
            _ => {
                for &i in row {
                    let c = palette.color(i);
                    data.extend_from_slice(&[c.r, c.g, c.b]);
                }
            }
        }
    }

    let quality = settings.jpeg_quality.clamp(1, 100);
    let color = if gray {
        ExtendedColorType::L8
    } else {
        ExtendedColorType::Rgb8
    };
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode(&data, width, height, color)
        .map_err(map_error)?;
    log::debug!("JPEG encoded {width}x{height} q{quality}, {} bytes", out.len());
    Ok(out)
}
