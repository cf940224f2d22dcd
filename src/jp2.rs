//! JPEG 2000 (JP2 container and raw J2K codestream) via `jpeg2k`.
//!
//! Decode only. One or two components load as gray (plus alpha), three or
//! four as RGB (plus alpha). Subsampled components are not supported.

use jpeg2k::{Image as J2kImage, ImageComponent};

use crate::error::{CodecError, guard};
use crate::image::{Channel, ChannelMask};
use crate::limits::Limits;
use crate::palette::Palette;
use crate::progress::Progress;
use crate::settings::Settings;

/// Component sample at `i` scaled to 8 bits.
fn sample(c: &ImageComponent, i: usize) -> u8 {
    let prec = c.precision().clamp(1, 31);
    let mut v = i64::from(c.data().get(i).copied().unwrap_or(0));
    if c.is_signed() {
        v += 1 << (prec - 1);
    }
    let max = (1i64 << prec) - 1;
    (v.clamp(0, max) * 255 / max) as u8
}

pub(crate) fn load(
    data: &[u8],
    settings: &mut Settings,
    limits: &Limits,
    progress: &mut Progress<'_>,
) -> Result<(), CodecError> {
    guard("jpeg2k", || decode(data, settings, limits, progress))
}

fn decode(
    data: &[u8],
    settings: &mut Settings,
    limits: &Limits,
    progress: &mut Progress<'_>,
) -> Result<(), CodecError> {
    let image = J2kImage::from_bytes(data).map_err(|e| CodecError::library("jpeg2k", e))?;
    let (width, height) = (image.width(), image.height());
    let components = image.components();
    log::debug!("JPEG2000 {width}x{height}, {} components", components.len());
    limits.check(width, height)?;
    if components
        .iter()
        .any(|c| (c.width(), c.height()) != (width, height))
    {
        return Err(CodecError::UnsupportedVariant(
            "JPEG2000 subsampled components".into(),
        ));
    }

    let (color, alpha) = match components.len() {
        1 => (&components[..1], None),
        2 => (&components[..1], Some(&components[1])),
        3 => (&components[..3], None),
        n if n >= 4 => (&components[..3], Some(&components[3])),
        _ => return Err(CodecError::InvalidData("JPEG2000 without components".into())),
    };
    let bpp = color.len() as u8;
    if bpp == 1 {
        settings.palette = Palette::grayscale(256);
    }
    if settings.mode.palette_only() {
        return if bpp == 1 {
            Ok(())
        } else {
            Err(CodecError::UnsupportedVariant("JPEG2000 has no palette".into()))
        };
    }

    let mask = if alpha.is_some() {
        ChannelMask::IMAGE.with(Channel::Alpha)
    } else {
        ChannelMask::IMAGE
    };
    settings.begin(width, height, bpp, mask, limits, progress)?;
    let w = width as usize;
    let bpp = usize::from(bpp);
    for y in 0..height as usize {
        progress.row(y as u32)?;
        let px = settings.pixels_mut()?;
        for x in 0..w {
            let i = y * w + x;
            for (k, c) in color.iter().enumerate() {
                px[i * bpp + k] = sample(c, i);
            }
        }
        if let (Some(c), Some(a)) = (alpha, settings.image.channel_mut(Channel::Alpha)) {
            for x in 0..w {
                a[y * w + x] = sample(c, y * w + x);
            }
        }
    }
    settings.drop_opaque_alpha();
    progress.finish();
    Ok(())
}
