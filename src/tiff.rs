//! TIFF via the `tiff` crate.
//!
//! Loads the first page; 16-bit samples keep their high byte. Saving
//! writes one LZW-compressed page: gray for gray-palette images, RGB or
//! RGBA otherwise (indexed images are expanded).

use std::io::Cursor;

use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::{TiffEncoder, colortype, compression};
use tiff::{ColorType, TiffError};

use crate::error::{CodecError, guard};
use crate::image::{Channel, ChannelMask};
use crate::limits::Limits;
use crate::palette::Palette;
use crate::progress::Progress;
use crate::settings::Settings;

fn map_error(e: TiffError) -> CodecError {
    match e {
        TiffError::IoError(io) if io.kind() == std::io::ErrorKind::UnexpectedEof => {
            CodecError::TruncatedStream
        }
        TiffError::IoError(io) => CodecError::Io(io),
        TiffError::FormatError(f) => CodecError::InvalidData(f.to_string()),
        TiffError::UnsupportedError(u) => CodecError::UnsupportedVariant(u.to_string()),
        TiffError::LimitsExceeded => CodecError::LimitExceeded("TIFF decoder limits".into()),
        other => CodecError::library("tiff", other),
    }
}

/// Stored layout of one pixel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Layout {
    Gray,
    GrayAlpha,
    Rgb,
    Rgba,
    Cmyk,
}

impl Layout {
    fn of(color: ColorType) -> Result<Layout, CodecError> {
        Ok(match color {
            ColorType::Gray(8 | 16) => Layout::Gray,
            ColorType::GrayA(8 | 16) => Layout::GrayAlpha,
            ColorType::RGB(8 | 16) => Layout::Rgb,
            ColorType::RGBA(8 | 16) => Layout::Rgba,
            ColorType::CMYK(8) => Layout::Cmyk,
            other => {
                return Err(CodecError::UnsupportedVariant(format!("TIFF {other:?}")));
            }
        })
    }

    fn samples(self) -> usize {
        match self {
            Layout::Gray => 1,
            Layout::GrayAlpha => 2,
            Layout::Rgb => 3,
            Layout::Rgba | Layout::Cmyk => 4,
        }
    }

    fn bpp(self) -> u8 {
        match self {
            Layout::Gray | Layout::GrayAlpha => 1,
            _ => 3,
        }
    }

    fn has_alpha(self) -> bool {
        matches!(self, Layout::GrayAlpha | Layout::Rgba)
    }
}

pub(crate) fn load(
    data: &[u8],
    settings: &mut Settings,
    limits: &Limits,
    progress: &mut Progress<'_>,
) -> Result<(), CodecError> {
    guard("tiff", || decode(data, settings, limits, progress))
}

fn decode(
    data: &[u8],
    settings: &mut Settings,
    limits: &Limits,
    progress: &mut Progress<'_>,
) -> Result<(), CodecError> {
    let mut decoder = Decoder::new(Cursor::new(data)).map_err(map_error)?;
    let (width, height) = decoder.dimensions().map_err(map_error)?;
    let color = decoder.colortype().map_err(map_error)?;
    log::debug!("TIFF {width}x{height} {color:?}");
    limits.check(width, height)?;
    let layout = Layout::of(color)?;

    if layout.bpp() == 1 {
        settings.palette = Palette::grayscale(256);
    }
    if settings.mode.palette_only() {
        return if layout.bpp() == 1 {
            Ok(())
        } else {
            Err(CodecError::UnsupportedVariant("TIFF has no palette".into()))
        };
    }

    let mask = if layout.has_alpha() {
        ChannelMask::IMAGE.with(Channel::Alpha)
    } else {
        ChannelMask::IMAGE
    };
    settings.begin(width, height, layout.bpp(), mask, limits, progress)?;
    progress.check()?;
    let samples: Vec<u8> = match decoder.read_image().map_err(map_error)? {
        DecodingResult::U8(v) => v,
        DecodingResult::U16(v) => v.into_iter().map(|s| (s >> 8) as u8).collect(),
        _ => {
            return Err(CodecError::UnsupportedVariant("TIFF sample format".into()));
        }
    };
    settings.has_more_frames = decoder.more_images();

    let w = width as usize;
    let n = layout.samples();
    let bpp = usize::from(layout.bpp());
    if samples.len() < w * height as usize * n {
        return Err(CodecError::TruncatedStream);
    }
    let mut image = settings
        .image
        .take_channel(Channel::Image)
        .ok_or_else(|| CodecError::InvalidData("image channel was not allocated".into()))?;
    let mut alpha = settings.image.take_channel(Channel::Alpha);
    for (y, src) in samples.chunks_exact(w * n).take(height as usize).enumerate() {
        progress.row(y as u32)?;
        let dst = &mut image[y * w * bpp..(y + 1) * w * bpp];
        for (x, px) in src.chunks_exact(n).enumerate() {
            let out = &mut dst[x * bpp..(x + 1) * bpp];
            match layout {
                Layout::Cmyk => {
                    let k = 255 - u16::from(px[3]);
                    for (o, &c) in out.iter_mut().zip(&px[..3]) {
                        *o = ((255 - u16::from(c)) * k / 255) as u8;
                    }
                }
                _ => out.copy_from_slice(&px[..bpp]),
            }
            if let (Some(a), true) = (alpha.as_deref_mut(), layout.has_alpha()) {
                a[y * w + x] = px[n - 1];
            }
        }
    }
    settings.image.set_channel(Channel::Image, image)?;
    if let Some(a) = alpha {
        settings.image.set_channel(Channel::Alpha, a)?;
    }
    if settings.has_more_frames {
        log::debug!("TIFF has further pages; loaded the first only");
    }
    settings.drop_opaque_alpha();
    progress.finish();
    Ok(())
}

pub(crate) fn save(settings: &Settings, progress: &Progress<'_>) -> Result<Vec<u8>, CodecError> {
    guard("tiff", || encode(settings, progress))
}

fn encode(settings: &Settings, progress: &Progress<'_>) -> Result<Vec<u8>, CodecError> {
    let alpha = settings.image.channel(Channel::Alpha);
    let (width, height) = (settings.width(), settings.height());
    let w = width as usize;
    let gray = settings.bpp() == 1 && alpha.is_none() && settings.palette.is_gray_ramp()
        && settings.palette.len() == 256;

    let channels = if gray { 1 } else if alpha.is_some() { 4 } else { 3 };
    let mut data = Vec::with_capacity(w * height as usize * channels);
    for y in 0..height as usize {
        progress.row(y as u32)?;
        for i in y * w..(y + 1) * w {
            let c = settings.image.rgb_at(&settings.palette, i);
            if gray {
                data.push(c.r);
                continue;
            }
            data.extend_from_slice(&[c.r, c.g, c.b]);
            if let Some(a) = alpha {
                data.push(a[i]);
            }
        }
    }

    let mut out = Cursor::new(Vec::new());
    {
        let mut encoder = TiffEncoder::new(&mut out).map_err(map_error)?;
        match channels {
            1 => encoder.write_image_with_compression::<colortype::Gray8, _>(
                width,
                height,
                compression::Lzw,
                &data,
            ),
            3 => encoder.write_image_with_compression::<colortype::RGB8, _>(
                width,
                height,
                compression::Lzw,
                &data,
            ),
            _ => encoder.write_image_with_compression::<colortype::RGBA8, _>(
                width,
                height,
                compression::Lzw,
                &data,
            ),
        }
        .map_err(map_error)?;
    }
    let out = out.into_inner();
    log::debug!("TIFF encoded {width}x{height}x{channels}, {} bytes", out.len());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::LoadMode;
    use crate::image::Image;
    use crate::palette::RGB8;
    use enough::Unstoppable;

    fn decode_bytes(data: &[u8]) -> Settings {
        let mut s = Settings::new(LoadMode::Image);
        let mut p = Progress::new(&Unstoppable, None);
        load(data, &mut s, &Limits::default(), &mut p).unwrap();
        s
    }

    #[test]
    fn indexed_is_expanded_to_rgb() {
        let palette = Palette::new(vec![RGB8::new(10, 20, 30), RGB8::new(200, 100, 0)]).unwrap();
        let s = Settings::from_image(Image::indexed(3, 1, vec![0, 1, 0]).unwrap(), palette);
        let bytes = save(&s, &Progress::new(&Unstoppable, None)).unwrap();
        let back = decode_bytes(&bytes);
        assert_eq!(back.bpp(), 3);
        assert_eq!(
            back.image.channel(Channel::Image).unwrap(),
            &[10, 20, 30, 200, 100, 0, 10, 20, 30]
        );
        assert!(!back.has_more_frames);
    }

    #[test]
    fn rgba_roundtrip() {
        let mut img = Image::rgb(2, 2, (0..12).collect()).unwrap();
        img.set_channel(Channel::Alpha, vec![0, 64, 128, 255]).unwrap();
        let s = Settings::from_image(img, Palette::default());
        let back = decode_bytes(&save(&s, &Progress::new(&Unstoppable, None)).unwrap());
        assert_eq!(back.image.channel(Channel::Image).unwrap(), &(0..12).collect::<Vec<u8>>()[..]);
        assert_eq!(back.image.channel(Channel::Alpha).unwrap(), &[0, 64, 128, 255]);
    }

    #[test]
    fn gray_ramp_saves_as_gray() {
        let indices: Vec<u8> = (0..=255).collect();
        let s = Settings::from_image(Image::indexed(16, 16, indices.clone()).unwrap(), Palette::grayscale(256));
        let back = decode_bytes(&save(&s, &Progress::new(&Unstoppable, None)).unwrap());
        assert_eq!(back.bpp(), 1);
        assert_eq!(back.image.channel(Channel::Image), Some(&indices[..]));
    }
}
