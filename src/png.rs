//! PNG via the `png` crate.
//!
//! 16-bit samples are stripped to 8 by the library. Sub-byte samples come
//! back packed and are unpacked here, so indexed and gray images of every
//! depth land in one index per byte.

use std::io::Cursor;

use png::{BitDepth, ColorType, Transformations};

use crate::bits::{self, BitOrder};
use crate::error::{CodecError, guard};
use crate::image::{Channel, ChannelMask};
use crate::limits::Limits;
use crate::palette::{Palette, RGB8};
use crate::progress::Progress;
use crate::settings::Settings;

fn decode_error(e: png::DecodingError) -> CodecError {
    match e {
        png::DecodingError::IoError(io) if io.kind() == std::io::ErrorKind::UnexpectedEof => {
            CodecError::TruncatedStream
        }
        png::DecodingError::Format(f) => CodecError::InvalidData(f.to_string()),
        other => CodecError::library("png", other),
    }
}

fn encode_error(e: png::EncodingError) -> CodecError {
    CodecError::library("png", e)
}

/// The one fully transparent entry of a tRNS chunk, if every other listed
/// entry is opaque.
fn single_transparent(trns: &[u8]) -> Option<u8> {
    let mut clear = trns.iter().enumerate().filter(|&(_, &a)| a != 255);
    match (clear.next(), clear.next()) {
        (Some((i, &0)), None) => Some(i as u8),
        _ => None,
    }
}

pub(crate) fn load(
    data: &[u8],
    settings: &mut Settings,
    limits: &Limits,
    progress: &mut Progress<'_>,
) -> Result<(), CodecError> {
    guard("png", || decode(data, settings, limits, progress))
}

fn decode(
    data: &[u8],
    settings: &mut Settings,
    limits: &Limits,
    progress: &mut Progress<'_>,
) -> Result<(), CodecError> {
    let mut decoder = png::Decoder::new(Cursor::new(data));
    decoder.set_transformations(Transformations::STRIP_16);
    let mut reader = decoder.read_info().map_err(decode_error)?;

    let info = reader.info();
    let (width, height) = (info.width, info.height);
    let color = info.color_type;
    let depth = info.bit_depth;
    let plte = info.palette.as_deref().map(Palette::from_rgb_bytes).transpose()?;
    let trns = info.trns.as_deref().map(<[u8]>::to_vec);
    let icc = info.icc_profile.as_deref().map(<[u8]>::to_vec);
    let frames = info.animation_control.map_or(1, |a| a.num_frames);
    log::debug!("PNG {width}x{height} {color:?} {depth:?}, {frames} frame(s)");
    limits.check(width, height)?;

    settings.icc_profile = icc;
    settings.has_more_frames = frames > 1;
    if settings.mode.palette_only() {
        return match plte {
            Some(p) if color == ColorType::Indexed => {
                settings.palette = p;
                Ok(())
            }
            _ => Err(CodecError::UnsupportedVariant("PNG has no palette".into())),
        };
    }

    // Sample width after STRIP_16.
    let sample_bits = match depth {
        BitDepth::One => 1,
        BitDepth::Two => 2,
        BitDepth::Four => 4,
        BitDepth::Eight | BitDepth::Sixteen => 8,
    };

    let mut alpha_from_trns = None;
    let (bpp, has_alpha) = match color {
        ColorType::Indexed => {
            let mut palette = plte
                .ok_or_else(|| CodecError::InvalidHeader("indexed PNG without PLTE".into()))?;
            if let Some(t) = trns.as_deref() {
                match single_transparent(t) {
                    Some(i) => palette.set_transparent_lossy(Some(i)),
                    None if t.iter().any(|&a| a != 255) => alpha_from_trns = Some(t.to_vec()),
                    None => {}
                }
            }
            settings.palette = palette;
            (1, alpha_from_trns.is_some())
        }
        ColorType::Grayscale | ColorType::GrayscaleAlpha => {
            let mut palette = Palette::grayscale(1 << sample_bits);
            // 8-bit and narrower keys come back one byte per sample.
            let key = match trns.as_deref() {
                Some(&[v]) => Some(v),
                Some(&[hi, lo]) => Some(if depth == BitDepth::Sixteen { hi } else { lo }),
                _ => None,
            };
            palette.set_transparent_lossy(key);
            settings.palette = palette;
            (1, color == ColorType::GrayscaleAlpha)
        }
        ColorType::Rgb => {
            settings.rgb_transparent = match trns.as_deref() {
                Some(&[r, g, b]) => Some(RGB8::new(r, g, b)),
                Some(&[r0, r1, g0, g1, b0, b1]) => Some(if depth == BitDepth::Sixteen {
                    RGB8::new(r0, g0, b0)
                } else {
                    RGB8::new(r1, g1, b1)
                }),
                _ => None,
            };
            (3, false)
        }
        ColorType::Rgba => (3, true),
    };

    let mask = if has_alpha {
        ChannelMask::IMAGE.with(Channel::Alpha)
    } else {
        ChannelMask::IMAGE
    };
    settings.begin(width, height, bpp, mask, limits, progress)?;

    let size = reader.output_buffer_size();
    let mut buf: Vec<u8> = Vec::new();
    buf.try_reserve_exact(size)
        .map_err(|_| CodecError::OutOfMemory { bytes: size })?;
    buf.resize(size, 0);
    let frame = reader.next_frame(&mut buf).map_err(decode_error)?;
    let line = frame.line_size;

    let w = width as usize;
    let stored = match color {
        ColorType::Indexed | ColorType::Grayscale => 1,
        ColorType::GrayscaleAlpha => 2,
        ColorType::Rgb => 3,
        ColorType::Rgba => 4,
    };
    let mut image = settings
        .image
        .take_channel(Channel::Image)
        .ok_or_else(|| CodecError::InvalidData("image channel was not allocated".into()))?;
    let mut alpha = settings.image.take_channel(Channel::Alpha);

    for y in 0..height as usize {
        progress.row(y as u32)?;
        let src = buf
            .get(y * line..(y + 1) * line)
            .ok_or(CodecError::TruncatedStream)?;
        let dst = &mut image[y * w * usize::from(bpp)..(y + 1) * w * usize::from(bpp)];
        let arow = alpha.as_deref_mut().map(|a| &mut a[y * w..(y + 1) * w]);
        match (stored, arow) {
            (1, arow) => {
                bits::unpack_bytes(src, dst, sample_bits, BitOrder::Msb);
                if let (Some(a), Some(t)) = (arow, alpha_from_trns.as_deref()) {
                    for (a, &i) in a.iter_mut().zip(dst.iter()) {
                        *a = t.get(usize::from(i)).copied().unwrap_or(255);
                    }
                }
            }
            (2, arow) => {
                for (x, px) in src.chunks_exact(2).take(w).enumerate() {
                    dst[x] = px[0];
                }
                if let Some(a) = arow {
                    for (a, px) in a.iter_mut().zip(src.chunks_exact(2)) {
                        *a = px[1];
                    }
                }
            }
            (3, _) => dst.copy_from_slice(&src[..w * 3]),
            (_, arow) => {
                for (d, px) in dst.chunks_exact_mut(3).zip(src.chunks_exact(4)) {
                    d.copy_from_slice(&px[..3]);
                }
                if let Some(a) = arow {
                    for (a, px) in a.iter_mut().zip(src.chunks_exact(4)) {
                        *a = px[3];
                    }
                }
            }
        }
    }

    settings.image.set_channel(Channel::Image, image)?;
    if let Some(a) = alpha {
        settings.image.set_channel(Channel::Alpha, a)?;
    }
    settings.drop_opaque_alpha();
    progress.finish();
    Ok(())
}

fn compression(level: u8) -> png::Compression {
    match level {
        0..=3 => png::Compression::Fast,
        4..=6 => png::Compression::Default,
        _ => png::Compression::Best,
    }
}

/// Smallest PNG bit depth that holds `colors` indices.
fn index_depth(colors: usize) -> (BitDepth, u32) {
    match colors {
        0..=2 => (BitDepth::One, 1),
        3..=4 => (BitDepth::Two, 2),
        5..=16 => (BitDepth::Four, 4),
        _ => (BitDepth::Eight, 8),
    }
}

pub(crate) fn save(settings: &Settings, progress: &Progress<'_>) -> Result<Vec<u8>, CodecError> {
    guard("png", || encode(settings, progress))
}

fn encode(settings: &Settings, progress: &Progress<'_>) -> Result<Vec<u8>, CodecError> {
    let img = settings
        .image
        .channel(Channel::Image)
        .ok_or_else(|| CodecError::InvalidData("no image channel to save".into()))?;
    let alpha = settings.image.channel(Channel::Alpha);
    let (width, height) = (settings.width(), settings.height());
    let w = width as usize;
    let indexed = settings.bpp() == 1;

    let mut out = Vec::new();
    let mut encoder = png::Encoder::new(&mut out, width, height);
    encoder.set_compression(compression(settings.png_compression));

    let mut data = Vec::new();
    if indexed && alpha.is_none() {
        let palette = &settings.palette;
        let (depth, bits_per) = index_depth(palette.len());
        encoder.set_color(ColorType::Indexed);
        encoder.set_depth(depth);
        encoder.set_palette(palette.to_rgb_bytes());
        if let Some(t) = palette.transparent() {
            let mut trns = vec![255u8; usize::from(t) + 1];
            trns[usize::from(t)] = 0;
            encoder.set_trns(trns);
        }
        let stride = bits::packed_len(w, bits_per);
        data.resize(stride * height as usize, 0);
        for (y, (row, dst)) in img.chunks_exact(w).zip(data.chunks_exact_mut(stride)).enumerate() {
            progress.row(y as u32)?;
            bits::pack_bytes(row, dst, bits_per, BitOrder::Msb);
        }
    } else {
        encoder.set_depth(BitDepth::Eight);
        encoder.set_color(if alpha.is_some() {
            ColorType::Rgba
        } else {
            ColorType::Rgb
        });
        if let (None, Some(key), false) = (alpha, settings.rgb_transparent, indexed) {
            encoder.set_trns(vec![0, key.r, 0, key.g, 0, key.b]);
        }
        let channels = if alpha.is_some() { 4 } else { 3 };
        data.reserve(w * height as usize * channels);
        for y in 0..height as usize {
            progress.row(y as u32)?;
            for i in y * w..(y + 1) * w {
                let c = settings.image.rgb_at(&settings.palette, i);
                data.extend_from_slice(&[c.r, c.g, c.b]);
                if let Some(a) = alpha {
                    data.push(a[i]);
                }
            }
        }
    }

    let mut writer = encoder.write_header().map_err(encode_error)?;
    writer.write_image_data(&data).map_err(encode_error)?;
    writer.finish().map_err(encode_error)?;
    log::debug!("PNG encoded {width}x{height}, {} bytes", out.len());
    Ok(out)
}
