//! BMP decoder: 1/2/4/8/16/24/32 bpp, RLE4/RLE8, bitfields, OS/2 and
//! V2-V5 info headers.
//!
//! Header handling follows zune-bmp 0.5.2 by Caleb Etemesi
//! (MIT/Apache-2.0/Zlib).

use super::utils::Bitfield;
use crate::bits::{self, BitOrder};
use crate::error::CodecError;
use crate::image::{Channel, ChannelMask};
use crate::limits::Limits;
use crate::palette::{Palette, RGB8};
use crate::progress::Progress;
use crate::reader::Reader;
use crate::rle::bmp::{self as rle, RleBits};
use crate::settings::Settings;

const FILE_HEADER_SIZE: usize = 14;
/// `LCS_PROFILE_EMBEDDED` ('MBED').
const PROFILE_EMBEDDED: u32 = 0x4D42_4544;

#[derive(Debug, Eq, PartialEq, Copy, Clone)]
enum Compression {
    Rgb,
    Rle8,
    Rle4,
    Bitfields,
}

impl Compression {
    fn from_u32(num: u32) -> Result<Self, CodecError> {
        match num {
            0 => Ok(Self::Rgb),
            1 => Ok(Self::Rle8),
            2 => Ok(Self::Rle4),
            // 6 = BI_ALPHABITFIELDS
            3 | 6 => Ok(Self::Bitfields),
            other => Err(CodecError::UnsupportedVariant(format!(
                "BMP compression {other}"
            ))),
        }
    }
}

#[derive(Debug)]
struct Header {
    width: u32,
    height: u32,
    top_down: bool,
    depth: u16,
    compression: Compression,
    /// Red, green, blue, alpha.
    masks: [u32; 4],
    palette: Option<Palette>,
    data_offset: usize,
    icc_profile: Option<Vec<u8>>,
}

fn parse_header(data: &[u8]) -> Result<Header, CodecError> {
    let mut r = Reader::new(data);
    if r.array::<2>()? != *b"BM" {
        return Err(CodecError::UnrecognizedFormat);
    }
    // File size and reserved words are unreliable in the wild.
    r.skip(8)?;
    let data_offset = r.u32_le()? as usize;
    let ihsize = r.u32_le()? as usize;

    let (width, raw_height, planes, depth);
    let mut compression = Compression::Rgb;
    let mut masks = [0u32; 4];
    let mut colors_used = 0usize;
    let mut entry_size = 4;
    let mut icc_profile = None;

    match ihsize {
        12 => {
            width = i32::from(r.u16_le()?);
            raw_height = i32::from(r.u16_le()?);
            planes = r.u16_le()?;
            depth = r.u16_le()?;
            entry_size = 3;
        }
        16 | 40 | 52 | 56 | 64 | 108 | 124 => {
            width = r.u32_le()? as i32;
            raw_height = r.u32_le()? as i32;
            planes = r.u16_le()?;
            depth = r.u16_le()?;
            if ihsize >= 40 {
                let raw = r.u32_le()?;
                compression = Compression::from_u32(raw)?;
                r.skip(12)?;
                colors_used = r.u32_le()? as usize;
                r.skip(4)?;
                let external_masks = ihsize == 40 && compression == Compression::Bitfields;
                if ihsize >= 52 || external_masks {
                    masks[0] = r.u32_le()?;
                    masks[1] = r.u32_le()?;
                    masks[2] = r.u32_le()?;
                }
                if ihsize >= 56 || (external_masks && raw == 6) {
                    masks[3] = r.u32_le()?;
                }
                if ihsize == 124 {
                    icc_profile = read_icc_profile(data)?;
                }
            }
        }
        _ => {
            return Err(CodecError::InvalidHeader(format!(
                "unknown BMP info header size: {ihsize}"
            )));
        }
    }

    if planes != 1 {
        log::warn!("BMP planes field is {planes}, expected 1");
    }
    if width <= 0 {
        return Err(CodecError::InvalidHeader(format!("BMP width {width}")));
    }
    if raw_height == 0 || raw_height == i32::MIN {
        return Err(CodecError::InvalidHeader(format!("BMP height {raw_height}")));
    }
    let top_down = raw_height < 0;
    if top_down && matches!(compression, Compression::Rle4 | Compression::Rle8) {
        return Err(CodecError::InvalidHeader(
            "RLE compression with top-down row order".into(),
        ));
    }
    match (depth, compression) {
        (1 | 2 | 4 | 8 | 16 | 24 | 32, Compression::Rgb)
        | (16 | 32, Compression::Bitfields)
        | (8, Compression::Rle8)
        | (4, Compression::Rle4) => {}
        _ => {
            return Err(CodecError::UnsupportedVariant(format!(
                "BMP depth {depth} with {compression:?} compression"
            )));
        }
    }

    let palette = if depth <= 8 {
        // Palette sits after the info header and any external masks.
        let start = r.position().max(FILE_HEADER_SIZE + ihsize);
        let max_entries = 1usize << depth;
        let wanted = if colors_used == 0 || colors_used > max_entries {
            max_entries
        } else {
            colors_used
        };
        let room = data_offset.saturating_sub(start) / entry_size;
        let count = wanted.min(room).min(Palette::MAX_COLORS);
        if count == 0 {
            log::warn!("BMP has no palette, using a gray ramp");
            Some(Palette::grayscale(max_entries))
        } else {
            r.set_position(start)?;
            let bytes = r.bytes(count * entry_size)?;
            let colors = bytes
                .chunks_exact(entry_size)
                .map(|c| RGB8::new(c[2], c[1], c[0]))
                .collect();
            Some(Palette::new(colors)?)
        }
    } else {
        None
    };

    Ok(Header {
        width: width as u32,
        height: raw_height.unsigned_abs(),
        top_down,
        depth,
        compression,
        masks,
        palette,
        data_offset,
        icc_profile,
    })
}

/// Embedded ICC profile of a V5 header, if any.
fn read_icc_profile(data: &[u8]) -> Result<Option<Vec<u8>>, CodecError> {
    let mut r = Reader::new(data);
    r.set_position(FILE_HEADER_SIZE + 56)?;
    if r.u32_le()? != PROFILE_EMBEDDED {
        return Ok(None);
    }
    r.set_position(FILE_HEADER_SIZE + 112)?;
    let offset = r.u32_le()? as usize;
    let size = r.u32_le()? as usize;
    let start = FILE_HEADER_SIZE.saturating_add(offset);
    match data.get(start..start.saturating_add(size)) {
        Some(profile) if size > 0 => Ok(Some(profile.to_vec())),
        _ => {
            log::warn!("BMP embedded ICC profile lies outside the file");
            Ok(None)
        }
    }
}

/// Decode a BMP file into `settings`.
pub(crate) fn load(
    data: &[u8],
    settings: &mut Settings,
    limits: &Limits,
    progress: &mut Progress<'_>,
) -> Result<(), CodecError> {
    let header = parse_header(data)?;
    log::debug!(
        "BMP {}x{} depth {} {:?}",
        header.width,
        header.height,
        header.depth,
        header.compression
    );
    limits.check(header.width, header.height)?;
    settings.icc_profile = header.icc_profile.clone();

    if settings.mode.palette_only() {
        return match header.palette {
            Some(palette) => {
                settings.palette = palette;
                Ok(())
            }
            None => Err(CodecError::UnsupportedVariant(
                "BMP has no palette".into(),
            )),
        };
    }

    let pixels = data.get(header.data_offset..).ok_or(CodecError::TruncatedStream)?;
    match header.palette {
        Some(ref palette) => {
            settings.palette = palette.clone();
            settings.begin(
                header.width,
                header.height,
                1,
                ChannelMask::IMAGE,
                limits,
                progress,
            )?;
            match header.compression {
                Compression::Rle8 => decode_rle(pixels, &header, RleBits::Eight, settings, limits, progress)?,
                Compression::Rle4 => decode_rle(pixels, &header, RleBits::Four, settings, limits, progress)?,
                _ => decode_indexed(pixels, &header, settings, progress)?,
            }
            fit_palette(settings);
        }
        None => {
            let alpha = header.depth == 32 || header.masks[3] != 0;
            let channels = if alpha {
                ChannelMask::IMAGE.with(Channel::Alpha)
            } else {
                ChannelMask::IMAGE
            };
            settings.begin(header.width, header.height, 3, channels, limits, progress)?;
            decode_direct(pixels, &header, settings, progress)?;
            if header.masks[3] == 0 {
                settings.drop_padding_alpha();
            } else {
                settings.drop_opaque_alpha();
            }
        }
    }
    progress.finish();
    Ok(())
}

fn row_stride(width: u32, depth: u16) -> usize {
    (width as usize * usize::from(depth)).div_ceil(32) * 4
}

/// Source row holding output row `y`.
fn source_row(header: &Header, y: usize) -> usize {
    if header.top_down {
        y
    } else {
        header.height as usize - 1 - y
    }
}

fn decode_indexed(
    pixels: &[u8],
    header: &Header,
    settings: &mut Settings,
    progress: &Progress<'_>,
) -> Result<(), CodecError> {
    let width = header.width as usize;
    let stride = row_stride(header.width, header.depth);
    let out = settings.pixels_mut()?;
    for (y, row) in out.chunks_exact_mut(width).enumerate() {
        progress.row(y as u32)?;
        let start = source_row(header, y) * stride;
        let src = pixels
            .get(start..start + stride)
            .ok_or(CodecError::TruncatedStream)?;
        bits::unpack_bytes(src, row, u32::from(header.depth), BitOrder::Msb);
    }
    Ok(())
}

fn decode_rle(
    pixels: &[u8],
    header: &Header,
    bits: RleBits,
    settings: &mut Settings,
    limits: &Limits,
    progress: &Progress<'_>,
) -> Result<(), CodecError> {
    let width = header.width as usize;
    let height = header.height as usize;
    progress.check()?;
    let decoded = rle::decode(pixels, width, height, bits)?;
    let out = settings.pixels_mut()?;
    for (y, row) in out.chunks_exact_mut(width).enumerate() {
        progress.row(y as u32)?;
        let start = source_row(header, y) * width;
        row.copy_from_slice(&decoded.samples[start..start + width]);
    }
    if let Some(coverage) = decoded.coverage {
        if let Some(alpha) = settings.add_alpha(limits)? {
            for (y, row) in alpha.chunks_exact_mut(width).enumerate() {
                let start = source_row(header, y) * width;
                row.copy_from_slice(&coverage[start..start + width]);
            }
        }
    }
    Ok(())
}

/// Pad the palette when pixel indices run past its end.
fn fit_palette(settings: &mut Settings) {
    let max = settings
        .image
        .channel(Channel::Image)
        .and_then(|px| px.iter().copied().max())
        .unwrap_or(0);
    if usize::from(max) >= settings.palette.len() {
        log::warn!(
            "BMP index {max} outside {}-color palette",
            settings.palette.len()
        );
        settings.palette.pad_to(usize::from(max) + 1);
    }
}

fn decode_direct(
    pixels: &[u8],
    header: &Header,
    settings: &mut Settings,
    progress: &Progress<'_>,
) -> Result<(), CodecError> {
    let width = header.width as usize;
    let stride = row_stride(header.width, header.depth);
    let bytes_pp = usize::from(header.depth / 8);
    let [red, green, blue, alpha] = field_masks(header).map(Bitfield::new);

    let mut rgb = settings
        .image
        .take_channel(Channel::Image)
        .ok_or_else(|| CodecError::InvalidData("image channel was not allocated".into()))?;
    let mut alpha_out = settings.image.take_channel(Channel::Alpha);

    for y in 0..header.height as usize {
        progress.row(y as u32)?;
        let start = source_row(header, y) * stride;
        let src = pixels
            .get(start..start + width * bytes_pp)
            .ok_or(CodecError::TruncatedStream)?;
        let dest = &mut rgb[y * width * 3..(y + 1) * width * 3];
        for (x, px) in src.chunks_exact(bytes_pp).enumerate() {
            let v = match bytes_pp {
                2 => u32::from(u16::from_le_bytes([px[0], px[1]])),
                3 => u32::from_le_bytes([px[0], px[1], px[2], 0]),
                _ => u32::from_le_bytes([px[0], px[1], px[2], px[3]]),
            };
            dest[x * 3] = red.extract(v);
            dest[x * 3 + 1] = green.extract(v);
            dest[x * 3 + 2] = blue.extract(v);
            if let Some(a) = alpha_out.as_mut() {
                a[y * width + x] = if alpha.is_empty() { 255 } else { alpha.extract(v) };
            }
        }
    }

    settings.image.set_channel(Channel::Image, rgb)?;
    if let Some(a) = alpha_out {
        settings.image.set_channel(Channel::Alpha, a)?;
    }
    Ok(())
}

/// Effective channel masks, filling in the BI_RGB defaults.
fn field_masks(header: &Header) -> [u32; 4] {
    match (header.compression, header.depth) {
        (Compression::Bitfields, _) => header.masks,
        (_, 16) => [0x7C00, 0x03E0, 0x001F, 0],
        (_, 24) => [0x00FF_0000, 0x0000_FF00, 0x0000_00FF, 0],
        _ => [0x00FF_0000, 0x0000_FF00, 0x0000_00FF, 0xFF00_0000],
    }
}
