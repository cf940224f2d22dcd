use super::{HEADER_SIZE, RIGHT_TO_LEFT, TOP_DOWN};
use crate::error::CodecError;
use crate::image::{Channel, ChannelMask};
use crate::limits::Limits;
use crate::palette::{Palette, RGB8};
use crate::progress::Progress;
use crate::reader::Reader;
use crate::rle::tga as rle;
use crate::settings::Settings;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Kind {
    ColorMapped,
    TrueColor,
    Gray,
}

#[derive(Debug)]
struct Header {
    kind: Kind,
    rle: bool,
    cmap_first: u16,
    cmap_len: u16,
    cmap_depth: u8,
    width: u32,
    height: u32,
    depth: u8,
    alpha_bits: u8,
    descriptor: u8,
    id_len: usize,
}

fn parse_header(data: &[u8]) -> Result<Header, CodecError> {
    let mut r = Reader::new(data);
    let id_len = usize::from(r.u8()?);
    let cmap_type = r.u8()?;
    let image_type = r.u8()?;
    let (kind, rle) = match image_type {
        1 => (Kind::ColorMapped, false),
        2 => (Kind::TrueColor, false),
        3 => (Kind::Gray, false),
        9 => (Kind::ColorMapped, true),
        10 => (Kind::TrueColor, true),
        11 => (Kind::Gray, true),
        other => {
            return Err(CodecError::UnsupportedVariant(format!(
                "TGA image type {other}"
            )));
        }
    };
    let cmap_first = r.u16_le()?;
    let cmap_len = r.u16_le()?;
    let cmap_depth = r.u8()?;
    // Origin words are informational.
    r.skip(4)?;
    let width = u32::from(r.u16_le()?);
    let height = u32::from(r.u16_le()?);
    let depth = r.u8()?;
    let descriptor = r.u8()?;

    if cmap_type > 1 {
        return Err(CodecError::InvalidHeader(format!("TGA color map type {cmap_type}")));
    }
    let valid = match kind {
        Kind::ColorMapped => {
            cmap_type == 1 && depth == 8 && matches!(cmap_depth, 15 | 16 | 24 | 32)
        }
        Kind::TrueColor => matches!(depth, 15 | 16 | 24 | 32),
        Kind::Gray => matches!(depth, 8 | 16),
    };
    if !valid {
        return Err(CodecError::UnsupportedVariant(format!(
            "TGA type {image_type} with {depth}-bit pixels"
        )));
    }
    Ok(Header {
        kind,
        rle,
        cmap_first,
        cmap_len,
        cmap_depth,
        width,
        height,
        depth,
        alpha_bits: descriptor & 0x0F,
        descriptor,
        id_len,
    })
}

/// Expand one 15/16/24/32-bit BGR(A) sample to RGB and alpha.
fn color(px: &[u8], alpha_bits: u8) -> (RGB8, u8) {
    match px.len() {
        2 => {
            let v = u16::from_le_bytes([px[0], px[1]]);
            let five = |s: u16| {
                let c = ((v >> s) & 0x1F) as u8;
                (c << 3) | (c >> 2)
            };
            let a = if alpha_bits > 0 && v & 0x8000 == 0 { 0 } else { 255 };
            (RGB8::new(five(10), five(5), five(0)), a)
        }
        3 => (RGB8::new(px[2], px[1], px[0]), 255),
        _ => (RGB8::new(px[2], px[1], px[0]), px[3]),
    }
}

fn read_colormap(r: &mut Reader<'_>, header: &Header) -> Result<Palette, CodecError> {
    let entry = usize::from(header.cmap_depth).div_ceil(8);
    let bytes = r.bytes(usize::from(header.cmap_len) * entry)?;
    // Indices below the first entry cannot be addressed; keep them black.
    let first = usize::from(header.cmap_first);
    let total = (first + usize::from(header.cmap_len)).min(Palette::MAX_COLORS);
    if total == 0 {
        return Err(CodecError::InvalidHeader("TGA color map is empty".into()));
    }
    let mut colors = vec![RGB8::default(); total];
    let mut alphas = vec![255u8; total];
    for (i, px) in bytes.chunks_exact(entry).enumerate() {
        let Some(slot) = colors.get_mut(first + i) else {
            break;
        };
        let (c, a) = color(px, 0);
        *slot = c;
        alphas[first + i] = a;
    }
    let mut palette = Palette::new(colors)?;
    if entry == 4 && alphas.iter().any(|&a| a != 0) {
        let key = alphas.iter().position(|&a| a == 0);
        palette.set_transparent_lossy(key.map(|i| i as u8));
    }
    Ok(palette)
}

pub(crate) fn load(
    data: &[u8],
    settings: &mut Settings,
    limits: &Limits,
    progress: &mut Progress<'_>,
) -> Result<(), CodecError> {
    let header = parse_header(data)?;
    log::debug!(
        "TGA {:?} {}x{} depth {} rle {}",
        header.kind,
        header.width,
        header.height,
        header.depth,
        header.rle
    );
    limits.check(header.width, header.height)?;

    let mut r = Reader::new(data);
    r.set_position(HEADER_SIZE + header.id_len)?;
    let cmap = if header.cmap_len > 0 {
        let entry = usize::from(header.cmap_depth).div_ceil(8);
        if header.kind == Kind::ColorMapped {
            Some(read_colormap(&mut r, &header)?)
        } else {
            r.skip(usize::from(header.cmap_len) * entry)?;
            None
        }
    } else {
        None
    };

    let palette = match header.kind {
        Kind::ColorMapped => {
            Some(cmap.ok_or_else(|| CodecError::InvalidHeader("TGA color map missing".into()))?)
        }
        Kind::Gray => Some(Palette::grayscale(256)),
        Kind::TrueColor => None,
    };
    if settings.mode.palette_only() {
        return match palette {
            Some(p) => {
                settings.palette = p;
                Ok(())
            }
            None => Err(CodecError::UnsupportedVariant("TGA has no palette".into())),
        };
    }

    let (bpp, wants_alpha) = match header.kind {
        Kind::ColorMapped => (1, false),
        Kind::Gray => (1, header.depth == 16),
        Kind::TrueColor => (3, header.depth == 32 || (header.depth == 16 && header.alpha_bits > 0)),
    };
    let channels = if wants_alpha {
        ChannelMask::IMAGE.with(Channel::Alpha)
    } else {
        ChannelMask::IMAGE
    };
    if let Some(p) = palette {
        settings.palette = p;
    }
    settings.begin(header.width, header.height, bpp, channels, limits, progress)?;

    let pixel_bytes = usize::from(header.depth).div_ceil(8);
    let count = header.width as usize * header.height as usize;
    let body = r.rest();
    progress.check()?;
    let raw = if header.rle {
        rle::decode(body, pixel_bytes, count)?.0
    } else {
        body.get(..count * pixel_bytes)
            .ok_or(CodecError::TruncatedStream)?
            .to_vec()
    };

    store(&raw, &header, pixel_bytes, settings, progress)?;
    if header.kind == Kind::ColorMapped {
        let top = settings.pixels_mut()?.iter().copied().max().unwrap_or(0);
        if usize::from(top) >= settings.palette.len() {
            log::warn!("TGA index {top} outside the {}-color map", settings.palette.len());
            settings.palette.pad_to(usize::from(top) + 1);
        }
    }
    if header.alpha_bits == 0 {
        settings.drop_padding_alpha();
    } else {
        settings.drop_opaque_alpha();
    }
    progress.finish();
    Ok(())
}

/// Copy decoded pixels into the channels, honoring the origin bits.
fn store(
    raw: &[u8],
    header: &Header,
    pixel_bytes: usize,
    settings: &mut Settings,
    progress: &Progress<'_>,
) -> Result<(), CodecError> {
    let width = header.width as usize;
    let height = header.height as usize;
    let top_down = header.descriptor & TOP_DOWN != 0;
    let mirrored = header.descriptor & RIGHT_TO_LEFT != 0;
    let bpp = usize::from(settings.bpp());

    let mut img = settings
        .image
        .take_channel(Channel::Image)
        .ok_or_else(|| CodecError::InvalidData("image channel was not allocated".into()))?;
    let mut alpha = settings.image.take_channel(Channel::Alpha);

    for (row_index, src_row) in raw.chunks_exact(width * pixel_bytes).enumerate() {
        progress.row(row_index as u32)?;
        let y = if top_down { row_index } else { height - 1 - row_index };
        for (col, px) in src_row.chunks_exact(pixel_bytes).enumerate() {
            let x = if mirrored { width - 1 - col } else { col };
            let i = y * width + x;
            let a = match header.kind {
                Kind::ColorMapped => {
                    img[i] = px[0];
                    255
                }
                Kind::Gray => {
                    img[i] = px[0];
                    px.get(1).copied().unwrap_or(255)
                }
                Kind::TrueColor => {
                    let (c, a) = color(px, header.alpha_bits);
                    img[i * bpp..i * bpp + 3].copy_from_slice(&[c.r, c.g, c.b]);
                    a
                }
            };
            if let Some(alpha) = alpha.as_mut() {
                alpha[i] = a;
            }
        }
    }

    settings.image.set_channel(Channel::Image, img)?;
    if let Some(a) = alpha {
        settings.image.set_channel(Channel::Alpha, a)?;
    }
    Ok(())
}
