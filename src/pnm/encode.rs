//! PNM encoder: P4 for two-color images, P5 for gray palettes, P6 for RGB,
//! P7 when there is an alpha channel.
//!
//! Credits: Draws from zune-ppm by Caleb Etemesi (MIT/Apache-2.0/Zlib).

use crate::bits::{self, BitOrder};
use crate::error::CodecError;
use crate::image::Channel;
use crate::palette::Palette;
use crate::progress::Progress;
use crate::settings::Settings;

pub(crate) fn save(settings: &Settings, progress: &Progress<'_>) -> Result<Vec<u8>, CodecError> {
    let img = settings
        .image
        .channel(Channel::Image)
        .ok_or_else(|| CodecError::InvalidData("no image channel to save".into()))?;
    let alpha = settings.image.channel(Channel::Alpha);
    let (width, height) = (settings.width(), settings.height());
    let indexed = settings.bpp() == 1;

    if alpha.is_none() && indexed && settings.palette.len() <= 2 {
        return encode_pbm(img, width, height, &settings.palette, progress);
    }
    if alpha.is_none() && indexed && is_gray(&settings.palette) {
        return encode_pgm(img, width, height, &settings.palette, progress);
    }
    match alpha {
        Some(alpha) => encode_pam(settings, alpha, progress),
        None => encode_ppm(settings, img, progress),
    }
}

fn is_gray(palette: &Palette) -> bool {
    palette.colors().iter().all(|c| c.r == c.g && c.g == c.b)
}

/// Whether an index should be written as a PBM 1 (black).
fn is_dark(palette: &Palette, index: u8) -> bool {
    let c = palette.color(index);
    let luma = u32::from(c.r) * 299 + u32::from(c.g) * 587 + u32::from(c.b) * 114;
    luma < 128_000
}

fn encode_pbm(
    img: &[u8],
    width: u32,
    height: u32,
    palette: &Palette,
    progress: &Progress<'_>,
) -> Result<Vec<u8>, CodecError> {
    let header = format!("P4\n{width} {height}\n");
    let w = width as usize;
    let stride = bits::packed_len(w, 1);
    let mut out = Vec::with_capacity(header.len() + stride * height as usize);
    out.extend_from_slice(header.as_bytes());

    let dark = [is_dark(palette, 0), is_dark(palette, 1)];
    let mut bits_row = vec![0u8; w];
    let mut packed = vec![0u8; stride];
    for (y, row) in img.chunks_exact(w).enumerate() {
        progress.row(y as u32)?;
        for (b, &i) in bits_row.iter_mut().zip(row) {
            *b = u8::from(dark[usize::from(i.min(1))]);
        }
        packed.fill(0);
        bits::pack_bytes(&bits_row, &mut packed, 1, BitOrder::Msb);
        out.extend_from_slice(&packed);
    }
    Ok(out)
}

fn encode_pgm(
    img: &[u8],
    width: u32,
    height: u32,
    palette: &Palette,
    progress: &Progress<'_>,
) -> Result<Vec<u8>, CodecError> {
    let header = format!("P5\n{width} {height}\n255\n");
    let mut out = Vec::with_capacity(header.len() + (width * height) as usize);
    out.extend_from_slice(header.as_bytes());
    for (y, row) in img.chunks_exact(width as usize).enumerate() {
        progress.row(y as u32)?;
        out.extend(row.iter().map(|&i| palette.color(i).g));
    }
    Ok(out)
}

fn encode_ppm(
    settings: &Settings,
    img: &[u8],
    progress: &Progress<'_>,
) -> Result<Vec<u8>, CodecError> {
    let (width, height) = (settings.width(), settings.height());
    let header = format!("P6\n{width} {height}\n255\n");
    let w = width as usize;
    let mut out = Vec::with_capacity(header.len() + w * height as usize * 3);
    out.extend_from_slice(header.as_bytes());
    if settings.bpp() == 3 {
        for (y, row) in img.chunks_exact(w * 3).enumerate() {
            progress.row(y as u32)?;
            out.extend_from_slice(row);
        }
    } else {
        for (y, row) in img.chunks_exact(w).enumerate() {
            progress.row(y as u32)?;
            for &i in row {
                let c = settings.palette.color(i);
                out.extend_from_slice(&[c.r, c.g, c.b]);
            }
        }
    }
    Ok(out)
}

fn encode_pam(
    settings: &Settings,
    alpha: &[u8],
    progress: &Progress<'_>,
) -> Result<Vec<u8>, CodecError> {
    let (width, height) = (settings.width(), settings.height());
    let header = format!(
        "P7\nWIDTH {width}\nHEIGHT {height}\nDEPTH 4\nMAXVAL 255\nTUPLTYPE RGB_ALPHA\nENDHDR\n"
    );
    let w = width as usize;
    let mut out = Vec::with_capacity(header.len() + w * height as usize * 4);
    out.extend_from_slice(header.as_bytes());
    for y in 0..height as usize {
        progress.row(y as u32)?;
        for x in 0..w {
            let i = y * w + x;
            let c = settings.image.rgb_at(&settings.palette, i);
            out.extend_from_slice(&[c.r, c.g, c.b, alpha[i]]);
        }
    }
    Ok(out)
}
