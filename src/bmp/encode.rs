//! BMP encoder: 1/4/8-bit indexed (optionally RLE4/RLE8), 24-bit RGB and
//! 32-bit RGBA with a V5 header.

use crate::bits::{self, BitOrder};
use crate::error::CodecError;
use crate::image::Channel;
use crate::progress::Progress;
use crate::rle::bmp::{self as rle, RleBits};
use crate::settings::Settings;

const FILE_HEADER_SIZE: usize = 14;
const INFO_HEADER_SIZE: usize = 40;
const V5_HEADER_SIZE: usize = 124;
/// 72 DPI in pixels per meter.
const PIXELS_PER_METER: u32 = 2835;
/// `LCS_sRGB`.
const SRGB: u32 = 0x7352_4742;

const BI_RGB: u32 = 0;
const BI_RLE8: u32 = 1;
const BI_RLE4: u32 = 2;
const BI_BITFIELDS: u32 = 3;

struct InfoHeader {
    size: usize,
    width: u32,
    height: u32,
    depth: u16,
    compression: u32,
    data_size: usize,
    colors: usize,
}

/// Encode `settings` to BMP bytes.
pub(crate) fn save(settings: &Settings, progress: &Progress<'_>) -> Result<Vec<u8>, CodecError> {
    let img = settings
        .image
        .channel(Channel::Image)
        .ok_or_else(|| CodecError::InvalidData("no image channel to save".into()))?;
    if settings.bpp() == 1 {
        encode_indexed(settings, img, progress)
    } else if let Some(alpha) = settings.image.channel(Channel::Alpha) {
        encode_32bit(settings, img, alpha, progress)
    } else {
        encode_24bit(settings, img, progress)
    }
}

fn encode_indexed(
    settings: &Settings,
    img: &[u8],
    progress: &Progress<'_>,
) -> Result<Vec<u8>, CodecError> {
    let w = settings.width() as usize;
    let h = settings.height() as usize;
    let colors = settings.palette.len();
    let depth: u16 = match colors {
        0..=2 => 1,
        3..=16 => 4,
        _ => 8,
    };

    let mut payload = Vec::new();
    let compression = if settings.bmp_rle && depth > 1 {
        // RLE streams run bottom-up, like the uncompressed rows.
        let mut rows = Vec::with_capacity(img.len());
        for row in img.chunks_exact(w).rev() {
            rows.extend_from_slice(row);
        }
        progress.check()?;
        let (bits, code) = if depth == 4 {
            (RleBits::Four, BI_RLE4)
        } else {
            (RleBits::Eight, BI_RLE8)
        };
        payload = rle::encode(&rows, w, bits);
        code
    } else {
        let stride = (w * usize::from(depth)).div_ceil(32) * 4;
        payload.resize(stride * h, 0);
        for (i, row) in img.chunks_exact(w).rev().enumerate() {
            progress.row(i as u32)?;
            let dest = &mut payload[i * stride..(i + 1) * stride];
            bits::pack_bytes(row, dest, u32::from(depth), BitOrder::Msb);
        }
        BI_RGB
    };

    let table_len = 1usize << depth;
    let info = InfoHeader {
        size: INFO_HEADER_SIZE,
        width: settings.width(),
        height: settings.height(),
        depth,
        compression,
        data_size: payload.len(),
        colors: colors.min(table_len),
    };
    let mut out = Vec::with_capacity(FILE_HEADER_SIZE + INFO_HEADER_SIZE + table_len * 4 + payload.len());
    write_headers(&mut out, &info, table_len * 4)?;
    for i in 0..table_len {
        let c = settings.palette.color(i as u8);
        out.extend_from_slice(&[c.b, c.g, c.r, 0]);
    }
    out.extend_from_slice(&payload);
    Ok(out)
}

fn encode_24bit(
    settings: &Settings,
    img: &[u8],
    progress: &Progress<'_>,
) -> Result<Vec<u8>, CodecError> {
    let w = settings.width() as usize;
    let stride = (w * 3).div_ceil(4) * 4;
    let info = InfoHeader {
        size: INFO_HEADER_SIZE,
        width: settings.width(),
        height: settings.height(),
        depth: 24,
        compression: BI_RGB,
        data_size: stride * settings.height() as usize,
        colors: 0,
    };
    let mut out = Vec::with_capacity(FILE_HEADER_SIZE + INFO_HEADER_SIZE + info.data_size);
    write_headers(&mut out, &info, 0)?;

    let pad_bytes = stride - w * 3;
    for (i, row) in img.chunks_exact(w * 3).rev().enumerate() {
        progress.row(i as u32)?;
        for px in row.chunks_exact(3) {
            out.extend_from_slice(&[px[2], px[1], px[0]]);
        }
        out.extend(core::iter::repeat_n(0u8, pad_bytes));
    }
    Ok(out)
}

fn encode_32bit(
    settings: &Settings,
    img: &[u8],
    alpha: &[u8],
    progress: &Progress<'_>,
) -> Result<Vec<u8>, CodecError> {
    let w = settings.width() as usize;
    let info = InfoHeader {
        size: V5_HEADER_SIZE,
        width: settings.width(),
        height: settings.height(),
        depth: 32,
        compression: BI_BITFIELDS,
        data_size: w * 4 * settings.height() as usize,
        colors: 0,
    };
    let mut out = Vec::with_capacity(FILE_HEADER_SIZE + V5_HEADER_SIZE + info.data_size);
    write_headers(&mut out, &info, 0)?;

    let rows = img.chunks_exact(w * 3).zip(alpha.chunks_exact(w)).rev();
    for (i, (row, a_row)) in rows.enumerate() {
        progress.row(i as u32)?;
        for (px, &a) in row.chunks_exact(3).zip(a_row) {
            out.extend_from_slice(&[px[2], px[1], px[0], a]);
        }
    }
    Ok(out)
}

/// Write the file header and the info header (40-byte or V5).
fn write_headers(out: &mut Vec<u8>, info: &InfoHeader, table_bytes: usize) -> Result<(), CodecError> {
    let data_offset = FILE_HEADER_SIZE + info.size + table_bytes;
    let file_size = u32::try_from(data_offset + info.data_size)
        .map_err(|_| CodecError::LimitExceeded("BMP larger than 4 GiB".into()))?;

    // BITMAPFILEHEADER
    out.extend_from_slice(b"BM");
    out.extend_from_slice(&file_size.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&(data_offset as u32).to_le_bytes());

    // BITMAPINFOHEADER
    out.extend_from_slice(&(info.size as u32).to_le_bytes());
    out.extend_from_slice(&(info.width as i32).to_le_bytes());
    // Positive height = bottom-up
    out.extend_from_slice(&(info.height as i32).to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&info.depth.to_le_bytes());
    out.extend_from_slice(&info.compression.to_le_bytes());
    out.extend_from_slice(&(info.data_size as u32).to_le_bytes());
    out.extend_from_slice(&PIXELS_PER_METER.to_le_bytes());
    out.extend_from_slice(&PIXELS_PER_METER.to_le_bytes());
    out.extend_from_slice(&(info.colors as u32).to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());

    if info.size == V5_HEADER_SIZE {
        for mask in [0x00FF_0000u32, 0x0000_FF00, 0x0000_00FF, 0xFF00_0000] {
            out.extend_from_slice(&mask.to_le_bytes());
        }
        out.extend_from_slice(&SRGB.to_le_bytes());
        // Endpoints and gamma are unused for sRGB.
        out.extend_from_slice(&[0; 48]);
        // LCS_GM_IMAGES, no profile, reserved
        out.extend_from_slice(&4u32.to_le_bytes());
        out.extend_from_slice(&[0; 12]);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Image;
    use crate::palette::Palette;
    use enough::Unstoppable;

    fn encode(settings: &Settings) -> Vec<u8> {
        save(settings, &Progress::new(&Unstoppable, None)).unwrap()
    }

    #[test]
    fn rgb_header_layout() {
        let s = Settings::from_image(
            Image::rgb(1, 1, vec![10, 20, 30]).unwrap(),
            Palette::default(),
        );
        let out = encode(&s);
        assert_eq!(&out[..2], b"BM");
        assert_eq!(u32::from_le_bytes([out[2], out[3], out[4], out[5]]), 58);
        assert_eq!(u32::from_le_bytes([out[10], out[11], out[12], out[13]]), 54);
        assert_eq!(u16::from_le_bytes([out[28], out[29]]), 24);
        assert_eq!(&out[54..], &[30, 20, 10, 0]);
    }

    #[test]
    fn sixteen_colors_pick_four_bits() {
        let palette = Palette::grayscale(16);
        let s = Settings::from_image(Image::indexed(3, 1, vec![1, 2, 15]).unwrap(), palette);
        let out = encode(&s);
        assert_eq!(u16::from_le_bytes([out[28], out[29]]), 4);
        let offset = 14 + 40 + 16 * 4;
        assert_eq!(&out[offset..], &[0x12, 0xF0, 0, 0]);
    }

    #[test]
    fn rle8_payload_matches_reference() {
        let mut rows = vec![5u8; 8];
        rows.extend(1..=8u8);
        let mut s = Settings::from_image(Image::indexed(8, 2, rows).unwrap(), Palette::grayscale(256));
        s.bmp_rle = true;
        let out = encode(&s);
        let offset = 14 + 40 + 256 * 4;
        // Bottom row first.
        let payload = &out[offset..];
        assert_eq!(&payload[..10], &[0, 8, 1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(&payload[10..14], &[0, 0, 8, 5]);
    }
}
