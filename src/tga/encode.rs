use super::{SIGNATURE, TOP_DOWN};
use crate::error::CodecError;
use crate::image::Channel;
use crate::progress::Progress;
use crate::rle::tga as rle;
use crate::settings::Settings;

/// Encode `settings` as a color-mapped, 24-bit or 32-bit TGA.
///
/// Rows are written top-down. Indexed images with a transparent index get a
/// 32-bit color map whose transparent entry has zero alpha.
pub(crate) fn save(settings: &Settings, progress: &Progress<'_>) -> Result<Vec<u8>, CodecError> {
    let img = settings
        .image
        .channel(Channel::Image)
        .ok_or_else(|| CodecError::InvalidData("no image channel to save".into()))?;
    let alpha = settings.image.channel(Channel::Alpha);
    let width = settings.width() as usize;
    let indexed = settings.bpp() == 1;

    let (image_type, depth, alpha_bits) = match (indexed, alpha) {
        (true, _) => (1u8, 8u8, 0u8),
        (false, None) => (2, 24, 0),
        (false, Some(_)) => (2, 32, 8),
    };
    let cmap_depth: u8 = match (indexed, settings.palette.transparent()) {
        (false, _) => 0,
        (true, None) => 24,
        (true, Some(_)) => 32,
    };
    let cmap_len = if indexed { settings.palette.len() as u16 } else { 0 };
    let image_type = if settings.tga_rle { image_type + 8 } else { image_type };

    let mut out = Vec::new();
    out.push(0); // no image id
    out.push(u8::from(indexed));
    out.push(image_type);
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&cmap_len.to_le_bytes());
    out.push(cmap_depth);
    out.extend_from_slice(&[0; 4]);
    out.extend_from_slice(&(settings.width() as u16).to_le_bytes());
    out.extend_from_slice(&(settings.height() as u16).to_le_bytes());
    out.push(depth);
    out.push(TOP_DOWN | alpha_bits);

    if indexed {
        let transparent = settings.palette.transparent();
        for (i, c) in settings.palette.colors().iter().enumerate() {
            out.extend_from_slice(&[c.b, c.g, c.r]);
            if cmap_depth == 32 {
                out.push(if transparent == Some(i as u8) { 0 } else { 255 });
            }
        }
    }

    let pixel_bytes = usize::from(depth / 8);
    let mut row_buf = Vec::with_capacity(width * pixel_bytes);
    for y in 0..settings.height() as usize {
        progress.row(y as u32)?;
        row_buf.clear();
        if indexed {
            row_buf.extend_from_slice(&img[y * width..(y + 1) * width]);
        } else {
            for x in 0..width {
                let i = y * width + x;
                let px = &img[i * 3..i * 3 + 3];
                row_buf.extend_from_slice(&[px[2], px[1], px[0]]);
                if let Some(a) = alpha {
                    row_buf.push(a[i]);
                }
            }
        }
        if settings.tga_rle {
            rle::encode_row(&row_buf, pixel_bytes, &mut out);
        } else {
            out.extend_from_slice(&row_buf);
        }
    }

    // TGA 2.0 footer without extension or developer areas.
    out.extend_from_slice(&[0; 8]);
    out.extend_from_slice(SIGNATURE);
    Ok(out)
}
