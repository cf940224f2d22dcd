//! X10 and X11 bitmaps.

use crate::bits::{self, BitOrder};
use crate::error::CodecError;
use crate::image::{Channel, ChannelMask};
use crate::limits::Limits;
use crate::palette::{Palette, RGB8};
use crate::progress::Progress;
use crate::settings::Settings;

/// Value of `#define <name>_<suffix> <n>`.
fn define(text: &str, suffix: &str) -> Option<u32> {
    text.lines().find_map(|line| {
        let mut words = line.split_ascii_whitespace();
        if words.next()? != "#define" {
            return None;
        }
        let name = words.next()?;
        if name != suffix.trim_start_matches('_') && !name.ends_with(suffix) {
            return None;
        }
        words.next()?.parse().ok()
    })
}

fn parse_number(word: &str) -> Option<u16> {
    match word.strip_prefix("0x").or_else(|| word.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16).ok(),
        None => word.parse().ok(),
    }
}

pub(crate) fn load(
    data: &[u8],
    settings: &mut Settings,
    limits: &Limits,
    progress: &mut Progress<'_>,
) -> Result<(), CodecError> {
    let text = std::str::from_utf8(data)
        .map_err(|_| CodecError::InvalidHeader("XBM is not text".into()))?;
    let width = define(text, "_width").ok_or(CodecError::UnrecognizedFormat)?;
    let height = define(text, "_height").ok_or(CodecError::UnrecognizedFormat)?;
    if let (Some(x), Some(y)) = (define(text, "_x_hot"), define(text, "_y_hot")) {
        settings.hotspot = Some((x, y));
    }
    settings.palette = Palette::paper_ink();
    log::debug!("XBM {width}x{height}");
    limits.check(width, height)?;
    if settings.mode.palette_only() {
        return Ok(());
    }

    let open = text.find('{').ok_or(CodecError::TruncatedStream)?;
    let x10 = text[..open].contains("short");
    let body = &text[open + 1..];
    let body = &body[..body.find('}').unwrap_or(body.len())];
    let mut raw = Vec::new();
    for word in body.split(|c: char| c == ',' || c.is_whitespace()).filter(|w| !w.is_empty()) {
        let v = parse_number(word)
            .ok_or_else(|| CodecError::InvalidData(format!("XBM value {word:?}")))?;
        if x10 {
            raw.extend_from_slice(&v.to_le_bytes());
        } else {
            raw.push(v as u8);
        }
    }

    settings.begin(width, height, 1, ChannelMask::IMAGE, limits, progress)?;
    let w = width as usize;
    let unit = if x10 { 16 } else { 8 };
    let stride = w.next_multiple_of(unit) / 8;
    let out = settings.pixels_mut()?;
    for (y, row) in out.chunks_exact_mut(w).enumerate() {
        progress.row(y as u32)?;
        let src = raw
            .get(y * stride..(y + 1) * stride)
            .ok_or(CodecError::TruncatedStream)?;
        bits::unpack_bytes(src, row, 1, BitOrder::Lsb);
    }
    progress.finish();
    Ok(())
}

fn luma(c: RGB8) -> u32 {
    u32::from(c.r) * 299 + u32::from(c.g) * 587 + u32::from(c.b) * 114
}

/// Encode a two-color indexed image; the darker color becomes the set bits.
pub(crate) fn save(settings: &Settings, progress: &Progress<'_>) -> Result<Vec<u8>, CodecError> {
    if settings.bpp() != 1 || settings.palette.len() > 2 {
        return Err(CodecError::UnsupportedVariant(
            "XBM holds two-color indexed images".into(),
        ));
    }
    let img = settings
        .image
        .channel(Channel::Image)
        .ok_or_else(|| CodecError::InvalidData("no image channel to save".into()))?;
    let invert = luma(settings.palette.color(0)) < luma(settings.palette.color(1));

    let (w, h) = (settings.width(), settings.height());
    let mut out = format!("#define image_width {w}\n#define image_height {h}\n");
    if let Some((x, y)) = settings.hotspot {
        out.push_str(&format!("#define image_x_hot {x}\n#define image_y_hot {y}\n"));
    }
    out.push_str("static unsigned char image_bits[] = {\n");

    let stride = bits::packed_len(w as usize, 1);
    let mut packed = vec![0u8; stride];
    let mut row_bits = vec![0u8; w as usize];
    let mut count = 0;
    let total = stride * h as usize;
    for (y, row) in img.chunks_exact(w as usize).enumerate() {
        progress.row(y as u32)?;
        for (b, &i) in row_bits.iter_mut().zip(row) {
            *b = u8::from((i != 0) != invert);
        }
        packed.fill(0);
        bits::pack_bytes(&row_bits, &mut packed, 1, BitOrder::Lsb);
        for &b in &packed {
            out.push_str(if count % 12 == 0 { "   " } else { " " });
            out.push_str(&format!("0x{b:02x}"));
            count += 1;
            if count < total {
                out.push(',');
            }
            if count % 12 == 0 || count == total {
                out.push('\n');
            }
        }
    }
    out.push_str("};\n");
    Ok(out.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::LoadMode;
    use crate::image::Image;
    use enough::Unstoppable;

    fn decode(data: &[u8]) -> Settings {
        let mut s = Settings::new(LoadMode::Image);
        let mut p = Progress::new(&Unstoppable, None);
        load(data, &mut s, &Limits::default(), &mut p).unwrap();
        s
    }

    #[test]
    fn x11_bits_are_lsb_first() {
        let text = "#define t_width 10\n#define t_height 1\n#define t_x_hot 3\n#define t_y_hot 0\n\
                    static char t_bits[] = { 0x05, 0x02 };\n";
        let s = decode(text.as_bytes());
        assert_eq!(
            s.image.channel(Channel::Image).unwrap(),
            &[1, 0, 1, 0, 0, 0, 0, 0, 0, 1]
        );
        assert_eq!(s.hotspot, Some((3, 0)));
        assert_eq!(s.palette.color(1), RGB8::new(0, 0, 0));
    }

    #[test]
    fn x10_rows_are_word_aligned() {
        let text = "#define t_width 3\n#define t_height 2\n\
                    static unsigned short t_bits[] = { 0x0001, 0x0004 };\n";
        let s = decode(text.as_bytes());
        assert_eq!(s.image.channel(Channel::Image).unwrap(), &[1, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn roundtrip_flips_light_foreground() {
        let indices = vec![0, 1, 1, 0, 1, 0, 0, 0, 1, 1, 1, 0, 1];
        let s = Settings::from_image(Image::indexed(13, 1, indices.clone()).unwrap(), Palette::mono());
        let bytes = save(&s, &Progress::new(&Unstoppable, None)).unwrap();
        let back = decode(&bytes);
        // Black was index 0 in the source, index 1 once loaded.
        let flipped: Vec<u8> = indices.iter().map(|&i| 1 - i).collect();
        assert_eq!(back.image.channel(Channel::Image), Some(&flipped[..]));
    }
}
