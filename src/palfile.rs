//! Palette files: GIMP `.gpl` and the plain-text `count` + `r,g,b` list.
//!
//! Both load as palette only, whatever the load mode.

use crate::error::CodecError;
use crate::palette::{Palette, RGB8};
use crate::settings::Settings;

pub(crate) const GPL_MAGIC: &[u8] = b"GIMP Palette";

fn component(word: &str) -> Result<u8, CodecError> {
    word.trim()
        .parse::<u32>()
        .map(|v| v.min(255) as u8)
        .map_err(|_| CodecError::InvalidData(format!("palette component {word:?}")))
}

pub(crate) fn load_gpl(data: &[u8], settings: &mut Settings) -> Result<(), CodecError> {
    let text = String::from_utf8_lossy(data);
    let mut lines = text.lines();
    if !lines.next().is_some_and(|l| l.trim_end() == "GIMP Palette") {
        return Err(CodecError::UnrecognizedFormat);
    }
    let mut colors = Vec::new();
    for line in lines {
        let line = line.trim();
        if line.is_empty()
            || line.starts_with('#')
            || line.starts_with("Name:")
            || line.starts_with("Columns:")
        {
            continue;
        }
        let mut words = line.split_ascii_whitespace();
        let (Some(r), Some(g), Some(b)) = (words.next(), words.next(), words.next()) else {
            return Err(CodecError::InvalidData(format!("GPL line {line:?}")));
        };
        if colors.len() == Palette::MAX_COLORS {
            log::warn!("GPL: ignoring colors past {}", Palette::MAX_COLORS);
            break;
        }
        colors.push(RGB8::new(component(r)?, component(g)?, component(b)?));
    }
    log::debug!("GPL palette of {} colors", colors.len());
    settings.palette = Palette::new(colors)?;
    Ok(())
}

pub(crate) fn save_gpl(settings: &Settings) -> Result<Vec<u8>, CodecError> {
    let mut out = String::from("GIMP Palette\nName: zenraster\nColumns: 16\n#\n");
    for (i, c) in settings.palette.colors().iter().enumerate() {
        out.push_str(&format!("{:3} {:3} {:3}\tUntitled {i}\n", c.r, c.g, c.b));
    }
    Ok(out.into_bytes())
}

pub(crate) fn load_txt(data: &[u8], settings: &mut Settings) -> Result<(), CodecError> {
    let text = String::from_utf8_lossy(data);
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
    let count: usize = lines
        .next()
        .and_then(|l| l.parse().ok())
        .filter(|n| (2..=Palette::MAX_COLORS).contains(n))
        .ok_or(CodecError::UnrecognizedFormat)?;
    let mut colors = Vec::with_capacity(count);
    for line in lines.take(count) {
        let mut parts = line.split(',');
        let (Some(r), Some(g), Some(b)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(CodecError::InvalidData(format!("palette line {line:?}")));
        };
        colors.push(RGB8::new(component(r)?, component(g)?, component(b)?));
    }
    if colors.len() < count {
        return Err(CodecError::TruncatedStream);
    }
    settings.palette = Palette::new(colors)?;
    Ok(())
}

pub(crate) fn save_txt(settings: &Settings) -> Result<Vec<u8>, CodecError> {
    let mut out = format!("{}\n", settings.palette.len());
    for c in settings.palette.colors() {
        out.push_str(&format!("{},{},{}\n", c.r, c.g, c.b));
    }
    Ok(out.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpl_roundtrip_skips_metadata() {
        let mut s = Settings::default();
        s.palette = Palette::new(vec![RGB8::new(1, 2, 3), RGB8::new(250, 128, 0)]).unwrap();
        let bytes = save_gpl(&s).unwrap();
        let mut back = Settings::default();
        load_gpl(&bytes, &mut back).unwrap();
        assert_eq!(back.palette, s.palette);
    }

    #[test]
    fn txt_roundtrip() {
        let mut s = Settings::default();
        s.palette = Palette::grayscale(7);
        let bytes = save_txt(&s).unwrap();
        assert!(bytes.starts_with(b"7\n0,0,0\n"));
        let mut back = Settings::default();
        load_txt(&bytes, &mut back).unwrap();
        assert_eq!(back.palette, s.palette);
    }

    #[test]
    fn txt_count_out_of_range_is_not_a_palette() {
        let mut s = Settings::default();
        assert!(matches!(
            load_txt(b"1\n0,0,0\n", &mut s),
            Err(CodecError::UnrecognizedFormat)
        ));
        assert!(matches!(
            load_txt(b"3\n0,0,0\n1,1,1\n", &mut s),
            Err(CodecError::TruncatedStream)
        ));
    }
}
