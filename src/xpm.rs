//! XPM3 pixmaps.

use std::collections::HashMap;

use crate::error::CodecError;
use crate::image::{Channel, ChannelMask};
use crate::limits::Limits;
use crate::palette::{Palette, RGB8};
use crate::progress::Progress;
use crate::settings::Settings;

/// Pixel characters used when writing, in order of preference.
const CHARS: &[u8] =
    b" .XoO+@#$%&*=-;:>,<1234567890qwertyuipasdfghjklzxcvbnmMNBVCZASDFGHJKLPIUYTREWQ!~^/()_`'][{}|";

/// Common X11 color names.
const NAMED: &[(&str, [u8; 3])] = &[
    ("black", [0, 0, 0]),
    ("white", [255, 255, 255]),
    ("red", [255, 0, 0]),
    ("green", [0, 255, 0]),
    ("blue", [0, 0, 255]),
    ("yellow", [255, 255, 0]),
    ("cyan", [0, 255, 255]),
    ("magenta", [255, 0, 255]),
    ("gray", [190, 190, 190]),
    ("grey", [190, 190, 190]),
    ("darkgray", [169, 169, 169]),
    ("darkgrey", [169, 169, 169]),
    ("lightgray", [211, 211, 211]),
    ("lightgrey", [211, 211, 211]),
    ("dimgray", [105, 105, 105]),
    ("orange", [255, 165, 0]),
    ("brown", [165, 42, 42]),
    ("purple", [160, 32, 240]),
    ("pink", [255, 192, 203]),
    ("navy", [0, 0, 128]),
    ("maroon", [176, 48, 96]),
    ("gold", [255, 215, 0]),
    ("darkred", [139, 0, 0]),
    ("darkgreen", [0, 100, 0]),
    ("darkblue", [0, 0, 139]),
];

/// Parse an XPM color value; `None` means transparent.
fn parse_color(value: &str) -> Option<RGB8> {
    if value.eq_ignore_ascii_case("none") {
        return None;
    }
    if let Some(hex) = value.strip_prefix('#') {
        let digits = hex.len() / 3;
        if hex.len() % 3 == 0 && (1..=4).contains(&digits) {
            let part = |i: usize| {
                let s = &hex[i * digits..(i + 1) * digits];
                let v = u16::from_str_radix(s, 16).ok()?;
                // Keep the high byte of each component.
                Some(match digits {
                    1 => (v * 17) as u8,
                    2 => v as u8,
                    3 => (v >> 4) as u8,
                    _ => (v >> 8) as u8,
                })
            };
            if let (Some(r), Some(g), Some(b)) = (part(0), part(1), part(2)) {
                return Some(RGB8::new(r, g, b));
            }
        }
    }
    let key: String = value
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();
    match NAMED.iter().find(|(name, _)| *name == key) {
        Some((_, [r, g, b])) => Some(RGB8::new(*r, *g, *b)),
        None => {
            log::warn!("XPM: unknown color {value:?}, using black");
            Some(RGB8::default())
        }
    }
}

/// C string literals of the file, in order.
fn strings(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find(['"', '/']) {
        let tail = &rest[start..];
        if let Some(comment) = tail.strip_prefix("/*") {
            rest = comment.find("*/").map_or("", |end| &comment[end + 2..]);
            continue;
        }
        if tail.starts_with('/') {
            rest = &tail[1..];
            continue;
        }
        let body = &tail[1..];
        match body.find('"') {
            Some(end) => {
                out.push(&body[..end]);
                rest = &body[end + 1..];
            }
            None => break,
        }
    }
    out
}

/// Split a color definition's value part into its preferred color.
fn color_value(spec: &str) -> Option<&str> {
    let mut best: Option<(u8, &str)> = None;
    let mut words = spec.split_ascii_whitespace().peekable();
    let rank = |k: &str| match k {
        "c" => Some(0),
        "g" => Some(1),
        "g4" => Some(2),
        "m" => Some(3),
        "s" => Some(4),
        _ => None,
    };
    while let Some(key) = words.next() {
        let Some(r) = rank(key) else {
            continue;
        };
        // Values may hold spaces ("light gray"): run to the next key.
        let start = words.peek().map(|w| w.as_ptr() as usize - spec.as_ptr() as usize);
        let mut end = start;
        while let Some(w) = words.peek() {
            if rank(w).is_some() {
                break;
            }
            end = Some(w.as_ptr() as usize - spec.as_ptr() as usize + w.len());
            words.next();
        }
        if let (Some(s), Some(e)) = (start, end) {
            if r != 4 && best.is_none_or(|(b, _)| r < b) {
                best = Some((r, &spec[s..e]));
            }
        }
    }
    best.map(|(_, v)| v)
}

pub(crate) fn load(
    data: &[u8],
    settings: &mut Settings,
    limits: &Limits,
    progress: &mut Progress<'_>,
) -> Result<(), CodecError> {
    let text = std::str::from_utf8(data)
        .map_err(|_| CodecError::InvalidHeader("XPM is not text".into()))?;
    if !text.contains("XPM") {
        return Err(CodecError::UnrecognizedFormat);
    }
    let lines = strings(text);
    let values: Vec<u32> = lines
        .first()
        .ok_or(CodecError::TruncatedStream)?
        .split_ascii_whitespace()
        .map(|v| v.parse())
        .collect::<Result<_, _>>()
        .map_err(|_| CodecError::InvalidHeader("XPM values line".into()))?;
    let [width, height, ncolors, cpp] = values[..values.len().min(4)] else {
        return Err(CodecError::InvalidHeader("XPM values line is short".into()));
    };
    if !(1..=4).contains(&cpp) || ncolors == 0 {
        return Err(CodecError::InvalidHeader(format!(
            "XPM with {ncolors} colors at {cpp} chars per pixel"
        )));
    }
    if let [.., x, y] = values[4..] {
        settings.hotspot = Some((x, y));
    }
    log::debug!("XPM {width}x{height} {ncolors} colors, {cpp} cpp");
    limits.check(width, height)?;
    let cpp = cpp as usize;

    let defs = lines
        .get(1..1 + ncolors as usize)
        .ok_or(CodecError::TruncatedStream)?;
    let mut keys: HashMap<&[u8], usize> = HashMap::with_capacity(defs.len());
    let mut colors: Vec<Option<RGB8>> = Vec::with_capacity(defs.len());
    for def in defs {
        let key = def
            .as_bytes()
            .get(..cpp)
            .ok_or_else(|| CodecError::InvalidData(format!("XPM color line {def:?}")))?;
        let value = def.get(cpp..).and_then(color_value).unwrap_or("black");
        keys.insert(key, colors.len());
        colors.push(parse_color(value));
    }

    let indexed = colors.len() <= Palette::MAX_COLORS;
    let transparent = colors.iter().position(Option::is_none);
    if indexed {
        let mut palette = Palette::new(colors.iter().map(|c| c.unwrap_or_default()).collect())?;
        palette.set_transparent_lossy(transparent.map(|i| i as u8));
        settings.palette = palette;
    }
    if settings.mode.palette_only() {
        return if indexed {
            Ok(())
        } else {
            Err(CodecError::UnsupportedVariant("XPM has more than 256 colors".into()))
        };
    }

    let channels = if !indexed && transparent.is_some() {
        ChannelMask::IMAGE.with(Channel::Alpha)
    } else {
        ChannelMask::IMAGE
    };
    settings.begin(width, height, if indexed { 1 } else { 3 }, channels, limits, progress)?;

    let first_row = 1 + ncolors as usize;
    let rows = lines
        .get(first_row..first_row + height as usize)
        .ok_or(CodecError::TruncatedStream)?;
    let w = width as usize;
    let mut img = settings
        .image
        .take_channel(Channel::Image)
        .ok_or_else(|| CodecError::InvalidData("image channel was not allocated".into()))?;
    let mut alpha = settings.image.take_channel(Channel::Alpha);
    for (y, row) in rows.iter().enumerate() {
        progress.row(y as u32)?;
        let row = row.as_bytes();
        for x in 0..w {
            let key = row.get(x * cpp..(x + 1) * cpp).ok_or(CodecError::TruncatedStream)?;
            let &c = keys
                .get(key)
                .ok_or_else(|| CodecError::InvalidData("XPM pixel with undefined color".into()))?;
            let i = y * w + x;
            if indexed {
                img[i] = c as u8;
            } else {
                let rgb = colors[c].unwrap_or_default();
                img[i * 3..i * 3 + 3].copy_from_slice(&[rgb.r, rgb.g, rgb.b]);
                if let Some(a) = alpha.as_mut() {
                    a[i] = if colors[c].is_some() { 255 } else { 0 };
                }
            }
        }
    }
    settings.image.set_channel(Channel::Image, img)?;
    if let Some(a) = alpha {
        settings.image.set_channel(Channel::Alpha, a)?;
    }
    progress.finish();
    Ok(())
}

/// Encode an indexed image.
pub(crate) fn save(settings: &Settings, progress: &Progress<'_>) -> Result<Vec<u8>, CodecError> {
    if settings.bpp() != 1 {
        return Err(CodecError::UnsupportedVariant("XPM needs an indexed image".into()));
    }
    let img = settings
        .image
        .channel(Channel::Image)
        .ok_or_else(|| CodecError::InvalidData("no image channel to save".into()))?;
    let ncolors = settings.palette.len();
    let cpp = if ncolors <= CHARS.len() { 1 } else { 2 };
    let key = |i: usize| -> String {
        if cpp == 1 {
            char::from(CHARS[i]).to_string()
        } else {
            [CHARS[i / CHARS.len()], CHARS[i % CHARS.len()]]
                .iter()
                .map(|&b| char::from(b))
                .collect()
        }
    };

    let mut out = String::from("/* XPM */\nstatic char *image_xpm[] = {\n");
    let (w, h) = (settings.width(), settings.height());
    out.push_str(&format!("\"{w} {h} {ncolors} {cpp}"));
    if let Some((x, y)) = settings.hotspot {
        out.push_str(&format!(" {x} {y}"));
    }
    out.push_str("\",\n");
    for (i, c) in settings.palette.colors().iter().enumerate() {
        if settings.palette.transparent() == Some(i as u8) {
            out.push_str(&format!("\"{} c None\",\n", key(i)));
        } else {
            out.push_str(&format!("\"{} c #{:02X}{:02X}{:02X}\",\n", key(i), c.r, c.g, c.b));
        }
    }
    let keys: Vec<String> = (0..ncolors).map(key).collect();
    for (y, row) in img.chunks_exact(w as usize).enumerate() {
        progress.row(y as u32)?;
        out.push('"');
        for &i in row {
            let k = keys
                .get(usize::from(i))
                .ok_or_else(|| CodecError::InvalidData(format!("index {i} outside palette")))?;
            out.push_str(k);
        }
        out.push('"');
        out.push_str(if y + 1 == h as usize { "\n" } else { ",\n" });
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

    fn decode(data: &[u8]) -> Result<Settings, CodecError> {
        let mut s = Settings::new(LoadMode::Image);
        let mut p = Progress::new(&Unstoppable, None);
        load(data, &mut s, &Limits::default(), &mut p)?;
        Ok(s)
    }

    const SAMPLE: &str = r#"/* XPM */
static char * icon[] = {
/* width height ncolors cpp hotspot */
"4 2 3 1 1 0",
"  c None",
". c #FF0000",
"X c light gray m white",
" .X.",
"XX  "};
"#;

    #[test]
    fn parses_transparency_names_and_hotspot() {
        let s = decode(SAMPLE.as_bytes()).unwrap();
        assert_eq!(s.image.channel(Channel::Image).unwrap(), &[0, 1, 2, 1, 2, 2, 0, 0]);
        assert_eq!(s.palette.transparent(), Some(0));
        assert_eq!(s.palette.color(1), RGB8::new(255, 0, 0));
        assert_eq!(s.palette.color(2), RGB8::new(211, 211, 211));
        assert_eq!(s.hotspot, Some((1, 0)));
    }

    #[test]
    fn color_forms() {
        assert_eq!(parse_color("#fff"), Some(RGB8::new(255, 255, 255)));
        assert_eq!(parse_color("#123456"), Some(RGB8::new(0x12, 0x34, 0x56)));
        assert_eq!(parse_color("#FFFF80000000"), Some(RGB8::new(255, 128, 0)));
        assert_eq!(parse_color("NONE"), None);
        assert_eq!(parse_color("Dark Grey"), Some(RGB8::new(169, 169, 169)));
    }

    #[test]
    fn roundtrip_with_two_char_keys() {
        let mut palette = Palette::grayscale(200);
        palette.set_transparent(Some(0)).unwrap();
        let indices: Vec<u8> = (0..200).map(|i| i as u8).collect();
        let mut s = Settings::from_image(Image::indexed(20, 10, indices.clone()).unwrap(), palette);
        s.hotspot = Some((4, 5));
        let bytes = save(&s, &Progress::new(&Unstoppable, None)).unwrap();
        let back = decode(&bytes).unwrap();
        assert_eq!(back.image.channel(Channel::Image), Some(&indices[..]));
        assert_eq!(back.palette, s.palette);
        assert_eq!(back.hotspot, Some((4, 5)));
    }

    #[test]
    fn undefined_pixel_is_an_error() {
        let text = "/* XPM */\n\"1 1 1 1\",\n\"a c #000000\",\n\"b\"\n";
        assert!(decode(text.as_bytes()).is_err());
    }
}
