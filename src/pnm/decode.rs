//! PNM decoder: P1-P6 (plain and raw) and P7 PAM.

use super::{Header, PnmKind, TupleType};
use crate::error::CodecError;
use crate::image::{Channel, ChannelMask};
use crate::limits::Limits;
use crate::palette::Palette;
use crate::progress::Progress;
use crate::settings::Settings;

/// Whitespace-and-comment aware token scanner over a PNM header.
struct Tokens<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Tokens<'a> {
    fn new(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    fn skip_space(&mut self) {
        while let Some(&b) = self.data.get(self.pos) {
            if b == b'#' {
                while self.data.get(self.pos).is_some_and(|&c| c != b'\n') {
                    self.pos += 1;
                }
            } else if b.is_ascii_whitespace() {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn number(&mut self) -> Result<u32, CodecError> {
        self.skip_space();
        let start = self.pos;
        while self.data.get(self.pos).is_some_and(u8::is_ascii_digit) {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(if self.pos >= self.data.len() {
                CodecError::TruncatedStream
            } else {
                CodecError::InvalidHeader("expected a number in PNM header".into())
            });
        }
        std::str::from_utf8(&self.data[start..self.pos])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| CodecError::InvalidHeader("PNM number out of range".into()))
    }

    /// One plain-PBM bit; digits need not be separated.
    fn bit(&mut self) -> Result<u8, CodecError> {
        self.skip_space();
        match self.data.get(self.pos) {
            Some(b'0') => {
                self.pos += 1;
                Ok(0)
            }
            Some(b'1') => {
                self.pos += 1;
                Ok(1)
            }
            Some(_) => Err(CodecError::InvalidData("bad plain PBM sample".into())),
            None => Err(CodecError::TruncatedStream),
        }
    }

    fn line(&mut self) -> Option<&'a str> {
        if self.pos >= self.data.len() {
            return None;
        }
        let start = self.pos;
        while self.data.get(self.pos).is_some_and(|&c| c != b'\n') {
            self.pos += 1;
        }
        let line = &self.data[start..self.pos];
        self.pos += 1;
        std::str::from_utf8(line).ok()
    }
}

pub(crate) fn parse_header(data: &[u8]) -> Result<Header, CodecError> {
    if data.len() < 2 || data[0] != b'P' {
        return Err(CodecError::UnrecognizedFormat);
    }
    let kind = match data[1] {
        b'1' => PnmKind::Bitmap { plain: true },
        b'2' => PnmKind::Graymap { plain: true },
        b'3' => PnmKind::Pixmap { plain: true },
        b'4' => PnmKind::Bitmap { plain: false },
        b'5' => PnmKind::Graymap { plain: false },
        b'6' => PnmKind::Pixmap { plain: false },
        b'7' => return parse_pam(data),
        _ => return Err(CodecError::UnrecognizedFormat),
    };
    let mut t = Tokens::new(data, 2);
    let width = t.number()?;
    let height = t.number()?;
    let maxval = match kind {
        PnmKind::Bitmap { .. } => 1,
        _ => t.number()?,
    };
    if !(1..=65535).contains(&maxval) {
        return Err(CodecError::InvalidHeader(format!("PNM maxval {maxval}")));
    }
    // Raw data starts after exactly one whitespace byte.
    let data_offset = if kind.is_plain() { t.pos } else { t.pos + 1 };
    let tuple = match kind {
        PnmKind::Bitmap { .. } => TupleType::BlackAndWhite,
        PnmKind::Graymap { .. } => TupleType::Grayscale,
        _ => TupleType::Rgb,
    };
    Ok(Header {
        kind,
        width,
        height,
        maxval,
        tuple,
        data_offset,
    })
}

fn parse_pam(data: &[u8]) -> Result<Header, CodecError> {
    let mut t = Tokens::new(data, 2);
    let (mut width, mut height, mut depth, mut maxval) = (0, 0, 0, 0);
    let mut tuple = None;
    loop {
        let line = t
            .line()
            .ok_or(CodecError::TruncatedStream)?
            .trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut words = line.split_ascii_whitespace();
        let key = words.next().unwrap_or_default();
        let value = words.next().unwrap_or_default();
        let number = || {
            value
                .parse::<u32>()
                .map_err(|_| CodecError::InvalidHeader(format!("PAM {key} {value:?}")))
        };
        match key {
            "WIDTH" => width = number()?,
            "HEIGHT" => height = number()?,
            "DEPTH" => depth = number()?,
            "MAXVAL" => maxval = number()?,
            "TUPLTYPE" => tuple = TupleType::from_name(value),
            "ENDHDR" => break,
            _ => log::debug!("PAM: ignoring header line {line:?}"),
        }
    }
    if !(1..=65535).contains(&maxval) {
        return Err(CodecError::InvalidHeader(format!("PAM maxval {maxval}")));
    }
    let tuple = match tuple {
        Some(tuple) if tuple.depth() == depth => tuple,
        // No (or unknown) TUPLTYPE: infer from depth.
        _ => match depth {
            1 if maxval == 1 => TupleType::BlackAndWhite,
            1 => TupleType::Grayscale,
            2 => TupleType::GrayscaleAlpha,
            3 => TupleType::Rgb,
            4 => TupleType::RgbAlpha,
            _ => {
                return Err(CodecError::UnsupportedVariant(format!(
                    "PAM depth {depth}"
                )));
            }
        },
    };
    Ok(Header {
        kind: PnmKind::Pam,
        width,
        height,
        maxval,
        tuple,
        data_offset: t.pos,
    })
}

/// Scale a sample in `0..=maxval` to 8 bits.
#[inline]
fn scale(v: u32, maxval: u32) -> u8 {
    if maxval == 255 {
        v.min(255) as u8
    } else {
        ((v.min(maxval) * 255 + maxval / 2) / maxval) as u8
    }
}

/// Sample source: plain ASCII numbers or raw 8/16-bit big-endian.
enum Samples<'a> {
    Plain(Tokens<'a>),
    Raw { data: &'a [u8], pos: usize, wide: bool },
}

impl Samples<'_> {
    fn next(&mut self) -> Result<u32, CodecError> {
        match self {
            Samples::Plain(t) => t.number(),
            Samples::Raw { data, pos, wide } => {
                let n = if *wide { 2 } else { 1 };
                let bytes = data.get(*pos..*pos + n).ok_or(CodecError::TruncatedStream)?;
                *pos += n;
                Ok(if *wide {
                    u32::from(u16::from_be_bytes([bytes[0], bytes[1]]))
                } else {
                    u32::from(bytes[0])
                })
            }
        }
    }
}

pub(crate) fn load(
    data: &[u8],
    settings: &mut Settings,
    limits: &Limits,
    progress: &mut Progress<'_>,
) -> Result<(), CodecError> {
    let header = parse_header(data)?;
    log::debug!(
        "PNM {:?} {}x{} maxval {} {:?}",
        header.kind,
        header.width,
        header.height,
        header.maxval,
        header.tuple
    );
    limits.check(header.width, header.height)?;

    let (bpp, palette) = match header.tuple {
        TupleType::BlackAndWhite | TupleType::BlackAndWhiteAlpha => {
            // PBM 1 is black; PAM BLACKANDWHITE 1 is white.
            let palette = if matches!(header.kind, PnmKind::Bitmap { .. }) {
                Palette::paper_ink()
            } else {
                Palette::mono()
            };
            (1, Some(palette))
        }
        TupleType::Grayscale | TupleType::GrayscaleAlpha => {
            (1, Some(Palette::grayscale(256)))
        }
        TupleType::Rgb | TupleType::RgbAlpha => (3, None),
    };

    if settings.mode.palette_only() {
        return match palette {
            Some(p) => {
                settings.palette = p;
                Ok(())
            }
            None => Err(CodecError::UnsupportedVariant("PPM has no palette".into())),
        };
    }
    if let Some(p) = palette {
        settings.palette = p;
    }

    let channels = if header.tuple.has_alpha() {
        ChannelMask::IMAGE.with(Channel::Alpha)
    } else {
        ChannelMask::IMAGE
    };
    settings.begin(header.width, header.height, bpp, channels, limits, progress)?;

    let body = data.get(header.data_offset..).ok_or(CodecError::TruncatedStream)?;
    match header.kind {
        PnmKind::Bitmap { plain: false } => read_raw_bitmap(body, &header, settings, progress)?,
        PnmKind::Bitmap { plain: true } => {
            let mut t = Tokens::new(body, 0);
            read_tuples(&header, settings, progress, || t.bit().map(u32::from))?;
        }
        _ => {
            let mut samples = if header.kind.is_plain() {
                Samples::Plain(Tokens::new(body, 0))
            } else {
                Samples::Raw {
                    data: body,
                    pos: 0,
                    wide: header.maxval > 255,
                }
            };
            read_tuples(&header, settings, progress, || samples.next())?;
        }
    }
    settings.drop_opaque_alpha();
    progress.finish();
    Ok(())
}

fn read_raw_bitmap(
    body: &[u8],
    header: &Header,
    settings: &mut Settings,
    progress: &Progress<'_>,
) -> Result<(), CodecError> {
    let width = header.width as usize;
    let stride = width.div_ceil(8);
    let out = settings.pixels_mut()?;
    for (y, row) in out.chunks_exact_mut(width).enumerate() {
        progress.row(y as u32)?;
        let src = body
            .get(y * stride..(y + 1) * stride)
            .ok_or(CodecError::TruncatedStream)?;
        crate::bits::unpack_bytes(src, row, 1, crate::bits::BitOrder::Msb);
    }
    Ok(())
}

/// Read `depth` samples per pixel, routing the last one to alpha when the
/// tuple type carries it.
fn read_tuples(
    header: &Header,
    settings: &mut Settings,
    progress: &Progress<'_>,
    mut next: impl FnMut() -> Result<u32, CodecError>,
) -> Result<(), CodecError> {
    let width = header.width as usize;
    let color = header.tuple.depth() as usize - usize::from(header.tuple.has_alpha());
    let maxval = header.maxval;
    let bilevel = matches!(
        header.tuple,
        TupleType::BlackAndWhite | TupleType::BlackAndWhiteAlpha
    );

    let mut img = settings
        .image
        .take_channel(Channel::Image)
        .ok_or_else(|| CodecError::InvalidData("image channel was not allocated".into()))?;
    let mut alpha = settings.image.take_channel(Channel::Alpha);

    for y in 0..header.height as usize {
        progress.row(y as u32)?;
        for x in 0..width {
            let i = y * width + x;
            for c in 0..color {
                let v = next()?;
                img[i * color + c] = if bilevel { u8::from(v != 0) } else { scale(v, maxval) };
            }
            if header.tuple.has_alpha() {
                let a = scale(next()?, maxval);
                if let Some(alpha) = alpha.as_mut() {
                    alpha[i] = a;
                }
            }
        }
    }

    settings.image.set_channel(Channel::Image, img)?;
    if let Some(a) = alpha {
        settings.image.set_channel(Channel::Alpha, a)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::LoadMode;
    use crate::palette::RGB8;
    use enough::Unstoppable;

    fn decode(data: &[u8]) -> Result<Settings, CodecError> {
        let mut s = Settings::new(LoadMode::Image);
        let mut p = Progress::new(&Unstoppable, None);
        load(data, &mut s, &Limits::default(), &mut p)?;
        Ok(s)
    }

    #[test]
    fn plain_pbm_digits_may_touch() {
        let s = decode(b"P1\n# comment\n3 2\n010\n1 1 0\n").unwrap();
        assert_eq!(s.image.channel(Channel::Image).unwrap(), &[0, 1, 0, 1, 1, 0]);
        assert_eq!(s.palette.color(1), RGB8::new(0, 0, 0));
    }

    #[test]
    fn raw_pbm_rows_are_byte_aligned() {
        let s = decode(b"P4\n9 1\n\xff\x80").unwrap();
        assert_eq!(s.image.channel(Channel::Image).unwrap(), &[1; 9]);
    }

    #[test]
    fn sixteen_bit_pgm_scales() {
        let s = decode(b"P5 2 1 65535\n\xff\xff\x80\x00").unwrap();
        assert_eq!(s.image.channel(Channel::Image).unwrap(), &[255, 128]);
        assert_eq!(s.bpp(), 1);
    }

    #[test]
    fn plain_ppm_with_small_maxval() {
        let s = decode(b"P3\n1 1\n15\n15 0 7\n").unwrap();
        assert_eq!(s.image.channel(Channel::Image).unwrap(), &[255, 0, 119]);
    }

    #[test]
    fn pam_rgb_alpha() {
        let data = b"P7\nWIDTH 2\nHEIGHT 1\nDEPTH 4\nMAXVAL 255\nTUPLTYPE RGB_ALPHA\nENDHDR\n\
                     \x01\x02\x03\x00\x04\x05\x06\xff";
        let s = decode(data).unwrap();
        assert_eq!(s.image.channel(Channel::Image).unwrap(), &[1, 2, 3, 4, 5, 6]);
        assert_eq!(s.image.channel(Channel::Alpha).unwrap(), &[0, 255]);
    }

    #[test]
    fn short_raster_is_truncated() {
        assert!(matches!(
            decode(b"P6\n2 2\n255\n\x00\x00\x00"),
            Err(CodecError::TruncatedStream)
        ));
    }
}
