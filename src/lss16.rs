//! Syslinux LSS16 splash screens: 16 colors, 6-bit palette, nibble RLE.
//!
//! Nibbles are read low first. A nibble equal to the previous color starts
//! a run: the next nibble is its length, or if zero, the two nibbles after
//! it plus 16. Any other nibble is a single pixel of that color. Every row
//! starts at a byte boundary with the previous color reset to 0.

use crate::error::CodecError;
use crate::image::ChannelMask;
use crate::limits::Limits;
use crate::palette::{Palette, RGB8};
use crate::progress::Progress;
use crate::reader::Reader;
use crate::settings::Settings;

pub(crate) const MAGIC: [u8; 4] = [0x3D, 0xF3, 0x13, 0x14];
const COLORS: usize = 16;
/// Longest run one code can express.
const MAX_RUN: usize = 255 + 16;

struct Nibbles<'a> {
    data: &'a [u8],
    pos: usize,
}

impl Nibbles<'_> {
    fn next(&mut self) -> Result<u8, CodecError> {
        let byte = *self.data.get(self.pos / 2).ok_or(CodecError::TruncatedStream)?;
        let v = if self.pos % 2 == 0 { byte & 0x0F } else { byte >> 4 };
        self.pos += 1;
        Ok(v)
    }

    fn align(&mut self) {
        self.pos = self.pos.next_multiple_of(2);
    }
}

fn expand6(v: u8) -> u8 {
    let v = v & 0x3F;
    (v << 2) | (v >> 4)
}

pub(crate) fn load(
    data: &[u8],
    settings: &mut Settings,
    limits: &Limits,
    progress: &mut Progress<'_>,
) -> Result<(), CodecError> {
    let mut r = Reader::new(data);
    if r.array::<4>()? != MAGIC {
        return Err(CodecError::UnrecognizedFormat);
    }
    let width = u32::from(r.u16_le()?);
    let height = u32::from(r.u16_le()?);
    let colors = r
        .bytes(COLORS * 3)?
        .chunks_exact(3)
        .map(|c| RGB8::new(expand6(c[0]), expand6(c[1]), expand6(c[2])))
        .collect();
    settings.palette = Palette::new(colors)?;
    log::debug!("LSS16 {width}x{height}");
    if settings.mode.palette_only() {
        return Ok(());
    }

    settings.begin(width, height, 1, ChannelMask::IMAGE, limits, progress)?;
    let w = width as usize;
    let mut nib = Nibbles {
        data: r.rest(),
        pos: 0,
    };
    let out = settings.pixels_mut()?;
    for (y, row) in out.chunks_exact_mut(w).enumerate() {
        progress.row(y as u32)?;
        let mut prev = 0u8;
        let mut x = 0;
        while x < w {
            let v = nib.next()?;
            if v != prev {
                row[x] = v;
                prev = v;
                x += 1;
                continue;
            }
            let mut n = usize::from(nib.next()?);
            if n == 0 {
                let lo = nib.next()?;
                let hi = nib.next()?;
                n = usize::from(lo | (hi << 4)) + 16;
            }
            let end = (x + n).min(w);
            row[x..end].fill(prev);
            x = end;
        }
        nib.align();
    }
    progress.finish();
    Ok(())
}

fn encode_row(row: &[u8], out: &mut Vec<u8>) {
    let mut nibbles = Vec::with_capacity(row.len());
    let mut prev = 0u8;
    let mut x = 0;
    while x < row.len() {
        let c = row[x];
        if c != prev {
            nibbles.push(c);
            prev = c;
            x += 1;
            continue;
        }
        let run = row[x..].iter().take(MAX_RUN).take_while(|&&v| v == c).count();
        nibbles.push(prev);
        if run < 16 {
            nibbles.push(run as u8);
        } else {
            let extra = (run - 16) as u8;
            nibbles.extend_from_slice(&[0, extra & 0x0F, extra >> 4]);
        }
        x += run;
    }
    for pair in nibbles.chunks(2) {
        out.push(pair[0] | pair.get(1).map_or(0, |hi| hi << 4));
    }
}

/// Encode an indexed image of at most 16 colors.
pub(crate) fn save(settings: &Settings, progress: &Progress<'_>) -> Result<Vec<u8>, CodecError> {
    if settings.bpp() != 1 || settings.palette.len() > COLORS {
        return Err(CodecError::UnsupportedVariant(
            "LSS16 holds indexed images of at most 16 colors".into(),
        ));
    }
    let img = settings
        .image
        .channel(crate::image::Channel::Image)
        .ok_or_else(|| CodecError::InvalidData("no image channel to save".into()))?;
    if img.iter().any(|&i| usize::from(i) >= COLORS) {
        return Err(CodecError::InvalidData("LSS16 index above 15".into()));
    }

    let mut out = Vec::with_capacity(8 + COLORS * 3 + img.len() / 2);
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&(settings.width() as u16).to_le_bytes());
    out.extend_from_slice(&(settings.height() as u16).to_le_bytes());
    for i in 0..COLORS {
        let c = settings.palette.color(i as u8);
        out.extend_from_slice(&[c.r >> 2, c.g >> 2, c.b >> 2]);
    }
    for (y, row) in img.chunks_exact(settings.width() as usize).enumerate() {
        progress.row(y as u32)?;
        encode_row(row, &mut out);
    }
    Ok(out)
}
