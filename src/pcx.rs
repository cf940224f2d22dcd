//! ZSoft PCX: 1/2/4/8-bit pixels in 1-4 planes, EGA header palettes and
//! VGA trailing palettes.

use crate::bits::{self, BitOrder};
use crate::error::CodecError;
use crate::image::{Channel, ChannelMask};
use crate::limits::Limits;
use crate::palette::Palette;
use crate::progress::Progress;
use crate::reader::Reader;
use crate::rle::pcx as rle;
use crate::settings::Settings;

const HEADER_SIZE: usize = 128;
const MANUFACTURER: u8 = 0x0A;
/// Marker before the 768-byte VGA palette at the end of the file.
const VGA_MARKER: u8 = 0x0C;
const VGA_PALETTE_SIZE: usize = 769;

#[derive(Debug)]
struct Header {
    version: u8,
    compressed: bool,
    bits: u8,
    planes: u8,
    width: u32,
    height: u32,
    bytes_per_line: usize,
    ega: [u8; 48],
}

impl Header {
    fn is_rgb(&self) -> bool {
        self.bits == 8 && self.planes >= 3
    }

    /// Bits per palette index after merging planes.
    fn index_bits(&self) -> u32 {
        u32::from(self.bits) * u32::from(self.planes)
    }
}

fn parse_header(data: &[u8]) -> Result<Header, CodecError> {
    let mut r = Reader::new(data);
    let [manufacturer, version, encoding, bits] = r.array::<4>()?;
    if manufacturer != MANUFACTURER || version > 5 || encoding > 1 {
        return Err(CodecError::UnrecognizedFormat);
    }
    let xmin = r.u16_le()?;
    let ymin = r.u16_le()?;
    let xmax = r.u16_le()?;
    let ymax = r.u16_le()?;
    r.skip(4)?;
    let ega = r.array::<48>()?;
    r.skip(1)?;
    let planes = r.u8()?;
    let bytes_per_line = usize::from(r.u16_le()?);
    if xmax < xmin || ymax < ymin {
        return Err(CodecError::InvalidHeader(format!(
            "PCX window {xmin},{ymin}..{xmax},{ymax}"
        )));
    }
    let width = u32::from(xmax - xmin) + 1;
    let height = u32::from(ymax - ymin) + 1;

    let supported = matches!(
        (bits, planes),
        (1, 1..=4) | (2, 1) | (4, 1) | (8, 1) | (8, 3) | (8, 4)
    );
    if !supported {
        return Err(CodecError::UnsupportedVariant(format!(
            "PCX {bits}-bit pixels in {planes} planes"
        )));
    }
    if bytes_per_line < bits::packed_len(width as usize, u32::from(bits)) {
        return Err(CodecError::InvalidHeader(format!(
            "PCX line of {bytes_per_line} bytes is too short for {width} pixels"
        )));
    }
    Ok(Header {
        version,
        compressed: encoding == 1,
        bits,
        planes,
        width,
        height,
        bytes_per_line,
        ega,
    })
}

fn palette_for(data: &[u8], header: &Header) -> Result<Option<Palette>, CodecError> {
    if header.is_rgb() {
        return Ok(None);
    }
    let colors = 1usize << header.index_bits();
    if header.bits == 8 {
        let trailer = data
            .len()
            .checked_sub(VGA_PALETTE_SIZE)
            .filter(|&at| at >= HEADER_SIZE && data[at] == VGA_MARKER);
        return Ok(Some(match trailer {
            Some(at) => Palette::from_rgb_bytes(&data[at + 1..])?,
            None => {
                log::warn!("PCX: 8-bit image without VGA palette, using a gray ramp");
                Palette::grayscale(colors)
            }
        }));
    }
    let ega = &header.ega[..colors.min(16) * 3];
    // Monochrome files often leave the header palette zeroed.
    if colors == 2 && ega.iter().all(|&b| b == 0) {
        return Ok(Some(Palette::mono()));
    }
    Ok(Some(Palette::from_rgb_bytes(ega)?))
}

pub(crate) fn load(
    data: &[u8],
    settings: &mut Settings,
    limits: &Limits,
    progress: &mut Progress<'_>,
) -> Result<(), CodecError> {
    let header = parse_header(data)?;
    log::debug!(
        "PCX v{} {}x{} {}bit x{} planes",
        header.version,
        header.width,
        header.height,
        header.bits,
        header.planes
    );
    limits.check(header.width, header.height)?;
    let palette = palette_for(data, &header)?;

    if settings.mode.palette_only() {
        return match palette {
            Some(p) => {
                settings.palette = p;
                Ok(())
            }
            None => Err(CodecError::UnsupportedVariant("PCX has no palette".into())),
        };
    }

    let channels = if header.is_rgb() && header.planes == 4 {
        ChannelMask::IMAGE.with(Channel::Alpha)
    } else {
        ChannelMask::IMAGE
    };
    let bpp = if header.is_rgb() { 3 } else { 1 };
    if let Some(p) = palette {
        settings.palette = p;
    }
    settings.begin(header.width, header.height, bpp, channels, limits, progress)?;

    let line = header.bytes_per_line * usize::from(header.planes);
    let body = &data[HEADER_SIZE.min(data.len())..];
    let width = header.width as usize;
    let mut img = settings
        .image
        .take_channel(Channel::Image)
        .ok_or_else(|| CodecError::InvalidData("image channel was not allocated".into()))?;
    let mut alpha = settings.image.take_channel(Channel::Alpha);

    let mut pos = 0;
    let mut plane_px = vec![0u8; width];
    for y in 0..header.height as usize {
        progress.row(y as u32)?;
        let scan = if header.compressed {
            let (scan, used) = rle::decode(&body[pos..], line)?;
            pos += used;
            scan
        } else {
            let scan = body.get(pos..pos + line).ok_or(CodecError::TruncatedStream)?;
            pos += line;
            scan.to_vec()
        };
        let planes = scan.chunks_exact(header.bytes_per_line);
        if header.is_rgb() {
            for (p, plane) in planes.enumerate() {
                for x in 0..width {
                    match p {
                        0..=2 => img[(y * width + x) * 3 + p] = plane[x],
                        _ => {
                            if let Some(a) = alpha.as_mut() {
                                a[y * width + x] = plane[x];
                            }
                        }
                    }
                }
            }
        } else {
            let row = &mut img[y * width..(y + 1) * width];
            row.fill(0);
            for (p, plane) in planes.enumerate() {
                bits::unpack_bytes(plane, &mut plane_px, u32::from(header.bits), BitOrder::Msb);
                for (dst, &v) in row.iter_mut().zip(&plane_px) {
                    *dst |= v << p;
                }
            }
        }
    }

    settings.image.set_channel(Channel::Image, img)?;
    if let Some(a) = alpha {
        settings.image.set_channel(Channel::Alpha, a)?;
    }
    settings.drop_opaque_alpha();
    progress.finish();
    Ok(())
}

/// Encode as an 8-bit VGA-palette image or a 24-bit three-plane image.
pub(crate) fn save(settings: &Settings, progress: &Progress<'_>) -> Result<Vec<u8>, CodecError> {
    let img = settings
        .image
        .channel(Channel::Image)
        .ok_or_else(|| CodecError::InvalidData("no image channel to save".into()))?;
    let width = settings.width() as usize;
    let indexed = settings.bpp() == 1;
    let planes: u8 = if indexed { 1 } else { 3 };
    // Lines hold an even number of bytes.
    let bytes_per_line = width.next_multiple_of(2);

    let mut out = Vec::with_capacity(HEADER_SIZE + img.len() + VGA_PALETTE_SIZE);
    out.extend_from_slice(&[MANUFACTURER, 5, 1, 8]);
    for v in [0, 0, settings.width().saturating_sub(1), settings.height().saturating_sub(1)] {
        out.extend_from_slice(&(v as u16).to_le_bytes());
    }
    out.extend_from_slice(&72u16.to_le_bytes());
    out.extend_from_slice(&72u16.to_le_bytes());
    let mut ega = [0u8; 48];
    if indexed {
        let bytes = settings.palette.to_rgb_bytes();
        let n = bytes.len().min(48);
        ega[..n].copy_from_slice(&bytes[..n]);
    }
    out.extend_from_slice(&ega);
    out.push(0);
    out.push(planes);
    out.extend_from_slice(&(bytes_per_line as u16).to_le_bytes());
    // Palette info: 1 = color
    out.extend_from_slice(&1u16.to_le_bytes());
    out.resize(HEADER_SIZE, 0);

    let mut plane = vec![0u8; bytes_per_line];
    for y in 0..settings.height() as usize {
        progress.row(y as u32)?;
        if indexed {
            plane[..width].copy_from_slice(&img[y * width..(y + 1) * width]);
            rle::encode_line(&plane, &mut out);
        } else {
            for c in 0..3 {
                for x in 0..width {
                    plane[x] = img[(y * width + x) * 3 + c];
                }
                rle::encode_line(&plane, &mut out);
            }
        }
    }

    if indexed {
        out.push(VGA_MARKER);
        let mut vga = settings.palette.to_rgb_bytes();
        vga.resize(768, 0);
        out.extend_from_slice(&vga);
    }
    Ok(out)
}
