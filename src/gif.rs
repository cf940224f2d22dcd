//! GIF via the `gif` crate.
//!
//! The library does the LZW decoding. Rows are pulled one at a time in
//! stream order and interlaced frames are put in display order by
//! [`rle::gif`](crate::rle::gif), which keeps per-row cancellation.

use std::borrow::Cow;
use std::io::{Cursor, Read};

use gif::{ColorOutput, DecodeOptions, DisposalMethod};

use crate::animation::{Disposal, Frame, Frameset};
use crate::error::{CodecError, guard};
use crate::image::{Channel, ChannelMask, Image};
use crate::limits::Limits;
use crate::palette::Palette;
use crate::progress::Progress;
use crate::rle;
use crate::settings::Settings;

fn decode_error(e: gif::DecodingError) -> CodecError {
    match e {
        gif::DecodingError::Io(io) if io.kind() == std::io::ErrorKind::UnexpectedEof => {
            CodecError::TruncatedStream
        }
        gif::DecodingError::Io(io) => CodecError::Io(io),
        other => CodecError::InvalidData(other.to_string()),
    }
}

fn encode_error(e: gif::EncodingError) -> CodecError {
    CodecError::library("gif", e)
}

fn disposal(method: DisposalMethod) -> Disposal {
    match method {
        DisposalMethod::Any => Disposal::Unspecified,
        DisposalMethod::Keep => Disposal::Leave,
        DisposalMethod::Background => Disposal::RestoreToBackground,
        DisposalMethod::Previous => Disposal::RestoreToPrevious,
    }
}

fn dispose_method(disposal: Disposal) -> DisposalMethod {
    match disposal {
        Disposal::Unspecified => DisposalMethod::Any,
        Disposal::Leave => DisposalMethod::Keep,
        Disposal::RestoreToBackground => DisposalMethod::Background,
        Disposal::RestoreToPrevious => DisposalMethod::Previous,
    }
}

/// Geometry and control data of one frame, copied out of the decoder.
struct FrameInfo {
    left: u32,
    top: u32,
    width: u32,
    height: u32,
    interlaced: bool,
    delay: u16,
    disposal: Disposal,
    transparent: Option<u8>,
    palette: Option<Palette>,
}

fn next_frame_info<R: Read>(
    decoder: &mut gif::Decoder<R>,
) -> Result<Option<FrameInfo>, CodecError> {
    let Some(frame) = decoder.next_frame_info().map_err(decode_error)? else {
        return Ok(None);
    };
    let palette = frame
        .palette
        .as_deref()
        .map(Palette::from_rgb_bytes)
        .transpose()?;
    Ok(Some(FrameInfo {
        left: u32::from(frame.left),
        top: u32::from(frame.top),
        width: u32::from(frame.width),
        height: u32::from(frame.height),
        interlaced: frame.interlaced,
        delay: frame.delay,
        disposal: disposal(frame.dispose),
        transparent: frame.transparent,
        palette,
    }))
}

/// Read the current frame's indices, in display order.
fn read_indices<R: Read>(
    decoder: &mut gif::Decoder<R>,
    info: &FrameInfo,
    progress: &Progress<'_>,
) -> Result<Vec<u8>, CodecError> {
    let (w, h) = (info.width as usize, info.height as usize);
    let bytes = w * h;
    let mut buf: Vec<u8> = Vec::new();
    buf.try_reserve_exact(bytes)
        .map_err(|_| CodecError::OutOfMemory { bytes })?;
    buf.resize(bytes, info.transparent.unwrap_or(0));
    if bytes == 0 {
        return Ok(buf);
    }
    for (y, row) in buf.chunks_exact_mut(w).enumerate() {
        progress.row(y as u32)?;
        if !decoder.fill_buffer(row).map_err(decode_error)? {
            log::warn!("GIF frame data ends at row {y} of {h}");
            break;
        }
    }
    Ok(if info.interlaced {
        rle::gif::deinterlace(&buf, w, h)
    } else {
        buf
    })
}

fn open(data: &[u8]) -> Result<gif::Decoder<Cursor<&[u8]>>, CodecError> {
    let mut options = DecodeOptions::new();
    options.set_color_output(ColorOutput::Indexed);
    options.read_info(Cursor::new(data)).map_err(decode_error)
}

fn global_palette<R: Read>(decoder: &gif::Decoder<R>) -> Result<Option<Palette>, CodecError> {
    decoder
        .global_palette()
        .map(Palette::from_rgb_bytes)
        .transpose()
}

/// Load the first frame onto a canvas-sized image.
///
/// Canvas pixels the frame does not cover get the frame's transparent
/// index, or the background index when it has none.
pub(crate) fn load(
    data: &[u8],
    settings: &mut Settings,
    limits: &Limits,
    progress: &mut Progress<'_>,
) -> Result<(), CodecError> {
    guard("gif", || decode_first(data, settings, limits, progress))
}

fn decode_first(
    data: &[u8],
    settings: &mut Settings,
    limits: &Limits,
    progress: &mut Progress<'_>,
) -> Result<(), CodecError> {
    let mut decoder = open(data)?;
    let (width, height) = (u32::from(decoder.width()), u32::from(decoder.height()));
    let global = global_palette(&decoder)?;
    let background = decoder.bg_color().map_or(0, |b| b as u8);
    log::debug!("GIF {width}x{height}, global palette {:?}", global.as_ref().map(Palette::len));
    limits.check(width, height)?;

    let info = next_frame_info(&mut decoder)?
        .ok_or_else(|| CodecError::InvalidData("GIF holds no frames".into()))?;
    let mut palette = info
        .palette
        .clone()
        .or(global)
        .ok_or_else(|| CodecError::InvalidData("GIF frame without a color table".into()))?;
    palette.set_transparent_lossy(info.transparent);
    settings.palette = palette;
    settings.gif_delay = info.delay;
    if settings.mode.palette_only() {
        return Ok(());
    }

    settings.begin(width, height, 1, ChannelMask::IMAGE, limits, progress)?;
    let indices = read_indices(&mut decoder, &info, progress)?;
    let fill = info.transparent.unwrap_or(background);
    let canvas = settings.pixels_mut()?;
    canvas.fill(fill);
    let (w, fw) = (width as usize, info.width as usize);
    for (fy, src) in indices.chunks_exact(fw.max(1)).enumerate() {
        let y = info.top as usize + fy;
        if y >= height as usize || fw == 0 {
            break;
        }
        let x0 = (info.left as usize).min(w);
        let n = fw.min(w - x0);
        canvas[y * w + x0..y * w + x0 + n].copy_from_slice(&src[..n]);
    }

    settings.has_more_frames = next_frame_info(&mut decoder)?.is_some();
    if settings.has_more_frames {
        log::debug!("GIF has further frames; loaded the first only");
    }
    progress.finish();
    Ok(())
}

/// Every frame as stored, at its own offset.
pub(crate) fn load_frames(
    data: &[u8],
    limits: &Limits,
    progress: &mut Progress<'_>,
) -> Result<Frameset, CodecError> {
    guard("gif", || decode_frames(data, limits, progress))
}

fn decode_frames(
    data: &[u8],
    limits: &Limits,
    progress: &mut Progress<'_>,
) -> Result<Frameset, CodecError> {
    let mut decoder = open(data)?;
    let (width, height) = (u32::from(decoder.width()), u32::from(decoder.height()));
    limits.check(width, height)?;
    let mut set = Frameset::new(width, height);
    set.palette = global_palette(&decoder)?;
    progress.set_silent(limits.is_silent(width, height));

    while let Some(info) = next_frame_info(&mut decoder)? {
        if info.width == 0 || info.height == 0 {
            log::warn!("GIF frame {} is empty, skipped", set.len());
            continue;
        }
        limits.check(info.width, info.height)?;
        progress.start(info.height);
        let indices = read_indices(&mut decoder, &info, progress)?;
        // Transparency is per frame, so it travels with the frame's palette.
        let palette = match (info.palette.clone(), info.transparent) {
            (Some(mut local), t) => {
                local.set_transparent_lossy(t);
                Some(local)
            }
            (None, Some(t)) => set.palette.clone().map(|mut p| {
                p.pad_to(usize::from(t) + 1);
                p.set_transparent_lossy(Some(t));
                p
            }),
            (None, None) => None,
        };
        let mut frame = Frame::new(Image::indexed(info.width, info.height, indices)?);
        frame.x = info.left;
        frame.y = info.top;
        frame.palette = palette;
        frame.disposal = info.disposal;
        frame.delay = info.delay;
        log::trace!(
            "GIF frame {} {}x{} at ({}, {}) {:?}",
            set.len(),
            info.width,
            info.height,
            info.left,
            info.top,
            info.disposal
        );
        set.frames.push(frame);
        progress.finish();
    }
    log::debug!("GIF {width}x{height}, {} frames", set.len());
    Ok(set)
}

/// Encode a single indexed frame with its transparency and delay.
pub(crate) fn save(settings: &Settings, progress: &Progress<'_>) -> Result<Vec<u8>, CodecError> {
    guard("gif", || encode(settings, progress))
}

fn encode(settings: &Settings, progress: &Progress<'_>) -> Result<Vec<u8>, CodecError> {
    if settings.bpp() != 1 {
        return Err(CodecError::UnsupportedVariant("GIF holds indexed images only".into()));
    }
    let (width, height) = (settings.width(), settings.height());
    let (Ok(w16), Ok(h16)) = (u16::try_from(width), u16::try_from(height)) else {
        return Err(CodecError::UnsupportedVariant(format!(
            "GIF cannot hold {width}x{height}"
        )));
    };
    let img = settings
        .image
        .channel(Channel::Image)
        .ok_or_else(|| CodecError::InvalidData("no image channel to save".into()))?;
    progress.check()?;

    let mut encoder = gif::Encoder::new(Vec::new(), w16, h16, &settings.palette.to_rgb_bytes())
        .map_err(encode_error)?;
    let frame = gif::Frame {
        width: w16,
        height: h16,
        delay: settings.gif_delay,
        dispose: dispose_method(Disposal::Unspecified),
        transparent: settings.palette.transparent(),
        buffer: Cow::Borrowed(img),
        ..Default::default()
    };
    encoder.write_frame(&frame).map_err(encode_error)?;
    let out = encoder.into_inner().map_err(CodecError::Io)?;
    log::debug!("GIF encoded {width}x{height}, {} bytes", out.len());
    Ok(out)
}

/// Encode a whole frameset (frames at their offsets, each with its palette).
pub(crate) fn save_frames(frames: &Frameset, stop: &dyn enough::Stop) -> Result<Vec<u8>, CodecError> {
    guard("gif", || {
        let (Ok(w16), Ok(h16)) = (u16::try_from(frames.width), u16::try_from(frames.height)) else {
            return Err(CodecError::UnsupportedVariant("GIF canvas too large".into()));
        };
        let global = frames.palette.as_ref().map(Palette::to_rgb_bytes).unwrap_or_default();
        let mut encoder = gif::Encoder::new(Vec::new(), w16, h16, &global).map_err(encode_error)?;
        encoder.set_repeat(gif::Repeat::Infinite).map_err(encode_error)?;
        for f in &frames.frames {
            stop.check()?;
            if f.bpp() != 1 {
                return Err(CodecError::UnsupportedVariant("GIF frames must be indexed".into()));
            }
            let px = f
                .image
                .channel(Channel::Image)
                .ok_or_else(|| CodecError::InvalidData("frame without pixels".into()))?;
            let palette = frames.palette_of(f);
            let frame = gif::Frame {
                left: f.x as u16,
                top: f.y as u16,
                width: f.image.width() as u16,
                height: f.image.height() as u16,
                delay: f.delay,
                dispose: dispose_method(f.disposal),
                transparent: palette.and_then(Palette::transparent),
                palette: f.palette.as_ref().map(Palette::to_rgb_bytes),
                buffer: Cow::Borrowed(px),
                ..Default::default()
            };
            encoder.write_frame(&frame).map_err(encode_error)?;
        }
        encoder.into_inner().map_err(CodecError::Io)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::LoadMode;
    use crate::palette::RGB8;
    use enough::Unstoppable;

    fn three_color() -> Palette {
        Palette::new(vec![
            RGB8::new(0, 0, 0),
            RGB8::new(255, 0, 0),
            RGB8::new(0, 0, 255),
            RGB8::new(255, 255, 255),
        ])
        .unwrap()
    }

    fn two_frames() -> Frameset {
        let mut set = Frameset::new(6, 4);
        set.palette = Some(three_color());
        let mut a = Frame::new(Image::indexed(6, 4, vec![1; 24]).unwrap());
        a.disposal = Disposal::RestoreToBackground;
        a.delay = 10;
        let mut b = Frame::new(Image::indexed(2, 2, vec![2, 0, 0, 2]).unwrap());
        b.x = 3;
        b.y = 1;
        b.delay = 20;
        let mut local = three_color();
        local.set_transparent(Some(0)).unwrap();
        b.palette = Some(local);
        set.frames = vec![a, b];
        set
    }

    #[test]
    fn frames_roundtrip_with_offsets_and_disposal() {
        let bytes = save_frames(&two_frames(), &Unstoppable).unwrap();
        let mut p = Progress::new(&Unstoppable, None);
        let set = load_frames(&bytes, &Limits::default(), &mut p).unwrap();
        assert_eq!((set.width, set.height, set.len()), (6, 4, 2));
        assert_eq!(set.frames[0].disposal, Disposal::RestoreToBackground);
        assert_eq!(set.frames[1].rect(), crate::animation::Rect::new(3, 1, 2, 2));
        assert_eq!(set.frames[1].delay, 20);
        assert_eq!(set.frames[1].palette.as_ref().and_then(Palette::transparent), Some(0));
        assert_eq!(
            set.frames[1].image.channel(Channel::Image),
            Some(&[2, 0, 0, 2][..])
        );
    }

    #[test]
    fn single_load_reports_more_frames() {
        let bytes = save_frames(&two_frames(), &Unstoppable).unwrap();
        let mut s = Settings::new(LoadMode::Image);
        let mut p = Progress::new(&Unstoppable, None);
        load(&bytes, &mut s, &Limits::default(), &mut p).unwrap();
        assert!(s.has_more_frames);
        assert_eq!(s.gif_delay, 10);
        assert_eq!(s.image.channel(Channel::Image), Some(&[1; 24][..]));
    }

    #[test]
    fn single_frame_roundtrip() {
        let mut palette = three_color();
        palette.set_transparent(Some(3)).unwrap();
        let indices: Vec<u8> = (0..20).map(|i| (i % 4) as u8).collect();
        let mut s = Settings::from_image(Image::indexed(5, 4, indices.clone()).unwrap(), palette.clone());
        s.gif_delay = 7;
        let bytes = save(&s, &Progress::new(&Unstoppable, None)).unwrap();
        let mut back = Settings::new(LoadMode::Image);
        let mut p = Progress::new(&Unstoppable, None);
        load(&bytes, &mut back, &Limits::default(), &mut p).unwrap();
        assert!(!back.has_more_frames);
        assert_eq!(back.gif_delay, 7);
        assert_eq!(back.palette, palette);
        assert_eq!(back.image.channel(Channel::Image), Some(&indices[..]));
    }

    #[test]
    fn rgb_is_refused() {
        let s = Settings::from_image(Image::rgb(1, 1, vec![0; 3]).unwrap(), Palette::default());
        assert!(matches!(
            save(&s, &Progress::new(&Unstoppable, None)),
            Err(CodecError::UnsupportedVariant(_))
        ));
    }
}
