//! Format detection and error reporting through the public API.

use std::path::Path;

use enough::Unstoppable;
use zenraster::*;

fn pcx_bytes() -> Vec<u8> {
    let s = Settings::from_image(
        Image::indexed(4, 2, vec![0, 1, 1, 0, 1, 0, 0, 1]).unwrap(),
        Palette::mono(),
    );
    SaveRequest::new()
        .encode(FormatId::Pcx, &s, Unstoppable)
        .unwrap()
}

fn bmp_bytes(w: u32, h: u32) -> Vec<u8> {
    let s = Settings::from_image(
        Image::rgb(w, h, vec![90; (w * h * 3) as usize]).unwrap(),
        Palette::default(),
    );
    SaveRequest::new()
        .encode(FormatId::Bmp, &s, Unstoppable)
        .unwrap()
}

#[test]
fn pcx_unless_the_name_says_tga() {
    let data = pcx_bytes();
    assert_eq!(data[0], 0x0A);
    assert!(data[1] <= 5);
    assert_eq!(data[2], 1);
    assert_eq!(detect(&data, None), Some(FormatId::Pcx));
    assert_eq!(detect(&data, Some(Path::new("a.pcx"))), Some(FormatId::Pcx));
    assert_eq!(detect(&data, Some(Path::new("a.tga"))), Some(FormatId::Tga));

    let s = load(Source::Memory(&data), LoadMode::Image, None).unwrap();
    assert_eq!(s.format, Some(FormatId::Pcx));
}

#[test]
fn strong_signatures_beat_the_extension() {
    let data = bmp_bytes(2, 2);
    assert_eq!(detect(&data, Some(Path::new("a.tga"))), Some(FormatId::Bmp));
}

#[test]
fn forced_format_skips_detection() {
    let data = pcx_bytes();
    let err = LoadRequest::new(Source::Memory(&data))
        .with_format(FormatId::Bmp)
        .load(Unstoppable)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Format);
}

#[test]
fn truncated_pixels() {
    let data = bmp_bytes(8, 8);
    let err = load(Source::Memory(&data[..data.len() - 40]), LoadMode::Image, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TruncatedStream);
}

#[test]
fn pixel_limit() {
    let data = bmp_bytes(8, 8);
    let limits = Limits {
        max_pixels: Some(63),
        ..Limits::default()
    };
    let err = LoadRequest::new(Source::Memory(&data))
        .with_limits(limits)
        .load(Unstoppable)
        .unwrap_err();
    assert!(matches!(err, CodecError::LimitExceeded(_)));
}

#[test]
fn missing_file_is_io() {
    let err = load(
        Source::Path(Path::new("/nonexistent/zenraster/none.bmp")),
        LoadMode::Image,
        None,
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
}

#[test]
fn registry_covers_every_extension() {
    for info in REGISTRY.iter().filter(|f| f.caps.load || f.caps.save) {
        assert_eq!(FormatId::from_extension(info.id.extension()), Some(info.id));
    }
}
