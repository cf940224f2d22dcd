//! Animated GIF through the public API: frameset save and load, the
//! compositor, playback and explode.

#![cfg(feature = "gif")]

use enough::Unstoppable;
use zenraster::*;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn palette() -> Palette {
    let mut p = Palette::new(vec![
        RGB8::new(0, 0, 0),
        RGB8::new(255, 0, 0),
        RGB8::new(0, 255, 0),
        RGB8::new(0, 0, 255),
    ])
    .unwrap();
    p.set_transparent(Some(3)).unwrap();
    p
}

fn solid(x: u32, y: u32, w: u32, h: u32, index: u8, disposal: Disposal) -> Frame {
    let mut f = Frame::new(Image::indexed(w, h, vec![index; (w * h) as usize]).unwrap());
    f.x = x;
    f.y = y;
    f.disposal = disposal;
    f.delay = 10;
    f
}

/// Opaque red canvas that clears to background, a black box on top, then
/// a fully transparent canvas-sized frame.
fn clearing_animation() -> Vec<u8> {
    init();
    let mut set = Frameset::new(10, 10);
    set.palette = Some(palette());
    set.frames = vec![
        solid(0, 0, 10, 10, 1, Disposal::RestoreToBackground),
        solid(2, 2, 5, 5, 0, Disposal::Leave),
        solid(0, 0, 10, 10, 3, Disposal::Leave),
    ];
    let mut bytes = Vec::new();
    save_frameset(Destination::Memory(&mut bytes), &set, Unstoppable).unwrap();
    bytes
}

fn rgba_at(frame: &Frame, shared: Option<&Palette>, x: u32, y: u32) -> [u8; 4] {
    let rgba = frame.to_rgba(shared);
    let o = (y * frame.image.width() + x) as usize * 4;
    [rgba[o], rgba[o + 1], rgba[o + 2], rgba[o + 3]]
}

#[test]
fn raw_frames_keep_their_offsets() {
    let bytes = clearing_animation();
    let raw = load_frameset(Source::Memory(&bytes), FramesetMode::Raw).unwrap();
    assert_eq!((raw.width, raw.height, raw.len()), (10, 10, 3));
    assert_eq!(raw.frames[0].disposal, Disposal::RestoreToBackground);
    assert_eq!(raw.frames[1].rect(), Rect::new(2, 2, 5, 5));

    let single = load(Source::Memory(&bytes), LoadMode::Image, None).unwrap();
    assert!(single.has_more_frames);
    assert_eq!(single.gif_delay, 10);
}

#[test]
fn restore_to_background_reaches_the_frame_after_next() {
    let bytes = clearing_animation();
    let set = load_frameset(
        Source::Memory(&bytes),
        FramesetMode::Composited {
            skip_zero_delay: false,
        },
    )
    .unwrap();
    assert_eq!(set.len(), 3);
    let shared = set.palette.as_ref();
    for f in &set.frames {
        assert_eq!(f.rect(), set.canvas());
    }

    let step_b = &set.frames[1];
    assert_eq!(rgba_at(step_b, shared, 0, 0), [255, 0, 0, 255]);
    assert_eq!(rgba_at(step_b, shared, 2, 2), [0, 0, 0, 255]);
    assert_eq!(rgba_at(step_b, shared, 6, 6), [0, 0, 0, 255]);
    assert_eq!(rgba_at(step_b, shared, 9, 9), [255, 0, 0, 255]);

    let step_c = &set.frames[2];
    assert!(step_c.to_rgba(shared).chunks_exact(4).all(|p| p[3] == 0));
}

#[test]
fn compositing_is_repeatable() {
    let bytes = clearing_animation();
    let mode = FramesetMode::Composited {
        skip_zero_delay: false,
    };
    let a = load_frameset(Source::Memory(&bytes), mode).unwrap();
    let b = load_frameset(Source::Memory(&bytes), mode).unwrap();
    assert_eq!(a, b);
}

#[test]
fn playback_walks_every_frame_once() {
    let bytes = clearing_animation();
    let set = load_frameset(Source::Memory(&bytes), FramesetMode::default()).unwrap();
    let mut play = Playback::new(&set, false);
    let mut seen = Vec::new();
    while let Some(frame) = play.advance() {
        assert_eq!(frame.rgba.len(), 10 * 10 * 4);
        seen.push((frame.index, frame.delay));
    }
    assert_eq!(seen, vec![(0, 10), (1, 10), (2, 10)]);
    assert!(play.previous().is_some());
}

#[test]
fn explode_writes_numbered_files() {
    let dir = tempfile::tempdir().unwrap();
    let bytes = clearing_animation();
    let report = ExplodeRequest::new(Source::Memory(&bytes), dir.path(), FormatId::Gif)
        .with_basename("anim")
        .explode(Unstoppable)
        .unwrap();
    assert_eq!(report.fallbacks, 0);
    let names: Vec<_> = report
        .written
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, ["anim.000.gif", "anim.001.gif", "anim.002.gif"]);

    let second = load(Source::Path(&report.written[1]), LoadMode::Image, None).unwrap();
    assert_eq!((second.width(), second.height()), (10, 10));
    assert_eq!(second.gif_delay, 10);
}

#[cfg(feature = "png")]
#[test]
fn explode_falls_back_to_png() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("clip.gif");
    std::fs::write(&src, clearing_animation()).unwrap();

    let report = explode_frames(Source::Path(&src), dir.path(), FormatId::Pbm, Unstoppable).unwrap();
    assert_eq!(report.fallbacks, 3);
    assert!(report.written[0].ends_with("clip.000.png"));
    assert!(report.written.iter().all(|p| p.exists()));
}

#[test]
fn still_images_have_no_frameset() {
    let s = Settings::from_image(Image::rgb(1, 1, vec![1, 2, 3]).unwrap(), Palette::default());
    let bytes = SaveRequest::new()
        .encode(FormatId::Bmp, &s, Unstoppable)
        .unwrap();
    let err = load_frameset(Source::Memory(&bytes), FramesetMode::Raw).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedVariant);
}
