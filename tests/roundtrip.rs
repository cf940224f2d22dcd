use enough::Unstoppable;
use zenraster::*;

fn palette(colors: &[(u8, u8, u8)]) -> Palette {
    Palette::new(colors.iter().map(|&(r, g, b)| RGB8::new(r, g, b)).collect()).unwrap()
}

fn indexed(w: u32, h: u32, indices: Vec<u8>, colors: &[(u8, u8, u8)]) -> Settings {
    Settings::from_image(Image::indexed(w, h, indices).unwrap(), palette(colors))
}

fn rgb(w: u32, h: u32) -> Settings {
    let mut pixels = Vec::new();
    for y in 0..h {
        for x in 0..w {
            pixels.extend_from_slice(&[(x * 40) as u8, (y * 60) as u8, ((x + y) * 17) as u8]);
        }
    }
    Settings::from_image(Image::rgb(w, h, pixels).unwrap(), Palette::default())
}

/// Every pixel as RGB, whatever the storage.
fn colors(s: &Settings) -> Vec<RGB8> {
    (0..s.image.pixel_count())
        .map(|i| s.image.rgb_at(&s.palette, i))
        .collect()
}

fn through(format: FormatId, settings: &Settings) -> Settings {
    let bytes = SaveRequest::new()
        .encode(format, settings, Unstoppable)
        .unwrap();
    let back = load(Source::Memory(&bytes), LoadMode::Image, None).unwrap();
    assert_eq!(back.format, Some(format), "{} not detected", format.name());
    assert_eq!((back.width(), back.height()), (settings.width(), settings.height()));
    back
}

const EIGHT: [(u8, u8, u8); 9] = [
    (0, 0, 0),
    (255, 0, 0),
    (0, 255, 0),
    (0, 0, 255),
    (255, 255, 0),
    (255, 0, 255),
    (0, 255, 255),
    (128, 128, 128),
    (255, 255, 255),
];

// ── Hand-written codecs ──────────────────────────────────────────────

#[test]
fn bmp_rle8_runs_and_literals() {
    let mut rows = vec![5u8; 8];
    rows.extend(1..=8);
    let mut s = indexed(8, 2, rows.clone(), &EIGHT);
    s.bmp_rle = true;
    let bytes = SaveRequest::new()
        .encode(FormatId::Bmp, &s, Unstoppable)
        .unwrap();
    assert!(bytes.windows(2).any(|w| w == [0x08, 0x05]));
    assert!(bytes.windows(10).any(|w| w == [0, 8, 1, 2, 3, 4, 5, 6, 7, 8]));

    let back = load(Source::Memory(&bytes), LoadMode::Image, None).unwrap();
    assert_eq!(back.bpp(), 1);
    assert_eq!(back.image.channel(Channel::Image), Some(&rows[..]));
    assert!(!back.image.has(Channel::Alpha));
}

#[test]
fn bmp_rgb() {
    let s = rgb(7, 5);
    assert_eq!(colors(&through(FormatId::Bmp, &s)), colors(&s));
}

#[test]
fn pnm_picks_its_variant_from_the_image() {
    let s = rgb(3, 3);
    let back = through(FormatId::Ppm, &s);
    assert_eq!(back.image.channel(Channel::Image), s.image.channel(Channel::Image));

    let gray = Settings::from_image(
        Image::indexed(4, 1, vec![0, 85, 170, 255]).unwrap(),
        Palette::grayscale(256),
    );
    let bytes = SaveRequest::new()
        .encode(FormatId::Ppm, &gray, Unstoppable)
        .unwrap();
    assert!(bytes.starts_with(b"P5"));
}

#[test]
fn tga_raw_and_rle() {
    let mut s = rgb(9, 4);
    assert_eq!(colors(&through(FormatId::Tga, &s)), colors(&s));
    s.tga_rle = true;
    assert_eq!(colors(&through(FormatId::Tga, &s)), colors(&s));

    let mut idx = indexed(4, 2, vec![0, 1, 2, 3, 3, 2, 1, 0], &EIGHT[..4]);
    idx.palette.set_transparent(Some(0)).unwrap();
    let back = through(FormatId::Tga, &idx);
    assert_eq!(back.image.channel(Channel::Image), idx.image.channel(Channel::Image));
    assert_eq!(back.palette.transparent(), Some(0));
}

#[test]
fn pcx_indexed_and_rgb() {
    let idx = indexed(5, 3, (0..15).map(|i| (i % 9) as u8).collect(), &EIGHT);
    assert_eq!(colors(&through(FormatId::Pcx, &idx)), colors(&idx));

    let s = rgb(6, 2);
    let back = through(FormatId::Pcx, &s);
    assert_eq!(back.bpp(), 3);
    assert_eq!(colors(&back), colors(&s));
}

#[test]
fn lss16_keeps_six_bit_colors() {
    let s = indexed(
        20,
        2,
        (0..40).map(|i| (i / 7) as u8 % 2).collect(),
        &[(0, 0, 0), (255, 255, 255)],
    );
    let back = through(FormatId::Lss16, &s);
    assert_eq!(colors(&back), colors(&s));
}

#[test]
fn xpm_with_transparency() {
    let mut s = indexed(3, 2, vec![0, 1, 2, 2, 1, 0], &EIGHT[..3]);
    s.palette.set_transparent(Some(2)).unwrap();
    let back = through(FormatId::Xpm, &s);
    assert_eq!(back.image.channel(Channel::Image), s.image.channel(Channel::Image));
    assert_eq!(back.palette.transparent(), Some(2));
}

#[test]
fn xbm_keeps_bits_and_hotspot() {
    let bits: Vec<u8> = (0..30).map(|i| u8::from(i % 3 == 0)).collect();
    let mut s = Settings::from_image(Image::indexed(10, 3, bits.clone()).unwrap(), Palette::paper_ink());
    s.hotspot = Some((4, 1));
    let back = through(FormatId::Xbm, &s);
    assert_eq!(back.image.channel(Channel::Image), Some(&bits[..]));
    assert_eq!(back.hotspot, Some((4, 1)));
}

#[test]
fn palette_files() {
    let s = indexed(1, 1, vec![0], &EIGHT[..5]);
    for format in [FormatId::Gpl, FormatId::TxtPalette] {
        let bytes = SaveRequest::new().encode(format, &s, Unstoppable).unwrap();
        let back = load(Source::Memory(&bytes), LoadMode::Palette, None).unwrap();
        assert_eq!(back.format, Some(format));
        assert_eq!(back.palette.colors(), s.palette.colors());
    }
}

// ── Library-backed codecs ────────────────────────────────────────────

#[cfg(feature = "png")]
#[test]
fn png_indexed_and_rgba() {
    let mut idx = indexed(4, 4, (0..16).map(|i| (i % 9) as u8).collect(), &EIGHT);
    idx.palette.set_transparent(Some(8)).unwrap();
    let back = through(FormatId::Png, &idx);
    assert_eq!(back.image.channel(Channel::Image), idx.image.channel(Channel::Image));
    assert_eq!(back.palette.transparent(), Some(8));

    let mut s = rgb(3, 2);
    s.image
        .set_channel(Channel::Alpha, vec![0, 50, 100, 150, 200, 255])
        .unwrap();
    let back = through(FormatId::Png, &s);
    assert_eq!(colors(&back), colors(&s));
    assert_eq!(back.image.channel(Channel::Alpha), s.image.channel(Channel::Alpha));
}

#[cfg(feature = "gif")]
#[test]
fn gif_indexed() {
    let mut s = indexed(7, 3, (0..21).map(|i| (i % 9) as u8).collect(), &EIGHT);
    s.gif_delay = 12;
    let back = through(FormatId::Gif, &s);
    assert_eq!(back.image.channel(Channel::Image), s.image.channel(Channel::Image));
    assert_eq!(back.gif_delay, 12);
    assert!(!back.has_more_frames);
}

#[cfg(feature = "tiff")]
#[test]
fn tiff_rgb() {
    let s = rgb(5, 5);
    assert_eq!(colors(&through(FormatId::Tiff, &s)), colors(&s));
}

#[cfg(feature = "jpeg")]
#[test]
fn jpeg_is_close() {
    let flat = Settings::from_image(
        Image::rgb(16, 16, [200u8, 100, 50].repeat(256)).unwrap(),
        Palette::default(),
    );
    let back = through(FormatId::Jpeg, &flat);
    assert_eq!(back.bpp(), 3);
    for c in colors(&back) {
        assert!(c.r.abs_diff(200) < 8 && c.g.abs_diff(100) < 8 && c.b.abs_diff(50) < 8);
    }
}

// ── Every save-capable format ────────────────────────────────────────

/// Formats that save indexed images, with the largest palette each takes.
fn indexed_formats() -> Vec<(FormatId, usize)> {
    let mut v = vec![
        (FormatId::Bmp, 256),
        (FormatId::Pcx, 256),
        (FormatId::Tga, 256),
        (FormatId::Xpm, 256),
        // Two-color images go out as PBM, which keeps only black and white.
        (FormatId::Ppm, 256),
        (FormatId::Lss16, 16),
    ];
    #[cfg(feature = "png")]
    v.push((FormatId::Png, 256));
    #[cfg(feature = "gif")]
    v.push((FormatId::Gif, 256));
    #[cfg(feature = "tiff")]
    v.push((FormatId::Tiff, 256));
    v
}

/// Formats that save an alpha channel.
fn alpha_formats() -> Vec<FormatId> {
    let mut v = vec![FormatId::Bmp, FormatId::Tga, FormatId::Pam];
    #[cfg(feature = "png")]
    v.push(FormatId::Png);
    #[cfg(feature = "tiff")]
    v.push(FormatId::Tiff);
    v
}

/// Formats that keep a transparent palette index.
fn keyed_formats() -> Vec<FormatId> {
    let mut v = vec![FormatId::Tga, FormatId::Xpm];
    #[cfg(feature = "png")]
    v.push(FormatId::Png);
    #[cfg(feature = "gif")]
    v.push(FormatId::Gif);
    v
}

/// Six-bit exact, so LSS16 keeps every entry unchanged.
fn six(k: usize) -> u8 {
    let k = (k & 63) as u8;
    (k << 2) | (k >> 4)
}

/// `n` distinct colors, none of them gray apart from entry 0.
fn sweep_palette(n: usize) -> Palette {
    Palette::new(
        (0..n)
            .map(|i| RGB8::new(six(i), six(i / 64 * 21), six(i * 5)))
            .collect(),
    )
    .unwrap()
}

#[test]
fn every_palette_size_survives() {
    for n in 2..=256 {
        let palette = sweep_palette(n);
        let indices: Vec<u8> = (0..256).map(|i| (i % n) as u8).collect();
        let s = Settings::from_image(Image::indexed(16, 16, indices).unwrap(), palette.clone());
        for (format, max) in indexed_formats() {
            if n > max || (format == FormatId::Ppm && n == 2) {
                continue;
            }
            let back = through(format, &s);
            assert_eq!(colors(&back), colors(&s), "{} with {n} colors", format.name());
            // GIF pads to a power of two, PCX to 256 and LSS16 to 16;
            // the used entries come first and unchanged.
            if back.bpp() == 1 {
                assert!(back.palette.len() >= n, "{} with {n} colors", format.name());
                assert_eq!(
                    &back.palette.colors()[..n],
                    palette.colors(),
                    "{} with {n} colors",
                    format.name()
                );
            }
        }
    }
}

#[test]
fn transparent_and_opaque_alpha_regions_survive() {
    for alpha in [vec![0, 0, 0, 0, 255, 255, 255, 255], vec![0; 8]] {
        let mut s = rgb(4, 2);
        s.image.set_channel(Channel::Alpha, alpha.clone()).unwrap();
        for format in alpha_formats() {
            let back = through(format, &s);
            assert_eq!(colors(&back), colors(&s), "{}", format.name());
            assert_eq!(
                back.image.channel(Channel::Alpha),
                Some(&alpha[..]),
                "{}",
                format.name()
            );
        }
    }
}

#[test]
fn opaque_alpha_is_not_kept() {
    let mut s = rgb(4, 2);
    s.image.set_channel(Channel::Alpha, vec![255; 8]).unwrap();
    for format in alpha_formats() {
        let back = through(format, &s);
        assert!(!back.image.has(Channel::Alpha), "{}", format.name());
    }
}

#[test]
fn transparent_index_survives() {
    let indices = vec![3, 3, 0, 1, 3, 3, 2, 1];
    let mut s = indexed(4, 2, indices.clone(), &EIGHT[..5]);
    s.palette.set_transparent(Some(3)).unwrap();
    for format in keyed_formats() {
        let back = through(format, &s);
        assert_eq!(back.image.channel(Channel::Image), Some(&indices[..]), "{}", format.name());
        assert_eq!(back.palette.transparent(), Some(3), "{}", format.name());
        assert!(!back.image.has(Channel::Alpha), "{}", format.name());
    }
}

#[test]
fn clipboard_loads_the_whole_group_opaque() {
    let s = indexed(2, 1, vec![0, 1], &EIGHT[..3]);
    for (format, _) in indexed_formats() {
        let bytes = SaveRequest::new().encode(format, &s, Unstoppable).unwrap();
        let back = load(Source::Memory(&bytes), LoadMode::Clipboard, None).unwrap();
        for channel in [Channel::Alpha, Channel::Selection, Channel::Mask] {
            assert_eq!(
                back.image.channel(channel),
                Some(&[255u8, 255][..]),
                "{} {channel:?}",
                format.name()
            );
        }
    }
}

// ── Files ────────────────────────────────────────────────────────────

#[test]
fn extension_picks_the_save_format() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("picture.tga");
    let s = rgb(4, 4);
    save(Destination::Path(&path), &s).unwrap();

    let back = load(Source::Path(&path), LoadMode::Image, None).unwrap();
    assert_eq!(back.format, Some(FormatId::Tga));
    assert_eq!(colors(&back), colors(&s));

    // Saving again without an extension falls back to the loaded format.
    let mut buf = Vec::new();
    save(Destination::Memory(&mut buf), &back).unwrap();
    assert_eq!(buf.len(), std::fs::read(&path).unwrap().len());
}

#[test]
fn progress_reaches_the_last_row() {
    let s = rgb(8, 40);
    let last = std::cell::Cell::new((0, 0));
    let report = |done: u32, total: u32| last.set((done, total));
    SaveRequest::new()
        .with_progress(&report)
        .encode(FormatId::Bmp, &s, Unstoppable)
        .unwrap();
    assert_eq!(last.get(), (40, 40));
}
