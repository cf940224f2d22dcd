#![no_main]
use libfuzzer_sys::fuzz_target;
use zenraster::*;

fuzz_target!(|data: &[u8]| {
    // If we can decode it, saving in the same lossless format and loading
    // again must produce identical pixels
    let Ok(decoded) = load(Source::Memory(data), LoadMode::Image, None) else {
        return;
    };
    let Some(format) = decoded.format else { return };
    if matches!(format, FormatId::Jpeg | FormatId::Gpl | FormatId::TxtPalette)
        || !format.can_save(&decoded)
    {
        return;
    }

    let Ok(encoded) = SaveRequest::new().encode(format, &decoded, enough::Unstoppable) else {
        return;
    };
    let Ok(again) = load(Source::Memory(&encoded), LoadMode::Image, None) else {
        panic!("re-encoded {} failed to decode", format.name());
    };

    assert_eq!(decoded.width(), again.width());
    assert_eq!(decoded.height(), again.height());
    let rgb = |s: &Settings| -> Vec<RGB8> {
        (0..s.image.pixel_count())
            .map(|i| s.image.rgb_at(&s.palette, i))
            .collect()
    };
    assert_eq!(rgb(&decoded), rgb(&again), "roundtrip pixel mismatch");
});
