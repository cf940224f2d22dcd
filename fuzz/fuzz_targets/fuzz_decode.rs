#![no_main]
use libfuzzer_sys::fuzz_target;
use zenraster::{FormatId, LoadMode, LoadRequest, REGISTRY, Source};

fuzz_target!(|data: &[u8]| {
    // Auto-detect, then every loadable format forced; must never panic
    let _ = zenraster::load(Source::Memory(data), LoadMode::Image, None);
    let _ = zenraster::load(Source::Memory(data), LoadMode::Palette, None);

    for info in REGISTRY.iter().filter(|f| f.caps.load) {
        let _ = LoadRequest::new(Source::Memory(data))
            .with_format(info.id)
            .load(enough::Unstoppable);
    }
    let _ = zenraster::detect(data, Some(std::path::Path::new("x.tga")))
        .map(FormatId::name);
});
