#![no_main]
use libfuzzer_sys::fuzz_target;
use zenraster::{FramesetMode, Source, load_frameset};

fuzz_target!(|data: &[u8]| {
    // Raw and composited framesets must never panic
    let _ = load_frameset(Source::Memory(data), FramesetMode::Raw);
    let _ = load_frameset(
        Source::Memory(data),
        FramesetMode::Composited {
            skip_zero_delay: true,
        },
    );
});
