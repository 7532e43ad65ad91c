#![no_main]
use std::io::Cursor;

use libfuzzer_sys::fuzz_target;
use oxipatch::compress::patcher::{patch_buffered, patch_streaming};
use oxipatch::compress::{PatchOptions, SegmentCodec};

fuzz_target!(|data: &[u8]| {
    // Patching must never panic, only return errors, and both strategies
    // must agree on the outcome.
    if data.len() < 2 {
        return;
    }
    let rest = &data[1..];
    let (old, patch) = rest.split_at((data[0] as usize).min(rest.len()));

    for codec in [SegmentCodec::Raw, SegmentCodec::Bzip2] {
        let opts = PatchOptions {
            codec,
            ..Default::default()
        };
        let buffered = patch_buffered(old, patch, &opts);
        let mut streamed = Vec::new();
        let streaming = patch_streaming(Cursor::new(old), patch, &mut streamed, &opts);
        match (buffered, streaming) {
            (Ok(b), Ok(_)) => assert_eq!(b, streamed),
            (Err(_), Err(_)) => {}
            (b, s) => panic!("strategies disagree: {b:?} vs {s:?}"),
        }
    }
});
