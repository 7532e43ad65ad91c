#![no_main]
use libfuzzer_sys::fuzz_target;
use oxipatch::bsdiff::{ControlReader, PatchHeader};

fuzz_target!(|data: &[u8]| {
    // A parsed header must survive re-encoding and locate segments
    // inside the payload.
    if let Ok(header) = PatchHeader::parse(data) {
        assert_eq!(PatchHeader::parse(&header.to_bytes()), Ok(header));
        if let Ok(segments) = header.segments(data.len()) {
            assert!(segments.extra.end == data.len());
            assert!(segments.control.end <= segments.diff.start);
        }
    }

    // Control decoding over raw bytes stops cleanly or errors.
    for triple in ControlReader::new(data) {
        if triple.is_err() {
            break;
        }
    }
});
