use std::io::Cursor;

use oxipatch::bsdiff::ControlTriple;
use oxipatch::bsdiff::header::PatchHeader;
use oxipatch::bsdiff::offtin;
use oxipatch::compress::patcher::{patch_buffered, patch_streaming};
use oxipatch::compress::{PatchOptions, SegmentCodec};
use proptest::prelude::*;

fn qbsdiff(old: &[u8], new: &[u8]) -> Vec<u8> {
    let mut patch = Vec::new();
    qbsdiff::Bsdiff::new(old, new)
        .compare(Cursor::new(&mut patch))
        .unwrap();
    patch
}

fn streamed(old: &[u8], patch: &[u8], opts: &PatchOptions) -> Result<Vec<u8>, String> {
    let mut out = Vec::new();
    patch_streaming(Cursor::new(old), patch, &mut out, opts)
        .map(|_| out)
        .map_err(|e| e.to_string())
}

fn raw_patch(triples: &[ControlTriple], diff: &[u8], extra: &[u8], new_size: u64) -> Vec<u8> {
    let ctrl: Vec<u8> = triples.iter().flat_map(|t| t.encode()).collect();
    let mut out = PatchHeader {
        control_len: ctrl.len() as u64,
        diff_len: diff.len() as u64,
        new_size,
    }
    .to_bytes()
    .to_vec();
    out.extend_from_slice(&ctrl);
    out.extend_from_slice(diff);
    out.extend_from_slice(extra);
    out
}

fn raw_opts() -> PatchOptions {
    PatchOptions {
        codec: SegmentCodec::Raw,
        ..Default::default()
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_qbsdiff_roundtrip(
        old in proptest::collection::vec(any::<u8>(), 0..4096),
        new in proptest::collection::vec(any::<u8>(), 0..4096),
    ) {
        let patch = qbsdiff(&old, &new);
        let opts = PatchOptions::default();
        prop_assert_eq!(&patch_buffered(&old, &patch, &opts).unwrap(), &new);
        prop_assert_eq!(streamed(&old, &patch, &opts).unwrap(), new);
    }

    #[test]
    fn prop_small_edits_roundtrip(
        old in proptest::collection::vec(any::<u8>(), 64..8192),
        stride in 1usize..512,
        delta in 1u8..=255,
    ) {
        let mut new = old.clone();
        for i in (0..new.len()).step_by(stride) {
            new[i] = new[i].wrapping_add(delta);
        }
        let patch = qbsdiff(&old, &new);
        prop_assert_eq!(patch_buffered(&old, &patch, &PatchOptions::default()).unwrap(), new);
    }

    #[test]
    fn prop_strategies_agree_on_arbitrary_triples(
        old in proptest::collection::vec(any::<u8>(), 0..256),
        triples in proptest::collection::vec((0i64..64, 0i64..64, -300i64..300), 0..8),
        stream in proptest::collection::vec(any::<u8>(), 0..1024),
        slack in -8i64..8,
    ) {
        let triples: Vec<ControlTriple> =
            triples.into_iter().map(|(d, e, s)| ControlTriple::new(d, e, s)).collect();
        let diff_len: i64 = triples.iter().map(|t| t.diff).sum();
        let extra_len: i64 = triples.iter().map(|t| t.extra).sum();
        let new_size = (diff_len + extra_len + slack).max(0) as u64;

        let split = (diff_len as usize).min(stream.len());
        let patch = raw_patch(&triples, &stream[..split], &stream[split..], new_size);

        let buffered = patch_buffered(&old, &patch, &raw_opts()).map_err(|e| e.to_string());
        let streaming = streamed(&old, &patch, &raw_opts());
        match (&buffered, &streaming) {
            (Ok(b), Ok(s)) => {
                prop_assert_eq!(b, s);
                prop_assert_eq!(b.len() as u64, new_size);
            }
            (Err(b), Err(s)) => prop_assert_eq!(b, s),
            _ => prop_assert!(false, "buffered={buffered:?} streaming={streaming:?}"),
        }
    }

    #[test]
    fn prop_arbitrary_payload_never_panics(
        old in proptest::collection::vec(any::<u8>(), 0..128),
        payload in proptest::collection::vec(any::<u8>(), 0..512),
    ) {
        let _ = patch_buffered(&old, &payload, &PatchOptions::default());
        let _ = patch_buffered(&old, &payload, &raw_opts());
        let _ = streamed(&old, &payload, &raw_opts());
    }

    #[test]
    fn prop_offtin_roundtrip(value in (i64::MIN + 1)..=i64::MAX) {
        prop_assert_eq!(offtin::decode_i64(&offtin::encode_i64(value)), value);
    }
}
