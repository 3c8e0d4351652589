//! フレーム切り出しはチャンク境界に依存しない

use proptest::prelude::*;
use realmtap_proto::Frame;
use realmtap_stream::FrameExtractor;

fn frames_strategy() -> impl Strategy<Value = Vec<Frame>> {
    prop::collection::vec(
        (any::<u8>(), prop::collection::vec(any::<u8>(), 0..300))
            .prop_map(|(tag, payload)| Frame::new(tag, payload)),
        1..20,
    )
}

#[test]
fn prop_chunk_boundaries_do_not_matter() {
    proptest!(|(frames in frames_strategy(), cuts in prop::collection::vec(1usize..200, 0..50))| {
        let stream: Vec<u8> = frames.iter().flat_map(|f| f.to_bytes()).collect();

        let mut extractor = FrameExtractor::aligned(Frame::MAX_FRAME_LEN);
        let mut out = Vec::new();
        let mut rest = stream.as_slice();
        for cut in cuts {
            let (chunk, tail) = rest.split_at(cut.min(rest.len()));
            out.extend(extractor.push(chunk));
            rest = tail;
        }
        out.extend(extractor.push(rest));

        prop_assert_eq!(out, frames);
        prop_assert_eq!(extractor.buffered(), 0);
    });
}
