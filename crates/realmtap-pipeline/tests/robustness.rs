//! 無関係・壊れたトラフィックでパイプラインが止まらない

use proptest::prelude::*;
use realmtap_pipeline::{Flow, Pipeline, PipelineConfig};
use realmtap_transport::{RawFrame, TcpFlags, TcpSegment};

fn config() -> PipelineConfig {
    PipelineConfig {
        search_size: 1_000,
        ..PipelineConfig::default()
    }
}

#[test]
fn prop_arbitrary_frames_are_tolerated() {
    proptest!(|(frames in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..200), 0..50))| {
        let mut pipeline = Pipeline::new(config()).unwrap();
        for (i, data) in frames.into_iter().enumerate() {
            prop_assert_eq!(pipeline.process_raw(&RawFrame::new(data, i as u64)), Flow::Continue);
        }
    });
}

#[test]
fn prop_in_order_game_payloads_never_halt() {
    proptest!(|(chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 1..300), 1..40))| {
        let mut pipeline = Pipeline::new(config()).unwrap();
        let mut seq = 7_000u32;
        for (i, payload) in chunks.into_iter().enumerate() {
            let len = payload.len() as u32;
            let segment = TcpSegment {
                src_addr: [52, 0, 0, 1],
                dst_addr: [10, 0, 0, 2],
                ip_id: i as u16,
                src_port: 2050,
                dst_port: 40_000,
                sequence: seq,
                acknowledgment: 0,
                flags: TcpFlags(TcpFlags::ACK),
                payload,
            };
            seq = seq.wrapping_add(len);
            prop_assert_eq!(pipeline.process_raw(&RawFrame::new(segment.to_ethernet(), 0)), Flow::Continue);
        }
        prop_assert_eq!(pipeline.direction(realmtap_crypto::Direction::Incoming).backlog(), 0);
    });
}
