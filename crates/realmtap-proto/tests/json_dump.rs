//! デコード済みメッセージの JSON ダンプ

use realmtap_proto::{
    decode, Message, NewTickPacket, ObjectStatusData, ServerAddress, StatData, StatValue,
    WorldPosData,
};
use serde_json::json;

#[test]
fn test_decoded_tick_dumps_as_tagged_json() {
    let original = Message::NewTick(NewTickPacket {
        tick_id: 7,
        tick_time: 200,
        server_real_time_ms: 123_456,
        server_last_rtt: 42,
        statuses: vec![ObjectStatusData {
            object_id: 300,
            pos: WorldPosData { x: 1.5, y: -2.0 },
            stats: vec![
                StatData {
                    stat_type: 0,
                    value: StatValue::Int(100),
                    value_two: -1,
                },
                StatData {
                    stat_type: 31,
                    value: StatValue::Text("Hero".to_string()),
                    value_two: -1,
                },
            ],
        }],
    });

    let frame = original.to_frame().unwrap();
    let decoded = decode(frame.tag, &frame.payload).unwrap();
    assert_eq!(decoded, original);

    let dumped = serde_json::to_value(&decoded).unwrap();
    assert_eq!(
        dumped,
        json!({
            "kind": "NewTick",
            "body": {
                "tick_id": 7,
                "tick_time": 200,
                "server_real_time_ms": 123456,
                "server_last_rtt": 42,
                "statuses": [{
                    "object_id": 300,
                    "pos": { "x": 1.5, "y": -2.0 },
                    "stats": [
                        { "stat_type": 0, "value": 100, "value_two": -1 },
                        { "stat_type": 31, "value": "Hero", "value_two": -1 }
                    ]
                }]
            }
        })
    );
}

#[test]
fn test_synthetic_message_dumps_without_wire_tag() {
    let message = Message::ServerAddress(ServerAddress::new([52, 1, 2, 3]));
    assert!(message.to_frame().is_none());

    let dumped = serde_json::to_string(&message).unwrap();
    assert_eq!(dumped, r#"{"kind":"ServerAddress","body":{"octets":[52,1,2,3]}}"#);
}
