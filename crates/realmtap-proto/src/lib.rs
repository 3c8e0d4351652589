//! # realmtap-proto
//!
//! RotMG のアプリケーションフレームと型付きメッセージ。
//!
//! ## 構成
//!
//! - `frame`: `[length: u32 BE][type: u8][payload]` のフレーム
//! - `reader` / `writer`: ビッグエンディアンのフィールドと圧縮整数
//! - `data` / `messages`: 各レコードとメッセージ（自分自身を読み書きする）
//! - `registry`: type タグ → デコーダーの静的テーブルと `decode()`
//!
//! デコード失敗はすべて `DecodeError` で返し、ログは出さない。

#![no_std]
extern crate alloc;

pub mod data;
pub mod error;
pub mod frame;
pub mod messages;
pub mod reader;
pub mod registry;
pub mod writer;

use serde::Serialize;

pub use data::{MoveRecord, ObjectStatusData, Record, StatData, StatValue, WorldPosData};
pub use error::DecodeError;
pub use frame::Frame;
pub use messages::{MovePacket, NewTickPacket, ServerAddress, TextPacket};
pub use reader::BufferReader;
pub use registry::{decode, tick_tag, PacketType, MOVE, NEWTICK, TEXT};
pub use writer::BufferWriter;

/// メッセージ種別（購読のキー）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum MessageKind {
    NewTick,
    Move,
    Text,
    /// 合成メッセージ（ワイヤ上のタグを持たない）
    ServerAddress,
}

impl MessageKind {
    /// 表示名
    pub fn name(&self) -> &'static str {
        match self {
            MessageKind::NewTick => "NewTick",
            MessageKind::Move => "Move",
            MessageKind::Text => "Text",
            MessageKind::ServerAddress => "ServerAddress",
        }
    }
}

impl core::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// デコード済みメッセージ
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "body")]
pub enum Message {
    NewTick(NewTickPacket),
    Move(MovePacket),
    Text(TextPacket),
    ServerAddress(ServerAddress),
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::NewTick(_) => MessageKind::NewTick,
            Message::Move(_) => MessageKind::Move,
            Message::Text(_) => MessageKind::Text,
            Message::ServerAddress(_) => MessageKind::ServerAddress,
        }
    }

    /// ワイヤ上の type タグ（合成メッセージは `None`）
    pub fn tag(&self) -> Option<u8> {
        PacketType::by_kind(self.kind()).map(|p| p.tag)
    }

    /// ペイロードにエンコードしてフレームにする（合成メッセージは `None`）
    pub fn to_frame(&self) -> Option<Frame> {
        let tag = self.tag()?;
        let mut writer = BufferWriter::new();
        match self {
            Message::NewTick(m) => m.write(&mut writer),
            Message::Move(m) => m.write(&mut writer),
            Message::Text(m) => m.write(&mut writer),
            Message::ServerAddress(_) => return None,
        }
        Some(writer.into_frame(tag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_to_frame_decodes_back() {
        let message = Message::Move(MovePacket {
            tick_id: 8,
            time: 1_234,
            records: alloc::vec![MoveRecord {
                time: 1_200,
                pos: WorldPosData { x: 3.0, y: 4.0 },
            }],
        });
        let frame = message.to_frame().unwrap();
        assert_eq!(frame.tag, MOVE);
        assert_eq!(decode(frame.tag, &frame.payload).unwrap(), message);
    }

    #[test]
    fn test_synthetic_message_has_no_frame() {
        let message = Message::ServerAddress(ServerAddress::new([127, 0, 0, 1]));
        assert_eq!(message.kind(), MessageKind::ServerAddress);
        assert_eq!(message.tag(), None);
        assert!(message.to_frame().is_none());
    }
}
