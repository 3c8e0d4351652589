//! type タグ → デコーダーの静的レジストリ
//!
//! 新しいメッセージを追加するときは `Record` を実装し、
//! `PACKET_TYPES` に 1 行足して `Message` / `MessageKind` に列挙子を加える。

use realmtap_crypto::Direction;

use crate::data::Record;
use crate::error::DecodeError;
use crate::messages::{MovePacket, NewTickPacket, TextPacket};
use crate::reader::BufferReader;
use crate::{Message, MessageKind};

/// NewTick の type タグ
pub const NEWTICK: u8 = 10;
/// Text の type タグ
pub const TEXT: u8 = 44;
/// Move の type タグ
pub const MOVE: u8 = 62;

/// 1 種類のメッセージの登録情報
#[derive(Clone, Copy)]
pub struct PacketType {
    /// フレームヘッダーの type タグ
    pub tag: u8,
    pub kind: MessageKind,
    /// このメッセージが流れる方向
    pub direction: Direction,
    /// 平文ペイロードからのデコーダー
    decoder: fn(&mut BufferReader<'_>) -> Result<Message, DecodeError>,
}

impl PacketType {
    /// タグから登録情報を探す
    pub fn by_tag(tag: u8) -> Option<&'static PacketType> {
        PACKET_TYPES.iter().find(|p| p.tag == tag)
    }

    /// 種別から登録情報を探す（合成メッセージは `None`）
    pub fn by_kind(kind: MessageKind) -> Option<&'static PacketType> {
        PACKET_TYPES.iter().find(|p| p.kind == kind)
    }

    /// 登録されているすべての種別
    pub fn all() -> &'static [PacketType] {
        PACKET_TYPES
    }

    /// 平文ペイロードをデコードし、読み残しがないことを確認する
    pub fn decode(&self, plaintext: &[u8]) -> Result<Message, DecodeError> {
        let mut reader = BufferReader::new(plaintext);
        let message = (self.decoder)(&mut reader)?;
        reader.finish()?;
        Ok(message)
    }
}

impl core::fmt::Debug for PacketType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PacketType")
            .field("tag", &self.tag)
            .field("kind", &self.kind)
            .field("direction", &self.direction)
            .finish()
    }
}

static PACKET_TYPES: &[PacketType] = &[
    PacketType {
        tag: NEWTICK,
        kind: MessageKind::NewTick,
        direction: Direction::Incoming,
        decoder: |r| NewTickPacket::read(r).map(Message::NewTick),
    },
    PacketType {
        tag: TEXT,
        kind: MessageKind::Text,
        direction: Direction::Incoming,
        decoder: |r| TextPacket::read(r).map(Message::Text),
    },
    PacketType {
        tag: MOVE,
        kind: MessageKind::Move,
        direction: Direction::Outgoing,
        decoder: |r| MovePacket::read(r).map(Message::Move),
    },
];

/// type タグと平文ペイロードから型付きメッセージを作る
///
/// # エラー
/// - `DecodeError::UnknownType`: 未登録のタグ
/// - `DecodeError::TrailingOrMissingBytes`: 読み取り位置がペイロード長と一致しない
/// - `DecodeError::InvalidUtf8`: 文字列フィールドが不正
pub fn decode(tag: u8, plaintext: &[u8]) -> Result<Message, DecodeError> {
    PacketType::by_tag(tag)
        .ok_or(DecodeError::UnknownType(tag))?
        .decode(plaintext)
}

/// その方向で同期確認に使う tick 系メッセージのタグ
pub fn tick_tag(direction: Direction) -> u8 {
    match direction {
        Direction::Incoming => NEWTICK,
        Direction::Outgoing => MOVE,
    }
}
