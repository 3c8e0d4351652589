//! 型付きメッセージ
//!
//! 各メッセージはフレームの平文ペイロードから自分自身を読み出す（`Record`）。

use alloc::string::String;
use alloc::vec::Vec;

use serde::Serialize;

use crate::data::{read_short_list, write_short_list, MoveRecord, ObjectStatusData, Record};
use crate::error::DecodeError;
use crate::reader::BufferReader;
use crate::writer::BufferWriter;

/// サーバー → クライアントの tick 更新
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewTickPacket {
    /// 1 ずつ増える tick 番号
    pub tick_id: i32,
    /// 前回 tick からの経過時間 (ms)
    pub tick_time: i32,
    /// サーバー時刻 (ms)
    pub server_real_time_ms: u32,
    /// 直近の RTT (ms)
    pub server_last_rtt: u16,
    pub statuses: Vec<ObjectStatusData>,
}

impl Record for NewTickPacket {
    fn read(reader: &mut BufferReader<'_>) -> Result<Self, DecodeError> {
        Ok(NewTickPacket {
            tick_id: reader.read_i32()?,
            tick_time: reader.read_i32()?,
            server_real_time_ms: reader.read_u32()?,
            server_last_rtt: reader.read_u16()?,
            statuses: read_short_list(reader)?,
        })
    }

    fn write(&self, writer: &mut BufferWriter) {
        writer
            .write_i32(self.tick_id)
            .write_i32(self.tick_time)
            .write_u32(self.server_real_time_ms)
            .write_u16(self.server_last_rtt);
        write_short_list(writer, &self.statuses);
    }
}

/// クライアント → サーバーの移動通知
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MovePacket {
    /// 応答対象の tick 番号
    pub tick_id: i32,
    /// クライアント時刻 (ms)
    pub time: i32,
    pub records: Vec<MoveRecord>,
}

impl Record for MovePacket {
    fn read(reader: &mut BufferReader<'_>) -> Result<Self, DecodeError> {
        Ok(MovePacket {
            tick_id: reader.read_i32()?,
            time: reader.read_i32()?,
            records: read_short_list(reader)?,
        })
    }

    fn write(&self, writer: &mut BufferWriter) {
        writer.write_i32(self.tick_id).write_i32(self.time);
        write_short_list(writer, &self.records);
    }
}

/// チャット（サーバー → クライアント）
///
/// 先頭の送信者名は既知平文アライメントの探索対象になる。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextPacket {
    pub name: String,
    pub object_id: i32,
    pub num_stars: i16,
    pub bubble_time: u8,
    pub recipient: String,
    pub text: String,
    pub clean_text: String,
    pub is_supporter: bool,
    pub star_background: i32,
}

impl Record for TextPacket {
    fn read(reader: &mut BufferReader<'_>) -> Result<Self, DecodeError> {
        Ok(TextPacket {
            name: reader.read_string()?,
            object_id: reader.read_i32()?,
            num_stars: reader.read_i16()?,
            bubble_time: reader.read_u8()?,
            recipient: reader.read_string()?,
            text: reader.read_string()?,
            clean_text: reader.read_string()?,
            is_supporter: reader.read_bool()?,
            star_background: reader.read_i32()?,
        })
    }

    fn write(&self, writer: &mut BufferWriter) {
        writer
            .write_string(&self.name)
            .write_i32(self.object_id)
            .write_i16(self.num_stars)
            .write_u8(self.bubble_time)
            .write_string(&self.recipient)
            .write_string(&self.text)
            .write_string(&self.clean_text)
            .write_bool(self.is_supporter)
            .write_i32(self.star_background);
    }
}

/// 接続先サーバーのアドレスが変わったことを知らせる合成メッセージ
///
/// ワイヤ上には存在せず、Incoming ストリームの送信元アドレスの変化から作られる。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ServerAddress {
    /// IPv4 アドレス（オクテット順）
    pub octets: [u8; 4],
}

impl ServerAddress {
    pub fn new(octets: [u8; 4]) -> Self {
        ServerAddress { octets }
    }

    /// アドレスを 1 つの整数（ビッグエンディアン）として
    pub fn as_u32(&self) -> u32 {
        u32::from_be_bytes(self.octets)
    }

    pub fn ip(&self) -> core::net::Ipv4Addr {
        core::net::Ipv4Addr::from(self.octets)
    }
}

impl core::fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.ip())
    }
}
