//! メッセージ内で使われる共通データレコード

use alloc::string::String;
use alloc::vec::Vec;

use serde::Serialize;

use crate::error::DecodeError;
use crate::reader::BufferReader;
use crate::writer::BufferWriter;

/// 自分自身を読み書きできるレコード
pub trait Record: Sized {
    /// リーダーの現在位置から 1 レコード読む
    fn read(reader: &mut BufferReader<'_>) -> Result<Self, DecodeError>;

    /// ライターの末尾に 1 レコード書く
    fn write(&self, writer: &mut BufferWriter);
}

/// `[count: i16 BE][record...]` 形式の配列を読む
///
/// 負の件数は 0 件として扱う。
pub fn read_short_list<T: Record>(reader: &mut BufferReader<'_>) -> Result<Vec<T>, DecodeError> {
    let count = reader.read_i16()?.max(0) as usize;
    // 1 レコード最低 1 バイトなので残りバイト数で上限を切る
    let mut items = Vec::with_capacity(count.min(reader.remaining()));
    for _ in 0..count {
        items.push(T::read(reader)?);
    }
    Ok(items)
}

/// `[count: i16 BE][record...]` 形式の配列を書く
pub fn write_short_list<T: Record>(writer: &mut BufferWriter, items: &[T]) {
    writer.write_i16(items.len().min(i16::MAX as usize) as i16);
    for item in items.iter().take(i16::MAX as usize) {
        item.write(writer);
    }
}

/// ワールド座標
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct WorldPosData {
    pub x: f32,
    pub y: f32,
}

impl Record for WorldPosData {
    fn read(reader: &mut BufferReader<'_>) -> Result<Self, DecodeError> {
        Ok(WorldPosData {
            x: reader.read_f32()?,
            y: reader.read_f32()?,
        })
    }

    fn write(&self, writer: &mut BufferWriter) {
        writer.write_f32(self.x).write_f32(self.y);
    }
}

/// ステータス値の本体
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum StatValue {
    Int(i32),
    Text(String),
}

/// 1 つのステータス
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatData {
    /// ステータス種別番号
    pub stat_type: u8,
    pub value: StatValue,
    /// 副次値（未使用なら -1 のことが多い）
    pub value_two: i32,
}

impl StatData {
    /// 値が文字列で送られるステータス種別
    ///
    /// 経験値、名前、アカウント ID、ギルド名、素材、ペット名など。
    pub const STRING_STATS: [u8; 14] = [6, 31, 38, 54, 62, 71, 72, 80, 82, 115, 121, 127, 128, 147];

    /// この種別の値が文字列かどうか
    pub fn is_string_stat(stat_type: u8) -> bool {
        Self::STRING_STATS.contains(&stat_type)
    }
}

impl Record for StatData {
    fn read(reader: &mut BufferReader<'_>) -> Result<Self, DecodeError> {
        let stat_type = reader.read_u8()?;
        let value = if Self::is_string_stat(stat_type) {
            StatValue::Text(reader.read_string()?)
        } else {
            StatValue::Int(reader.read_compressed_int()?)
        };
        let value_two = reader.read_compressed_int()?;
        Ok(StatData {
            stat_type,
            value,
            value_two,
        })
    }

    fn write(&self, writer: &mut BufferWriter) {
        writer.write_u8(self.stat_type);
        match &self.value {
            StatValue::Int(v) => writer.write_compressed_int(*v),
            StatValue::Text(s) => writer.write_string(s),
        };
        writer.write_compressed_int(self.value_two);
    }
}

/// オブジェクト 1 つ分の状態更新
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectStatusData {
    pub object_id: i32,
    pub pos: WorldPosData,
    pub stats: Vec<StatData>,
}

impl Record for ObjectStatusData {
    fn read(reader: &mut BufferReader<'_>) -> Result<Self, DecodeError> {
        let object_id = reader.read_compressed_int()?;
        let pos = WorldPosData::read(reader)?;
        // ステータス件数は圧縮整数
        let count = reader.read_compressed_int()?.max(0) as usize;
        let mut stats = Vec::with_capacity(count.min(reader.remaining()));
        for _ in 0..count {
            stats.push(StatData::read(reader)?);
        }
        Ok(ObjectStatusData {
            object_id,
            pos,
            stats,
        })
    }

    fn write(&self, writer: &mut BufferWriter) {
        writer.write_compressed_int(self.object_id);
        self.pos.write(writer);
        writer.write_compressed_int(self.stats.len().min(i32::MAX as usize) as i32);
        for stat in &self.stats {
            stat.write(writer);
        }
    }
}

/// クライアントの移動履歴 1 件
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MoveRecord {
    pub time: i32,
    pub pos: WorldPosData,
}

impl Record for MoveRecord {
    fn read(reader: &mut BufferReader<'_>) -> Result<Self, DecodeError> {
        Ok(MoveRecord {
            time: reader.read_i32()?,
            pos: WorldPosData::read(reader)?,
        })
    }

    fn write(&self, writer: &mut BufferWriter) {
        writer.write_i32(self.time);
        self.pos.write(writer);
    }
}
