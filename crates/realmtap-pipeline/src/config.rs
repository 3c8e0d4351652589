//! パイプラインの設定値
//!
//! すべてのフィールドに既定値があり、設定ファイルでは変えたいものだけ書けばよい。

use realmtap_crypto::{Aligner, CipherSession, Direction, INCOMING_KEY, OUTGOING_KEY, SEARCH_SIZE};
use realmtap_proto::Frame;
use realmtap_stream::DEFAULT_MTU;
use realmtap_transport::{ReassemblerConfig, DEFAULT_FRAGMENT_CAPACITY};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// ゲームサーバーの TCP ポート
pub const DEFAULT_GAME_PORT: u16 = 2050;

/// 診断ダンプに残す生フレーム数
pub const DEFAULT_RAW_LOG_CAPACITY: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// 送信元がこのポートなら Incoming、宛先がこのポートなら Outgoing
    pub game_port: u16,
    /// これ未満の TCP ペイロードを送信バーストの終わりとみなす
    pub mtu: usize,
    /// サーバー → クライアントの 16進鍵
    pub incoming_key: String,
    /// クライアント → サーバーの 16進鍵
    pub outgoing_key: String,
    /// アライメント探索の候補オフセット数
    pub search_size: usize,
    /// 欠落時に飛び先を探すシーケンス番号の範囲
    pub loss_scan_limit: u32,
    /// 待ちセグメント数がこれを超えたら欠落を飛ばす
    pub gap_threshold: usize,
    /// 待ちセグメント数がこれ以上で回復不能
    pub fatal_backlog: usize,
    /// これを超える長さ宣言のフレームは捨てる
    pub max_frame_len: usize,
    /// 組み立て中に保持する IPv4 データグラム数
    pub fragment_capacity: usize,
    pub raw_log_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            game_port: DEFAULT_GAME_PORT,
            mtu: DEFAULT_MTU,
            incoming_key: INCOMING_KEY.to_string(),
            outgoing_key: OUTGOING_KEY.to_string(),
            search_size: SEARCH_SIZE,
            loss_scan_limit: 100_000,
            gap_threshold: 95,
            fatal_backlog: 100,
            max_frame_len: Frame::MAX_FRAME_LEN,
            fragment_capacity: DEFAULT_FRAGMENT_CAPACITY,
            raw_log_capacity: DEFAULT_RAW_LOG_CAPACITY,
        }
    }
}

impl PipelineConfig {
    /// 方向に対応する鍵
    pub fn key(&self, direction: Direction) -> &str {
        match direction {
            Direction::Incoming => &self.incoming_key,
            Direction::Outgoing => &self.outgoing_key,
        }
    }

    /// 方向ごとの鍵スケジュール直後のセッションを作る
    ///
    /// # エラー
    /// - `PipelineError::Key`: 鍵が 16進として不正
    pub fn cipher(&self, direction: Direction) -> Result<CipherSession, PipelineError> {
        CipherSession::from_hex_key(self.key(direction))
            .map_err(|source| PipelineError::Key { direction, source })
    }

    pub fn aligner(&self) -> Aligner {
        Aligner::new(self.search_size)
    }

    pub fn reassembler(&self) -> ReassemblerConfig {
        ReassemblerConfig {
            gap_threshold: self.gap_threshold,
            fatal_backlog: self.fatal_backlog,
            scan_limit: self.loss_scan_limit,
        }
    }

    /// 値の組み合わせを検証する
    ///
    /// # エラー
    /// - `PipelineError::Key`: どちらかの鍵が不正
    /// - `PipelineError::InvalidConfig`: しきい値の組み合わせが不正
    pub fn validate(&self) -> Result<(), PipelineError> {
        self.cipher(Direction::Incoming)?;
        self.cipher(Direction::Outgoing)?;

        if self.gap_threshold >= self.fatal_backlog {
            return Err(PipelineError::InvalidConfig(
                "gap_threshold must be below fatal_backlog",
            ));
        }
        if self.max_frame_len < Frame::HEADER_LEN {
            return Err(PipelineError::InvalidConfig(
                "max_frame_len must cover the frame header",
            ));
        }
        if self.mtu == 0 {
            return Err(PipelineError::InvalidConfig("mtu must be positive"));
        }
        if self.search_size == 0 {
            return Err(PipelineError::InvalidConfig("search_size must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert_eq!(config.game_port, 2050);
        assert_eq!(config.mtu, 1460);
        assert_eq!(config.max_frame_len, 200_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: PipelineConfig = serde_json::from_str(r#"{"game_port": 2051}"#).unwrap();
        assert_eq!(config.game_port, 2051);
        assert_eq!(config.fatal_backlog, 100);
        assert_eq!(config.incoming_key, INCOMING_KEY);
    }

    #[test]
    fn test_bad_key_is_rejected() {
        let config = PipelineConfig {
            outgoing_key: "not hex".to_string(),
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PipelineError::Key {
                direction: Direction::Outgoing,
                ..
            })
        ));
    }

    #[test]
    fn test_thresholds_must_be_ordered() {
        let config = PipelineConfig {
            gap_threshold: 100,
            fatal_backlog: 100,
            ..PipelineConfig::default()
        };
        assert!(matches!(config.validate(), Err(PipelineError::InvalidConfig(_))));
    }
}
