//! TOML 設定ファイル
//!
//! ```toml
//! [pipeline]
//! game_port = 2050
//! gap_threshold = 95
//! fatal_backlog = 100
//!
//! [runtime]
//! buffer_capacity = 32
//! join_timeout_ms = 1000
//! log_level = "info"
//! ```
//!
//! どのキーも省略でき、省略したものは既定値になる。

use std::path::Path;
use std::time::Duration;

use realmtap_pipeline::PipelineConfig;
use realmtap_stream::buffer::DEFAULT_CAPACITY;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TapError};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TapConfig {
    pub pipeline: PipelineConfig,
    pub runtime: RuntimeConfig,
}

/// スレッドとログの設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// キャプチャ → 処理スレッド間キューの初期容量
    pub buffer_capacity: usize,
    /// 停止時に処理スレッドの終了を待つ上限 (ms)
    pub join_timeout_ms: u64,
    /// `RUST_LOG` が無いときのログフィルタ
    pub log_level: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            buffer_capacity: DEFAULT_CAPACITY,
            join_timeout_ms: 1_000,
            log_level: "info".to_string(),
        }
    }
}

impl RuntimeConfig {
    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}

impl TapConfig {
    /// ファイルから読み込んで検証する
    ///
    /// # エラー
    /// - `TapError::Io`: 読み込めない
    /// - `TapError::ConfigParse`: TOML として不正
    /// - `TapError::Config` / `TapError::Crypto`: 値が不正
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// TOML 文字列から読み込んで検証する
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: TapConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.pipeline.validate()?;

        if self.runtime.buffer_capacity == 0 {
            return Err(TapError::Config("buffer_capacity must be positive".into()));
        }
        Ok(())
    }

    /// 既定値をすべて書き出した TOML
    pub fn sample() -> String {
        toml::to_string_pretty(&TapConfig::default()).unwrap_or_default()
    }
}
