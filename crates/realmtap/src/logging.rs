//! ログ出力の初期化

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// グローバルな tracing subscriber を設定する
///
/// `RUST_LOG` があればそれを優先し、無ければ `level`（例: `"info"`、`"realmtap_pipeline=debug"`）を使う。
///
/// # 戻り値
/// 今回の呼び出しで設定できたら true。既に設定済みなら何もせず false
pub fn init_logging(level: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_thread_names(true))
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_harmless() {
        init_logging("warn");
        assert!(!init_logging("debug"));
    }
}
