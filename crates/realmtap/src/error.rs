use realmtap_crypto::CryptoError;
use realmtap_pipeline::PipelineError;
use thiserror::Error;

/// `realmtap` の操作で起こりうるエラー
#[derive(Debug, Error)]
pub enum TapError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid key: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Packet tap is already running")]
    AlreadyRunning,

    #[error("Packet tap is not running")]
    NotRunning,

    #[error("Failed to spawn {name} thread: {source}")]
    ThreadSpawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

impl From<PipelineError> for TapError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::Key { source, .. } => TapError::Crypto(source),
            PipelineError::InvalidConfig(message) => TapError::Config(message.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, TapError>;
