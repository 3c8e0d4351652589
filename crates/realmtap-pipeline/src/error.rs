use realmtap_crypto::{CryptoError, Direction};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Invalid {direction} key: {source}")]
    Key {
        direction: Direction,
        #[source]
        source: CryptoError,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(&'static str),
}
