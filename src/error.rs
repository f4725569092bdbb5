use thiserror::Error;

use crate::{address::Protocol, encoder::Dialect};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The address could not be parsed into a protocol, host and port.
    #[error("Bad address {0:?}")]
    BadAddress(String),
    /// The address parsed fine but we have no transport for it yet.
    #[error("Protocol {0} is not supported by the reporter")]
    UnsupportedProtocol(Protocol),
    #[error("The {dialect} dialect cannot encode a {kind}")]
    UnsupportedObservation { dialect: Dialect, kind: &'static str },
    #[error("Observation rejected by the encoder: {0}")]
    EncodingRejected(String),
    #[error("Invalid check status {0:?}, expected 0-3 or one of ok, warning, critical, unknown")]
    InvalidStatus(String),
    #[error("Reporter is not connected")]
    NotConnected,
    #[error("Transport error: {0}")]
    Io(#[from] std::io::Error),
}
