use std::string::FromUtf8Error;
use thiserror::Error;

pub type UsrvResult<T> = Result<T, UsrvError>;

const ENDPOINT_ALREADY_BOUND: &str = "Endpoint already bound";
const NO_ENDPOINTS_BOUND: &str = "No endpoints bound";
const SERVICE_UNAVAILABLE: &str = "Service unavailable";
const TIMEOUT: &str = "Timeout";
const TRANSPORT_CLOSED: &str = "Transport closed";

/// Errors surfaced by the fabric, either returned synchronously or carried
/// in the error slot of a reply [`Message`](crate::Message).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UsrvError {
    #[error("{}", ENDPOINT_ALREADY_BOUND)]
    EndpointAlreadyBound,

    #[error("{}", NO_ENDPOINTS_BOUND)]
    NoEndpointsBound,

    /// Routing failure, connection failure or non-2xx status.
    #[error("{}", SERVICE_UNAVAILABLE)]
    ServiceUnavailable,

    /// Admission or response deadline exceeded.
    #[error("{}", TIMEOUT)]
    Timeout,

    #[error("{}", TRANSPORT_CLOSED)]
    TransportClosed,

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Listener or socket level failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Error returned (or panic raised) by user code, or an error message received from a peer.
    #[error("{0}")]
    Handler(String),
}

impl UsrvError {
    pub fn handler<STR: Into<String>>(msg: STR) -> Self {
        UsrvError::Handler(msg.into())
    }

    /// Restores an error flattened to its message string by a remote peer.
    pub fn from_wire(msg: &str) -> Self {
        match msg {
            ENDPOINT_ALREADY_BOUND => UsrvError::EndpointAlreadyBound,
            NO_ENDPOINTS_BOUND => UsrvError::NoEndpointsBound,
            SERVICE_UNAVAILABLE => UsrvError::ServiceUnavailable,
            TIMEOUT => UsrvError::Timeout,
            TRANSPORT_CLOSED => UsrvError::TransportClosed,
            other => UsrvError::Handler(other.to_string()),
        }
    }
}

/// Payload encoding error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error(transparent)]
    StringDecodingError(#[from] FromUtf8Error),
}

/// Invalid transport or middleware configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid port '{0}'")]
    InvalidPort(String),

    #[error("Both certFile and certKeyFile must be set to enable TLS")]
    IncompleteTls,

    #[error("TLS configuration error: {0}")]
    Tls(String),

    #[error("maxConcurrent should be > 0")]
    InvalidMaxConcurrent,

    #[error("Config error: {0}")]
    Error(String),
}

impl From<std::io::Error> for UsrvError {
    fn from(err: std::io::Error) -> Self {
        UsrvError::Transport(err.to_string())
    }
}

impl From<hyper::Error> for UsrvError {
    fn from(err: hyper::Error) -> Self {
        UsrvError::Transport(err.to_string())
    }
}

impl From<http::Error> for UsrvError {
    fn from(err: http::Error) -> Self {
        UsrvError::Transport(err.to_string())
    }
}

impl From<rustls::Error> for ConfigError {
    fn from(err: rustls::Error) -> Self {
        ConfigError::Tls(err.to_string())
    }
}

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            CodecError::Decode(err.to_string())
        } else {
            CodecError::Encode(err.to_string())
        }
    }
}

#[cfg(feature = "protobuf")]
impl From<prost::DecodeError> for CodecError {
    fn from(err: prost::DecodeError) -> Self {
        CodecError::Decode(err.to_string())
    }
}

#[cfg(feature = "protobuf")]
impl From<prost::EncodeError> for CodecError {
    fn from(err: prost::EncodeError) -> Self {
        CodecError::Encode(err.to_string())
    }
}

impl From<String> for UsrvError {
    fn from(err: String) -> Self {
        UsrvError::Handler(err)
    }
}

impl From<&str> for UsrvError {
    fn from(err: &str) -> Self {
        UsrvError::Handler(err.to_string())
    }
}

impl From<String> for ConfigError {
    fn from(err: String) -> Self {
        ConfigError::Error(err)
    }
}
