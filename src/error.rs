use axum::http::StatusCode;
use thiserror::Error;

/// Application-wide error types
#[derive(Error, Debug)]
pub enum PortaError {
    #[error("configuration error: {0}")]
    Config(#[from] anyhow::Error),

    #[error("all endpoints must have at least one backend")]
    NoBackends,

    #[error("too many proxies for this proxy middleware")]
    TooManyProxies,

    #[error("not enough proxies for this endpoint")]
    NotEnoughProxies,

    #[error("no hosts available")]
    NoHosts,

    #[error("invalid status code: {0}")]
    InvalidStatusCode(u16),

    #[error("decoding backend response: {0}")]
    Decode(String),

    #[error("context canceled")]
    Canceled,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("internal server error")]
    Internal,

    #[error("backend request: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PortaError {
    /// Status the front-end answers with when this error surfaces from a
    /// proxy stack. Method mismatches are rejected earlier by the router,
    /// so everything that reaches the handler is a plain server failure.
    pub fn status_code(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

pub type Result<T> = std::result::Result<T, PortaError>;
