use hyper::http;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StressError {
    #[error("invalid URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: http::uri::InvalidUri,
    },

    #[error("unsupported URL scheme {0:?}, only http is supported")]
    UnsupportedScheme(String),

    #[error("URL {0:?} has no scheme, expected http://host[:port]/path")]
    MissingScheme(String),

    #[error("URL {0:?} has no host")]
    MissingHost(String),

    #[error("failed to build request: {0}")]
    BuildRequest(#[from] http::Error),

    #[error("invalid duration {0:?}, expected a number followed by a unit such as 30s, 5m or 1h")]
    InvalidDuration(String),

    #[error("missing target URL")]
    MissingUrl,

    #[error("request pool closed")]
    PoolClosed,

    #[error("concurrency limiter closed")]
    LimiterClosed,

    #[error("task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
