//! Error taxonomy for metriscope.
//!
//! Fatal conditions (no usable server target, failed health probe, permanent
//! HTTP failures, exhausted retry budget) are modeled here. Recoverable
//! conditions (malformed exposition lines, unparsable sample values) are
//! handled locally at their call sites and never surface as an `Error`.

use reqwest::{Method, StatusCode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// No server target is configured, or the selected target is unusable.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The liveness probe failed or returned an unexpected body.
    #[error("health check failed for {url}: {detail}")]
    HealthCheck { url: String, detail: String },

    /// Transient failures (429, empty read) persisted through the whole
    /// retry budget.
    #[error("retry limit exceeded after {attempts} attempts for {method} {url}")]
    RetryExhausted {
        method: Method,
        url: String,
        attempts: usize,
    },

    /// A status that will not self-heal (403, 500). Never retried.
    #[error("received {status} on {method} {url}, not retrying")]
    Permanent {
        status: StatusCode,
        method: Method,
        url: String,
    },

    /// Connection-level or protocol-level failure below the status line.
    #[error("transport error for {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json encoding error: {0}")]
    Json(#[from] serde_json::Error),
}
