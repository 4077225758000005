use thiserror::Error;

/// Top-level error type for the `huesync-api` crate.
///
/// Only construction-time and internal plumbing surface these: the gateway
/// and the event-stream reader report runtime failures as events, never as
/// `Err` values. `huesync-core` maps these into session-level diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Configuration ───────────────────────────────────────────────
    /// No bridge address has been configured yet.
    #[error("No bridge address configured")]
    MissingAddress,

    /// The configured address cannot be turned into a base URL.
    #[error("Invalid bridge address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS setup error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// The bridge answered with HTTP 429.
    #[error("Rate limited by the bridge")]
    RateLimited,

    // ── Bridge API ──────────────────────────────────────────────────
    /// Non-success status from the CLIP API.
    #[error("Bridge API error (HTTP {status}): {message}")]
    Bridge { status: u16, message: String },

    // ── Event stream ────────────────────────────────────────────────
    /// The push-event connection failed or dropped.
    #[error("Event stream failed: {0}")]
    EventStream(String),

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::RateLimited | Self::EventStream(_) => true,
            _ => false,
        }
    }

    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            Self::RateLimited => Some(429),
            Self::Bridge { status, .. } => Some(*status),
            _ => None,
        }
    }
}
