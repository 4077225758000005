// ── Core error types ──
//
// Session-level errors from huesync-core. The protocol layer reports
// runtime failures as events; these cover what a caller can act on when
// starting a session. The `From<huesync_api::Error>` impl translates
// construction-time API errors into the same vocabulary.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Session errors ───────────────────────────────────────────────
    /// Advisory: a stream is already running on this session.
    #[error("A stream is already active for area {area_id}; stop it first")]
    AlreadyStreaming { area_id: String },

    #[error("Streaming requires an application key and a client key; pair with the bridge first")]
    NoStreamingCredentials,

    #[error("Entertainment area not found: {identifier}")]
    AreaNotFound { identifier: String },

    #[error("Entertainment area {area_id} has no channels")]
    EmptyArea { area_id: String },

    // ── Bridge errors ────────────────────────────────────────────────
    #[error("Cannot reach bridge at {address}: {reason}")]
    ConnectionFailed { address: String, reason: String },

    #[error("Bridge rejected the request: {message}")]
    Rejected { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

// ── Conversion from protocol-layer errors ────────────────────────────

impl From<huesync_api::Error> for CoreError {
    fn from(err: huesync_api::Error) -> Self {
        match err {
            huesync_api::Error::MissingAddress => CoreError::Config {
                message: "no bridge address configured".into(),
            },
            huesync_api::Error::InvalidAddress { address, reason } => CoreError::Config {
                message: format!("invalid bridge address '{address}': {reason}"),
            },
            huesync_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            huesync_api::Error::Transport(ref e) => CoreError::ConnectionFailed {
                address: e.url().map(ToString::to_string).unwrap_or_else(|| "<unknown>".into()),
                reason: e.to_string(),
            },
            huesync_api::Error::Tls(msg) => CoreError::ConnectionFailed {
                address: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            huesync_api::Error::RateLimited => CoreError::Rejected {
                message: "rate limited by the bridge".into(),
            },
            huesync_api::Error::Bridge { status, message } => CoreError::Rejected {
                message: format!("HTTP {status}: {message}"),
            },
            huesync_api::Error::EventStream(reason) => CoreError::ConnectionFailed {
                address: String::new(),
                reason: format!("event stream failed: {reason}"),
            },
            huesync_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_errors_become_config_errors() {
        let err = CoreError::from(huesync_api::Error::InvalidAddress {
            address: "::bad".into(),
            reason: "empty host".into(),
        });
        assert!(matches!(err, CoreError::Config { .. }));
        assert!(err.to_string().contains("::bad"));
    }

    #[test]
    fn already_streaming_names_area() {
        let err = CoreError::AlreadyStreaming {
            area_id: "area-1".into(),
        };
        assert!(err.to_string().contains("area-1"));
    }
}
