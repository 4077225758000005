//! Shared helpers for command handlers.

use std::sync::Arc;

use huesync_api::RequestOutcome;
use huesync_api::models::clip_errors;
use serde_json::Value;

use super::BridgeContext;
use crate::error::CliError;

/// Fail early when the profile has no application key.
pub fn require_key(ctx: &BridgeContext) -> Result<(), CliError> {
    if ctx.gateway.config().application_key().is_none() {
        return Err(CliError::NoCredentials {
            profile: ctx.profile_name.clone(),
        });
    }
    Ok(())
}

/// Turn a request outcome into the decoded payload, or a CLI error.
///
/// `None` means the bridge answered 200 with a body that was not JSON.
pub fn payload(
    ctx: &BridgeContext,
    outcome: RequestOutcome,
) -> Result<Option<Arc<Value>>, CliError> {
    match outcome {
        RequestOutcome::Completed(payload) => Ok(payload),
        RequestOutcome::Dropped => Err(CliError::BridgeError {
            message: "rate limited by the bridge; try again in a moment".into(),
        }),
        RequestOutcome::Failed => Err(CliError::ConnectionFailed {
            address: ctx.gateway.config().address().to_owned(),
            reason: "request failed (run with -v for details)".into(),
        }),
        RequestOutcome::Cancelled => Err(CliError::BridgeError {
            message: "request cancelled".into(),
        }),
        RequestOutcome::Skipped => Err(CliError::NoConfig {
            path: huesync_config::config_path().display().to_string(),
        }),
    }
}

/// Fail with the bridge's own descriptions when the CLIP envelope lists errors.
pub fn check_clip_errors(payload: &Value) -> Result<(), CliError> {
    let errors = clip_errors(payload);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(CliError::BridgeError {
            message: errors.join("; "),
        })
    }
}
