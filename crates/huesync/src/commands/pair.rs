//! Pairing: mint an application key and client key on the bridge.

use std::time::Duration;

use secrecy::ExposeSecret;
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;

use huesync_api::BridgeEvent;

use crate::cli::{GlobalOpts, PairArgs};
use crate::error::CliError;
use crate::output;

use super::{BridgeContext, util};

const RETRY_EVERY: Duration = Duration::from_secs(2);

#[derive(Debug, Serialize)]
struct PairingResult {
    profile: String,
    address: String,
    application_key: String,
    client_key: Option<String>,
}

fn detail(result: &PairingResult) -> String {
    let mut lines = vec![
        format!("# Paired. Add this to {}:", huesync_config::config_path().display()),
        format!("[profiles.{}]", result.profile),
        format!("address = \"{}\"", result.address),
        format!("application_key = \"{}\"", result.application_key),
    ];
    if let Some(ref key) = result.client_key {
        lines.push(format!("client_key = \"{key}\""));
    }
    lines.join("\n")
}

pub async fn handle(
    ctx: &BridgeContext,
    args: &PairArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let deadline = Instant::now() + Duration::from_secs(args.wait);
    let (_sub, mut events) = ctx.gateway.events().subscribe_channel();

    if !global.quiet {
        eprintln!("Press the link button on the bridge...");
    }

    loop {
        let outcome = ctx.gateway.create_new_user().await;
        let payload = util::payload(ctx, outcome)?;

        while let Ok(event) = events.try_recv() {
            if let BridgeEvent::NewUser {
                username,
                client_key,
            } = event
            {
                let result = PairingResult {
                    profile: ctx.profile_name.clone(),
                    address: ctx.gateway.config().address().to_owned(),
                    application_key: username,
                    client_key: client_key.map(|k| k.expose_secret().to_owned()),
                };
                let out = output::render_single(global.output, &result, detail, |r| {
                    r.application_key.clone()
                })?;
                output::print_output(&out, false);
                return Ok(());
            }
        }

        let reason = payload
            .as_deref()
            .and_then(refusal_reason)
            .unwrap_or_else(|| "unexpected response".into());
        if Instant::now() + RETRY_EVERY > deadline {
            return Err(CliError::PairingRefused { reason });
        }
        tracing::debug!(%reason, "pairing refused, retrying");
        tokio::time::sleep(RETRY_EVERY).await;
    }
}

/// The bridge's description from a `[{"error": {...}}]` answer.
fn refusal_reason(payload: &Value) -> Option<String> {
    payload
        .get(0)?
        .pointer("/error/description")?
        .as_str()
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn refusal_reason_reads_first_error() {
        let payload = json!([{ "error": { "type": 101, "description": "link button not pressed" } }]);
        assert_eq!(refusal_reason(&payload).as_deref(), Some("link button not pressed"));
        assert_eq!(refusal_reason(&json!({})), None);
    }

    #[test]
    fn snippet_is_valid_profile_toml() {
        let result = PairingResult {
            profile: "home".into(),
            address: "192.168.1.20".into(),
            application_key: "abc".into(),
            client_key: Some("00FF".into()),
        };
        let text = detail(&result);
        assert!(text.contains("[profiles.home]"));
        assert!(text.contains("client_key = \"00FF\""));
    }
}
