//! Live event stream: print bridge push events until interrupted.

use std::sync::Arc;

use serde_json::Value;

use huesync_api::models::{ResourceChange, event_batches};
use huesync_api::{BridgeEvent, EventStreamReader, ReaderEvent, ReconnectPolicy, StopReason};

use crate::cli::{EventsArgs, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

use super::{BridgeContext, util};

pub async fn handle(
    ctx: &BridgeContext,
    args: &EventsArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    util::require_key(ctx)?;
    let color = output::should_color(global.color);

    let policy = args.retries.map_or_else(
        || huesync_config::reconnect_policy(&ctx.profile),
        ReconnectPolicy::retrying,
    );
    let reader = EventStreamReader::new(Arc::clone(&ctx.gateway), policy);
    let (_bridge_sub, mut bridge_rx) = ctx.gateway.events().subscribe_channel();
    let (_reader_sub, mut reader_rx) = reader.events().subscribe_channel();

    reader.start();
    if !global.quiet {
        eprintln!("Listening for bridge events (Ctrl-C to stop)...");
    }

    let mut seen = 0usize;
    let result = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break Ok(()),
            Some(event) = bridge_rx.recv() => {
                let BridgeEvent::EventStreamData(payload) = event else { continue };
                print_record(&payload, global.output, color)?;
                seen += 1;
                if args.count.is_some_and(|limit| seen >= limit) {
                    break Ok(());
                }
            }
            Some(ReaderEvent::Stopped { reason }) = reader_rx.recv() => {
                break stop_result(ctx, reason);
            }
        }
    };

    reader.stop();
    result
}

fn print_record(payload: &Value, format: OutputFormat, color: bool) -> Result<(), CliError> {
    let out = match format {
        OutputFormat::Json => serde_json::to_string_pretty(payload)?,
        OutputFormat::JsonCompact => serde_json::to_string(payload)?,
        OutputFormat::Table | OutputFormat::Plain => event_batches(payload)
            .iter()
            .flat_map(|batch| batch.data.iter().map(move |change| (batch.kind.as_str(), change)))
            .map(|(kind, change)| describe(kind, change, color))
            .collect::<Vec<_>>()
            .join("\n"),
    };
    output::print_output(&out, false);
    Ok(())
}

fn describe(batch_kind: &str, change: &ResourceChange, color: bool) -> String {
    let mut line = format!(
        "{batch_kind:<7} {:<28} {}",
        change.kind,
        output::ident(&change.id, color)
    );
    if let Some(status) = change.status.as_ref().and_then(Value::as_str) {
        line.push(' ');
        line.push_str(&output::status(status, color));
    }
    line
}

fn stop_result(ctx: &BridgeContext, reason: StopReason) -> Result<(), CliError> {
    match reason {
        StopReason::Requested | StopReason::Ended => Ok(()),
        StopReason::Status(401 | 403) => Err(CliError::NoCredentials {
            profile: ctx.profile_name.clone(),
        }),
        StopReason::Status(status) => Err(CliError::BridgeError {
            message: format!("event stream refused with HTTP {status}"),
        }),
        StopReason::ReadFailed(reason) => Err(CliError::ConnectionFailed {
            address: ctx.gateway.config().address().to_owned(),
            reason,
        }),
        StopReason::MissingAddress => Err(CliError::NoConfig {
            path: huesync_config::config_path().display().to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn change_lines_include_status() {
        let payload = json!([{
            "id": "b1",
            "type": "update",
            "data": [{ "id": "area-1", "type": "entertainment_configuration", "status": "inactive" }]
        }]);
        let batches = event_batches(&payload);
        let line = describe(&batches[0].kind, &batches[0].data[0], false);

        assert!(line.starts_with("update"));
        assert!(line.contains("entertainment_configuration"));
        assert!(line.ends_with("area-1 inactive"));
    }
}
