//! Resource dump: everything `GET /resource` returns.

use serde::Serialize;
use serde_json::Value;
use tabled::Tabled;

use crate::cli::{GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

use super::{BridgeContext, util};

#[derive(Debug, Clone, Serialize, Tabled)]
struct ResourceRow {
    #[tabled(rename = "Type")]
    #[serde(rename = "type")]
    kind: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
}

fn summarize(item: &Value) -> ResourceRow {
    let text = |pointer: &str| {
        item.pointer(pointer)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned()
    };
    ResourceRow {
        kind: text("/type"),
        id: text("/id"),
        name: text("/metadata/name"),
    }
}

pub async fn handle(ctx: &BridgeContext, global: &GlobalOpts) -> Result<(), CliError> {
    util::require_key(ctx)?;
    let outcome = ctx.gateway.fetch_all_resources().await;
    let Some(payload) = util::payload(ctx, outcome)? else {
        return Err(CliError::BridgeError {
            message: "bridge returned an unreadable resource list".into(),
        });
    };
    util::check_clip_errors(&payload)?;

    let items = payload
        .get("data")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    // JSON output keeps the full resource bodies
    let out = match global.output {
        OutputFormat::Json => serde_json::to_string_pretty(items)?,
        OutputFormat::JsonCompact => serde_json::to_string(items)?,
        format => {
            let mut rows: Vec<ResourceRow> = items.iter().map(summarize).collect();
            rows.sort_by(|a, b| a.kind.cmp(&b.kind).then_with(|| a.name.cmp(&b.name)));
            output::render_list(format, &rows, ResourceRow::clone, |r| r.id.clone())?
        }
    };
    output::print_output(&out, global.quiet);
    Ok(())
}
