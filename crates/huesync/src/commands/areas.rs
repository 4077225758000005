//! Entertainment area command handlers.

use std::sync::Arc;

use tabled::Tabled;

use huesync_api::EntertainmentArea;
use huesync_core::sync::screen::sampling_rect;
use huesync_core::{Rect, resolve_area};

use crate::cli::{AreasArgs, AreasCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::{BridgeContext, util};

/// Display used to preview each channel's screen sampling region.
const PREVIEW_DISPLAY: Rect = Rect::new(0, 0, 1920, 1080);

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct AreaRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Channels")]
    channels: usize,
}

fn row(area: &EntertainmentArea, color: bool) -> AreaRow {
    AreaRow {
        id: area.id.clone(),
        name: area.name.clone(),
        status: output::status(&area.status.to_string(), color),
        channels: area.channels.len(),
    }
}

fn detail(area: &EntertainmentArea, color: bool) -> String {
    let mut lines = vec![
        format!("ID:       {}", output::ident(&area.id, color)),
        format!("Name:     {}", area.name),
        format!("Status:   {}", output::status(&area.status.to_string(), color)),
        format!("Channels: {}", area.channels.len()),
    ];
    for channel in &area.channels {
        let p = channel.position;
        let region = sampling_rect(PREVIEW_DISPLAY, p);
        lines.push(format!(
            "  #{:<3} x={:+.2} y={:+.2} z={:+.2}  region {}x{}+{}+{}",
            channel.channel_id, p.x, p.y, p.z, region.width, region.height, region.x, region.y
        ));
    }
    lines.join("\n")
}

// ── Handlers ────────────────────────────────────────────────────────

pub async fn handle(
    ctx: &BridgeContext,
    args: AreasArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let color = output::should_color(global.color);
    let areas = load_areas(ctx).await?;

    match args.command {
        AreasCommand::List => {
            let out = output::render_list(
                global.output,
                areas.as_slice(),
                |a| row(a, color),
                |a| a.id.clone(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        AreasCommand::Show { area } => {
            let key = area
                .or_else(|| ctx.profile.area.clone())
                .ok_or_else(|| CliError::Validation {
                    field: "area".into(),
                    reason: "pass an area id or name, or set `area` in the profile".into(),
                })?;
            let area = resolve_area(&areas, &key)?;
            let out = output::render_single(
                global.output,
                &area,
                |a| detail(a, color),
                |a| a.id.clone(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}

/// Fetch the bridge's entertainment configurations.
pub async fn load_areas(ctx: &BridgeContext) -> Result<Arc<Vec<EntertainmentArea>>, CliError> {
    util::require_key(ctx)?;
    let outcome = ctx.gateway.fetch_entertainment_configurations().await;
    if let Some(payload) = util::payload(ctx, outcome)? {
        util::check_clip_errors(&payload)?;
    }
    Ok(ctx.gateway.areas())
}
