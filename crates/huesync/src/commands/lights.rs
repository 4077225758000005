//! Light, grouped-light and scene command handlers.

use serde_json::{Map, Value, json};

use crate::cli::{GlobalOpts, SceneArgs, StateArgs};
use crate::error::CliError;

use super::{BridgeContext, util};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Light,
    Group,
}

impl Target {
    fn label(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Group => "group",
        }
    }
}

/// Assemble a CLIP v2 state body from the flags. `--json` keys win.
fn build_state(args: &StateArgs) -> Result<Value, CliError> {
    let mut state = Map::new();
    if args.on || args.off {
        state.insert("on".into(), json!({ "on": args.on }));
    }
    if let Some(pct) = args.brightness {
        state.insert("dimming".into(), json!({ "brightness": f64::from(pct) }));
    }
    if let Some(ref raw) = args.json {
        let Value::Object(extra) = serde_json::from_str::<Value>(raw)? else {
            return Err(CliError::Validation {
                field: "json".into(),
                reason: "expected a JSON object".into(),
            });
        };
        state.extend(extra);
    }

    if state.is_empty() {
        return Err(CliError::Validation {
            field: "state".into(),
            reason: "nothing to change; pass --on, --off, --brightness or --json".into(),
        });
    }
    Ok(Value::Object(state))
}

pub async fn handle_state(
    ctx: &BridgeContext,
    target: Target,
    args: &StateArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    util::require_key(ctx)?;
    let state = build_state(args)?;

    let outcome = match target {
        Target::Light => ctx.gateway.set_light(&args.id, state, args.no_wait).await,
        Target::Group => ctx.gateway.set_group(&args.id, state, args.no_wait).await,
    };
    if let Some(payload) = util::payload(ctx, outcome)? {
        util::check_clip_errors(&payload)?;
    }

    if !global.quiet {
        eprintln!("Updated {} {}", target.label(), args.id);
    }
    Ok(())
}

pub async fn handle_scene(
    ctx: &BridgeContext,
    args: &SceneArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    util::require_key(ctx)?;
    let state = json!({ "recall": { "action": args.action.as_str() } });

    let outcome = ctx.gateway.set_scene(&args.id, state, false).await;
    if let Some(payload) = util::payload(ctx, outcome)? {
        util::check_clip_errors(&payload)?;
    }

    if !global.quiet {
        eprintln!("Recalled scene {}", args.id);
    }
    Ok(())
}
