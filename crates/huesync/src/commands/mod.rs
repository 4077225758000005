//! Command dispatch: bridges CLI args -> gateway calls -> output formatting.

pub mod areas;
pub mod config_cmd;
pub mod events;
pub mod lights;
pub mod pair;
pub mod resources;
pub mod util;

use std::sync::Arc;

use huesync_api::BridgeGateway;
use huesync_config::Profile;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// A gateway bound to the resolved profile.
pub struct BridgeContext {
    pub gateway: Arc<BridgeGateway>,
    pub profile: Profile,
    pub profile_name: String,
}

/// Dispatch a bridge-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    ctx: &BridgeContext,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Pair(args) => pair::handle(ctx, &args, global).await,
        Command::Areas(args) => areas::handle(ctx, args, global).await,
        Command::Resources => resources::handle(ctx, global).await,
        Command::Light(args) => {
            lights::handle_state(ctx, lights::Target::Light, &args, global).await
        }
        Command::Group(args) => {
            lights::handle_state(ctx, lights::Target::Group, &args, global).await
        }
        Command::Scene(args) => lights::handle_scene(ctx, &args, global).await,
        Command::Events(args) => events::handle(ctx, &args, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => Ok(()),
    }
}
