mod cli;
mod commands;
mod error;
mod output;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use secrecy::SecretString;
use tracing_subscriber::EnvFilter;

use huesync_api::BridgeGateway;

use crate::cli::{Cli, Command, GlobalOpts};
use crate::commands::BridgeContext;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Setup tracing based on verbosity
    init_tracing(cli.global.verbose);

    // Dispatch and handle errors with proper exit codes
    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        // Config commands don't need a bridge
        Command::Config(args) => commands::config_cmd::handle(&args, &cli.global),

        // Shell completions generation
        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "huesync", &mut std::io::stdout());
            Ok(())
        }

        // All other commands talk to a bridge
        cmd => {
            let ctx = connect(&cli.global)?;
            tracing::debug!(
                command = ?cmd,
                address = %ctx.gateway.config().address(),
                "dispatching command"
            );
            let result = commands::dispatch(cmd, &ctx, &cli.global).await;
            ctx.gateway.shutdown();
            result
        }
    }
}

/// Build a gateway from the config file, profile, and CLI overrides.
fn connect(global: &GlobalOpts) -> Result<BridgeContext, CliError> {
    let cfg = huesync_config::load_config()?;
    let profile_name = huesync_config::active_profile_name(global.profile.as_deref(), &cfg);

    let mut profile = match cfg.profile(&profile_name) {
        Ok(profile) => profile.clone(),
        // An explicitly named profile must exist
        Err(e) if global.profile.is_some() => return Err(e.into()),
        Err(_) => huesync_config::Profile::default(),
    };

    if let Some(ref address) = global.bridge {
        profile.address.clone_from(address);
    }
    if profile.address.trim().is_empty() {
        return Err(CliError::NoConfig {
            path: huesync_config::config_path().display().to_string(),
        });
    }

    let mut credentials = huesync_config::resolve_credentials(&profile, &profile_name);
    if let Some(ref key) = global.application_key {
        credentials.application_key = Some(SecretString::from(key.clone()));
    }

    let bridge = huesync_config::build_bridge_config(&profile, credentials)?;
    let mut transport = huesync_config::transport_config(&profile, &cfg.defaults);
    if let Some(secs) = global.timeout {
        transport.timeout = Duration::from_secs(secs);
    }

    let gateway = Arc::new(BridgeGateway::new(bridge, &transport)?);
    Ok(BridgeContext {
        gateway,
        profile,
        profile_name,
    })
}
