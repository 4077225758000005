//! Config command handlers. Read-only: the file is edited by hand.

use serde::Serialize;
use tabled::Tabled;

use huesync_config::Config;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

#[derive(Debug, Clone, Serialize, Tabled)]
struct ProfileRow {
    #[tabled(rename = "")]
    #[serde(skip)]
    marker: &'static str,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Area")]
    area: String,
}

fn profile_rows(cfg: &Config, active: &str) -> Vec<ProfileRow> {
    let mut rows: Vec<ProfileRow> = cfg
        .profiles
        .iter()
        .map(|(name, profile)| ProfileRow {
            marker: if name == active { "*" } else { "" },
            name: name.clone(),
            address: profile.address.clone(),
            area: profile.area.clone().unwrap_or_default(),
        })
        .collect();
    rows.sort_by(|a, b| a.name.cmp(&b.name));
    rows
}

pub fn handle(args: &ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Show => {
            let cfg = huesync_config::load_config()?.redacted();
            let rendered = huesync_config::to_toml(&cfg)?;
            let out = output::render_single(global.output, &cfg, |_| rendered.clone(), |_| {
                huesync_config::config_path().display().to_string()
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(
                &huesync_config::config_path().display().to_string(),
                global.quiet,
            );
            Ok(())
        }

        ConfigCommand::Profiles => {
            let cfg = huesync_config::load_config()?;
            let active = huesync_config::active_profile_name(global.profile.as_deref(), &cfg);
            let rows = profile_rows(&cfg, &active);
            let out = output::render_list(global.output, &rows, ProfileRow::clone, |r| {
                r.name.clone()
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use huesync_config::Profile;

    use super::*;

    #[test]
    fn active_profile_is_marked() {
        let mut cfg = Config::default();
        for (name, address) in [("office", "10.0.0.3"), ("home", "10.0.0.2")] {
            cfg.profiles.insert(
                name.into(),
                Profile {
                    address: address.into(),
                    ..Profile::default()
                },
            );
        }

        let rows = profile_rows(&cfg, "office");

        assert_eq!(rows[0].name, "home");
        assert_eq!(rows[0].marker, "");
        assert_eq!(rows[1].marker, "*");
    }
}
