//! Config subcommand handlers.

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::config;
use crate::error::CliError;
use crate::output;

const REDACTED: &str = "********";

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            let rendered = format!(
                "{}\n{}",
                tankless_config::config_path().display(),
                tankless_config::tokens_path().display()
            );
            output::print_output(&rendered, global.quiet);
            Ok(())
        }

        ConfigCommand::Show => {
            let (name, mut profile, _) = config::resolve_profile(global)?;
            if profile.password.is_some() {
                profile.password = Some(REDACTED.into());
            }
            let rendered = match global.output {
                OutputFormat::Table | OutputFormat::Plain => format!(
                    "# profile: {name}\n{}",
                    toml::to_string_pretty(&profile).map_err(tankless_config::ConfigError::from)?
                ),
                OutputFormat::Json => serde_json::to_string_pretty(&profile)?,
                OutputFormat::JsonCompact => serde_json::to_string(&profile)?,
            };
            output::print_output(rendered.trim_end(), global.quiet);
            Ok(())
        }
    }
}
