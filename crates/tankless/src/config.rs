//! CLI configuration -- thin wrapper around `tankless_config` shared types.
//!
//! Adds resolution that respects `GlobalOpts` flag overrides (--mode, --host).

use tankless_config::{Config, FileTokenStore, Profile};
use tankless_core::{ConnectionMode, HubConfig};

use crate::cli::{GlobalOpts, ModeArg};
use crate::error::CliError;

/// Everything a command needs to open a hub.
pub struct Resolved {
    pub profile_name: String,
    pub profile: Profile,
    pub hub: HubConfig,
}

impl Resolved {
    pub fn token_store(&self) -> FileTokenStore {
        FileTokenStore::for_profile(&self.profile_name)
    }
}

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

fn mode_name(mode: ModeArg) -> String {
    let mode = match mode {
        ModeArg::Cloud => ConnectionMode::Cloud,
        ModeArg::Local => ConnectionMode::Local,
        ModeArg::Hybrid => ConnectionMode::Hybrid,
    };
    mode.to_string()
}

/// The active profile with flag overrides applied.
///
/// Without a profile on disk, `--mode local --host <addr>` is enough on its own.
pub fn resolve_profile(global: &GlobalOpts) -> Result<(String, Profile, Config), CliError> {
    let config = tankless_config::load_config()?;
    let name = active_profile_name(global, &config);

    let mut profile = match config.profiles.get(&name) {
        Some(profile) => profile.clone(),
        None if global.host.is_some() => Profile::default(),
        None => return Err(tankless_config::ConfigError::UnknownProfile { profile: name }.into()),
    };
    if let Some(mode) = global.mode {
        profile.mode = Some(mode_name(mode));
    } else if profile.mode.is_none() && !config.profiles.contains_key(&name) {
        profile.mode = Some(ConnectionMode::Local.to_string());
    }
    if let Some(ref host) = global.host {
        profile.host = Some(host.clone());
    }
    Ok((name, profile, config))
}

/// Resolve profile + overrides into a validated `HubConfig`.
pub fn resolve(global: &GlobalOpts) -> Result<Resolved, CliError> {
    let (profile_name, profile, config) = resolve_profile(global)?;
    let hub = tankless_config::profile_to_hub_config(&profile, &profile_name, &config.defaults)?;
    tracing::debug!(profile = %profile_name, mode = %hub.mode, "resolved configuration");
    Ok(Resolved {
        profile_name,
        profile,
        hub,
    })
}
