//! `login`: password login against the cloud, tokens written to the token file.

use std::sync::Arc;

use secrecy::SecretString;

use tankless_api::SessionManager;
use tankless_config::FileTokenStore;

use crate::cli::{GlobalOpts, LoginArgs};
use crate::config;
use crate::error::CliError;
use crate::output;

pub async fn handle(args: LoginArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let (name, profile, mut cfg) = config::resolve_profile(global)?;
    let hub = tankless_config::build_hub_config(&profile, &cfg.defaults, None)?;
    let cloud = hub.cloud.ok_or_else(|| CliError::Validation {
        field: "mode".into(),
        reason: format!("profile '{name}' is {} only; there is no cloud account to log in to", hub.mode),
    })?;

    let username = args
        .username
        .clone()
        .or_else(|| cloud.username.clone())
        .ok_or_else(|| CliError::NoCredentials {
            profile: name.clone(),
        })?;
    let password = match tankless_config::resolve_password(&profile, &name) {
        Some(password) => password,
        None => SecretString::from(rpassword::prompt_password(format!("Password for {username}: "))?),
    };

    let store = FileTokenStore::for_profile(&name);
    let token_path = store.path().display().to_string();
    let session = SessionManager::new(cloud.base_url, &cloud.transport, Arc::new(store))?;
    let established = session.authenticate(&username, &password).await?;
    tracing::info!(profile = %name, path = %token_path, "session tokens stored");

    if args.save_password {
        tankless_config::store_password(&name, &password)?;
    }
    if let Some(entry) = cfg.profiles.get_mut(&name) {
        if entry.username.is_none() {
            entry.username = Some(username.clone());
            tankless_config::save_config(&cfg)?;
        }
    }

    output::notice(
        &format!(
            "Logged in as {username} (session valid until {})",
            established.expires_at.format("%Y-%m-%d %H:%M UTC")
        ),
        global.quiet,
    );
    Ok(())
}
