//! Command dispatch: bridges CLI args -> hub operations -> output formatting.

pub mod config_cmd;
pub mod control;
pub mod login;
pub mod status;

use std::sync::Arc;

use tankless_core::Hub;

use crate::cli::{Command, GlobalOpts};
use crate::config::Resolved;
use crate::error::CliError;

/// Dispatch a heater-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, resolved: Resolved, global: &GlobalOpts) -> Result<(), CliError> {
    if let Command::Watch(args) = cmd {
        return status::watch(resolved, args, global).await;
    }

    let hub = Hub::oneshot(resolved.hub.clone(), Arc::new(resolved.token_store())).await?;
    let result = match cmd {
        Command::Status(args) => status::status(&hub, args, global),
        Command::Devices => status::devices(&hub, global),
        Command::Diagnostics => status::diagnostics(&hub, global).await,
        Command::SetTemp(args) => control::set_temp(&hub, args, global).await,
        Command::Power(args) => control::power(&hub, args, global).await,
        Command::Recirc(args) => control::recirc(&hub, args, global).await,
        Command::Vacation(args) => control::vacation(&hub, args, global).await,
        Command::Maintenance(args) => control::maintenance(&hub, args, global).await,
        Command::Watch(_) | Command::Login(_) | Command::Config(_) | Command::Completions(_) => {
            Err(CliError::Internal("command handled before dispatch".into()))
        }
    };
    hub.shutdown().await;
    result
}
