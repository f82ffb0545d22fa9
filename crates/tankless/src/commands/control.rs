//! Control handlers. Each command is validated, sent, and read back by the
//! coordinator before we print anything.

use tankless_core::{DeviceCoordinator, Hub};

use crate::cli::{DeviceArg, GlobalOpts, RecircArgs, SetTempArgs, SwitchArgs};
use crate::error::CliError;
use crate::output;

fn target(hub: &Hub, arg: &DeviceArg) -> Result<DeviceCoordinator, CliError> {
    Ok(hub.device(arg.device.as_deref())?)
}

fn done(coordinator: &DeviceCoordinator, what: &str, global: &GlobalOpts) {
    let device = coordinator.device();
    output::notice(&format!("{}: {what}", device.display_name()), global.quiet);
}

pub async fn set_temp(hub: &Hub, args: SetTempArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let coordinator = target(hub, &args.target)?;
    coordinator.set_temperature(args.fahrenheit).await?;
    done(&coordinator, &format!("temperature set to {}°F", args.fahrenheit), global);
    Ok(())
}

pub async fn power(hub: &Hub, args: SwitchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let coordinator = target(hub, &args.target)?;
    coordinator.set_power(args.state.is_on()).await?;
    done(&coordinator, &format!("power {}", output::on_off(Some(args.state.is_on()))), global);
    Ok(())
}

pub async fn recirc(hub: &Hub, args: RecircArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let coordinator = target(hub, &args.target)?;
    let on = args.state.is_on();
    coordinator.set_recirculation(on, args.minutes).await?;
    let what = match (on, args.minutes) {
        (true, Some(minutes)) => format!("recirculation started for {minutes} min"),
        (true, None) => format!(
            "recirculation started for {} min",
            hub.config().recirculation_default_minutes
        ),
        (false, _) => "recirculation stopped".to_owned(),
    };
    done(&coordinator, &what, global);
    Ok(())
}

pub async fn vacation(hub: &Hub, args: SwitchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let coordinator = target(hub, &args.target)?;
    coordinator.set_vacation_mode(args.state.is_on()).await?;
    done(
        &coordinator,
        &format!("vacation mode {}", output::on_off(Some(args.state.is_on()))),
        global,
    );
    Ok(())
}

pub async fn maintenance(hub: &Hub, args: DeviceArg, global: &GlobalOpts) -> Result<(), CliError> {
    let coordinator = target(hub, &args)?;
    coordinator.request_maintenance().await?;
    done(&coordinator, "maintenance retrieval requested", global);
    Ok(())
}
