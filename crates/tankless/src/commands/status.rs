//! Read-only handlers: status, watch, devices, diagnostics.

use std::fmt::Write as _;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tabled::Tabled;
use tokio::sync::broadcast::error::RecvError;

use tankless_core::{Availability, DeviceSnapshot, Hub, HubEvent, Source};

use crate::cli::{DeviceArg, GlobalOpts, OutputFormat, WatchArgs};
use crate::config::Resolved;
use crate::error::CliError;
use crate::output;

// ── Views ────────────────────────────────────────────────────────────

/// Flat, serialisable status of one heater.
#[derive(Debug, Serialize)]
struct StatusView {
    device_id: String,
    name: String,
    availability: Availability,
    source: Option<Source>,
    last_updated: Option<DateTime<Utc>>,
    outlet_temp: Option<f64>,
    inlet_temp: Option<f64>,
    target_temp: Option<f64>,
    flow_rate: Option<f64>,
    power_on: Option<bool>,
    heating: Option<bool>,
    /// Includes a just-requested value until the heater confirms it.
    recirculating: Option<bool>,
    vacation_mode: Option<bool>,
    combustion_cycles: Option<u64>,
    operation_hours: Option<u64>,
    pump_hours: Option<u64>,
    pump_cycles: Option<u64>,
    fan_current: Option<f64>,
    fan_frequency: Option<f64>,
    last_error: Option<String>,
}

impl From<&DeviceSnapshot> for StatusView {
    fn from(snap: &DeviceSnapshot) -> Self {
        let state = snap.state.as_ref();
        Self {
            device_id: snap.device.id.clone(),
            name: snap.device.display_name().to_owned(),
            availability: snap.availability,
            source: state.map(|s| s.source),
            last_updated: state.map(|s| s.last_updated),
            outlet_temp: state.and_then(|s| s.outlet_temp),
            inlet_temp: state.and_then(|s| s.inlet_temp),
            target_temp: state.and_then(|s| s.target_temp),
            flow_rate: state.and_then(|s| s.flow_rate),
            power_on: state.and_then(|s| s.power_on),
            heating: state.and_then(|s| s.heating),
            recirculating: snap.recirculation_display(),
            vacation_mode: state.and_then(|s| s.vacation_mode),
            combustion_cycles: state.and_then(|s| s.combustion_cycles),
            operation_hours: state.and_then(|s| s.operation_hours),
            pump_hours: state.and_then(|s| s.pump_hours),
            pump_cycles: state.and_then(|s| s.pump_cycles),
            fan_current: state.and_then(|s| s.fan_current),
            fan_frequency: state.and_then(|s| s.fan_frequency),
            last_error: snap.last_error.clone(),
        }
    }
}

fn status_detail(view: &StatusView, color: bool) -> String {
    let count = |v: Option<u64>| v.map_or_else(|| "-".into(), |n| n.to_string());
    let mut out = String::new();
    let _ = writeln!(out, "{} ({})", view.name, view.device_id);
    let _ = writeln!(
        out,
        "  Status:         {}{}",
        output::availability(view.availability, color),
        view.source.map(|s| format!(" via {s}")).unwrap_or_default()
    );
    let _ = writeln!(out, "  Outlet:         {}", output::number(view.outlet_temp, "°F"));
    let _ = writeln!(out, "  Inlet:          {}", output::number(view.inlet_temp, "°F"));
    let _ = writeln!(out, "  Target:         {}", output::number(view.target_temp, "°F"));
    let _ = writeln!(out, "  Flow:           {}", output::number(view.flow_rate, ""));
    let _ = writeln!(out, "  Power:          {}", output::on_off(view.power_on));
    let _ = writeln!(out, "  Heating:        {}", output::on_off(view.heating));
    let _ = writeln!(out, "  Recirculation:  {}", output::on_off(view.recirculating));
    let _ = writeln!(out, "  Vacation:       {}", output::on_off(view.vacation_mode));
    let _ = writeln!(out, "  Combustion:     {} cycles, {} h", count(view.combustion_cycles), count(view.operation_hours));
    let _ = writeln!(out, "  Pump:           {} cycles, {} h", count(view.pump_cycles), count(view.pump_hours));
    if let Some(at) = view.last_updated {
        let _ = writeln!(out, "  Updated:        {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if let Some(ref err) = view.last_error {
        let _ = writeln!(out, "  Last error:     {err}");
    }
    out.trim_end().to_owned()
}

// ── status ───────────────────────────────────────────────────────────

pub fn status(hub: &Hub, args: DeviceArg, global: &GlobalOpts) -> Result<(), CliError> {
    let coordinator = hub.device(args.device.as_deref())?;
    let view = StatusView::from(coordinator.snapshot().as_ref());
    let color = output::should_color(global.color);
    let rendered = output::render_single(
        global.output,
        &view,
        |v| status_detail(v, color),
        |v| format!("{}\t{}", v.device_id, v.availability),
    )?;
    output::print_output(&rendered, global.quiet);
    Ok(())
}

// ── devices ──────────────────────────────────────────────────────────

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Serial")]
    serial: String,
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Firmware")]
    firmware: String,
    #[tabled(rename = "Recirculation")]
    recirculation: String,
    #[tabled(rename = "Status")]
    status: String,
}

pub fn devices(hub: &Hub, global: &GlobalOpts) -> Result<(), CliError> {
    let snapshots: Vec<Arc<DeviceSnapshot>> = hub.devices().iter().map(|c| c.snapshot()).collect();
    let color = output::should_color(global.color);
    let dash = |v: Option<&String>| v.cloned().unwrap_or_else(|| "-".into());
    let rendered = output::render_list(
        global.output,
        &snapshots,
        |s| DeviceRow {
            id: s.device.id.clone(),
            name: s.device.display_name().to_owned(),
            serial: dash(s.device.serial.as_ref()),
            model: dash(s.device.model.as_ref()),
            firmware: dash(s.device.firmware_version.as_ref()),
            recirculation: format!("{:?}", s.device.recirculation),
            status: output::availability(s.availability, color),
        },
        |s| s.device.id.clone(),
    )?;
    output::print_output(&rendered, global.quiet);
    Ok(())
}

// ── diagnostics ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct DiagnosticsRow {
    #[tabled(rename = "Device")]
    device: String,
    #[tabled(rename = "Circuit")]
    circuit: String,
    #[tabled(rename = "Local fails")]
    local_failures: u32,
    #[tabled(rename = "Cloud fails")]
    cloud_failures: u32,
    #[tabled(rename = "Streak")]
    streak: u32,
    #[tabled(rename = "Status")]
    availability: String,
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Reauth")]
    reauth: bool,
}

pub async fn diagnostics(hub: &Hub, global: &GlobalOpts) -> Result<(), CliError> {
    let report = hub.diagnostics().await;
    let color = output::should_color(global.color);
    let rendered = output::render_single(
        global.output,
        &report,
        |r| {
            let mut out = String::new();
            let _ = writeln!(out, "Mode:            {}", r.mode);
            if let Some(ref endpoint) = r.local_endpoint {
                let _ = writeln!(out, "Local endpoint:  {endpoint}");
            }
            if let Some(at) = r.session_expires_at {
                let _ = writeln!(out, "Session expires: {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
            }
            let rows: Vec<DiagnosticsRow> = r
                .devices
                .iter()
                .map(|d| DiagnosticsRow {
                    device: d.name.clone(),
                    circuit: d.circuit.to_string(),
                    local_failures: d.consecutive_local_failures,
                    cloud_failures: d.consecutive_cloud_failures,
                    streak: d.failure_streak,
                    availability: output::availability(d.availability, color),
                    source: d.source.map_or_else(|| "-".into(), |s| s.to_string()),
                    reauth: d.reauth_required,
                })
                .collect();
            out.push_str(
                &tabled::Table::new(rows)
                    .with(tabled::settings::Style::rounded())
                    .to_string(),
            );
            out
        },
        |r| {
            r.devices
                .iter()
                .map(|d| format!("{}\t{}\t{}", d.device_id, d.circuit, d.availability))
                .collect::<Vec<_>>()
                .join("\n")
        },
    )?;
    output::print_output(&rendered, global.quiet);
    Ok(())
}

// ── watch ────────────────────────────────────────────────────────────

fn watch_line(snap: &DeviceSnapshot, format: OutputFormat, color: bool) -> Result<String, CliError> {
    let view = StatusView::from(snap);
    match format {
        OutputFormat::Json | OutputFormat::JsonCompact => Ok(serde_json::to_string(&view)?),
        OutputFormat::Table | OutputFormat::Plain => Ok(format!(
            "{} {}  outlet {}  target {}  heating {}  recirc {}  [{}{}]",
            Utc::now().format("%H:%M:%S"),
            view.name,
            output::number(view.outlet_temp, "°F"),
            output::number(view.target_temp, "°F"),
            output::on_off(view.heating),
            output::on_off(view.recirculating),
            output::availability(view.availability, color),
            view.source.map(|s| format!(", {s}")).unwrap_or_default(),
        )),
    }
}

pub async fn watch(mut resolved: Resolved, args: WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    if let Some(interval) = args.interval {
        resolved.hub.polling.poll_interval = interval;
        resolved.hub.validate()?;
    }
    let hub = Hub::connect(resolved.hub.clone(), Arc::new(resolved.token_store())).await?;
    let result = watch_loop(&hub, args.target, global).await;
    hub.shutdown().await;
    result
}

async fn watch_loop(hub: &Hub, target: DeviceArg, global: &GlobalOpts) -> Result<(), CliError> {
    let coordinator = hub.device(target.device.as_deref())?;
    let mut stream = coordinator.subscribe();
    let mut events = hub.subscribe_events();
    let color = output::should_color(global.color);

    output::print_output(&watch_line(stream.current(), global.output, color)?, global.quiet);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            changed = stream.changed() => match changed {
                Some(snap) => output::print_output(&watch_line(&snap, global.output, color)?, global.quiet),
                None => return Ok(()),
            },
            event = events.recv() => match event {
                Ok(HubEvent::ReauthRequired { .. }) if !hub.config().mode.uses_local() => {
                    return Err(CliError::AuthExpired);
                }
                Ok(HubEvent::ReauthRequired { device_id }) => {
                    tracing::warn!(%device_id, "cloud session expired, continuing over the local port; run `tankless login`");
                }
                Ok(HubEvent::DeviceRemoved { device_id }) if device_id == coordinator.device_id() => {
                    return Err(CliError::NotFound { identifier: device_id });
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return Ok(()),
            },
        }
    }
}
