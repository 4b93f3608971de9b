use std::fmt::Write as _;
use std::sync::LazyLock;
use std::time::Duration;

use ecobee::objects::{EquipmentStatus, Selection, Thermostat, ThermostatSummary};
use ecobee::Client;
use regex::Regex;

type BoxError = Box<dyn std::error::Error>;

const MAX_RELATIVE_HOLD: f64 = 2.0;

static RELATIVE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]\d+$").expect("valid relative temperature pattern"));

fn tenths(value: i64) -> f64 {
    value as f64 / 10.0
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub async fn list(client: &Client) -> Result<(), BoxError> {
    let thermostats = client.get_thermostats(Selection::registered()).await?;
    if thermostats.is_empty() {
        println!("No thermostats found.");
        return Ok(());
    }
    for thermostat in thermostats {
        println!("{}: {}", thermostat.identifier, thermostat.name);
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum StatusFormat {
    Human,
    Machine,
}

pub async fn status(client: &Client, id: &str, format: StatusFormat) -> Result<(), BoxError> {
    let summaries = client
        .get_thermostat_summary(Selection::thermostats(id).include_equipment_status(true))
        .await?;
    let summary = summaries
        .get(id)
        .ok_or_else(|| format!("thermostat {id} missing from thermostat summary"))?;
    let thermostat = client.get_thermostat(id).await?;

    match format {
        StatusFormat::Human => print!("{}", format_status(summary, &thermostat)),
        StatusFormat::Machine => print!("{}", format_machine_status(summary, &thermostat)),
    }
    Ok(())
}

/// Human-readable status, one line per fact.
pub fn format_status(summary: &ThermostatSummary, thermostat: &Thermostat) -> String {
    let runtime = &thermostat.runtime;
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Current Settings ({}): {:.1} - {:.1}.  Fan: {}{}",
        title_case(&thermostat.program.current_climate_ref),
        tenths(runtime.desired_heat),
        tenths(runtime.desired_cool),
        runtime.desired_fan_mode,
        format_equipment_status(&summary.equipment_status),
    );

    if let Some(event) = thermostat.events.first().filter(|e| e.running) {
        match event.kind.as_str() {
            "hold" => {
                let _ = writeln!(
                    out,
                    "Holding at {:.1} - {:.1} (Fan: {}) until {} {}",
                    tenths(event.heat_hold_temp),
                    tenths(event.cool_hold_temp),
                    event.fan,
                    event.end_date,
                    event.end_time,
                );
            }
            "vacation" => {
                let _ = writeln!(out, "On vacation until {} {}", event.end_date, event.end_time);
            }
            _ => {}
        }
    }

    let _ = writeln!(out, "Temperature: {:.1}", tenths(runtime.actual_temperature));

    for sensor in &thermostat.remote_sensors {
        let temperature = sensor
            .temperature()
            .map(|t| format!("{t:.1}"))
            .unwrap_or_default();
        let occupied = if sensor.occupied() == Some(true) {
            "occupied"
        } else {
            ""
        };
        let in_use = if sensor.in_use { "*" } else { "" };
        let _ = writeln!(out, "  {}{in_use}: {temperature} {occupied}", sensor.name);
    }
    out
}

/// Running equipment suffix for the settings line.
pub fn format_equipment_status(status: &EquipmentStatus) -> String {
    let mut out = String::new();
    if status.fan {
        out.push_str(" (running)");
    }
    for (on, label) in [
        (status.comp_cool1, " Cool"),
        (status.comp_cool2, " Cool2"),
        (status.aux_heat1, " Heat"),
        (status.aux_heat2, " Heat2"),
        (status.aux_heat3, " Heat3"),
    ] {
        if on {
            out.push_str(label);
        }
    }
    out
}

/// `name value` lines for scripts and scrapers.
pub fn format_machine_status(summary: &ThermostatSummary, thermostat: &Thermostat) -> String {
    let runtime = &thermostat.runtime;
    let flag = |on: bool| if on { 1.0 } else { 0.0 };
    let mut metrics: Vec<(String, f64)> = vec![
        ("desired_heat".into(), tenths(runtime.desired_heat)),
        ("desired_cool".into(), tenths(runtime.desired_cool)),
        ("temperature".into(), tenths(runtime.actual_temperature)),
    ];

    for sensor in &thermostat.remote_sensors {
        if let Some(temperature) = sensor.temperature() {
            metrics.push((format!("sensor_temperature{{name={:?}}}", sensor.name), temperature));
        }
        if let Some(occupied) = sensor.occupied() {
            metrics.push((format!("sensor_occupied{{name={:?}}}", sensor.name), flag(occupied)));
        }
    }

    let equipment = &summary.equipment_status;
    for (name, on) in [
        ("fan", equipment.fan),
        ("comp_cool1", equipment.comp_cool1),
        ("comp_cool2", equipment.comp_cool2),
        ("aux_heat1", equipment.aux_heat1),
        ("aux_heat2", equipment.aux_heat2),
        ("aux_heat3", equipment.aux_heat3),
    ] {
        metrics.push((name.into(), flag(on)));
    }

    metrics
        .into_iter()
        .map(|(name, value)| format!("{name} {value:.6}\n"))
        .collect()
}

/// Parse a `+N`/`-N` offset, limited to two degrees either way.
pub fn parse_relative(arg: &str) -> Result<f64, BoxError> {
    if !RELATIVE_RE.is_match(arg) {
        return Err(format!("Invalid relative temperature: {arg:?}").into());
    }
    let offset: f64 = arg
        .parse()
        .map_err(|_| format!("Invalid relative temperature: {arg:?}"))?;
    if offset.abs() > MAX_RELATIVE_HOLD {
        return Err(format!("Maximum relative temperature {MAX_RELATIVE_HOLD}, got {offset:.0}").into());
    }
    Ok(offset)
}

pub async fn hold(
    client: &Client,
    id: &str,
    heat: Option<f64>,
    cool: Option<f64>,
    relative: Option<&str>,
    duration: Duration,
) -> Result<(), BoxError> {
    let (heat, cool) = match (heat, cool, relative) {
        (Some(heat), Some(cool), None) => (heat, cool),
        (None, None, Some(relative)) => {
            let offset = parse_relative(relative)?;
            let thermostat = client.get_thermostat(id).await?;
            (
                offset + tenths(thermostat.runtime.desired_heat),
                offset + tenths(thermostat.runtime.desired_cool),
            )
        }
        (_, _, Some(_)) => {
            return Err("A relative temperature cannot be combined with --heat or --cool".into())
        }
        _ => return Err("Both --heat and --cool are required for an absolute hold".into()),
    };
    if heat > cool {
        return Err(format!("Heat setpoint {heat:.1} is above cool setpoint {cool:.1}").into());
    }

    client.hold_temp(id, heat, cool, duration).await?;
    println!(
        "Successfully held temperature between {heat:.1} and {cool:.1} for {}",
        humantime::format_duration(duration)
    );
    Ok(())
}

pub async fn fan(client: &Client, id: &str, duration: Duration) -> Result<(), BoxError> {
    client.run_fan(id, duration).await?;
    println!("Running fan for {}", humantime::format_duration(duration));
    Ok(())
}

pub async fn message(client: &Client, id: &str, words: &[String]) -> Result<(), BoxError> {
    let text = words.join(" ");
    if text.trim().is_empty() {
        return Err("Message text is empty".into());
    }
    client.send_message(id, &text).await?;
    println!("Successfully sent message: {text:?}");
    Ok(())
}

pub async fn resume(client: &Client, id: &str, all: bool) -> Result<(), BoxError> {
    client.resume_program(id, all).await?;
    println!("Successfully resumed program");
    Ok(())
}

pub async fn auth_pin(client: &Client) -> Result<(), BoxError> {
    let pin = client.auth().request_pin().await?;
    println!("Pin: {}", pin.pin);
    println!("Code: {}", pin.code);
    println!(
        "Authorize the pin on https://www.ecobee.com/consumerportal under 'My Apps' within {} minutes, \
         then run `ecobee auth token --code {}`.",
        pin.expires_in, pin.code
    );
    Ok(())
}

pub async fn auth_token(client: &Client, code: &str) -> Result<(), BoxError> {
    let credential = client.auth().complete_authorization(code).await?;
    if let Some(err) = client.take_persist_error() {
        return Err(err.into());
    }
    let cache = &client.auth().identity().storage_location;
    match credential.expiry {
        Some(expiry) => println!("Token saved to {} (expires {expiry})", cache.display()),
        None => println!("Token saved to {}", cache.display()),
    }
    Ok(())
}
