// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/envguard

//! Line-oriented operator console
//!
//! ```text
//! set <kind> <value>     update a threshold
//! clear <kind>           disable a threshold
//! on|off|toggle <device> manual output control
//! status                 engine summary
//! quit                   orderly shutdown
//! ```

use thiserror::Error;
use tracing::info;

use crate::core::Engine;
use crate::devices::{DeviceRole, DeviceState};
use crate::error::EngineError;
use crate::sensors::SensorKind;

pub const HELP: &str = "commands: set <kind> <value> | clear <kind> | on|off|toggle <device> | status | help | quit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceAction {
    On,
    Off,
    Toggle,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ShellCommand {
    SetThreshold { kind: SensorKind, value: String },
    ClearThreshold(SensorKind),
    Switch { role: DeviceRole, action: DeviceAction },
    Status,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShellError {
    #[error("empty command")]
    Empty,

    #[error("unknown command '{0}'")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("unknown sensor kind '{0}'")]
    UnknownKind(String),

    #[error("unknown device '{0}'")]
    UnknownDevice(String),
}

/// What the console loop should do next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellOutcome {
    Reply(String),
    Quit,
}

pub fn parse_command(line: &str) -> Result<ShellCommand, ShellError> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Err(ShellError::Empty);
    };
    let args: Vec<&str> = words.collect();

    match verb.to_ascii_lowercase().as_str() {
        "set" => match args.as_slice() {
            [kind, value] => Ok(ShellCommand::SetThreshold {
                kind: parse_kind(kind)?,
                value: value.to_string(),
            }),
            _ => Err(ShellError::Usage("set <kind> <value>")),
        },
        "clear" => match args.as_slice() {
            [kind] => Ok(ShellCommand::ClearThreshold(parse_kind(kind)?)),
            _ => Err(ShellError::Usage("clear <kind>")),
        },
        "on" | "off" | "toggle" => {
            let action = match verb.to_ascii_lowercase().as_str() {
                "on" => DeviceAction::On,
                "off" => DeviceAction::Off,
                _ => DeviceAction::Toggle,
            };
            match args.as_slice() {
                [device] => Ok(ShellCommand::Switch {
                    role: DeviceRole::parse(device).ok_or_else(|| ShellError::UnknownDevice(device.to_string()))?,
                    action,
                }),
                _ => Err(ShellError::Usage("on|off|toggle <device>")),
            }
        }
        "status" => Ok(ShellCommand::Status),
        "help" | "?" => Ok(ShellCommand::Help),
        "quit" | "exit" | "q" => Ok(ShellCommand::Quit),
        other => Err(ShellError::Unknown(other.to_string())),
    }
}

fn parse_kind(input: &str) -> Result<SensorKind, ShellError> {
    SensorKind::parse(input).ok_or_else(|| ShellError::UnknownKind(input.to_string()))
}

/// Run a parsed command against the engine
pub fn execute(engine: &Engine, command: ShellCommand) -> Result<ShellOutcome, EngineError> {
    let reply = match command {
        ShellCommand::SetThreshold { kind, value } => {
            let limit = engine.set_threshold_str(kind, &value)?;
            format!("{} threshold = {}", kind, limit)
        }
        ShellCommand::ClearThreshold(kind) => {
            engine.clear_threshold(kind);
            format!("{} threshold cleared", kind)
        }
        ShellCommand::Switch { role, action } => {
            let handle = engine.device(role)?;
            let state = match action {
                DeviceAction::On => handle.on()?,
                DeviceAction::Off => handle.off()?,
                DeviceAction::Toggle => handle.toggle()?,
            };
            info!("Manual {:?} on {}: {:?}", action, handle.name(), state);
            engine.dispatcher().publish_actuation(role, handle.name(), state);
            format!("{} is {}", handle.name(), describe(state))
        }
        ShellCommand::Status => status_line(engine),
        ShellCommand::Help => HELP.to_string(),
        ShellCommand::Quit => return Ok(ShellOutcome::Quit),
    };
    Ok(ShellOutcome::Reply(reply))
}

fn describe(state: DeviceState) -> &'static str {
    match state {
        DeviceState::On => "on",
        DeviceState::Off => "off",
        DeviceState::Closed => "closed",
    }
}

fn status_line(engine: &Engine) -> String {
    let state = engine.state();
    let thresholds: Vec<String> = state
        .thresholds
        .iter()
        .map(|(kind, limit)| format!("{}>{}", kind, limit))
        .collect();
    let devices: Vec<String> = DeviceRole::ALL
        .iter()
        .filter_map(|role| engine.device(*role).ok())
        .map(|d| format!("{}={}", d.name(), describe(d.state())))
        .collect();

    format!(
        "running={} loops={}/{} readings={} breaches={} faults={} uptime={}s | {} | {}",
        state.running,
        state.loops_active,
        state.loops_configured,
        state.total_readings,
        state.total_threshold_events,
        state.total_faults,
        state.uptime_seconds,
        thresholds.join(" "),
        devices.join(" "),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PollingConfig;
    use crate::core::{PinId, Topic};
    use crate::devices::VirtualDevice;

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            parse_command("set smoke 80").unwrap(),
            ShellCommand::SetThreshold {
                kind: SensorKind::Smoke,
                value: "80".to_string()
            }
        );
        assert_eq!(
            parse_command("  TOGGLE led ").unwrap(),
            ShellCommand::Switch {
                role: DeviceRole::Light,
                action: DeviceAction::Toggle
            }
        );
        assert_eq!(parse_command("clear hum").unwrap(), ShellCommand::ClearThreshold(SensorKind::Humidity));
        assert_eq!(parse_command("status").unwrap(), ShellCommand::Status);
        assert_eq!(parse_command("quit").unwrap(), ShellCommand::Quit);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse_command("   "), Err(ShellError::Empty));
        assert_eq!(parse_command("set smoke"), Err(ShellError::Usage("set <kind> <value>")));
        assert_eq!(parse_command("set noise 3"), Err(ShellError::UnknownKind("noise".to_string())));
        assert_eq!(parse_command("on siren"), Err(ShellError::UnknownDevice("siren".to_string())));
        assert_eq!(parse_command("reboot"), Err(ShellError::Unknown("reboot".to_string())));
    }

    fn engine() -> Engine {
        Engine::builder(PollingConfig::default())
            .device(DeviceRole::Buzzer, Box::new(VirtualDevice::new("buzzer", PinId::Gpio(26))))
            .unwrap()
            .build()
            .unwrap()
    }

    #[test]
    fn test_execute_threshold_and_switch() {
        let engine = engine();
        let sub = engine.subscribe(Topic::All);

        let reply = execute(&engine, parse_command("set smoke 42").unwrap()).unwrap();
        assert_eq!(reply, ShellOutcome::Reply("smoke threshold = 42".to_string()));
        assert_eq!(engine.threshold(SensorKind::Smoke), Some(42.0));

        execute(&engine, parse_command("on buzzer").unwrap()).unwrap();
        assert!(engine.device(DeviceRole::Buzzer).unwrap().is_on());
        execute(&engine, parse_command("toggle buzzer").unwrap()).unwrap();
        assert!(!engine.device(DeviceRole::Buzzer).unwrap().is_on());

        let actuations = sub
            .drain()
            .into_iter()
            .filter(|e| matches!(e.payload, crate::core::EventPayload::Actuation { .. }))
            .count();
        assert_eq!(actuations, 2);
    }

    #[test]
    fn test_execute_rejects_bad_input() {
        let engine = engine();
        engine.set_threshold(SensorKind::Smoke, 100.0).unwrap();

        assert!(execute(&engine, parse_command("set smoke abc").unwrap()).is_err());
        assert_eq!(engine.threshold(SensorKind::Smoke), Some(100.0));
        assert!(matches!(
            execute(&engine, parse_command("on relay").unwrap()),
            Err(EngineError::UnknownDevice(_))
        ));
        assert_eq!(execute(&engine, ShellCommand::Quit).unwrap(), ShellOutcome::Quit);
    }

    #[test]
    fn test_status_mentions_devices() {
        let engine = engine();
        match execute(&engine, ShellCommand::Status).unwrap() {
            ShellOutcome::Reply(line) => {
                assert!(line.contains("running=false"));
                assert!(line.contains("buzzer=off"));
            }
            ShellOutcome::Quit => panic!("status should not quit"),
        }
    }
}
