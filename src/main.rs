// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/envguard

//! EnvGuard - Environmental Sensor Monitoring and Actuation
//!
//! Headless console: events are logged as they arrive and operator commands
//! are read from stdin. Ctrl+C or `quit` runs the shutdown path once.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use envguard::core::{Event, EventPayload, StatusLevel, Subscription, Topic};
use envguard::shell::{self, ShellOutcome};
use envguard::{Config, Engine, VERSION};

/// EnvGuard - Environmental Sensor Monitoring and Actuation
#[derive(Parser, Debug)]
#[command(name = "envguard")]
#[command(author = "bad-antics")]
#[command(version = VERSION)]
#[command(about = "Poll environmental sensors and drive alarms on threshold breach")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable trace-level logging
    #[arg(long)]
    trace: bool,

    /// Demo mode with simulated sensors and virtual outputs
    #[arg(long)]
    demo: bool,

    /// Override the polling interval
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Print events as JSON lines
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging; RUST_LOG overrides the flags
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(args.debug, args.trace)));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(args.debug)
        .with_line_number(args.debug)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("EnvGuard v{} - Environmental Sensor Monitoring", VERSION);

    // Load or create configuration
    let config_path = args.config.unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_create(&config_path)
        .with_context(|| format!("loading configuration from {:?}", config_path))?;

    // Override with command line args
    if args.demo {
        config.demo_mode = true;
    }
    if let Some(interval_ms) = args.interval_ms {
        config.polling.interval_ms = interval_ms;
    }
    if args.json {
        config.events.json = true;
    }
    config.validate()?;

    info!("Configuration loaded from {:?}", config_path);
    info!("Demo mode: {}", config.demo_mode);

    let engine = Arc::new(build_engine(&config)?);
    run(engine, config)
}

fn default_directive(debug: bool, trace: bool) -> &'static str {
    if trace {
        "trace"
    } else if debug {
        "debug"
    } else {
        "info"
    }
}

fn build_engine(config: &Config) -> Result<Engine> {
    if config.demo_mode {
        return Engine::demo(config).context("assembling demo engine");
    }

    #[cfg(feature = "hardware")]
    {
        Engine::hardware(config).context("claiming sensor and output pins")
    }

    #[cfg(not(feature = "hardware"))]
    {
        anyhow::bail!("Hardware feature not enabled. Build with --features hardware or use --demo");
    }
}

fn run(engine: Arc<Engine>, config: Config) -> Result<()> {
    let printing = Arc::new(AtomicBool::new(true));
    let printer = {
        let events = engine.subscribe(Topic::All);
        let printing = Arc::clone(&printing);
        let json = config.events.json;
        thread::Builder::new()
            .name("events".to_string())
            .spawn(move || print_events(events, &printing, json))?
    };

    if let Err(e) = engine.start() {
        error!("Startup failed: {}", e);
        engine.shutdown();
        return Err(e.into());
    }

    let (quit_tx, mut quit_rx) = tokio::sync::mpsc::unbounded_channel::<()>();
    {
        let engine = Arc::clone(&engine);
        thread::Builder::new()
            .name("console".to_string())
            .spawn(move || read_console(&engine, quit_tx))?;
    }

    info!("EnvGuard running. Type 'help' for commands, Ctrl+C or 'quit' to exit");

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!("Signal handler failed: {}", e);
                }
                info!("Shutdown signal received, cleaning up...");
            }
            Some(()) = quit_rx.recv() => {
                info!("Quit requested, cleaning up...");
            }
        }
    });

    let report = engine.shutdown();
    for failure in &report.failures {
        warn!("Shutdown issue: {}", failure);
    }

    printing.store(false, Ordering::SeqCst);
    if printer.join().is_err() {
        warn!("Event printer panicked");
    }

    info!(
        "EnvGuard shutdown complete ({} loops, {} devices, {} pins released)",
        report.loops_stopped, report.devices_closed, report.claims_released
    );
    Ok(())
}

fn print_events(events: Subscription, printing: &AtomicBool, json: bool) {
    while printing.load(Ordering::SeqCst) {
        let Some(event) = events.recv_timeout(Duration::from_millis(200)) else {
            continue;
        };
        if json {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e) => warn!("Cannot encode event {}: {}", event.id, e),
            }
        } else {
            log_event(&event);
        }
    }
}

fn log_event(event: &Event) {
    match &event.payload {
        EventPayload::Reading(r) => info!("{} {} = {:.1}{}", r.sensor_id, r.kind, r.value, r.kind.unit()),
        EventPayload::Threshold(t) => warn!("{} {} above limit {}", t.kind, t.value, t.limit),
        EventPayload::Actuation { device, state, .. } => info!("{} -> {:?}", device, state),
        EventPayload::Status { level, message } => match level {
            StatusLevel::Info => info!("{}", message),
            StatusLevel::Warning | StatusLevel::Alert => warn!("{}", message),
        },
        EventPayload::SensorFault { family, sensor, message } => {
            error!("{} sensor {} failed: {}", family, sensor, message)
        }
    }
}

/// Stdin reader; EOF leaves the engine running until Ctrl+C
fn read_console(engine: &Engine, quit: tokio::sync::mpsc::UnboundedSender<()>) {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("Console read failed: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let command = match shell::parse_command(&line) {
            Ok(command) => command,
            Err(e) => {
                println!("{} ({})", e, shell::HELP);
                continue;
            }
        };
        match shell::execute(engine, command) {
            Ok(ShellOutcome::Reply(reply)) => println!("{}", reply),
            Ok(ShellOutcome::Quit) => {
                let _ = quit.send(());
                return;
            }
            Err(e) => println!("error: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive_follows_flags() {
        assert_eq!(default_directive(false, false), "info");
        assert_eq!(default_directive(true, false), "debug");
        assert_eq!(default_directive(true, true), "trace");
        assert!(EnvFilter::try_new(default_directive(false, true)).is_ok());
    }
}
