use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::debug;

use crate::app::commands::{
    add_device_by_address, check_bridge, connect_device, list_known_devices,
    reconnect_known_devices, refresh_devices, resolve_trace_id, restart_bridge_server,
};
use crate::app::config::{config_path, load_config_from_path};
use crate::app::error::AppError;
use crate::app::logging::init_logging;
use crate::app::models::{CommandResponse, ReconnectSummary, TaskKind, TaskReport};
use crate::app::state::AppState;

#[derive(Debug, Parser)]
#[command(name = "fadadb", version, about = "Discover, connect and remember wireless ADB devices")]
pub struct Cli {
    /// Config file (defaults to FADADB_CONFIG_PATH or the user config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Known-devices state file
    #[arg(long, global = true)]
    pub state: Option<PathBuf>,

    /// Path to the adb executable
    #[arg(long, global = true)]
    pub adb: Option<String>,

    /// Print command results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Refresh devices, promoting USB devices to wireless
    Devices,
    /// Connect to a device (interactive selection when no target is given)
    Connect { target: Option<String> },
    /// Reconnect every remembered wireless device
    Reconnect,
    /// Restart the adb server and reconnect remembered devices
    RestartServer,
    /// Connect to an IPv4 address (default port 5555) and remember it
    Add { address: String },
    /// Show remembered wireless devices
    Known,
    /// Check that adb can be run
    Check,
}

struct Session {
    state: Arc<AppState>,
    reports: Receiver<TaskReport>,
    json: bool,
    trace_id: String,
}

impl Session {
    /// Runs one command on a worker and waits for its completion report.
    fn execute<T, F>(&self, kind: TaskKind, op: F) -> Result<CommandResponse<T>, AppError>
    where
        T: Send + 'static,
        F: FnOnce(&AppState, Option<String>) -> Result<CommandResponse<T>, AppError> + Send + 'static,
    {
        let worker = Arc::clone(&self.state);
        let trace = self.trace_id.clone();
        let handle = self
            .state
            .tasks
            .submit(kind, self.trace_id.clone(), move || op(&*worker, Some(trace)))?;
        let result = handle.wait();
        if let Ok(report) = self.reports.recv_timeout(Duration::from_secs(1)) {
            let elapsed_ms = (report.finished_at - report.started_at).num_milliseconds();
            debug!(trace_id = %report.trace_id, kind = ?report.kind, elapsed_ms, "task report");
        }
        result
    }

    fn emit<T: Serialize>(&self, response: &CommandResponse<T>, human: impl FnOnce(&T)) {
        if self.json {
            match serde_json::to_string_pretty(response) {
                Ok(text) => println!("{text}"),
                Err(err) => eprintln!("failed to encode response: {err}"),
            }
        } else {
            human(&response.data);
        }
    }
}

fn print_reconnect(summary: &ReconnectSummary) {
    if summary.attempted.is_empty() {
        println!("No remembered devices.");
        return;
    }
    for endpoint in &summary.attempted {
        let mark = if summary.reconnected.contains(endpoint) { "connected" } else { "unreachable" };
        println!("{endpoint}\t{mark}");
    }
}

fn prompt_selection(count: usize) -> Result<usize, String> {
    print!("Select a device [1-{count}]: ");
    let _ = io::stdout().flush();
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(|err| format!("failed to read selection: {err}"))?;
    match line.trim().parse::<usize>() {
        Ok(choice) if (1..=count).contains(&choice) => Ok(choice - 1),
        _ => Err(format!("invalid selection '{}'", line.trim())),
    }
}

fn dispatch(session: &Session, command: CliCommand) -> Result<(), AppError> {
    match command {
        CliCommand::Devices => {
            let response = session.execute(TaskKind::Refresh, refresh_devices)?;
            session.emit(&response, |list| {
                if list.devices.is_empty() {
                    println!("No devices found.");
                }
                for device in &list.devices {
                    println!("{device}\t{:?}", device.kind());
                }
                if !list.saved {
                    eprintln!("warning: known devices were not saved");
                }
            });
        }
        CliCommand::Connect { target } => {
            let target = match target {
                Some(target) => target,
                None => {
                    let listed = session.execute(TaskKind::Refresh, refresh_devices)?;
                    let devices = listed.data.devices;
                    if devices.is_empty() {
                        return Err(AppError::validation("No devices available", &session.trace_id));
                    }
                    for (index, device) in devices.iter().enumerate() {
                        println!("{}. {device}", index + 1);
                    }
                    let choice = prompt_selection(devices.len())
                        .map_err(|message| AppError::validation(message, &session.trace_id))?;
                    devices[choice].to_string()
                }
            };
            let response = session.execute(TaskKind::Connect, move |state, trace| {
                connect_device(state, target, trace)
            })?;
            session.emit(&response, |outcome| println!("{outcome:?}"));
        }
        CliCommand::Reconnect => {
            let response = session.execute(TaskKind::Reconnect, reconnect_known_devices)?;
            session.emit(&response, print_reconnect);
        }
        CliCommand::RestartServer => {
            let response = session.execute(TaskKind::RestartServer, restart_bridge_server)?;
            session.emit(&response, print_reconnect);
        }
        CliCommand::Add { address } => {
            let response = session.execute(TaskKind::AddByAddress, move |state, trace| {
                add_device_by_address(state, address, trace)
            })?;
            session.emit(&response, |endpoint| println!("Connected and saved {endpoint}"));
        }
        CliCommand::Known => {
            let response = session.execute(TaskKind::ListKnown, list_known_devices)?;
            session.emit(&response, |known| {
                if known.is_empty() {
                    println!("No remembered devices.");
                }
                for endpoint in known {
                    println!("{endpoint}");
                }
            });
        }
        CliCommand::Check => {
            let response = session.execute(TaskKind::CheckBridge, check_bridge)?;
            session.emit(&response, |info| {
                println!("{}", info.command_path);
                println!("{}", info.version_output);
            });
        }
    }
    Ok(())
}

fn build_session(cli: &Cli, trace_id: &str) -> Result<Session, AppError> {
    let path = cli.config.clone().unwrap_or_else(config_path);
    let mut config = load_config_from_path(&path, trace_id)?;
    if let Some(state_path) = &cli.state {
        config.state.path = state_path.to_string_lossy().to_string();
    }
    if let Some(adb) = &cli.adb {
        config.bridge.command_path = adb.clone();
    }
    let (state, reports) = AppState::from_config(config, trace_id);
    Ok(Session {
        state: Arc::new(state),
        reports,
        json: cli.json,
        trace_id: trace_id.to_string(),
    })
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.json_logs);
    let trace_id = resolve_trace_id(None);

    let outcome = build_session(&cli, &trace_id).and_then(|session| dispatch(&session, cli.command));
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if cli.json {
                if let Ok(text) = serde_json::to_string_pretty(&err) {
                    println!("{text}");
                }
            }
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
