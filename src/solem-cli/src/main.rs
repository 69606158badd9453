// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

mod commands;
mod config;
mod poll_task;

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use solem_app::init_logging;
use solem_backend::{normalize_name, register_builtin_backends_on, RegistrationContext};
use solem_core::{
    cancel_pair, CancelToken, ClientSettings, DeviceState, DynResult, PeripheralAddress,
    SolemClient, SolemCommand,
};

use config::SolemConfig;

const PKG_DESCRIPTION: &str = concat!(env!("CARGO_PKG_NAME"), " - Solem BLE irrigation controller client");
const REFRESH_CHANNEL_BUFFER: usize = 8;
const INPUT_CHANNEL_BUFFER: usize = 16;
const SHUTDOWN_GRACE: Duration = Duration::from_millis(400);

#[derive(Debug, Parser)]
#[command(
    author = env!("CARGO_PKG_AUTHORS"),
    version = env!("CARGO_PKG_VERSION"),
    about = PKG_DESCRIPTION,
)]
struct Cli {
    /// Path to configuration file
    #[arg(long = "config", short = 'C', value_name = "FILE")]
    config: Option<PathBuf>,
    /// Print example configuration and exit
    #[arg(long = "print-config")]
    print_config: bool,
    /// BLE backend to use (e.g. btleplug, dummy)
    #[arg(short = 'b', long = "backend")]
    backend: Option<String>,
    /// Controller address (overrides [device].address)
    #[arg(short = 'a', long = "address")]
    address: Option<String>,
    /// Log level (trace, debug, info, warn, error)
    #[arg(long = "log-level")]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Poll once and print battery and watering state as JSON
    Status,
    /// Put the controller back into automatic mode
    TurnOn,
    /// Turn the controller off, permanently or for a number of days
    TurnOff {
        #[arg(long)]
        days: Option<u8>,
    },
    /// Water one station
    Sprinkle {
        #[arg(short, long)]
        station: u8,
        #[arg(short, long)]
        minutes: u8,
    },
    /// Water every station in sequence
    SprinkleAll {
        #[arg(short, long)]
        minutes: u8,
    },
    /// Start a stored program
    RunProgram { program: u8 },
    /// Stop manual watering
    Stop,
    /// Run a JSON service call, e.g. '{"service":"turn_on","device_mac":"..."}'
    Call { json: String },
    /// Poll continuously and accept JSON service calls on stdin
    Watch,
    /// List nearby peripherals, Solem controllers first
    Scan {
        /// Scan duration in seconds
        #[arg(short, long, default_value_t = 10)]
        duration: u64,
    },
}

impl Command {
    /// The controller command behind a one-shot subcommand.
    fn solem_command(&self) -> Option<SolemCommand> {
        match *self {
            Command::TurnOn => Some(SolemCommand::TurnOn),
            Command::TurnOff { days: None } => Some(SolemCommand::TurnOffPermanent),
            Command::TurnOff { days: Some(days) } => Some(SolemCommand::TurnOffForDays { days }),
            Command::Sprinkle { station, minutes } => {
                Some(SolemCommand::SprinkleStation { station, minutes })
            }
            Command::SprinkleAll { minutes } => Some(SolemCommand::SprinkleAll { minutes }),
            Command::RunProgram { program } => Some(SolemCommand::RunProgram { program }),
            Command::Stop => Some(SolemCommand::StopManual),
            Command::Status | Command::Call { .. } | Command::Watch | Command::Scan { .. } => None,
        }
    }
}

/// Resolved configuration after merging config file and CLI arguments.
struct ResolvedConfig {
    backend: String,
    address: PeripheralAddress,
    settings: ClientSettings,
}

fn resolve_config(
    cli: &Cli,
    cfg: &SolemConfig,
    registry: &RegistrationContext,
) -> DynResult<ResolvedConfig> {
    let backend = normalize_name(cli.backend.as_deref().unwrap_or(&cfg.device.backend));
    if !registry.is_backend_registered(&backend) {
        return Err(format!(
            "Unknown BLE backend: {} (available: {})",
            backend,
            registry.registered_backends().join(", ")
        )
        .into());
    }

    let address = match cli.address.as_deref().or(cfg.device.address.as_deref()) {
        Some(raw) => PeripheralAddress::parse(raw)?,
        None => {
            return Err(
                "Controller address not specified. Use --address or set [device].address in config."
                    .into(),
            )
        }
    };

    Ok(ResolvedConfig {
        backend,
        address,
        settings: cfg.client_settings()?,
    })
}

#[tokio::main]
async fn main() -> DynResult<()> {
    let cli = Cli::parse();

    if cli.print_config {
        println!("{}", SolemConfig::example_toml());
        return Ok(());
    }

    let (cfg, config_path) = if let Some(ref path) = cli.config {
        (SolemConfig::load_from_file(path)?, Some(path.clone()))
    } else {
        SolemConfig::load_from_default_paths()?
    };
    cfg.validate()
        .map_err(|e| format!("Invalid configuration: {}", e))?;

    init_logging(cli.log_level.as_deref().or(cfg.general.log_level.as_deref()));
    if let Some(ref path) = config_path {
        info!("Loaded configuration from {}", path.display());
    }

    let Some(command) = cli.command.clone() else {
        return Err("No command given (see --help)".into());
    };
    if let Command::Scan { duration } = command {
        return run_scan(Duration::from_secs(duration)).await;
    }

    let mut registry = RegistrationContext::new();
    register_builtin_backends_on(&mut registry);
    let resolved = resolve_config(&cli, &cfg, &registry)?;
    let profile = resolved.settings.profile;
    let backend = registry.build_backend(&resolved.backend, &profile)?;
    info!(
        "Using controller {} via {} backend",
        resolved.address, resolved.backend
    );
    let client = Arc::new(SolemClient::new(resolved.address, backend, resolved.settings));

    let result = match command {
        Command::Status => run_status(&client).await,
        Command::Call { ref json } => run_call(&client, json).await,
        Command::Watch => run_watch(Arc::clone(&client), &cfg).await,
        ref other => match other.solem_command() {
            Some(solem_command) => run_command(&client, solem_command).await,
            None => Ok(()),
        },
    };

    client.disconnect().await;
    result
}

async fn run_status(client: &SolemClient) -> DynResult<()> {
    let snapshot = tokio::select! {
        result = client.poll() => result?,
        _ = signal::ctrl_c() => return Err("Interrupted".into()),
    };
    println!("{}", serde_json::to_string(&snapshot)?);
    Ok(())
}

async fn run_command(client: &SolemClient, command: SolemCommand) -> DynResult<()> {
    tokio::select! {
        result = client.send(command) => result?,
        _ = signal::ctrl_c() => return Err("Interrupted".into()),
    }
    info!("{} sent", command);
    Ok(())
}

async fn run_call(client: &SolemClient, json: &str) -> DynResult<()> {
    let (handle, token) = cancel_pair();
    let report = tokio::select! {
        report = commands::execute_call(client, json, &token) => report,
        _ = signal::ctrl_c() => {
            handle.cancel();
            return Err("Interrupted".into());
        }
    };
    println!("{}", serde_json::to_string(&report)?);
    match report.error {
        Some(e) if !report.ok => Err(e.into()),
        _ => Ok(()),
    }
}

async fn run_watch(client: Arc<SolemClient>, cfg: &SolemConfig) -> DynResult<()> {
    let (cancel_handle, cancel) = cancel_pair();
    let (refresh_tx, refresh_rx) = mpsc::channel::<()>(REFRESH_CHANNEL_BUFFER);
    let (state_tx, mut state_rx) = watch::channel(DeviceState::new(client.address().as_str()));
    let mut task_handles: Vec<JoinHandle<()>> = Vec::new();

    task_handles.push(tokio::spawn(poll_task::run_poll_task(
        Arc::clone(&client),
        cfg.behavior.polling(),
        refresh_rx,
        state_tx,
        cancel.clone(),
    )));

    task_handles.push(tokio::spawn(async move {
        while state_rx.changed().await.is_ok() {
            let state = state_rx.borrow_and_update().clone();
            match serde_json::to_string(&state) {
                Ok(line) => println!("{}", line),
                Err(e) => error!("Failed to encode device state: {}", e),
            }
        }
    }));

    task_handles.push(tokio::spawn(read_service_calls(
        Arc::clone(&client),
        spawn_stdin_reader()?,
        refresh_tx,
        cancel.clone(),
    )));

    signal::ctrl_c().await?;
    info!("Ctrl+C received, shutting down");
    cancel_handle.cancel();
    tokio::time::sleep(SHUTDOWN_GRACE).await;

    for handle in &task_handles {
        if !handle.is_finished() {
            handle.abort();
        }
    }
    for handle in task_handles {
        let _ = handle.await;
    }
    Ok(())
}

/// Forward stdin lines from a plain thread. A read blocked there is left
/// behind at exit instead of holding up runtime shutdown.
fn spawn_stdin_reader() -> std::io::Result<mpsc::Receiver<String>> {
    let (line_tx, line_rx) = mpsc::channel(INPUT_CHANNEL_BUFFER);
    std::thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if line_tx.blocking_send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("stdin read failed: {}", e);
                        break;
                    }
                }
            }
        })?;
    Ok(line_rx)
}

/// One JSON service call per input line; each call is followed by a refresh.
async fn read_service_calls(
    client: Arc<SolemClient>,
    mut lines: mpsc::Receiver<String>,
    refresh_tx: mpsc::Sender<()>,
    cancel: CancelToken,
) {
    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.recv() => line,
        };
        let Some(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let report = commands::execute_call(&client, &line, &cancel).await;
        match serde_json::to_string(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => error!("Failed to encode call report: {}", e),
        }
        if report.intent.is_some() && refresh_tx.try_send(()).is_err() {
            warn!("Refresh already pending, skipping");
        }
    }
}

#[cfg(feature = "btleplug")]
async fn run_scan(duration: Duration) -> DynResult<()> {
    info!("Scanning for {:?}", duration);
    for device in solem_backend::scan(duration).await? {
        println!("{}", serde_json::to_string(&device)?);
    }
    Ok(())
}

#[cfg(not(feature = "btleplug"))]
async fn run_scan(_duration: Duration) -> DynResult<()> {
    Err("scan needs a radio; rebuild with the `btleplug` feature".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use solem_core::{GattProfile, SimulatedPeripheral};
    use tokio::time;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("solem").chain(args.iter().copied())).unwrap()
    }

    fn registry() -> RegistrationContext {
        let mut registry = RegistrationContext::new();
        register_builtin_backends_on(&mut registry);
        registry
    }

    #[test]
    fn test_subcommands_map_to_controller_commands() {
        let cases = [
            (vec!["turn-on"], Some(SolemCommand::TurnOn)),
            (vec!["turn-off"], Some(SolemCommand::TurnOffPermanent)),
            (
                vec!["turn-off", "--days", "2"],
                Some(SolemCommand::TurnOffForDays { days: 2 }),
            ),
            (
                vec!["sprinkle", "--station", "3", "--minutes", "15"],
                Some(SolemCommand::SprinkleStation {
                    station: 3,
                    minutes: 15,
                }),
            ),
            (
                vec!["sprinkle-all", "-m", "10"],
                Some(SolemCommand::SprinkleAll { minutes: 10 }),
            ),
            (
                vec!["run-program", "1"],
                Some(SolemCommand::RunProgram { program: 1 }),
            ),
            (vec!["stop"], Some(SolemCommand::StopManual)),
            (vec!["status"], None),
            (vec!["watch"], None),
        ];
        for (args, expected) in cases {
            let parsed = cli(&args);
            let command = parsed.command.unwrap();
            assert_eq!(command.solem_command(), expected, "args: {:?}", args);
        }
    }

    #[test]
    fn test_out_of_range_argument_rejected_by_parser() {
        let result = Cli::try_parse_from(["solem", "sprinkle", "--station", "1", "--minutes", "300"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_resolve_prefers_cli_over_config() {
        let mut cfg = SolemConfig::default();
        cfg.device.address = Some("11:22:33:44:55:66".to_string());
        let parsed = cli(&["--backend", "Dummy", "--address", "aa:bb:cc:dd:ee:ff", "status"]);

        let resolved = resolve_config(&parsed, &cfg, &registry()).unwrap();
        assert_eq!(resolved.backend, "dummy");
        assert_eq!(resolved.address.as_str(), "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn test_resolve_requires_address() {
        let parsed = cli(&["--backend", "dummy", "status"]);
        let err = resolve_config(&parsed, &SolemConfig::default(), &registry())
            .err()
            .map(|e| e.to_string())
            .unwrap_or_default();
        assert!(err.contains("address not specified"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_service_call_reader_stops_on_cancel_with_input_open() {
        let sim = SimulatedPeripheral::for_profile(&GattProfile::default());
        let address = PeripheralAddress::parse("AA:BB:CC:DD:EE:FF").unwrap();
        let client = Arc::new(SolemClient::new(
            address,
            Box::new(sim.clone()),
            ClientSettings::default(),
        ));
        let (line_tx, line_rx) = mpsc::channel(4);
        let (refresh_tx, mut refresh_rx) = mpsc::channel(4);
        let (handle, token) = cancel_pair();

        let reader = tokio::spawn(read_service_calls(client, line_rx, refresh_tx, token));
        line_tx
            .send(r#"{"service": "turn_on", "device_mac": "AA:BB:CC:DD:EE:FF"}"#.to_string())
            .await
            .unwrap();
        refresh_rx.recv().await.unwrap();
        assert_eq!(sim.writes().len(), 2);

        handle.cancel();
        time::timeout(Duration::from_millis(100), reader)
            .await
            .expect("reader still running after cancel")
            .unwrap();
        assert!(!line_tx.is_closed());
    }

    #[test]
    fn test_resolve_rejects_unknown_backend() {
        let parsed = cli(&["--backend", "bluez", "--address", "AA:BB:CC:DD:EE:FF", "status"]);
        assert!(resolve_config(&parsed, &SolemConfig::default(), &registry()).is_err());
    }
}
