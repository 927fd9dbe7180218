//! Cellport CLI - drive a cellular modem's AT and MBIM control ports.
//!
//! This is the main binary entry point. See the `cellport` library for the
//! port loop and protocol engines.

use anyhow::{bail, Context, Result};
use cellport::mbim::message::ActivationCommand;
use cellport::mbim::{procedures, CommandCode, FunctionMessage};
use cellport::{create_port, AtPort, Config, DevicePort, MbimPort, PortRole};
use mimalloc::MiMalloc;

/// Global allocator configured per M-MIMALLOC-APPS guideline.
/// mimalloc provides better multi-threaded performance than the system allocator.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Global flag for signal-triggered shutdown (as Arc for signal-hook compatibility)
static SHUTDOWN_FLAG: std::sync::LazyLock<Arc<AtomicBool>> =
    std::sync::LazyLock::new(|| Arc::new(AtomicBool::new(false)));

/// Indications `monitor` logs besides CONNECT, which the port logs itself.
const MONITORED_INDICATIONS: [CommandCode; 6] = [
    CommandCode::SubscriberReadyStatus,
    CommandCode::RadioState,
    CommandCode::RegisterState,
    CommandCode::PacketService,
    CommandCode::SignalState,
    CommandCode::IpConfiguration,
];

// CLI
#[derive(Parser)]
#[command(name = "cellport")]
#[command(version)]
#[command(about = "Control a cellular modem over its AT and MBIM ports")]
struct Cli {
    /// AT port device (overrides config)
    #[arg(long, global = true)]
    at_port: Option<PathBuf>,
    /// MBIM control device (overrides config)
    #[arg(long, global = true)]
    mbim_port: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the MBIM function and subscribe to indications
    Init,
    /// Clear subscriptions and close the MBIM function
    Shutdown,
    /// Activate the internet data session
    Connect {
        /// Access point name (defaults to the configured one)
        #[arg(long)]
        apn: Option<String>,
    },
    /// Deactivate the internet data session
    Disconnect,
    /// Send one AT command and print the answer
    At {
        /// Command text, e.g. "AT+CSQ"
        command: String,
    },
    /// Open both ports and log indications and URCs until interrupted
    Monitor,
    /// Print the effective configuration
    Config,
}

fn open_mbim(config: &Config) -> Result<MbimPort> {
    let role = PortRole::Mbim {
        max_control_transfer: config.max_control_transfer,
    };
    let DevicePort::Mbim(mut port) = create_port(&config.mbim_port, role)? else {
        bail!("{} did not start as an MBIM port", config.mbim_port.display());
    };
    port.set_command_timeout(config.command_timeout());
    Ok(port)
}

fn open_at(config: &Config) -> Result<AtPort> {
    let DevicePort::At(mut port) = create_port(&config.at_port, PortRole::At)? else {
        bail!("{} did not start as an AT port", config.at_port.display());
    };
    port.set_command_timeout(config.command_timeout());
    Ok(port)
}

fn run_connect(config: &Config, activation: ActivationCommand, apn: Option<&str>) -> Result<()> {
    let port = open_mbim(config)?;
    procedures::initialize(&port)?;
    match procedures::connect(&port, activation, apn)? {
        Some(ip) => println!("{ip}"),
        None if activation == ActivationCommand::Activate => {
            println!("Connected (no IPv4 configuration reported)");
        }
        None => println!("Disconnected"),
    }
    Ok(())
}

fn run_at(config: &Config, command: &str) -> Result<()> {
    let port = open_at(config)?;
    let answer = port
        .send(command)
        .with_context(|| format!("{command} failed"))?;
    if !answer.body.is_empty() {
        println!("{}", answer.body);
    }
    println!("{}", answer.result);
    if !answer.result.is_success() {
        bail!("{command}: {}", answer.result);
    }
    Ok(())
}

fn log_indication(msg: FunctionMessage) {
    let Some(indication) = msg.indication() else {
        return;
    };
    let code = msg
        .command_code()
        .map_or_else(|| format!("cid {}", indication.cid), |c| c.to_string());
    log::info!(
        "{code} indication ({} bytes): {}",
        indication.information.len(),
        cellport::mbim::frame::hex_dump(indication.information)
    );
}

/// Runs both ports until SIGINT/SIGTERM/SIGHUP.
fn run_monitor(config: &Config) -> Result<()> {
    // Set up signal handlers
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::flag;
    flag::register(SIGINT, Arc::clone(&SHUTDOWN_FLAG))?;
    flag::register(SIGTERM, Arc::clone(&SHUTDOWN_FLAG))?;
    flag::register(SIGHUP, Arc::clone(&SHUTDOWN_FLAG))?;

    let mbim = open_mbim(config)?;
    for code in MONITORED_INDICATIONS {
        mbim.on_indication("monitor", code, log_indication);
    }
    procedures::initialize(&mbim)?;

    // The AT port is optional; URCs with no handler are logged by the port.
    let at = match open_at(config) {
        Ok(port) => Some(port),
        Err(e) => {
            log::warn!("AT port unavailable: {e:#}");
            None
        }
    };

    println!("Monitoring. Press Ctrl-C to stop.");
    while !SHUTDOWN_FLAG.load(Ordering::Relaxed) {
        if mbim.handle().is_closed() {
            bail!("MBIM port {} closed", mbim.handle().name());
        }
        std::thread::sleep(Duration::from_millis(100));
    }

    println!("Shutting down...");
    procedures::shutdown(&mbim)?;
    drop(at);
    Ok(())
}

fn init_logging() -> Result<()> {
    // CELLPORT_LOG_FILE sends logs to a file instead of stderr
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    builder.format_timestamp_secs();
    if let Ok(path) = std::env::var("CELLPORT_LOG_FILE") {
        let log_file = std::fs::File::create(&path)
            .with_context(|| format!("Failed to create log file at {path}"))?;
        builder.target(env_logger::Target::Pipe(Box::new(log_file)));
    }
    builder.init();
    Ok(())
}

fn main() -> Result<()> {
    init_logging()?;

    let cli = Cli::parse();
    let mut config = Config::load()?;
    if let Some(path) = cli.at_port {
        config.at_port = path;
    }
    if let Some(path) = cli.mbim_port {
        config.mbim_port = path;
    }

    match cli.command {
        Commands::Init => {
            let port = open_mbim(&config)?;
            procedures::initialize(&port)?;
            println!("MBIM function open");
        }
        Commands::Shutdown => {
            let port = open_mbim(&config)?;
            let status = procedures::shutdown(&port)?;
            println!("MBIM close: {status}");
        }
        Commands::Connect { apn } => {
            let apn = apn.or_else(|| config.apn.clone());
            run_connect(&config, ActivationCommand::Activate, apn.as_deref())?;
        }
        Commands::Disconnect => {
            run_connect(&config, ActivationCommand::Deactivate, None)?;
        }
        Commands::At { command } => {
            run_at(&config, &command)?;
        }
        Commands::Monitor => {
            run_monitor(&config)?;
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
