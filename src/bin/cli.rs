//! Logdump CLI - Command-line interface
//!
//! Pulls the SD-card log off a sensor node over serial and checks it.

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use logdump_core::cli::{CliResult, ExitCodes};
use logdump_core::config::{self, AppConfig};
use logdump_core::core::transport::list_ports;
use logdump_core::{ExtractReport, ExtractionError, StreamExtractor, Summary};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// CLI output format
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable text
    Text,
    /// JSON format for scripting
    Json,
}

/// Logdump CLI
#[derive(Parser, Debug)]
#[command(
    name = "logdump",
    version,
    about = "Retrieve a sensor node's SD-card log over serial",
    long_about = None
)]
struct Cli {
    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "LOGDUMP_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Trigger a dump and save the payload
    Extract {
        #[command(flatten)]
        target: ExtractArgs,
    },

    /// Check a saved dump and print its summary
    Validate {
        /// JSON-lines file
        path: PathBuf,
    },

    /// Extract, then validate; fails unless at least one record came back
    Smoke {
        #[command(flatten)]
        target: ExtractArgs,
    },

    /// List available serial ports
    ListPorts {
        /// Show detailed info
        #[arg(short, long)]
        detailed: bool,
    },

    /// Show the effective configuration
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        init: bool,
    },
}

#[derive(Args, Debug)]
struct ExtractArgs {
    /// Serial port name (e.g., COM3, /dev/ttyUSB0)
    port: String,

    /// Where to save the log
    #[arg(default_value = "logs.jsonl")]
    destination: PathBuf,

    /// Baud rate
    #[arg(short, long)]
    baud: Option<u32>,

    /// Seconds to wait for the device to start the dump
    #[arg(long, value_parser = parse_seconds)]
    timeout: Option<Duration>,

    /// Seconds of silence that end a dump with no end marker
    #[arg(long, value_parser = parse_seconds)]
    quiet_period: Option<Duration>,

    /// Per-read poll timeout in seconds
    #[arg(long, value_parser = parse_seconds)]
    poll: Option<Duration>,
}

fn parse_seconds(s: &str) -> Result<Duration, String> {
    let secs: f64 = s.parse().map_err(|_| format!("`{s}` is not a number of seconds"))?;
    Duration::try_from_secs_f64(secs).map_err(|e| e.to_string())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let app_config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::from(ExitCodes::ERROR);
        }
    };

    let _log_guard = match init_logging(&cli, &app_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::from(ExitCodes::ERROR);
        }
    };

    tracing::debug!("Starting logdump v{}", logdump_core::VERSION);

    let result = match run(&cli, app_config) {
        Ok(result) => result,
        Err(e) => CliResult::error(ExitCodes::ERROR, format!("{e:#}")),
    };

    match &result {
        CliResult::Success(Some(msg)) if !cli.quiet => eprintln!("{msg}"),
        CliResult::Error(_, msg) => eprintln!("Error: {msg}"),
        _ => {}
    }

    result.to_exit_code()
}

fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    match path {
        Some(path) => AppConfig::load_from(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(AppConfig::load().unwrap_or_else(|e| {
            eprintln!("Ignoring config: {e}");
            AppConfig::default()
        })),
    }
}

fn init_logging(cli: &Cli, config: &AppConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        config.logging.level.as_str()
    };

    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    let log_file = cli.log_file.as_ref().or(config.logging.file.as_ref());
    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .context("log file path has no file name")?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false).boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()?;

    Ok(guard)
}

fn run(cli: &Cli, config: AppConfig) -> anyhow::Result<CliResult> {
    match &cli.command {
        Commands::Extract { target } => extract(cli, &config, target),
        Commands::Validate { path } => Ok(validate(cli, path)),
        Commands::Smoke { target } => smoke(cli, &config, target),
        Commands::ListPorts { detailed } => ports(cli, *detailed),
        Commands::Config { init } => show_config(&config, *init),
    }
}

fn cancel_flag() -> anyhow::Result<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&flag);
    ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::SeqCst);
    })?;
    Ok(flag)
}

fn run_extraction(
    config: &AppConfig,
    target: &ExtractArgs,
) -> anyhow::Result<Result<ExtractReport, ExtractionError>> {
    let mut serial = config.serial_config(&target.port);
    if let Some(baud) = target.baud {
        serial.baud_rate = baud;
    }
    if let Some(poll) = target.poll {
        serial.poll_timeout = poll;
    }

    let mut options = config.extract.clone();
    if let Some(timeout) = target.timeout {
        options.overall_timeout = timeout;
    }
    if let Some(quiet) = target.quiet_period {
        options.quiet_period = quiet;
    }

    let extractor = StreamExtractor::new(options).with_cancel_flag(cancel_flag()?);
    Ok(extractor.extract(&serial, &target.destination))
}

fn extract(cli: &Cli, config: &AppConfig, target: &ExtractArgs) -> anyhow::Result<CliResult> {
    let report = match run_extraction(config, target)? {
        Ok(report) => report,
        Err(e) => return Ok(e.into()),
    };

    match cli.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => {
            if let Some(warning) = report.warning {
                eprintln!("Warning: {warning}");
            }
            if let Some(ref message) = report.device_error {
                eprintln!("Device reported: {message}");
            }
        }
    }

    let suffix = if report.is_complete() { "" } else { " (no end marker found)" };
    Ok(CliResult::success_with_message(format!(
        "Saved logs to {}{}",
        report.path.display(),
        suffix
    )))
}

fn print_summary(cli: &Cli, summary: &Summary) {
    match cli.format {
        OutputFormat::Json => match serde_json::to_string_pretty(summary) {
            Ok(json) => println!("{json}"),
            Err(e) => tracing::error!("Cannot render summary: {}", e),
        },
        OutputFormat::Text => println!("{}", summary.to_text()),
    }
}

fn validate(cli: &Cli, path: &Path) -> CliResult {
    match logdump_core::validate(path) {
        Ok(records) => {
            print_summary(cli, &Summary::from_records(&records));
            CliResult::success()
        }
        Err(e) => e.into(),
    }
}

fn smoke(cli: &Cli, config: &AppConfig, target: &ExtractArgs) -> anyhow::Result<CliResult> {
    let path = &target.destination;
    if !cli.quiet {
        eprintln!("Running serial download from {} -> {}", target.port, path.display());
    }

    if let Err(e) = run_extraction(config, target)? {
        return Ok(CliResult::error(
            ExitCodes::DOWNLOAD_FAILED,
            format!("Download failed: {e}"),
        ));
    }

    if !path.exists() {
        return Ok(CliResult::error(
            ExitCodes::OUTPUT_MISSING,
            format!("Expected output file {} not found", path.display()),
        ));
    }

    let records = match logdump_core::validate(path) {
        Ok(records) => records,
        Err(e) => {
            return Ok(CliResult::error(
                ExitCodes::VALIDATION_FAILED,
                format!("Failed validating {}: {e}", path.display()),
            ))
        }
    };

    let summary = Summary::from_records(&records);
    print_summary(cli, &summary);

    if summary.count < 1 {
        return Ok(CliResult::error(
            ExitCodes::NO_RECORDS,
            "No records found: failing smoke test",
        ));
    }

    Ok(CliResult::success_with_message("Smoke test passed"))
}

fn ports(cli: &Cli, detailed: bool) -> anyhow::Result<CliResult> {
    let ports = list_ports()?;

    match cli.format {
        OutputFormat::Json => {
            let json: Vec<serde_json::Value> = ports
                .iter()
                .map(|p| {
                    serde_json::json!({
                        "name": p.port_name,
                        "type": format!("{:?}", p.port_type)
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            if ports.is_empty() && !cli.quiet {
                println!("No serial ports found.");
            }
            for port in &ports {
                if detailed {
                    println!("  {} [{:?}]", port.port_name, port.port_type);
                } else {
                    println!("{}", port.port_name);
                }
            }
        }
    }

    Ok(CliResult::success())
}

fn show_config(config: &AppConfig, init: bool) -> anyhow::Result<CliResult> {
    let path = config::config_file();

    if init {
        let path = path.as_deref().context("could not determine config directory")?;
        config.save_to(path)?;
        return Ok(CliResult::success_with_message(format!(
            "Wrote {}",
            path.display()
        )));
    }

    match &path {
        Some(path) => println!("# {}", path.display()),
        None => println!("# no config directory"),
    }
    println!("{}", toml::to_string_pretty(config)?);
    Ok(CliResult::success())
}
