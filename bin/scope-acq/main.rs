use clap::Parser;
use env_logger::Env;
use log::{error, info, warn, LevelFilter};
use std::path::{Path, PathBuf};

use scope_acq::config::DEFAULT_CONFIG_FILE;
use scope_acq::{
    acquire_to_csv, load_config, plot_waveform, timestamped_path, AcquisitionSession, AppConfig,
};

/// Single-shot oscilloscope acquisition
#[derive(Parser, Debug)]
#[command(name = "scope-acq")]
#[command(about = "Capture one waveform from a SCPI oscilloscope and save it as CSV")]
struct Args {
    /// Path to configuration file (defaults to ./scope-acq.toml if present)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Override instrument address, e.g. TCPIP::192.168.1.100::INSTR
    #[arg(short, long, value_name = "ADDRESS")]
    address: Option<String>,

    /// Override CSV output path
    #[arg(short, long, value_name = "CSV")]
    output: Option<PathBuf>,

    /// Skip the terminal plot
    #[arg(long)]
    no_plot: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Logging is not up yet, so configuration errors go straight to stderr
    let config = match load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("✗ Invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    let log_level = args
        .log_level
        .clone()
        .unwrap_or(config.logging.log_level.clone());
    initialize_logging(&log_level)?;

    let config = apply_overrides(config, &args);
    if let Err(e) = config.validate() {
        error!("✗ Invalid configuration: {e}");
        std::process::exit(1);
    }
    log_startup_info(&config, args.config.as_ref());

    // Errors end the run here; nothing is retried
    if let Err(e) = run(&config) {
        error!("✗ An error occurred: {}", e);
    }

    Ok(())
}

/// Connect, capture, export and plot
fn run(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = AcquisitionSession::builder()
        .address(&config.instrument.address)
        .config(config.session_config())
        .build()?;

    let idn = session.identify()?;
    info!("Instrument: {}", idn.trim());

    let csv_path = if config.output.timestamped {
        timestamped_path(&config.csv_path(), chrono::Utc::now())
    } else {
        config.csv_path()
    };

    let outcome = acquire_to_csv(&mut session, &config.plan(), &csv_path);
    if outcome.is_ok() {
        match session.max_record_length() {
            Ok(max_points) => info!("Maximum acquisition points supported: {max_points}"),
            Err(e) => warn!("Could not query maximum record length: {e}"),
        }
    }
    if let Err(e) = session.disconnect() {
        warn!("Failed to close instrument session: {e}");
    }
    let result = outcome?;

    info!("✓ {} samples saved to {}", result.len(), csv_path.display());

    if config.output.plot {
        plot_waveform(
            result.time(),
            result.voltage(),
            Some(&format!("Waveform from Channel {}", result.channel.get())),
            Some(config.output.plot_width),
            Some(config.output.plot_height),
        )?;
    }

    Ok(())
}

fn apply_overrides(mut config: AppConfig, args: &Args) -> AppConfig {
    if let Some(address) = &args.address {
        config.instrument.address = address.clone();
    }
    if let Some(output) = &args.output {
        config.output.csv_path = output.display().to_string();
    }
    if args.no_plot {
        config.output.plot = false;
    }
    config
}

/// Log startup information
fn log_startup_info(config: &AppConfig, config_path: Option<&PathBuf>) {
    info!("=== Scope Acquisition ===");
    match config_path {
        Some(path) => info!("Configuration: {}", path.display()),
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            info!("Configuration: {DEFAULT_CONFIG_FILE}")
        }
        None => info!("Configuration: defaults"),
    }
    info!("Instrument: {}", config.instrument.address);
    info!(
        "Acquisition: {} s window, {} points, {:?} transfer",
        config.acquisition.duration_s,
        match config.acquisition.record_length {
            0 => "auto".to_string(),
            n => n.to_string(),
        },
        config.acquisition.format
    );
    info!("Output: {}", config.output.csv_path);
}

/// Initialize logging with configurable level
fn initialize_logging(log_level: &str) -> Result<(), Box<dyn std::error::Error>> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        _ => {
            eprintln!("Warning: Invalid log level '{}', using 'info'", log_level);
            LevelFilter::Info
        }
    };

    env_logger::Builder::from_env(Env::default())
        .filter_level(level)
        .format_timestamp_millis()
        .init();

    Ok(())
}
