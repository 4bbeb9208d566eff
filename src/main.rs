use anyhow::Result;
use clap::{Parser, Subcommand};
use edgewatch::logging::{init_logging, LogOptions};
use edgewatch::{AppConfig, BusClient, EdgeOrchestrator, EdgewatchError, RunMode};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "edgewatch")]
#[command(about = "Edge video analytics: stream ingestion, object detection and tracking")]
#[command(version)]
#[command(long_about = "Ingests camera streams, runs object detection on an accelerator \
(falling back to a CPU runtime), tracks objects across frames, and publishes raw frames, \
annotated frames, track snapshots and liveness probes to a TTL key-value bus.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "edgewatch.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level for all crates)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting any unit")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long, value_name = "DIR")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingestion and pipeline for every configured stream (default)
    Run,
    /// Ingestion only, for one stream
    Ingest {
        /// Stream name from the configuration
        stream: String,
    },
    /// Detection, tracking and annotation only, for one stream
    Pipeline {
        /// Stream name from the configuration
        stream: String,
    },
}

impl Command {
    fn mode(self) -> RunMode {
        match self {
            Command::Run => RunMode::All,
            Command::Ingest { stream } => RunMode::Ingest(stream),
            Command::Pipeline { stream } => RunMode::Pipeline(stream),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    let mut logging = init_logging(&LogOptions {
        debug: args.debug,
        verbose: args.verbose,
        quiet: args.quiet,
        format: args.log_format.clone(),
        file_dir: args.log_file.clone(),
    })?;

    info!("Starting edgewatch v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match AppConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        eprintln!("✗ Configuration validation failed: {}", e);
        drop(logging);
        std::process::exit(1);
    }

    if args.validate_config {
        info!("Configuration validation successful");
        println!("✓ Configuration is valid");
        return Ok(());
    }

    let mode = args.command.unwrap_or(Command::Run).mode();

    let bus = BusClient::connect(&config.bus).await.map_err(|e| {
        error!("Failed to connect to the bus: {}", e);
        e
    })?;

    let log_cancel = CancellationToken::new();
    let log_task = logging
        .take_shipper()
        .map(|shipper| shipper.spawn(bus.clone(), log_cancel.clone()));

    let mut orchestrator = match EdgeOrchestrator::new(config, mode, bus).await {
        Ok(orchestrator) => orchestrator,
        Err(EdgewatchError::UnknownStream { name }) => {
            error!("Unknown stream '{}'", name);
            eprintln!("✗ Unknown stream '{}'", name);
            drop(logging);
            std::process::exit(2);
        }
        Err(e) => {
            error!("Failed to create orchestrator: {}", e);
            return Err(e.into());
        }
    };

    orchestrator.initialize().await.map_err(|e| {
        error!("Failed to initialize units: {}", e);
        e
    })?;

    orchestrator.start().await.map_err(|e| {
        error!("Failed to start units: {}", e);
        e
    })?;

    let exit_code = orchestrator.run().await.map_err(|e| {
        error!("System error during execution: {}", e);
        e
    })?;

    info!("Edgewatch exited with code: {}", exit_code);

    log_cancel.cancel();
    if let Some(task) = log_task {
        let _ = tokio::time::timeout(Duration::from_secs(2), task).await;
    }

    // process::exit skips destructors; the file writer flushes on drop
    drop(logging);
    std::process::exit(exit_code);
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# Edgewatch configuration file");
    println!("# Every value below is the built-in default.");
    println!("# Environment overrides use EDGEWATCH_<SECTION>__<KEY>, e.g. EDGEWATCH_BUS__URL.");
    println!();
    println!("{}", AppConfig::default().to_toml_string()?);
    Ok(())
}
