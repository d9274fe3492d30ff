//! CC Latch - momentary-to-toggle MIDI Control-Change converter

use anyhow::Result;
use cc_latch::bridge::{LatchInput, LatchOutput};
use cc_latch::config::AppConfig;
use cc_latch::ports::{self, PortDirection};
use cc_latch::{InboundMessage, LatchEngine, Pipeline};
use clap::Parser;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Latch momentary MIDI CC buttons with a triple-tap gesture
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input port (index or name substring); prompted when omitted
    input: Option<String>,

    /// Output port (index or name substring); prompted when omitted
    output: Option<String>,

    /// Path to configuration file
    #[arg(short, long, default_value = "cc-latch.yaml")]
    config: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Also write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// List available MIDI ports
    #[arg(long)]
    list_ports: bool,

    /// Write a default configuration file (with any ports given) and exit
    #[arg(long)]
    init_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let _log_guard = init_logging(&args.log_level, args.log_file.as_deref())?;

    if args.list_ports {
        ports::list_ports_formatted();
        return Ok(());
    }

    if args.init_config {
        let config = AppConfig::default().with_port_overrides(args.input, args.output);
        config.save(&args.config).await?;
        info!("Wrote default configuration to {}", args.config.display());
        return Ok(());
    }

    info!("Starting CC Latch...");
    info!("Configuration file: {}", args.config.display());

    let config = AppConfig::load_or_default(&args.config)
        .await?
        .with_port_overrides(args.input, args.output);

    let Some(input_pattern) = resolve_port(config.midi.input_port.clone(), PortDirection::Input)?
    else {
        info!("No input port selected");
        return Ok(());
    };
    let Some(output_pattern) =
        resolve_port(config.midi.output_port.clone(), PortDirection::Output)?
    else {
        info!("No output port selected");
        return Ok(());
    };

    run(config, &input_pattern, &output_pattern).await?;

    info!("Exit.");
    Ok(())
}

fn resolve_port(configured: Option<String>, direction: PortDirection) -> Result<Option<String>> {
    match configured {
        Some(pattern) => Ok(Some(pattern)),
        None => ports::prompt_for_port(direction),
    }
}

async fn run(config: AppConfig, input_pattern: &str, output_pattern: &str) -> Result<()> {
    let (tx, mut rx) = mpsc::channel::<InboundMessage>(1000);

    let input = LatchInput::connect(input_pattern, tx)?;
    let output = LatchOutput::connect(output_pattern)?;

    let engine = LatchEngine::with_options(config.latch.options());
    info!(
        "Latching '{}' → '{}' (window {}ms, {} presses)",
        input.port_name(),
        output.port_name(),
        engine.options().gesture_window.as_millis(),
        engine.options().toggle_presses
    );
    let mut pipeline = Pipeline::new(engine, output, config.latch.forward_other_messages);

    println!("Entering main loop. Press Control-C to exit.");

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            inbound = rx.recv() => {
                let Some(inbound) = inbound else {
                    warn!("Input channel closed, stopping event loop");
                    break;
                };
                if let Err(e) = pipeline.handle(&inbound) {
                    warn!("{:#}", e);
                }
            }

            _ = &mut shutdown => {
                info!("Shutdown signal received, stopping event loop");
                break;
            }
        }
    }

    let stats = pipeline.stats();
    let engine = pipeline.engine();
    let mut latched: Vec<String> = engine
        .latched_keys()
        .map(|key| format!("ch:{} cc:{}", key.channel + 1, key.controller))
        .collect();
    latched.sort();
    info!(
        "Processed {} messages ({} sent, {} latched outputs, {} suppressed, {} rejected)",
        stats.received, stats.sent, stats.modified, stats.suppressed, stats.rejected
    );
    info!(
        "Tracked {} controllers, latched: [{}]",
        engine.tracked_keys(),
        latched.join(", ")
    );

    input.close();
    pipeline.into_sink().close();

    Ok(())
}

fn init_logging(level: &str, log_file: Option<&std::path::Path>) -> Result<Option<WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let console = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false);

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .init();

    Ok(guard)
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");
}
