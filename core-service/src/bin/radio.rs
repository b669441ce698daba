//! radio - terminal internet-radio player.
//!
//! Reads one command per line from stdin (`--help` lists them) and prints
//! the results, along with device switches and stream title changes.
//! `--stop` or end of input exits.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use core_playback::StreamingConfig;
use core_runtime::config::CoreConfig;
use core_runtime::events::RecvError;
use core_runtime::logging::{init_logging, parse_log_level, LogFormat, LoggingConfig};
use core_service::{event_notice, RadioService};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Terminal internet-radio player.
#[derive(Parser, Debug)]
#[command(name = "radio")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the settings file (JSON). Defaults to the platform config dir.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "warn", env = "RADIO_LOG_LEVEL")]
    log_level: String,

    /// Log format (pretty, json, compact).
    #[arg(long, env = "RADIO_LOG_FORMAT")]
    log_format: Option<LogFormat>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = parse_log_level(&args.log_level).context("Invalid --log-level")?;
    let mut logging = LoggingConfig::default()
        .with_level(level)
        .with_thread_info(false);
    if let Some(format) = args.log_format {
        logging = logging.with_format(format);
    }
    init_logging(logging).context("Failed to initialise logging")?;

    tracing::info!("radio v{}", env!("CARGO_PKG_VERSION"));

    let mut builder = CoreConfig::builder();
    if let Some(path) = args.config {
        builder = builder.settings_path(path);
    }
    let core = builder.build().context("Failed to configure host bridges")?;

    let service = RadioService::new(core, StreamingConfig::default())
        .await
        .context("Failed to start radio service")?;
    let tasks = service.start_background_tasks();

    let mut events = service.events();
    let notices = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Some(notice) = event_notice(&event) {
                        println!("{}", notice);
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    tracing::debug!(missed, "Event notices lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    println!("Application is ready.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };

        let outcome = service.handle_line(&line).await;
        for line in &outcome.lines {
            println!("{}", line);
        }
        if outcome.exit {
            break;
        }
    }

    service.shutdown();
    notices.abort();
    for task in tasks {
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "Background task failed");
        }
    }

    Ok(())
}
