//! # farflung-mandel — Mandelbrot Set Demo
//!
//! One coordinator partitions a Mandelbrot image into scanlines; any
//! number of workers pull a row at a time, escape every pixel on it, and
//! send back the iteration counts. The coordinator writes `mandel_image.ppm`
//! once every row is done.

mod mandel;

use anyhow::{Context, Result};
use clap::Parser;
use farflung::{Configuration, Coordinator, Worker};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "farflung-mandel", about = "Mandelbrot demo for the farflung dispatch framework")]
struct Cli {
    /// Run in coordinator mode. Otherwise worker mode (default).
    #[arg(long)]
    server: bool,

    /// Path to the shared configuration file.
    #[arg(long, default_value = "mandel_config.json")]
    config: PathBuf,
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt().json().with_target(false).init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }

    let cli = Cli::parse();
    let config = Configuration::from_json_file(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;

    let rt = tokio::runtime::Runtime::new()?;
    if cli.server {
        rt.block_on(run_coordinator(config))
    } else {
        rt.block_on(run_worker(config))
    }
}

async fn run_coordinator(config: Configuration) -> Result<()> {
    let mandel_info = mandel::MandelInfo::default();
    let state = mandel::MandelServerState::new(mandel_info);
    let coordinator = Coordinator::new(config, mandel::coordinator_callbacks(), state);
    coordinator.run().await?;
    Ok(())
}

async fn run_worker(config: Configuration) -> Result<()> {
    let state = mandel::MandelNodeState::default();
    let worker = Worker::new(config, mandel::worker_callbacks(), state);
    worker.run().await?;
    Ok(())
}
