// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! linkgate CLI
//!
//! Launches an in-process message gateway from a declaration file.
//!
//! # Usage
//!
//! ```bash
//! # Start a gateway from a declaration
//! linkgate run --declaration gateway.json
//!
//! # Validate a declaration without starting anything
//! linkgate validate --declaration gateway.json
//!
//! # Apply one update against a running declaration and exit
//! linkgate apply-update --declaration gateway.json --update updated-gateway.json
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use linkgate_gateway::{GatewayDeclaration, GatewayOrchestrator, ReqwestFetcher};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "linkgate")]
#[command(author = "naskel.com")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run an in-process message gateway from a declaration file")]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a gateway and run it until Ctrl+C
    Run {
        /// Path to the gateway declaration JSON file
        #[arg(short, long)]
        declaration: PathBuf,
    },
    /// Parse a declaration file and report any errors, without starting anything
    Validate {
        /// Path to the gateway declaration JSON file
        #[arg(short, long)]
        declaration: PathBuf,
    },
    /// Build a gateway from `declaration`, apply `update` once, then tear it down
    ApplyUpdate {
        /// Path to the gateway declaration JSON file the gateway starts from
        #[arg(short, long)]
        declaration: PathBuf,
        /// Path to the updated declaration JSON file to apply
        #[arg(short, long)]
        update: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    match cli.command {
        Commands::Run { declaration } => cmd_run(declaration),
        Commands::Validate { declaration } => cmd_validate(declaration),
        Commands::ApplyUpdate { declaration, update } => cmd_apply_update(declaration, update),
    }
}

fn cmd_validate(path: PathBuf) -> Result<()> {
    GatewayDeclaration::from_file(&path).context("declaration failed to parse")?;
    println!("{} is a valid gateway declaration", path.display());
    Ok(())
}

fn cmd_run(path: PathBuf) -> Result<()> {
    let declaration = GatewayDeclaration::from_file(&path).context("declaration failed to parse")?;

    let http_fetcher = ReqwestFetcher::new()
        .map(|f| Arc::new(f) as Arc<dyn linkgate_gateway::HttpFetcher>)
        .ok();

    let orchestrator = GatewayOrchestrator::create_from_declaration(&declaration, http_fetcher, None)
        .context("failed to build gateway from declaration")?;
    orchestrator.start().context("failed to start gateway modules")?;

    tracing::info!(declaration = %path.display(), "gateway started, press Ctrl+C to stop");

    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = stop.clone();
    ctrlc::set_handler(move || {
        tracing::info!("received Ctrl+C, shutting down");
        handler_stop.store(true, Ordering::SeqCst);
    })
    .context("failed to install Ctrl+C handler")?;

    while !stop.load(Ordering::SeqCst) {
        std::thread::sleep(std::time::Duration::from_millis(100));
    }

    orchestrator.destroy().context("gateway shutdown failed")?;
    tracing::info!("gateway shutdown complete");
    Ok(())
}

fn cmd_apply_update(declaration_path: PathBuf, update_path: PathBuf) -> Result<()> {
    let declaration =
        GatewayDeclaration::from_file(&declaration_path).context("declaration failed to parse")?;
    let update_json = std::fs::read_to_string(&update_path).context("failed to read update declaration")?;

    let http_fetcher = ReqwestFetcher::new()
        .map(|f| Arc::new(f) as Arc<dyn linkgate_gateway::HttpFetcher>)
        .ok();

    let orchestrator = GatewayOrchestrator::create_from_declaration(&declaration, http_fetcher, None)
        .context("failed to build gateway from declaration")?;
    orchestrator.start().context("failed to start gateway modules")?;

    orchestrator.apply_update(&update_json).context("failed to apply update")?;
    tracing::info!(update = %update_path.display(), "update applied");

    orchestrator.destroy().context("gateway shutdown failed")?;
    Ok(())
}
