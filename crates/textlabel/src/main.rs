mod cli;
mod config;
mod logging;
mod report;
mod server;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use textlabel_core::Annotator;

use crate::cli::{Cli, Command};
use crate::config::AppConfig;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = if cli.verbose {
        true
    } else {
        logging::env_flag()
    };
    logging::init(verbose);
    let mut config = AppConfig::load(&cli.config)?;
    match cli.command {
        Command::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            serve(config)
        }
        Command::Stats { json } => report::stats(&config, json),
        Command::Check => report::check(&config),
    }
}

fn serve(config: AppConfig) -> Result<()> {
    let annotator = Annotator::open(
        &config.item_source(),
        &config.data.labels,
        &config.data.results,
    )
    .context("failed to open annotation state")?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start runtime")?;
    runtime.block_on(server::serve(Arc::new(annotator), &config.server.bind))
}
