//! Command-line interface.

use crate::client::http::HarvesterClient;
use crate::config::HarvestConfig;
use crate::harvest::HarvestOutcome;
use crate::limiter::RateController;
use crate::shutdown::SharedShutdown;
use crate::{BoundingBox, Scheduler};
use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Short-term-rental listing harvester.
#[derive(Parser)]
#[command(name = "doorstep-harvester", version, about)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// Harvest every listing inside a bounding box
    Harvest(HarvestArgs),
}

/// Arguments for the `harvest` subcommand.
#[derive(Args)]
pub struct HarvestArgs {
    /// North-east corner latitude
    #[arg(long)]
    pub ne_lat: f64,

    /// North-east corner longitude
    #[arg(long)]
    pub ne_lng: f64,

    /// South-west corner latitude
    #[arg(long)]
    pub sw_lat: f64,

    /// South-west corner longitude
    #[arg(long)]
    pub sw_lng: f64,

    /// Force preview mode regardless of the config file
    #[arg(long)]
    pub preview: bool,

    /// Path to the TOML configuration file
    #[arg(long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Where to write the harvested data as JSON
    #[arg(long, default_value = "harvest.json")]
    pub output: PathBuf,
}

/// Execute the parsed command.
pub async fn execute(cli: Cli, shutdown: SharedShutdown) -> anyhow::Result<()> {
    match cli.command {
        Commands::Harvest(args) => harvest(args, shutdown).await,
    }
}

async fn harvest(args: HarvestArgs, shutdown: SharedShutdown) -> anyhow::Result<()> {
    let mut config = if args.config.exists() {
        HarvestConfig::from_path(&args.config)?
    } else {
        info!(path = %args.config.display(), "no config file, using defaults");
        HarvestConfig::default()
    };
    if args.preview {
        config.is_web_preview = true;
    }

    let area = BoundingBox::new(args.ne_lat, args.ne_lng, args.sw_lat, args.sw_lng)
        .map_err(anyhow::Error::msg)?;

    let controller = RateController::shared(config.pacer());
    let client = Arc::new(
        HarvesterClient::new(Arc::clone(&controller), &config)
            .context("failed to build the API client")?,
    );
    let scheduler = Scheduler::new(client, controller, shutdown, &config);

    info!(
        ne_lat = area.ne_lat,
        ne_lng = area.ne_lng,
        sw_lat = area.sw_lat,
        sw_lng = area.sw_lng,
        preview = config.is_web_preview,
        "starting harvest"
    );
    let outcome = scheduler.harvest(area).await?;

    for (listing_id, category) in &outcome.summary.failures {
        warn!(%listing_id, %category, "category failed for listing");
    }
    write_output(&args.output, &outcome)
        .with_context(|| format!("failed to write {}", args.output.display()))?;

    info!(summary = %outcome.summary, output = %args.output.display(), "done");
    Ok(())
}

/// Write the listing summaries and job reports as one JSON document.
fn write_output(path: &PathBuf, outcome: &HarvestOutcome) -> anyhow::Result<()> {
    let records: Vec<_> = outcome
        .reports
        .iter()
        .map(|report| {
            json!({
                "job": report.job,
                "data": report.data,
            })
        })
        .collect();
    let document = json!({
        "summary": outcome.summary,
        "listings": outcome.listings,
        "reports": records,
    });

    let mut file = std::fs::File::create(path)?;
    serde_json::to_writer_pretty(&mut file, &document)?;
    file.write_all(b"\n")?;
    Ok(())
}
