// src/main.rs
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use agro_scout::cli::{Cli, Commands};
use agro_scout::config::PipelineConfig;
use agro_scout::io::GeoTiffWriter;
use agro_scout::plot::parse_plots_json;
use agro_scout::processing::{AcquisitionScheduler, BandAlgebraEngine};
use agro_scout::quality::{QualityFilter, QualityThresholds};
use agro_scout::selection::{DateSelectorParams, SearchCache};
use agro_scout::services::{CopernicusAuth, CopernicusSearch, ProcessApiDownload, RateLimiter};
use agro_scout::store::InMemoryRecordStore;
use agro_scout::utils::retry::RetryPolicy;
use agro_scout::BatchCoordinator;

fn load_config(path: &Path) -> Result<PipelineConfig> {
    if path.exists() {
        PipelineConfig::from_file(path).context("loading configuration")
    } else if path == Path::new("config.json") {
        tracing::info!("no config.json found, using defaults");
        let mut config = PipelineConfig::default();
        config.auth.apply_env_overrides();
        Ok(config)
    } else {
        anyhow::bail!("configuration file {} does not exist", path.display());
    }
}

fn load_plots(path: &Path) -> Result<Vec<agro_scout::PlotDescriptor>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading plots file {}", path.display()))?;
    let plots = parse_plots_json(&raw).context("parsing plots file")?;
    anyhow::ensure!(!plots.is_empty(), "plots file contains no plots");
    Ok(plots)
}

fn build_scheduler(config: &PipelineConfig) -> Result<AcquisitionScheduler> {
    let auth = Arc::new(CopernicusAuth::new(&config.api.token_url, &config.auth)?);
    let search = Arc::new(CopernicusSearch::new(&config.api.search_url, auth.clone())?);
    let download = Arc::new(ProcessApiDownload::new(
        &config.api.download_url,
        auth,
        config.processing.image_width,
        config.processing.image_height,
        config.quality.max_cloud_pct,
        config.api.download_timeout_secs,
    )?);
    let writer = Arc::new(GeoTiffWriter::new(&config.output.directory));
    let limiter = Arc::new(RateLimiter::new(
        config.limits.max_concurrent_calls,
        Duration::from_secs_f64(config.limits.request_delay_secs),
    ));
    let engine = BandAlgebraEngine::new(config.index_kinds());
    let quality = QualityFilter::new(QualityThresholds {
        max_cloud_pct: config.quality.max_cloud_pct,
        min_data_pct: config.quality.min_data_pct,
        opening_radius: config.quality.opening_radius,
        closing_radius: config.quality.closing_radius,
    });
    let selector = DateSelectorParams {
        max_cloud_pct: config.quality.max_cloud_pct,
        min_interval_days: config.selection.min_interval_days,
        anchor_tolerance_days: config.selection.anchor_tolerance_days,
        growth_stage_bias: config.selection.growth_stage_bias,
    };
    let retry = RetryPolicy {
        max_attempts: config.limits.max_retries.max(1),
        ..RetryPolicy::default()
    };

    Ok(AcquisitionScheduler::new(
        search,
        download,
        writer,
        Arc::new(InMemoryRecordStore::new()),
        Arc::new(SearchCache::new(config.selection.cache_ttl_hours)),
        limiter,
        engine,
        quality,
        selector,
        retry,
    ))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let mut config = load_config(&cli.config)?;
    if let Some(output) = &cli.output {
        config.output.directory = output.display().to_string();
    }

    match &cli.command {
        Commands::Run { plots } => {
            let plots = load_plots(plots)?;
            let scheduler = Arc::new(build_scheduler(&config)?);
            let coordinator = BatchCoordinator::new(scheduler, &config.limits);
            let summary = coordinator.run(&plots);
            println!(
                "Processed {} dates across {} plots ({} rejected, {} failed, {} skipped)",
                summary.dates_processed,
                summary.plots_attempted,
                summary.dates_rejected,
                summary.dates_failed,
                summary.dates_skipped
            );
            if summary.plots_failed > 0 {
                anyhow::bail!("{} plots failed", summary.plots_failed);
            }
        }
        Commands::Plan { plots } => {
            let plots = load_plots(plots)?;
            let scheduler = build_scheduler(&config)?;
            for plot in &plots {
                let dates = scheduler.plan(plot)?;
                println!("{}: {} dates selected", plot.id, dates.len());
                for date in dates {
                    println!("  {date}");
                }
            }
        }
    }

    Ok(())
}
