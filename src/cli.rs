use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "agro-scout")]
#[command(about = "Satellite imagery acquisition and vegetation index pipeline")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Pipeline configuration file
    #[arg(short, long, default_value = "config.json", global = true)]
    pub config: PathBuf,

    /// Output directory, overrides the configured one
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Search, select and process imagery for every plot in the file
    Run {
        /// GeoJSON plots file
        #[arg(short, long)]
        plots: PathBuf,
    },

    /// Dry run: search and select acquisition dates without downloading
    Plan {
        /// GeoJSON plots file
        #[arg(short, long)]
        plots: PathBuf,
    },
}
