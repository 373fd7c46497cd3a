//! Data cube query tool.
//!
//! Rebuilds a cube graph from its JSON construction record and runs point
//! sampling or zonal statistics on it, or materializes it to Zarr.

mod commands;
mod progress;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use datacube::{CubeConfig, CubeFactory, ExecutionContext};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};
use vector_queries::ZonalQuery;

use progress::BarProgress;

#[derive(Parser, Debug)]
#[command(name = "cube")]
#[command(about = "Point and zonal queries on spatiotemporal data cubes")]
struct Args {
    /// Worker threads (default: number of CPUs)
    #[arg(long, global = true, env = "CUBE_THREADS")]
    threads: Option<usize>,

    /// Chunk cache size per Zarr source in megabytes
    #[arg(long, global = true, env = "CHUNK_CACHE_SIZE_MB")]
    cache_mb: Option<usize>,

    /// Show a progress bar
    #[arg(long, global = true)]
    progress: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// Log level
    #[arg(long, global = true, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print size, chunking, bands and record of a cube
    Describe {
        /// Cube construction record (JSON)
        cube: PathBuf,
    },

    /// Sample all bands at points given as a JSON array of {x, y, t}
    Points {
        cube: PathBuf,

        /// Points file
        #[arg(short, long)]
        input: PathBuf,

        /// CRS of the point coordinates
        #[arg(long, default_value = "EPSG:4326")]
        srs: String,
    },

    /// Aggregate bands over polygon zones, one output file per time step
    Zonal {
        cube: PathBuf,

        /// Zones (GeoJSON FeatureCollection)
        #[arg(short, long)]
        zones: PathBuf,

        /// Statistic and band as <stat>:<band>, e.g. mean:NDVI
        #[arg(short, long = "stat", required = true)]
        stats: Vec<String>,

        /// Output directory
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,

        /// Output file name prefix
        #[arg(long, default_value = "zonal_")]
        prefix: String,

        /// Layer of the zones dataset (default: first layer)
        #[arg(long)]
        layer: Option<String>,
    },

    /// Materialize a cube to a Zarr V3 store
    Export {
        cube: PathBuf,

        /// Output directory of the Zarr store
        #[arg(short, long)]
        out: PathBuf,
    },
}

fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Initialize tracing; stdout is reserved for results
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    if args.json_logs {
        builder.json().init();
    } else {
        builder.init();
    }

    let mut config = CubeConfig::from_env();
    if let Some(threads) = args.threads {
        config.threads = threads;
    }
    if let Some(cache_mb) = args.cache_mb {
        config.chunk_cache_size_mb = cache_mb;
    }
    config.progress |= args.progress;
    config.validate().map_err(anyhow::Error::msg)?;
    info!(
        threads = config.threads,
        cache_mb = config.chunk_cache_size_mb,
        "Loaded configuration"
    );

    let factory = CubeFactory::from_config(&config);
    let context = |label: &'static str| -> Result<ExecutionContext> {
        let ctx = ExecutionContext::from_config(&config)?;
        Ok(if config.progress {
            ctx.with_progress(Arc::new(BarProgress::new(label)))
        } else {
            ctx
        })
    };

    match args.command {
        Command::Describe { cube } => {
            let cube = factory
                .from_file(&cube)
                .with_context(|| format!("failed to load cube {}", cube.display()))?;
            println!("{}", commands::describe(&*cube)?);
        }

        Command::Points { cube, input, srs } => {
            let cube = factory
                .from_file(&cube)
                .with_context(|| format!("failed to load cube {}", cube.display()))?;
            let json = std::fs::read_to_string(&input)
                .with_context(|| format!("failed to read {}", input.display()))?;
            let points = commands::parse_points(&json)?;
            info!(points = points.len(), srs = %srs, "Running point query");

            let out = commands::points(&*cube, points, &srs, &context("points")?)?;
            println!("{}", serde_json::to_string_pretty(&out)?);
        }

        Command::Zonal {
            cube,
            zones,
            stats,
            out_dir,
            prefix,
            layer,
        } => {
            let cube = factory
                .from_file(&cube)
                .with_context(|| format!("failed to load cube {}", cube.display()))?;
            let mut query = ZonalQuery::new(commands::parse_stats(&stats)?, out_dir, prefix);
            query.layer = layer;
            info!(zones = %zones.display(), stats = query.stats.len(), "Running zonal statistics");

            let files = commands::zonal(&*cube, &zones, &query, &context("zonal")?)?;
            for file in files {
                println!("{}", file);
            }
        }

        Command::Export { cube, out } => {
            let cube = factory
                .from_file(&cube)
                .with_context(|| format!("failed to load cube {}", cube.display()))?;
            println!("{}", commands::export(&*cube, &out)?);
        }
    }

    Ok(())
}
