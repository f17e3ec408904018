//! Command-line configuration.
//!
//! Every option can also be set through an environment variable with the
//! `NDPI_` prefix:
//!
//! - `NDPI_TILE_SIZE` - Tile edge length in pixels (default: 1024)
//! - `NDPI_TILE_OVERLAP` - Overlap between neighbouring tiles (default: 0)
//! - `NDPI_TILE_FORMAT` - Raster format of saved tiles (default: png)
//! - `NDPI_OUTPUT_DIR` - Output root directory
//! - `NDPI_WORKERS` - Tile workers per slide in parallel mode (default: 8)
//! - `NDPI_JOBS` - Slides extracted at once by `batch` (default: 8)
//! - `NDPI_LOG_LEVEL` - Log level when `RUST_LOG` is not set

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::job::{default_output_root, BatchConfig, JobConfig, DEFAULT_CONCURRENT_SLIDES};
use crate::tile::{TileFormat, TileSpec};

// =============================================================================
// Default Values
// =============================================================================

/// Default tile edge length in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 1024;

/// Default overlap between neighbouring tiles.
pub const DEFAULT_TILE_OVERLAP: u32 = 0;

/// Default tile workers per slide in parallel mode.
pub const DEFAULT_WORKERS: usize = 8;

/// Slide layouts the bundled decoder reads, shown in `--help`.
pub const SUPPORTED_SLIDES: &str = "\
Supported slides: tiled TIFF and BigTIFF files (either byte order) with raw \
8-bit RGB or JPEG tiles. Strip-organized files, including NDPI slides that \
store the full-resolution plane as JPEG strips, are rejected with \
\"Unsupported slide layout\".";

// =============================================================================
// CLI Arguments
// =============================================================================

/// NDPI Tiler - resumable tile extraction for whole slide images.
///
/// Crops every full-resolution focal plane of a slide into square PNG tiles
/// and records progress so an interrupted run picks up where it stopped.
#[derive(Parser, Debug, Clone)]
#[command(name = "ndpi-tiler")]
#[command(author, version, about, long_about = None)]
#[command(after_help = SUPPORTED_SLIDES)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Extract tiles from one slide.
    #[command(after_help = SUPPORTED_SLIDES)]
    Tile(TileConfig),

    /// Extract tiles from every .ndpi slide in a directory.
    Batch(BatchArgs),

    /// Report progress of the job directories in a folder.
    Status(StatusConfig),

    /// Print slide metadata and the planned tile grid as JSON.
    Inspect(InspectConfig),
}

/// Log verbosity for `--log-level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Logging options shared by every command.
#[derive(Args, Debug, Clone, Default)]
pub struct LogArgs {
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Log level; takes precedence over --verbose.
    #[arg(short = 'g', long, value_enum, env = "NDPI_LOG_LEVEL")]
    pub log_level: Option<LogLevel>,
}

impl LogArgs {
    pub fn level(&self) -> LogLevel {
        match (self.log_level, self.verbose) {
            (Some(level), _) => level,
            (None, true) => LogLevel::Debug,
            (None, false) => LogLevel::Info,
        }
    }
}

/// Tile geometry options.
#[derive(Args, Debug, Clone)]
pub struct TilingArgs {
    /// Tile edge length in pixels. Only square tiles are supported.
    #[arg(short = 's', long, default_value_t = DEFAULT_TILE_SIZE, env = "NDPI_TILE_SIZE")]
    pub tile_size: u32,

    /// Overlap between neighbouring tiles in pixels.
    #[arg(short = 'l', long, default_value_t = DEFAULT_TILE_OVERLAP, env = "NDPI_TILE_OVERLAP")]
    pub tile_overlap: u32,

    /// Raster format of saved tiles.
    #[arg(long, value_enum, default_value_t = TileFormat::Png, env = "NDPI_TILE_FORMAT")]
    pub tile_format: TileFormat,
}

impl TilingArgs {
    pub fn validate(&self) -> Result<(), String> {
        self.tile_spec().map(|_| ())
    }

    pub fn tile_spec(&self) -> Result<TileSpec, String> {
        TileSpec::new(self.tile_size, self.tile_overlap, self.tile_format).map_err(|e| e.to_string())
    }
}

/// Options controlling how a job runs.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub tiling: TilingArgs,

    /// Re-extract tiles that are already complete on disk.
    #[arg(short = 'w', long, default_value_t = false)]
    pub overwrite: bool,

    /// Unpack `<slide>.zip` before extracting and pack the job directory
    /// into it afterwards.
    #[arg(short = 'z', long, default_value_t = false)]
    pub zip: bool,

    /// Extract tiles on a pool of workers instead of one at a time.
    #[arg(short = 'p', long, default_value_t = false)]
    pub parallel: bool,

    /// Tile workers per slide when --parallel is set.
    #[arg(short = 'n', long, default_value_t = DEFAULT_WORKERS, env = "NDPI_WORKERS")]
    pub workers: usize,
}

impl RunArgs {
    pub fn validate(&self) -> Result<(), String> {
        self.tiling.validate()?;
        if self.parallel && self.workers == 0 {
            return Err("workers must be greater than 0".to_string());
        }
        Ok(())
    }

    fn workers(&self) -> Option<usize> {
        self.parallel.then_some(self.workers)
    }
}

/// Options for `tile`.
#[derive(Args, Debug, Clone)]
pub struct TileConfig {
    /// Slide file to extract, e.g. data/NDPI/NDPI_1.ndpi
    #[arg(short = 'i', long)]
    pub input_file: PathBuf,

    /// Output root. Tiles go to `<output-dir>/<slide name>/`. Defaults to the
    /// directory containing the input file.
    #[arg(short = 'o', long, env = "NDPI_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    #[command(flatten)]
    pub run: RunArgs,

    #[command(flatten)]
    pub log: LogArgs,
}

impl TileConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.input_file.as_os_str().is_empty() {
            return Err("input file is required. Set --input-file".to_string());
        }
        self.run.validate()
    }

    /// Library job settings. Call [`validate`](Self::validate) first.
    pub fn job_config(&self) -> Result<JobConfig, String> {
        let output_root = self
            .output_dir
            .clone()
            .unwrap_or_else(|| default_output_root(&self.input_file));
        Ok(JobConfig {
            input: self.input_file.clone(),
            output_root,
            spec: self.run.tiling.tile_spec()?,
            overwrite: self.run.overwrite,
            archive: self.run.zip,
            workers: self.run.workers(),
        })
    }
}

/// Options for `batch`.
#[derive(Args, Debug, Clone)]
pub struct BatchArgs {
    /// Directory containing .ndpi slides, e.g. data/NDPI
    #[arg(short = 'd', long)]
    pub input_dir: PathBuf,

    /// Shared output root. Defaults to `<slide path without extension>_tiles`
    /// for each slide.
    #[arg(short = 'o', long, env = "NDPI_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Slides extracted at once.
    #[arg(short = 'j', long, default_value_t = DEFAULT_CONCURRENT_SLIDES, env = "NDPI_JOBS")]
    pub jobs: usize,

    #[command(flatten)]
    pub run: RunArgs,

    #[command(flatten)]
    pub log: LogArgs,
}

impl BatchArgs {
    pub fn validate(&self) -> Result<(), String> {
        if self.jobs == 0 {
            return Err("jobs must be greater than 0".to_string());
        }
        self.run.validate()
    }

    pub fn batch_config(&self) -> Result<BatchConfig, String> {
        Ok(BatchConfig {
            input_dir: self.input_dir.clone(),
            output_root: self.output_dir.clone(),
            spec: self.run.tiling.tile_spec()?,
            overwrite: self.run.overwrite,
            archive: self.run.zip,
            workers: self.run.workers(),
            jobs: self.jobs,
        })
    }
}

/// Options for `status`.
#[derive(Args, Debug, Clone)]
pub struct StatusConfig {
    /// Folder whose sub-directories are job directories.
    #[arg(short = 'd', long)]
    pub dir: PathBuf,

    #[command(flatten)]
    pub log: LogArgs,
}

/// Options for `inspect`.
#[derive(Args, Debug, Clone)]
pub struct InspectConfig {
    /// Slide file to describe.
    #[arg(short = 'i', long)]
    pub input_file: PathBuf,

    #[command(flatten)]
    pub tiling: TilingArgs,

    #[command(flatten)]
    pub log: LogArgs,
}

impl InspectConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.tiling.validate()
    }
}

// =============================================================================
// Tests
// =============================================================================
