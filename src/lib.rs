//! # NDPI Tiler
//!
//! Resumable tile extraction for NDPI and other tiled whole slide images.
//!
//! A slide's full-resolution image is cut into a deterministic grid of square
//! tiles, and every focal plane of every tile is written as a PNG. Progress is
//! recorded in a small JSON file next to the tiles, so an interrupted job can
//! be resumed or re-run without repeating finished work.
//!
//! ## Architecture
//!
//! - [`io`] - byte-range access to slide files
//! - [`mod@format`] - TIFF/BigTIFF parsing, focal plane discovery and JPEG tables
//! - [`slide`] - the slide decoder capability and its TIFF implementation
//! - [`tile`] - grid planning, tile fetching and on-disk naming
//! - [`job`] - the extraction orchestrator, metadata store, archive packager,
//!   batch runner and status reporter
//! - [`config`] - CLI and configuration types
//!
//! ## Output layout
//!
//! ```text
//! <output_dir>/<slide_name>/metadata.json
//! <output_dir>/<slide_name>/<x>x_<y>y/<z>z.png
//! <output_dir>/<slide_name>.zip            (with --zip, after completion)
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use ndpi_tiler::{Extractor, JobConfig, TiffSlideOpener, TileFormat, TileSpec};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ndpi_tiler::JobError> {
//!     let spec = TileSpec::new(1024, 0, TileFormat::Png)?;
//!     let config = JobConfig::new("data/NDPI_1.ndpi", spec);
//!
//!     let extractor = Extractor::new(
//!         Arc::new(TiffSlideOpener::new()),
//!         config,
//!         CancellationToken::new(),
//!     );
//!     let summary = extractor.run().await?;
//!     println!("{} of {} tiles", summary.processed, summary.total_tile_count);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod format;
pub mod io;
pub mod job;
pub mod slide;
pub mod tile;

// Re-export commonly used types
pub use config::{BatchArgs, Cli, Command, InspectConfig, StatusConfig, TileConfig};
pub use error::{
    ArchiveError, DecodeError, IoError, JobError, MetadataError, TiffError, TileReadError,
};
pub use io::{LocalFileReader, RangeReader};
pub use job::{
    inspect_slide, run_batch, scan_job_statuses, BatchConfig, BatchReport, Extractor, JobConfig,
    JobMetadata, JobState, JobStatus, JobSummary, MetadataStore, SlideInspection,
};
pub use slide::{
    read_slide_metadata, SlideDecoder, SlideMetadata, SlideOpener, TiffSlideDecoder,
    TiffSlideOpener,
};
pub use tile::{TileFetcher, TileFormat, TileGrid, TileOrigin, TileSpec};
