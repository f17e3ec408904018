//! Tiles: planning, fetching and on-disk naming.
//!
//! - [`TileGrid`] turns slide dimensions and a [`TileSpec`] into ordered
//!   [`TileOrigin`]s
//! - [`TileFetcher`] reads one plane of one tile as an RGB raster
//! - [`JobPaths`] and friends name the job directory, tile directories and
//!   plane artifacts

mod fetcher;
mod grid;
mod paths;

pub use fetcher::{save_raster, TileFetcher};
pub use grid::{axis_starts, TileFormat, TileGrid, TileOrigin, TileSpec};
pub use paths::{
    count_artifacts, plane_file_name, slide_name, tile_dir_name, JobPaths, ARCHIVE_EXTENSION,
    METADATA_FILE_NAME,
};
