//! Slide Inspector: metadata and planned grid, without touching the output.

use std::path::Path;

use serde::Serialize;

use crate::error::JobError;
use crate::slide::{read_slide_metadata, SlideMetadata, SlideOpener};
use crate::tile::{slide_name, TileGrid, TileSpec};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlideInspection {
    pub slide: String,
    pub metadata: SlideMetadata,
    pub tile_size: u32,
    pub tile_overlap: u32,
    pub tiles_across: usize,
    pub tiles_down: usize,
    pub total_tile_count: u64,
}

pub async fn inspect_slide<O: SlideOpener + ?Sized>(
    opener: &O,
    path: &Path,
    spec: &TileSpec,
) -> Result<SlideInspection, JobError> {
    let metadata = read_slide_metadata(opener, path).await?;
    let grid = TileGrid::plan(metadata.width, metadata.height, spec);

    Ok(SlideInspection {
        slide: slide_name(path),
        tile_size: spec.tile_size(),
        tile_overlap: spec.overlap(),
        tiles_across: grid.x_starts().len(),
        tiles_down: grid.y_starts().len(),
        total_tile_count: grid.total_tile_count(),
        metadata,
    })
}
