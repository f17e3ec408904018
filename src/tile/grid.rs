//! Grid planning.
//!
//! Start coordinates along an axis are `0, stride, 2*stride, ...` with
//! `stride = tile_size - overlap`, stopping strictly before
//! `dimension - tile_size`. The final partial strip is dropped rather than
//! padded, so every planned tile lies fully inside the slide.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::JobError;

/// Top-left pixel coordinate of a tile in slide space.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TileOrigin {
    pub x: u32,
    pub y: u32,
}

impl TileOrigin {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for TileOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Raster format of saved tiles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TileFormat {
    #[default]
    Png,
}

impl TileFormat {
    /// File extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            TileFormat::Png => "png",
        }
    }

    pub fn image_format(self) -> image::ImageFormat {
        match self {
            TileFormat::Png => image::ImageFormat::Png,
        }
    }
}

/// Validated tile geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileSpec {
    tile_size: u32,
    overlap: u32,
    format: TileFormat,
}

impl TileSpec {
    /// Requires `tile_size > 0` and `overlap < tile_size`.
    pub fn new(tile_size: u32, overlap: u32, format: TileFormat) -> Result<Self, JobError> {
        if tile_size == 0 {
            return Err(JobError::Config("tile size must be greater than 0".to_string()));
        }
        if overlap >= tile_size {
            return Err(JobError::Config(format!(
                "tile overlap ({}) must be smaller than tile size ({})",
                overlap, tile_size
            )));
        }

        Ok(Self {
            tile_size,
            overlap,
            format,
        })
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn overlap(&self) -> u32 {
        self.overlap
    }

    pub fn format(&self) -> TileFormat {
        self.format
    }

    /// Distance between consecutive tile starts.
    pub fn stride(&self) -> u32 {
        self.tile_size - self.overlap
    }
}

/// Tile start coordinates along one axis.
pub fn axis_starts(dimension: u32, tile_size: u32, overlap: u32) -> Vec<u32> {
    if dimension <= tile_size || overlap >= tile_size {
        return Vec::new();
    }
    let stride = (tile_size - overlap) as usize;
    (0..dimension - tile_size).step_by(stride).collect()
}

/// Ordered tile origins for one slide, x-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileGrid {
    x_starts: Vec<u32>,
    y_starts: Vec<u32>,
}

impl TileGrid {
    pub fn plan(width: u32, height: u32, spec: &TileSpec) -> Self {
        Self {
            x_starts: axis_starts(width, spec.tile_size(), spec.overlap()),
            y_starts: axis_starts(height, spec.tile_size(), spec.overlap()),
        }
    }

    pub fn total_tile_count(&self) -> u64 {
        self.x_starts.len() as u64 * self.y_starts.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.total_tile_count() == 0
    }

    pub fn x_starts(&self) -> &[u32] {
        &self.x_starts
    }

    pub fn y_starts(&self) -> &[u32] {
        &self.y_starts
    }

    /// Origins in processing order: every y for the first x, then the next x.
    pub fn origins(&self) -> impl Iterator<Item = TileOrigin> + '_ {
        self.x_starts
            .iter()
            .flat_map(move |&x| self.y_starts.iter().map(move |&y| TileOrigin { x, y }))
    }
}
